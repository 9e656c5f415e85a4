#![deny(unsafe_code)]

pub mod cache;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cache::{CacheError, PersistedUploadCache};
use fundpool_adapters::{InMemoryContentStore, InMemoryLedger, PinningServiceStore, StaticWallet};
use fundpool_core::{
    mime_for_file_name, CampaignDraft, ContentStore, FundPoolError, FundingType, LedgerContract,
    LocalAsset, MilestonePreview, NativeAmount, SubmissionConfig, SubmissionOrchestrator,
    SubmissionResult, SubmissionStage, TreasurySnapshot, ValidationError, ValidationReport,
    WalletAddress, WalletProvider,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

/// Where campaign assets are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Pinning { base_url: String, jwt: String },
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub upload_cache_path: PathBuf,
    /// Directory that `path` assets must resolve into. `None` refuses path assets.
    pub asset_root: Option<PathBuf>,
    pub storage: StorageBackend,
    pub wallet_address: Option<String>,
    pub treasury_funds: NativeAmount,
    pub kyc_verified: Vec<String>,
    pub submission: SubmissionConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            upload_cache_path: PathBuf::from("fundpool/data/uploads.json"),
            asset_root: None,
            storage: StorageBackend::Memory,
            wallet_address: None,
            treasury_funds: NativeAmount::from_units(100),
            kyc_verified: Vec::new(),
            submission: SubmissionConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct ServiceState {
    pub orchestrator: Arc<SubmissionOrchestrator>,
    pub ledger: Arc<InMemoryLedger>,
    pub wallet: Arc<StaticWallet>,
    pub upload_cache: Arc<Mutex<PersistedUploadCache>>,
    asset_root: Option<PathBuf>,
    storage_provider: &'static str,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        let ServiceConfig {
            upload_cache_path,
            asset_root,
            storage,
            wallet_address,
            treasury_funds,
            kyc_verified,
            submission,
        } = config;

        let ledger = Arc::new(
            InMemoryLedger::new(treasury_funds)
                .with_kyc_verified(kyc_verified.into_iter().map(WalletAddress::new)),
        );
        let store: Arc<dyn ContentStore> = match storage {
            StorageBackend::Memory => Arc::new(InMemoryContentStore::new()),
            StorageBackend::Pinning { base_url, jwt } => {
                Arc::new(PinningServiceStore::new(base_url, jwt))
            }
        };
        let storage_provider = store.provider_id();
        let wallet = Arc::new(match wallet_address {
            Some(address) => StaticWallet::connected(WalletAddress::new(address)),
            None => StaticWallet::disconnected(),
        });

        let orchestrator =
            SubmissionOrchestrator::new(ledger.clone(), store, wallet.clone(), submission);
        let upload_cache = PersistedUploadCache::load(upload_cache_path)?;
        let asset_root = match asset_root {
            Some(root) => Some(std::fs::canonicalize(&root).map_err(|e| {
                FundPoolError::AssetUnreadable {
                    file_name: root.display().to_string(),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };
        let seeded = upload_cache.list();
        if !seeded.is_empty() {
            info!(entries = seeded.len(), "Seeding upload cache from disk");
            orchestrator.uploads().seed_cache(seeded).await;
        }

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            ledger,
            wallet,
            upload_cache: Arc::new(Mutex::new(upload_cache)),
            asset_root,
            storage_provider,
        })
    }

    /// Mirror the coordinator's upload cache to disk.
    pub async fn persist_upload_cache(&self) -> Result<(), ApiError> {
        let entries = self.orchestrator.uploads().cached_uploads().await;
        self.upload_cache.lock().await.replace(entries)?;
        Ok(())
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/draft", get(get_draft).put(put_draft))
        .route("/v1/draft/validate", post(validate_draft))
        .route("/v1/treasury", get(get_treasury))
        .route("/v1/milestones/preview", get(milestone_preview))
        .route("/v1/submission", get(get_submission).post(submit))
        .with_state(state)
}

/// Asset reference accepted by `PUT /v1/draft`. The MIME type is always inferred from
/// the file name.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetPayload {
    /// File under the configured asset root, relative or absolute.
    Path { path: PathBuf },
    Inline { file_name: String, bytes: Vec<u8> },
}

impl AssetPayload {
    async fn into_asset(self, asset_root: Option<&Path>) -> Result<LocalAsset, ApiError> {
        match self {
            AssetPayload::Path { path } => {
                let resolved = resolve_under_root(asset_root, &path).await?;
                Ok(LocalAsset::from_path(resolved).await?)
            }
            AssetPayload::Inline { file_name, bytes } => {
                let mime_type = mime_for_file_name(&file_name);
                Ok(LocalAsset::inline(file_name, mime_type, bytes))
            }
        }
    }
}

/// Canonicalize `path` against `asset_root` and refuse anything that escapes it.
async fn resolve_under_root(asset_root: Option<&Path>, path: &Path) -> Result<PathBuf, ApiError> {
    let root = asset_root
        .ok_or_else(|| ApiError::forbidden("path assets are disabled; send the bytes inline"))?;
    let candidate = root.join(path);
    let resolved =
        tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|e| FundPoolError::AssetUnreadable {
                file_name: path.display().to_string(),
                message: e.to_string(),
            })?;
    if !resolved.starts_with(root) {
        return Err(ApiError::forbidden(format!(
            "asset path '{}' is outside the asset root",
            path.display()
        )));
    }
    Ok(resolved)
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub funding_type: Option<String>,
    #[serde(default)]
    pub funding_goal: String,
    #[serde(default)]
    pub description: String,
    pub document: Option<AssetPayload>,
    pub hero: Option<AssetPayload>,
}

impl DraftPayload {
    async fn into_draft(self, asset_root: Option<&Path>) -> Result<CampaignDraft, ApiError> {
        let funding_type = match self.funding_type.as_deref() {
            Some(text) => FundingType::parse_field(text)
                .map_err(|error| ApiError::Validation(vec![error]))?,
            None => FundingType::default(),
        };

        let mut draft =
            CampaignDraft::new(self.name, funding_type, self.funding_goal, self.description);
        if let Some(document) = self.document {
            draft.document = Some(document.into_asset(asset_root).await?);
        }
        if let Some(hero) = self.hero {
            draft.hero = Some(hero.into_asset(asset_root).await?);
        }
        Ok(draft)
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("core error: {0}")]
    Core(#[from] FundPoolError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error("draft has {} field error(s)", .0.len())]
    Validation(Vec<ValidationError>),
    #[error(transparent)]
    Core(#[from] FundPoolError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Http { status, message } => {
                (status, Json(serde_json::json!({ "error": message }))).into_response()
            }
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "error": format!("draft has {} field error(s)", errors.len()),
                    "errors": errors,
                })),
            )
                .into_response(),
            ApiError::Core(err) => {
                let status = match &err {
                    FundPoolError::SubmissionInFlight => StatusCode::CONFLICT,
                    FundPoolError::WalletUnavailable(_) => StatusCode::PRECONDITION_FAILED,
                    FundPoolError::AssetUnreadable { .. }
                    | FundPoolError::InvalidAmount(_)
                    | FundPoolError::UnknownFundingType(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
            }
            ApiError::Cache(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    contract_address: String,
    storage_provider: &'static str,
    wallet_connected: bool,
    stage: SubmissionStage,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "fundpool-service",
        contract_address: state.ledger.contract_address().to_string(),
        storage_provider: state.storage_provider,
        wallet_connected: state.wallet.connected_address().is_some(),
        stage: state.orchestrator.stage(),
    })
}

#[derive(Debug, Clone, Serialize)]
struct DraftResponse {
    stage: SubmissionStage,
    draft: CampaignDraft,
}

async fn get_draft(State(state): State<ServiceState>) -> Json<DraftResponse> {
    Json(DraftResponse {
        stage: state.orchestrator.stage(),
        draft: state.orchestrator.draft().await,
    })
}

#[derive(Debug, Clone, Serialize)]
struct ValidationResponse {
    passed: bool,
    errors: Vec<ValidationError>,
    capacity_hint: Option<String>,
}

impl ValidationResponse {
    async fn from_report(state: &ServiceState, report: ValidationReport) -> Self {
        Self {
            passed: report.passed(),
            errors: report.into_vec(),
            capacity_hint: state.orchestrator.capacity_hint().await,
        }
    }
}

async fn put_draft(
    State(state): State<ServiceState>,
    Json(payload): Json<DraftPayload>,
) -> Result<Json<ValidationResponse>, ApiError> {
    let draft = payload.into_draft(state.asset_root.as_deref()).await?;
    let report = state.orchestrator.update_draft(draft).await?;
    Ok(Json(ValidationResponse::from_report(&state, report).await))
}

async fn validate_draft(State(state): State<ServiceState>) -> Json<ValidationResponse> {
    let report = state.orchestrator.validate_current().await;
    Json(ValidationResponse::from_report(&state, report).await)
}

#[derive(Debug, Clone, Deserialize)]
struct TreasuryQuery {
    refresh: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
struct TreasuryResponse {
    source: &'static str,
    snapshot: TreasurySnapshot,
    capacity_hint: Option<String>,
}

async fn get_treasury(
    State(state): State<ServiceState>,
    Query(query): Query<TreasuryQuery>,
) -> Result<Json<TreasuryResponse>, ApiError> {
    let (source, snapshot) = if query.refresh.unwrap_or(false) {
        ("live_refresh", state.orchestrator.refresh_treasury().await?)
    } else {
        let cached = state
            .orchestrator
            .treasury_snapshot()
            .await
            .ok_or_else(|| {
                ApiError::not_found("no treasury snapshot yet; retry with refresh=true")
            })?;
        ("cache", cached)
    };

    Ok(Json(TreasuryResponse {
        source,
        snapshot,
        capacity_hint: state.orchestrator.capacity_hint().await,
    }))
}

async fn milestone_preview(State(state): State<ServiceState>) -> Json<MilestonePreview> {
    Json(state.orchestrator.milestone_preview().await)
}

#[derive(Debug, Clone, Serialize)]
struct SubmissionStatusResponse {
    stage: SubmissionStage,
    submitting: bool,
    last_transitions: Vec<SubmissionStage>,
    last_result: Option<SubmissionResult>,
}

async fn get_submission(State(state): State<ServiceState>) -> Json<SubmissionStatusResponse> {
    Json(SubmissionStatusResponse {
        stage: state.orchestrator.stage(),
        submitting: state.orchestrator.is_submitting(),
        last_transitions: state.orchestrator.last_transitions(),
        last_result: state.orchestrator.last_result().await,
    })
}

#[derive(Debug, Clone, Serialize)]
struct SubmissionResponse {
    summary: String,
    retryable: bool,
    #[serde(flatten)]
    result: SubmissionResult,
}

/// The attempt runs on its own task so a client disconnect cannot cancel it midway.
async fn submit(State(state): State<ServiceState>) -> Result<Json<SubmissionResponse>, ApiError> {
    let attempt = tokio::spawn(async move {
        let result = state.orchestrator.submit().await?;
        state.persist_upload_cache().await?;
        Ok::<_, ApiError>(result)
    });
    let result = attempt.await.map_err(|err| ApiError::Http {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("submission task failed: {err}"),
    })??;

    Ok(Json(SubmissionResponse {
        summary: result.summary(),
        retryable: result.outcome.is_retryable(),
        result,
    }))
}
