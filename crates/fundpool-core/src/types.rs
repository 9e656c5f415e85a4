use crate::error::FundPoolError;
use crate::units::NativeAmount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Account address exposed by the wallet/session provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a funding request is financed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FundingType {
    #[default]
    Crowdfunding,
    TreasuryGrant,
}

impl FundingType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Crowdfunding => "Crowdfunding",
            Self::TreasuryGrant => "TreasuryGrant",
        }
    }

    /// Discriminant passed to `createCampaign`.
    pub fn contract_code(self) -> u8 {
        match self {
            Self::Crowdfunding => 0,
            Self::TreasuryGrant => 1,
        }
    }

    /// Parse form input, reporting failure as a `fundingType` field error.
    pub fn parse_field(input: &str) -> Result<Self, ValidationError> {
        input.parse().map_err(|_| {
            ValidationError::new(
                ValidationField::FundingType,
                "Select Crowdfunding or TreasuryGrant",
            )
        })
    }
}

impl fmt::Display for FundingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FundingType {
    type Err = FundPoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crowdfunding" => Ok(Self::Crowdfunding),
            "treasurygrant" | "treasury_grant" | "grant" => Ok(Self::TreasuryGrant),
            _ => Err(FundPoolError::UnknownFundingType(s.trim().to_string())),
        }
    }
}

/// Which slot of the campaign an asset fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetRole {
    Document,
    Hero,
}

impl AssetRole {
    pub fn name(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Hero => "hero",
        }
    }

    pub fn field(self) -> ValidationField {
        match self {
            Self::Document => ValidationField::File,
            Self::Hero => ValidationField::HeroMedia,
        }
    }
}

/// Where the bytes of a local asset live before upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetSource {
    Path { path: PathBuf },
    Inline { bytes: Vec<u8> },
}

/// Local file handle selected in the draft. Never carries a content id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAsset {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub source: AssetSource,
}

impl LocalAsset {
    pub fn inline(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size_bytes: bytes.len() as u64,
            source: AssetSource::Inline { bytes },
        }
    }

    /// Describe a file on disk; MIME type is inferred from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, FundPoolError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let metadata =
            tokio::fs::metadata(path)
                .await
                .map_err(|e| FundPoolError::AssetUnreadable {
                    file_name: file_name.clone(),
                    message: e.to_string(),
                })?;

        Ok(Self {
            mime_type: mime_for_file_name(&file_name).to_string(),
            file_name,
            size_bytes: metadata.len(),
            source: AssetSource::Path {
                path: path.to_path_buf(),
            },
        })
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>, FundPoolError> {
        match &self.source {
            AssetSource::Inline { bytes } => Ok(bytes.clone()),
            AssetSource::Path { path } => {
                tokio::fs::read(path)
                    .await
                    .map_err(|e| FundPoolError::AssetUnreadable {
                        file_name: self.file_name.clone(),
                        message: e.to_string(),
                    })
            }
        }
    }
}

pub fn mime_for_file_name(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// Immutable snapshot of the campaign form.
///
/// `funding_goal` keeps the text the owner typed; it is converted to base units once,
/// when the ledger call is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignDraft {
    pub name: String,
    pub funding_type: FundingType,
    pub funding_goal: String,
    pub description: String,
    #[serde(default)]
    pub document: Option<LocalAsset>,
    #[serde(default)]
    pub hero: Option<LocalAsset>,
}

impl CampaignDraft {
    pub fn new(
        name: impl Into<String>,
        funding_type: FundingType,
        funding_goal: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            funding_type,
            funding_goal: funding_goal.into(),
            description: description.into(),
            document: None,
            hero: None,
        }
    }

    pub fn with_document(mut self, asset: LocalAsset) -> Self {
        self.document = Some(asset);
        self
    }

    pub fn with_hero(mut self, asset: LocalAsset) -> Self {
        self.hero = Some(asset);
        self
    }

    pub fn asset(&self, role: AssetRole) -> Option<&LocalAsset> {
        match role {
            AssetRole::Document => self.document.as_ref(),
            AssetRole::Hero => self.hero.as_ref(),
        }
    }
}

/// Form field a validation error is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationField {
    Name,
    FundingType,
    FundingAmount,
    Description,
    File,
    HeroMedia,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: ValidationField,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: ValidationField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Latest KYC / treasury capacity snapshot for the requesting address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryState {
    pub kyc_verified: bool,
    /// Present only when queried for a treasury grant.
    pub available_funds: Option<NativeAmount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub description: String,
    pub amount: NativeAmount,
}

/// Content identifier produced for one asset slot; empty when the slot had no asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReference {
    pub role: AssetRole,
    pub content_id: String,
}

impl AssetReference {
    pub fn empty(role: AssetRole) -> Self {
        Self {
            role,
            content_id: String::new(),
        }
    }
}

/// Arguments of the ledger's `createCampaign` call, already in fixed-point form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCampaignCall {
    pub name: String,
    pub goal_amount: NativeAmount,
    pub funding_type_code: u8,
    pub milestone_descriptions: Vec<String>,
    pub milestone_amounts: Vec<NativeAmount>,
    pub document_content_id: String,
    pub hero_content_id: String,
    pub description: String,
}

/// Transaction accepted by the ledger but not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHandle {
    pub tx_ref: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionStatus {
    Confirmed,
    Reverted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_ref: String,
    pub status: TransactionStatus,
    pub block_number: u64,
    pub campaign_id: Option<u64>,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Success,
    ValidationFailed,
    UploadFailed,
    ChainFailed,
    WalletUnavailable,
}

impl SubmissionOutcome {
    /// Short user-facing headline distinguishing what the user should do next.
    pub fn headline(self) -> &'static str {
        match self {
            Self::Success => "Project submitted successfully!",
            Self::ValidationFailed => "Form errors: please fix the errors before submitting.",
            Self::UploadFailed => "Asset upload failed: please try again.",
            Self::ChainFailed => "Submission failed: please try again.",
            Self::WalletUnavailable => "Wallet not connected: please connect your wallet.",
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, Self::UploadFailed | Self::ChainFailed)
    }
}

/// Result of one submission attempt, reported for every outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub trace_id: String,
    pub outcome: SubmissionOutcome,
    pub detail: String,
    pub transaction_ref: Option<String>,
    #[serde(default)]
    pub validation_errors: Vec<ValidationError>,
    #[serde(default)]
    pub assets: Vec<AssetReference>,
    pub completed_at: DateTime<Utc>,
}

impl SubmissionResult {
    pub fn new(
        trace_id: impl Into<String>,
        outcome: SubmissionOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            outcome,
            detail: detail.into(),
            transaction_ref: None,
            validation_errors: Vec::new(),
            assets: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> String {
        if self.detail.is_empty() {
            self.outcome.headline().to_string()
        } else {
            format!("{} {}", self.outcome.headline(), self.detail)
        }
    }
}
