use crate::assets::AssetUploadCoordinator;
use crate::connectors::{ContentStore, LedgerContract, WalletProvider};
use crate::error::FundPoolError;
use crate::flow::{SubmissionStage, SubmissionStageMachine};
use crate::milestones::{preview, resolve_milestones, MilestonePreview};
use crate::treasury::{TreasuryQueryService, TreasurySnapshot};
use crate::types::{
    AssetReference, AssetRole, CampaignDraft, CreateCampaignCall, FundingType, SubmissionOutcome,
    SubmissionResult, TransactionStatus, TreasuryState, WalletAddress,
};
use crate::units::NativeAmount;
use crate::validation::{ValidationEngine, ValidationPolicy, ValidationReport};
use chrono::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

const GENERIC_CHAIN_FAILURE: &str = "An error occurred during submission.";

/// Submission session configuration.
#[derive(Debug, Clone)]
pub struct SubmissionConfig {
    pub validation: ValidationPolicy,
    /// Cached treasury snapshots older than this count as stale.
    pub snapshot_max_age_secs: i64,
    /// Re-query a stale snapshot before validating; off keeps cached-only validation.
    pub refresh_stale_snapshot: bool,
    pub reuse_uploaded_assets: bool,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            validation: ValidationPolicy::default(),
            snapshot_max_age_secs: 60,
            refresh_stale_snapshot: false,
            reuse_uploaded_assets: true,
        }
    }
}

/// What happens next after a campaign is created.
pub fn success_guidance(funding_type: FundingType) -> &'static str {
    match funding_type {
        FundingType::Crowdfunding => "Awaiting voter approval to start collecting funds.",
        FundingType::TreasuryGrant => {
            "Awaiting voter approval for treasury funding and milestone reviews."
        }
    }
}

/// Held for the duration of one attempt. Dropping it mid-pipeline (a cancelled future)
/// puts the stage machine back to idle before the in-flight flag is released.
struct InFlightGuard<'a> {
    session: &'a SubmissionOrchestrator,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(session: &'a SubmissionOrchestrator) -> Option<Self> {
        session
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { session })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut machine = self
            .session
            .stages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if machine.abandon() {
            warn!("Submission interrupted before completion; stage reset to idle");
            self.session.stage_tx.send_replace(SubmissionStage::Idle);
        }
        drop(machine);
        self.session.in_flight.store(false, Ordering::Release);
    }
}

/// One client session: the draft being edited and the pipeline that submits it.
///
/// At most one submission runs at a time. Every business outcome comes back as a
/// [`SubmissionResult`]; the only error `submit` returns is the guard rejection.
pub struct SubmissionOrchestrator {
    draft: RwLock<CampaignDraft>,
    stages: Mutex<SubmissionStageMachine>,
    stage_tx: watch::Sender<SubmissionStage>,
    in_flight: AtomicBool,
    validator: ValidationEngine,
    uploads: AssetUploadCoordinator,
    treasury: TreasuryQueryService,
    ledger: Arc<dyn LedgerContract>,
    wallet: Arc<dyn WalletProvider>,
    last_result: RwLock<Option<SubmissionResult>>,
    config: SubmissionConfig,
}

impl SubmissionOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerContract>,
        store: Arc<dyn ContentStore>,
        wallet: Arc<dyn WalletProvider>,
        config: SubmissionConfig,
    ) -> Self {
        let (stage_tx, _) = watch::channel(SubmissionStage::Idle);
        Self {
            draft: RwLock::new(CampaignDraft::default()),
            stages: Mutex::new(SubmissionStageMachine::new()),
            stage_tx,
            in_flight: AtomicBool::new(false),
            validator: ValidationEngine::new(config.validation.clone()),
            uploads: AssetUploadCoordinator::new(store, config.reuse_uploaded_assets),
            treasury: TreasuryQueryService::new(ledger.clone()),
            ledger,
            wallet,
            last_result: RwLock::new(None),
            config,
        }
    }

    pub fn config(&self) -> &SubmissionConfig {
        &self.config
    }

    pub fn uploads(&self) -> &AssetUploadCoordinator {
        &self.uploads
    }

    pub async fn draft(&self) -> CampaignDraft {
        self.draft.read().await.clone()
    }

    /// Replace the draft and return the live validation result for it.
    ///
    /// A funding type change re-queries the treasury for the connected wallet.
    pub async fn update_draft(
        &self,
        draft: CampaignDraft,
    ) -> Result<ValidationReport, FundPoolError> {
        let mut current = self.draft.write().await;
        if self.in_flight.load(Ordering::Acquire) {
            return Err(FundPoolError::SubmissionInFlight);
        }
        let type_changed = current.funding_type != draft.funding_type;
        *current = draft.clone();
        drop(current);

        let treasury = match self.wallet.connected_address() {
            Some(address) => {
                let cached = self
                    .treasury
                    .latest()
                    .await
                    .filter(|snapshot| snapshot.matches(&address, draft.funding_type));
                match cached {
                    Some(snapshot) if !type_changed => snapshot.state,
                    _ => {
                        self.treasury
                            .refresh(&address, draft.funding_type)
                            .await
                            .state
                    }
                }
            }
            None => TreasuryState::default(),
        };

        Ok(self.validator.validate(&draft, &treasury))
    }

    /// Validate the current draft against the cached treasury snapshot, without querying.
    pub async fn validate_current(&self) -> ValidationReport {
        let draft = self.draft().await;
        let treasury = match self.wallet.connected_address() {
            Some(address) => self
                .treasury
                .latest()
                .await
                .filter(|snapshot| snapshot.address == address)
                .map(|snapshot| snapshot.state)
                .unwrap_or_default(),
            None => TreasuryState::default(),
        };
        self.validator.validate(&draft, &treasury)
    }

    /// Best-effort treasury/KYC query for the connected wallet and current funding type.
    pub async fn refresh_treasury(&self) -> Result<TreasurySnapshot, FundPoolError> {
        let address = self.require_wallet()?;
        let funding_type = self.draft.read().await.funding_type;
        Ok(self.treasury.refresh(&address, funding_type).await)
    }

    pub async fn treasury_snapshot(&self) -> Option<TreasurySnapshot> {
        self.treasury.latest().await
    }

    /// "Available this quarter" hint for the current draft, when capacity is known.
    pub async fn capacity_hint(&self) -> Option<String> {
        let address = self.wallet.connected_address()?;
        let funding_type = self.draft.read().await.funding_type;
        self.treasury
            .latest()
            .await
            .filter(|snapshot| snapshot.matches(&address, funding_type))
            .and_then(|snapshot| snapshot.available_hint(&self.config.validation.currency_symbol))
    }

    pub async fn milestone_preview(&self) -> MilestonePreview {
        let draft = self.draft.read().await;
        preview(draft.funding_type, &draft.funding_goal)
    }

    pub fn stage(&self) -> SubmissionStage {
        *self.stage_tx.borrow()
    }

    pub fn subscribe_stage(&self) -> watch::Receiver<SubmissionStage> {
        self.stage_tx.subscribe()
    }

    /// Stage path of the most recent attempt.
    pub fn last_transitions(&self) -> Vec<SubmissionStage> {
        self.stages
            .lock()
            .map(|machine| machine.history().to_vec())
            .unwrap_or_default()
    }

    pub async fn last_result(&self) -> Option<SubmissionResult> {
        self.last_result.read().await.clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run validation, uploads and the ledger call for the current draft.
    pub async fn submit(&self) -> Result<SubmissionResult, FundPoolError> {
        let _guard =
            InFlightGuard::acquire(self).ok_or(FundPoolError::SubmissionInFlight)?;
        let trace_id = Uuid::new_v4().to_string();

        let Some(signer) = self.wallet.connected_address() else {
            warn!(trace_id = %trace_id, "Submission refused: no wallet session");
            let result = SubmissionResult::new(
                trace_id,
                SubmissionOutcome::WalletUnavailable,
                "No wallet session is available.",
            );
            *self.last_result.write().await = Some(result.clone());
            return Ok(result);
        };

        let draft = self.draft.read().await.clone();
        info!(
            trace_id = %trace_id,
            signer = %signer,
            funding_type = %draft.funding_type,
            "Submission started"
        );

        self.transition(&trace_id, SubmissionStage::Validating)?;
        let treasury = self.treasury_for(&signer, draft.funding_type).await;
        let report = self.validator.validate(&draft, &treasury);
        if !report.passed() {
            let errors = report.into_vec();
            let mut result = SubmissionResult::new(
                trace_id,
                SubmissionOutcome::ValidationFailed,
                format!("{} field error(s)", errors.len()),
            );
            result.validation_errors = errors;
            return self.finish(result, SubmissionStage::Failed).await;
        }

        self.transition(&trace_id, SubmissionStage::Uploading)?;
        let mut assets = Vec::with_capacity(2);
        for role in [AssetRole::Document, AssetRole::Hero] {
            match self.uploads.upload_slot(role, draft.asset(role)).await {
                Ok(reference) => assets.push(reference),
                Err(err) => {
                    let mut result = SubmissionResult::new(
                        trace_id,
                        SubmissionOutcome::UploadFailed,
                        err.to_string(),
                    );
                    result.assets = assets;
                    return self.finish(result, SubmissionStage::Failed).await;
                }
            }
        }

        self.transition(&trace_id, SubmissionStage::Submitting)?;
        let outcome = match build_call(&draft, &assets) {
            Ok(call) => self.send_to_ledger(&trace_id, &signer, &call).await,
            Err(err) => Err((None, err.chain_reason())),
        };

        match outcome {
            Ok(tx_ref) => {
                let mut result = SubmissionResult::new(
                    trace_id,
                    SubmissionOutcome::Success,
                    success_guidance(draft.funding_type),
                );
                result.transaction_ref = Some(tx_ref);
                result.assets = assets;
                *self.draft.write().await = CampaignDraft::default();
                self.uploads.clear_cache().await;
                self.finish(result, SubmissionStage::Succeeded).await
            }
            Err((tx_ref, detail)) => {
                let mut result =
                    SubmissionResult::new(trace_id, SubmissionOutcome::ChainFailed, detail);
                result.transaction_ref = tx_ref;
                result.assets = assets;
                self.finish(result, SubmissionStage::Failed).await
            }
        }
    }

    /// Broadcast and wait for confirmation. On failure, returns the transaction ref (if one
    /// was issued) and the user-facing detail.
    async fn send_to_ledger(
        &self,
        trace_id: &str,
        signer: &WalletAddress,
        call: &CreateCampaignCall,
    ) -> Result<String, (Option<String>, String)> {
        let handle = self
            .ledger
            .create_campaign(signer, call)
            .await
            .map_err(|err| {
                warn!(trace_id, error = %err, "createCampaign rejected");
                (None, err.chain_reason())
            })?;
        debug!(trace_id, tx_ref = %handle.tx_ref, "createCampaign accepted");

        let receipt = self
            .ledger
            .await_confirmation(&handle)
            .await
            .map_err(|err| {
                warn!(trace_id, tx_ref = %handle.tx_ref, error = %err, "Confirmation failed");
                (Some(handle.tx_ref.clone()), err.chain_reason())
            })?;

        match receipt.status {
            TransactionStatus::Confirmed => {
                info!(
                    trace_id,
                    tx_ref = %receipt.tx_ref,
                    block_number = receipt.block_number,
                    campaign_id = ?receipt.campaign_id,
                    "Campaign created"
                );
                Ok(receipt.tx_ref)
            }
            TransactionStatus::Reverted { reason } => {
                warn!(trace_id, tx_ref = %receipt.tx_ref, reason = %reason, "Transaction reverted");
                let detail = if reason.trim().is_empty() {
                    GENERIC_CHAIN_FAILURE.to_string()
                } else {
                    reason
                };
                Err((Some(receipt.tx_ref), detail))
            }
        }
    }

    /// Cached snapshot when it is current for this address and funding type; otherwise one
    /// best-effort re-query (unless disabled).
    async fn treasury_for(&self, address: &WalletAddress, funding_type: FundingType) -> TreasuryState {
        let max_age =
            Duration::try_seconds(self.config.snapshot_max_age_secs).unwrap_or(Duration::MAX);
        let latest = self.treasury.latest().await;
        if let Some(snapshot) = &latest {
            if snapshot.matches(address, funding_type) && snapshot.is_fresh(max_age) {
                return snapshot.state.clone();
            }
        }
        if self.config.refresh_stale_snapshot {
            return self.treasury.refresh(address, funding_type).await.state;
        }
        latest
            .filter(|snapshot| &snapshot.address == address)
            .map(|snapshot| snapshot.state)
            .unwrap_or_default()
    }

    async fn finish(
        &self,
        result: SubmissionResult,
        terminal: SubmissionStage,
    ) -> Result<SubmissionResult, FundPoolError> {
        self.transition(&result.trace_id, terminal)?;
        info!(
            trace_id = %result.trace_id,
            outcome = ?result.outcome,
            tx_ref = ?result.transaction_ref,
            "{}",
            result.summary()
        );
        *self.last_result.write().await = Some(result.clone());
        self.transition(&result.trace_id, SubmissionStage::Idle)?;
        Ok(result)
    }

    fn transition(&self, trace_id: &str, next: SubmissionStage) -> Result<(), FundPoolError> {
        self.stages
            .lock()
            .map_err(|_| FundPoolError::InvariantViolation("stage machine lock poisoned".into()))?
            .advance(next)?;
        self.stage_tx.send_replace(next);
        debug!(trace_id, stage = next.name(), "Submission stage changed");
        Ok(())
    }

    fn require_wallet(&self) -> Result<WalletAddress, FundPoolError> {
        self.wallet
            .connected_address()
            .ok_or_else(|| FundPoolError::WalletUnavailable("no wallet session".to_string()))
    }
}

/// Build the `createCampaign` arguments. The goal is converted to base units here and only here.
fn build_call(
    draft: &CampaignDraft,
    assets: &[AssetReference],
) -> Result<CreateCampaignCall, FundPoolError> {
    let goal = NativeAmount::parse(&draft.funding_goal)?;
    let milestones = resolve_milestones(draft.funding_type, goal);
    let content_id = |role: AssetRole| {
        assets
            .iter()
            .find(|asset| asset.role == role)
            .map(|asset| asset.content_id.clone())
            .unwrap_or_default()
    };

    Ok(CreateCampaignCall {
        name: draft.name.clone(),
        goal_amount: goal,
        funding_type_code: draft.funding_type.contract_code(),
        milestone_descriptions: milestones.iter().map(|m| m.description.clone()).collect(),
        milestone_amounts: milestones.iter().map(|m| m.amount).collect(),
        document_content_id: content_id(AssetRole::Document),
        hero_content_id: content_id(AssetRole::Hero),
        description: draft.description.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        LocalAsset, TransactionHandle, TransactionReceipt, ValidationField,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[derive(Debug, Clone)]
    enum ChainMode {
        Confirm,
        Reject(String),
        Revert(String),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Hold {
        KycQuery,
        CreateCampaign,
    }

    struct TestLedger {
        kyc_verified: BTreeSet<String>,
        treasury_funds: NativeAmount,
        mode: Mutex<ChainMode>,
        calls: Mutex<Vec<CreateCampaignCall>>,
        queries: AtomicUsize,
        gate: Option<(Hold, Arc<Notify>)>,
        armed: AtomicBool,
        entered: Arc<Notify>,
    }

    impl TestLedger {
        fn new() -> Self {
            Self {
                kyc_verified: BTreeSet::new(),
                treasury_funds: NativeAmount::from_units(100),
                mode: Mutex::new(ChainMode::Confirm),
                calls: Mutex::new(Vec::new()),
                queries: AtomicUsize::new(0),
                gate: None,
                armed: AtomicBool::new(false),
                entered: Arc::new(Notify::new()),
            }
        }

        fn with_funds(mut self, funds: &str) -> Self {
            self.treasury_funds = NativeAmount::parse(funds).unwrap();
            self
        }

        fn gated(mut self, hold: Hold, gate: Arc<Notify>) -> Self {
            self.gate = Some((hold, gate));
            self
        }

        /// The next call reaching the gated point blocks until the gate is notified.
        fn arm(&self) {
            self.armed.store(true, Ordering::SeqCst);
        }

        async fn pause_at(&self, point: Hold) {
            if let Some((hold, gate)) = &self.gate {
                if *hold == point && self.armed.swap(false, Ordering::SeqCst) {
                    self.entered.notify_one();
                    gate.notified().await;
                }
            }
        }

        fn set_mode(&self, mode: ChainMode) {
            *self.mode.lock().unwrap() = mode;
        }

        fn calls(&self) -> Vec<CreateCampaignCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LedgerContract for TestLedger {
        fn contract_address(&self) -> &str {
            "0xfundingpool"
        }

        async fn is_kyc_verified(&self, address: &WalletAddress) -> Result<bool, FundPoolError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.pause_at(Hold::KycQuery).await;
            Ok(self.kyc_verified.contains(address.as_str()))
        }

        async fn available_treasury_funds(&self) -> Result<NativeAmount, FundPoolError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.treasury_funds)
        }

        async fn create_campaign(
            &self,
            _signer: &WalletAddress,
            call: &CreateCampaignCall,
        ) -> Result<TransactionHandle, FundPoolError> {
            self.calls.lock().unwrap().push(call.clone());
            self.pause_at(Hold::CreateCampaign).await;
            let mode = self.mode.lock().unwrap().clone();
            match mode {
                ChainMode::Reject(message) => Err(FundPoolError::ledger("createCampaign", message)),
                _ => Ok(TransactionHandle {
                    tx_ref: format!("0xtx{}", self.calls.lock().unwrap().len()),
                    submitted_at: Utc::now(),
                }),
            }
        }

        async fn await_confirmation(
            &self,
            handle: &TransactionHandle,
        ) -> Result<TransactionReceipt, FundPoolError> {
            let status = match self.mode.lock().unwrap().clone() {
                ChainMode::Revert(reason) => TransactionStatus::Reverted { reason },
                _ => TransactionStatus::Confirmed,
            };
            Ok(TransactionReceipt {
                tx_ref: handle.tx_ref.clone(),
                status,
                block_number: 7,
                campaign_id: Some(1),
                confirmed_at: Utc::now(),
            })
        }
    }

    struct TestStore {
        uploads: Mutex<Vec<String>>,
        fail: AtomicBool,
        gate: Option<Arc<Notify>>,
        armed: AtomicBool,
        entered: Arc<Notify>,
    }

    impl TestStore {
        fn new() -> Self {
            Self {
                uploads: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
                gate: None,
                armed: AtomicBool::new(false),
                entered: Arc::new(Notify::new()),
            }
        }

        /// Holds the first upload after arming until `gate` is notified.
        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self.armed = AtomicBool::new(true);
            self
        }

        fn uploads(&self) -> Vec<String> {
            self.uploads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContentStore for TestStore {
        fn provider_id(&self) -> &'static str {
            "test"
        }

        async fn upload(
            &self,
            file_name: &str,
            _bytes: &[u8],
            _mime_type: &str,
        ) -> Result<String, FundPoolError> {
            self.uploads.lock().unwrap().push(file_name.to_string());
            if let Some(gate) = &self.gate {
                if self.armed.swap(false, Ordering::SeqCst) {
                    self.entered.notify_one();
                    gate.notified().await;
                }
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(FundPoolError::storage("test", "connection reset by peer"));
            }
            Ok(format!("cid-{file_name}"))
        }
    }

    struct TestWallet(Option<WalletAddress>);

    impl WalletProvider for TestWallet {
        fn connected_address(&self) -> Option<WalletAddress> {
            self.0.clone()
        }
    }

    struct Harness {
        ledger: Arc<TestLedger>,
        store: Arc<TestStore>,
        orchestrator: Arc<SubmissionOrchestrator>,
    }

    fn harness_parts(
        ledger: TestLedger,
        store: TestStore,
        wallet: Option<&str>,
        config: SubmissionConfig,
    ) -> Harness {
        let ledger = Arc::new(ledger);
        let store = Arc::new(store);
        let wallet = Arc::new(TestWallet(wallet.map(WalletAddress::new)));
        let orchestrator = Arc::new(SubmissionOrchestrator::new(
            ledger.clone(),
            store.clone(),
            wallet,
            config,
        ));
        Harness {
            ledger,
            store,
            orchestrator,
        }
    }

    fn harness_with(ledger: TestLedger, wallet: Option<&str>) -> Harness {
        harness_parts(
            ledger,
            TestStore::new(),
            wallet,
            SubmissionConfig::default(),
        )
    }

    /// Every snapshot is stale and is re-queried at submit time.
    fn always_refresh() -> SubmissionConfig {
        SubmissionConfig {
            snapshot_max_age_secs: -1,
            refresh_stale_snapshot: true,
            ..SubmissionConfig::default()
        }
    }

    fn spawn_submit(
        h: &Harness,
    ) -> tokio::task::JoinHandle<Result<SubmissionResult, FundPoolError>> {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.submit().await })
    }

    /// A concurrent attempt is refused without touching any collaborator or the draft.
    async fn assert_second_attempt_refused(h: &Harness) {
        assert!(h.orchestrator.is_submitting());
        let uploads_before = h.store.uploads().len();
        let queries_before = h.ledger.queries.load(Ordering::SeqCst);
        let calls_before = h.ledger.calls().len();

        let err = h.orchestrator.submit().await.unwrap_err();
        assert!(matches!(err, FundPoolError::SubmissionInFlight));
        assert!(matches!(
            h.orchestrator.update_draft(solar()).await,
            Err(FundPoolError::SubmissionInFlight)
        ));

        assert_eq!(h.store.uploads().len(), uploads_before);
        assert_eq!(h.ledger.queries.load(Ordering::SeqCst), queries_before);
        assert_eq!(h.ledger.calls().len(), calls_before);
    }

    fn harness() -> Harness {
        harness_with(TestLedger::new(), Some("0xowner"))
    }

    fn solar() -> CampaignDraft {
        CampaignDraft::new("Solar", FundingType::Crowdfunding, "2.0", "Solar panels")
    }

    fn with_assets(draft: CampaignDraft) -> CampaignDraft {
        draft
            .with_document(LocalAsset::inline(
                "plan.pdf",
                "application/pdf",
                b"%PDF plan".to_vec(),
            ))
            .with_hero(LocalAsset::inline("hero.png", "image/png", vec![0x89, 0x50]))
    }

    #[tokio::test]
    async fn crowdfunding_without_assets_submits_full_project_milestone() {
        let h = harness();
        h.orchestrator.update_draft(solar()).await.unwrap();

        let result = h.orchestrator.submit().await.unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::Success);
        assert_eq!(
            result.detail,
            "Awaiting voter approval to start collecting funds."
        );
        assert_eq!(result.transaction_ref.as_deref(), Some("0xtx1"));

        let calls = h.ledger.calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.name, "Solar");
        assert_eq!(call.goal_amount, NativeAmount::from_units(2));
        assert_eq!(call.funding_type_code, 0);
        assert_eq!(call.milestone_descriptions, vec!["Full Project".to_string()]);
        assert_eq!(call.milestone_amounts, vec![NativeAmount::from_units(2)]);
        assert_eq!(call.document_content_id, "");
        assert_eq!(call.hero_content_id, "");
        assert_eq!(call.description, "Solar panels");
        assert!(h.store.uploads().is_empty());

        assert_eq!(h.orchestrator.draft().await, CampaignDraft::default());
        assert_eq!(
            h.orchestrator.last_transitions(),
            vec![
                SubmissionStage::Idle,
                SubmissionStage::Validating,
                SubmissionStage::Uploading,
                SubmissionStage::Submitting,
                SubmissionStage::Succeeded,
                SubmissionStage::Idle,
            ]
        );
        assert_eq!(h.orchestrator.stage(), SubmissionStage::Idle);
        assert_eq!(h.orchestrator.last_result().await, Some(result));
    }

    #[tokio::test]
    async fn grant_above_threshold_without_kyc_fails_before_side_effects() {
        let h = harness();
        let draft = with_assets(CampaignDraft::new(
            "Lab",
            FundingType::TreasuryGrant,
            "6.0",
            "Research lab",
        ));
        let live = h.orchestrator.update_draft(draft.clone()).await.unwrap();
        assert!(live.has_field(ValidationField::FundingAmount));

        let result = h.orchestrator.submit().await.unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::ValidationFailed);
        assert!(result
            .validation_errors
            .iter()
            .any(|e| e.message == "KYC required for Treasury Grants over 5 ETH"));
        assert!(h.store.uploads().is_empty());
        assert!(h.ledger.calls().is_empty());
        assert_eq!(h.orchestrator.draft().await, draft);
        assert_eq!(
            h.orchestrator.last_transitions(),
            vec![
                SubmissionStage::Idle,
                SubmissionStage::Validating,
                SubmissionStage::Failed,
                SubmissionStage::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn grant_over_capacity_reports_available_funds() {
        let h = harness_with(TestLedger::new().with_funds("2.5"), Some("0xowner"));
        h.orchestrator
            .update_draft(CampaignDraft::new(
                "Lab",
                FundingType::TreasuryGrant,
                "3.0",
                "Research lab",
            ))
            .await
            .unwrap();
        assert_eq!(
            h.orchestrator.capacity_hint().await.as_deref(),
            Some("Available this quarter: 2.50 ETH")
        );

        let result = h.orchestrator.submit().await.unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::ValidationFailed);
        assert!(result
            .validation_errors
            .iter()
            .any(|e| e.message.contains("2.50")));
        assert!(h.ledger.calls().is_empty());
    }

    #[tokio::test]
    async fn upload_fault_stops_before_chain_call() {
        let h = harness();
        let draft = with_assets(solar());
        h.orchestrator.update_draft(draft.clone()).await.unwrap();
        h.store.fail.store(true, Ordering::SeqCst);

        let result = h.orchestrator.submit().await.unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::UploadFailed);
        assert!(result.outcome.is_retryable());
        assert!(result.detail.contains("connection reset by peer"));
        assert_eq!(h.store.uploads(), vec!["plan.pdf".to_string()]);
        assert!(h.ledger.calls().is_empty());
        assert_eq!(h.orchestrator.draft().await, draft);
    }

    #[tokio::test]
    async fn uploads_run_document_then_hero() {
        let h = harness();
        h.orchestrator.update_draft(with_assets(solar())).await.unwrap();

        let result = h.orchestrator.submit().await.unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::Success);
        assert_eq!(
            h.store.uploads(),
            vec!["plan.pdf".to_string(), "hero.png".to_string()]
        );
        let call = &h.ledger.calls()[0];
        assert_eq!(call.document_content_id, "cid-plan.pdf");
        assert_eq!(call.hero_content_id, "cid-hero.png");
    }

    #[tokio::test]
    async fn missing_wallet_blocks_entry() {
        let h = harness_with(TestLedger::new(), None);
        h.orchestrator.update_draft(solar()).await.unwrap();
        let queries_before = h.ledger.queries.load(Ordering::SeqCst);

        let result = h.orchestrator.submit().await.unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::WalletUnavailable);
        assert!(result.summary().contains("connect your wallet"));
        assert_eq!(h.ledger.queries.load(Ordering::SeqCst), queries_before);
        assert!(h.ledger.calls().is_empty());
        assert_eq!(h.orchestrator.last_transitions(), vec![SubmissionStage::Idle]);
        assert!(!h.orchestrator.is_submitting());
    }

    #[tokio::test]
    async fn revert_preserves_draft_and_retry_reuses_uploads() {
        let h = harness();
        let draft = with_assets(solar());
        h.orchestrator.update_draft(draft.clone()).await.unwrap();
        h.ledger
            .set_mode(ChainMode::Revert("Campaign name already used".to_string()));

        let failed = h.orchestrator.submit().await.unwrap();
        assert_eq!(failed.outcome, SubmissionOutcome::ChainFailed);
        assert_eq!(failed.detail, "Campaign name already used");
        assert_eq!(failed.transaction_ref.as_deref(), Some("0xtx1"));
        assert_eq!(h.orchestrator.draft().await, draft);

        h.ledger.set_mode(ChainMode::Confirm);
        let retried = h.orchestrator.submit().await.unwrap();
        assert_eq!(retried.outcome, SubmissionOutcome::Success);
        assert_eq!(h.store.uploads().len(), 2);
        assert_eq!(h.ledger.calls().len(), 2);
        assert!(h.orchestrator.uploads().cached_uploads().await.is_empty());
    }

    #[tokio::test]
    async fn rejection_detail_prefers_ledger_message() {
        let h = harness();
        h.orchestrator.update_draft(solar()).await.unwrap();
        h.ledger
            .set_mode(ChainMode::Reject("user rejected transaction".to_string()));

        let result = h.orchestrator.submit().await.unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::ChainFailed);
        assert_eq!(result.detail, "user rejected transaction");
        assert_eq!(result.transaction_ref, None);
        assert_eq!(h.orchestrator.draft().await, solar());
    }

    #[tokio::test]
    async fn empty_revert_reason_falls_back_to_generic_detail() {
        let h = harness();
        h.orchestrator.update_draft(solar()).await.unwrap();
        h.ledger.set_mode(ChainMode::Revert(String::new()));

        let result = h.orchestrator.submit().await.unwrap();
        assert_eq!(result.detail, "An error occurred during submission.");
    }

    #[tokio::test]
    async fn second_submission_while_submitting_is_rejected() {
        let gate = Arc::new(Notify::new());
        let h = harness_with(
            TestLedger::new().gated(Hold::CreateCampaign, gate.clone()),
            Some("0xowner"),
        );
        h.orchestrator.update_draft(with_assets(solar())).await.unwrap();
        h.ledger.arm();

        let mut stages = h.orchestrator.subscribe_stage();
        let running = spawn_submit(&h);
        h.ledger.entered.notified().await;
        assert_eq!(*stages.borrow_and_update(), SubmissionStage::Submitting);

        assert_second_attempt_refused(&h).await;
        assert_eq!(h.ledger.calls().len(), 1);

        gate.notify_one();
        let result = running.await.unwrap().unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::Success);
        assert!(!h.orchestrator.is_submitting());
        assert_eq!(h.orchestrator.stage(), SubmissionStage::Idle);
    }

    #[tokio::test]
    async fn second_submission_while_uploading_is_rejected() {
        let gate = Arc::new(Notify::new());
        let h = harness_parts(
            TestLedger::new(),
            TestStore::new().gated(gate.clone()),
            Some("0xowner"),
            SubmissionConfig::default(),
        );
        h.orchestrator.update_draft(with_assets(solar())).await.unwrap();

        let running = spawn_submit(&h);
        h.store.entered.notified().await;
        assert_eq!(h.orchestrator.stage(), SubmissionStage::Uploading);

        assert_second_attempt_refused(&h).await;
        assert_eq!(h.store.uploads(), vec!["plan.pdf".to_string()]);
        assert!(h.ledger.calls().is_empty());

        gate.notify_one();
        let result = running.await.unwrap().unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::Success);
        assert_eq!(h.store.uploads().len(), 2);
    }

    #[tokio::test]
    async fn second_submission_while_validating_is_rejected() {
        let gate = Arc::new(Notify::new());
        let h = harness_parts(
            TestLedger::new().gated(Hold::KycQuery, gate.clone()),
            TestStore::new(),
            Some("0xowner"),
            always_refresh(),
        );
        h.orchestrator.update_draft(with_assets(solar())).await.unwrap();
        h.ledger.arm();

        let running = spawn_submit(&h);
        h.ledger.entered.notified().await;
        assert_eq!(h.orchestrator.stage(), SubmissionStage::Validating);

        assert_second_attempt_refused(&h).await;
        assert!(h.store.uploads().is_empty());
        assert!(h.ledger.calls().is_empty());

        gate.notify_one();
        let result = running.await.unwrap().unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::Success);
    }

    #[tokio::test]
    async fn cancelled_attempt_returns_session_to_idle() {
        let gate = Arc::new(Notify::new());
        let h = harness_with(
            TestLedger::new().gated(Hold::CreateCampaign, gate.clone()),
            Some("0xowner"),
        );
        h.orchestrator.update_draft(solar()).await.unwrap();
        h.ledger.arm();
        let stages = h.orchestrator.subscribe_stage();

        let running = spawn_submit(&h);
        h.ledger.entered.notified().await;
        assert_eq!(h.orchestrator.stage(), SubmissionStage::Submitting);

        running.abort();
        assert!(running.await.unwrap_err().is_cancelled());

        assert!(!h.orchestrator.is_submitting());
        assert_eq!(h.orchestrator.stage(), SubmissionStage::Idle);
        assert_eq!(*stages.borrow(), SubmissionStage::Idle);
        assert_eq!(
            h.orchestrator.last_transitions(),
            vec![
                SubmissionStage::Idle,
                SubmissionStage::Validating,
                SubmissionStage::Uploading,
                SubmissionStage::Submitting,
                SubmissionStage::Idle,
            ]
        );
        assert_eq!(h.orchestrator.draft().await, solar());

        let retried = h.orchestrator.submit().await.unwrap();
        assert_eq!(retried.outcome, SubmissionOutcome::Success);
        assert_eq!(h.ledger.calls().len(), 2);
        assert_eq!(h.orchestrator.stage(), SubmissionStage::Idle);
    }

    #[tokio::test]
    async fn oversized_snapshot_age_treats_snapshot_as_fresh() {
        let h = harness_parts(
            TestLedger::new(),
            TestStore::new(),
            Some("0xowner"),
            SubmissionConfig {
                snapshot_max_age_secs: i64::MAX,
                refresh_stale_snapshot: true,
                ..SubmissionConfig::default()
            },
        );
        h.orchestrator.update_draft(solar()).await.unwrap();
        let queries_before = h.ledger.queries.load(Ordering::SeqCst);

        let result = h.orchestrator.submit().await.unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::Success);
        assert_eq!(h.ledger.queries.load(Ordering::SeqCst), queries_before);
    }

    #[tokio::test]
    async fn stale_snapshot_is_used_as_is_by_default() {
        assert!(!SubmissionConfig::default().refresh_stale_snapshot);
        let h = harness_parts(
            TestLedger::new(),
            TestStore::new(),
            Some("0xowner"),
            SubmissionConfig {
                snapshot_max_age_secs: -1,
                ..SubmissionConfig::default()
            },
        );
        h.orchestrator.update_draft(solar()).await.unwrap();
        let queries_before = h.ledger.queries.load(Ordering::SeqCst);

        let result = h.orchestrator.submit().await.unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::Success);
        assert_eq!(h.ledger.queries.load(Ordering::SeqCst), queries_before);
    }

    #[tokio::test]
    async fn stale_snapshot_is_requeried_when_enabled() {
        let h = harness_parts(
            TestLedger::new(),
            TestStore::new(),
            Some("0xowner"),
            always_refresh(),
        );
        h.orchestrator.update_draft(solar()).await.unwrap();
        let queries_before = h.ledger.queries.load(Ordering::SeqCst);

        let result = h.orchestrator.submit().await.unwrap();
        assert_eq!(result.outcome, SubmissionOutcome::Success);
        assert!(h.ledger.queries.load(Ordering::SeqCst) > queries_before);
    }

    #[tokio::test]
    async fn funding_type_change_requeries_treasury() {
        let h = harness();
        h.orchestrator.update_draft(solar()).await.unwrap();
        let after_first = h.ledger.queries.load(Ordering::SeqCst);

        let mut same = solar();
        same.description = "Solar panels for the school".to_string();
        h.orchestrator.update_draft(same).await.unwrap();
        assert_eq!(h.ledger.queries.load(Ordering::SeqCst), after_first);

        let mut grant = solar();
        grant.funding_type = FundingType::TreasuryGrant;
        h.orchestrator.update_draft(grant).await.unwrap();
        assert!(h.ledger.queries.load(Ordering::SeqCst) > after_first);
        let snapshot = h.orchestrator.treasury_snapshot().await.unwrap();
        assert_eq!(snapshot.funding_type, FundingType::TreasuryGrant);
        assert_eq!(
            snapshot.state.available_funds,
            Some(NativeAmount::from_units(100))
        );
    }

    #[test]
    fn build_call_converts_goal_once() {
        let draft = CampaignDraft::new("Lab", FundingType::TreasuryGrant, "7.25", "Lab");
        let call = build_call(&draft, &[AssetReference::empty(AssetRole::Document)]).unwrap();
        assert_eq!(call.goal_amount, NativeAmount::parse("7.25").unwrap());
        assert_eq!(call.funding_type_code, 1);
        assert!(call.milestone_descriptions.is_empty());
        assert!(call.milestone_amounts.is_empty());
        assert_eq!(call.hero_content_id, "");
    }
}
