//! Campaign submission pipeline for the funding pool.
//!
//! Validates a campaign draft against the latest treasury/KYC snapshot, uploads its assets
//! to content-addressed storage, and creates the campaign on the ledger with at most one
//! submission in flight per session.

#![deny(unsafe_code)]

pub mod assets;
pub mod connectors;
pub mod error;
pub mod flow;
pub mod milestones;
pub mod orchestrator;
pub mod treasury;
pub mod types;
pub mod units;
pub mod validation;

pub use assets::{AssetUploadCoordinator, CachedUpload};
pub use connectors::{ContentStore, LedgerContract, WalletProvider};
pub use error::FundPoolError;
pub use flow::{SubmissionStage, SubmissionStageMachine};
pub use milestones::{
    grant_release_schedule, preview as preview_milestones, resolve_milestones, GrantStage,
    MilestonePreview, FULL_PROJECT_MILESTONE,
};
pub use orchestrator::{success_guidance, SubmissionConfig, SubmissionOrchestrator};
pub use treasury::{TreasuryQueryService, TreasurySnapshot};
pub use types::{
    mime_for_file_name, AssetReference, AssetRole, AssetSource, CampaignDraft,
    CreateCampaignCall, FundingType, LocalAsset, Milestone, SubmissionOutcome, SubmissionResult,
    TransactionHandle, TransactionReceipt, TransactionStatus, TreasuryState, ValidationError,
    ValidationField, WalletAddress,
};
pub use units::{NativeAmount, NATIVE_DECIMALS};
pub use validation::{ValidationEngine, ValidationPolicy, ValidationReport};
