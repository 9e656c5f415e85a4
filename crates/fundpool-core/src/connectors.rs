use crate::error::FundPoolError;
use crate::types::{
    CreateCampaignCall, TransactionHandle, TransactionReceipt, WalletAddress,
};
use crate::units::NativeAmount;
use async_trait::async_trait;

/// Narrow view of the funding-pool ledger contract.
///
/// Implementations own transport, signing, and the confirmation timeout/retry policy.
#[async_trait]
pub trait LedgerContract: Send + Sync {
    fn contract_address(&self) -> &str;

    async fn is_kyc_verified(&self, address: &WalletAddress) -> Result<bool, FundPoolError>;

    async fn available_treasury_funds(&self) -> Result<NativeAmount, FundPoolError>;

    /// Broadcast `createCampaign`; returns once the transaction is accepted, not mined.
    async fn create_campaign(
        &self,
        signer: &WalletAddress,
        call: &CreateCampaignCall,
    ) -> Result<TransactionHandle, FundPoolError>;

    /// Wait until the transaction is confirmed or reverted.
    async fn await_confirmation(
        &self,
        handle: &TransactionHandle,
    ) -> Result<TransactionReceipt, FundPoolError>;
}

/// Content-addressed storage for campaign assets.
#[async_trait]
pub trait ContentStore: Send + Sync {
    fn provider_id(&self) -> &'static str;

    /// Store `bytes` and return their content identifier once the provider acknowledges.
    async fn upload(
        &self,
        file_name: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<String, FundPoolError>;
}

/// Wallet/session provider. `None` means no usable session.
pub trait WalletProvider: Send + Sync {
    fn connected_address(&self) -> Option<WalletAddress>;
}
