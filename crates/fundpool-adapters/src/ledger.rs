use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fundpool_core::connectors::LedgerContract;
use fundpool_core::error::FundPoolError;
use fundpool_core::types::{
    CreateCampaignCall, TransactionHandle, TransactionReceipt, TransactionStatus, WalletAddress,
};
use fundpool_core::units::NativeAmount;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x3E58b2F2b52cF5b2CFBd500BEd607caDa9642f24";

const TREASURY_GRANT_CODE: u8 = 1;

/// Fault injected into the transaction path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainFault {
    /// `createCampaign` is refused before a transaction exists (wallet rejection, RPC error).
    Reject(String),
    /// The transaction is mined but reverts with this reason.
    Revert(String),
}

/// Campaign as recorded by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignRecord {
    pub campaign_id: u64,
    pub owner: WalletAddress,
    pub name: String,
    pub goal_amount: NativeAmount,
    pub funding_type_code: u8,
    pub milestone_descriptions: Vec<String>,
    pub milestone_amounts: Vec<NativeAmount>,
    pub document_content_id: String,
    pub hero_content_id: String,
    pub description: String,
    pub tx_ref: String,
    pub block_number: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingTransaction {
    signer: WalletAddress,
    call: CreateCampaignCall,
}

#[derive(Debug)]
struct LedgerState {
    kyc_verified: BTreeSet<WalletAddress>,
    treasury_funds: NativeAmount,
    kyc_threshold: NativeAmount,
    pending: BTreeMap<String, PendingTransaction>,
    campaigns: Vec<CampaignRecord>,
    block_number: u64,
}

#[derive(Debug, Default)]
struct Faults {
    chain: Option<ChainFault>,
    queries: Option<String>,
}

/// In-process stand-in for the funding-pool contract.
///
/// Transactions stay pending until `await_confirmation`, which re-applies the contract's
/// own checks before recording the campaign.
#[derive(Debug)]
pub struct InMemoryLedger {
    contract_address: String,
    state: RwLock<LedgerState>,
    faults: RwLock<Faults>,
}

impl InMemoryLedger {
    pub fn new(treasury_funds: NativeAmount) -> Self {
        Self {
            contract_address: DEFAULT_CONTRACT_ADDRESS.to_string(),
            state: RwLock::new(LedgerState {
                kyc_verified: BTreeSet::new(),
                treasury_funds,
                kyc_threshold: NativeAmount::from_units(5),
                pending: BTreeMap::new(),
                campaigns: Vec::new(),
                block_number: 0,
            }),
            faults: RwLock::new(Faults::default()),
        }
    }

    pub fn with_contract_address(mut self, address: impl Into<String>) -> Self {
        self.contract_address = address.into();
        self
    }

    pub fn with_kyc_verified(mut self, addresses: impl IntoIterator<Item = WalletAddress>) -> Self {
        self.state.get_mut().kyc_verified.extend(addresses);
        self
    }

    pub async fn set_kyc_verified(&self, address: WalletAddress, verified: bool) {
        let mut state = self.state.write().await;
        if verified {
            state.kyc_verified.insert(address);
        } else {
            state.kyc_verified.remove(&address);
        }
    }

    pub async fn set_treasury_funds(&self, funds: NativeAmount) {
        self.state.write().await.treasury_funds = funds;
    }

    /// Inject (or clear with `None`) a fault on the transaction path.
    pub async fn set_chain_fault(&self, fault: Option<ChainFault>) {
        self.faults.write().await.chain = fault;
    }

    /// Make KYC and treasury reads fail with `reason` (or succeed again with `None`).
    pub async fn set_queries_unavailable(&self, reason: Option<String>) {
        self.faults.write().await.queries = reason;
    }

    pub async fn campaigns(&self) -> Vec<CampaignRecord> {
        self.state.read().await.campaigns.clone()
    }

    pub async fn pending_transactions(&self) -> usize {
        self.state.read().await.pending.len()
    }

    async fn check_queries(&self, operation: &str) -> Result<(), FundPoolError> {
        match &self.faults.read().await.queries {
            Some(reason) => Err(FundPoolError::ledger(operation, reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerContract for InMemoryLedger {
    fn contract_address(&self) -> &str {
        &self.contract_address
    }

    async fn is_kyc_verified(&self, address: &WalletAddress) -> Result<bool, FundPoolError> {
        self.check_queries("isKYCVerified").await?;
        Ok(self.state.read().await.kyc_verified.contains(address))
    }

    async fn available_treasury_funds(&self) -> Result<NativeAmount, FundPoolError> {
        self.check_queries("getAvailableTreasuryFunds").await?;
        Ok(self.state.read().await.treasury_funds)
    }

    async fn create_campaign(
        &self,
        signer: &WalletAddress,
        call: &CreateCampaignCall,
    ) -> Result<TransactionHandle, FundPoolError> {
        if let Some(ChainFault::Reject(reason)) = &self.faults.read().await.chain {
            warn!(signer = %signer, reason = %reason, "createCampaign rejected");
            return Err(FundPoolError::ledger("createCampaign", reason.clone()));
        }

        let tx_ref = format!("0x{}", Uuid::new_v4().simple());
        self.state.write().await.pending.insert(
            tx_ref.clone(),
            PendingTransaction {
                signer: signer.clone(),
                call: call.clone(),
            },
        );
        debug!(signer = %signer, tx_ref = %tx_ref, "createCampaign pending");

        Ok(TransactionHandle {
            tx_ref,
            submitted_at: Utc::now(),
        })
    }

    async fn await_confirmation(
        &self,
        handle: &TransactionHandle,
    ) -> Result<TransactionReceipt, FundPoolError> {
        let forced_revert = match &self.faults.read().await.chain {
            Some(ChainFault::Revert(reason)) => Some(reason.clone()),
            _ => None,
        };

        let mut state = self.state.write().await;
        let pending = state.pending.remove(&handle.tx_ref).ok_or_else(|| {
            FundPoolError::ledger(
                "waitForTransaction",
                format!("unknown transaction {}", handle.tx_ref),
            )
        })?;
        state.block_number += 1;
        let block_number = state.block_number;

        let revert_reason = forced_revert.or_else(|| contract_checks(&state, &pending));
        if let Some(reason) = revert_reason {
            warn!(tx_ref = %handle.tx_ref, reason = %reason, "createCampaign reverted");
            return Ok(TransactionReceipt {
                tx_ref: handle.tx_ref.clone(),
                status: TransactionStatus::Reverted { reason },
                block_number,
                campaign_id: None,
                confirmed_at: Utc::now(),
            });
        }

        let campaign_id = state.campaigns.len() as u64 + 1;
        let call = pending.call;
        state.campaigns.push(CampaignRecord {
            campaign_id,
            owner: pending.signer,
            name: call.name,
            goal_amount: call.goal_amount,
            funding_type_code: call.funding_type_code,
            milestone_descriptions: call.milestone_descriptions,
            milestone_amounts: call.milestone_amounts,
            document_content_id: call.document_content_id,
            hero_content_id: call.hero_content_id,
            description: call.description,
            tx_ref: handle.tx_ref.clone(),
            block_number,
            created_at: Utc::now(),
        });
        info!(tx_ref = %handle.tx_ref, campaign_id, block_number, "Campaign recorded");

        Ok(TransactionReceipt {
            tx_ref: handle.tx_ref.clone(),
            status: TransactionStatus::Confirmed,
            block_number,
            campaign_id: Some(campaign_id),
            confirmed_at: Utc::now(),
        })
    }
}

/// Checks the contract itself enforces; returns the revert reason on violation.
fn contract_checks(state: &LedgerState, pending: &PendingTransaction) -> Option<String> {
    let call = &pending.call;
    if call.name.trim().is_empty() {
        return Some("Campaign name required".to_string());
    }
    if call.goal_amount.is_zero() {
        return Some("Goal must be greater than zero".to_string());
    }
    if call.milestone_descriptions.len() != call.milestone_amounts.len() {
        return Some("Milestone length mismatch".to_string());
    }
    if call.funding_type_code == TREASURY_GRANT_CODE {
        if call.goal_amount > state.kyc_threshold && !state.kyc_verified.contains(&pending.signer) {
            return Some("KYC verification required".to_string());
        }
        if call.goal_amount > state.treasury_funds {
            return Some("Insufficient treasury funds".to_string());
        }
    }
    None
}
