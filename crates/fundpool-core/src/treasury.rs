use crate::connectors::LedgerContract;
use crate::error::FundPoolError;
use crate::types::{FundingType, TreasuryState, WalletAddress};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Latest treasury/KYC reading with the context it was taken for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasurySnapshot {
    pub address: WalletAddress,
    pub funding_type: FundingType,
    pub state: TreasuryState,
    pub captured_at: DateTime<Utc>,
    /// Set when a query failed and the state was degraded.
    pub notice: Option<String>,
}

impl TreasurySnapshot {
    pub fn matches(&self, address: &WalletAddress, funding_type: FundingType) -> bool {
        &self.address == address && self.funding_type == funding_type
    }

    pub fn is_fresh(&self, max_age: Duration) -> bool {
        Utc::now() - self.captured_at <= max_age
    }

    /// Capacity hint shown next to the funding goal of a treasury grant.
    pub fn available_hint(&self, currency_symbol: &str) -> Option<String> {
        match (self.funding_type, self.state.available_funds) {
            (FundingType::TreasuryGrant, Some(funds)) => Some(format!(
                "Available this quarter: {} {}",
                funds.to_fixed(2),
                currency_symbol
            )),
            _ => None,
        }
    }
}

/// Reads KYC status and treasury capacity from the ledger.
pub struct TreasuryQueryService {
    ledger: Arc<dyn LedgerContract>,
    latest: RwLock<Option<TreasurySnapshot>>,
}

impl TreasuryQueryService {
    pub fn new(ledger: Arc<dyn LedgerContract>) -> Self {
        Self {
            ledger,
            latest: RwLock::new(None),
        }
    }

    /// Query both values, failing on the first ledger error.
    ///
    /// `available_funds` is only read for treasury grants.
    pub async fn fetch(
        &self,
        address: &WalletAddress,
        funding_type: FundingType,
    ) -> Result<TreasuryState, FundPoolError> {
        let kyc_verified = self.ledger.is_kyc_verified(address).await?;
        let available_funds = match funding_type {
            FundingType::TreasuryGrant => Some(self.ledger.available_treasury_funds().await?),
            FundingType::Crowdfunding => None,
        };
        Ok(TreasuryState {
            kyc_verified,
            available_funds,
        })
    }

    /// Best-effort query that always yields a snapshot and caches it.
    ///
    /// A failed KYC read keeps the last known status for the same address (or `false`);
    /// a failed capacity read leaves `available_funds` unset so the capacity check is skipped.
    pub async fn refresh(
        &self,
        address: &WalletAddress,
        funding_type: FundingType,
    ) -> TreasurySnapshot {
        let previous_kyc = self
            .latest
            .read()
            .await
            .as_ref()
            .filter(|snapshot| &snapshot.address == address)
            .map(|snapshot| snapshot.state.kyc_verified)
            .unwrap_or(false);

        let mut failures = Vec::new();
        let kyc_verified = match self.ledger.is_kyc_verified(address).await {
            Ok(verified) => verified,
            Err(err) => {
                warn!(address = %address, error = %err, "KYC status query failed");
                failures.push(format!("kyc: {err}"));
                previous_kyc
            }
        };

        let available_funds = match funding_type {
            FundingType::Crowdfunding => None,
            FundingType::TreasuryGrant => match self.ledger.available_treasury_funds().await {
                Ok(funds) => Some(funds),
                Err(err) => {
                    warn!(error = %err, "Treasury capacity query failed");
                    failures.push(format!("treasury: {err}"));
                    None
                }
            },
        };

        let notice = (!failures.is_empty()).then(|| {
            format!(
                "Could not load treasury funds or KYC status ({})",
                failures.join("; ")
            )
        });

        let snapshot = TreasurySnapshot {
            address: address.clone(),
            funding_type,
            state: TreasuryState {
                kyc_verified,
                available_funds,
            },
            captured_at: Utc::now(),
            notice,
        };
        debug!(
            address = %address,
            funding_type = %funding_type,
            kyc_verified,
            degraded = snapshot.notice.is_some(),
            "Treasury snapshot refreshed"
        );

        *self.latest.write().await = Some(snapshot.clone());
        snapshot
    }

    pub async fn latest(&self) -> Option<TreasurySnapshot> {
        self.latest.read().await.clone()
    }

    pub async fn invalidate(&self) {
        *self.latest.write().await = None;
    }
}
