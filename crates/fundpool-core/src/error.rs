use thiserror::Error;

/// Submission pipeline errors.
#[derive(Debug, Error)]
pub enum FundPoolError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown funding type '{0}'")]
    UnknownFundingType(String),

    #[error("A submission is already in flight")]
    SubmissionInFlight,

    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("Asset unreadable '{file_name}': {message}")]
    AssetUnreadable { file_name: String, message: String },

    #[error("Content store '{provider}' failed: {message}")]
    StorageFailure { provider: String, message: String },

    #[error("Ledger call '{operation}' failed: {message}")]
    LedgerFailure { operation: String, message: String },

    #[error("Transaction {tx_ref} reverted: {reason}")]
    TransactionReverted { tx_ref: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FundPoolError {
    pub fn stage_violation(from: &str, to: &str) -> Self {
        Self::InvariantViolation(format!(
            "submission stage transition not allowed: '{}' -> '{}'",
            from, to
        ))
    }

    pub fn storage(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageFailure {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn ledger(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LedgerFailure {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Revert reason when the ledger supplied one, otherwise the rendered error.
    pub fn chain_reason(&self) -> String {
        match self {
            Self::TransactionReverted { reason, .. } if !reason.is_empty() => reason.clone(),
            Self::LedgerFailure { message, .. } if !message.is_empty() => message.clone(),
            other => other.to_string(),
        }
    }
}
