//! Error types for the plan executor

use thiserror::Error;

/// Main error type for the executor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Unknown network: {network}")]
    UnknownNetwork { network: String },

    #[error("Invalid transaction shape: {0}")]
    InvalidTransactionShape(String),

    #[error("Fee estimation failed: {0}")]
    EstimationFailure(String),

    #[error("Switch to chain {chain_id} rejected: {message}")]
    NetworkSwitchRejected { chain_id: u64, message: String },

    #[error("{0}")]
    ProviderRejected(String),

    #[error("Transaction reverted: {0}")]
    ProviderReverted(String),

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExecutorError {
    /// Check if the error came out of the provider's send path, and is
    /// therefore already visible through the provider's submission tracking
    pub fn is_provider_reported(&self) -> bool {
        matches!(
            self,
            ExecutorError::ProviderRejected(_)
                | ExecutorError::ProviderReverted(_)
                | ExecutorError::Timeout { .. }
        )
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutorError::UnknownNetwork { .. } => "unknown_network",
            ExecutorError::InvalidTransactionShape(_) => "invalid_shape",
            ExecutorError::EstimationFailure(_) => "estimation",
            ExecutorError::NetworkSwitchRejected { .. } => "switch_rejected",
            ExecutorError::ProviderRejected(_) => "rejected",
            ExecutorError::ProviderReverted(_) => "reverted",
            ExecutorError::ChainConnection { .. } => "connection",
            ExecutorError::Wallet(_) => "wallet",
            ExecutorError::Timeout { .. } => "timeout",
            ExecutorError::Internal(_) => "internal",
        }
    }
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;
