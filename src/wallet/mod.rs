//! Wallet-provider capability consumed by the executor
//!
//! The executor never talks to a network directly. Network switching, gas
//! estimation, block and gas price reads and submission all go through
//! [`WalletProvider`], which is passed in explicitly on every call.

mod local;
mod tracker;

#[cfg(test)]
pub mod testing;

pub use local::{load_signer, LocalWalletProvider, ReceiptPolicy};
pub use tracker::SubmissionTracker;

use crate::chain::ChainDescriptor;
use crate::error::ExecutorError;
use crate::tx::FeeOverrides;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use thiserror::Error;

/// Transaction ready for estimation or submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
    pub chain_id: u64,
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    pub value: Option<U256>,
    /// `None` lets the provider apply its own fee defaults
    pub fees: Option<FeeOverrides>,
}

/// The parts of a block header the fee calculator looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: Option<u64>,
    pub base_fee_per_gas: Option<U256>,
}

/// Provider-side tracking of the most recent submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubmissionStatus {
    #[default]
    Idle,
    Pending,
    Succeeded { hash: H256 },
    /// Broadcast, but the outcome was never observed
    Unconfirmed { hash: H256, message: String },
    Failed { message: String },
}

impl SubmissionStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, SubmissionStatus::Pending)
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, SubmissionStatus::Succeeded { .. })
    }

    /// Whether the transaction reached the network, whatever came after
    pub fn was_broadcast(&self) -> bool {
        self.hash().is_some()
    }

    pub fn hash(&self) -> Option<H256> {
        match self {
            SubmissionStatus::Succeeded { hash } | SubmissionStatus::Unconfirmed { hash, .. } => {
                Some(*hash)
            }
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SubmissionStatus::Failed { message } | SubmissionStatus::Unconfirmed { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }
}

/// Failures reported by the wallet provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The wallet or node refused the request (includes user rejection)
    #[error("request rejected: {details}")]
    Rejected {
        short_message: Option<String>,
        details: String,
    },

    /// The call would revert, or did revert on chain
    #[error("execution reverted: {details}")]
    Reverted {
        short_message: Option<String>,
        details: String,
    },

    /// Transport or connectivity problem
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Sent, but no receipt was observed. The transaction may still land.
    #[error("no receipt for {hash:?}: {details}")]
    Unconfirmed { hash: H256, details: String },
}

impl WalletError {
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        WalletError::Rejected {
            short_message: Some(message.clone()),
            details: message,
        }
    }

    pub fn reverted(message: impl Into<String>) -> Self {
        let message = message.into();
        WalletError::Reverted {
            short_message: Some(message.clone()),
            details: message,
        }
    }

    /// Human-facing message, preferring the short form
    pub fn message(&self) -> &str {
        match self {
            WalletError::Rejected {
                short_message,
                details,
            }
            | WalletError::Reverted {
                short_message,
                details,
            } => short_message.as_deref().unwrap_or(details),
            WalletError::Unavailable(details) | WalletError::Unconfirmed { details, .. } => details,
        }
    }

    /// Hash of a transaction that was broadcast before the failure
    pub fn broadcast_hash(&self) -> Option<H256> {
        match self {
            WalletError::Unconfirmed { hash, .. } => Some(*hash),
            _ => None,
        }
    }
}

impl From<WalletError> for ExecutorError {
    fn from(e: WalletError) -> Self {
        match &e {
            WalletError::Reverted { .. } => ExecutorError::ProviderReverted(e.message().to_string()),
            WalletError::Unconfirmed { hash, .. } => ExecutorError::Timeout {
                operation: format!("receipt of {:?}", hash),
            },
            WalletError::Rejected { .. } | WalletError::Unavailable(_) => {
                ExecutorError::ProviderRejected(e.message().to_string())
            }
        }
    }
}

/// Wallet connector capabilities
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Chain the wallet is currently pointed at
    async fn current_network(&self) -> u64;

    /// Connected account, if any
    async fn connected_address(&self) -> Option<Address>;

    /// Returns once the wallet has switched, or refused to
    async fn switch_network(&self, chain: &ChainDescriptor) -> Result<(), WalletError>;

    async fn estimate_gas(&self, tx: &PreparedTransaction) -> Result<U256, WalletError>;

    async fn latest_block_header(&self, chain_id: u64) -> Result<BlockHeader, WalletError>;

    async fn current_gas_price(&self, chain_id: u64) -> Result<U256, WalletError>;

    /// Returns once the provider has accepted or refused the transaction
    async fn submit(&self, tx: &PreparedTransaction) -> Result<H256, WalletError>;

    /// Status of the most recent submission
    async fn submission_status(&self) -> SubmissionStatus;

    /// Forget the most recent submission
    async fn reset_submission(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_preferred() {
        let err = WalletError::Rejected {
            short_message: Some("User rejected the request.".to_string()),
            details: "MetaMask Tx Signature: User denied transaction signature. {code: 4001}"
                .to_string(),
        };
        assert_eq!(
            ExecutorError::from(err),
            ExecutorError::ProviderRejected("User rejected the request.".to_string())
        );

        let err = WalletError::Reverted {
            short_message: None,
            details: "execution reverted: STF".to_string(),
        };
        assert_eq!(
            ExecutorError::from(err),
            ExecutorError::ProviderReverted("execution reverted: STF".to_string())
        );
    }

    #[test]
    fn test_status_accessors() {
        let hash = H256::repeat_byte(0xab);
        let ok = SubmissionStatus::Succeeded { hash };
        assert!(ok.succeeded());
        assert_eq!(ok.hash(), Some(hash));
        assert_eq!(ok.error(), None);

        let failed = SubmissionStatus::Failed {
            message: "nope".to_string(),
        };
        assert_eq!(failed.error(), Some("nope"));
        assert!(!SubmissionStatus::Idle.is_pending());

        let unconfirmed = SubmissionStatus::Unconfirmed {
            hash,
            message: "receipt wait timed out".to_string(),
        };
        assert!(unconfirmed.was_broadcast());
        assert!(!unconfirmed.succeeded());
        assert_eq!(unconfirmed.hash(), Some(hash));
        assert_eq!(unconfirmed.error(), Some("receipt wait timed out"));
        assert!(!failed.was_broadcast());
    }

    #[test]
    fn test_unconfirmed_maps_to_timeout() {
        let hash = H256::repeat_byte(0x5a);
        let err = WalletError::Unconfirmed {
            hash,
            details: "receipt wait timed out".to_string(),
        };
        assert_eq!(err.broadcast_hash(), Some(hash));

        let converted = ExecutorError::from(err);
        assert!(matches!(converted, ExecutorError::Timeout { .. }));
        assert!(converted.is_provider_reported());
        assert_eq!(WalletError::rejected("no").broadcast_hash(), None);
    }
}
