//! Fee defaults for dynamic-fee and legacy networks

use crate::chain::ChainDescriptor;
use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::wallet::{PreparedTransaction, WalletProvider};

use ethers::types::U256;
use tracing::debug;

/// Gas and fee fields attached to a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeOverrides {
    Dynamic {
        gas_limit: U256,
        max_priority_fee_per_gas: U256,
        max_fee_per_gas: U256,
    },
    Legacy {
        gas_limit: U256,
        gas_price: U256,
    },
}

/// Computes fee overrides fresh for every submission
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    /// Buffer percentage for legacy gas price
    gas_price_buffer_percent: u64,
    /// Priority fee for dynamic-fee networks, in wei
    priority_fee_wei: U256,
    /// Base fee multiplier for max fee
    base_fee_multiplier: u64,
}

impl FeeCalculator {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            gas_limit_buffer_percent: config.gas_limit_buffer_percent,
            gas_price_buffer_percent: config.gas_price_buffer_percent,
            priority_fee_wei: U256::from(config.priority_fee_wei),
            base_fee_multiplier: config.base_fee_multiplier,
        }
    }

    /// Estimate gas and pick fees for `tx` on `chain`.
    ///
    /// Estimation errors (including would-revert) are returned, not swallowed.
    pub async fn fee_defaults(
        &self,
        wallet: &dyn WalletProvider,
        chain: &ChainDescriptor,
        tx: &PreparedTransaction,
    ) -> ExecutorResult<FeeOverrides> {
        let estimate = wallet
            .estimate_gas(tx)
            .await
            .map_err(|e| ExecutorError::EstimationFailure(e.message().to_string()))?;
        let gas_limit = with_buffer(estimate, self.gas_limit_buffer_percent)?;

        let header = wallet
            .latest_block_header(chain.chain_id)
            .await
            .map_err(|e| ExecutorError::EstimationFailure(e.message().to_string()))?;

        let overrides = match header.base_fee_per_gas {
            Some(base_fee) => {
                let max_priority_fee_per_gas = self.priority_fee_wei;
                // Headroom for a block or two of base fee growth
                let max_fee_per_gas = base_fee
                    .checked_mul(U256::from(self.base_fee_multiplier))
                    .and_then(|fee| fee.checked_add(max_priority_fee_per_gas))
                    .ok_or_else(|| overflow("max fee", base_fee))?;
                FeeOverrides::Dynamic {
                    gas_limit,
                    max_priority_fee_per_gas,
                    max_fee_per_gas,
                }
            }
            None => {
                let price = wallet
                    .current_gas_price(chain.chain_id)
                    .await
                    .map_err(|e| ExecutorError::EstimationFailure(e.message().to_string()))?;
                FeeOverrides::Legacy {
                    gas_limit,
                    gas_price: with_buffer(price, self.gas_price_buffer_percent)?,
                }
            }
        };

        debug!(
            "Fee defaults for chain {} at block {:?}: {:?} (estimate {})",
            chain.chain_id, header.number, overrides, estimate
        );
        Ok(overrides)
    }
}

fn with_buffer(value: U256, percent: u64) -> ExecutorResult<U256> {
    value
        .checked_mul(U256::from(percent))
        .map(|extra| extra / U256::from(100))
        .and_then(|extra| value.checked_add(extra))
        .ok_or_else(|| overflow("buffered value", value))
}

fn overflow(what: &str, input: U256) -> ExecutorError {
    ExecutorError::EstimationFailure(format!("{} overflows from node value {}", what, input))
}
