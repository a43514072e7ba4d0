//! Single transaction submission: validate, switch network, attach fee
//! defaults, send

use super::gas::FeeCalculator;
use crate::chain::ChainRegistry;
use crate::error::{ExecutorError, ExecutorResult};
use crate::plan::RawTransaction;
use crate::wallet::{PreparedTransaction, WalletProvider};

use ethers::types::H256;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Which part of a plan a submission belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Approval(usize),
    Main,
}

impl Phase {
    /// Metrics label
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Approval(_) => "approval",
            Phase::Main => "main",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Approval(index) => write!(f, "approval #{}", index),
            Phase::Main => f.write_str("main transaction"),
        }
    }
}

/// Composes and sends one plan entry through the wallet provider
pub struct TransactionSubmitter {
    registry: Arc<ChainRegistry>,
    fees: FeeCalculator,
}

impl TransactionSubmitter {
    pub fn new(registry: Arc<ChainRegistry>, fees: FeeCalculator) -> Self {
        Self { registry, fees }
    }

    /// Submit `tx` and return the provider's transaction hash.
    ///
    /// Fee estimation failure is not fatal: the transaction then goes out
    /// without overrides and the provider applies its own defaults.
    pub async fn submit(
        &self,
        wallet: &dyn WalletProvider,
        tx: &RawTransaction,
        phase: Phase,
    ) -> ExecutorResult<H256> {
        let result = self.submit_inner(wallet, tx, phase).await;
        if let Err(e) = &result {
            warn!("{} failed: {}", phase, e);
            crate::metrics::record_tx_failed(phase, e);
        }
        result
    }

    async fn submit_inner(
        &self,
        wallet: &dyn WalletProvider,
        tx: &RawTransaction,
        phase: Phase,
    ) -> ExecutorResult<H256> {
        let validated = tx.validate()?;
        let chain = self.registry.resolve(&validated.network)?;

        let current = wallet.current_network().await;
        if current != chain.chain_id {
            info!(
                "Switching wallet from chain {} to {} for {}",
                current, chain.chain_id, phase
            );
            wallet
                .switch_network(chain)
                .await
                .map_err(|e| ExecutorError::NetworkSwitchRejected {
                    chain_id: chain.chain_id,
                    message: e.message().to_string(),
                })?;
            crate::metrics::record_network_switch(chain.chain_id);
        }

        let mut prepared = PreparedTransaction {
            chain_id: chain.chain_id,
            from: wallet.connected_address().await,
            to: validated.to,
            data: validated.data,
            value: validated.value,
            fees: None,
        };

        match self.fees.fee_defaults(wallet, chain, &prepared).await {
            Ok(fees) => prepared.fees = Some(fees),
            Err(e) => {
                warn!(
                    "{} on chain {}: {}; submitting without fee overrides",
                    phase, chain.chain_id, e
                );
                crate::metrics::record_estimation_fallback(chain.chain_id);
            }
        }

        let started = Instant::now();
        let hash = wallet.submit(&prepared).await.map_err(ExecutorError::from)?;
        crate::metrics::record_tx_latency(phase, started.elapsed().as_secs_f64());
        crate::metrics::record_tx_submitted(chain.chain_id, phase);

        info!("{} accepted on chain {}: {:?}", phase, chain.chain_id, hash);
        Ok(hash)
    }
}
