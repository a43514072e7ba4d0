//! Wallet provider backed by a local signing key and JSON-RPC endpoints

use super::{
    BlockHeader, PreparedTransaction, SubmissionStatus, SubmissionTracker, WalletError,
    WalletProvider,
};
use crate::chain::{ChainDescriptor, ChainProvider, ChainRegistry};
use crate::config::WalletConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::tx::FeeOverrides;

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::prelude::*;
use ethers::providers::MiddlewareError;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Whether `submit` waits for the receipt before reporting success
#[derive(Debug, Clone, Copy)]
pub struct ReceiptPolicy {
    pub await_receipt: bool,
    pub timeout: Duration,
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self {
            await_receipt: false,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Load the signing key from the environment or an encrypted keystore
pub fn load_signer(config: &WalletConfig) -> ExecutorResult<LocalWallet> {
    if let Ok(key) = std::env::var(&config.private_key_env) {
        return key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| ExecutorError::Wallet(format!("Invalid private key: {}", e)));
    }

    if let Some(path) = &config.keystore_path {
        let password_env = config
            .keystore_password_env
            .as_deref()
            .unwrap_or("EXECUTOR_KEYSTORE_PASSWORD");
        let password = std::env::var(password_env).map_err(|_| {
            ExecutorError::Wallet(format!("Keystore password not set in {}", password_env))
        })?;
        return LocalWallet::decrypt_keystore(path, password)
            .map_err(|e| ExecutorError::Wallet(format!("Failed to decrypt keystore: {}", e)));
    }

    Err(ExecutorError::Wallet(format!(
        "No wallet configured. Set {} or configure a keystore",
        config.private_key_env
    )))
}

/// Signs locally and submits over per-chain HTTP endpoints
pub struct LocalWalletProvider {
    signer: LocalWallet,
    registry: Arc<ChainRegistry>,
    /// Connected chain providers indexed by chain ID
    providers: DashMap<u64, Arc<ChainProvider>>,
    current_chain: RwLock<u64>,
    tracker: SubmissionTracker,
    receipts: ReceiptPolicy,
}

impl LocalWalletProvider {
    pub fn new(
        signer: LocalWallet,
        registry: Arc<ChainRegistry>,
        initial_chain: u64,
        receipts: ReceiptPolicy,
    ) -> Self {
        info!(
            "Local wallet {:?} starting on chain {}",
            signer.address(),
            initial_chain
        );
        Self {
            signer,
            registry,
            providers: DashMap::new(),
            current_chain: RwLock::new(initial_chain),
            tracker: SubmissionTracker::new(),
            receipts,
        }
    }

    async fn provider_for(&self, chain_id: u64) -> Result<Arc<ChainProvider>, WalletError> {
        if let Some(provider) = self.providers.get(&chain_id) {
            return Ok(provider.clone());
        }

        let descriptor = self
            .registry
            .get(chain_id)
            .ok_or_else(|| WalletError::Unavailable(format!("chain {} is not configured", chain_id)))?;
        self.connect(descriptor).await
    }

    async fn connect(&self, descriptor: &ChainDescriptor) -> Result<Arc<ChainProvider>, WalletError> {
        let endpoints = self.registry.endpoints(descriptor);
        let provider = ChainProvider::connect(descriptor.clone(), &endpoints)
            .await
            .map_err(|e| WalletError::Unavailable(e.to_string()))?;
        let provider = Arc::new(provider);
        self.providers.insert(descriptor.chain_id, provider.clone());
        Ok(provider)
    }

    /// Health of every chain connected so far
    pub async fn health_check(&self) -> Vec<(u64, bool)> {
        let providers: Vec<Arc<ChainProvider>> =
            self.providers.iter().map(|e| e.value().clone()).collect();

        let checks = providers.into_iter().map(|provider| async move {
            let healthy = provider.health_check().await;
            crate::metrics::record_chain_health(provider.chain_id(), healthy);
            (provider.chain_id(), healthy)
        });
        futures::future::join_all(checks).await
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    async fn send(&self, tx: &PreparedTransaction) -> Result<H256, WalletError> {
        let provider = self.provider_for(tx.chain_id).await?;
        let client = SignerMiddleware::new(
            provider.http().clone(),
            self.signer.clone().with_chain_id(tx.chain_id),
        );

        let pending = client
            .send_transaction(typed_request(tx), None)
            .await
            .map_err(classify)?;
        let hash = pending.tx_hash();
        info!("Transaction sent on chain {}: {:?}", tx.chain_id, hash);

        if !self.receipts.await_receipt {
            return Ok(hash);
        }

        let waited = timeout(self.receipts.timeout, pending).await.ok();
        receipt_outcome(hash, waited)
    }
}

/// Interpret the receipt wait for a broadcast transaction. `None` means the
/// wait timed out.
///
/// Once the transaction is out, failing to observe its receipt keeps the hash:
/// the transaction may still be mined and must not be sent again.
fn receipt_outcome(
    hash: H256,
    waited: Option<Result<Option<TransactionReceipt>, ProviderError>>,
) -> Result<H256, WalletError> {
    match waited {
        None => Err(WalletError::Unconfirmed {
            hash,
            details: format!("timed out waiting for receipt of {:?}", hash),
        }),
        Some(Err(e)) => Err(WalletError::Unconfirmed {
            hash,
            details: format!("receipt of {:?} unavailable: {}", hash, e),
        }),
        Some(Ok(None)) => Err(WalletError::Unconfirmed {
            hash,
            details: format!("{:?} dropped from the mempool", hash),
        }),
        Some(Ok(Some(receipt))) if receipt.status == Some(U64::zero()) => {
            Err(WalletError::Reverted {
                short_message: Some("Transaction reverted".to_string()),
                details: format!("{:?} reverted in block {:?}", hash, receipt.block_number),
            })
        }
        Some(Ok(Some(receipt))) => {
            debug!("Receipt for {:?} in block {:?}", hash, receipt.block_number);
            Ok(hash)
        }
    }
}

#[async_trait]
impl WalletProvider for LocalWalletProvider {
    async fn current_network(&self) -> u64 {
        *self.current_chain.read().await
    }

    async fn connected_address(&self) -> Option<Address> {
        Some(self.signer.address())
    }

    async fn switch_network(&self, chain: &ChainDescriptor) -> Result<(), WalletError> {
        if *self.current_chain.read().await == chain.chain_id {
            return Ok(());
        }

        if !self.providers.contains_key(&chain.chain_id) {
            self.connect(chain).await.map_err(|e| WalletError::Rejected {
                short_message: Some(format!("Cannot reach {}", chain.name)),
                details: e.to_string(),
            })?;
        }

        *self.current_chain.write().await = chain.chain_id;
        info!("Switched to {} (chain {})", chain.name, chain.chain_id);
        Ok(())
    }

    async fn estimate_gas(&self, tx: &PreparedTransaction) -> Result<U256, WalletError> {
        let provider = self.provider_for(tx.chain_id).await?;
        provider.estimate_gas(&typed_request(tx)).await.map_err(classify)
    }

    async fn latest_block_header(&self, chain_id: u64) -> Result<BlockHeader, WalletError> {
        let provider = self.provider_for(chain_id).await?;
        let block = provider
            .latest_block()
            .await
            .map_err(classify)?
            .ok_or_else(|| WalletError::Unavailable("No latest block".to_string()))?;

        Ok(BlockHeader {
            number: block.number.map(|n| n.as_u64()),
            base_fee_per_gas: block.base_fee_per_gas,
        })
    }

    async fn current_gas_price(&self, chain_id: u64) -> Result<U256, WalletError> {
        let provider = self.provider_for(chain_id).await?;
        provider.gas_price().await.map_err(classify)
    }

    async fn submit(&self, tx: &PreparedTransaction) -> Result<H256, WalletError> {
        let ticket = self.tracker.begin().await;
        let result = self.send(tx).await;
        if !self.tracker.finish(ticket, &result).await {
            debug!("Submission result superseded before it resolved");
        }
        if let Err(e) = &result {
            warn!("Submission on chain {} failed: {}", tx.chain_id, e);
        }
        result
    }

    async fn submission_status(&self) -> SubmissionStatus {
        self.tracker.status().await
    }

    async fn reset_submission(&self) {
        self.tracker.reset().await;
    }
}

/// Build the request shape matching the fee overrides.
///
/// Without overrides a legacy request is sent so the node's own gas price
/// applies on every network.
fn typed_request(tx: &PreparedTransaction) -> TypedTransaction {
    match &tx.fees {
        Some(FeeOverrides::Dynamic {
            gas_limit,
            max_priority_fee_per_gas,
            max_fee_per_gas,
        }) => {
            let mut request = Eip1559TransactionRequest::new()
                .to(tx.to)
                .data(tx.data.clone())
                .chain_id(tx.chain_id)
                .gas(*gas_limit)
                .max_priority_fee_per_gas(*max_priority_fee_per_gas)
                .max_fee_per_gas(*max_fee_per_gas);
            if let Some(value) = tx.value {
                request = request.value(value);
            }
            if let Some(from) = tx.from {
                request = request.from(from);
            }
            TypedTransaction::Eip1559(request)
        }
        Some(FeeOverrides::Legacy { gas_limit, gas_price }) => {
            let request = legacy_request(tx).gas(*gas_limit).gas_price(*gas_price);
            TypedTransaction::Legacy(request)
        }
        None => TypedTransaction::Legacy(legacy_request(tx)),
    }
}

fn legacy_request(tx: &PreparedTransaction) -> TransactionRequest {
    let mut request = TransactionRequest::new()
        .to(tx.to)
        .data(tx.data.clone())
        .chain_id(tx.chain_id);
    if let Some(value) = tx.value {
        request = request.value(value);
    }
    if let Some(from) = tx.from {
        request = request.from(from);
    }
    request
}

/// Map a node error onto the wallet taxonomy, keeping the node's short
/// message when it sent one
fn classify<E: MiddlewareError>(e: E) -> WalletError {
    let details = e.to_string();
    match e.as_error_response() {
        Some(rpc) if rpc.code == 3 || rpc.message.contains("revert") => WalletError::Reverted {
            short_message: Some(rpc.message.clone()),
            details,
        },
        Some(rpc) => WalletError::Rejected {
            short_message: Some(rpc.message.clone()),
            details,
        },
        None => WalletError::Unavailable(details),
    }
}
