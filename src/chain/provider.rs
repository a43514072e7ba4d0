//! Chain provider with multi-RPC support and automatic failover

use super::ChainDescriptor;
use crate::error::{ExecutorError, ExecutorResult};

use ethers::prelude::*;
use ethers::providers::{Http, Provider, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Multi-endpoint JSON-RPC wrapper with automatic failover
pub struct ChainProvider {
    /// Network this provider is bound to
    descriptor: ChainDescriptor,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Build providers for every usable endpoint and check that the first
    /// reachable one reports the expected chain id
    pub async fn connect(
        descriptor: ChainDescriptor,
        endpoints: &[String],
    ) -> ExecutorResult<Self> {
        let mut http_providers = Vec::new();

        for url in endpoints {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider.interval(Duration::from_millis(500)));
                    debug!("Added HTTP provider for chain {}", descriptor.chain_id);
                }
                Err(e) => {
                    warn!("Failed to create provider for chain {}: {}", descriptor.chain_id, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(ExecutorError::ChainConnection {
                chain_id: descriptor.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        let provider = Self {
            descriptor,
            http_providers,
            current_provider: AtomicUsize::new(0),
        };
        provider.verify_chain_id().await?;

        info!(
            "Connected to {} (chain {}) via {} endpoint(s)",
            provider.descriptor.name,
            provider.descriptor.chain_id,
            provider.http_providers.len()
        );
        Ok(provider)
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.descriptor.chain_id, next);
    }

    async fn verify_chain_id(&self) -> ExecutorResult<()> {
        let mut last_error = None;
        for _ in 0..self.http_providers.len() {
            match self.http().get_chainid().await {
                Ok(reported) if reported == U256::from(self.descriptor.chain_id) => return Ok(()),
                Ok(reported) => {
                    return Err(ExecutorError::ChainConnection {
                        chain_id: self.descriptor.chain_id,
                        message: format!("endpoint reports chain {}", reported),
                    })
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    self.failover();
                }
            }
        }

        Err(ExecutorError::ChainConnection {
            chain_id: self.descriptor.chain_id,
            message: last_error.unwrap_or_else(|| "All providers failed".to_string()),
        })
    }

    /// Estimate gas for a transaction.
    ///
    /// Reverts are not retried on another endpoint: they would revert there too.
    pub async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ProviderError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.http().estimate_gas(tx, None).await {
                Ok(gas) => return Ok(gas),
                Err(e) if is_transport_error(&e) && attempts < self.http_providers.len() => {
                    warn!("Gas estimation transport error on chain {}: {}", self.chain_id(), e);
                    self.failover();
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Latest block header
    pub async fn latest_block(&self) -> Result<Option<Block<H256>>, ProviderError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.http().get_block(BlockNumber::Latest).await {
                Ok(block) => return Ok(block),
                Err(e) if attempts < self.http_providers.len() => {
                    warn!("Failed to fetch latest block on chain {}: {}", self.chain_id(), e);
                    self.failover();
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Current legacy gas price
    pub async fn gas_price(&self) -> Result<U256, ProviderError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.http().get_gas_price().await {
                Ok(price) => return Ok(price),
                Err(e) if attempts < self.http_providers.len() => {
                    warn!("Failed to fetch gas price on chain {}: {}", self.chain_id(), e);
                    self.failover();
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.http().get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.chain_id(), e);
                false
            }
        }
    }

    /// Get chain ID
    pub fn chain_id(&self) -> u64 {
        self.descriptor.chain_id
    }

    pub fn descriptor(&self) -> &ChainDescriptor {
        &self.descriptor
    }
}

/// Errors that say nothing about the transaction itself
fn is_transport_error(e: &ProviderError) -> bool {
    RpcError::as_error_response(e).is_none()
}
