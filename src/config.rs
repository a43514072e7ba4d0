//! Configuration management for the plan executor
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::chain::{ChainRegistry, NetworkId};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub executor: ExecutorConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub gas_limit_buffer_percent: u64,
    pub gas_price_buffer_percent: u64,
    pub priority_fee_wei: u64,
    pub base_fee_multiplier: u64,
    pub await_receipt: bool,
    pub receipt_timeout_secs: u64,
    pub default_chain_id: u64,
    pub health_check_interval_secs: u64,
    pub plan_file: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            gas_limit_buffer_percent: 20,
            gas_price_buffer_percent: 20,
            priority_fee_wei: 1_500_000_000,
            base_fee_multiplier: 2,
            await_receipt: false,
            receipt_timeout_secs: 120,
            default_chain_id: 1,
            health_check_interval_secs: 30,
            plan_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcConfig {
    pub alchemy_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: Option<String>,
    pub rpc_urls: Vec<String>,
    pub rpc_segment: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub private_key_env: String,
    pub keystore_path: Option<String>,
    pub keystore_password_env: Option<String>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: "EXECUTOR_PRIVATE_KEY".to_string(),
            keystore_path: None,
            keystore_password_env: None,
        }
    }
}

impl Settings {
    /// Load settings from the file named by `EXECUTOR_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("EXECUTOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.executor.base_fee_multiplier == 0 {
            anyhow::bail!("executor.base_fee_multiplier must be at least 1");
        }
        if self.executor.gas_limit_buffer_percent > 1000
            || self.executor.gas_price_buffer_percent > 1000
        {
            anyhow::bail!("executor buffer percentages must not exceed 1000");
        }
        if self.executor.health_check_interval_secs == 0 {
            anyhow::bail!("executor.health_check_interval_secs must be at least 1");
        }
        if self.api.port == 0 {
            anyhow::bail!("api.port must be set");
        }

        for (name, chain) in &self.chains {
            if chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", name);
            }
        }

        let registry = self.chain_registry();
        registry
            .resolve(&NetworkId::Numeric(self.executor.default_chain_id))
            .with_context(|| "executor.default_chain_id is not a known network")?;

        if self.rpc.alchemy_api_key.as_deref().map_or(true, str::is_empty) {
            tracing::warn!("No alchemy_api_key configured - using public RPC endpoints");
        }

        Ok(())
    }

    /// Network registry built from defaults plus configured chains
    pub fn chain_registry(&self) -> ChainRegistry {
        ChainRegistry::from_config(&self.rpc, &self.chains)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
    }

    ENV_VAR
        .replace_all(input, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
