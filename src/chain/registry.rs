//! Network identifier resolution
//!
//! Maps the identifiers a planner may emit (integers, decimal or hex strings,
//! CAIP-2 ids, aliases) to a concrete chain descriptor and the RPC endpoints
//! that reach it.

use crate::config::{ChainConfig, RpcConfig};
use crate::error::{ExecutorError, ExecutorResult};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Network identifier in any of the accepted forms
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NetworkId {
    Numeric(u64),
    /// Lowercased alias, resolved through the registry
    Named(String),
}

impl From<u64> for NetworkId {
    fn from(id: u64) -> Self {
        NetworkId::Numeric(id)
    }
}

impl FromStr for NetworkId {
    type Err = ExecutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ExecutorError::InvalidTransactionShape(
                "empty network id".to_string(),
            ));
        }

        let numeric = s.strip_prefix("eip155:").unwrap_or(s);
        if let Some(hex_digits) = numeric
            .strip_prefix("0x")
            .or_else(|| numeric.strip_prefix("0X"))
        {
            return u64::from_str_radix(hex_digits, 16)
                .map(NetworkId::Numeric)
                .map_err(|_| ExecutorError::UnknownNetwork {
                    network: s.to_string(),
                });
        }
        if let Ok(id) = numeric.parse::<u64>() {
            return Ok(NetworkId::Numeric(id));
        }

        Ok(NetworkId::Named(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::Numeric(id) => write!(f, "{}", id),
            NetworkId::Named(name) => f.write_str(name),
        }
    }
}

impl<'de> Deserialize<'de> for NetworkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Int(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Int(id) => Ok(NetworkId::Numeric(id)),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl Serialize for NetworkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NetworkId::Numeric(id) => serializer.serialize_u64(*id),
            NetworkId::Named(name) => serializer.serialize_str(name),
        }
    }
}

/// Everything the wallet provider needs to reach a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub name: String,
    /// Provider-specific routing segment, e.g. `arb-mainnet`
    pub rpc_segment: Option<String>,
    /// Public endpoints, used when no provider key is configured
    pub rpc_urls: Vec<String>,
}

struct KnownChain {
    chain_id: u64,
    name: &'static str,
    aliases: &'static [&'static str],
    rpc_segment: Option<&'static str>,
    public_rpc: &'static str,
}

const KNOWN_CHAINS: &[KnownChain] = &[
    KnownChain {
        chain_id: 1,
        name: "Ethereum",
        aliases: &["ethereum", "mainnet", "eth"],
        rpc_segment: Some("eth-mainnet"),
        public_rpc: "https://cloudflare-eth.com",
    },
    KnownChain {
        chain_id: 10,
        name: "OP Mainnet",
        aliases: &["optimism", "op"],
        rpc_segment: Some("opt-mainnet"),
        public_rpc: "https://mainnet.optimism.io",
    },
    KnownChain {
        chain_id: 56,
        name: "BNB Smart Chain",
        aliases: &["bsc", "bnb"],
        rpc_segment: Some("bnb-mainnet"),
        public_rpc: "https://bsc-dataseed.binance.org",
    },
    KnownChain {
        chain_id: 137,
        name: "Polygon",
        aliases: &["polygon", "matic"],
        rpc_segment: Some("polygon-mainnet"),
        public_rpc: "https://polygon-rpc.com",
    },
    KnownChain {
        chain_id: 8453,
        name: "Base",
        aliases: &["base"],
        rpc_segment: Some("base-mainnet"),
        public_rpc: "https://mainnet.base.org",
    },
    KnownChain {
        chain_id: 42161,
        name: "Arbitrum One",
        aliases: &["arbitrum", "arb"],
        rpc_segment: Some("arb-mainnet"),
        public_rpc: "https://arb1.arbitrum.io/rpc",
    },
    KnownChain {
        chain_id: 43114,
        name: "Avalanche",
        aliases: &["avalanche", "avax"],
        rpc_segment: Some("avax-mainnet"),
        public_rpc: "https://api.avax.network/ext/bc/C/rpc",
    },
    KnownChain {
        chain_id: 11155111,
        name: "Sepolia",
        aliases: &["sepolia"],
        rpc_segment: Some("eth-sepolia"),
        public_rpc: "https://rpc.sepolia.org",
    },
    KnownChain {
        chain_id: 84532,
        name: "Base Sepolia",
        aliases: &["base-sepolia"],
        rpc_segment: Some("base-sepolia"),
        public_rpc: "https://sepolia.base.org",
    },
    KnownChain {
        chain_id: 421614,
        name: "Arbitrum Sepolia",
        aliases: &["arbitrum-sepolia", "arb-sepolia"],
        rpc_segment: Some("arb-sepolia"),
        public_rpc: "https://sepolia-rollup.arbitrum.io/rpc",
    },
];

/// Registry of networks the executor can submit to
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: HashMap<u64, ChainDescriptor>,
    aliases: HashMap<String, u64>,
    alchemy_api_key: Option<String>,
}

impl ChainRegistry {
    /// Registry containing only the built-in networks
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        for known in KNOWN_CHAINS {
            registry.chains.insert(
                known.chain_id,
                ChainDescriptor {
                    chain_id: known.chain_id,
                    name: known.name.to_string(),
                    rpc_segment: known.rpc_segment.map(str::to_string),
                    rpc_urls: vec![known.public_rpc.to_string()],
                },
            );
            for alias in known.aliases {
                registry.aliases.insert(alias.to_string(), known.chain_id);
            }
        }
        registry
    }

    /// Built-in networks plus configured overrides
    pub fn from_config(rpc: &RpcConfig, chains: &HashMap<String, ChainConfig>) -> Self {
        let mut registry = Self::with_defaults();
        registry.alchemy_api_key = rpc
            .alchemy_api_key
            .clone()
            .filter(|key| !key.trim().is_empty());

        for (key, chain) in chains {
            registry.register(key, chain);
        }
        registry
    }

    fn register(&mut self, key: &str, chain: &ChainConfig) {
        let existing = self.chains.get(&chain.chain_id);
        let descriptor = ChainDescriptor {
            chain_id: chain.chain_id,
            name: chain
                .name
                .clone()
                .or_else(|| existing.map(|d| d.name.clone()))
                .unwrap_or_else(|| key.to_string()),
            rpc_segment: chain
                .rpc_segment
                .clone()
                .or_else(|| existing.and_then(|d| d.rpc_segment.clone())),
            rpc_urls: chain.rpc_urls.clone(),
        };
        self.chains.insert(chain.chain_id, descriptor);

        self.aliases.insert(key.to_ascii_lowercase(), chain.chain_id);
        for alias in &chain.aliases {
            self.aliases
                .insert(alias.to_ascii_lowercase(), chain.chain_id);
        }
    }

    /// Resolve an identifier to its descriptor, failing on unknown networks
    pub fn resolve(&self, network: &NetworkId) -> ExecutorResult<&ChainDescriptor> {
        let chain_id = match network {
            NetworkId::Numeric(id) => Some(*id),
            NetworkId::Named(name) => self.aliases.get(name).copied(),
        };

        chain_id
            .and_then(|id| self.chains.get(&id))
            .ok_or_else(|| ExecutorError::UnknownNetwork {
                network: network.to_string(),
            })
    }

    pub fn get(&self, chain_id: u64) -> Option<&ChainDescriptor> {
        self.chains.get(&chain_id)
    }

    /// RPC endpoints for a network, the keyed provider endpoint first
    pub fn endpoints(&self, descriptor: &ChainDescriptor) -> Vec<String> {
        let mut urls = Vec::with_capacity(descriptor.rpc_urls.len() + 1);
        if let (Some(key), Some(segment)) = (&self.alchemy_api_key, &descriptor.rpc_segment) {
            urls.push(format!("https://{}.g.alchemy.com/v2/{}", segment, key));
        }
        urls.extend(descriptor.rpc_urls.iter().cloned());
        urls
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
