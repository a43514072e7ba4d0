//! Chain module - network resolution and RPC access
//!
//! This module provides:
//! - Resolution of planner network identifiers to chain descriptors
//! - Per-chain RPC endpoint sets with automatic failover

pub mod provider;
pub mod registry;

pub use provider::ChainProvider;
pub use registry::{ChainDescriptor, ChainRegistry, NetworkId};
