//! Plan execution
//!
//! The engine:
//! 1. Holds the current plan and its execution state
//! 2. Submits approvals one at a time, in order, on explicit request
//! 3. Submits the main transaction once approvals are complete
//! 4. Derives the read-only progress snapshot

pub mod engine;
pub mod state;

pub use engine::{ClaimedAction, EngineStatus, ExecutionEngine};
pub use state::{derive_snapshot, ExecutionSnapshot, ExecutionState, WalletView};
