//! Most-recent-submission tracking shared by wallet implementations

use super::{SubmissionStatus, WalletError};

use ethers::types::H256;
use tokio::sync::RwLock;

/// Ticket identifying one submission; stale tickets cannot write results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionTicket(u64);

#[derive(Debug, Default)]
struct TrackerState {
    seq: u64,
    status: SubmissionStatus,
}

/// Tracks pending/success/error for the most recent submission only
#[derive(Debug, Default)]
pub struct SubmissionTracker {
    state: RwLock<TrackerState>,
}

impl SubmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new submission, superseding any earlier one
    pub async fn begin(&self) -> SubmissionTicket {
        let mut state = self.state.write().await;
        state.seq += 1;
        state.status = SubmissionStatus::Pending;
        SubmissionTicket(state.seq)
    }

    /// Record the outcome. Returns false if the ticket was superseded.
    pub async fn finish(&self, ticket: SubmissionTicket, result: &Result<H256, WalletError>) -> bool {
        let mut state = self.state.write().await;
        if state.seq != ticket.0 {
            return false;
        }
        state.status = match result {
            Ok(hash) => SubmissionStatus::Succeeded { hash: *hash },
            Err(e) => match e.broadcast_hash() {
                Some(hash) => SubmissionStatus::Unconfirmed {
                    hash,
                    message: e.message().to_string(),
                },
                None => SubmissionStatus::Failed {
                    message: e.message().to_string(),
                },
            },
        };
        true
    }

    pub async fn status(&self) -> SubmissionStatus {
        self.state.read().await.status.clone()
    }

    /// Clear markers; in-flight submissions become unobservable
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.seq += 1;
        state.status = SubmissionStatus::Idle;
    }
}
