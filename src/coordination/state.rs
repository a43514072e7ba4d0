//! Execution state and the read-only snapshot derived from it

use crate::error::ExecutorError;
use crate::plan::TransactionPlan;
use crate::tx::Phase;
use crate::wallet::{SubmissionStatus, WalletProvider};

use ethers::types::H256;
use serde::Serialize;

/// Internal record for one plan. Replaced wholesale when the plan changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionState {
    /// Next approval to submit
    pub approval_index: usize,
    /// Last approval failure; cleared by the next attempt
    pub approval_error: Option<ExecutorError>,
    pub last_approval_hash: Option<H256>,
    /// Set before the main submission is awaited
    pub main_attempted: bool,
    /// Main failure that happened before the provider's send path
    pub main_error: Option<ExecutorError>,
    /// Processing lock, tagged with the phase holding it
    pub in_flight: Option<Phase>,
}

impl ExecutionState {
    pub fn is_approval_in_flight(&self) -> bool {
        matches!(self.in_flight, Some(Phase::Approval(_)))
    }

    pub fn is_main_in_flight(&self) -> bool {
        matches!(self.in_flight, Some(Phase::Main))
    }
}

/// What the engine needs to know about the wallet at read time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletView {
    pub connected: bool,
    pub submission: SubmissionStatus,
}

impl WalletView {
    pub async fn read(wallet: &dyn WalletProvider) -> Self {
        Self {
            connected: wallet.connected_address().await.is_some(),
            submission: wallet.submission_status().await,
        }
    }
}

/// Read-only progress flags exposed to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    pub approval_index: usize,
    pub total_approvals: usize,
    pub is_approval_busy: bool,
    pub approval_error: Option<String>,
    pub last_approval_hash: Option<H256>,
    pub is_main_busy: bool,
    pub main_succeeded: bool,
    pub main_error: Option<String>,
    pub main_tx_hash: Option<H256>,
    pub can_submit_approval: bool,
    pub can_submit_main: bool,
    pub approval_phase_complete: bool,
}

/// Derive the snapshot. Provider tracking only counts once the main
/// transaction of this plan has been attempted.
pub fn derive_snapshot(
    plan: Option<&TransactionPlan>,
    state: &ExecutionState,
    wallet: &WalletView,
) -> ExecutionSnapshot {
    let total_approvals = plan.map_or(0, |p| p.total_approvals());
    let has_main = plan.map_or(false, |p| p.main_transaction().is_some());

    let idle = SubmissionStatus::Idle;
    let tracked = if state.main_attempted {
        &wallet.submission
    } else {
        &idle
    };

    let is_approval_busy = state.is_approval_in_flight();
    let is_main_busy = state.is_main_in_flight() || tracked.is_pending();
    let main_succeeded = tracked.succeeded();
    let main_error = state
        .main_error
        .as_ref()
        .map(ToString::to_string)
        .or_else(|| tracked.error().map(str::to_string));

    let approval_phase_complete = state.approval_index >= total_approvals;
    // A broadcast main transaction may still land, even with an error showing
    let main_settled = state.main_attempted && (main_error.is_none() || tracked.was_broadcast());

    let can_submit_approval = plan.is_some()
        && state.approval_index < total_approvals
        && state.in_flight.is_none()
        && wallet.connected;

    let can_submit_main = has_main
        && approval_phase_complete
        && state.approval_error.is_none()
        && !is_approval_busy
        && !is_main_busy
        && !main_settled
        && wallet.connected;

    ExecutionSnapshot {
        approval_index: state.approval_index,
        total_approvals,
        is_approval_busy,
        approval_error: state.approval_error.as_ref().map(ToString::to_string),
        last_approval_hash: state.last_approval_hash,
        is_main_busy,
        main_succeeded,
        main_error,
        main_tx_hash: tracked.hash(),
        can_submit_approval,
        can_submit_main,
        approval_phase_complete,
    }
}
