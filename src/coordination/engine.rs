//! Plan execution engine: approval chain driver and main transaction driver

use super::state::{derive_snapshot, ExecutionSnapshot, ExecutionState, WalletView};
use crate::plan::{PlanId, RawTransaction, TransactionPlan};
use crate::tx::{Phase, TransactionSubmitter};
use crate::wallet::WalletProvider;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct EngineInner {
    plan: Option<Arc<TransactionPlan>>,
    state: ExecutionState,
    loaded_at: Option<DateTime<Utc>>,
    /// Bumped on every reset; results from an older generation are dropped
    generation: u64,
}

impl EngineInner {
    fn is_current(&self, plan_id: PlanId) -> bool {
        self.plan.as_ref().map(|p| p.id()) == Some(plan_id)
    }

    fn reset(&mut self, plan: Option<Arc<TransactionPlan>>) {
        self.plan = plan;
        self.state = ExecutionState::default();
        self.loaded_at = self.plan.as_ref().map(|_| Utc::now());
        self.generation += 1;
    }
}

/// Submission claimed under the processing lock, not yet sent
#[derive(Debug)]
pub struct ClaimedAction {
    plan: Arc<TransactionPlan>,
    phase: Phase,
    tx: RawTransaction,
    generation: u64,
}

impl ClaimedAction {
    pub fn phase(&self) -> Phase {
        self.phase
    }
}

/// Engine status as served to callers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub plan_id: Option<PlanId>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub total_transactions: usize,
    #[serde(flatten)]
    pub snapshot: ExecutionSnapshot,
}

/// Drives one plan at a time through its approvals and main transaction.
///
/// Actions never return errors: every failure lands in the snapshot.
pub struct ExecutionEngine {
    submitter: TransactionSubmitter,
    inner: Mutex<EngineInner>,
}

impl ExecutionEngine {
    pub fn new(submitter: TransactionSubmitter) -> Self {
        Self {
            submitter,
            inner: Mutex::new(EngineInner::default()),
        }
    }

    /// Install a plan. A plan with a different identity resets all state,
    /// including the provider's submission markers. Returns whether a reset
    /// happened.
    pub async fn set_plan(&self, plan: Arc<TransactionPlan>, wallet: &dyn WalletProvider) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.is_current(plan.id()) {
            return false;
        }

        if let Some(old) = &inner.plan {
            debug!("Replacing plan {} with {}", old.id(), plan.id());
            crate::metrics::record_plan_reset();
        }
        info!(
            "Loaded plan {} ({} approval(s), {} transaction(s))",
            plan.id(),
            plan.total_approvals(),
            plan.len()
        );

        inner.reset(Some(plan));
        wallet.reset_submission().await;

        crate::metrics::record_plan_loaded();
        true
    }

    /// Drop the current plan, if any
    pub async fn clear_plan(&self, wallet: &dyn WalletProvider) {
        let mut inner = self.inner.lock().await;
        if let Some(old) = &inner.plan {
            info!("Cleared plan {}", old.id());
            crate::metrics::record_plan_reset();
        }
        inner.reset(None);
        wallet.reset_submission().await;
    }

    pub async fn plan(&self) -> Option<Arc<TransactionPlan>> {
        self.inner.lock().await.plan.clone()
    }

    pub async fn snapshot(&self, wallet: &dyn WalletProvider) -> ExecutionSnapshot {
        let view = WalletView::read(wallet).await;
        let inner = self.inner.lock().await;
        derive_snapshot(inner.plan.as_deref(), &inner.state, &view)
    }

    pub async fn status(&self, wallet: &dyn WalletProvider) -> EngineStatus {
        let view = WalletView::read(wallet).await;
        let inner = self.inner.lock().await;
        EngineStatus {
            plan_id: inner.plan.as_ref().map(|p| p.id()),
            loaded_at: inner.loaded_at,
            total_transactions: inner.plan.as_ref().map_or(0, |p| p.len()),
            snapshot: derive_snapshot(inner.plan.as_deref(), &inner.state, &view),
        }
    }

    /// Submit the approval at the current index.
    ///
    /// No-op unless an approval is eligible. Success advances the index by
    /// one; the next approval needs another call. Returns whether a
    /// submission was started.
    pub async fn submit_next_approval(&self, wallet: &dyn WalletProvider) -> bool {
        match self.claim_approval(wallet).await {
            Some(action) => {
                self.complete(wallet, action).await;
                true
            }
            None => false,
        }
    }

    /// Submit the main transaction once the approval phase is complete.
    ///
    /// Marks the attempt before awaiting the provider, so a second call
    /// while the first is in flight is a no-op. Returns whether a
    /// submission was started.
    pub async fn submit_main(&self, wallet: &dyn WalletProvider) -> bool {
        match self.claim_main(wallet).await {
            Some(action) => {
                self.complete(wallet, action).await;
                true
            }
            None => false,
        }
    }

    /// Take the processing lock for the next approval, if one is eligible
    pub async fn claim_approval(&self, wallet: &dyn WalletProvider) -> Option<ClaimedAction> {
        let view = WalletView::read(wallet).await;

        let mut inner = self.inner.lock().await;
        let Some(plan) = inner.plan.clone() else {
            debug!("No plan loaded; ignoring approval request");
            return None;
        };
        let snapshot = derive_snapshot(Some(&plan), &inner.state, &view);
        if !snapshot.can_submit_approval {
            debug!(
                "Approval not eligible (index {}/{}, busy: {}, connected: {})",
                snapshot.approval_index,
                snapshot.total_approvals,
                inner.state.in_flight.is_some(),
                view.connected
            );
            return None;
        }

        let index = inner.state.approval_index;
        let tx = plan.approval(index)?.clone();
        let phase = Phase::Approval(index);
        inner.state.in_flight = Some(phase);
        inner.state.approval_error = None;

        Some(ClaimedAction {
            plan,
            phase,
            tx,
            generation: inner.generation,
        })
    }

    /// Take the processing lock for the main transaction, if it is eligible
    pub async fn claim_main(&self, wallet: &dyn WalletProvider) -> Option<ClaimedAction> {
        let view = WalletView::read(wallet).await;

        let mut inner = self.inner.lock().await;
        let Some(plan) = inner.plan.clone() else {
            debug!("No plan loaded; ignoring main request");
            return None;
        };
        let snapshot = derive_snapshot(Some(&plan), &inner.state, &view);
        if !snapshot.can_submit_main {
            debug!(
                "Main transaction not eligible (approvals complete: {}, busy: {}, connected: {})",
                snapshot.approval_phase_complete,
                snapshot.is_main_busy || snapshot.is_approval_busy,
                view.connected
            );
            return None;
        }
        let tx = plan.main_transaction()?.clone();

        inner.state.main_attempted = true;
        inner.state.main_error = None;
        inner.state.in_flight = Some(Phase::Main);
        // Approval submissions went through the same tracking
        wallet.reset_submission().await;

        Some(ClaimedAction {
            plan,
            phase: Phase::Main,
            tx,
            generation: inner.generation,
        })
    }

    /// Send a claimed submission and record its outcome, unless the plan
    /// was replaced or cleared in the meantime
    pub async fn complete(&self, wallet: &dyn WalletProvider, action: ClaimedAction) {
        let ClaimedAction {
            plan,
            phase,
            tx,
            generation,
        } = action;
        let result = self.submitter.submit(wallet, &tx, phase).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            debug!("Plan {} was reset; discarding {} result", plan.id(), phase);
            return;
        }
        inner.state.in_flight = None;

        match (phase, result) {
            (Phase::Approval(index), Ok(hash)) => {
                inner.state.approval_index = index + 1;
                inner.state.last_approval_hash = Some(hash);
                info!(
                    "Approval {}/{} complete for plan {}",
                    index + 1,
                    plan.total_approvals(),
                    plan.id()
                );
            }
            (Phase::Approval(index), Err(e)) => {
                warn!("Approval #{} of plan {} failed: {}", index, plan.id(), e);
                inner.state.approval_error = Some(e);
            }
            (Phase::Main, Ok(hash)) => {
                info!("Main transaction of plan {} submitted: {:?}", plan.id(), hash)
            }
            (Phase::Main, Err(e)) if e.is_provider_reported() => {
                warn!("Main transaction of plan {} failed: {}", plan.id(), e);
            }
            (Phase::Main, Err(e)) => {
                warn!("Main transaction of plan {} not sent: {}", plan.id(), e);
                inner.state.main_error = Some(e);
            }
        }
    }
}
