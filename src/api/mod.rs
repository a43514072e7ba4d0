//! HTTP API for plan loading, execution actions and status

use crate::config::ApiConfig;
use crate::coordination::{ClaimedAction, EngineStatus, ExecutionEngine, ExecutionSnapshot};
use crate::error::{ExecutorError, ExecutorResult};
use crate::plan::PlanRequest;
use crate::wallet::WalletProvider;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ethers::types::Address;
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ExecutionEngine>,
    pub wallet: Arc<dyn WalletProvider>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/plan", get(get_status).put(load_plan).delete(clear_plan))
        .route("/approvals/next", post(submit_next_approval))
        .route("/main", post(submit_main))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> ExecutorResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ExecutorError::Internal(format!("api bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| ExecutorError::Internal(format!("api server: {}", e)))
}

/// Liveness plus the wallet's view of the world
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        account: state.wallet.connected_address().await,
        network: state.wallet.current_network().await,
    })
}

async fn get_status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine.status(state.wallet.as_ref()).await)
}

async fn load_plan(
    State(state): State<AppState>,
    Json(request): Json<PlanRequest>,
) -> Result<Json<EngineStatus>, ApiError> {
    let plan = request.into_plan()?;
    state
        .engine
        .set_plan(Arc::new(plan), state.wallet.as_ref())
        .await;
    Ok(Json(state.engine.status(state.wallet.as_ref()).await))
}

async fn clear_plan(State(state): State<AppState>) -> Json<EngineStatus> {
    state.engine.clear_plan(state.wallet.as_ref()).await;
    Json(state.engine.status(state.wallet.as_ref()).await)
}

/// Claims the next approval and sends it in the background. Answers 202 with
/// the snapshot taken after the claim, or 409 if nothing was eligible.
async fn submit_next_approval(
    State(state): State<AppState>,
) -> (StatusCode, Json<ExecutionSnapshot>) {
    let claimed = state.engine.claim_approval(state.wallet.as_ref()).await;
    start(state, claimed).await
}

async fn submit_main(State(state): State<AppState>) -> (StatusCode, Json<ExecutionSnapshot>) {
    let claimed = state.engine.claim_main(state.wallet.as_ref()).await;
    start(state, claimed).await
}

async fn start(
    state: AppState,
    claimed: Option<ClaimedAction>,
) -> (StatusCode, Json<ExecutionSnapshot>) {
    let snapshot = state.engine.snapshot(state.wallet.as_ref()).await;
    let Some(action) = claimed else {
        return (StatusCode::CONFLICT, Json(snapshot));
    };

    debug!("Starting {}", action.phase());
    let AppState { engine, wallet } = state;
    tokio::spawn(async move {
        engine.complete(wallet.as_ref(), action).await;
    });
    (StatusCode::ACCEPTED, Json(snapshot))
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    account: Option<Address>,
    network: u64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

struct ApiError(ExecutorError);

impl From<ExecutorError> for ApiError {
    fn from(err: ExecutorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ExecutorError::InvalidTransactionShape(_) | ExecutorError::UnknownNetwork { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!("Request failed: {}", self.0);
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainRegistry;
    use crate::config::ExecutorConfig;
    use crate::tx::{FeeCalculator, TransactionSubmitter};
    use crate::wallet::testing::FakeWallet;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    const USDC: &str = "0xaf88d065e77c8cC2239327C5EDb3A432268e5831";
    const ROUTER: &str = "0xE592427A0AEce92De3Edee1F18E0157C05861564";

    fn app_state() -> (AppState, Arc<FakeWallet>) {
        let wallet = Arc::new(FakeWallet::new(42161));
        let engine = ExecutionEngine::new(TransactionSubmitter::new(
            Arc::new(ChainRegistry::with_defaults()),
            FeeCalculator::new(&ExecutorConfig::default()),
        ));
        let state = AppState {
            engine: Arc::new(engine),
            wallet: wallet.clone(),
        };
        (state, wallet)
    }

    async fn call(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    async fn wait_for(state: &AppState, check: impl Fn(&ExecutionSnapshot) -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snapshot = state.engine.snapshot(state.wallet.as_ref()).await;
                if check(&snapshot) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    fn swap_plan() -> Value {
        json!({
            "transactions": [
                { "to": USDC, "data": "0x095ea7b3", "chainId": "arbitrum" },
                { "to": ROUTER, "data": "0x414bf389", "chainId": 42161, "value": "0x0" }
            ]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = app_state();
        let (status, body) = call(&state, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["network"], 42161);
    }

    #[tokio::test]
    async fn test_status_without_plan() {
        let (state, _) = app_state();
        let (status, body) = call(&state, "GET", "/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["planId"], Value::Null);
        assert_eq!(body["canSubmitApproval"], false);
        assert_eq!(body["canSubmitMain"], false);
    }

    #[tokio::test]
    async fn test_load_plan_and_execute() {
        let (state, wallet) = app_state();

        let (status, body) = call(&state, "PUT", "/plan", Some(swap_plan())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalApprovals"], 1);
        assert_eq!(body["totalTransactions"], 2);
        assert_eq!(body["canSubmitApproval"], true);

        let (status, _) = call(&state, "POST", "/main", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&state, "POST", "/approvals/next", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["approvalIndex"], 0);
        assert_eq!(body["isApprovalBusy"], true);
        wait_for(&state, |s| s.approval_index == 1 && !s.is_approval_busy).await;

        let (status, _) = call(&state, "POST", "/main", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        wait_for(&state, |s| s.main_succeeded).await;

        assert_eq!(wallet.submit_calls(), 2);
        let (_, body) = call(&state, "GET", "/status", None).await;
        assert_eq!(body["canSubmitMain"], false);
        assert!(body["mainTxHash"].is_string());
    }

    #[tokio::test]
    async fn test_racing_main_requests_accept_once() {
        let (state, wallet) = app_state();
        wallet.delay_submissions(Duration::from_millis(50));
        let plan = json!({
            "transactions": [{ "to": ROUTER, "data": "0x414bf389", "chainId": 42161 }]
        });
        call(&state, "PUT", "/plan", Some(plan)).await;

        let (first, second) = tokio::join!(
            call(&state, "POST", "/main", None),
            call(&state, "POST", "/main", None),
        );
        let mut codes = vec![first.0, second.0];
        codes.sort();
        assert_eq!(codes, vec![StatusCode::ACCEPTED, StatusCode::CONFLICT]);

        let accepted = if first.0 == StatusCode::ACCEPTED { first.1 } else { second.1 };
        assert_eq!(accepted["isMainBusy"], true);
        assert_eq!(accepted["canSubmitMain"], false);

        wait_for(&state, |s| s.main_succeeded).await;
        assert_eq!(wallet.submit_calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_plan_rejected() {
        let (state, _) = app_state();
        let plan = json!({
            "transactions": [{ "to": "0x1234", "data": "0x", "chainId": 1 }]
        });
        let (status, body) = call(&state, "PUT", "/plan", Some(plan)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("transaction 0"));
        assert!(state.engine.plan().await.is_none());

        let (status, _) = call(&state, "PUT", "/plan", Some(json!({ "txs": [] }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_network_surfaces_on_submit() {
        let (state, wallet) = app_state();
        let plan = json!({
            "transactions": [{ "to": ROUTER, "data": "0x", "chainId": "atlantis" }]
        });
        let (status, _) = call(&state, "PUT", "/plan", Some(plan)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&state, "POST", "/main", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        wait_for(&state, |s| s.main_error.is_some()).await;

        let (_, body) = call(&state, "GET", "/status", None).await;
        assert_eq!(body["mainError"], "Unknown network: atlantis");
        assert_eq!(body["canSubmitMain"], true);
        assert_eq!(wallet.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_clear_plan() {
        let (state, _) = app_state();
        call(&state, "PUT", "/plan", Some(swap_plan())).await;
        assert!(state.engine.plan().await.is_some());

        let (status, body) = call(&state, "DELETE", "/plan", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["planId"], Value::Null);
        assert!(state.engine.plan().await.is_none());
    }
}
