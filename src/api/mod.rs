//! HTTP API for quoting, order lifecycle and secret release
//!
//! Every failure is answered with a 5xx status and `{ "error": message }`.
//! Responses carry swap state and last error, never secret values.

use crate::config::ApiConfig;
use crate::coordination::{OrderCoordinator, PollOutcome};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::ledger::{SqliteLedger, TransitionRecord};
use crate::orderbook::{Quote, SwapParams};
use crate::swap::{FillStatus, Preset, SwapView};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<OrderCoordinator>,
    pub ledger: Arc<SqliteLedger>,
}

type ApiResult<T> = Result<Json<T>, CoordinatorError>;

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = if self.is_retryable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        warn!("Request failed: {}", self);

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/quote", post(get_quote))
        .route("/orders", post(create_order))
        .route("/orders/:id/submit", post(submit_order))
        .route("/orders/:id/status", get(order_status))
        .route("/orders/:id/ready-fills", get(ready_fills))
        .route("/orders/:id/poll", post(poll_order))
        .route("/orders/:id/secrets", post(submit_secret))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/history", get(order_history))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> CoordinatorResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CoordinatorError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| CoordinatorError::Internal(e.to_string()))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - ledger reachable
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let ledger_ok = state.ledger.health_check().await.is_ok();
    let status = if ledger_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready: ledger_ok,
            ledger: ledger_ok,
            active_swaps: state.coordinator.active_swaps(),
        }),
    )
}

async fn get_quote(
    State(state): State<AppState>,
    Json(params): Json<SwapParams>,
) -> ApiResult<Quote> {
    Ok(Json(state.coordinator.request_quote(&params).await?))
}

async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<SwapView> {
    let view = state
        .coordinator
        .create_order(request.params, request.preset, request.expires_at)
        .await?;
    Ok(Json(view))
}

async fn submit_order(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<SwapView> {
    Ok(Json(state.coordinator.submit_order(&id).await?))
}

async fn order_status(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<SwapView> {
    Ok(Json(state.coordinator.status(&id).await?))
}

async fn ready_fills(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ReadyFillsResponse> {
    let fills = state.coordinator.ready_fills(&id).await?;
    Ok(Json(ReadyFillsResponse { fills }))
}

async fn poll_order(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<PollOutcome> {
    Ok(Json(state.coordinator.poll_once(&id).await?))
}

async fn submit_secret(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SubmitSecretRequest>,
) -> ApiResult<SwapView> {
    Ok(Json(state.coordinator.release_secret(&id, request.index).await?))
}

async fn cancel_order(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<SwapView> {
    Ok(Json(state.coordinator.cancel(&id).await?))
}

async fn order_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<TransitionRecord>> {
    Ok(Json(state.coordinator.history(&id).await?))
}

// Request and response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest {
    #[serde(flatten)]
    params: SwapParams,
    #[serde(default)]
    preset: Option<Preset>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct SubmitSecretRequest {
    index: u32,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadinessResponse {
    ready: bool,
    ledger: bool,
    active_swaps: usize,
}

#[derive(Serialize)]
struct ReadyFillsResponse {
    fills: Vec<FillStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::record::fixtures::{params, quote};
    use crate::testing::{open_ledger, test_config, FakeOracle, FakeOrderBook};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn app(secrets_count: u32) -> (TempDir, Arc<FakeOrderBook>, Router) {
        let (dir, ledger) = open_ledger().await;
        let ledger = Arc::new(ledger);
        let book = Arc::new(FakeOrderBook::new());
        let coordinator = Arc::new(OrderCoordinator::new(
            Arc::new(FakeOracle::new(quote(secrets_count))),
            book.clone(),
            ledger.clone(),
            test_config(),
        ));
        let app = router(AppState {
            coordinator,
            ledger,
        });
        (dir, book, app)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, _book, app) = app(1).await;
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = call(&app, "GET", "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
    }

    #[tokio::test]
    async fn test_quote() {
        let (_dir, _book, app) = app(3).await;
        let request = serde_json::to_value(params()).unwrap();
        let (status, body) = call(&app, "POST", "/quote", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quoteId"], "quote-3");
        assert_eq!(body["presets"]["fast"]["secretsCount"], 3);
    }

    #[tokio::test]
    async fn test_order_lifecycle() {
        let (_dir, book, app) = app(1).await;

        let mut request = serde_json::to_value(params()).unwrap();
        request["preset"] = json!("fast");
        let (status, created) = call(&app, "POST", "/orders", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["state"], "order_built");
        let swap_id = created["swapId"].as_str().unwrap().to_string();

        let (status, submitted) =
            call(&app, "POST", &format!("/orders/{}/submit", swap_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(submitted["state"], "awaiting_fills");
        let order_hash = submitted["orderHash"].as_str().unwrap().to_string();

        book.mark_ready(&order_hash, 0);
        let (status, fills) =
            call(&app, "GET", &format!("/orders/{}/ready-fills", order_hash), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fills["fills"].as_array().unwrap().len(), 2);

        let (status, released) = call(
            &app,
            "POST",
            &format!("/orders/{}/secrets", order_hash),
            Some(json!({ "index": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(released["state"], "secrets_released");
        assert_eq!(released["released"], json!([0]));
        assert!(released.get("secrets").is_none());

        let (status, view) =
            call(&app, "GET", &format!("/orders/{}/status", swap_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["orderHash"], order_hash.as_str());

        let (status, history) =
            call(&app, "GET", &format!("/orders/{}/history", order_hash), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_premature_secret_is_an_error() {
        let (_dir, _book, app) = app(2).await;
        let request = serde_json::to_value(params()).unwrap();
        let (_, created) = call(&app, "POST", "/orders", Some(request)).await;
        let swap_id = created["swapId"].as_str().unwrap().to_string();
        call(&app, "POST", &format!("/orders/{}/submit", swap_id), None).await;

        let (status, body) = call(
            &app,
            "POST",
            &format!("/orders/{}/secrets", swap_id),
            Some(json!({ "index": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("before its fill was ready"));
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (_dir, _book, app) = app(1).await;
        let (status, body) = call(&app, "GET", "/orders/0xmissing/status", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_cancel_before_submission() {
        let (_dir, _book, app) = app(1).await;
        let request = serde_json::to_value(params()).unwrap();
        let (_, created) = call(&app, "POST", "/orders", Some(request)).await;
        let swap_id = created["swapId"].as_str().unwrap().to_string();

        let (status, cancelled) =
            call(&app, "POST", &format!("/orders/{}/cancel", swap_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cancelled["state"], "failed");
        assert_eq!(cancelled["cancelled"], true);

        let (status, _) = call(&app, "POST", &format!("/orders/{}/submit", swap_id), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
