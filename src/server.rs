//! HTTP surface
//!
//! Thin handlers over [`TradingAgent`](crate::agent::TradingAgent). Every failure is answered with a 500
//! and a `{ error, details }` body; the health endpoint always answers 200 and
//! reports a failed agent construction in its payload.

use crate::agent::AgentStatus;
use crate::config::ServerConfig;
use crate::pool::{PoolState, TradeEstimate};
use crate::tokens::NATIVE_SYMBOL;
use crate::{Error, Result};
use alloy::primitives::Address;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// USD amount quoted when `/estimate-trade` is called without one
pub const DEFAULT_ESTIMATE_USD: f64 = 1.0;

#[derive(Clone)]
pub struct AppState {
    status: AgentStatus,
}

impl AppState {
    pub fn new(status: AgentStatus) -> Self {
        Self { status }
    }
}

/// Uniform error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: String,
}

/// Handler failure, rendered as 500 `{ error, details }`
#[derive(Debug)]
pub struct ApiError {
    context: &'static str,
    source: Error,
}

impl ApiError {
    fn new(context: &'static str) -> impl Fn(Error) -> Self + Copy {
        move |source| Self { context, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.source, "{}", self.context);
        let body = ErrorBody {
            error: self.context.to_string(),
            details: self.source.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub wallet: String,
    pub error: Option<String>,
    pub initialization: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PriceResponse {
    pub price: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub wallet: String,
    /// Token address, or the native symbol
    pub asset: String,
    pub balance: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct EstimateParams {
    pub amount_usd: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BalanceParams {
    pub token: Option<String>,
}

pub fn router(status: AgentStatus) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/price", get(price))
        .route("/estimate-trade", get(estimate_trade))
        .route("/balance", get(balance))
        .route("/pool-state", get(pool_state))
        .layer(middleware::from_fn(request_span))
        .with_state(AppState::new(status))
}

/// Bind the listener and serve until the process is stopped
pub async fn serve(config: &ServerConfig, status: AgentStatus) -> Result<()> {
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, ready = status.is_ready(), "HTTP server listening");

    axum::serve(listener, router(status)).await?;
    Ok(())
}

/// Wrap each request in a span carrying a fresh correlation id
async fn request_span(request: Request, next: Next) -> Response {
    let span = info_span!(
        "request",
        id = %Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
    );
    next.run(request).instrument(span).await
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let response = match &state.status {
        AgentStatus::Ready(agent) => HealthResponse {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            wallet: agent.wallet().address_string(),
            error: None,
            initialization: "success".to_string(),
        },
        AgentStatus::Failed { error, .. } => HealthResponse {
            status: "error".to_string(),
            timestamp: Utc::now(),
            wallet: "not initialized".to_string(),
            error: Some(error.clone()),
            initialization: "failed".to_string(),
        },
    };
    Json(response)
}

pub async fn price(
    State(state): State<AppState>,
) -> std::result::Result<Json<PriceResponse>, ApiError> {
    let to_api = ApiError::new("Failed to fetch price");
    let agent = state.status.agent().map_err(to_api)?;
    let price = agent.check_price().await.map_err(to_api)?;
    Ok(Json(PriceResponse { price }))
}

pub async fn estimate_trade(
    State(state): State<AppState>,
    Query(params): Query<EstimateParams>,
) -> std::result::Result<Json<TradeEstimate>, ApiError> {
    let to_api = ApiError::new("Failed to estimate trade");
    let agent = state.status.agent().map_err(to_api)?;
    let amount_usd = params.amount_usd.unwrap_or(DEFAULT_ESTIMATE_USD);
    let estimate = agent
        .estimate_micro_trade(amount_usd)
        .await
        .map_err(to_api)?;
    Ok(Json(estimate))
}

pub async fn balance(
    State(state): State<AppState>,
    Query(params): Query<BalanceParams>,
) -> std::result::Result<Json<BalanceResponse>, ApiError> {
    let to_api = ApiError::new("Failed to fetch balance");
    let agent = state.status.agent().map_err(to_api)?;

    let token = match params.token.as_deref() {
        Some(raw) => match raw.parse::<Address>() {
            Ok(token) => Some(token),
            Err(e) => {
                return Err(to_api(Error::Config(format!(
                    "invalid token address '{}': {}",
                    raw, e
                ))))
            }
        },
        None => None,
    };

    let balance = agent.get_balance(token).await.map_err(to_api)?;
    Ok(Json(BalanceResponse {
        wallet: agent.wallet().address_string(),
        asset: token
            .map(|t| t.to_checksum(None))
            .unwrap_or_else(|| NATIVE_SYMBOL.to_string()),
        balance,
    }))
}

pub async fn pool_state(
    State(state): State<AppState>,
) -> std::result::Result<Json<PoolState>, ApiError> {
    let to_api = ApiError::new("Failed to fetch pool state");
    let agent = state.status.agent().map_err(to_api)?;
    let pool_state = agent.pool_state().await.map_err(to_api)?;
    Ok(Json(pool_state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::Harness;
    use axum::body::to_bytes;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn ready(harness: &Harness) -> AppState {
        AppState::new(AgentStatus::Ready(Arc::new(harness.agent())))
    }

    fn failed() -> AppState {
        AppState::new(AgentStatus::from_result(Err(Error::Wallet(
            "Invalid private key".to_string(),
        ))))
    }

    async fn error_body(err: ApiError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_ready_agent() {
        let harness = Harness::new();
        let Json(health) = health(State(ready(&harness))).await;

        assert_eq!(health.status, "ok");
        assert_eq!(health.initialization, "success");
        assert!(health.error.is_none());
        assert!(health.wallet.starts_with("0x"));
    }

    #[tokio::test]
    async fn health_reports_degraded_mode() {
        let Json(health) = health(State(failed())).await;

        assert_eq!(health.status, "error");
        assert_eq!(health.initialization, "failed");
        assert_eq!(health.wallet, "not initialized");
        assert!(health.error.unwrap().contains("Invalid private key"));
    }

    #[tokio::test]
    async fn price_returns_reserve_ratio() {
        let harness = Harness::new();
        let Json(response) = price(State(ready(&harness))).await.unwrap();
        assert_eq!(response.price, dec!(2));
    }

    #[tokio::test]
    async fn estimate_defaults_to_one_usd() {
        let harness = Harness::new();
        let Json(estimate) = estimate_trade(State(ready(&harness)), Query(EstimateParams::default()))
            .await
            .unwrap();

        assert_eq!(estimate.amount_in, dec!(0.5));
        assert_eq!(harness.pool.quote_calls(), vec![(dec!(0.5), dec!(0.01))]);
    }

    #[tokio::test]
    async fn invalid_amount_is_500_with_details() {
        let harness = Harness::new();
        let err = estimate_trade(
            State(ready(&harness)),
            Query(EstimateParams {
                amount_usd: Some(-1.0),
            }),
        )
        .await
        .unwrap_err();

        let (status, body) = error_body(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Failed to estimate trade");
        assert!(body.details.contains("Invalid amount"));
    }

    #[tokio::test]
    async fn degraded_agent_fails_price_with_500() {
        let err = price(State(failed())).await.unwrap_err();
        let (status, body) = error_body(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Failed to fetch price");
        assert!(body.details.contains("Invalid private key"));
    }

    #[tokio::test]
    async fn balance_rejects_malformed_token() {
        let harness = Harness::new();
        let err = balance(
            State(ready(&harness)),
            Query(BalanceParams {
                token: Some("not-an-address".to_string()),
            }),
        )
        .await
        .unwrap_err();

        let (status, _) = error_body(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(harness.balances.calls(), 0);
    }

    #[tokio::test]
    async fn balance_defaults_to_native_zero() {
        let harness = Harness::new();
        let Json(response) = balance(State(ready(&harness)), Query(BalanceParams::default()))
            .await
            .unwrap();

        assert_eq!(response.balance, Decimal::ZERO);
        assert_eq!(response.asset, NATIVE_SYMBOL);
    }

    #[tokio::test]
    async fn pool_state_is_served() {
        let harness = Harness::new();
        let Json(state) = pool_state(State(ready(&harness))).await.unwrap();
        assert_eq!(state.token_a_balance, "100");
        assert_eq!(state.token_b_balance, "200");
    }
}
