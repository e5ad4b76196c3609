//! HTTP request handlers for the web adapter.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, header},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use crate::domain::batch::BatchRunner;
use crate::domain::price::PriceReading;
use crate::domain::summary::RunSummary;

use super::{AppState, WebError};

/// Trigger response: the run summary flattened next to a success flag.
#[derive(Debug, Serialize)]
pub struct MonitorResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: RunSummary,
}

#[derive(Debug, Serialize)]
pub struct PriceResponse {
    pub success: bool,
    #[serde(flatten)]
    pub reading: PriceReading,
}

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    pub ticker: Option<String>,
}

fn authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == secret)
}

pub async fn run_price_monitor(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MonitorResponse>, WebError> {
    if !authorized(&headers, state.cron_secret.as_deref()) {
        warn!("rejected price monitor trigger without a valid bearer token");
        return Err(WebError::unauthorized());
    }

    let store = Arc::clone(&state.store);
    let prices = Arc::clone(&state.prices);
    let window = state.window;

    // Store and price sources block; keep them off the async workers.
    let summary = tokio::task::spawn_blocking(move || {
        BatchRunner::new(store.as_ref(), prices.as_ref(), window).run_once()
    })
    .await
    .map_err(|e| {
        error!(error = %e, "resolution run panicked");
        WebError::internal(e.to_string())
    })??;

    Ok(Json(MonitorResponse {
        success: true,
        summary,
    }))
}

pub async fn stock_price(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PriceQuery>,
) -> Result<Json<PriceResponse>, WebError> {
    let ticker = query
        .ticker
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| WebError::bad_request("Ticker is required"))?;

    let prices = Arc::clone(&state.prices);
    let reading = tokio::task::spawn_blocking(move || prices.fetch(&ticker))
        .await
        .map_err(|e| WebError::internal(e.to_string()))??;

    Ok(Json(PriceResponse {
        success: true,
        reading,
    }))
}

pub async fn not_found() -> WebError {
    WebError::not_found("Not found")
}
