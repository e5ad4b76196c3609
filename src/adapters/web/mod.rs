//! HTTP trigger adapter.
//!
//! Exposes the resolution pass to an external scheduler and a one-off price
//! lookup. Both routes answer JSON.

mod error;
mod handlers;

pub use error::WebError;
pub use handlers::*;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::domain::trading_window::TradingWindow;
use crate::ports::forecast_store::ForecastStore;
use crate::ports::price_port::PriceSource;

pub struct AppState {
    pub store: Arc<dyn ForecastStore + Send + Sync>,
    pub prices: Arc<dyn PriceSource + Send + Sync>,
    pub window: TradingWindow,
    /// Bearer token for the trigger; `None` leaves it open.
    pub cron_secret: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/workers/price-monitor", get(handlers::run_price_monitor))
        .route("/api/stocks/price", get(handlers::stock_price))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
