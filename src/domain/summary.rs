//! Per-run summary returned to whoever triggered the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub trading_window_open: bool,
    pub total_open: usize,
    pub unique_instruments: usize,
    pub price_updates: usize,
    pub resolutions: usize,
    pub chain_resolutions: usize,
    pub errors: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, trading_window_open: bool) -> Self {
        Self {
            started_at,
            trading_window_open,
            total_open: 0,
            unique_instruments: 0,
            price_updates: 0,
            resolutions: 0,
            chain_resolutions: 0,
            errors: 0,
            duration_ms: 0,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "market {}, {} open across {} tickers, {} prices updated, {} resolved (+{} chained), {} errors in {}ms",
            if self.trading_window_open { "open" } else { "closed" },
            self.total_open,
            self.unique_instruments,
            self.price_updates,
            self.resolutions,
            self.chain_resolutions,
            self.errors,
            self.duration_ms,
        )
    }
}
