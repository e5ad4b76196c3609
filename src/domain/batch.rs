//! One pass over every open forecast.
//!
//! Forecasts are grouped by ticker so each instrument is priced once. A
//! failing ticker or a failing forecast is logged and counted, and the rest
//! of the batch carries on.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::cascade::cascade;
use crate::domain::error::SettlerError;
use crate::domain::evaluator::evaluate;
use crate::domain::forecast::{Forecast, status_code};
use crate::domain::price::PriceReading;
use crate::domain::summary::RunSummary;
use crate::domain::trading_window::TradingWindow;
use crate::ports::forecast_store::ForecastStore;
use crate::ports::price_port::PriceSource;

pub struct BatchRunner<'a> {
    store: &'a dyn ForecastStore,
    prices: &'a dyn PriceSource,
    window: TradingWindow,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        store: &'a dyn ForecastStore,
        prices: &'a dyn PriceSource,
        window: TradingWindow,
    ) -> Self {
        Self {
            store,
            prices,
            window,
        }
    }

    pub fn run_once(&self) -> Result<RunSummary, SettlerError> {
        self.run_at(Utc::now())
    }

    /// Run with an explicit clock. Only a failure to list open forecasts is
    /// returned as an error; everything after that is counted in the summary.
    pub fn run_at(&self, now: DateTime<Utc>) -> Result<RunSummary, SettlerError> {
        let started = Instant::now();
        let mut summary = RunSummary::new(now, self.window.is_open_at(now));
        info!(
            market_open = summary.trading_window_open,
            "starting resolution run"
        );

        let loaded = self.store.list_open()?;
        summary.total_open = loaded.len();

        let mut groups: Vec<(String, Vec<Forecast>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for row in loaded {
            match row {
                Ok(forecast) => {
                    let slot = *index.entry(forecast.ticker.clone()).or_insert_with(|| {
                        groups.push((forecast.ticker.clone(), Vec::new()));
                        groups.len() - 1
                    });
                    groups[slot].1.push(forecast);
                }
                Err(malformed) => {
                    warn!(id = %malformed.id, reason = %malformed.reason, "skipping malformed forecast");
                    summary.errors += 1;
                }
            }
        }
        summary.unique_instruments = groups.len();
        info!(
            open = summary.total_open,
            tickers = summary.unique_instruments,
            "fetching prices"
        );

        for (ticker, forecasts) in &groups {
            let reading = match self.prices.fetch(ticker) {
                Ok(r) => r,
                Err(e) => {
                    error!(%ticker, error = %e, skipped = forecasts.len(), "price unavailable");
                    summary.errors += 1;
                    continue;
                }
            };
            info!(
                %ticker,
                price = reading.current,
                high = reading.daily_high,
                low = reading.daily_low,
                source = %reading.source,
                "price reading"
            );

            for forecast in forecasts {
                self.process(forecast, &reading, now, &mut summary);
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(%summary, "resolution run finished");
        Ok(summary)
    }

    fn process(
        &self,
        forecast: &Forecast,
        reading: &PriceReading,
        now: DateTime<Utc>,
        summary: &mut RunSummary,
    ) {
        let evaluation = evaluate(forecast, reading, now);

        match self
            .store
            .update_current_price(&forecast.id, evaluation.current_price, now)
        {
            Ok(true) => summary.price_updates += 1,
            Ok(false) => {
                // Closed elsewhere since the list was read.
                debug!(id = %forecast.id, "forecast no longer open, skipping");
                return;
            }
            Err(e) => {
                error!(id = %forecast.id, error = %e, "failed to update current price");
                summary.errors += 1;
                return;
            }
        }

        let Some(resolution) = evaluation.resolution else {
            return;
        };

        match self.store.resolve_if_open(&forecast.id, &resolution) {
            Ok(true) => {
                summary.resolutions += 1;
                info!(
                    id = %forecast.id,
                    ticker = %forecast.ticker,
                    status = status_code(resolution.outcome, resolution.mode),
                    end_price = resolution.end_price,
                    profit_rate = resolution.profit_rate,
                    "resolved forecast"
                );
                let chain = cascade(
                    self.store,
                    &forecast.id,
                    resolution.end_price,
                    resolution.outcome,
                    now,
                );
                summary.chain_resolutions += chain.resolved;
                summary.errors += chain.failures();
            }
            Ok(false) => {
                debug!(id = %forecast.id, "forecast already resolved, skipping");
            }
            Err(e) => {
                error!(id = %forecast.id, error = %e, "failed to persist resolution");
                summary.errors += 1;
            }
        }
    }
}
