//! Shared test utilities for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use settler::domain::error::{PriceError, SettlerError};
use settler::domain::forecast::{
    Direction, Forecast, Loaded, MalformedForecast, Resolution, Status,
};
use settler::domain::price::{PriceReading, SourceKind};
use settler::ports::forecast_store::ForecastStore;
use settler::ports::price_port::PriceSource;

struct Entry {
    parent_id: Option<String>,
    loaded: Loaded,
    /// Row as first inserted, served back when reads are stale.
    inserted: Loaded,
    price_updates: usize,
}

impl Entry {
    fn new(parent_id: Option<String>, loaded: Loaded) -> Self {
        Self {
            parent_id,
            inserted: loaded.clone(),
            loaded,
            price_updates: 0,
        }
    }

    fn read(&self, stale_reads: bool) -> Option<Loaded> {
        let row = if stale_reads { &self.inserted } else { &self.loaded };
        match row {
            Ok(f) if !f.status.is_open() => None,
            _ => Some(row.clone()),
        }
    }
}

#[derive(Default)]
struct StoreState {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    fail_list: bool,
    fail_updates: HashSet<String>,
    fail_resolves: HashSet<String>,
    fail_children: HashSet<String>,
    stale_reads: bool,
    resolve_writes: usize,
}

/// In-memory forecast store with failure injection.
#[derive(Default)]
pub struct MockForecastStore {
    state: Mutex<StoreState>,
}

impl MockForecastStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, forecast: Forecast) -> Self {
        self.insert(forecast);
        self
    }

    pub fn with_all(self, forecasts: impl IntoIterator<Item = Forecast>) -> Self {
        for f in forecasts {
            self.insert(f);
        }
        self
    }

    pub fn with_malformed(self, id: &str, parent_id: Option<&str>, reason: &str) -> Self {
        let mut state = self.state.lock().unwrap();
        let slot = state.entries.len();
        state.entries.push(Entry::new(
            parent_id.map(str::to_string),
            Err(MalformedForecast {
                id: id.to_string(),
                reason: reason.to_string(),
            }),
        ));
        state.index.insert(id.to_string(), slot);
        drop(state);
        self
    }

    pub fn failing_list(self) -> Self {
        self.state.lock().unwrap().fail_list = true;
        self
    }

    pub fn failing_update(self, id: &str) -> Self {
        self.state.lock().unwrap().fail_updates.insert(id.to_string());
        self
    }

    pub fn failing_resolve(self, id: &str) -> Self {
        self.state.lock().unwrap().fail_resolves.insert(id.to_string());
        self
    }

    pub fn failing_children(self, parent_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_children
            .insert(parent_id.to_string());
        self
    }

    /// List operations see rows as first inserted, like a replica that has
    /// not caught up with writes.
    pub fn with_stale_reads(self) -> Self {
        self.state.lock().unwrap().stale_reads = true;
        self
    }

    pub fn insert(&self, forecast: Forecast) {
        let mut state = self.state.lock().unwrap();
        let id = forecast.id.clone();
        let entry = Entry::new(forecast.parent_id.clone(), Ok(forecast));
        match state.index.get(&id).copied() {
            Some(slot) => state.entries[slot] = entry,
            None => {
                let slot = state.entries.len();
                state.entries.push(entry);
                state.index.insert(id, slot);
            }
        }
    }

    pub fn get(&self, id: &str) -> Forecast {
        let state = self.state.lock().unwrap();
        let slot = state.index[id];
        state.entries[slot]
            .loaded
            .clone()
            .unwrap_or_else(|m| panic!("forecast {id} is malformed: {}", m.reason))
    }

    pub fn resolution(&self, id: &str) -> Option<Resolution> {
        self.get(id).status.resolution().cloned()
    }

    pub fn price_updates(&self, id: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.entries[state.index[id]].price_updates
    }

    /// Number of conditional resolves that actually changed a row.
    pub fn resolve_writes(&self) -> usize {
        self.state.lock().unwrap().resolve_writes
    }

    fn list_where(&self, parent: Option<&str>) -> Vec<Loaded> {
        let state = self.state.lock().unwrap();
        state
            .entries
            .iter()
            .filter(|e| parent.is_none_or(|p| e.parent_id.as_deref() == Some(p)))
            .filter_map(|e| e.read(state.stale_reads))
            .collect()
    }
}

impl ForecastStore for MockForecastStore {
    fn list_open(&self) -> Result<Vec<Loaded>, SettlerError> {
        if self.state.lock().unwrap().fail_list {
            return Err(SettlerError::Database {
                reason: "connection refused".into(),
            });
        }
        Ok(self.list_where(None))
    }

    fn update_current_price(
        &self,
        id: &str,
        price: f64,
        _at: DateTime<Utc>,
    ) -> Result<bool, SettlerError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_updates.contains(id) {
            return Err(SettlerError::DatabaseQuery {
                reason: format!("write to {id} rejected"),
            });
        }
        let Some(slot) = state.index.get(id).copied() else {
            return Ok(false);
        };
        let entry = &mut state.entries[slot];
        match entry.loaded.as_mut() {
            Ok(f) if f.status.is_open() => f.current_price = Some(price),
            _ => return Ok(false),
        }
        entry.price_updates += 1;
        Ok(true)
    }

    fn resolve_if_open(&self, id: &str, resolution: &Resolution) -> Result<bool, SettlerError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_resolves.contains(id) {
            return Err(SettlerError::DatabaseQuery {
                reason: format!("resolve of {id} rejected"),
            });
        }
        let Some(slot) = state.index.get(id).copied() else {
            return Ok(false);
        };
        let changed = match state.entries[slot].loaded.as_mut() {
            Ok(f) if f.status.is_open() => {
                f.status = Status::Resolved(resolution.clone());
                true
            }
            _ => false,
        };
        if changed {
            state.resolve_writes += 1;
        }
        Ok(changed)
    }

    fn list_open_children(&self, parent_id: &str) -> Result<Vec<Loaded>, SettlerError> {
        if self.state.lock().unwrap().fail_children.contains(parent_id) {
            return Err(SettlerError::DatabaseQuery {
                reason: format!("children of {parent_id} unavailable"),
            });
        }
        Ok(self.list_where(Some(parent_id)))
    }

    fn find(&self, id: &str) -> Result<Option<Loaded>, SettlerError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .index
            .get(id)
            .map(|&slot| state.entries[slot].loaded.clone()))
    }
}

/// Price source answering from a fixed table; unknown tickers have no data.
#[derive(Default)]
pub struct MockPriceSource {
    quotes: HashMap<String, Result<(f64, f64, f64), String>>,
    calls: Mutex<HashMap<String, usize>>,
    total_calls: AtomicUsize,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quote as `(current, daily_high, daily_low)`.
    pub fn with_quote(mut self, ticker: &str, current: f64, high: f64, low: f64) -> Self {
        self.quotes
            .insert(ticker.to_string(), Ok((current, high, low)));
        self
    }

    pub fn with_flat(self, ticker: &str, price: f64) -> Self {
        self.with_quote(ticker, price, price, price)
    }

    pub fn with_outage(mut self, ticker: &str, reason: &str) -> Self {
        self.quotes
            .insert(ticker.to_string(), Err(reason.to_string()));
        self
    }

    pub fn calls_for(&self, ticker: &str) -> usize {
        self.calls.lock().unwrap().get(ticker).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

impl PriceSource for MockPriceSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn fetch(&self, ticker: &str) -> Result<PriceReading, PriceError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(ticker.to_string())
            .or_default() += 1;

        match self.quotes.get(ticker) {
            Some(Ok((current, high, low))) => Ok(reading(ticker, *current, *high, *low)),
            Some(Err(reason)) => Err(PriceError::Network(reason.clone())),
            None => Err(PriceError::NoData {
                ticker: ticker.to_string(),
            }),
        }
    }
}

pub fn reading(ticker: &str, current: f64, high: f64, low: f64) -> PriceReading {
    PriceReading {
        ticker: ticker.to_string(),
        current,
        daily_high: high,
        daily_low: low,
        source: SourceKind::YahooTw,
        fetched_at: Utc::now(),
    }
}

/// Open forecast with bounds `floor < start < ceiling`.
pub fn forecast(
    id: &str,
    ticker: &str,
    direction: Direction,
    start: f64,
    floor: f64,
    ceiling: f64,
    confidence: u8,
) -> Forecast {
    Forecast {
        id: id.to_string(),
        ticker: ticker.to_string(),
        direction,
        floor,
        ceiling,
        start_price: start,
        current_price: None,
        confidence,
        status: Status::Open,
        parent_id: None,
    }
}

pub fn up(id: &str, ticker: &str) -> Forecast {
    forecast(id, ticker, Direction::Up, 100.0, 90.0, 120.0, 5)
}

pub fn follower(mut f: Forecast, parent_id: &str) -> Forecast {
    f.parent_id = Some(parent_id.to_string());
    f
}

/// Exchange-local wall time in Taipei, as UTC.
pub fn taipei(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    FixedOffset::east_opt(8 * 3600)
        .unwrap()
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
        .with_timezone(&Utc)
}
