//! Forecast representation and validation of persisted rows.
//!
//! A [`Forecast`] is only ever built through [`ForecastRow::validate`], so the
//! evaluator never sees a record with missing fields or an unknown status.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::domain::error::SettlerError;

pub const MIN_CONFIDENCE: u8 = 1;
pub const MAX_CONFIDENCE: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    /// Accepts the stored names as well as the numeric `1` / `-1` encoding.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "up" | "1" | "bull" => Some(Direction::Up),
            "down" | "-1" | "bear" => Some(Direction::Down),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    Auto,
    Manual,
}

/// Settlement fields, always written together with the status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcome: Outcome,
    pub mode: ResolutionMode,
    pub end_price: f64,
    pub profit_rate: f64,
    pub profit_rate_adjusted: f64,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Open,
    Resolved(Resolution),
}

impl Status {
    pub fn is_open(&self) -> bool {
        matches!(self, Status::Open)
    }

    /// Persisted status code.
    pub fn code(&self) -> &'static str {
        match self {
            Status::Open => STATUS_OPEN,
            Status::Resolved(r) => status_code(r.outcome, r.mode),
        }
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        match self {
            Status::Open => None,
            Status::Resolved(r) => Some(r),
        }
    }
}

pub const STATUS_OPEN: &str = "pending";

pub fn status_code(outcome: Outcome, mode: ResolutionMode) -> &'static str {
    match (mode, outcome) {
        (ResolutionMode::Auto, Outcome::Success) => "auto-success",
        (ResolutionMode::Auto, Outcome::Fail) => "auto-fail",
        (ResolutionMode::Manual, Outcome::Success) => "manual-success",
        (ResolutionMode::Manual, Outcome::Fail) => "manual-fail",
    }
}

fn parse_resolved_code(code: &str) -> Option<(Outcome, ResolutionMode)> {
    match code {
        "auto-success" => Some((Outcome::Success, ResolutionMode::Auto)),
        "auto-fail" => Some((Outcome::Fail, ResolutionMode::Auto)),
        "manual-success" => Some((Outcome::Success, ResolutionMode::Manual)),
        "manual-fail" => Some((Outcome::Fail, ResolutionMode::Manual)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub id: String,
    pub ticker: String,
    pub direction: Direction,
    pub floor: f64,
    pub ceiling: f64,
    pub start_price: f64,
    pub current_price: Option<f64>,
    pub confidence: u8,
    pub status: Status,
    pub parent_id: Option<String>,
}

/// A record that failed validation at the store boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed forecast {id}: {reason}")]
pub struct MalformedForecast {
    pub id: String,
    pub reason: String,
}

impl From<MalformedForecast> for SettlerError {
    fn from(m: MalformedForecast) -> Self {
        SettlerError::MalformedForecast {
            id: m.id,
            reason: m.reason,
        }
    }
}

/// One row as the store returns it, before any checks.
pub type Loaded = Result<Forecast, MalformedForecast>;

/// Loosely typed row as read from a store.
#[derive(Debug, Clone, Default)]
pub struct ForecastRow {
    pub id: String,
    pub ticker: Option<String>,
    pub direction: Option<String>,
    pub floor: Option<f64>,
    pub ceiling: Option<f64>,
    pub start_price: Option<f64>,
    pub current_price: Option<f64>,
    pub confidence: Option<i64>,
    pub status: Option<String>,
    pub parent_id: Option<String>,
    pub end_price: Option<f64>,
    pub profit_rate: Option<f64>,
    pub profit_rate_adjusted: Option<f64>,
    pub resolved_at: Option<String>,
}

impl ForecastRow {
    pub fn validate(self) -> Loaded {
        let id = self.id.clone();
        let bad = |reason: String| MalformedForecast {
            id: id.clone(),
            reason,
        };
        let missing = |field: &str| bad(format!("missing {field}"));

        let ticker = self
            .ticker
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| missing("ticker"))?;

        let direction_raw = self.direction.ok_or_else(|| missing("direction"))?;
        let direction = Direction::parse(&direction_raw)
            .ok_or_else(|| bad(format!("unknown direction '{direction_raw}'")))?;

        let floor = self.floor.ok_or_else(|| missing("floor"))?;
        let ceiling = self.ceiling.ok_or_else(|| missing("ceiling"))?;
        let start_price = self.start_price.ok_or_else(|| missing("start_price"))?;

        for (name, value) in [
            ("floor", floor),
            ("ceiling", ceiling),
            ("start_price", start_price),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(bad(format!("{name} must be a positive number, got {value}")));
            }
        }

        if !(floor < start_price && start_price < ceiling) {
            return Err(bad(format!(
                "bounds out of order: floor {floor}, start {start_price}, ceiling {ceiling}"
            )));
        }

        let confidence = self.confidence.ok_or_else(|| missing("confidence"))?;
        if confidence < MIN_CONFIDENCE as i64 || confidence > MAX_CONFIDENCE as i64 {
            return Err(bad(format!(
                "confidence must be {MIN_CONFIDENCE}-{MAX_CONFIDENCE}, got {confidence}"
            )));
        }

        let status_raw = self.status.ok_or_else(|| missing("status"))?;
        let status = if status_raw == STATUS_OPEN {
            Status::Open
        } else {
            let (outcome, mode) = parse_resolved_code(&status_raw)
                .ok_or_else(|| bad(format!("unknown status '{status_raw}'")))?;
            let resolved_at_raw = self.resolved_at.ok_or_else(|| missing("resolved_at"))?;
            let resolved_at = DateTime::parse_from_rfc3339(&resolved_at_raw)
                .map_err(|e| bad(format!("invalid resolved_at '{resolved_at_raw}': {e}")))?
                .with_timezone(&Utc);
            let end_price = self.end_price.ok_or_else(|| missing("end_price"))?;
            let profit_rate = self.profit_rate.ok_or_else(|| missing("profit_rate"))?;
            Status::Resolved(Resolution {
                outcome,
                mode,
                end_price,
                profit_rate,
                profit_rate_adjusted: self
                    .profit_rate_adjusted
                    .unwrap_or(profit_rate * confidence as f64 / MAX_CONFIDENCE as f64),
                resolved_at,
            })
        };

        Ok(Forecast {
            id: self.id,
            ticker,
            direction,
            floor,
            ceiling,
            start_price,
            current_price: self.current_price,
            confidence: confidence as u8,
            status,
            parent_id: self.parent_id.filter(|p| !p.trim().is_empty()),
        })
    }
}
