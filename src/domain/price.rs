//! Normalized price reading shared by every price source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    YahooTw,
    Finnhub,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::YahooTw => write!(f, "yahoo_tw"),
            SourceKind::Finnhub => write!(f, "finnhub"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceReading {
    pub ticker: String,
    pub current: f64,
    pub daily_high: f64,
    pub daily_low: f64,
    pub source: SourceKind,
    pub fetched_at: DateTime<Utc>,
}

/// A price field that may arrive as a JSON number or as text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Number(f64),
    Text(String),
}

impl RawPrice {
    pub fn value(&self) -> Option<f64> {
        match self {
            RawPrice::Number(n) if n.is_finite() && *n > 0.0 => Some(*n),
            RawPrice::Number(_) => None,
            RawPrice::Text(s) => parse_price_text(s),
        }
    }
}

/// Parse a displayed price such as `"1,025.50"` or a range such as `"580-590"`.
///
/// Thousands separators are dropped and the first value of a range wins.
/// Returns `None` unless the result is finite and strictly positive.
pub fn parse_price_text(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    let first = match cleaned.split_once(['-', '~']) {
        Some((head, _)) => head.trim(),
        None => cleaned.as_str(),
    };
    let value: f64 = first.parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}
