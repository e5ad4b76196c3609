//! Concrete adapter implementations for ports.

use chrono::{DateTime, SecondsFormat, Utc};

#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
#[cfg(feature = "postgres")]
pub mod postgres_adapter;
pub mod fallback_source;
pub mod file_config_adapter;
pub mod finnhub_source;
pub mod http_client;
pub mod yahoo_source;
#[cfg(feature = "web")]
pub mod web;

/// Stored timestamp format shared by both database backends.
#[cfg_attr(not(any(feature = "sqlite", feature = "postgres")), allow(dead_code))]
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
