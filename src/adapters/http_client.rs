//! Shared blocking HTTP client settings for the price sources.

use std::time::Duration;

use reqwest::Url;

use crate::domain::error::{PriceError, SettlerError};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_TIMEOUT_SECS: i64 = 10;
pub const DEFAULT_SYMBOL_SUFFIX: &str = "TW";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Build a client whose every request is bounded by `[prices] timeout_secs`.
pub fn build_client(config: &dyn ConfigPort) -> Result<reqwest::blocking::Client, SettlerError> {
    let secs = config.get_int("prices", "timeout_secs", DEFAULT_TIMEOUT_SECS)?;
    if secs <= 0 {
        return Err(SettlerError::ConfigInvalid {
            section: "prices".into(),
            key: "timeout_secs".into(),
            reason: format!("must be positive, got {secs}"),
        });
    }

    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(secs as u64))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| PriceError::Network(format!("failed to build HTTP client: {e}")).into())
}

/// `[prices] <key>` as an absolute base URL, falling back to `default`.
pub fn base_url(config: &dyn ConfigPort, key: &str, default: &str) -> Result<Url, SettlerError> {
    let raw = config
        .get_string("prices", key)
        .unwrap_or_else(|| default.to_string());
    Url::parse(&raw)
        .ok()
        .filter(|url| !url.cannot_be_a_base())
        .ok_or_else(|| SettlerError::ConfigInvalid {
            section: "prices".into(),
            key: key.into(),
            reason: format!("'{raw}' is not a base URL"),
        })
}

/// Append path segments to `base`, percent-encoding each one.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Exchange-qualified symbol, e.g. `2330` -> `2330.TW`.
pub fn qualified_symbol(ticker: &str, suffix: &str) -> String {
    let ticker = ticker.trim();
    if suffix.is_empty() || ticker.contains('.') {
        ticker.to_string()
    } else {
        format!("{ticker}.{suffix}")
    }
}

pub fn symbol_suffix(config: &dyn ConfigPort) -> String {
    config
        .get_string("prices", "symbol_suffix")
        .unwrap_or_else(|| DEFAULT_SYMBOL_SUFFIX.to_string())
}

/// Request URLs never reach the error text; they can carry credentials.
pub(crate) fn transport_error(e: reqwest::Error) -> PriceError {
    let e = e.without_url();
    if e.is_timeout() {
        PriceError::Network(format!("request timed out: {e}"))
    } else {
        PriceError::Network(e.to_string())
    }
}
