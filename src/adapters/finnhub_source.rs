//! Secondary price source: Finnhub quote endpoint.

use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::adapters::http_client::{
    base_url, build_client, endpoint, qualified_symbol, symbol_suffix, transport_error,
};
use crate::domain::error::{PriceError, SettlerError};
use crate::domain::price::{PriceReading, RawPrice, SourceKind};
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PriceSource;

pub const DEFAULT_BASE_URL: &str = "https://finnhub.io";
pub const API_KEY_ENV: &str = "FINNHUB_API_KEY";
const TOKEN_HEADER: &str = "X-Finnhub-Token";

/// `c` current, `h` high, `l` low; other fields are ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct Quote {
    c: Option<RawPrice>,
    h: Option<RawPrice>,
    l: Option<RawPrice>,
}

pub struct FinnhubSource {
    client: reqwest::blocking::Client,
    base_url: Url,
    suffix: String,
    api_key: Option<String>,
}

impl FinnhubSource {
    /// A missing API key is not a configuration error: the source is built
    /// and fails each fetch with [`PriceError::MissingCredential`].
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SettlerError> {
        let api_key = config
            .get_string("prices", "finnhub_api_key")
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            client: build_client(config)?,
            base_url: base_url(config, "finnhub_base_url", DEFAULT_BASE_URL)?,
            suffix: symbol_suffix(config),
            api_key,
        })
    }

    fn quote_url(&self) -> Url {
        endpoint(&self.base_url, &["api", "v1", "quote"])
    }
}

pub(crate) fn parse_quote(ticker: &str, quote: Quote) -> Result<PriceReading, PriceError> {
    let no_data = || PriceError::NoData {
        ticker: ticker.to_string(),
    };
    // Finnhub answers unknown symbols with zeros rather than an error.
    let current = quote.c.as_ref().and_then(RawPrice::value).ok_or_else(no_data)?;
    let daily_high = quote.h.as_ref().and_then(RawPrice::value).ok_or_else(|| {
        PriceError::ResponseFormat(format!("missing or unparsable high for {ticker}"))
    })?;
    let daily_low = quote.l.as_ref().and_then(RawPrice::value).ok_or_else(|| {
        PriceError::ResponseFormat(format!("missing or unparsable low for {ticker}"))
    })?;

    Ok(PriceReading {
        ticker: ticker.to_string(),
        current,
        daily_high,
        daily_low,
        source: SourceKind::Finnhub,
        fetched_at: Utc::now(),
    })
}

impl PriceSource for FinnhubSource {
    fn name(&self) -> &str {
        "finnhub"
    }

    fn fetch(&self, ticker: &str) -> Result<PriceReading, PriceError> {
        let token = self
            .api_key
            .as_deref()
            .ok_or_else(|| PriceError::MissingCredential(API_KEY_ENV.to_string()))?;

        let symbol = qualified_symbol(ticker, &self.suffix);
        debug!(%ticker, %symbol, "requesting finnhub quote");

        // The token travels as a header so it never lands in a URL.
        let resp = self
            .client
            .get(self.quote_url())
            .query(&[("symbol", symbol.as_str())])
            .header(TOKEN_HEADER, token)
            .send()
            .map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PriceError::Status {
                source_name: self.name().to_string(),
                status: status.as_u16(),
            });
        }

        let quote: Quote = resp.json().map_err(|e| {
            PriceError::ResponseFormat(format!("failed to parse finnhub response for {ticker}: {e}"))
        })?;
        parse_quote(ticker, quote)
    }
}
