//! Primary price source: Yahoo Finance chart API for Taiwan listings.
//!
//! Only the `meta` block of the chart response is read; it carries the last
//! trade and the session high/low.

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

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Deserialize)]
pub(crate) struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<RawPrice>,
    regular_market_day_high: Option<RawPrice>,
    regular_market_day_low: Option<RawPrice>,
}

pub struct YahooSource {
    client: reqwest::blocking::Client,
    base_url: Url,
    suffix: String,
}

impl YahooSource {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SettlerError> {
        Ok(Self {
            client: build_client(config)?,
            base_url: base_url(config, "yahoo_base_url", DEFAULT_BASE_URL)?,
            suffix: symbol_suffix(config),
        })
    }

    fn chart_url(&self, symbol: &str) -> Url {
        endpoint(&self.base_url, &["v8", "finance", "chart", symbol])
    }
}

pub(crate) fn parse_chart(ticker: &str, resp: ChartResponse) -> Result<PriceReading, PriceError> {
    let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
        Some(err) if err.code == "Not Found" => PriceError::NoData {
            ticker: ticker.to_string(),
        },
        Some(err) => PriceError::ResponseFormat(format!("{}: {}", err.code, err.description)),
        None => PriceError::ResponseFormat("empty result with no error".into()),
    })?;

    let meta = result
        .into_iter()
        .next()
        .map(|d| d.meta)
        .ok_or_else(|| PriceError::NoData {
            ticker: ticker.to_string(),
        })?;

    let field = |value: Option<RawPrice>, name: &str| {
        value.as_ref().and_then(RawPrice::value).ok_or_else(|| {
            PriceError::ResponseFormat(format!("missing or unparsable {name} for {ticker}"))
        })
    };

    Ok(PriceReading {
        ticker: ticker.to_string(),
        current: field(meta.regular_market_price, "regularMarketPrice")?,
        daily_high: field(meta.regular_market_day_high, "regularMarketDayHigh")?,
        daily_low: field(meta.regular_market_day_low, "regularMarketDayLow")?,
        source: SourceKind::YahooTw,
        fetched_at: Utc::now(),
    })
}

impl PriceSource for YahooSource {
    fn name(&self) -> &str {
        "yahoo_tw"
    }

    fn fetch(&self, ticker: &str) -> Result<PriceReading, PriceError> {
        let symbol = qualified_symbol(ticker, &self.suffix);
        let url = self.chart_url(&symbol);
        debug!(%ticker, %url, "requesting yahoo chart");

        let resp = self
            .client
            .get(url)
            .query(&[("interval", "1d"), ("range", "1d")])
            .send()
            .map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PriceError::Status {
                source_name: self.name().to_string(),
                status: status.as_u16(),
            });
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            PriceError::ResponseFormat(format!("failed to parse yahoo response for {ticker}: {e}"))
        })?;
        parse_chart(ticker, chart)
    }
}
