//! Primary-then-secondary price lookup.

use tracing::{info, warn};

use crate::adapters::finnhub_source::FinnhubSource;
use crate::adapters::yahoo_source::YahooSource;
use crate::domain::error::{PriceError, SettlerError};
use crate::domain::price::PriceReading;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PriceSource;

/// Tries `primary`, then `secondary` once. The first parseable reading wins;
/// readings are never merged across sources.
pub struct FallbackSource {
    primary: Box<dyn PriceSource + Send + Sync>,
    secondary: Box<dyn PriceSource + Send + Sync>,
}

impl FallbackSource {
    pub fn new(
        primary: Box<dyn PriceSource + Send + Sync>,
        secondary: Box<dyn PriceSource + Send + Sync>,
    ) -> Self {
        Self { primary, secondary }
    }

    /// Yahoo Taiwan first, Finnhub second.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SettlerError> {
        Ok(Self::new(
            Box::new(YahooSource::from_config(config)?),
            Box::new(FinnhubSource::from_config(config)?),
        ))
    }
}

impl PriceSource for FallbackSource {
    fn name(&self) -> &str {
        "fallback"
    }

    fn fetch(&self, ticker: &str) -> Result<PriceReading, PriceError> {
        let primary_err = match self.primary.fetch(ticker) {
            Ok(reading) => {
                info!(%ticker, source = %reading.source, price = reading.current, "price fetched");
                return Ok(reading);
            }
            Err(e) => e,
        };
        warn!(
            %ticker,
            source = self.primary.name(),
            error = %primary_err,
            "primary price source failed, trying {}",
            self.secondary.name()
        );

        match self.secondary.fetch(ticker) {
            Ok(reading) => {
                info!(%ticker, source = %reading.source, price = reading.current, "price fetched");
                Ok(reading)
            }
            Err(secondary_err) => Err(PriceError::AllSourcesFailed {
                ticker: ticker.to_string(),
                primary: Box::new(primary_err),
                secondary: Box::new(secondary_err),
            }),
        }
    }
}
