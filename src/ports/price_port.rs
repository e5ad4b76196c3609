//! Price source port trait.

use crate::domain::error::PriceError;
use crate::domain::price::PriceReading;

pub trait PriceSource {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &str;

    fn fetch(&self, ticker: &str) -> Result<PriceReading, PriceError>;
}
