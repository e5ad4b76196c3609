//! Persistence port for forecasts.

use chrono::{DateTime, Utc};

use crate::domain::error::SettlerError;
use crate::domain::forecast::{Loaded, Resolution};

/// Narrow read/update contract the engine needs from a store.
///
/// List operations yield one [`Loaded`] per row so that a single malformed
/// record does not hide the rest.
pub trait ForecastStore {
    fn list_open(&self) -> Result<Vec<Loaded>, SettlerError>;

    /// Record the latest observed price on an open forecast.
    ///
    /// Returns `false` without writing when the row is resolved or absent;
    /// terminal rows keep the price they closed with.
    fn update_current_price(
        &self,
        id: &str,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<bool, SettlerError>;

    /// Write `resolution` only if the forecast is still open.
    ///
    /// Returns `false` when the row was already resolved (or is gone), which
    /// makes overlapping runs safe.
    fn resolve_if_open(&self, id: &str, resolution: &Resolution) -> Result<bool, SettlerError>;

    fn list_open_children(&self, parent_id: &str) -> Result<Vec<Loaded>, SettlerError>;

    fn find(&self, id: &str) -> Result<Option<Loaded>, SettlerError>;
}
