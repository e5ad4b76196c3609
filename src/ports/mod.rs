//! Port traits (interfaces) for external collaborators.

pub mod config_port;
pub mod forecast_store;
pub mod price_port;
