//! Core domain types and logic.

pub mod forecast;
pub mod price;
pub mod trading_window;
pub mod evaluator;
pub mod cascade;
pub mod batch;
pub mod summary;
pub mod error;
