//! Domain error types.

use thiserror::Error;

/// Failure of a single price source, or of the whole primary/secondary chain.
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("HTTP {status} from {source_name}")]
    Status { source_name: String, status: u16 },

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("no price data for {ticker}")]
    NoData { ticker: String },

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("all price sources failed for {ticker} (primary: {primary}; secondary: {secondary})")]
    AllSourcesFailed {
        ticker: String,
        primary: Box<PriceError>,
        secondary: Box<PriceError>,
    },
}

/// Top-level error type for settler.
#[derive(Debug, Error)]
pub enum SettlerError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Price(#[from] PriceError),

    #[error("malformed forecast {id}: {reason}")]
    MalformedForecast { id: String, reason: String },

    #[error("forecast {id} not found")]
    NotFound { id: String },

    #[error("forecast {id} is still open")]
    NotResolved { id: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SettlerError> for std::process::ExitCode {
    fn from(err: &SettlerError) -> Self {
        let code: u8 = match err {
            SettlerError::Io(_) => 1,
            SettlerError::ConfigParse { .. }
            | SettlerError::ConfigMissing { .. }
            | SettlerError::ConfigInvalid { .. } => 2,
            SettlerError::Database { .. } | SettlerError::DatabaseQuery { .. } => 3,
            SettlerError::Price(_) => 4,
            SettlerError::MalformedForecast { .. }
            | SettlerError::NotFound { .. }
            | SettlerError::NotResolved { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
