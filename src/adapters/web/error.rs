//! JSON error responses for the web adapter.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::domain::error::{PriceError, SettlerError};

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

pub fn status_from_error(err: &SettlerError) -> StatusCode {
    match err {
        SettlerError::ConfigMissing { .. }
        | SettlerError::ConfigInvalid { .. }
        | SettlerError::ConfigParse { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        SettlerError::Price(PriceError::NoData { .. }) => StatusCode::NOT_FOUND,
        SettlerError::Price(_) => StatusCode::BAD_GATEWAY,
        SettlerError::NotFound { .. } => StatusCode::NOT_FOUND,
        SettlerError::NotResolved { .. } | SettlerError::MalformedForecast { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SettlerError::Database { .. }
        | SettlerError::DatabaseQuery { .. }
        | SettlerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SettlerError> for WebError {
    fn from(err: SettlerError) -> Self {
        Self::new(status_from_error(&err), err.to_string())
    }
}

impl From<PriceError> for WebError {
    fn from(err: PriceError) -> Self {
        SettlerError::from(err).into()
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
