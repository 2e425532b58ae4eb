//! Structured API errors

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Error returned by API handlers, rendered as `{"error": {"code", "message"}}`
#[derive(Debug)]
pub enum ApiError {
    /// Failure from the coordinator core
    Core(Error),
    /// Route exists but has no behavior yet
    NotImplemented(&'static str),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Core(e) => match e {
                Error::NotRunning => StatusCode::SERVICE_UNAVAILABLE,
                Error::UnknownDevice(_) => StatusCode::NOT_FOUND,
                Error::NotConnected(_) => StatusCode::CONFLICT,
                Error::Engine(_) | Error::Http(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotImplemented(_) => "not_implemented",
            Self::Core(e) => e.code(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::Core(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Core(e) => e.to_string(),
            Self::NotImplemented(what) => format!("{what} is not implemented yet"),
        };
        if status.is_server_error() {
            tracing::warn!(status = %status, error = %message, "API request failed");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_distinct_statuses() {
        assert_eq!(
            ApiError::from(Error::UnknownDevice("ID-9".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(Error::NotConnected("ID-1".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(Error::NotRunning).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::NotImplemented("create").code(),
            "not_implemented"
        );
    }
}
