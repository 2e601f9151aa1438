//! Error handling for the relay.
//!
//! A single `RelayError` type is used across the crate. Mid-stream faults are
//! absorbed close to where they occur (see `streaming`); only pre-stream
//! faults cross the HTTP boundary as error responses.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The inbound request carried no usable prompt. Rejected before any
    /// upstream call is made.
    #[error("Missing prompt")]
    MissingPrompt,

    /// The upstream rejected the call with a non-success status before any
    /// streaming began. Surfaced to the caller with the upstream's status.
    #[error("Upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// Transport-level HTTP failure (connect, send, read).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// JSON serialization/deserialization failure outside the event pipeline.
    #[error("JSON error: {0}")]
    JsonError(String),

    /// Mid-stream transport failure. Fatal to the current operation only.
    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Unexpected failure caught at the operation boundary.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl RelayError {
    /// Status code this error maps to at the HTTP boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::MissingPrompt => 400,
            Self::UpstreamStatus { status, .. } => *status,
            _ => 500,
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: RelayError = json_err.into();
        assert!(matches!(err, RelayError::JsonError(_)));
    }

    #[test]
    fn upstream_status_keeps_its_code() {
        let err = RelayError::UpstreamStatus {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert_eq!(err.http_status(), 503);
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn pre_stream_errors_map_to_500() {
        assert_eq!(RelayError::MissingPrompt.http_status(), 400);
        assert_eq!(RelayError::InternalError("boom".into()).http_status(), 500);
        assert_eq!(RelayError::HttpError("connect".into()).http_status(), 500);
    }
}
