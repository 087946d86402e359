//! Error types for gateway operations

use thiserror::Error;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// A mandatory request field is unset
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// Payload is empty, not well-formed XML, or declares entities
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Network failure, timeout or non-2xx status
    #[error("Transport error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Transport {
        /// HTTP status code, when the server answered
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// Response or callback failed signature verification
    #[error("Signature mismatch: {0}")]
    SignatureMismatch(String),

    /// Gateway answered with a non-SUCCESS return_code
    #[error("Gateway rejected request ({return_code}): {message}")]
    Rejected {
        /// Upstream return_code
        return_code: String,
        /// Upstream return_msg
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a transport error without an HTTP status
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MissingRequiredField(_) => "missing_field",
            Error::MalformedPayload(_) => "malformed_payload",
            Error::Transport { .. } => "transport",
            Error::SignatureMismatch(_) => "signature_mismatch",
            Error::Rejected { .. } => "rejected",
            Error::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        Error::Transport {
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::MalformedPayload(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display_includes_status() {
        let err = Error::Transport {
            status: Some(502),
            message: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "Transport error (status 502): bad gateway");

        let err = Error::transport("connection reset");
        assert_eq!(err.to_string(), "Transport error: connection reset");
        assert_eq!(err.kind(), "transport");
    }
}
