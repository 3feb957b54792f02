//! Error types for legalflow-gateway

use thiserror::Error;

/// Errors that can occur talking to the remote data platform
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Gateway misconfigured (missing URL, bad key, ...)
    #[error("Gateway configuration error: {0}")]
    Config(String),

    /// Table or function reference could not be parsed
    #[error("Invalid relation reference: {0}")]
    InvalidTable(String),

    /// The backend could not be reached at all
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The backend answered with an error body
    #[error("Remote error ({status}): {message}")]
    Remote {
        status: u16,
        code: Option<String>,
        message: String,
        details: Option<String>,
        hint: Option<String>,
    },

    /// Response body did not have the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// RPC function is not exposed by the backend
    #[error("Unknown RPC function: {0}")]
    UnknownRpc(String),
}

impl GatewayError {
    /// Build a remote error with only a status and message.
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        GatewayError::Remote {
            status,
            code: None,
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    /// Build a remote error carrying a Postgres / PostgREST error code.
    pub fn remote_with_code(
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        GatewayError::Remote {
            status,
            code: Some(code.into()),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    /// Provider error code, when the backend sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            GatewayError::Remote { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Raw provider message (without the variant prefix).
    pub fn provider_message(&self) -> String {
        match self {
            GatewayError::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// True when the backend could not be reached, as opposed to answering
    /// with an error.
    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display_contains_message() {
        let err = GatewayError::remote_with_code(404, "42P01", "relation \"x\" does not exist");
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("does not exist"));
        assert_eq!(err.code(), Some("42P01"));
    }

    #[test]
    fn provider_message_strips_prefix() {
        let err = GatewayError::remote(500, "boom");
        assert_eq!(err.provider_message(), "boom");

        let err = GatewayError::Transport("connection refused".to_string());
        assert!(err.provider_message().contains("connection refused"));
        assert!(err.is_transport());
    }
}
