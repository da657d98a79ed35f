//! Connector error types with transient/permanent classification.

use thiserror::Error;

/// Error that can occur while talking to an external system.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Failed to establish a connection to the external system.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The request timed out.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// Network error during communication.
    #[error("network error: {message}")]
    NetworkError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The external API rejected the request.
    #[error("api error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Requested object does not exist in the external system.
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// Adapter configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The external system returned a payload we could not interpret.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// Serialization error building a request payload.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl ConnectorError {
    /// Whether the error is transient and the operation may be retried.
    ///
    /// Server-side failures and throttling are transient; everything else
    /// needs a config or data change first.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectorError::ConnectionFailed { .. }
            | ConnectorError::ConnectionTimeout { .. }
            | ConnectorError::NetworkError { .. } => true,
            ConnectorError::ApiError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether the error is permanent and retry won't help.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with an underlying cause.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::NetworkError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an API error from a response status and body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        ConnectorError::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        ConnectorError::InvalidData {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(ConnectorError::api(500, "boom").is_transient());
        assert!(ConnectorError::api(503, "maintenance").is_transient());
        assert!(ConnectorError::api(429, "slow down").is_transient());
        assert!(ConnectorError::connection_failed("refused").is_transient());
        assert!(ConnectorError::ConnectionTimeout { timeout_secs: 30 }.is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(ConnectorError::api(400, "bad field").is_permanent());
        assert!(ConnectorError::api(401, "token").is_permanent());
        assert!(ConnectorError::ObjectNotFound {
            identifier: "T1".into()
        }
        .is_permanent());
        assert!(ConnectorError::invalid_data("junk").is_permanent());
    }
}
