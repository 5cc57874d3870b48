//! Error types for the plugin registration and RPC layer.
//!
//! Errors fall into four groups so callers can tell them apart:
//! - precondition failures, raised before any network call is made
//! - transport failures (connection refused, DNS, timeouts, cancellation)
//! - protocol failures, where the remote side answered but said no
//! - decode failures, where the remote answer could not be parsed

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Stage of a single registration attempt inside `register_with_retries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStage {
    HealthCheck,
    Register,
}

impl fmt::Display for AttemptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStage::HealthCheck => write!(f, "API health check failed"),
            AttemptStage::Register => write!(f, "registration failed"),
        }
    }
}

/// Main error type for the plugin library.
#[derive(Debug, Error)]
pub enum PluginError {
    // Precondition errors
    #[error("plugin manifest is required for registration")]
    MissingManifest,

    #[error("plugin ID is required for unregistration")]
    MissingPluginId,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid plugin endpoint '{endpoint}': {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    #[error("Invalid manifest: {message}")]
    InvalidManifest { message: String },

    #[error("Invalid payload at {path}: {message}")]
    InvalidPayload { path: String, message: String },

    // Transport errors
    #[error("{operation} request failed: {source}")]
    Http {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Transport error talking to {endpoint}: {message}")]
    Transport {
        endpoint: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("context cancelled")]
    Cancelled,

    #[error("connection is closed")]
    ConnectionClosed,

    // Protocol errors
    #[error("{operation} failed with status: {status}")]
    Status { operation: &'static str, status: u16 },

    #[error("registration failed: {message}")]
    Rejected { message: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    // Decode errors
    #[error("failed to decode {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    // Retry errors
    #[error("{stage}: {source}")]
    Attempt {
        stage: AttemptStage,
        #[source]
        source: Box<PluginError>,
    },

    #[error("all {attempts} registration attempts failed, last error: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<PluginError>,
    },

    // Local errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Unimplemented: {method}")]
    Unimplemented { method: String },

    #[error("Unknown instance: {instance_id}")]
    UnknownInstance { instance_id: String },

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for plugin operations.
pub type Result<T> = std::result::Result<T, PluginError>;

impl From<std::io::Error> for PluginError {
    fn from(err: std::io::Error) -> Self {
        PluginError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        PluginError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PluginError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PluginError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether this error was raised before any network call was attempted.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            PluginError::MissingManifest
                | PluginError::MissingPluginId
                | PluginError::Config { .. }
                | PluginError::InvalidEndpoint { .. }
                | PluginError::InvalidManifest { .. }
                | PluginError::InvalidPayload { .. }
        )
    }

    /// Whether the remote side answered and refused the request.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            PluginError::Status { .. } | PluginError::Rejected { .. } | PluginError::Rpc { .. }
        )
    }

    /// Whether the remote answer could not be parsed.
    pub fn is_decode(&self) -> bool {
        matches!(self, PluginError::Decode { .. })
    }

    /// Convert to a JSON-RPC error code for the plugin RPC server.
    ///
    /// Standard codes:
    /// - -32700: Parse error
    /// - -32600: Invalid Request
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Application codes:
    /// - -32001: Unknown instance
    /// - -32002: Unsupported codec format
    /// - -32005: Validation error
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            PluginError::Unimplemented { .. } => -32601,
            PluginError::Json { .. } | PluginError::Decode { .. } => -32602,
            PluginError::UnknownInstance { .. } => -32001,
            PluginError::UnsupportedFormat { .. } => -32002,
            PluginError::InvalidManifest { .. }
            | PluginError::InvalidPayload { .. }
            | PluginError::Config { .. } => -32005,
            PluginError::Rpc { code, .. } => *code,
            _ => -32603,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = PluginError::Status {
            operation: "unregistration",
            status: 404,
        };
        assert_eq!(err.to_string(), "unregistration failed with status: 404");
    }

    #[test]
    fn test_retry_chain_preserves_cause() {
        let err = PluginError::RetriesExhausted {
            attempts: 3,
            source: Box::new(PluginError::Attempt {
                stage: AttemptStage::Register,
                source: Box::new(PluginError::Rejected {
                    message: "duplicate plugin".into(),
                }),
            }),
        };

        let text = err.to_string();
        assert!(text.starts_with("all 3 registration attempts failed"));
        assert!(text.contains("duplicate plugin"));

        let attempt = err.source().unwrap();
        assert!(attempt.to_string().starts_with("registration failed"));
        assert!(attempt.source().is_some());
    }

    #[test]
    fn test_error_groups() {
        assert!(PluginError::MissingManifest.is_precondition());
        assert!(PluginError::MissingPluginId.is_precondition());
        assert!(!PluginError::MissingManifest.is_protocol());

        assert!(PluginError::Rejected {
            message: "no".into()
        }
        .is_protocol());

        let decode = PluginError::Decode {
            context: "registration response",
            source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        };
        assert!(decode.is_decode());
        assert!(!decode.is_protocol());
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            PluginError::Unimplemented {
                method: "EncodeMessage".into()
            }
            .to_rpc_error_code(),
            -32601
        );
        assert_eq!(
            PluginError::UnknownInstance {
                instance_id: "radar-1".into()
            }
            .to_rpc_error_code(),
            -32001
        );
        assert_eq!(PluginError::Other("boom".into()).to_rpc_error_code(), -32603);
    }
}
