//! Error types for the Roamsheet network layer.
//!
//! This module defines the error taxonomy shared by the retry controller,
//! the interception agent, and the diagnostics battery, along with the
//! retryability policy applied to each variant.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the network resilience layer.
#[derive(Debug, Error)]
pub enum NetError {
    // Transport errors
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Connection refused or reset for {url}: {message}")]
    ConnectionReset { url: String, message: String },

    #[error("HTTP {code} from {url}")]
    HttpStatus { code: u16, url: String },

    #[error("Operation was cancelled")]
    Cancelled,

    // Agent errors
    #[error("No cached response available for {url}")]
    NoCacheAvailable { url: String },

    // Diagnostics errors
    #[error("A diagnostic run is already in progress")]
    DiagnosticAlreadyRunning,

    // Cache store errors
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for network layer operations.
pub type Result<T> = std::result::Result<T, NetError>;

// Conversion implementations for common error types

impl From<std::io::Error> for NetError {
    fn from(err: std::io::Error) -> Self {
        NetError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for NetError {
    fn from(err: serde_json::Error) -> Self {
        NetError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for NetError {
    fn from(err: rusqlite::Error) -> Self {
        NetError::Cache {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for NetError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        if err.is_timeout() {
            NetError::Timeout(Duration::from_secs(0))
        } else {
            NetError::ConnectionReset {
                url,
                message: err.to_string(),
            }
        }
    }
}

impl NetError {
    /// Check if this error should trigger a retry.
    ///
    /// Timeouts, connection resets, and 5xx server errors are transient;
    /// 4xx client errors cannot succeed on retry and fail fast.
    pub fn is_retryable(&self) -> bool {
        match self {
            NetError::Timeout(_) | NetError::ConnectionReset { .. } => true,
            NetError::HttpStatus { code, .. } => (500..=599).contains(code),
            _ => false,
        }
    }

    /// Check if this error indicates the network itself is unreachable,
    /// as opposed to a server-side failure.
    pub fn is_connectivity_loss(&self) -> bool {
        matches!(
            self,
            NetError::Timeout(_) | NetError::ConnectionReset { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetError::HttpStatus {
            code: 503,
            url: "https://app.roamsheet.io/api/timesheets".into(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP 503 from https://app.roamsheet.io/api/timesheets"
        );

        let err = NetError::NoCacheAvailable {
            url: "https://app.roamsheet.io/api/approvals".into(),
        };
        assert!(err.to_string().contains("No cached response"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(NetError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(NetError::ConnectionReset {
            url: "x".into(),
            message: "reset".into()
        }
        .is_retryable());
        assert!(NetError::HttpStatus {
            code: 502,
            url: "x".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_client_errors_fail_fast() {
        assert!(!NetError::HttpStatus {
            code: 404,
            url: "x".into()
        }
        .is_retryable());
        assert!(!NetError::HttpStatus {
            code: 401,
            url: "x".into()
        }
        .is_retryable());
        assert!(!NetError::Cancelled.is_retryable());
        assert!(!NetError::NoCacheAvailable { url: "x".into() }.is_retryable());
    }

    #[test]
    fn test_connectivity_loss() {
        assert!(NetError::Timeout(Duration::from_secs(1)).is_connectivity_loss());
        assert!(!NetError::HttpStatus {
            code: 500,
            url: "x".into()
        }
        .is_connectivity_loss());
    }
}
