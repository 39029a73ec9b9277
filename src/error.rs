//! Error handling for the osprobe fingerprinter
//!
//! Timeouts while waiting for a probe reply are observations, not errors, and
//! never surface through this type from the transport layer. Everything that
//! does reach the caller is either a precondition failure (privileges,
//! configuration) or a resource failure on a single probe.

use thiserror::Error;

/// Main error type for fingerprinting operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Permission denied: {0}")]
    PermissionError(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Timeout error")]
    TimeoutError,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Raw socket error: {0}")]
    RawSocketError(String),
}

impl ScanError {
    /// Whether the error points at missing privileges rather than the network
    pub fn is_permission(&self) -> bool {
        matches!(self, ScanError::PermissionError(_))
    }
}

/// Convert common errors to ScanError
impl From<std::net::AddrParseError> for ScanError {
    fn from(e: std::net::AddrParseError) -> Self {
        ScanError::InvalidTarget(e.to_string())
    }
}

impl From<std::num::ParseIntError> for ScanError {
    fn from(e: std::num::ParseIntError) -> Self {
        ScanError::ParseError(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ScanError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ScanError::TimeoutError
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(e: toml::de::Error) -> Self {
        ScanError::ConfigError(format!("Failed to parse TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_parse_maps_to_invalid_target() {
        let err: ScanError = "10.0.0.300".parse::<std::net::Ipv4Addr>().unwrap_err().into();
        assert!(matches!(err, ScanError::InvalidTarget(_)));
    }

    #[test]
    fn test_permission_detection() {
        assert!(ScanError::PermissionError("need root".to_string()).is_permission());
        assert!(!ScanError::TimeoutError.is_permission());
    }

    #[tokio::test]
    async fn test_elapsed_maps_to_timeout() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        assert!(matches!(ScanError::from(elapsed), ScanError::TimeoutError));
    }
}
