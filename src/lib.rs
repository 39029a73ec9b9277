//! osprobe - active TCP/IP stack fingerprinting
//!
//! Sends a short sequence of crafted TCP probes to one host, records how its
//! stack answers, and ranks a signature database against the observation.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod network;
pub mod output;

// Re-export commonly used types
pub use config::FingerprintConfig;
pub use error::ScanError;
pub use fingerprint::{
    Fingerprint, FingerprintDatabase, FingerprintReport, OsDetectionEngine, OsFamily, ScanResult,
};
pub use network::{ProbeKind, ProbeTransport, RawProbeTransport};

pub type Result<T> = std::result::Result<T, ScanError>;
