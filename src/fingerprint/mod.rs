//! OS fingerprint model: database records, observations and matches

pub mod behavior;
pub mod database;
pub mod engine;
pub mod scoring;

use crate::network::options::TcpOpts;
use crate::network::TcpFlagSet;
use serde::{Deserialize, Serialize};

pub use behavior::{BehaviorVerdict, ProbeVector};
pub use database::FingerprintDatabase;
pub use engine::{FingerprintReport, OsDetectionEngine};
pub use scoring::{Confidence, Match, RankedMatch, Scorer, WeightedScorer};

/// Operating system family used for coarse consistency checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsFamily {
    Windows,
    Linux,
    Other,
}

impl OsFamily {
    /// Family suggested by an observed TTL
    pub fn from_ttl(ttl: u8) -> Self {
        match ttl {
            110..=140 => OsFamily::Windows,
            50..=70 => OsFamily::Linux,
            _ => OsFamily::Other,
        }
    }

    /// Family named by a signature. Android and Ubuntu count as Linux.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("windows") {
            OsFamily::Windows
        } else if ["linux", "android", "ubuntu"].iter().any(|k| lower.contains(k)) {
            OsFamily::Linux
        } else {
            OsFamily::Other
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, OsFamily::Other)
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::Windows => write!(f, "Windows"),
            OsFamily::Linux => write!(f, "Linux/Unix"),
            OsFamily::Other => write!(f, "Other"),
        }
    }
}

/// One signature from the database. `None` marks a field the database did
/// not specify or that failed to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub name: String,

    pub ttl_min: Option<u8>,
    pub ttl_max: Option<u8>,
    pub ttl_guess: Option<u8>,

    /// Primary window from `T1(W=)`
    pub window: Option<u16>,
    /// `W1`..`W6` from the `WIN(` line
    pub window_values: [Option<u16>; 6],

    /// Raw `O=` value as written in the database
    pub options: Option<String>,
    pub opts: TcpOpts,

    pub df_flag: Option<bool>,
    pub t2_responds: Option<bool>,
    pub t3_responds: Option<bool>,
}

impl Fingerprint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn family(&self) -> OsFamily {
        OsFamily::from_name(&self.name)
    }
}

/// What the target showed us during one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Gate for every other field: false means the SYN probe went unanswered
    pub got_response: bool,

    pub ttl: u8,
    pub window: u16,
    pub df_flag: bool,
    pub flags: TcpFlagSet,
    /// Pattern string of the SYN reply options
    pub options: String,
    pub opts: TcpOpts,

    /// NULL probe answered
    pub t2_responded: bool,
    /// XMAS probe answered
    pub t3_responded: bool,
    /// ACK probe answered
    pub t4_responded: bool,
}

impl ScanResult {
    pub fn ttl_family(&self) -> OsFamily {
        OsFamily::from_ttl(self.ttl)
    }
}
