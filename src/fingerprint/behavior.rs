//! Behavioral verdict from how the target treats malformed probes.
//!
//! Linux stacks answer NULL and XMAS segments with a reset; Windows drops
//! them. This is a coarse second opinion next to the ranked signatures.

use super::OsFamily;
use crate::network::ProbeKind;
use serde::{Deserialize, Serialize};
use std::fmt;

const NULL_WEIGHT: u32 = 1;
const XMAS_WEIGHT: u32 = 2;

/// Which probes drew a reply, in probe order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeVector {
    pub syn: bool,
    pub null: bool,
    pub xmas: bool,
    pub ack: bool,
}

impl ProbeVector {
    pub fn record(&mut self, probe: ProbeKind, replied: bool) {
        match probe {
            ProbeKind::Syn => self.syn = replied,
            ProbeKind::Null => self.null = replied,
            ProbeKind::Xmas => self.xmas = replied,
            ProbeKind::Ack => self.ack = replied,
        }
    }

    pub fn replied(&self, probe: ProbeKind) -> bool {
        match probe {
            ProbeKind::Syn => self.syn,
            ProbeKind::Null => self.null,
            ProbeKind::Xmas => self.xmas,
            ProbeKind::Ack => self.ack,
        }
    }
}

impl fmt::Display for ProbeVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[ T1:{}, T2:{}, T3:{}, T4:{} ]",
            self.syn as u8, self.null as u8, self.xmas as u8, self.ack as u8
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorVerdict {
    pub vector: ProbeVector,
    pub linux_votes: u32,
    pub windows_votes: u32,
    /// Linux when it strictly out-votes Windows, otherwise Windows
    pub family: OsFamily,
}

impl BehaviorVerdict {
    pub fn from_vector(vector: ProbeVector) -> Self {
        let mut linux_votes = 0;
        let mut windows_votes = 0;

        for (replied, weight) in [(vector.null, NULL_WEIGHT), (vector.xmas, XMAS_WEIGHT)] {
            if replied {
                linux_votes += weight;
            } else {
                windows_votes += weight;
            }
        }

        let family = if linux_votes > windows_votes {
            OsFamily::Linux
        } else {
            OsFamily::Windows
        };

        Self {
            vector,
            linux_votes,
            windows_votes,
            family,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self.family {
            OsFamily::Linux => "target sent replies to malformed segments",
            _ => "target dropped malformed segments",
        }
    }
}
