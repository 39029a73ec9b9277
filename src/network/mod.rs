//! Network module for probe crafting and reply capture

pub mod options;
pub mod packet;
pub mod socket;
pub mod transport;

use pnet::packet::tcp::TcpFlags;
use serde::{Deserialize, Serialize};

pub use options::TcpOpts;
pub use packet::{ProbeReply, TcpPacketBuilder};
pub use transport::{ProbeTransport, RawProbeTransport};

/// Probes sent against the target, in the order the engine runs them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeKind {
    /// SYN with the standard options block
    Syn,
    /// No control bits at all
    Null,
    /// FIN, PSH and URG together
    Xmas,
    /// Bare ACK
    Ack,
}

impl ProbeKind {
    /// Get the name of the probe
    pub fn name(&self) -> &'static str {
        match self {
            ProbeKind::Syn => "SYN",
            ProbeKind::Null => "NULL",
            ProbeKind::Xmas => "XMAS",
            ProbeKind::Ack => "ACK",
        }
    }

    /// Test label used in signature databases and reports
    pub fn label(&self) -> &'static str {
        match self {
            ProbeKind::Syn => "T1",
            ProbeKind::Null => "T2",
            ProbeKind::Xmas => "T3",
            ProbeKind::Ack => "T4",
        }
    }

    /// Get TCP flags for this probe
    pub fn tcp_flags(&self) -> u8 {
        match self {
            ProbeKind::Syn => TcpFlags::SYN as u8,
            ProbeKind::Null => 0x00,
            ProbeKind::Xmas => (TcpFlags::FIN | TcpFlags::PSH | TcpFlags::URG) as u8,
            ProbeKind::Ack => TcpFlags::ACK as u8,
        }
    }

    /// Whether the segment carries the options block
    pub fn carries_options(&self) -> bool {
        self.tcp_flags() & TcpFlags::SYN as u8 != 0
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label(), self.name())
    }
}

/// Set of TCP control bits observed on a reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpFlagSet(pub u8);

impl TcpFlagSet {
    const LETTERS: [(u8, char); 6] = [
        (TcpFlags::SYN as u8, 'S'),
        (TcpFlags::ACK as u8, 'A'),
        (TcpFlags::RST as u8, 'R'),
        (TcpFlags::FIN as u8, 'F'),
        (TcpFlags::PSH as u8, 'P'),
        (TcpFlags::URG as u8, 'U'),
    ];

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn is_syn_ack(&self) -> bool {
        self.contains((TcpFlags::SYN | TcpFlags::ACK) as u8)
    }

    pub fn is_rst(&self) -> bool {
        self.contains(TcpFlags::RST as u8)
    }
}

impl std::fmt::Display for TcpFlagSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (bit, letter) in Self::LETTERS {
            if self.0 & bit != 0 {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_flags() {
        assert_eq!(ProbeKind::Syn.tcp_flags(), 0x02);
        assert_eq!(ProbeKind::Null.tcp_flags(), 0x00);
        assert_eq!(ProbeKind::Xmas.tcp_flags(), 0x29);
        assert_eq!(ProbeKind::Ack.tcp_flags(), 0x10);
    }

    #[test]
    fn test_only_syn_carries_options() {
        assert!(ProbeKind::Syn.carries_options());
        assert!(!ProbeKind::Null.carries_options());
        assert!(!ProbeKind::Xmas.carries_options());
        assert!(!ProbeKind::Ack.carries_options());
    }

    #[test]
    fn test_flag_set_rendering() {
        assert_eq!(TcpFlagSet(0x12).to_string(), "SA");
        assert_eq!(TcpFlagSet(0x14).to_string(), "AR");
        assert_eq!(TcpFlagSet(0).to_string(), "");
        assert!(TcpFlagSet(0x12).is_syn_ack());
        assert!(TcpFlagSet(0x04).is_rst());
    }
}
