//! TCP option codec
//!
//! Two producers feed the same [`TcpOpts`] shape: raw option bytes captured
//! off the wire, and the compact `O=` pattern strings stored in the signature
//! database. Both speak the same symbol vocabulary so the scorer can compare
//! their patterns character by character.

use serde::{Deserialize, Serialize};

/// Longest pattern either side will record
pub const MAX_PATTERN_LEN: usize = 31;

const KIND_EOL: u8 = 0;
const KIND_NOP: u8 = 1;
const KIND_MSS: u8 = 2;
const KIND_WSCALE: u8 = 3;
const KIND_SACK_PERMITTED: u8 = 4;
const KIND_TIMESTAMP: u8 = 8;

/// One symbol in a fingerprint pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionSymbol {
    Mss,
    Nop,
    WindowScale,
    Sack,
    Timestamp,
}

impl OptionSymbol {
    pub fn as_char(&self) -> char {
        match self {
            OptionSymbol::Mss => 'M',
            OptionSymbol::Nop => 'N',
            OptionSymbol::WindowScale => 'W',
            OptionSymbol::Sack => 'S',
            OptionSymbol::Timestamp => 'T',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'M' => Some(OptionSymbol::Mss),
            'N' => Some(OptionSymbol::Nop),
            'W' => Some(OptionSymbol::WindowScale),
            'S' => Some(OptionSymbol::Sack),
            'T' => Some(OptionSymbol::Timestamp),
            _ => None,
        }
    }
}

/// Decoded TCP options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpOpts {
    /// Maximum segment size, `None` when the option was absent
    pub mss: Option<u16>,
    /// Window scale shift count, `None` when the option was absent
    pub window_scale: Option<u8>,
    pub has_sack: bool,
    pub has_timestamp: bool,
    /// Option kinds in encounter order
    pub pattern: Vec<OptionSymbol>,
}

impl TcpOpts {
    /// Pattern rendered as a string such as `MNWST`
    pub fn pattern_string(&self) -> String {
        self.pattern.iter().map(OptionSymbol::as_char).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    fn push(&mut self, symbol: OptionSymbol) {
        if self.pattern.len() < MAX_PATTERN_LEN {
            self.pattern.push(symbol);
        }
    }
}

/// Result of decoding option bytes, with a printable summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedOptions {
    pub opts: TcpOpts,
    pub detail: String,
}

/// Decode the option bytes that follow the fixed 20-byte TCP header.
///
/// Truncated or malformed entries stop the walk; whatever was decoded up to
/// that point is returned.
pub fn decode(bytes: &[u8]) -> DecodedOptions {
    let mut opts = TcpOpts::default();
    let mut detail: Vec<String> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let kind = bytes[i];
        match kind {
            KIND_EOL => break,
            KIND_NOP => {
                opts.push(OptionSymbol::Nop);
                detail.push("NOP".to_string());
                i += 1;
                continue;
            }
            _ => {}
        }

        if i + 1 >= bytes.len() {
            break;
        }
        let len = bytes[i + 1] as usize;
        if len < 2 || i + len > bytes.len() {
            break;
        }
        let value = &bytes[i + 2..i + len];

        match kind {
            KIND_MSS if value.len() >= 2 => {
                let mss = u16::from_be_bytes([value[0], value[1]]);
                opts.mss = Some(mss);
                opts.push(OptionSymbol::Mss);
                detail.push(format!("MSS={}", mss));
            }
            KIND_WSCALE if !value.is_empty() => {
                opts.window_scale = Some(value[0]);
                opts.push(OptionSymbol::WindowScale);
                detail.push(format!("WS={}", value[0]));
            }
            KIND_SACK_PERMITTED => {
                opts.has_sack = true;
                opts.push(OptionSymbol::Sack);
                detail.push("SACK".to_string());
            }
            KIND_TIMESTAMP => {
                opts.has_timestamp = true;
                opts.push(OptionSymbol::Timestamp);
                detail.push("TS".to_string());
            }
            other => detail.push(format!("K{}", other)),
        }
        i += len;
    }

    DecodedOptions {
        opts,
        detail: detail.join(","),
    }
}

/// Encode a database `O=` value such as `M5B4NW8ST11` into [`TcpOpts`].
///
/// `M` and `W` take a hex value; digits after `T` are consumed and dropped.
/// Letters outside the vocabulary are skipped.
pub fn encode(pattern: &str) -> TcpOpts {
    let mut opts = TcpOpts::default();
    let chars: Vec<char> = pattern.trim().chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let symbol = OptionSymbol::from_char(chars[i]);
        i += 1;
        let Some(symbol) = symbol else { continue };

        let start = i;
        if matches!(
            symbol,
            OptionSymbol::Mss | OptionSymbol::WindowScale | OptionSymbol::Timestamp
        ) {
            while i < chars.len() && chars[i].is_ascii_hexdigit() {
                i += 1;
            }
        }
        let digits: String = chars[start..i].iter().collect();

        match symbol {
            OptionSymbol::Mss => opts.mss = u16::from_str_radix(&digits, 16).ok(),
            OptionSymbol::WindowScale => opts.window_scale = u8::from_str_radix(&digits, 16).ok(),
            OptionSymbol::Sack => opts.has_sack = true,
            OptionSymbol::Timestamp => opts.has_timestamp = true,
            OptionSymbol::Nop => {}
        }
        opts.push(symbol);
    }

    opts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_standard_syn_ack() {
        let bytes = [
            0x02, 0x04, 0x05, 0xb4, // MSS 1460
            0x04, 0x02, // SACK permitted
            0x08, 0x0a, 0, 0, 0, 1, 0, 0, 0, 0, // timestamp
            0x01, // NOP
            0x03, 0x03, 0x0a, // window scale 10
        ];
        let decoded = decode(&bytes);
        assert_eq!(decoded.opts.mss, Some(1460));
        assert_eq!(decoded.opts.window_scale, Some(10));
        assert!(decoded.opts.has_sack);
        assert!(decoded.opts.has_timestamp);
        assert_eq!(decoded.opts.pattern_string(), "MSTNW");
        assert_eq!(decoded.detail, "MSS=1460,SACK,TS,NOP,WS=10");
    }

    #[test]
    fn test_decode_stops_at_eol() {
        let decoded = decode(&[0x01, 0x00, 0x02, 0x04, 0x05, 0xb4]);
        assert_eq!(decoded.opts.pattern_string(), "N");
        assert_eq!(decoded.opts.mss, None);
    }

    #[test]
    fn test_decode_truncated_returns_partial() {
        // MSS intact, window scale claims 3 bytes but only 2 remain
        let decoded = decode(&[0x02, 0x04, 0x05, 0xb4, 0x03, 0x03]);
        assert_eq!(decoded.opts.pattern_string(), "M");
        assert_eq!(decoded.opts.window_scale, None);
    }

    #[test]
    fn test_decode_invalid_length_returns_partial() {
        let decoded = decode(&[0x01, 0x04, 0x01, 0x02, 0x04, 0x05, 0xb4]);
        assert_eq!(decoded.opts.pattern_string(), "N");
        assert!(!decoded.opts.has_sack);
    }

    #[test]
    fn test_decode_lone_kind_byte() {
        let decoded = decode(&[0x01, 0x02]);
        assert_eq!(decoded.opts.pattern_string(), "N");
    }

    #[test]
    fn test_decode_skips_unknown_kind() {
        let decoded = decode(&[0x1e, 0x04, 0xaa, 0xbb, 0x04, 0x02]);
        assert_eq!(decoded.opts.pattern_string(), "S");
        assert_eq!(decoded.detail, "K30,SACK");
    }

    #[test]
    fn test_encode_database_pattern() {
        let opts = encode("M5B4NW8ST11");
        assert_eq!(opts.mss, Some(0x5b4));
        assert_eq!(opts.window_scale, Some(8));
        assert!(opts.has_sack);
        assert!(opts.has_timestamp);
        assert_eq!(opts.pattern_string(), "MNWST");
    }

    #[test]
    fn test_encode_skips_unknown_letters() {
        let opts = encode("MFFFFXNLW0");
        assert_eq!(opts.mss, Some(0xffff));
        assert_eq!(opts.window_scale, Some(0));
        assert_eq!(opts.pattern_string(), "MNW");
    }

    #[test]
    fn test_encode_and_decode_agree() {
        let wire = decode(&[0x02, 0x04, 0x05, 0xb4, 0x01, 0x03, 0x03, 0x08, 0x04, 0x02]);
        let db = encode("M5B4NW8S");
        assert_eq!(wire.opts, db);
    }

    #[test]
    fn test_pattern_is_capped() {
        let opts = encode(&"N".repeat(64));
        assert_eq!(opts.pattern.len(), MAX_PATTERN_LEN);
        let decoded = decode(&[0x01; 64]);
        assert_eq!(decoded.opts.pattern.len(), MAX_PATTERN_LEN);
    }
}
