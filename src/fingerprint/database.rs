//! Signature database loader
//!
//! The file is a sequence of blocks:
//!
//! ```text
//! # comment
//! Fingerprint Linux 5.4
//! T1(T=3B-45%TG=40%W=FAF0%DF=Y%O=M5B4ST11NW7)
//! T2(R=N)
//! T3(R=Y)
//! WIN(W1=FAF0%W2=FAF0%W3=FAF0%W4=FAF0%W5=FAF0%W6=FAF0)
//! ```
//!
//! TTL, window, DF and option keys are read from `T1(` only; `T2(` and `T3(`
//! contribute nothing but `R=`.
//!
//! Numeric values are hexadecimal. A value that fails to parse leaves its
//! field unknown and loading carries on.

use super::Fingerprint;
use crate::network::options;
use log::{debug, info};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Ordered, append-only collection of signatures.
///
/// File order is preserved and doubles as the tie-break when scores are equal.
#[derive(Debug, Clone, Default)]
pub struct FingerprintDatabase {
    entries: Vec<Fingerprint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    T1,
    T2,
    T3,
    Win,
}

impl Section {
    fn from_prefix(line: &str) -> Option<(Self, &str)> {
        let (section, rest) = if let Some(rest) = line.strip_prefix("T1(") {
            (Section::T1, rest)
        } else if let Some(rest) = line.strip_prefix("T2(") {
            (Section::T2, rest)
        } else if let Some(rest) = line.strip_prefix("T3(") {
            (Section::T3, rest)
        } else if let Some(rest) = line.strip_prefix("WIN(") {
            (Section::Win, rest)
        } else {
            return None;
        };
        let body = rest.split(')').next().unwrap_or_default();
        Some((section, body))
    }
}

impl FingerprintDatabase {
    pub fn new(entries: Vec<Fingerprint>) -> Self {
        Self { entries }
    }

    /// Load a database file. Only a failure to open the file is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let db = Self::from_reader(file);
        info!("Loaded {} signatures from {}", db.len(), path.display());
        Ok(db)
    }

    /// Parse signatures from any reader. Read errors end the parse early;
    /// records collected so far are kept.
    pub fn from_reader<R: Read>(reader: R) -> Self {
        let mut reader = BufReader::new(reader);
        let mut entries: Vec<Fingerprint> = Vec::new();
        let mut current: Option<usize> = None;
        let mut raw = Vec::new();

        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("Stopping database read early: {}", e);
                    break;
                }
            }
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches(['\r', '\n']).trim_start();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = record_name(line) {
                if name.is_empty() {
                    current = None;
                    continue;
                }
                entries.push(Fingerprint::new(name));
                current = Some(entries.len() - 1);
                continue;
            }

            let (Some(index), Some((section, body))) = (current, Section::from_prefix(line)) else {
                continue;
            };
            apply_section(&mut entries[index], section, body);
        }

        Self { entries }
    }

    pub fn parse_str(text: &str) -> Self {
        Self::from_reader(text.as_bytes())
    }

    pub fn entries(&self) -> &[Fingerprint] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Fingerprint> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Fingerprint> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a FingerprintDatabase {
    type Item = &'a Fingerprint;
    type IntoIter = std::slice::Iter<'a, Fingerprint>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Name of a `Fingerprint <name>` header line, possibly empty
fn record_name(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("Fingerprint")?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

fn apply_section(fp: &mut Fingerprint, section: Section, body: &str) {
    for token in body.split('%') {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match (section, key) {
            (Section::T1, "T") => {
                let (min, max) = parse_ttl_range(value);
                fp.ttl_min = min;
                fp.ttl_max = max;
            }
            (Section::T1, "TG") => fp.ttl_guess = parse_hex(value),
            (Section::T1, "W") => fp.window = parse_hex(value),
            (Section::T1, "DF") => fp.df_flag = parse_yes_no(value),
            (Section::T1, "O") => {
                fp.opts = options::encode(value);
                fp.options = Some(value.to_string());
            }
            (Section::T2, "R") => fp.t2_responds = parse_yes_no(value),
            (Section::T3, "R") => fp.t3_responds = parse_yes_no(value),
            (Section::Win, key) => {
                let slot = key
                    .strip_prefix('W')
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|n| (1..=6).contains(n));
                if let Some(n) = slot {
                    fp.window_values[n - 1] = parse_hex(value);
                }
            }
            _ => {}
        }
    }
}

/// Parse a hex value; `a|b` alternatives keep the first.
fn parse_hex<T: TryFrom<u32>>(value: &str) -> Option<T> {
    let first = value.split('|').next()?.trim();
    let parsed = u32::from_str_radix(first, 16).ok().and_then(|v| T::try_from(v).ok());
    if parsed.is_none() {
        debug!("Ignoring malformed hex value {:?}", value);
    }
    parsed
}

/// `lo-hi` or a single value applied to both bounds
fn parse_ttl_range(value: &str) -> (Option<u8>, Option<u8>) {
    match value.split_once('-') {
        Some((lo, hi)) => {
            let lo: Option<u8> = parse_hex(lo);
            let hi: Option<u8> = parse_hex(hi);
            match (lo, hi) {
                (Some(lo), Some(hi)) if lo <= hi => (Some(lo), Some(hi)),
                _ => (None, None),
            }
        }
        None => {
            let single = parse_hex(value);
            (single, single)
        }
    }
}

fn parse_yes_no(value: &str) -> Option<bool> {
    match value {
        "Y" => Some(true),
        "N" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::options::OptionSymbol;

    #[test]
    fn test_parse_t1_line() {
        let db = FingerprintDatabase::parse_str(
            "Fingerprint Linux 2.6\nT1(T=40-45%TG=40%W=16D0%DF=Y%O=M5B4NW8ST11)\n",
        );
        let fp = &db.entries()[0];
        assert_eq!(fp.ttl_min, Some(0x40));
        assert_eq!(fp.ttl_max, Some(0x45));
        assert_eq!(fp.ttl_guess, Some(0x40));
        assert_eq!(fp.window, Some(0x16D0));
        assert_eq!(fp.df_flag, Some(true));
        assert_eq!(fp.options.as_deref(), Some("M5B4NW8ST11"));

        let symbols = [
            OptionSymbol::Mss,
            OptionSymbol::Nop,
            OptionSymbol::WindowScale,
            OptionSymbol::Sack,
            OptionSymbol::Timestamp,
        ];
        let positions: Vec<usize> = symbols
            .iter()
            .map(|s| fp.opts.pattern.iter().position(|p| p == s).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_single_ttl_applies_to_both_bounds() {
        let db = FingerprintDatabase::parse_str("Fingerprint X Linux\nT1(T=80)\n");
        assert_eq!(db.entries()[0].ttl_min, Some(0x80));
        assert_eq!(db.entries()[0].ttl_max, Some(0x80));
    }

    #[test]
    fn test_malformed_win_field_stays_unknown() {
        let db = FingerprintDatabase::parse_str(
            "Fingerprint Windows 10\n\
             WIN(W1=FFFF%W2=2000%W3=ZZZZ%W4=0%W5=FAF0%W6=FFFF)\n\
             Fingerprint Linux 5\nT1(W=FAF0)\n",
        );
        assert_eq!(db.len(), 2);
        let win = &db.entries()[0].window_values;
        assert_eq!(win[0], Some(0xFFFF));
        assert_eq!(win[2], None);
        assert_eq!(win[3], Some(0));
        assert_eq!(db.entries()[1].window, Some(0xFAF0));
    }

    #[test]
    fn test_response_flags_by_section() {
        let db = FingerprintDatabase::parse_str(
            "Fingerprint Linux\nT1(R=Y)\nT2(R=N)\nT3(R=Y%DF=N)\n",
        );
        let fp = &db.entries()[0];
        assert_eq!(fp.t2_responds, Some(false));
        assert_eq!(fp.t3_responds, Some(true));
        assert_eq!(fp.df_flag, None);
    }

    #[test]
    fn test_observation_keys_only_from_t1() {
        let db = FingerprintDatabase::parse_str(
            "Fingerprint Linux\nT1(DF=N%W=FAF0)\nT3(R=Y%DF=Y%W=FFFF%TG=40%O=M5B4)\n",
        );
        let fp = &db.entries()[0];
        assert_eq!(fp.df_flag, Some(false));
        assert_eq!(fp.window, Some(0xFAF0));
        assert_eq!(fp.ttl_guess, None);
        assert_eq!(fp.options, None);
        assert_eq!(fp.t3_responds, Some(true));
    }

    #[test]
    fn test_comments_blank_lines_and_crlf() {
        let db = FingerprintDatabase::parse_str(
            "# header\r\n\r\nFingerprint Microsoft Windows 7\r\n# inline comment\r\nT1(TG=80)\r\n",
        );
        assert_eq!(db.len(), 1);
        assert_eq!(db.entries()[0].name, "Microsoft Windows 7");
        assert_eq!(db.entries()[0].ttl_guess, Some(0x80));
    }

    #[test]
    fn test_sections_before_first_record_are_ignored() {
        let db = FingerprintDatabase::parse_str("T1(TG=40)\nFingerprint Linux\n");
        assert_eq!(db.len(), 1);
        assert_eq!(db.entries()[0].ttl_guess, None);
    }

    #[test]
    fn test_duplicate_names_preserve_order() {
        let db = FingerprintDatabase::parse_str(
            "Fingerprint Linux\nT1(TG=40)\nFingerprint Linux\nT1(TG=3F)\n",
        );
        assert_eq!(db.len(), 2);
        assert_eq!(db.entries()[0].ttl_guess, Some(0x40));
        assert_eq!(db.entries()[1].ttl_guess, Some(0x3F));
    }

    #[test]
    fn test_invalid_ttl_range_is_unknown() {
        let db = FingerprintDatabase::parse_str("Fingerprint Linux\nT1(T=45-40%TG=GG)\n");
        let fp = &db.entries()[0];
        assert_eq!((fp.ttl_min, fp.ttl_max), (None, None));
        assert_eq!(fp.ttl_guess, None);
    }

    #[test]
    fn test_nameless_record_is_dropped() {
        let db = FingerprintDatabase::parse_str("Fingerprint Linux\nFingerprint\nT1(TG=40)\n");
        assert_eq!(db.len(), 1);
        assert_eq!(db.entries()[0].ttl_guess, None);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(FingerprintDatabase::load("/nonexistent/osprobe.db").is_err());
    }
}
