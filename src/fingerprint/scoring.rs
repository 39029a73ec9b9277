//! Weighted signature scoring and ranking
//!
//! Every signal adds or subtracts a fixed weight; nothing is normalised.
//! Signatures outside the Windows and Linux families are excluded outright.

use super::{Fingerprint, FingerprintDatabase, OsFamily, ScanResult};
use crate::network::options::TcpOpts;
use log::debug;
use serde::{Deserialize, Serialize};

/// Score assigned to signatures from families we do not rank
pub const EXCLUDED_SCORE: i32 = i32::MIN / 2;

/// Candidates at or below this score are dropped before ranking
pub const DISCARD_THRESHOLD: i32 = -100;

pub const DEFAULT_TOP_MATCHES: usize = 3;

const FAMILY_MATCH: i32 = 200;
const FAMILY_CONFLICT: i32 = -400;

const TTL_IN_RANGE: i32 = 100;
const TTL_CLOSE: i32 = 80;
const TTL_NEAR: i32 = 40;
const TTL_FAR: i32 = -50;

const WINDOW_EXACT: i32 = 150;
const WINDOW_NEAR: i32 = 50;
const WINDOW_WINDOWS_TYPICAL: i32 = 50;

const PATTERN_EXACT: i32 = 300;
const PATTERN_SIMILAR: i32 = 150;
const MSS_EXACT: i32 = 100;
const MSS_NEAR: i32 = 30;
const WSCALE_EXACT: i32 = 100;
const WSCALE_NEAR: i32 = 30;
const SACK_MATCH: i32 = 20;
const TIMESTAMP_MATCH: i32 = 20;

const DF_MATCH: i32 = 30;
const T3_MATCH: i32 = 100;
const T3_MISMATCH: i32 = -50;
const T2_MATCH: i32 = 50;

/// Computes a compatibility score between one observation and one signature
pub trait Scorer {
    fn score(&self, scan: &ScanResult, fingerprint: &Fingerprint) -> i32;
}

/// The default additive scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedScorer;

impl Scorer for WeightedScorer {
    fn score(&self, scan: &ScanResult, fingerprint: &Fingerprint) -> i32 {
        let family = fingerprint.family();
        if !family.is_known() {
            return EXCLUDED_SCORE;
        }

        family_score(scan.ttl_family(), family)
            + ttl_score(scan.ttl, fingerprint)
            + window_score(scan.window, fingerprint, family)
            + option_score(&scan.opts, declared_options(fingerprint))
            + behavior_score(scan, fingerprint)
    }
}

fn family_score(observed: OsFamily, expected: OsFamily) -> i32 {
    if observed == expected {
        FAMILY_MATCH
    } else if observed.is_known() && expected.is_known() {
        FAMILY_CONFLICT
    } else {
        0
    }
}

/// Symmetric distance from the database guess; hop direction is not assumed.
fn ttl_score(ttl: u8, fp: &Fingerprint) -> i32 {
    let mut score = 0;

    if let (Some(min), Some(max)) = (fp.ttl_min, fp.ttl_max) {
        if (min..=max).contains(&ttl) {
            score += TTL_IN_RANGE;
        }
    }

    if let Some(guess) = fp.ttl_guess {
        score += match ttl.abs_diff(guess) {
            0..=2 => TTL_CLOSE,
            3..=5 => TTL_NEAR,
            6..=30 => 0,
            _ => TTL_FAR,
        };
    }

    score
}

fn window_score(window: u16, fp: &Fingerprint, family: OsFamily) -> i32 {
    let mut score = 0;

    let exact = fp.window == Some(window) || fp.window_values.contains(&Some(window));
    if exact {
        score += WINDOW_EXACT;
    } else if let Some(expected) = fp.window {
        if window.abs_diff(expected) <= 1000 {
            score += WINDOW_NEAR;
        }
    }

    if window == u16::MAX && family == OsFamily::Windows {
        score += WINDOW_WINDOWS_TYPICAL;
    }

    score
}

/// Expected options when the signature has an `O=` key. An empty value means
/// the reply carries no options.
fn declared_options(fp: &Fingerprint) -> Option<&TcpOpts> {
    fp.options.as_ref().map(|_| &fp.opts)
}

fn option_score(observed: &TcpOpts, expected: Option<&TcpOpts>) -> i32 {
    let Some(expected) = expected else {
        return 0;
    };
    let mut score = 0;

    if observed.pattern == expected.pattern {
        score += PATTERN_EXACT;
    } else if positional_similarity_at_least(observed, expected, 4, 5) {
        score += PATTERN_SIMILAR;
    }

    if let (Some(a), Some(b)) = (observed.mss, expected.mss) {
        if a == b {
            score += MSS_EXACT;
        } else if a.abs_diff(b) < 100 {
            score += MSS_NEAR;
        }
    }

    if let (Some(a), Some(b)) = (observed.window_scale, expected.window_scale) {
        if a == b {
            score += WSCALE_EXACT;
        } else if a.abs_diff(b) <= 2 {
            score += WSCALE_NEAR;
        }
    }

    if observed.has_sack == expected.has_sack {
        score += SACK_MATCH;
    }
    if observed.has_timestamp == expected.has_timestamp {
        score += TIMESTAMP_MATCH;
    }

    score
}

/// Share of equal symbols at equal positions, measured over the longer pattern
fn positional_similarity_at_least(a: &TcpOpts, b: &TcpOpts, num: usize, den: usize) -> bool {
    let longest = a.pattern.len().max(b.pattern.len());
    if longest == 0 {
        return false;
    }
    let same = a
        .pattern
        .iter()
        .zip(&b.pattern)
        .filter(|(x, y)| x == y)
        .count();
    same * den >= longest * num
}

fn behavior_score(scan: &ScanResult, fp: &Fingerprint) -> i32 {
    let mut score = 0;

    if fp.df_flag == Some(scan.df_flag) {
        score += DF_MATCH;
    }
    if let Some(expected) = fp.t3_responds {
        score += if expected == scan.t3_responded {
            T3_MATCH
        } else {
            T3_MISMATCH
        };
    }
    if fp.t2_responds == Some(scan.t2_responded) {
        score += T2_MATCH;
    }

    score
}

/// Qualitative label from fixed score thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub const HIGH_THRESHOLD: i32 = 700;
    pub const MEDIUM_THRESHOLD: i32 = 400;

    pub fn from_score(score: i32) -> Self {
        if score >= Self::HIGH_THRESHOLD {
            Confidence::High
        } else if score >= Self::MEDIUM_THRESHOLD {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::High => write!(f, "HIGH"),
            Confidence::Medium => write!(f, "MEDIUM"),
            Confidence::Low => write!(f, "LOW"),
        }
    }
}

/// A scored candidate borrowed from the database
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    /// Position in the database, which is also the tie-break order
    pub index: usize,
    pub fingerprint: &'a Fingerprint,
    pub score: i32,
}

/// Report entry for one ranked candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedMatch {
    pub name: String,
    pub score: i32,
    pub family: OsFamily,
    pub confidence: Confidence,
}

impl From<&Match<'_>> for RankedMatch {
    fn from(m: &Match<'_>) -> Self {
        Self {
            name: m.fingerprint.name.clone(),
            score: m.score,
            family: m.fingerprint.family(),
            confidence: Confidence::from_score(m.score),
        }
    }
}

/// Score every signature, drop the hopeless ones and sort best first.
/// The sort is stable, so equal scores keep database order.
pub fn rank<'a, S>(scorer: &S, scan: &ScanResult, database: &'a FingerprintDatabase) -> Vec<Match<'a>>
where
    S: Scorer + ?Sized,
{
    let mut matches: Vec<Match<'a>> = database
        .iter()
        .enumerate()
        .map(|(index, fingerprint)| Match {
            index,
            fingerprint,
            score: scorer.score(scan, fingerprint),
        })
        .filter(|m| m.score > DISCARD_THRESHOLD)
        .collect();

    matches.sort_by(|a, b| b.score.cmp(&a.score));
    debug!(
        "Scored {} signatures, {} kept after discarding",
        database.len(),
        matches.len()
    );
    matches
}

/// The `limit` best candidates as report entries
pub fn top_matches<S>(
    scorer: &S,
    scan: &ScanResult,
    database: &FingerprintDatabase,
    limit: usize,
) -> Vec<RankedMatch>
where
    S: Scorer + ?Sized,
{
    rank(scorer, scan, database)
        .iter()
        .take(limit)
        .map(RankedMatch::from)
        .collect()
}
