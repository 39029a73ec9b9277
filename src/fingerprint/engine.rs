//! Detection engine: runs the probe sequence and ranks the database

use super::behavior::{BehaviorVerdict, ProbeVector};
use super::scoring::{self, RankedMatch, Scorer, WeightedScorer, DEFAULT_TOP_MATCHES};
use super::{FingerprintDatabase, ScanResult};
use crate::network::packet::ProbeReply;
use crate::network::{ProbeKind, ProbeTransport};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Probes in the order they are sent. The SYN probe gates the rest.
pub const PROBE_SEQUENCE: [ProbeKind; 4] = [
    ProbeKind::Syn,
    ProbeKind::Null,
    ProbeKind::Xmas,
    ProbeKind::Ack,
];

/// Outcome of one fingerprinting run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FingerprintReport {
    /// The SYN probe drew no reply; nothing was scored
    Unreachable,
    Completed {
        scan: ScanResult,
        ranked: Vec<RankedMatch>,
        verdict: BehaviorVerdict,
    },
}

impl FingerprintReport {
    pub fn is_reachable(&self) -> bool {
        matches!(self, FingerprintReport::Completed { .. })
    }

    /// Highest ranked candidate, if any survived scoring
    pub fn best_match(&self) -> Option<&RankedMatch> {
        match self {
            FingerprintReport::Completed { ranked, .. } => ranked.first(),
            FingerprintReport::Unreachable => None,
        }
    }
}

/// OS detection engine over a probe transport and a scorer
pub struct OsDetectionEngine<T, S = WeightedScorer> {
    transport: T,
    scorer: S,
    database: FingerprintDatabase,
    top_matches: usize,
}

impl<T: ProbeTransport> OsDetectionEngine<T, WeightedScorer> {
    pub fn new(transport: T, database: FingerprintDatabase) -> Self {
        Self {
            transport,
            scorer: WeightedScorer,
            database,
            top_matches: DEFAULT_TOP_MATCHES,
        }
    }
}

impl<T: ProbeTransport, S: Scorer> OsDetectionEngine<T, S> {
    pub fn with_scorer<S2: Scorer>(self, scorer: S2) -> OsDetectionEngine<T, S2> {
        OsDetectionEngine {
            transport: self.transport,
            scorer,
            database: self.database,
            top_matches: self.top_matches,
        }
    }

    pub fn with_top_matches(mut self, top_matches: usize) -> Self {
        self.top_matches = top_matches;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the full probe sequence against the transport's target.
    ///
    /// Probes go out one after another. A transport failure on any probe is
    /// logged and counted as silence.
    pub async fn run(&self) -> FingerprintReport {
        let mut vector = ProbeVector::default();

        let Some(syn_reply) = self.probe(ProbeKind::Syn).await else {
            info!("No reply to the SYN probe, target is down or filtered");
            return FingerprintReport::Unreachable;
        };
        vector.record(ProbeKind::Syn, true);

        let mut scan = observe(&syn_reply);

        for kind in PROBE_SEQUENCE.iter().skip(1).copied() {
            let replied = self.probe(kind).await.is_some();
            vector.record(kind, replied);
        }
        scan.t2_responded = vector.null;
        scan.t3_responded = vector.xmas;
        scan.t4_responded = vector.ack;

        let ranked = scoring::top_matches(&self.scorer, &scan, &self.database, self.top_matches);
        let verdict = BehaviorVerdict::from_vector(vector);
        debug!(
            "Result vector {}, behavior points to {} ({} vs {})",
            vector, verdict.family, verdict.linux_votes, verdict.windows_votes
        );

        FingerprintReport::Completed {
            scan,
            ranked,
            verdict,
        }
    }

    async fn probe(&self, kind: ProbeKind) -> Option<ProbeReply> {
        match self.transport.exchange(kind).await {
            Ok(Some(reply)) => {
                info!(
                    "{}: reply flags={} ttl={} window={}",
                    kind, reply.flags, reply.ttl, reply.window
                );
                Some(reply)
            }
            Ok(None) => {
                debug!("{}: no reply", kind);
                None
            }
            Err(e) => {
                warn!("{}: probe failed: {}", kind, e);
                None
            }
        }
    }
}

/// Build the observation from the SYN reply
fn observe(reply: &ProbeReply) -> ScanResult {
    let decoded = reply.decode_options();
    if !decoded.detail.is_empty() {
        debug!("SYN reply options: {}", decoded.detail);
    }

    ScanResult {
        got_response: true,
        ttl: reply.ttl,
        window: reply.window,
        df_flag: reply.dont_fragment,
        flags: reply.flags,
        options: decoded.opts.pattern_string(),
        opts: decoded.opts,
        ..Default::default()
    }
}
