//! Quorum verifiers: which servers may vote, and what counts as a majority.
//!
//! A verifier is a snapshot of one cluster configuration. The election
//! algorithm never mutates a verifier; reconfiguration replaces the whole
//! snapshot with one carrying a higher version number.
//!
//! Two verifier kinds exist:
//!
//! - [`QuorumMaj`] — (weighted) majority over a fixed set of voters.
//! - [`QuorumOracleMaj`] — majority plus an external [`Oracle`] tie-breaker,
//!   so a 2-node ensemble can survive the loss of one member.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::tracker::VoteTracker;

/// Identifier of a configured server, as carried on the wire.
pub type ServerId = i64;

/// Sentinel sid meaning "no vote". Observers propose this instead of a
/// real candidate.
pub const NO_VOTE: ServerId = ServerId::MIN;

/// External tie-breaker consulted by [`QuorumOracleMaj`].
///
/// The oracle grants a progress token to at most one side of a partitioned
/// 2-node ensemble. `ask` returns true iff the token is granted to the
/// calling node.
pub trait Oracle: fmt::Debug + Send + Sync {
    fn ask(&self) -> bool;
}

/// Oracle backed by a mastership file: the token is granted iff the file
/// currently contains `1`.
#[derive(Debug)]
pub struct FileOracle {
    path: PathBuf,
}

impl FileOracle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Oracle for FileOracle {
    fn ask(&self) -> bool {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents.trim() == "1",
            Err(e) => {
                warn!("failed to read oracle file {}: {e}", self.path.display());
                false
            }
        }
    }
}

/// In-memory oracle with a settable answer. Used to wire a programmatic
/// tie-breaker and throughout the test suites.
#[derive(Debug, Default)]
pub struct StaticOracle {
    granted: AtomicBool,
}

impl StaticOracle {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
        }
    }

    pub fn set(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }
}

impl Oracle for StaticOracle {
    fn ask(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}

/// Majority verifier over a fixed voter set.
///
/// Every voter carries a weight. With all weights equal to 1 this is the
/// familiar `n/2 + 1` rule; otherwise a set of acknowledgements is a quorum
/// iff it holds a strict majority of the total weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumMaj {
    voting_members: BTreeMap<ServerId, u64>,
    version: i64,
}

impl QuorumMaj {
    pub fn new(voting_members: BTreeMap<ServerId, u64>) -> Self {
        Self::with_version(voting_members, 0)
    }

    pub fn with_version(voting_members: BTreeMap<ServerId, u64>, version: i64) -> Self {
        Self {
            voting_members,
            version,
        }
    }

    pub fn voting_members(&self) -> &BTreeMap<ServerId, u64> {
        &self.voting_members
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Weight of `sid` in this configuration; 0 for non-voters.
    pub fn weight(&self, sid: ServerId) -> u64 {
        self.voting_members.get(&sid).copied().unwrap_or(0)
    }

    fn total_weight(&self) -> u64 {
        self.voting_members.values().sum()
    }

    /// True iff `ack_set` holds a strict majority of the voting weight.
    pub fn contains_quorum(&self, ack_set: &HashSet<ServerId>) -> bool {
        let total = self.total_weight();
        if total == 0 {
            return false;
        }
        let acked: u64 = ack_set.iter().map(|sid| self.weight(*sid)).sum();
        2 * acked > total
    }
}

/// Majority verifier with an oracle tie-breaker.
///
/// Behaves exactly like the wrapped [`QuorumMaj`] while true majorities are
/// reachable. When they are not — the 2-node ensemble that lost a member —
/// a non-empty ack set may still be accepted as a quorum, provided the
/// oracle grants this node the progress token and `need_oracle` is set.
#[derive(Debug, Clone)]
pub struct QuorumOracleMaj {
    base: QuorumMaj,
    oracle: Arc<dyn Oracle>,
    /// Serialized in the configuration string so peers can reconstruct a
    /// compatible verifier; typically the mastership file path.
    oracle_path: String,
    /// Cleared by the leader subsystem once enough followers are synced
    /// that plain majorities suffice again.
    need_oracle: bool,
}

impl QuorumOracleMaj {
    pub fn new(base: QuorumMaj, oracle_path: impl Into<String>) -> Self {
        let oracle_path = oracle_path.into();
        let oracle: Arc<dyn Oracle> = Arc::new(FileOracle::new(&oracle_path));
        Self {
            base,
            oracle,
            oracle_path,
            need_oracle: true,
        }
    }

    /// Builds an oracle-majority verifier around a caller-supplied oracle.
    pub fn with_oracle(
        base: QuorumMaj,
        oracle: Arc<dyn Oracle>,
        oracle_path: impl Into<String>,
    ) -> Self {
        Self {
            base,
            oracle,
            oracle_path: oracle_path.into(),
            need_oracle: true,
        }
    }

    pub fn oracle_path(&self) -> &str {
        &self.oracle_path
    }

    pub fn need_oracle(&self) -> bool {
        self.need_oracle
    }

    pub fn set_need_oracle(&mut self, need: bool) {
        self.need_oracle = need;
    }

    pub fn ask_oracle(&self) -> bool {
        self.oracle.ask()
    }

    fn contains_quorum(&self, ack_set: &HashSet<ServerId>) -> bool {
        if self.base.contains_quorum(ack_set) {
            return true;
        }
        // No true majority. The oracle may still authorize progress for
        // the surviving side of a 2-node ensemble.
        if self.need_oracle && !ack_set.is_empty() {
            return self.ask_oracle();
        }
        false
    }
}

/// A quorum configuration snapshot, one of the supported verifier kinds.
///
/// The election algorithm only ever talks to this enum; the concrete
/// arithmetic lives in the variants.
#[derive(Debug, Clone)]
pub enum QuorumVerifier {
    Majority(QuorumMaj),
    OracleMajority(QuorumOracleMaj),
}

impl QuorumVerifier {
    /// Convenience constructor: unit-weight majority over `voters`,
    /// configuration version 0.
    pub fn majority(voters: impl IntoIterator<Item = ServerId>) -> Self {
        QuorumVerifier::Majority(QuorumMaj::new(
            voters.into_iter().map(|sid| (sid, 1)).collect(),
        ))
    }

    pub fn voting_members(&self) -> &BTreeMap<ServerId, u64> {
        match self {
            QuorumVerifier::Majority(m) => m.voting_members(),
            QuorumVerifier::OracleMajority(o) => o.base.voting_members(),
        }
    }

    /// True iff `sid` may vote under this configuration.
    pub fn is_voting_member(&self, sid: ServerId) -> bool {
        self.voting_members().contains_key(&sid)
    }

    pub fn weight(&self, sid: ServerId) -> u64 {
        match self {
            QuorumVerifier::Majority(m) => m.weight(sid),
            QuorumVerifier::OracleMajority(o) => o.base.weight(sid),
        }
    }

    pub fn contains_quorum(&self, ack_set: &HashSet<ServerId>) -> bool {
        match self {
            QuorumVerifier::Majority(m) => m.contains_quorum(ack_set),
            QuorumVerifier::OracleMajority(o) => o.contains_quorum(ack_set),
        }
    }

    pub fn version(&self) -> i64 {
        match self {
            QuorumVerifier::Majority(m) => m.version(),
            QuorumVerifier::OracleMajority(o) => o.base.version(),
        }
    }

    /// Whether this configuration relies on an oracle tie-breaker.
    pub fn need_oracle(&self) -> bool {
        match self {
            QuorumVerifier::Majority(_) => false,
            QuorumVerifier::OracleMajority(o) => o.need_oracle(),
        }
    }

    /// Consults the oracle. Always false for plain majority verifiers.
    pub fn ask_oracle(&self) -> bool {
        match self {
            QuorumVerifier::Majority(_) => false,
            QuorumVerifier::OracleMajority(o) => o.ask_oracle(),
        }
    }

    /// Re-examines a vote tracker after an idle election round.
    ///
    /// Returns true iff the election may finalize on the current proposal
    /// without further notifications: only the oracle variant can say so,
    /// and only when the tracker already held all quorums and at least one
    /// backoff step has elapsed (`idle`).
    pub fn revalidate_vote_set(&self, vote_set: Option<&VoteTracker>, idle: bool) -> bool {
        match self {
            QuorumVerifier::Majority(_) => false,
            QuorumVerifier::OracleMajority(_) => {
                idle && vote_set.is_some_and(|v| v.has_all_quorums())
            }
        }
    }
}

/// Equality is configuration equality: same membership, weights, version,
/// and verifier kind. Oracle identity is deliberately excluded — two
/// snapshots parsed from the same wire bytes must compare equal.
impl PartialEq for QuorumVerifier {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (QuorumVerifier::Majority(a), QuorumVerifier::Majority(b)) => a == b,
            (QuorumVerifier::OracleMajority(a), QuorumVerifier::OracleMajority(b)) => {
                a.base == b.base && a.oracle_path == b.oracle_path
            }
            _ => false,
        }
    }
}

impl Eq for QuorumVerifier {}
