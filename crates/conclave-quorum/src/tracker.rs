//! Acknowledgement tracking toward one or two quorum configurations.

use std::collections::HashSet;

use crate::verifier::{QuorumVerifier, ServerId};

/// Accumulates acknowledgements and answers "does every registered
/// configuration see a quorum?".
///
/// Normally a tracker holds a single verifier. While a reconfiguration is
/// in flight it holds two — the current and the proposed configuration —
/// and a candidate only wins once *both* memberships agree, so leadership
/// never changes hands on the strength of a quorum only one side accepts.
#[derive(Debug, Clone, Default)]
pub struct VoteTracker {
    pairs: Vec<VerifierAcks>,
}

#[derive(Debug, Clone)]
struct VerifierAcks {
    verifier: QuorumVerifier,
    acks: HashSet<ServerId>,
}

impl VoteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a configuration the ack set must satisfy.
    pub fn add_verifier(&mut self, verifier: QuorumVerifier) {
        self.pairs.push(VerifierAcks {
            verifier,
            acks: HashSet::new(),
        });
    }

    /// Records an acknowledgement from `sid` against every registered
    /// configuration.
    pub fn add_ack(&mut self, sid: ServerId) {
        for pair in &mut self.pairs {
            pair.acks.insert(sid);
        }
    }

    pub fn has_ack(&self, sid: ServerId) -> bool {
        self.pairs.iter().any(|p| p.acks.contains(&sid))
    }

    /// True iff every registered configuration reports a containing quorum.
    pub fn has_all_quorums(&self) -> bool {
        self.pairs
            .iter()
            .all(|p| p.verifier.contains_quorum(&p.acks))
    }

    /// The servers that acknowledged, deduplicated across configurations.
    /// The leader subsystem reads this to learn who elected it.
    pub fn acked_servers(&self) -> Vec<ServerId> {
        let mut sids: Vec<ServerId> = self
            .pairs
            .iter()
            .flat_map(|p| p.acks.iter().copied())
            .collect();
        sids.sort_unstable();
        sids.dedup();
        sids
    }
}
