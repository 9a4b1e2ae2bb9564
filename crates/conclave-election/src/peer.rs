//! Seams between the election algorithm and its host peer.
//!
//! The algorithm itself owns nothing durable: identity, epochs, the
//! transaction log position, and the quorum configuration all belong to
//! the hosting process. It reaches them through [`QuorumPeer`], and the
//! host supplies whatever implementation fits — a full replicated server
//! in production, a scripted double in tests.

use std::io;
use std::sync::Arc;

use conclave_quorum::{QuorumVerifier, ServerId, VoteTracker};

use crate::vote::{LearnerType, ServerState, Vote};

/// Read/write access to the host peer's election-relevant state.
pub trait QuorumPeer: Send + Sync + 'static {
    /// This peer's configured server id.
    fn id(&self) -> ServerId;

    fn peer_state(&self) -> ServerState;
    fn set_peer_state(&self, state: ServerState);

    fn learner_type(&self) -> LearnerType;

    /// The last leadership epoch this peer acknowledged, read from durable
    /// storage. Failure here is fatal for election participation.
    fn current_epoch(&self) -> io::Result<i64>;

    /// Highest transaction id in this peer's log; `-1` for no history.
    fn last_logged_zxid(&self) -> i64;

    /// Snapshot of the active quorum configuration.
    fn quorum_verifier(&self) -> QuorumVerifier;

    /// A proposed-but-uncommitted configuration, if a reconfiguration is
    /// in flight.
    fn last_seen_quorum_verifier(&self) -> Option<QuorumVerifier>;

    /// Union of the voters in the current and (if any) next configuration.
    fn current_and_next_config_voters(&self) -> Vec<ServerId>;

    /// The vote this peer has committed to, used to answer peers that are
    /// still looking after the election has settled.
    fn current_vote(&self) -> Vote;

    /// Adopts a configuration with a higher version than the current one.
    fn process_reconfig(&self, qv: QuorumVerifier);

    /// Tells the host that the election is tearing itself down to restart
    /// under a replaced configuration, so a `None` result from the loop
    /// means "re-enter" rather than "interrupted".
    fn signal_election_restart(&self);

    /// Handle to the leader subsystem while this peer is leading.
    fn leader(&self) -> Option<Arc<dyn LeaderHandle>>;
}

/// The slice of the leader subsystem the receiver worker talks to.
pub trait LeaderHandle: Send + Sync {
    /// Records that `sid` was still looking for a leader after this peer
    /// won; the leader chases such stragglers during synchronization.
    fn report_looking_sid(&self, sid: ServerId);

    /// Hands over the set of votes that elected this leader.
    fn set_leading_vote_set(&self, vote_set: VoteTracker);
}
