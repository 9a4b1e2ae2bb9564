//! Votes and the server states they carry.

use std::fmt;

use conclave_quorum::ServerId;

/// Role a server currently plays in the ensemble.
///
/// The wire discriminants are fixed; three generations of the notification
/// format all use them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Searching for a leader.
    Looking = 0,
    /// Synchronizing with an elected leader.
    Following = 1,
    /// Elected leader.
    Leading = 2,
    /// Non-voting learner.
    Observing = 3,
}

impl ServerState {
    /// Maps a wire discriminant to a state. Unknown values yield `None`
    /// and the carrying notification is dropped.
    pub fn from_wire(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(ServerState::Looking),
            1 => Some(ServerState::Following),
            2 => Some(ServerState::Leading),
            3 => Some(ServerState::Observing),
            _ => None,
        }
    }

    pub fn as_wire(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerState::Looking => write!(f, "looking"),
            ServerState::Following => write!(f, "following"),
            ServerState::Leading => write!(f, "leading"),
            ServerState::Observing => write!(f, "observing"),
        }
    }
}

/// Whether a peer votes in elections or only learns their outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnerType {
    Participant,
    Observer,
}

/// A candidate a peer backs: who should lead, how much history that
/// candidate has, and in which election round the opinion was formed.
#[derive(Debug, Clone, Copy)]
pub struct Vote {
    /// Notification format version the vote arrived in (0 for locally
    /// created votes).
    pub version: i32,
    /// Proposed leader.
    pub leader: ServerId,
    /// Last transaction id of the proposed leader.
    pub zxid: i64,
    /// Election round of the sender; `-1` for committed votes that
    /// outlived their round.
    pub election_epoch: i64,
    /// Leadership epoch of the proposed leader.
    pub peer_epoch: i64,
    /// State of the peer that cast this vote.
    pub state: ServerState,
}

impl Vote {
    pub fn new(leader: ServerId, zxid: i64, election_epoch: i64, peer_epoch: i64) -> Self {
        Self::with_state(leader, zxid, election_epoch, peer_epoch, ServerState::Looking)
    }

    pub fn with_state(
        leader: ServerId,
        zxid: i64,
        election_epoch: i64,
        peer_epoch: i64,
        state: ServerState,
    ) -> Self {
        Self {
            version: 0,
            leader,
            zxid,
            election_epoch,
            peer_epoch,
            state,
        }
    }

    pub fn full(
        version: i32,
        leader: ServerId,
        zxid: i64,
        election_epoch: i64,
        peer_epoch: i64,
        state: ServerState,
    ) -> Self {
        Self {
            version,
            leader,
            zxid,
            election_epoch,
            peer_epoch,
            state,
        }
    }

    /// A vote observed outside any particular election round, such as the
    /// loop's current proposal handed to external observers.
    pub fn proposal(leader: ServerId, zxid: i64, peer_epoch: i64) -> Self {
        Self::new(leader, zxid, -1, peer_epoch)
    }
}

/// Tally equality: two votes back the same outcome iff leader, zxid,
/// election epoch, and peer epoch all match. The sender's state and the
/// wire format version are deliberately excluded — a FOLLOWING and a
/// LEADING notification for the same leader count toward the same quorum.
impl PartialEq for Vote {
    fn eq(&self, other: &Self) -> bool {
        self.leader == other.leader
            && self.zxid == other.zxid
            && self.election_epoch == other.election_epoch
            && self.peer_epoch == other.peer_epoch
    }
}

impl Eq for Vote {}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, 0x{:x}, 0x{:x}, 0x{:x})",
            self.leader, self.zxid, self.election_epoch, self.peer_epoch
        )
    }
}
