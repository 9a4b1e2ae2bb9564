//! conclave-election: fast leader election for a replicated ensemble.
//!
//! Given a set of peers that can reach each other over point-to-point
//! links, this crate elects a single leader whose transaction history
//! includes everything any prior leader may have acknowledged. Each peer
//! runs the same state machine; the outcome moves it into one of three
//! roles: leading, following, or observing.
//!
//! # Architecture
//!
//! - [`FastLeaderElection`] — the election loop plus its two messenger
//!   workers, wired together by unbounded queues.
//! - [`Notification`] / [`ToSend`] — the notification wire codec, covering
//!   three backward-compatible frame generations.
//! - [`QuorumPeer`] / [`LeaderHandle`] — seams to the hosting process.
//! - [`QuorumTransport`] — seam to the byte transport, with an in-process
//!   [`LoopbackNetwork`] implementation for tests and demos.
//!
//! Quorum arithmetic (who may vote, what counts as a majority) lives in
//! the `conclave-quorum` crate.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use conclave_election::{ElectionConfig, FastLeaderElection, LoopbackNetwork};
//!
//! let network = LoopbackNetwork::new();
//! let transport = std::sync::Arc::new(network.register(my_id));
//! let election = FastLeaderElection::new(peer, transport, ElectionConfig::default());
//! election.start();
//! let vote = election.look_for_leader().await?;
//! ```

mod config;
mod election;
mod error;
mod message;
mod peer;
mod transport;
mod vote;

pub use config::{ElectionConfig, FINALIZE_WAIT};
pub use election::FastLeaderElection;
pub use error::ElectionError;
pub use message::{encode_notification, Notification, NotificationFrame, ToSend, CURRENT_VERSION};
pub use peer::{LeaderHandle, QuorumPeer};
pub use transport::{LoopbackNetwork, LoopbackTransport, QuorumTransport, ReceivedFrame};
pub use vote::{LearnerType, ServerState, Vote};
