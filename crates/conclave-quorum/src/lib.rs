//! conclave-quorum: membership and majority arithmetic for leader election.
//!
//! This crate answers exactly one question for the election layer: given a
//! set of acknowledgements, has a quorum formed? It provides:
//!
//! - [`QuorumVerifier`] — a configuration snapshot (plain or weighted
//!   majority, optionally oracle-assisted) with its wire serialization.
//! - [`VoteTracker`] — acknowledgement accounting against one or two
//!   configurations at once, for elections that straddle a reconfiguration.
//!
//! It knows nothing about votes, zxids, or transports; those live in
//! `conclave-election`.

mod config;
mod error;
mod tracker;
mod verifier;

pub use config::parse_config;
pub use error::ConfigParseError;
pub use tracker::VoteTracker;
pub use verifier::{
    FileOracle, Oracle, QuorumMaj, QuorumOracleMaj, QuorumVerifier, ServerId, StaticOracle,
    NO_VOTE,
};
