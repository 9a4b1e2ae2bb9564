//! Error types for quorum configuration handling.

/// Error returned when parsing a serialized quorum configuration fails.
#[derive(Debug, thiserror::Error)]
pub enum ConfigParseError {
    /// A `server.<sid>=<weight>` line is structurally broken.
    #[error("invalid server line: {0}")]
    InvalidServerLine(String),

    /// The sid portion of a server line is not a 64-bit integer.
    #[error("invalid server id: {0}")]
    InvalidServerId(String),

    /// The weight portion of a server line is not an unsigned integer.
    #[error("invalid weight: {0}")]
    InvalidWeight(String),

    /// The `version=` line does not hold a hexadecimal number.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// A line matched none of the known keys.
    #[error("unrecognized configuration line: {0}")]
    UnknownLine(String),

    /// The configuration names no voting members at all.
    #[error("configuration has no voting members")]
    NoVotingMembers,
}
