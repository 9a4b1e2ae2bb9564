//! Error types for the election crate.

/// Errors that abort an election instance.
///
/// Almost every failure in the election layer is a policy, not an error
/// value: malformed frames and unparseable configs are logged and dropped
/// by the workers, stale epochs are silently ignored, and transport
/// failures are the transport's problem. The one exception is below.
#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    /// The durable leadership epoch could not be read. Without it the peer
    /// cannot propose or rank votes, so it must not participate.
    #[error("failed to read current epoch: {0}")]
    EpochRead(#[source] std::io::Error),
}
