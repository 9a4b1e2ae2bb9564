//! Textual wire form of a quorum configuration.
//!
//! Election notifications embed the sender's configuration so peers can
//! detect and adopt reconfigurations. The serialization is line oriented:
//!
//! ```text
//! server.1=1
//! server.2=1
//! server.3=2
//! oracle=/var/lib/conclave/mastership     (oracle variant only)
//! version=1a
//! ```
//!
//! Server lines are sorted by sid, weights are decimal, the version is
//! hexadecimal. Blank lines and `#` comments are skipped on parse.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::ConfigParseError;
use crate::verifier::{QuorumMaj, QuorumOracleMaj, QuorumVerifier, ServerId};

impl QuorumVerifier {
    /// Serializes this configuration into its wire form.
    pub fn to_config_string(&self) -> String {
        let mut out = String::new();
        for (sid, weight) in self.voting_members() {
            // BTreeMap iteration gives the sorted order the format requires
            let _ = writeln!(out, "server.{sid}={weight}");
        }
        if let QuorumVerifier::OracleMajority(o) = self {
            let _ = writeln!(out, "oracle={}", o.oracle_path());
        }
        let _ = writeln!(out, "version={:x}", self.version());
        out
    }
}

/// Parses the wire form back into a verifier snapshot.
pub fn parse_config(data: &str) -> Result<QuorumVerifier, ConfigParseError> {
    let mut members: BTreeMap<ServerId, u64> = BTreeMap::new();
    let mut version = 0i64;
    let mut oracle_path: Option<String> = None;

    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(rest) = line.strip_prefix("server.") {
            let (sid, weight) = rest
                .split_once('=')
                .ok_or_else(|| ConfigParseError::InvalidServerLine(line.to_string()))?;
            let sid: ServerId = sid
                .parse()
                .map_err(|_| ConfigParseError::InvalidServerId(sid.to_string()))?;
            let weight: u64 = weight
                .parse()
                .map_err(|_| ConfigParseError::InvalidWeight(weight.to_string()))?;
            members.insert(sid, weight);
        } else if let Some(v) = line.strip_prefix("version=") {
            version = i64::from_str_radix(v, 16)
                .map_err(|_| ConfigParseError::InvalidVersion(v.to_string()))?;
        } else if let Some(path) = line.strip_prefix("oracle=") {
            oracle_path = Some(path.to_string());
        } else {
            return Err(ConfigParseError::UnknownLine(line.to_string()));
        }
    }

    if members.is_empty() {
        return Err(ConfigParseError::NoVotingMembers);
    }

    let base = QuorumMaj::with_version(members, version);
    Ok(match oracle_path {
        Some(path) => QuorumVerifier::OracleMajority(QuorumOracleMaj::new(base, path)),
        None => QuorumVerifier::Majority(base),
    })
}
