//! Binary wire format for election notifications.
//!
//! All multi-byte integers are big-endian. Three generations of the format
//! are decoded, distinguished purely by frame length:
//!
//! | generation | bytes    | layout                                               |
//! |------------|----------|------------------------------------------------------|
//! | legacy     | 28       | state · leader · zxid · electionEpoch                |
//! | classic    | 40       | legacy · peerEpoch                                   |
//! | versioned  | 44 + N   | classic · version · configLen · configBytes          |
//!
//! Legacy frames predate explicit peer epochs; the epoch is recovered from
//! the high half of the zxid. Encoding always emits the versioned form with
//! the sender's serialized quorum configuration attached (possibly empty,
//! never omitted).

use std::io::{self, Read};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use conclave_quorum::{parse_config, QuorumVerifier, ServerId};

use crate::vote::ServerState;

/// Version tag written into every encoded frame.
pub const CURRENT_VERSION: i32 = 0x2;

/// Smallest frame any supported generation produces.
pub(crate) const MIN_FRAME_LEN: usize = 28;

const CLASSIC_FRAME_LEN: usize = 40;
const VERSIONED_HEADER_LEN: usize = 44;

// Safe read helpers that return io::Error instead of panicking on
// truncated input.

fn safe_get_i32(buf: &mut &[u8]) -> io::Result<i32> {
    if buf.len() < 4 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "need 4 bytes"));
    }
    Ok(buf.get_i32())
}

fn safe_get_i64(buf: &mut &[u8]) -> io::Result<i64> {
    if buf.len() < 8 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "need 8 bytes"));
    }
    Ok(buf.get_i64())
}

/// An outbound notification, queued for the sender worker.
#[derive(Debug, Clone)]
pub struct ToSend {
    /// Recipient.
    pub sid: ServerId,
    /// Proposed leader.
    pub leader: ServerId,
    /// Zxid of the proposed leader.
    pub zxid: i64,
    /// Election round of the sender.
    pub election_epoch: i64,
    /// Leadership epoch of the proposed leader.
    pub peer_epoch: i64,
    /// Current state of the sender.
    pub state: ServerState,
    /// Serialized quorum configuration of the sender.
    pub config_data: Bytes,
}

/// Serializes a notification into the versioned wire form.
pub fn encode_notification(m: &ToSend) -> Bytes {
    let mut buf = BytesMut::with_capacity(VERSIONED_HEADER_LEN + m.config_data.len());
    buf.put_i32(m.state.as_wire());
    buf.put_i64(m.leader);
    buf.put_i64(m.zxid);
    buf.put_i64(m.election_epoch);
    buf.put_i64(m.peer_epoch);
    buf.put_i32(CURRENT_VERSION);
    buf.put_i32(m.config_data.len() as i32);
    buf.put_slice(&m.config_data);
    buf.freeze()
}

/// A decoded notification frame.
///
/// The sender state is kept as the raw wire value here: the receiver worker
/// must answer non-voters before it is entitled to reject an unknown state,
/// so the mapping happens later, in [`Notification::from_frame`].
#[derive(Debug, Clone)]
pub struct NotificationFrame {
    pub state_raw: i32,
    pub leader: ServerId,
    pub zxid: i64,
    pub election_epoch: i64,
    pub peer_epoch: i64,
    /// Format version the frame arrived in (0 for the two legacy shapes).
    pub version: i32,
    /// Quorum configuration snapshot embedded by the sender, if present
    /// and parseable.
    pub qv: Option<QuorumVerifier>,
}

impl NotificationFrame {
    /// Decodes a frame received from `sender`, accepting all three
    /// generations of the format.
    pub fn decode(sender: ServerId, frame: &[u8]) -> io::Result<Self> {
        let capacity = frame.len();
        if capacity < MIN_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short notification frame from {sender}: {capacity} bytes"),
            ));
        }

        let mut buf = frame;
        let state_raw = safe_get_i32(&mut buf)?;
        let leader = safe_get_i64(&mut buf)?;
        let zxid = safe_get_i64(&mut buf)?;
        let election_epoch = safe_get_i64(&mut buf)?;

        let (peer_epoch, version) = if capacity == MIN_FRAME_LEN {
            debug!("backward compatibility mode (28 bytes), server id: {sender}");
            // the epoch rides in the high half of the zxid
            (zxid >> 32, 0)
        } else {
            let peer_epoch = safe_get_i64(&mut buf)?;
            if capacity == CLASSIC_FRAME_LEN {
                debug!("backward compatibility mode (40 bytes), server id: {sender}");
                (peer_epoch, 0)
            } else {
                (peer_epoch, safe_get_i32(&mut buf)?)
            }
        };

        let mut qv = None;
        if version > 0x1 {
            let config_len = safe_get_i32(&mut buf)?;
            // reject lengths that could not possibly fit the frame before
            // allocating anything
            if config_len < 0 || config_len as usize > capacity {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "invalid config length in notification from {sender}: \
                         len={config_len}, capacity={capacity}, version={version:#x}"
                    ),
                ));
            }
            let mut config = vec![0u8; config_len as usize];
            buf.read_exact(&mut config)?;

            let text = String::from_utf8_lossy(&config);
            match parse_config(&text) {
                Ok(parsed) => qv = Some(parsed),
                Err(e) => {
                    warn!("ignoring unparseable config in notification from {sender}: {e}");
                }
            }
        } else {
            debug!("backward compatibility mode (before reconfig), server id: {sender}");
        }

        Ok(Self {
            state_raw,
            leader,
            zxid,
            election_epoch,
            peer_epoch,
            version,
            qv,
        })
    }
}

/// An inbound notification as routed to the election loop: a decoded frame
/// whose sender state resolved to a known [`ServerState`].
#[derive(Debug, Clone)]
pub struct Notification {
    pub version: i32,
    pub leader: ServerId,
    pub zxid: i64,
    pub election_epoch: i64,
    pub peer_epoch: i64,
    pub state: ServerState,
    /// Sender of the notification.
    pub sid: ServerId,
    pub qv: Option<QuorumVerifier>,
}

impl Notification {
    /// Resolves a decoded frame into a routable notification. `None` for
    /// frames carrying an unknown sender state — those are dropped.
    pub fn from_frame(frame: NotificationFrame, sid: ServerId) -> Option<Self> {
        let state = ServerState::from_wire(frame.state_raw)?;
        Some(Self {
            version: frame.version,
            leader: frame.leader,
            zxid: frame.zxid,
            election_epoch: frame.election_epoch,
            peer_epoch: frame.peer_epoch,
            state,
            sid,
            qv: frame.qv,
        })
    }
}
