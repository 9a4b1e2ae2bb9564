//! Transport seam and the in-process loopback implementation.
//!
//! The election layer never touches sockets. It hands frames to a
//! [`QuorumTransport`] and polls frames out of it; connection management,
//! retries, and delivery order (or the lack of it) are entirely the
//! transport's concern. Delivery is best-effort — the algorithm tolerates
//! drops by rebroadcasting when idle.
//!
//! [`LoopbackNetwork`] is the bundled transport: an in-process hub routing
//! frames between registered endpoints over unbounded channels. It backs
//! the integration tests and any single-process demo; a TCP transport
//! belongs to the host process.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use conclave_quorum::ServerId;

/// A raw frame handed up by the transport, tagged with its sender.
#[derive(Debug)]
pub struct ReceivedFrame {
    pub sid: ServerId,
    pub frame: Bytes,
}

/// Point-to-point frame delivery between peers.
pub trait QuorumTransport: Send + Sync + 'static {
    /// Queues `frame` for delivery to `sid`. Best-effort: the frame may be
    /// dropped and no failure is reported.
    fn send(&self, sid: ServerId, frame: Bytes);

    /// Waits up to `timeout` for an inbound frame.
    fn poll_recv(&self, timeout: Duration) -> impl Future<Output = Option<ReceivedFrame>> + Send;

    /// True iff every outbound queue has drained.
    fn have_delivered(&self) -> bool;

    /// Kicks off reconnect attempts to every known voter.
    fn connect_all(&self);

    /// Stops the transport. Subsequent sends are dropped and polls return
    /// `None`.
    fn halt(&self);

    /// Number of live connection-handling tasks, for diagnostics.
    fn connection_thread_count(&self) -> usize;
}

/// In-process message hub. Endpoints register under their server id and
/// frames route directly into the recipient's inbound channel — including
/// frames a peer addresses to itself.
#[derive(Debug, Default)]
pub struct LoopbackNetwork {
    endpoints: Mutex<HashMap<ServerId, mpsc::UnboundedSender<ReceivedFrame>>>,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers an endpoint for `sid` and returns its transport handle.
    /// Re-registering a sid replaces the previous endpoint.
    pub fn register(self: &Arc<Self>, sid: ServerId) -> LoopbackTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints.lock().unwrap().insert(sid, tx);
        LoopbackTransport {
            sid,
            network: Arc::clone(self),
            inbound: tokio::sync::Mutex::new(rx),
            halted: AtomicBool::new(false),
        }
    }

    fn route(&self, from: ServerId, to: ServerId, frame: Bytes) {
        let endpoints = self.endpoints.lock().unwrap();
        match endpoints.get(&to) {
            Some(tx) => {
                // a closed endpoint is indistinguishable from a dead peer
                let _ = tx.send(ReceivedFrame { sid: from, frame });
            }
            None => trace!("dropping frame from {from} to unknown peer {to}"),
        }
    }

    fn unregister(&self, sid: ServerId) {
        self.endpoints.lock().unwrap().remove(&sid);
    }
}

/// One peer's handle onto a [`LoopbackNetwork`].
#[derive(Debug)]
pub struct LoopbackTransport {
    sid: ServerId,
    network: Arc<LoopbackNetwork>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<ReceivedFrame>>,
    halted: AtomicBool,
}

impl QuorumTransport for LoopbackTransport {
    fn send(&self, sid: ServerId, frame: Bytes) {
        if self.halted.load(Ordering::SeqCst) {
            return;
        }
        self.network.route(self.sid, sid, frame);
    }

    fn poll_recv(&self, timeout: Duration) -> impl Future<Output = Option<ReceivedFrame>> + Send {
        async move {
            if self.halted.load(Ordering::SeqCst) {
                return None;
            }
            let mut inbound = self.inbound.lock().await;
            match tokio::time::timeout(timeout, inbound.recv()).await {
                Ok(frame) => frame,
                Err(_) => None,
            }
        }
    }

    fn have_delivered(&self) -> bool {
        // routing is synchronous, nothing ever sits in an outbound queue
        true
    }

    fn connect_all(&self) {}

    fn halt(&self) {
        if !self.halted.swap(true, Ordering::SeqCst) {
            // dropping our hub entry closes the inbound channel, so a
            // blocked poll_recv wakes promptly instead of riding out its
            // timeout
            self.network.unregister(self.sid);
        }
    }

    fn connection_thread_count(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_route_between_endpoints() {
        let net = LoopbackNetwork::new();
        let a = net.register(1);
        let b = net.register(2);

        a.send(2, Bytes::from_static(b"hello"));
        let got = b.poll_recv(Duration::from_millis(100)).await.unwrap();
        assert_eq!(got.sid, 1);
        assert_eq!(&got.frame[..], b"hello");
    }

    #[tokio::test]
    async fn self_send_loops_back() {
        let net = LoopbackNetwork::new();
        let a = net.register(1);

        a.send(1, Bytes::from_static(b"me"));
        let got = a.poll_recv(Duration::from_millis(100)).await.unwrap();
        assert_eq!(got.sid, 1);
    }

    #[tokio::test]
    async fn unknown_recipient_is_dropped() {
        let net = LoopbackNetwork::new();
        let a = net.register(1);

        // no endpoint 9; nothing to assert beyond "does not panic"
        a.send(9, Bytes::from_static(b"void"));
        assert!(a.poll_recv(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn poll_times_out_empty() {
        let net = LoopbackNetwork::new();
        let a = net.register(1);
        assert!(a.poll_recv(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn halted_transport_goes_silent() {
        let net = LoopbackNetwork::new();
        let a = net.register(1);
        let b = net.register(2);

        b.halt();
        b.send(1, Bytes::from_static(b"late"));
        assert!(a.poll_recv(Duration::from_millis(20)).await.is_none());
        assert!(b.poll_recv(Duration::from_millis(20)).await.is_none());

        // frames addressed to the halted endpoint vanish quietly
        a.send(2, Bytes::from_static(b"gone"));
    }
}
