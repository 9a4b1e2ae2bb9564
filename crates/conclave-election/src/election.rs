//! The fast leader election state machine.
//!
//! Each peer runs one [`FastLeaderElection`] for the lifetime of its
//! process. Entering the LOOKING state, the host calls
//! [`look_for_leader`](FastLeaderElection::look_for_leader), which proposes
//! a candidate, exchanges notifications with every voter, and returns once
//! a quorum agrees — leaving the peer LEADING, FOLLOWING, or OBSERVING.
//!
//! # Queue discipline
//!
//! The loop never touches the transport directly. Two unbounded channels
//! sit between it and a pair of worker tasks:
//!
//! ```text
//! election loop ──sendqueue──▶ sender worker ──▶ transport
//! election loop ◀──recvqueue── receiver worker ◀── transport
//! ```
//!
//! The receiver worker filters and answers messages that must not reach
//! the loop: non-voters get an immediate reply with the current vote, and
//! peers still looking after this one settled learn the committed leader.
//!
//! # Ranking
//!
//! Candidates are ranked by `(peer_epoch, zxid, server id)`, largest wins,
//! with zero-weight servers excluded outright. This makes the winner's
//! history a superset of anything a quorum has acknowledged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use bytes::Bytes;
use conclave_quorum::{ServerId, VoteTracker, NO_VOTE};

use crate::config::{next_timeout, ElectionConfig, FINALIZE_WAIT, WORKER_POLL_INTERVAL};
use crate::error::ElectionError;
use crate::message::{
    encode_notification, Notification, NotificationFrame, ToSend, MIN_FRAME_LEN,
};
use crate::peer::QuorumPeer;
use crate::transport::{QuorumTransport, ReceivedFrame};
use crate::vote::{LearnerType, ServerState, Vote};

/// The candidate this peer currently backs. Guarded by a mutex: proposal
/// updates, external vote reads, and the election-start block all
/// serialize on it.
#[derive(Debug, Clone, Copy)]
struct Proposal {
    leader: ServerId,
    zxid: i64,
    peer_epoch: i64,
}

impl Proposal {
    const fn unset() -> Self {
        Self {
            leader: -1,
            zxid: -1,
            peer_epoch: -1,
        }
    }
}

/// State shared between the election loop and the messenger workers.
#[derive(Debug)]
struct ElectionState {
    /// Election round counter. Bumped at the start of every instance;
    /// overwritten when a newer round or an established leader is seen.
    logical_clock: AtomicI64,
    proposal: Mutex<Proposal>,
    stop: AtomicBool,
    /// Votes that elected this peer, parked here until the leader
    /// subsystem picks them up via the receiver worker.
    leading_vote_set: Mutex<Option<VoteTracker>>,
}

impl ElectionState {
    fn new() -> Self {
        Self {
            logical_clock: AtomicI64::new(0),
            proposal: Mutex::new(Proposal::unset()),
            stop: AtomicBool::new(false),
            leading_vote_set: Mutex::new(None),
        }
    }

    fn proposal(&self) -> Proposal {
        *self.proposal.lock().unwrap()
    }

    fn proposal_vote(&self) -> Vote {
        let p = self.proposal();
        Vote::proposal(p.leader, p.zxid, p.peer_epoch)
    }
}

/// Tears the election down: stops the loop and both workers, resets the
/// proposal sentinels, and halts the transport. Idempotent; called from
/// [`FastLeaderElection::shutdown`] and from the receiver worker when a
/// reconfiguration forces a restart.
fn shutdown_election<T: QuorumTransport>(state: &ElectionState, transport: &T) {
    state.stop.store(true, Ordering::SeqCst);
    *state.proposal.lock().unwrap() = Proposal::unset();
    *state.leading_vote_set.lock().unwrap() = None;
    debug!("shutting down transport");
    transport.halt();
    debug!("election is down");
}

fn valid_voter(peer: &dyn QuorumPeer, sid: ServerId) -> bool {
    peer.current_and_next_config_voters().contains(&sid)
}

/// Fast leader election over a [`QuorumTransport`].
pub struct FastLeaderElection<T: QuorumTransport> {
    peer: Arc<dyn QuorumPeer>,
    transport: Arc<T>,
    config: ElectionConfig,
    state: Arc<ElectionState>,
    send_tx: mpsc::UnboundedSender<ToSend>,
    /// Taken by `start` when the sender worker spawns.
    send_rx: Mutex<Option<mpsc::UnboundedReceiver<ToSend>>>,
    recv_tx: mpsc::UnboundedSender<Notification>,
    /// Held across one whole `look_for_leader` invocation.
    recv_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Notification>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: QuorumTransport> FastLeaderElection<T> {
    /// Creates the election object. Workers are not running until
    /// [`start`](Self::start) is called.
    pub fn new(peer: Arc<dyn QuorumPeer>, transport: Arc<T>, config: ElectionConfig) -> Self {
        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let (recv_tx, recv_rx) = mpsc::unbounded_channel();
        Self {
            peer,
            transport,
            config,
            state: Arc::new(ElectionState::new()),
            send_tx,
            send_rx: Mutex::new(Some(send_rx)),
            recv_tx,
            recv_rx: tokio::sync::Mutex::new(recv_rx),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the sender and receiver workers. Idempotent.
    pub fn start(&self) {
        let Some(send_rx) = self.send_rx.lock().unwrap().take() else {
            return;
        };

        let mut workers = self.workers.lock().unwrap();
        workers.push(tokio::spawn(run_sender(
            send_rx,
            Arc::clone(&self.transport),
            Arc::clone(&self.state),
        )));

        let receiver = ReceiverTask {
            peer: Arc::clone(&self.peer),
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&self.state),
            send_tx: self.send_tx.clone(),
            recv_tx: self.recv_tx.clone(),
        };
        workers.push(tokio::spawn(receiver.run()));
    }

    /// Stops the election loop, the workers, and the transport. Idempotent.
    pub fn shutdown(&self) {
        shutdown_election(self.state.as_ref(), self.transport.as_ref());
    }

    /// The vote this peer currently backs, for external observers.
    pub fn vote(&self) -> Vote {
        self.state.proposal_vote()
    }

    /// Current value of the election round counter.
    pub fn logical_clock(&self) -> i64 {
        self.state.logical_clock.load(Ordering::SeqCst)
    }

    /// Runs one election instance.
    ///
    /// Blocks until a leader is decided, in which case the peer's state has
    /// already transitioned and the final vote is returned — or until the
    /// election is shut down, yielding `Ok(None)`, upon which the host
    /// re-enters if it is still LOOKING.
    pub async fn look_for_leader(&self) -> Result<Option<Vote>, ElectionError> {
        let mut rx = self.recv_rx.lock().await;

        // Votes from the current round. An entry is only ever stored here
        // if its election epoch matches our logical clock.
        let mut recvset: HashMap<ServerId, Vote> = HashMap::new();

        // LEADING and FOLLOWING votes from any round. A peer joining an
        // established ensemble discovers the sitting leader here without
        // forcing a new election.
        let mut outofelection: HashMap<ServerId, Vote> = HashMap::new();

        let mut not_timeout = self.config.min_notification_interval;

        {
            let mut proposal = self.state.proposal.lock().unwrap();
            self.state.logical_clock.fetch_add(1, Ordering::SeqCst);
            *proposal = Proposal {
                leader: self.init_id(),
                zxid: self.init_last_logged_zxid(),
                peer_epoch: self.init_peer_epoch()?,
            };
        }

        info!(
            "new election, my id = {}, proposed zxid = 0x{:x}",
            self.peer.id(),
            self.state.proposal().zxid
        );
        self.send_notifications();

        let mut vote_set: Option<VoteTracker> = None;

        while self.peer.peer_state() == ServerState::Looking
            && !self.state.stop.load(Ordering::SeqCst)
        {
            let n = match timeout(not_timeout, rx.recv()).await {
                Ok(Some(n)) => Some(n),
                Ok(None) => return Ok(None),
                Err(_) => None,
            };

            let Some(n) = n else {
                // Nothing heard. Re-announce ourselves if everything we
                // queued went out, otherwise chase the missing links.
                if self.transport.have_delivered() {
                    self.send_notifications();
                } else {
                    self.transport.connect_all();
                }

                not_timeout = next_timeout(not_timeout, self.config.max_notification_interval);

                // An oracle-backed ensemble may conclude on a quorum it
                // already saw once the first backoff step has passed; the
                // missing peer is then presumed dead, not slow.
                let qv = self.peer.quorum_verifier();
                let idle = not_timeout != self.config.min_notification_interval;
                if qv.revalidate_vote_set(vote_set.as_ref(), idle) {
                    let p = self.state.proposal();
                    self.set_peer_state(p.leader, vote_set.take());
                    let end = Vote::new(
                        p.leader,
                        p.zxid,
                        self.state.logical_clock.load(Ordering::SeqCst),
                        p.peer_epoch,
                    );
                    self.leave_instance(&end, &mut rx);
                    return Ok(Some(end));
                }

                info!("notification timeout: {:?}", not_timeout);
                continue;
            };

            if !valid_voter(self.peer.as_ref(), n.sid) || !valid_voter(self.peer.as_ref(), n.leader)
            {
                if !valid_voter(self.peer.as_ref(), n.leader) {
                    warn!(
                        "ignoring notification for non-cluster member sid {} from sid {}",
                        n.leader, n.sid
                    );
                }
                if !valid_voter(self.peer.as_ref(), n.sid) {
                    warn!(
                        "ignoring notification for sid {} from non-voter sid {}",
                        n.leader, n.sid
                    );
                }
                continue;
            }

            match n.state {
                ServerState::Looking => {
                    if self.init_last_logged_zxid() == -1 {
                        debug!("ignoring notification as our zxid is -1");
                        continue;
                    }
                    if n.zxid == -1 {
                        debug!("ignoring notification from member with -1 zxid: {}", n.sid);
                        continue;
                    }

                    let clock = self.state.logical_clock.load(Ordering::SeqCst);
                    if n.election_epoch > clock {
                        // A newer round preempts everything we tallied.
                        self.state.logical_clock.store(n.election_epoch, Ordering::SeqCst);
                        recvset.clear();
                        let init_id = self.init_id();
                        let init_zxid = self.init_last_logged_zxid();
                        let init_epoch = self.init_peer_epoch()?;
                        if self.total_order_predicate(
                            n.leader,
                            n.zxid,
                            n.peer_epoch,
                            init_id,
                            init_zxid,
                            init_epoch,
                        ) {
                            self.update_proposal(n.leader, n.zxid, n.peer_epoch);
                        } else {
                            self.update_proposal(init_id, init_zxid, init_epoch);
                        }
                        self.send_notifications();
                    } else if n.election_epoch < clock {
                        debug!(
                            "notification election epoch 0x{:x} is behind logical clock 0x{:x}",
                            n.election_epoch, clock
                        );
                        continue;
                    } else {
                        let p = self.state.proposal();
                        if self.total_order_predicate(
                            n.leader,
                            n.zxid,
                            n.peer_epoch,
                            p.leader,
                            p.zxid,
                            p.peer_epoch,
                        ) {
                            self.update_proposal(n.leader, n.zxid, n.peer_epoch);
                            self.send_notifications();
                        }
                    }

                    debug!(
                        "adding vote: from={}, proposed leader={}, proposed zxid=0x{:x}, \
                         proposed election epoch=0x{:x}",
                        n.sid, n.leader, n.zxid, n.election_epoch
                    );
                    recvset.insert(
                        n.sid,
                        Vote::new(n.leader, n.zxid, n.election_epoch, n.peer_epoch),
                    );

                    let p = self.state.proposal();
                    let clock = self.state.logical_clock.load(Ordering::SeqCst);
                    vote_set = Some(self.vote_tracker(
                        &recvset,
                        &Vote::new(p.leader, p.zxid, clock, p.peer_epoch),
                    ));

                    if vote_set.as_ref().is_some_and(VoteTracker::has_all_quorums) {
                        // Termination drain: give a better candidate one
                        // more finalize window to show up.
                        let mut superseded = false;
                        while let Ok(Some(m)) = timeout(FINALIZE_WAIT, rx.recv()).await {
                            let p = self.state.proposal();
                            if self.total_order_predicate(
                                m.leader,
                                m.zxid,
                                m.peer_epoch,
                                p.leader,
                                p.zxid,
                                p.peer_epoch,
                            ) {
                                // push it back and go around again
                                let _ = self.recv_tx.send(m);
                                superseded = true;
                                break;
                            }
                        }

                        if !superseded {
                            let p = self.state.proposal();
                            self.set_peer_state(p.leader, vote_set.take());
                            let end = Vote::new(
                                p.leader,
                                p.zxid,
                                self.state.logical_clock.load(Ordering::SeqCst),
                                p.peer_epoch,
                            );
                            self.leave_instance(&end, &mut rx);
                            return Ok(Some(end));
                        }
                    }
                }

                ServerState::Observing => {
                    debug!("notification from observer: {}", n.sid);
                }

                ServerState::Following => {
                    if let Some(end) =
                        self.received_following_notification(&mut recvset, &mut outofelection, &n)
                    {
                        self.leave_instance(&end, &mut rx);
                        return Ok(Some(end));
                    }
                }

                ServerState::Leading => {
                    if let Some(end) = self.received_leading_notification(
                        &mut recvset,
                        &mut outofelection,
                        &vote_set,
                        &n,
                    ) {
                        self.leave_instance(&end, &mut rx);
                        return Ok(Some(end));
                    }
                }
            }
        }

        debug!(
            "number of connection processing threads: {}",
            self.transport.connection_thread_count()
        );
        Ok(None)
    }

    /// Handles a FOLLOWING notification: either completes the current
    /// round with it, or uses it to discover an already-elected leader.
    fn received_following_notification(
        &self,
        recvset: &mut HashMap<ServerId, Vote>,
        outofelection: &mut HashMap<ServerId, Vote>,
        n: &Notification,
    ) -> Option<Vote> {
        // Consider all notifications from the same round together.
        if n.election_epoch == self.state.logical_clock.load(Ordering::SeqCst) {
            recvset.insert(
                n.sid,
                Vote::with_state(n.leader, n.zxid, n.election_epoch, n.peer_epoch, n.state),
            );
            let tracker = self.vote_tracker(
                recvset,
                &Vote::full(
                    n.version,
                    n.leader,
                    n.zxid,
                    n.election_epoch,
                    n.peer_epoch,
                    n.state,
                ),
            );
            if tracker.has_all_quorums() && self.check_leader(recvset, n.leader, n.election_epoch)
            {
                self.set_peer_state(n.leader, Some(tracker));
                return Some(Vote::new(n.leader, n.zxid, n.election_epoch, n.peer_epoch));
            }
        }

        // Before joining an established ensemble, verify that a majority
        // follows the same leader — whatever round they elected it in.
        outofelection.insert(
            n.sid,
            Vote::full(
                n.version,
                n.leader,
                n.zxid,
                n.election_epoch,
                n.peer_epoch,
                n.state,
            ),
        );
        let tracker = self.vote_tracker(
            outofelection,
            &Vote::full(
                n.version,
                n.leader,
                n.zxid,
                n.election_epoch,
                n.peer_epoch,
                n.state,
            ),
        );
        if tracker.has_all_quorums() && self.check_leader(outofelection, n.leader, n.election_epoch)
        {
            {
                let _monitor = self.state.proposal.lock().unwrap();
                self.state
                    .logical_clock
                    .store(n.election_epoch, Ordering::SeqCst);
                self.set_peer_state(n.leader, Some(tracker));
            }
            return Some(Vote::new(n.leader, n.zxid, n.election_epoch, n.peer_epoch));
        }

        None
    }

    /// Handles a LEADING notification: the FOLLOWING logic first, and if
    /// that is not conclusive, the oracle may still direct this peer to
    /// follow the claimant.
    fn received_leading_notification(
        &self,
        recvset: &mut HashMap<ServerId, Vote>,
        outofelection: &mut HashMap<ServerId, Vote>,
        vote_set: &Option<VoteTracker>,
        n: &Notification,
    ) -> Option<Vote> {
        if let Some(end) = self.received_following_notification(recvset, outofelection, n) {
            return Some(end);
        }

        // A recovering node in a 2-node ensemble can never assemble a
        // majority on its own; the oracle breaks the tie. A *negative*
        // answer means the token already rests with the sitting leader,
        // which validates following it. The polarity is deliberate.
        let qv = self.peer.quorum_verifier();
        if qv.need_oracle() && !qv.ask_oracle() {
            info!("oracle indicates to follow");
            self.set_peer_state(n.leader, vote_set.clone());
            Some(Vote::new(n.leader, n.zxid, n.election_epoch, n.peer_epoch))
        } else {
            info!("oracle indicates not to follow");
            None
        }
    }

    /// Ranks a candidate against the current one: `(epoch, zxid, sid)`
    /// lexicographically, with zero-weight candidates excluded outright.
    fn total_order_predicate(
        &self,
        new_id: ServerId,
        new_zxid: i64,
        new_epoch: i64,
        cur_id: ServerId,
        cur_zxid: i64,
        cur_epoch: i64,
    ) -> bool {
        debug!(
            "id: {new_id}, proposed id: {cur_id}, zxid: 0x{new_zxid:x}, \
             proposed zxid: 0x{cur_zxid:x}"
        );
        if self.peer.quorum_verifier().weight(new_id) == 0 {
            return false;
        }
        (new_epoch, new_zxid, new_id) > (cur_epoch, cur_zxid, cur_id)
    }

    /// Builds a tracker for `target` from the given vote map, registering
    /// the current verifier and, during reconfiguration, the proposed one.
    fn vote_tracker(&self, votes: &HashMap<ServerId, Vote>, target: &Vote) -> VoteTracker {
        let mut tracker = VoteTracker::new();
        let current = self.peer.quorum_verifier();
        let next = self
            .peer
            .last_seen_quorum_verifier()
            .filter(|next| next.version() > current.version());
        tracker.add_verifier(current);
        if let Some(next) = next {
            tracker.add_verifier(next);
        }

        for (sid, vote) in votes {
            if vote == target {
                tracker.add_ack(*sid);
            }
        }
        tracker
    }

    /// Guards against electing a peer that crashed but is still remembered
    /// as leader: the claimed leader must either be this peer (in the
    /// current round) or have been seen claiming LEADING itself.
    fn check_leader(
        &self,
        votes: &HashMap<ServerId, Vote>,
        leader: ServerId,
        election_epoch: i64,
    ) -> bool {
        if leader == self.peer.id() {
            self.state.logical_clock.load(Ordering::SeqCst) == election_epoch
        } else {
            match votes.get(&leader) {
                Some(vote) => vote.state == ServerState::Leading,
                None => false,
            }
        }
    }

    fn update_proposal(&self, leader: ServerId, zxid: i64, peer_epoch: i64) {
        let mut p = self.state.proposal.lock().unwrap();
        debug!(
            "updating proposal: {leader} (new leader), 0x{zxid:x} (new zxid), \
             {} (old leader), 0x{:x} (old zxid)",
            p.leader, p.zxid
        );
        *p = Proposal {
            leader,
            zxid,
            peer_epoch,
        };
    }

    /// Queues one notification per voter in the current and next
    /// configuration, announcing the current proposal.
    fn send_notifications(&self) {
        let p = self.state.proposal();
        let clock = self.state.logical_clock.load(Ordering::SeqCst);
        let config_data = Bytes::from(self.peer.quorum_verifier().to_config_string());

        for sid in self.peer.current_and_next_config_voters() {
            debug!(
                "sending notification: {} (n.leader), 0x{:x} (n.zxid), 0x{:x} (n.round), \
                 {} (recipient), {} (my id), 0x{:x} (n.peer_epoch)",
                p.leader,
                p.zxid,
                clock,
                sid,
                self.peer.id(),
                p.peer_epoch
            );
            let _ = self.send_tx.send(ToSend {
                sid,
                leader: p.leader,
                zxid: p.zxid,
                election_epoch: clock,
                peer_epoch: p.peer_epoch,
                state: ServerState::Looking,
                config_data: config_data.clone(),
            });
        }
    }

    /// Moves the host peer into the role the election outcome dictates,
    /// parking the electing votes for the leader subsystem if we won.
    fn set_peer_state(&self, proposed_leader: ServerId, vote_set: Option<VoteTracker>) {
        let state = if proposed_leader == self.peer.id() {
            ServerState::Leading
        } else {
            self.learning_state()
        };
        self.peer.set_peer_state(state);
        if state == ServerState::Leading {
            *self.state.leading_vote_set.lock().unwrap() = vote_set;
        }
    }

    fn leave_instance(&self, v: &Vote, rx: &mut mpsc::UnboundedReceiver<Notification>) {
        debug!(
            "about to leave election instance: leader={}, zxid=0x{:x}, my id={}, my state={}",
            v.leader,
            v.zxid,
            self.peer.id(),
            self.peer.peer_state()
        );
        while rx.try_recv().is_ok() {}
    }

    fn learning_state(&self) -> ServerState {
        match self.peer.learner_type() {
            LearnerType::Participant => ServerState::Following,
            LearnerType::Observer => ServerState::Observing,
        }
    }

    /// Initial candidate: ourselves if we may vote, the sentinel otherwise.
    fn init_id(&self) -> ServerId {
        if self.peer.quorum_verifier().is_voting_member(self.peer.id()) {
            self.peer.id()
        } else {
            NO_VOTE
        }
    }

    fn init_last_logged_zxid(&self) -> i64 {
        match self.peer.learner_type() {
            LearnerType::Participant => self.peer.last_logged_zxid(),
            LearnerType::Observer => i64::MIN,
        }
    }

    fn init_peer_epoch(&self) -> Result<i64, ElectionError> {
        match self.peer.learner_type() {
            LearnerType::Participant => self.peer.current_epoch().map_err(ElectionError::EpochRead),
            LearnerType::Observer => Ok(i64::MIN),
        }
    }
}

/// Sender worker: drains the send queue, serializes, hands frames to the
/// transport. Delivery failures are the transport's to recover from.
async fn run_sender<T: QuorumTransport>(
    mut send_rx: mpsc::UnboundedReceiver<ToSend>,
    transport: Arc<T>,
    state: Arc<ElectionState>,
) {
    while !state.stop.load(Ordering::SeqCst) {
        match timeout(WORKER_POLL_INTERVAL, send_rx.recv()).await {
            Ok(Some(m)) => transport.send(m.sid, encode_notification(&m)),
            Ok(None) => break,
            Err(_) => continue,
        }
    }
    info!("sender worker is down");
}

/// Receiver worker: decodes inbound frames, applies piggybacked
/// reconfigurations, answers peers that must not reach the election loop,
/// and routes the rest into the receive queue.
struct ReceiverTask<T: QuorumTransport> {
    peer: Arc<dyn QuorumPeer>,
    transport: Arc<T>,
    state: Arc<ElectionState>,
    send_tx: mpsc::UnboundedSender<ToSend>,
    recv_tx: mpsc::UnboundedSender<Notification>,
}

impl<T: QuorumTransport> ReceiverTask<T> {
    async fn run(self) {
        while !self.state.stop.load(Ordering::SeqCst) {
            let Some(received) = self.transport.poll_recv(WORKER_POLL_INTERVAL).await else {
                continue;
            };
            if !self.handle(received) {
                break;
            }
        }
        info!("receiver worker is down");
    }

    /// Processes one inbound frame. Returns false when the worker must
    /// terminate (reconfiguration restart).
    fn handle(&self, received: ReceivedFrame) -> bool {
        let capacity = received.frame.len();
        // every supported generation of the protocol sends at least this
        if capacity < MIN_FRAME_LEN {
            error!(
                "got a short response from server {}: {capacity} bytes",
                received.sid
            );
            return true;
        }

        let frame = match NotificationFrame::decode(received.sid, &received.frame) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    "skipping malformed notification from sid {} (length {capacity}): {e}",
                    received.sid
                );
                return true;
            }
        };

        // A higher-version configuration piggybacked on the frame may
        // replace ours before the message is routed anywhere.
        if let Some(rqv) = &frame.qv {
            let cur_qv = self.peer.quorum_verifier();
            if rqv.version() > cur_qv.version() {
                info!(
                    "{} received config version 0x{:x}, mine is 0x{:x}",
                    self.peer.id(),
                    rqv.version(),
                    cur_qv.version()
                );
                if self.peer.peer_state() == ServerState::Looking {
                    debug!("adopting reconfiguration while looking");
                    self.peer.process_reconfig(rqv.clone());
                    if *rqv != cur_qv {
                        info!("restarting leader election");
                        self.peer.signal_election_restart();
                        shutdown_election(self.state.as_ref(), self.transport.as_ref());
                        return false;
                    }
                } else {
                    debug!(
                        "deferring reconfiguration, state: {}",
                        self.peer.peer_state()
                    );
                }
            }
        }

        // Non-voting senders (observers, non-voting followers) get an
        // immediate answer and never reach the election loop.
        if !valid_voter(self.peer.as_ref(), received.sid) {
            let current = self.peer.current_vote();
            self.reply(
                received.sid,
                &current,
                self.state.logical_clock.load(Ordering::SeqCst),
            );
            return true;
        }

        let Some(n) = Notification::from_frame(frame, received.sid) else {
            warn!(
                "notification state unrecognized, dropping message from sid {}",
                received.sid
            );
            return true;
        };

        debug!(
            "notification: my state: {}; n.sid: {}, n.state: {}, n.leader: {}, \
             n.round: 0x{:x}, n.peer_epoch: 0x{:x}, n.zxid: 0x{:x}, format version: 0x{:x}",
            self.peer.peer_state(),
            n.sid,
            n.state,
            n.leader,
            n.election_epoch,
            n.peer_epoch,
            n.zxid,
            n.version
        );

        if self.peer.peer_state() == ServerState::Looking {
            let lagging_looker = n.state == ServerState::Looking
                && n.election_epoch < self.state.logical_clock.load(Ordering::SeqCst);
            let sender = n.sid;
            let _ = self.recv_tx.send(n);

            // help a peer whose round fell behind ours catch up
            if lagging_looker {
                let v = self.state.proposal_vote();
                self.reply(sender, &v, self.state.logical_clock.load(Ordering::SeqCst));
            }
        } else if n.state == ServerState::Looking {
            // We settled already; tell the sender who leads. If we lead,
            // this is also where the leader subsystem learns who elected
            // it and which stragglers to chase.
            let current = self.peer.current_vote();
            if let Some(leader) = self.peer.leader() {
                let parked = self.state.leading_vote_set.lock().unwrap().take();
                if let Some(vote_set) = parked {
                    leader.set_leading_vote_set(vote_set);
                }
                leader.report_looking_sid(n.sid);
            }

            debug!(
                "sending committed vote: my id = {}, recipient = {}, zxid = 0x{:x}, leader = {}",
                self.peer.id(),
                n.sid,
                current.zxid,
                current.leader
            );
            self.reply(n.sid, &current, current.election_epoch);
        }

        true
    }

    fn reply(&self, sid: ServerId, vote: &Vote, election_epoch: i64) {
        let config_data = Bytes::from(self.peer.quorum_verifier().to_config_string());
        let _ = self.send_tx.send(ToSend {
            sid,
            leader: vote.leader,
            zxid: vote.zxid,
            election_epoch,
            peer_epoch: vote.peer_epoch,
            state: self.peer.peer_state(),
            config_data,
        });
    }
}
