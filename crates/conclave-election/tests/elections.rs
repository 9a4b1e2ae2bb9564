//! End-to-end election scenarios over the loopback network.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;

use conclave_election::{
    encode_notification, ElectionConfig, FastLeaderElection, LeaderHandle, LearnerType,
    LoopbackNetwork, LoopbackTransport, NotificationFrame, QuorumPeer, QuorumTransport,
    ServerState, ToSend, Vote,
};
use conclave_quorum::{
    QuorumMaj, QuorumOracleMaj, QuorumVerifier, ServerId, StaticOracle, VoteTracker,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct TestLeader {
    looking_sids: Mutex<Vec<ServerId>>,
    got_vote_set: AtomicBool,
}

impl LeaderHandle for TestLeader {
    fn report_looking_sid(&self, sid: ServerId) {
        self.looking_sids.lock().unwrap().push(sid);
    }

    fn set_leading_vote_set(&self, _vote_set: VoteTracker) {
        self.got_vote_set.store(true, Ordering::SeqCst);
    }
}

/// Scripted host peer for driving elections in-process.
struct TestPeer {
    id: ServerId,
    state: Mutex<ServerState>,
    learner_type: LearnerType,
    epoch: i64,
    zxid: i64,
    qv: Mutex<QuorumVerifier>,
    current_vote: Mutex<Vote>,
    leader: Mutex<Option<Arc<TestLeader>>>,
    reconfigs: Mutex<Vec<QuorumVerifier>>,
    restart_requested: AtomicBool,
}

impl TestPeer {
    fn participant(id: ServerId, qv: QuorumVerifier) -> Arc<Self> {
        Self::build(id, qv, LearnerType::Participant, ServerState::Looking)
    }

    fn build(
        id: ServerId,
        qv: QuorumVerifier,
        learner_type: LearnerType,
        state: ServerState,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(state),
            learner_type,
            epoch: 1,
            zxid: 0x100,
            qv: Mutex::new(qv),
            current_vote: Mutex::new(Vote::new(id, 0x100, 1, 1)),
            leader: Mutex::new(None),
            reconfigs: Mutex::new(Vec::new()),
            restart_requested: AtomicBool::new(false),
        })
    }

    fn with_zxid(self: Arc<Self>, zxid: i64) -> Arc<Self> {
        // Arc has no other holders yet, the builder chain owns it
        let mut peer = Arc::try_unwrap(self).ok().expect("unshared peer");
        peer.zxid = zxid;
        Arc::new(peer)
    }

    fn set_current_vote(&self, vote: Vote) {
        *self.current_vote.lock().unwrap() = vote;
    }

    fn set_leader_handle(&self, handle: Arc<TestLeader>) {
        *self.leader.lock().unwrap() = Some(handle);
    }
}

impl QuorumPeer for TestPeer {
    fn id(&self) -> ServerId {
        self.id
    }

    fn peer_state(&self) -> ServerState {
        *self.state.lock().unwrap()
    }

    fn set_peer_state(&self, state: ServerState) {
        *self.state.lock().unwrap() = state;
    }

    fn learner_type(&self) -> LearnerType {
        self.learner_type
    }

    fn current_epoch(&self) -> io::Result<i64> {
        Ok(self.epoch)
    }

    fn last_logged_zxid(&self) -> i64 {
        self.zxid
    }

    fn quorum_verifier(&self) -> QuorumVerifier {
        self.qv.lock().unwrap().clone()
    }

    fn last_seen_quorum_verifier(&self) -> Option<QuorumVerifier> {
        None
    }

    fn current_and_next_config_voters(&self) -> Vec<ServerId> {
        self.quorum_verifier()
            .voting_members()
            .keys()
            .copied()
            .collect()
    }

    fn current_vote(&self) -> Vote {
        *self.current_vote.lock().unwrap()
    }

    fn process_reconfig(&self, qv: QuorumVerifier) {
        self.reconfigs.lock().unwrap().push(qv.clone());
        *self.qv.lock().unwrap() = qv;
    }

    fn signal_election_restart(&self) {
        self.restart_requested.store(true, Ordering::SeqCst);
    }

    fn leader(&self) -> Option<Arc<dyn LeaderHandle>> {
        self.leader
            .lock()
            .unwrap()
            .clone()
            .map(|l| l as Arc<dyn LeaderHandle>)
    }
}

struct Node {
    peer: Arc<TestPeer>,
    election: Arc<FastLeaderElection<LoopbackTransport>>,
}

fn spawn_node(net: &Arc<LoopbackNetwork>, peer: Arc<TestPeer>) -> Node {
    let transport = Arc::new(net.register(peer.id));
    let election = Arc::new(FastLeaderElection::new(
        peer.clone() as Arc<dyn QuorumPeer>,
        transport,
        ElectionConfig::default(),
    ));
    election.start();
    Node { peer, election }
}

fn looking_frame(target: ServerId, leader: ServerId, election_epoch: i64, qv: &QuorumVerifier) -> Bytes {
    encode_notification(&ToSend {
        sid: target,
        leader,
        zxid: 0x100,
        election_epoch,
        peer_epoch: 1,
        state: ServerState::Looking,
        config_data: Bytes::from(qv.to_config_string()),
    })
}

const DEADLINE: Duration = Duration::from_secs(30);

#[tokio::test]
async fn three_node_clean_election() {
    init_tracing();
    let net = LoopbackNetwork::new();
    let qv = QuorumVerifier::majority([1, 2, 3]);

    let nodes: Vec<Node> = (1..=3)
        .map(|sid| spawn_node(&net, TestPeer::participant(sid, qv.clone())))
        .collect();

    let mut handles = Vec::new();
    for node in &nodes {
        let election = node.election.clone();
        handles.push(tokio::spawn(
            async move { election.look_for_leader().await },
        ));
    }

    for handle in handles {
        let vote = timeout(DEADLINE, handle)
            .await
            .expect("election timed out")
            .unwrap()
            .unwrap()
            .expect("election must conclude with a vote");
        // highest sid wins the tie on equal history
        assert_eq!(vote.leader, 3);
        assert_eq!(vote.zxid, 0x100);
        assert_eq!(vote.election_epoch, 1);
        assert_eq!(vote.peer_epoch, 1);
    }

    assert_eq!(nodes[0].peer.peer_state(), ServerState::Following);
    assert_eq!(nodes[1].peer.peer_state(), ServerState::Following);
    assert_eq!(nodes[2].peer.peer_state(), ServerState::Leading);

    for node in &nodes {
        node.election.shutdown();
    }
}

#[tokio::test]
async fn higher_zxid_beats_higher_sid() {
    init_tracing();
    let net = LoopbackNetwork::new();
    let qv = QuorumVerifier::majority([1, 2, 3]);

    // peer 1 carries more history than anyone else
    let nodes: Vec<Node> = (1..=3)
        .map(|sid| {
            let zxid = if sid == 1 { 0x200 } else { 0x100 };
            spawn_node(&net, TestPeer::participant(sid, qv.clone()).with_zxid(zxid))
        })
        .collect();

    let mut handles = Vec::new();
    for node in &nodes {
        let election = node.election.clone();
        handles.push(tokio::spawn(
            async move { election.look_for_leader().await },
        ));
    }

    for handle in handles {
        let vote = timeout(DEADLINE, handle)
            .await
            .expect("election timed out")
            .unwrap()
            .unwrap()
            .expect("election must conclude with a vote");
        assert_eq!(vote.leader, 1, "history must outrank server id");
        assert_eq!(vote.zxid, 0x200);
    }

    assert_eq!(nodes[0].peer.peer_state(), ServerState::Leading);
    for node in &nodes {
        node.election.shutdown();
    }
}

#[tokio::test]
async fn latecomer_adopts_established_quorum() {
    init_tracing();
    let net = LoopbackNetwork::new();
    let qv = QuorumVerifier::majority([1, 2, 3]);

    // peers 1 and 2 settled in round 5: 1 leads, 2 follows
    let committed = Vote::new(1, 0x500, 5, 2);
    let leader_handle = Arc::new(TestLeader::default());

    let p1 = TestPeer::build(1, qv.clone(), LearnerType::Participant, ServerState::Leading);
    p1.set_current_vote(committed);
    p1.set_leader_handle(leader_handle.clone());
    let n1 = spawn_node(&net, p1);

    let p2 = TestPeer::build(
        2,
        qv.clone(),
        LearnerType::Participant,
        ServerState::Following,
    );
    p2.set_current_vote(committed);
    let n2 = spawn_node(&net, p2);

    // peer 3 starts cold and must discover the sitting leader
    let n3 = spawn_node(&net, TestPeer::participant(3, qv));
    let vote = timeout(DEADLINE, n3.election.look_for_leader())
        .await
        .expect("election timed out")
        .unwrap()
        .expect("latecomer must adopt the quorum");

    assert_eq!(vote.leader, 1);
    assert_eq!(vote.zxid, 0x500);
    assert_eq!(vote.election_epoch, 5);
    assert_eq!(vote.peer_epoch, 2);
    assert_eq!(n3.peer.peer_state(), ServerState::Following);
    // the latecomer jumped straight to the established round
    assert_eq!(n3.election.logical_clock(), 5);
    // the leader was told about the straggler
    assert!(leader_handle.looking_sids.lock().unwrap().contains(&3));

    for node in [&n1, &n2, &n3] {
        node.election.shutdown();
    }
}

#[tokio::test]
async fn reconfiguration_restarts_election() {
    init_tracing();
    let net = LoopbackNetwork::new();
    let qv_v1 = QuorumVerifier::Majority(QuorumMaj::with_version(
        [(1, 1), (2, 1), (3, 1)].into_iter().collect(),
        1,
    ));

    let node = spawn_node(&net, TestPeer::participant(1, qv_v1));
    let election = node.election.clone();
    let looking = tokio::spawn(async move { election.look_for_leader().await });

    // a peer announces a different membership under a higher version
    let qv_v2 = QuorumVerifier::Majority(QuorumMaj::with_version(
        [(1, 1), (2, 1), (3, 1), (4, 1)].into_iter().collect(),
        2,
    ));
    let injector = net.register(2);
    injector.send(1, looking_frame(1, 2, 1, &qv_v2));

    let result = timeout(DEADLINE, looking)
        .await
        .expect("election loop failed to exit")
        .unwrap()
        .unwrap();
    assert!(result.is_none(), "a restarted election yields no vote");
    assert!(node.peer.restart_requested.load(Ordering::SeqCst));

    let reconfigs = node.peer.reconfigs.lock().unwrap();
    assert_eq!(reconfigs.len(), 1);
    assert_eq!(reconfigs[0].version(), 2);
    assert!(reconfigs[0].is_voting_member(4));
}

#[tokio::test]
async fn observer_answers_but_never_votes() {
    init_tracing();
    let net = LoopbackNetwork::new();
    let qv = QuorumVerifier::majority([1, 2, 3]);

    // sid 4 observes the ensemble and already knows the committed leader
    let observer = TestPeer::build(4, qv.clone(), LearnerType::Observer, ServerState::Observing);
    observer.set_current_vote(Vote::new(1, 0x500, 5, 2));
    let _node = spawn_node(&net, observer);

    // a valid voter probes it while looking
    let voter = net.register(1);
    voter.send(4, looking_frame(4, 1, 1, &qv));

    let reply = timeout(Duration::from_secs(10), voter.poll_recv(Duration::from_secs(10)))
        .await
        .expect("poll timed out")
        .expect("observer must answer a looking voter");
    assert_eq!(reply.sid, 4);

    let frame = NotificationFrame::decode(reply.sid, &reply.frame).unwrap();
    assert_eq!(frame.state_raw, ServerState::Observing.as_wire());
    assert_eq!(frame.leader, 1);
    assert_eq!(frame.zxid, 0x500);
    assert_eq!(frame.election_epoch, 5);
    assert_eq!(frame.peer_epoch, 2);
}

#[tokio::test]
async fn non_voter_gets_immediate_reply() {
    init_tracing();
    let net = LoopbackNetwork::new();
    let qv = QuorumVerifier::majority([1, 2, 3]);

    let node = spawn_node(&net, TestPeer::participant(1, qv.clone()));

    // sid 99 is in nobody's voting view
    let outsider = net.register(99);
    outsider.send(1, looking_frame(1, 99, 1, &qv));

    let reply = timeout(
        Duration::from_secs(10),
        outsider.poll_recv(Duration::from_secs(10)),
    )
    .await
    .expect("poll timed out")
    .expect("non-voter must get an answer");
    assert_eq!(reply.sid, 1);

    let frame = NotificationFrame::decode(reply.sid, &reply.frame).unwrap();
    assert_eq!(frame.leader, node.peer.current_vote().leader);
    assert_eq!(frame.state_raw, ServerState::Looking.as_wire());

    node.election.shutdown();
}

#[tokio::test]
async fn lagging_looker_gets_courtesy_reply() {
    init_tracing();
    let net = LoopbackNetwork::new();
    let qv = QuorumVerifier::majority([1, 2, 3]);

    // workers only; the loop is never entered, so the logical clock is 0
    // and any negative round is "lagging"
    let node = spawn_node(&net, TestPeer::participant(1, qv.clone()));

    let laggard = net.register(2);
    laggard.send(1, looking_frame(1, 2, -5, &qv));

    let reply = timeout(
        Duration::from_secs(10),
        laggard.poll_recv(Duration::from_secs(10)),
    )
    .await
    .expect("poll timed out")
    .expect("lagging voter must get the current vote back");

    let frame = NotificationFrame::decode(reply.sid, &reply.frame).unwrap();
    assert_eq!(frame.state_raw, ServerState::Looking.as_wire());
    assert_eq!(frame.election_epoch, 0);

    node.election.shutdown();
}

#[tokio::test]
async fn oracle_breaks_two_node_tie() {
    init_tracing();
    let net = LoopbackNetwork::new();

    let oracle = Arc::new(StaticOracle::new(true));
    let base = QuorumMaj::new([(1, 1), (2, 1)].into_iter().collect());
    let qv = QuorumVerifier::OracleMajority(QuorumOracleMaj::with_oracle(base, oracle, "token"));

    // peer 2 is down; the oracle granted peer 1 the progress token
    let node = spawn_node(&net, TestPeer::participant(1, qv));
    let vote = timeout(DEADLINE, node.election.look_for_leader())
        .await
        .expect("election timed out")
        .unwrap()
        .expect("survivor must win with the oracle's blessing");

    assert_eq!(vote.leader, 1);
    assert_eq!(node.peer.peer_state(), ServerState::Leading);

    node.election.shutdown();
}

#[tokio::test]
async fn oracle_denial_authorizes_following_claimed_leader() {
    init_tracing();
    let net = LoopbackNetwork::new();

    // the token rests with the sitting leader, not with us
    let oracle = Arc::new(StaticOracle::new(false));
    let base = QuorumMaj::new([(1, 1), (2, 1)].into_iter().collect());
    let qv =
        QuorumVerifier::OracleMajority(QuorumOracleMaj::with_oracle(base, oracle, "token"));

    let node = spawn_node(&net, TestPeer::participant(1, qv.clone()));
    let election = node.election.clone();
    let looking = tokio::spawn(async move { election.look_for_leader().await });

    // peer 2 claims leadership from an earlier round
    let claimant = net.register(2);
    claimant.send(
        1,
        encode_notification(&ToSend {
            sid: 1,
            leader: 2,
            zxid: 0x200,
            election_epoch: 9,
            peer_epoch: 1,
            state: ServerState::Leading,
            config_data: Bytes::from(qv.to_config_string()),
        }),
    );

    let vote = timeout(DEADLINE, looking)
        .await
        .expect("election timed out")
        .unwrap()
        .unwrap()
        .expect("oracle denial must authorize following");
    assert_eq!(vote.leader, 2);
    assert_eq!(vote.zxid, 0x200);
    assert_eq!(vote.election_epoch, 9);
    assert_eq!(node.peer.peer_state(), ServerState::Following);

    node.election.shutdown();
}
