//! Cluster-level behavior, exercised through an in-process `PeerTransport`
//! that calls straight into the peer `Replica`s rather than over a socket.
//! The scenarios mirror the reference test suite this crate's concurrency
//! model is grounded on: bring a cluster up one replica at a time, crash
//! and restore replicas, and check that writes only succeed once a
//! majority is reachable.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use surfstore_proto::{AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse};
use surfstore_raft::{PeerTransport, Replica};

/// Resolves peer ids to `Arc<Replica>` lazily, so every replica's peer map
/// can be built before any of the cluster's siblings exist.
struct Registry {
    slots: Vec<OnceLock<Arc<Replica>>>,
}

impl Registry {
    fn get(&self, id: usize) -> Arc<Replica> {
        self.slots[id].get().cloned().expect("peer replica registered before first use")
    }
}

struct InProcessPeer {
    id: usize,
    registry: Arc<Registry>,
}

impl PeerTransport for InProcessPeer {
    fn request_vote(&self, req: RequestVoteRequest) -> Option<RequestVoteResponse> {
        Some(self.registry.get(self.id).request_vote(req))
    }

    fn append_entries(&self, req: AppendEntriesRequest) -> Option<AppendEntriesResponse> {
        Some(self.registry.get(self.id).append_entries(req))
    }
}

struct TestCluster {
    replicas: Vec<Arc<Replica>>,
}

impl TestCluster {
    fn new(n: usize) -> Self {
        let registry = Arc::new(Registry { slots: (0..n).map(|_| OnceLock::new()).collect() });
        let mut replicas = Vec::with_capacity(n);
        for id in 0..n {
            let mut peers: HashMap<u64, Arc<dyn PeerTransport>> = HashMap::new();
            for peer_id in 0..n {
                if peer_id != id {
                    let peer = Arc::new(InProcessPeer { id: peer_id, registry: registry.clone() });
                    peers.insert(peer_id as u64, peer as Arc<dyn PeerTransport>);
                }
            }
            let replica = Replica::new(id as u64, n, peers);
            registry.slots[id].set(replica.clone()).ok().expect("slot set exactly once");
            replicas.push(replica);
        }
        TestCluster { replicas }
    }

    fn restore_all(&self) {
        for r in &self.replicas {
            r.restore();
        }
    }

    fn leader(&self) -> Option<Arc<Replica>> {
        self.replicas.iter().find(|r| r.is_leader()).cloned()
    }

    fn wait_for_leader(&self, timeout: Duration) -> Option<Arc<Replica>> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(l) = self.leader() {
                return Some(l);
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }
}

#[test]
fn elects_a_single_leader_once_a_majority_is_up() {
    let cluster = TestCluster::new(3);
    cluster.restore_all();
    let leader = cluster.wait_for_leader(Duration::from_secs(2));
    assert!(leader.is_some(), "expected a leader to emerge");
    let leader_count = cluster.replicas.iter().filter(|r| r.is_leader()).count();
    assert_eq!(leader_count, 1);
}

#[test]
fn no_leader_emerges_without_a_majority() {
    let cluster = TestCluster::new(3);
    // Only one of three replicas is up: no majority, no leader.
    cluster.replicas[0].restore();
    thread::sleep(Duration::from_millis(800));
    assert!(cluster.leader().is_none());
}

#[test]
fn write_replicates_and_becomes_visible_on_the_leader() {
    let cluster = TestCluster::new(3);
    cluster.restore_all();
    let leader = cluster.wait_for_leader(Duration::from_secs(2)).expect("leader");

    let hash = surfstore_proto::BlockHash::of(b"hello world");
    let ok = leader.update_file("a.txt".to_string(), 1, vec![hash]).expect("leader should accept write");
    assert!(ok);

    let map = leader.get_file_info_map().expect("leader should answer reads");
    assert_eq!(map["a.txt"].version, 1);
    assert_eq!(leader.tester_get_version("a.txt"), Some(1));
}

#[test]
fn write_on_a_non_leader_fails_fast() {
    let cluster = TestCluster::new(3);
    cluster.restore_all();
    let leader = cluster.wait_for_leader(Duration::from_secs(2)).expect("leader");
    let follower = cluster.replicas.iter().find(|r| !Arc::ptr_eq(r, &leader)).unwrap();

    let result = follower.update_file("a.txt".to_string(), 1, vec![]);
    assert!(result.is_err());
}

#[test]
fn write_blocks_while_only_a_minority_is_reachable() {
    let cluster = TestCluster::new(3);
    cluster.restore_all();
    let leader = cluster.wait_for_leader(Duration::from_secs(2)).expect("leader");

    for r in &cluster.replicas {
        if !Arc::ptr_eq(r, &leader) {
            r.crash();
        }
    }

    let leader_for_thread = leader.clone();
    let handle = thread::spawn(move || leader_for_thread.update_file("a.txt".to_string(), 1, vec![]));

    thread::sleep(Duration::from_millis(300));
    assert!(!handle.is_finished(), "write should still be pending without a majority");

    for r in &cluster.replicas {
        if !Arc::ptr_eq(r, &leader) {
            r.restore();
        }
    }
    let result = handle.join().unwrap();
    assert!(result.is_ok());
}

#[test]
fn follower_catches_up_after_crash_and_restore() {
    let cluster = TestCluster::new(3);
    cluster.restore_all();
    let leader = cluster.wait_for_leader(Duration::from_secs(2)).expect("leader");
    let victim = cluster
        .replicas
        .iter()
        .find(|r| !Arc::ptr_eq(r, &leader))
        .unwrap()
        .clone();

    victim.crash();
    leader.update_file("a.txt".to_string(), 1, vec![]).expect("write with remaining majority");
    victim.restore();

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if victim.tester_get_version("a.txt") == Some(1) {
            break;
        }
        assert!(Instant::now() < deadline, "follower never caught up");
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn version_must_be_sequential() {
    let cluster = TestCluster::new(3);
    cluster.restore_all();
    let leader = cluster.wait_for_leader(Duration::from_secs(2)).expect("leader");

    assert!(leader.update_file("a.txt".to_string(), 1, vec![]).unwrap());
    assert!(!leader.update_file("a.txt".to_string(), 3, vec![]).unwrap());
    assert!(leader.update_file("a.txt".to_string(), 2, vec![]).unwrap());
}
