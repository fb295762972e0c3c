//! An in-process `PeerTransport`: calls a sibling `Replica` directly,
//! skipping serialization entirely. Used by multi-replica-per-process
//! deployments and grounded in the reference test suite's pattern of
//! handing every server a dict of direct object references to its peers
//! rather than real network proxies.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use surfstore_proto::{AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse, ServerId};
use surfstore_raft::{PeerTransport, Replica};

struct Registry {
    slots: Vec<OnceLock<Arc<Replica>>>,
}

impl Registry {
    fn get(&self, id: ServerId) -> Arc<Replica> {
        self.slots[id as usize]
            .get()
            .cloned()
            .expect("peer replica registered before first RPC")
    }
}

pub struct InProcessTransport {
    peer_id: ServerId,
    registry: Arc<Registry>,
}

impl PeerTransport for InProcessTransport {
    fn request_vote(&self, req: RequestVoteRequest) -> Option<RequestVoteResponse> {
        Some(self.registry.get(self.peer_id).request_vote(req))
    }

    fn append_entries(&self, req: AppendEntriesRequest) -> Option<AppendEntriesResponse> {
        Some(self.registry.get(self.peer_id).append_entries(req))
    }
}

/// Builds `num_servers` replicas that talk to each other through
/// in-process transports, returned in ascending id order. None of them
/// are restored; the caller decides when to bring each one up.
pub fn build_in_process_cluster(num_servers: usize) -> Vec<Arc<Replica>> {
    let registry = Arc::new(Registry { slots: (0..num_servers).map(|_| OnceLock::new()).collect() });
    let mut replicas = Vec::with_capacity(num_servers);
    for id in 0..num_servers {
        let mut peers: HashMap<ServerId, Arc<dyn PeerTransport>> = HashMap::new();
        for peer_id in 0..num_servers {
            if peer_id != id {
                let transport = InProcessTransport { peer_id: peer_id as ServerId, registry: registry.clone() };
                peers.insert(peer_id as ServerId, Arc::new(transport) as Arc<dyn PeerTransport>);
            }
        }
        let replica = Replica::new(id as ServerId, num_servers, peers);
        registry.slots[id].set(replica.clone()).ok().expect("slot set exactly once");
        replicas.push(replica);
    }
    replicas
}
