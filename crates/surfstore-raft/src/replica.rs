use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use rand::Rng;
use surfstore_proto::{
    AppendEntriesRequest, AppendEntriesResponse, BlockHash, FileInfo, LogEntry, LogIndex, LogPosition,
    RequestVoteRequest, RequestVoteResponse, ServerId, Term, UpdateFileCommand,
};
use surfstore_store::{BlockStore, FileInfoStore};

use crate::errors::RaftError;
use crate::log::Log;
use crate::role::{CandidateState, FollowerState, LeaderState, Role};
use crate::transport::PeerTransport;

/// Lower/upper bounds of the randomized follower election timeout, and the
/// fixed leader heartbeat interval. In-process units; a real deployment
/// would want these larger to tolerate network latency.
const ELECTION_TIMEOUT_MIN: Duration = Duration::from_millis(150);
const ELECTION_TIMEOUT_MAX: Duration = Duration::from_millis(300);
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(50);
/// Poll granularity for callers blocked in `update_file`/`get_file_info_map`.
const WAIT_POLL: Duration = Duration::from_millis(5);

fn random_election_timeout() -> Duration {
    let millis = rand::thread_rng().gen_range(ELECTION_TIMEOUT_MIN.as_millis()..=ELECTION_TIMEOUT_MAX.as_millis());
    Duration::from_millis(millis as u64)
}

struct ConsensusState {
    current_term: Term,
    voted_for: Option<ServerId>,
    log: Log,
    commit_index: LogIndex,
    last_applied: LogIndex,
    role: Role,
    /// Outcome of applying the entry at a given index, consumed exactly
    /// once by the `update_file` call that proposed it.
    apply_results: HashMap<LogIndex, bool>,
}

/// One cluster member: the consensus state machine plus its two local
/// side-stores. `ConsensusLock` (the `consensus` mutex) must be acquired
/// before `FileInfoLock` (the `file_info` mutex) whenever both are needed;
/// `blocks` is never touched while holding either.
pub struct Replica {
    id: ServerId,
    num_servers: usize,
    peers: HashMap<ServerId, Arc<dyn PeerTransport>>,
    consensus: Mutex<ConsensusState>,
    cv: Condvar,
    file_info: Mutex<FileInfoStore>,
    blocks: Mutex<BlockStore>,
    self_ref: OnceLock<Weak<Replica>>,
}

impl Replica {
    /// Builds a replica in the `Down` state, matching the source's
    /// "crashed by default until explicitly restored" startup behavior.
    pub fn new(id: ServerId, num_servers: usize, peers: HashMap<ServerId, Arc<dyn PeerTransport>>) -> Arc<Replica> {
        let replica = Arc::new(Replica {
            id,
            num_servers,
            peers,
            consensus: Mutex::new(ConsensusState {
                current_term: 0,
                voted_for: None,
                log: Log::new(),
                commit_index: 0,
                last_applied: 0,
                role: Role::Down,
                apply_results: HashMap::new(),
            }),
            cv: Condvar::new(),
            file_info: Mutex::new(FileInfoStore::new()),
            blocks: Mutex::new(BlockStore::new()),
            self_ref: OnceLock::new(),
        });
        replica
            .self_ref
            .set(Arc::downgrade(&replica))
            .ok()
            .expect("self_ref is set exactly once, immediately after construction");
        replica
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    fn arc_self(&self) -> Arc<Replica> {
        self.self_ref
            .get()
            .expect("self_ref initialized in Replica::new")
            .upgrade()
            .expect("a replica's background task outlived the replica itself")
    }

    fn majority_size(&self) -> usize {
        self.num_servers / 2 + 1
    }

    // ---- status / lifecycle -------------------------------------------

    pub fn is_leader(&self) -> bool {
        matches!(self.consensus.lock().unwrap().role, Role::Leader(_))
    }

    pub fn is_crashed(&self) -> bool {
        matches!(self.consensus.lock().unwrap().role, Role::Down)
    }

    /// Soft crash: stops the active role's background task and parks the
    /// replica in `Down`, where it refuses every RPC. In-memory state
    /// (log, term, stores) is left untouched, ready for `restore`.
    pub fn crash(self: &Arc<Self>) -> bool {
        let mut guard = self.consensus.lock().unwrap();
        guard.role.stop_background_task();
        guard.role = Role::Down;
        self.cv.notify_all();
        true
    }

    /// Restores a crashed replica by entering `Follower`, exactly as a
    /// freshly started replica would.
    pub fn restore(self: &Arc<Self>) -> bool {
        let mut guard = self.consensus.lock().unwrap();
        self.become_follower(&mut guard);
        true
    }

    pub fn tester_get_version(&self, name: &str) -> Option<u64> {
        self.file_info.lock().unwrap().get_version(name)
    }

    // ---- block store passthroughs --------------------------------------

    pub fn put_block(&self, data: Vec<u8>) -> BlockHash {
        self.blocks.lock().unwrap().put_block(data)
    }

    pub fn get_block(&self, hash: &BlockHash) -> Option<Vec<u8>> {
        self.blocks.lock().unwrap().get_block(hash)
    }

    pub fn has_blocks(&self, hashes: &[BlockHash]) -> Vec<BlockHash> {
        self.blocks.lock().unwrap().has_blocks(hashes)
    }

    // ---- client-facing replicated operations ---------------------------

    /// Appends a command to the leader's log and blocks until it commits
    /// (or this replica stops being leader), then returns whatever
    /// `FileInfoStore::update_file` produced for it.
    pub fn update_file(self: &Arc<Self>, name: String, version: u64, blocks: Vec<BlockHash>) -> Result<bool, RaftError> {
        let mut guard = self.consensus.lock().unwrap();
        if !matches!(guard.role, Role::Leader(_)) {
            return Err(RaftError::NotLeader);
        }
        let term = guard.current_term;
        guard.log.append(LogEntry {
            term,
            command: UpdateFileCommand { name: name.clone(), info: FileInfo { version, blocks } },
        });
        let pending_index = guard.log.last_index();

        loop {
            if let Some(result) = guard.apply_results.remove(&pending_index) {
                // A new leader may have truncated and overwritten this index with an
                // unrelated entry before it committed; only trust the applied result
                // if the entry actually at `pending_index` is still the one we appended.
                if guard.log.term_at(pending_index) == term {
                    return Ok(result);
                }
                return Err(RaftError::NotLeader);
            }
            if !matches!(guard.role, Role::Leader(_)) {
                return Err(RaftError::NotLeader);
            }
            guard = self.cv.wait_timeout(guard, WAIT_POLL).unwrap().0;
        }
    }

    /// Blocks until a replication round has shown this leader reachable to
    /// a majority (including itself), then returns a snapshot of the file
    /// info map. Fails immediately if this replica is not leader or is
    /// crashed.
    pub fn get_file_info_map(&self) -> Result<HashMap<String, FileInfo>, RaftError> {
        let mut guard = self.consensus.lock().unwrap();
        loop {
            match &guard.role {
                Role::Leader(s) if s.last_round_reachable >= self.majority_size() => break,
                Role::Leader(_) => {}
                _ => return Err(RaftError::NotLeader),
            }
            guard = self.cv.wait_timeout(guard, WAIT_POLL).unwrap().0;
        }
        drop(guard);
        Ok(self.file_info.lock().unwrap().get_file_info_map())
    }

    // ---- RPC receivers ---------------------------------------------------

    /// Non-blocking: an incoming vote request never waits behind a
    /// busy replica, it is simply told "busy" via the `-1` term sentinel.
    pub fn request_vote(&self, req: RequestVoteRequest) -> RequestVoteResponse {
        let mut guard = match self.consensus.try_lock() {
            Ok(g) => g,
            Err(_) => return RequestVoteResponse { term: -1, vote_granted: false },
        };
        if matches!(guard.role, Role::Down) {
            return RequestVoteResponse { term: -1, vote_granted: false };
        }

        self.mark_observed(&mut guard);
        self.observe_term(&mut guard, req.term);

        if req.term < guard.current_term {
            return RequestVoteResponse { term: guard.current_term as i64, vote_granted: false };
        }

        let ours = LogPosition { term: guard.log.last_term(), index: guard.log.last_index() };
        let theirs = LogPosition { term: req.last_log_term, index: req.last_log_index };
        let up_to_date = theirs >= ours;
        let can_vote = guard.voted_for.is_none() || guard.voted_for == Some(req.candidate_id);
        let granted = up_to_date && can_vote;

        if granted {
            guard.voted_for = Some(req.candidate_id);
        }
        let term = guard.current_term as i64;
        self.cv.notify_all();
        RequestVoteResponse { term, vote_granted: granted }
    }

    pub fn append_entries(&self, req: AppendEntriesRequest) -> AppendEntriesResponse {
        let mut guard = match self.consensus.try_lock() {
            Ok(g) => g,
            Err(_) => return AppendEntriesResponse { term: -1, success: false },
        };
        if matches!(guard.role, Role::Down) {
            return AppendEntriesResponse { term: -1, success: false };
        }

        self.mark_observed(&mut guard);
        self.observe_term(&mut guard, req.term);

        if req.term < guard.current_term {
            return AppendEntriesResponse { term: guard.current_term as i64, success: false };
        }
        if matches!(guard.role, Role::Candidate(_)) {
            self.become_follower(&mut guard);
        }
        if let Role::Follower(s) = &mut guard.role {
            s.last_leader_id = Some(req.leader_id);
        }

        let prev_ok =
            req.prev_log_index <= guard.log.last_index() && guard.log.term_at(req.prev_log_index) == req.prev_log_term;
        if !prev_ok {
            return AppendEntriesResponse { term: guard.current_term as i64, success: false };
        }

        let mut i = 0usize;
        while i < req.entries.len() {
            let idx = req.prev_log_index + 1 + i as u64;
            if idx > guard.log.last_index() {
                break;
            }
            if guard.log.term_at(idx) != req.entries[i].term {
                guard.log.truncate_from(idx);
                break;
            }
            i += 1;
        }
        for entry in &req.entries[i..] {
            guard.log.append(entry.clone());
        }

        if req.leader_commit > guard.commit_index {
            guard.commit_index = req.leader_commit.min(guard.log.last_index());
            self.apply_committed(&mut guard);
        }
        let term = guard.current_term as i64;
        self.cv.notify_all();
        AppendEntriesResponse { term, success: true }
    }

    // ---- role-local helpers (caller holds ConsensusLock) ----------------

    fn mark_observed(&self, guard: &mut MutexGuard<ConsensusState>) {
        if let Role::Follower(s) = &mut guard.role {
            s.observed = true;
        }
    }

    fn observe_term(&self, guard: &mut MutexGuard<ConsensusState>, term: Term) {
        if term > guard.current_term {
            guard.current_term = term;
            guard.voted_for = None;
            self.become_follower(guard);
        }
    }

    fn is_current(guard: &ConsensusState, stop: &Arc<AtomicBool>) -> bool {
        guard.role.stop_flag().map(|flag| Arc::ptr_eq(flag, stop)).unwrap_or(false)
    }

    fn become_follower(&self, guard: &mut MutexGuard<ConsensusState>) {
        tracing::debug!(replica = self.id, term = guard.current_term, from = guard.role.name(), "stepping down to follower");
        guard.role.stop_background_task();
        let stop = Arc::new(AtomicBool::new(false));
        guard.role = Role::Follower(FollowerState { last_leader_id: None, observed: false, stop: stop.clone() });
        let me = self.arc_self();
        thread::spawn(move || Replica::follower_loop(me, stop));
    }

    fn start_election(&self, guard: &mut MutexGuard<ConsensusState>) {
        tracing::debug!(replica = self.id, term = guard.current_term, "election timeout, converting to candidate");
        guard.role.stop_background_task();
        let stop = Arc::new(AtomicBool::new(false));
        guard.role = Role::Candidate(CandidateState { stop: stop.clone() });
        let me = self.arc_self();
        thread::spawn(move || Replica::candidate_loop(me, stop));
    }

    fn become_leader(&self, guard: &mut MutexGuard<ConsensusState>) {
        guard.role.stop_background_task();
        let last_index = guard.log.last_index();
        let next_index = self.peers.keys().map(|id| (*id, last_index + 1)).collect();
        let match_index = self.peers.keys().map(|id| (*id, 0)).collect();
        let stop = Arc::new(AtomicBool::new(false));
        guard.role = Role::Leader(LeaderState { next_index, match_index, last_round_reachable: 1, stop: stop.clone() });
        tracing::info!(replica = self.id, term = guard.current_term, "became leader");
        let me = self.arc_self();
        thread::spawn(move || Replica::leader_loop(me, stop));
    }

    fn apply_committed(&self, guard: &mut MutexGuard<ConsensusState>) {
        while guard.last_applied < guard.commit_index {
            let idx = guard.last_applied + 1;
            let entry = guard.log.entry_at(idx).expect("a committed index must exist in the log").clone();
            let ok = {
                let mut store = self.file_info.lock().unwrap();
                store.update_file(&entry.command.name, entry.command.info.version, entry.command.info.blocks)
            };
            guard.apply_results.insert(idx, ok);
            guard.last_applied = idx;
        }
    }

    // ---- background role loops ------------------------------------------

    fn follower_loop(replica: Arc<Replica>, stop: Arc<AtomicBool>) {
        loop {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            thread::sleep(random_election_timeout());
            if stop.load(Ordering::Relaxed) {
                return;
            }
            let mut guard = replica.consensus.lock().unwrap();
            if !Self::is_current(&guard, &stop) {
                return;
            }
            let timed_out = match &mut guard.role {
                Role::Follower(s) => {
                    if s.observed {
                        s.observed = false;
                        false
                    } else {
                        true
                    }
                }
                _ => return,
            };
            if timed_out {
                replica.start_election(&mut guard);
                return;
            }
        }
    }

    fn candidate_loop(replica: Arc<Replica>, stop: Arc<AtomicBool>) {
        loop {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            {
                let mut guard = replica.consensus.lock().unwrap();
                if !Self::is_current(&guard, &stop) {
                    return;
                }
                replica.run_election_round(&mut guard);
                if !matches!(guard.role, Role::Candidate(_)) {
                    return;
                }
            }
            if stop.load(Ordering::Relaxed) {
                return;
            }
            thread::sleep(random_election_timeout());
        }
    }

    fn leader_loop(replica: Arc<Replica>, stop: Arc<AtomicBool>) {
        loop {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            {
                let mut guard = replica.consensus.lock().unwrap();
                if !Self::is_current(&guard, &stop) {
                    return;
                }
                replica.run_replication_round(&mut guard);
                if !matches!(guard.role, Role::Leader(_)) {
                    return;
                }
            }
            if stop.load(Ordering::Relaxed) {
                return;
            }
            thread::sleep(HEARTBEAT_INTERVAL);
        }
    }

    /// One round of the election: increment term, vote for self, collect
    /// votes from every peer under the lock (calls are short-timeout, so
    /// holding `ConsensusLock` for the whole round is acceptable here as
    /// it is in the source this is grounded on).
    fn run_election_round(&self, guard: &mut MutexGuard<ConsensusState>) {
        guard.current_term += 1;
        guard.voted_for = Some(self.id);
        let term = guard.current_term;
        let req = RequestVoteRequest {
            term,
            candidate_id: self.id,
            last_log_index: guard.log.last_index(),
            last_log_term: guard.log.last_term(),
        };

        let mut votes = 1usize;
        let mut latest_observed: i64 = term as i64;
        for peer in self.peers.values() {
            if let Some(resp) = peer.request_vote(req.clone()) {
                latest_observed = latest_observed.max(resp.term);
                if resp.vote_granted {
                    votes += 1;
                }
            }
        }

        tracing::debug!(replica = self.id, term, votes, "election round complete");

        if votes >= self.majority_size() {
            self.become_leader(guard);
        } else if latest_observed > term as i64 {
            guard.current_term = latest_observed as u64;
            guard.voted_for = None;
            self.become_follower(guard);
        }
    }

    /// One round of replication: send AppendEntries to every peer, advance
    /// `next_index`/`match_index` on success, back off by one on an
    /// in-term rejection, and recompute the commit index.
    fn run_replication_round(&self, guard: &mut MutexGuard<ConsensusState>) {
        let term = guard.current_term;
        let commit_index = guard.commit_index;
        let last_log_index = guard.log.last_index();
        let mut latest_observed = term as i64;
        let mut reachable = 1usize;

        let peer_ids: Vec<ServerId> = self.peers.keys().copied().collect();
        for peer_id in peer_ids {
            let (prev_index, prev_term, entries) = {
                let leader = match &guard.role {
                    Role::Leader(s) => s,
                    _ => return,
                };
                let next_index = *leader.next_index.get(&peer_id).expect("every peer has a next_index entry");
                let prev_index = next_index - 1;
                (prev_index, guard.log.term_at(prev_index), guard.log.entries_from(next_index))
            };
            let req = AppendEntriesRequest {
                term,
                leader_id: self.id,
                prev_log_index: prev_index,
                prev_log_term: prev_term,
                entries,
                leader_commit: commit_index,
            };

            match self.peers[&peer_id].append_entries(req) {
                Some(resp) if resp.term >= 0 => {
                    latest_observed = latest_observed.max(resp.term);
                    reachable += 1;
                    let leader = match &mut guard.role {
                        Role::Leader(s) => s,
                        _ => return,
                    };
                    if resp.success {
                        leader.next_index.insert(peer_id, last_log_index + 1);
                        leader.match_index.insert(peer_id, last_log_index);
                    } else {
                        let next_index = leader.next_index.get_mut(&peer_id).unwrap();
                        *next_index = (*next_index - 1).max(1);
                    }
                }
                Some(_) | None => {
                    // peer timed out, or answered crashed/busy (-1): skip it this round.
                }
            }
        }

        if let Role::Leader(s) = &mut guard.role {
            s.last_round_reachable = reachable;
        }
        self.cv.notify_all();
        self.advance_commit_index(guard);

        if latest_observed as u64 > guard.current_term {
            guard.current_term = latest_observed as u64;
            guard.voted_for = None;
            self.become_follower(guard);
        }
    }

    /// Finds the highest index replicated to a majority in the current
    /// term and advances `commit_index` to it (Raft never commits an
    /// earlier term's entry purely by counting replicas).
    fn advance_commit_index(&self, guard: &mut MutexGuard<ConsensusState>) {
        let term = guard.current_term;
        let last_log_index = guard.log.last_index();
        let majority = self.majority_size();
        let mut best = guard.commit_index;

        if let Role::Leader(s) = &guard.role {
            for m in (guard.commit_index + 1)..=last_log_index {
                if guard.log.term_at(m) != term {
                    continue;
                }
                let count = 1 + s.match_index.values().filter(|&&idx| idx >= m).count();
                if count >= majority {
                    best = m;
                }
            }
        }

        if best > guard.commit_index {
            guard.commit_index = best;
            self.apply_committed(guard);
            self.cv.notify_all();
        }
    }
}
