use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use surfstore_proto::{LogIndex, ServerId};

/// Every non-`Down` role owns a `stop` flag for the background task it
/// spawned. A transition flips the departing role's flag before installing
/// the new one; the departing task observes it at its next wakeup and exits
/// without touching shared state, rather than being forcibly interrupted.
pub struct FollowerState {
    pub last_leader_id: Option<ServerId>,
    /// Set by a valid AppendEntries/RequestVote, cleared when the election
    /// timer inspects it. If still `false` at the end of a timeout window,
    /// the follower converts to candidate.
    pub observed: bool,
    pub stop: Arc<AtomicBool>,
}

pub struct CandidateState {
    pub stop: Arc<AtomicBool>,
}

pub struct LeaderState {
    pub next_index: HashMap<ServerId, LogIndex>,
    pub match_index: HashMap<ServerId, LogIndex>,
    /// Peers (including self) that answered the most recent replication
    /// round with a valid term, used to gate `GetFileInfoMap` on majority
    /// reachability.
    pub last_round_reachable: usize,
    pub stop: Arc<AtomicBool>,
}

pub enum Role {
    Down,
    Follower(FollowerState),
    Candidate(CandidateState),
    Leader(LeaderState),
}

impl Role {
    pub fn stop_flag(&self) -> Option<&Arc<AtomicBool>> {
        match self {
            Role::Down => None,
            Role::Follower(s) => Some(&s.stop),
            Role::Candidate(s) => Some(&s.stop),
            Role::Leader(s) => Some(&s.stop),
        }
    }

    pub fn stop_background_task(&self) {
        if let Some(flag) = self.stop_flag() {
            flag.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::Down => "down",
            Role::Follower(_) => "follower",
            Role::Candidate(_) => "candidate",
            Role::Leader(_) => "leader",
        }
    }
}
