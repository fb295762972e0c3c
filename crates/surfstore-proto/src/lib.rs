//! Wire and domain types shared by the consensus core, the block/file
//! stores, the RPC transports, and both CLI binaries.

use std::fmt;

pub mod config;
pub mod wire;

/// Type used to uniquely identify each replica. Assigned at startup as the
/// 0-based position of the replica in the cluster config file.
pub type ServerId = u64;

pub type Term = u64;

/// 1-indexed conceptually; stored 0-based internally in `Log`.
pub type LogIndex = u64;

/// SHA-256 digest of a block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    pub fn of(data: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        BlockHash(out)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut out = [0u8; 32];
        for i in 0..32 {
            out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(BlockHash(out))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.to_hex())
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Replicated state for a single file: its version and the ordered list of
/// block hashes that reconstruct its content. An empty `blocks` list is a
/// tombstone (the file is deleted) per invariant I7.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileInfo {
    pub version: u64,
    pub blocks: Vec<BlockHash>,
}

impl FileInfo {
    pub fn is_tombstone(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// A replicated metadata command: set `name`'s state to `info` provided the
/// version check in FileInfoStore::update_file passes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UpdateFileCommand {
    pub name: String,
    pub info: FileInfo,
}

/// A single entry in a replica's log.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub term: Term,
    pub command: UpdateFileCommand,
}

/// The position (term, index) of a log entry; used to compare which of
/// two logs is more up-to-date during leader election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogPosition {
    pub term: Term,
    pub index: LogIndex,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RequestVoteRequest {
    pub term: Term,
    pub candidate_id: ServerId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct RequestVoteResponse {
    pub term: i64,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AppendEntriesRequest {
    pub term: Term,
    pub leader_id: ServerId,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct AppendEntriesResponse {
    pub term: i64,
    pub success: bool,
}
