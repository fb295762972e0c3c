//! Request/response envelopes carried over the length-prefixed `rmp-serde`
//! TCP transport. Kept separate from the plain consensus types in
//! `lib.rs` since this enum is transport surface, not domain state.

use crate::{AppendEntriesRequest, AppendEntriesResponse, BlockHash, FileInfo, RequestVoteRequest, RequestVoteResponse};
use std::collections::HashMap;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum RpcRequest {
    RequestVote(RequestVoteRequest),
    AppendEntries(AppendEntriesRequest),
    UpdateFile { name: String, version: u64, blocks: Vec<BlockHash> },
    GetFileInfoMap,
    IsLeader,
    IsCrashed,
    Crash,
    Restore,
    TesterGetVersion { name: String },
    PutBlock(Vec<u8>),
    GetBlock(BlockHash),
    HasBlocks(Vec<BlockHash>),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum RpcResponse {
    RequestVote(RequestVoteResponse),
    AppendEntries(AppendEntriesResponse),
    UpdateFile(Result<bool, String>),
    GetFileInfoMap(Result<HashMap<String, FileInfo>, String>),
    IsLeader(bool),
    IsCrashed(bool),
    Crash(bool),
    Restore(bool),
    TesterGetVersion(Option<u64>),
    PutBlock(BlockHash),
    GetBlock(Option<Vec<u8>>),
    HasBlocks(Vec<BlockHash>),
}
