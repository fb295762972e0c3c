//! A typed client-facing RPC connection, playing the role the reference
//! implementation's `xmlrpc.client.ServerProxy` plays for `client.py`:
//! one call per request, blocking for the duration of the server's reply
//! (which for `UpdateFile`/`GetFileInfoMap` may itself block server-side
//! while consensus catches up).

use std::collections::HashMap;
use std::net::TcpStream;
use std::time::Duration;

use surfstore_proto::wire::{RpcRequest, RpcResponse};
use surfstore_proto::{BlockHash, FileInfo};
use thiserror::Error;

use crate::framing::{read_frame, write_frame};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("unexpected response variant")]
    UnexpectedVariant,
    #[error("server reported an error: {0}")]
    Server(String),
}

/// `UpdateFile`/`GetFileInfoMap` can legitimately block server-side for as
/// long as it takes the cluster to elect a leader and reach commit; give
/// those a generous ceiling rather than the short peer-to-peer timeout.
const CLIENT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SurfstoreRpcClient {
    addr: String,
}

impl SurfstoreRpcClient {
    pub fn new(addr: impl Into<String>) -> Self {
        SurfstoreRpcClient { addr: addr.into() }
    }

    fn call(&self, request: RpcRequest) -> Result<RpcResponse, ClientError> {
        let mut stream = TcpStream::connect(&self.addr)?;
        stream.set_read_timeout(Some(CLIENT_CALL_TIMEOUT))?;
        stream.set_write_timeout(Some(CLIENT_CALL_TIMEOUT))?;
        let payload = rmp_serde::to_vec(&request)?;
        write_frame(&mut stream, &payload)?;
        let response = read_frame(&mut stream)?;
        Ok(rmp_serde::from_slice(&response)?)
    }

    pub fn update_file(&self, name: &str, version: u64, blocks: Vec<BlockHash>) -> Result<bool, ClientError> {
        match self.call(RpcRequest::UpdateFile { name: name.to_string(), version, blocks })? {
            RpcResponse::UpdateFile(Ok(ok)) => Ok(ok),
            RpcResponse::UpdateFile(Err(e)) => Err(ClientError::Server(e)),
            _ => Err(ClientError::UnexpectedVariant),
        }
    }

    pub fn get_file_info_map(&self) -> Result<HashMap<String, FileInfo>, ClientError> {
        match self.call(RpcRequest::GetFileInfoMap)? {
            RpcResponse::GetFileInfoMap(Ok(map)) => Ok(map),
            RpcResponse::GetFileInfoMap(Err(e)) => Err(ClientError::Server(e)),
            _ => Err(ClientError::UnexpectedVariant),
        }
    }

    pub fn is_leader(&self) -> Result<bool, ClientError> {
        match self.call(RpcRequest::IsLeader)? {
            RpcResponse::IsLeader(v) => Ok(v),
            _ => Err(ClientError::UnexpectedVariant),
        }
    }

    pub fn is_crashed(&self) -> Result<bool, ClientError> {
        match self.call(RpcRequest::IsCrashed)? {
            RpcResponse::IsCrashed(v) => Ok(v),
            _ => Err(ClientError::UnexpectedVariant),
        }
    }

    pub fn crash(&self) -> Result<bool, ClientError> {
        match self.call(RpcRequest::Crash)? {
            RpcResponse::Crash(v) => Ok(v),
            _ => Err(ClientError::UnexpectedVariant),
        }
    }

    pub fn restore(&self) -> Result<bool, ClientError> {
        match self.call(RpcRequest::Restore)? {
            RpcResponse::Restore(v) => Ok(v),
            _ => Err(ClientError::UnexpectedVariant),
        }
    }

    pub fn tester_get_version(&self, name: &str) -> Result<Option<u64>, ClientError> {
        match self.call(RpcRequest::TesterGetVersion { name: name.to_string() })? {
            RpcResponse::TesterGetVersion(v) => Ok(v),
            _ => Err(ClientError::UnexpectedVariant),
        }
    }

    pub fn put_block(&self, data: Vec<u8>) -> Result<BlockHash, ClientError> {
        match self.call(RpcRequest::PutBlock(data))? {
            RpcResponse::PutBlock(hash) => Ok(hash),
            _ => Err(ClientError::UnexpectedVariant),
        }
    }

    pub fn get_block(&self, hash: BlockHash) -> Result<Option<Vec<u8>>, ClientError> {
        match self.call(RpcRequest::GetBlock(hash))? {
            RpcResponse::GetBlock(data) => Ok(data),
            _ => Err(ClientError::UnexpectedVariant),
        }
    }

    pub fn has_blocks(&self, hashes: Vec<BlockHash>) -> Result<Vec<BlockHash>, ClientError> {
        match self.call(RpcRequest::HasBlocks(hashes))? {
            RpcResponse::HasBlocks(present) => Ok(present),
            _ => Err(ClientError::UnexpectedVariant),
        }
    }
}
