//! TCP transport: one blocking connection per call for peer-to-peer
//! consensus RPCs (grounded in the reference implementation's threaded
//! XML-RPC server, where a crashed peer still accepts connections and
//! answers `(-1, false)` rather than refusing them), and one
//! thread-per-connection listener that serves both peer and client RPCs.

use std::collections::HashMap;
use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use surfstore_proto::wire::{RpcRequest, RpcResponse};
use surfstore_proto::{AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse};
use surfstore_raft::{PeerTransport, Replica};

use crate::framing::{read_frame, write_frame};

/// Per-call timeout for peer-to-peer RPCs. Short because both election
/// and replication rounds hold `ConsensusLock` for the duration of a
/// round; a peer that cannot answer this quickly is simply skipped.
const PEER_CALL_TIMEOUT: Duration = Duration::from_millis(50);

pub struct TcpPeerTransport {
    addr: String,
}

impl TcpPeerTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        TcpPeerTransport { addr: addr.into() }
    }

    fn call(&self, request: &RpcRequest) -> io::Result<RpcResponse> {
        let mut stream = TcpStream::connect_timeout(
            &self.addr.parse().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{e}")))?,
            PEER_CALL_TIMEOUT,
        )?;
        stream.set_read_timeout(Some(PEER_CALL_TIMEOUT))?;
        stream.set_write_timeout(Some(PEER_CALL_TIMEOUT))?;
        let payload = rmp_serde::to_vec(request).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_frame(&mut stream, &payload)?;
        let response = read_frame(&mut stream)?;
        rmp_serde::from_slice(&response).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl PeerTransport for TcpPeerTransport {
    fn request_vote(&self, req: RequestVoteRequest) -> Option<RequestVoteResponse> {
        match self.call(&RpcRequest::RequestVote(req)) {
            Ok(RpcResponse::RequestVote(resp)) => Some(resp),
            Ok(_) => {
                tracing::warn!(addr = %self.addr, "peer answered RequestVote with the wrong response variant");
                None
            }
            Err(e) => {
                tracing::debug!(addr = %self.addr, error = %e, "RequestVote call failed");
                None
            }
        }
    }

    fn append_entries(&self, req: AppendEntriesRequest) -> Option<AppendEntriesResponse> {
        match self.call(&RpcRequest::AppendEntries(req)) {
            Ok(RpcResponse::AppendEntries(resp)) => Some(resp),
            Ok(_) => {
                tracing::warn!(addr = %self.addr, "peer answered AppendEntries with the wrong response variant");
                None
            }
            Err(e) => {
                tracing::debug!(addr = %self.addr, error = %e, "AppendEntries call failed");
                None
            }
        }
    }
}

/// Builds the peer map for a replica at `self_id` out of a cluster host
/// list, skipping the replica's own address.
pub fn tcp_peers(self_id: u64, hosts: &[String]) -> HashMap<u64, Arc<dyn PeerTransport>> {
    hosts
        .iter()
        .enumerate()
        .filter(|(id, _)| *id as u64 != self_id)
        .map(|(id, addr)| (id as u64, Arc::new(TcpPeerTransport::new(addr.clone())) as Arc<dyn PeerTransport>))
        .collect()
}

/// Serves both peer consensus RPCs and client-facing RPCs on `listener`,
/// one thread per accepted connection, until the process exits.
pub fn serve(replica: Arc<Replica>, listener: TcpListener) -> io::Result<()> {
    for stream in listener.incoming() {
        let stream = stream?;
        let replica = replica.clone();
        thread::spawn(move || {
            if let Err(e) = handle_connection(replica, stream) {
                tracing::debug!(error = %e, "connection closed");
            }
        });
    }
    Ok(())
}

fn handle_connection(replica: Arc<Replica>, mut stream: TcpStream) -> io::Result<()> {
    loop {
        let payload = match read_frame(&mut stream) {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        let request: RpcRequest = rmp_serde::from_slice(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let response = dispatch(&replica, request);
        let out = rmp_serde::to_vec(&response).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_frame(&mut stream, &out)?;
    }
}

fn dispatch(replica: &Arc<Replica>, request: RpcRequest) -> RpcResponse {
    match request {
        RpcRequest::RequestVote(req) => RpcResponse::RequestVote(replica.request_vote(req)),
        RpcRequest::AppendEntries(req) => RpcResponse::AppendEntries(replica.append_entries(req)),
        RpcRequest::UpdateFile { name, version, blocks } => {
            RpcResponse::UpdateFile(replica.update_file(name, version, blocks).map_err(|e| e.to_string()))
        }
        RpcRequest::GetFileInfoMap => RpcResponse::GetFileInfoMap(replica.get_file_info_map().map_err(|e| e.to_string())),
        RpcRequest::IsLeader => RpcResponse::IsLeader(replica.is_leader()),
        RpcRequest::IsCrashed => RpcResponse::IsCrashed(replica.is_crashed()),
        RpcRequest::Crash => RpcResponse::Crash(replica.crash()),
        RpcRequest::Restore => RpcResponse::Restore(replica.restore()),
        RpcRequest::TesterGetVersion { name } => RpcResponse::TesterGetVersion(replica.tester_get_version(&name)),
        RpcRequest::PutBlock(data) => RpcResponse::PutBlock(replica.put_block(data)),
        RpcRequest::GetBlock(hash) => RpcResponse::GetBlock(replica.get_block(&hash)),
        RpcRequest::HasBlocks(hashes) => RpcResponse::HasBlocks(replica.has_blocks(&hashes)),
    }
}
