use surfstore_proto::{AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse};

/// A replica's view of one peer. Implementations own whatever connection
/// state they need (an `Arc<Replica>` for an in-process cluster, a socket
/// for a real deployment) and are responsible for applying their own
/// per-call timeout.
///
/// `None` means the call could not be completed at all (timeout, refused
/// connection, I/O error) and must be treated the same as "ignore this
/// peer for this round". A peer that answered but reports itself crashed
/// or busy still returns `Some` with `term == -1`.
pub trait PeerTransport: Send + Sync {
    fn request_vote(&self, req: RequestVoteRequest) -> Option<RequestVoteResponse>;
    fn append_entries(&self, req: AppendEntriesRequest) -> Option<AppendEntriesResponse>;
}
