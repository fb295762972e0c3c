use thiserror::Error;

/// Errors a client-facing `Replica` method can return. `Busy` and
/// `PeerUnreachable` never appear here: they are transport-level outcomes
/// handled silently inside the election/replication loops, not surfaced to
/// callers of `update_file`/`get_file_info_map`.
#[derive(Debug, Error)]
pub enum RaftError {
    #[error("this replica is not the current leader")]
    NotLeader,
}
