//! The consensus core: a thread-per-role Raft-like engine that replicates
//! a `FileInfoStore` across a fixed-membership cluster, plus the local,
//! non-replicated `BlockStore` each replica also hosts.

mod errors;
mod log;
mod replica;
mod role;
mod transport;

pub use errors::RaftError;
pub use replica::Replica;
pub use transport::PeerTransport;
