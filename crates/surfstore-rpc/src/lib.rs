//! Concrete `PeerTransport` implementations and the client-facing wire
//! protocol: an in-process transport for same-process clusters, and a
//! TCP transport (peer-to-peer and client-to-server) for real
//! multi-process deployment.

mod client;
mod framing;
mod in_process;
mod tcp;

pub use client::{ClientError, SurfstoreRpcClient};
pub use in_process::build_in_process_cluster;
pub use tcp::{serve, tcp_peers, TcpPeerTransport};
