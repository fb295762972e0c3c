use std::net::TcpListener;
use std::process::exit;

use clap::Parser;
use surfstore_proto::config::ClusterConfig;
use surfstore_raft::Replica;

/// Hosts one replica of a SurfStore cluster.
#[derive(Parser, Debug)]
#[command(name = "surfstore-server", about = "SurfStore replica server")]
struct Args {
    /// Path to the cluster config file (`max N` / `host host:port` lines).
    config: String,

    /// This replica's 0-based position in the config file.
    server_num: u64,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = match ClusterConfig::read(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to read cluster config");
            exit(1);
        }
    };

    if args.server_num as usize >= config.len() {
        tracing::error!(server_num = args.server_num, cluster_size = config.len(), "server_num out of range");
        exit(1);
    }

    let peers = surfstore_rpc::tcp_peers(args.server_num, &config.hosts);
    let replica = Replica::new(args.server_num, config.len(), peers);

    let addr = &config.hosts[args.server_num as usize];
    tracing::info!(addr, server_num = args.server_num, cluster_size = config.len(), "starting SurfStore replica");
    let listener = match TcpListener::bind(addr) {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr, error = %e, "failed to bind listener");
            exit(1);
        }
    };

    replica.restore();
    tracing::info!("replica restored, accepting connections");

    if let Err(e) = surfstore_rpc::serve(replica, listener) {
        tracing::error!(error = %e, "server loop exited");
        exit(1);
    }
}
