use std::process::exit;

use clap::Parser;
use surfstore_client::SyncClient;

/// Syncs a local directory against a SurfStore cluster.
#[derive(Parser, Debug)]
#[command(name = "surfstore-client", about = "SurfStore client")]
struct Args {
    /// host:port of the server to contact (any replica; it need not be leader).
    hostport: String,

    /// The base directory to sync.
    basedir: String,

    /// Block size, in bytes, used to chunk file contents.
    blocksize: usize,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    tracing::info!(?args, "starting sync");

    let client = match SyncClient::new(&args.hostport, &args.basedir, args.blocksize) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize client");
            exit(1);
        }
    };

    if let Err(e) = client.run() {
        tracing::error!(error = %e, "sync failed");
        exit(1);
    }
}
