mod index;
mod sync;

pub use sync::SyncClient;
