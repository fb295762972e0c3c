//! The two deterministic, local side-stores a replica hosts: the
//! replicated `FileInfoStore` (applied only via committed log entries)
//! and the non-replicated `BlockStore`.

mod block;
mod file_info;

pub use block::BlockStore;
pub use file_info::FileInfoStore;
