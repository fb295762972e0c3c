use std::collections::HashMap;

use surfstore_proto::FileInfo;

/// Deterministic state machine mapping filename to (version, blockHashList).
/// Mutated only by applying a committed log entry, or read directly by
/// `GetFileInfoMap`/`testerGetVersion` on the leader.
#[derive(Debug, Default)]
pub struct FileInfoStore {
    files: HashMap<String, FileInfo>,
}

impl FileInfoStore {
    pub fn new() -> Self {
        FileInfoStore::default()
    }

    pub fn get_file_info_map(&self) -> HashMap<String, FileInfo> {
        self.files.clone()
    }

    pub fn get_version(&self, name: &str) -> Option<u64> {
        self.files.get(name).map(|info| info.version)
    }

    /// Applies an update, enforcing version monotonicity.
    ///
    /// Returns `false` (a no-op, not an error) if `name` already exists and
    /// `version` is not exactly one more than the current version. Panics
    /// if `name` is new and `version != 1`: this is a programming error by
    /// the caller, which the leader must have prevented before ever
    /// appending the entry to its log.
    pub fn update_file(&mut self, name: &str, version: u64, blocks: Vec<surfstore_proto::BlockHash>) -> bool {
        match self.files.get(name) {
            Some(current) => {
                if version != current.version + 1 {
                    tracing::debug!(name, version, current_version = current.version, "rejected out-of-order version");
                    return false;
                }
            }
            None => {
                assert_eq!(version, 1, "version of file creation must be 1, got {} for {:?}", version, name);
            }
        }

        let tombstone = blocks.is_empty();
        self.files.insert(name.to_string(), FileInfo { version, blocks });
        tracing::debug!(name, version, tombstone, "applied file update");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surfstore_proto::BlockHash;

    fn hash(byte: u8) -> BlockHash {
        BlockHash::of(&[byte])
    }

    #[test]
    fn creates_file_at_version_one() {
        let mut store = FileInfoStore::new();
        assert!(store.update_file("a.bin", 1, vec![hash(1)]));
        assert_eq!(store.get_version("a.bin"), Some(1));
    }

    #[test]
    fn rejects_non_sequential_version() {
        let mut store = FileInfoStore::new();
        assert!(store.update_file("a.bin", 1, vec![hash(1)]));
        assert!(!store.update_file("a.bin", 3, vec![hash(2)]));
        assert_eq!(store.get_version("a.bin"), Some(1));
        assert!(store.update_file("a.bin", 2, vec![hash(2)]));
        assert_eq!(store.get_version("a.bin"), Some(2));
    }

    #[test]
    #[should_panic]
    fn panics_on_non_one_creation_version() {
        let mut store = FileInfoStore::new();
        store.update_file("a.bin", 2, vec![hash(1)]);
    }

    #[test]
    fn tombstone_then_resurrection() {
        let mut store = FileInfoStore::new();
        assert!(store.update_file("a.bin", 1, vec![hash(1)]));
        assert!(store.update_file("a.bin", 2, vec![]));
        assert!(store.get_file_info_map()["a.bin"].is_tombstone());
        assert!(store.update_file("a.bin", 3, vec![hash(2)]));
        assert!(!store.get_file_info_map()["a.bin"].is_tombstone());
    }
}
