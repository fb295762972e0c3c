use std::collections::HashMap;

use surfstore_proto::BlockHash;

/// Content-addressed byte store. Not replicated through consensus: every
/// replica maintains its own copy, updated via direct local calls from
/// the client that contacted it.
#[derive(Debug, Default)]
pub struct BlockStore {
    blocks: HashMap<BlockHash, Vec<u8>>,
}

impl BlockStore {
    pub fn new() -> Self {
        BlockStore::default()
    }

    /// Hashes and stores `data`. Panics if `data` is empty, matching
    /// `surfstore.py putblock`'s assertion that a block is at least one
    /// byte large.
    pub fn put_block(&mut self, data: Vec<u8>) -> BlockHash {
        assert!(!data.is_empty(), "block must be at least one byte large");
        let hash = BlockHash::of(&data);
        self.blocks.insert(hash, data);
        hash
    }

    pub fn get_block(&self, hash: &BlockHash) -> Option<Vec<u8>> {
        self.blocks.get(hash).cloned()
    }

    pub fn has_blocks(&self, hashes: &[BlockHash]) -> Vec<BlockHash> {
        hashes.iter().copied().filter(|h| self.blocks.contains_key(h)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let mut store = BlockStore::new();
        let hash = store.put_block(b"hello".to_vec());
        assert_eq!(store.get_block(&hash), Some(b"hello".to_vec()));
    }

    #[test]
    fn has_blocks_filters_to_present() {
        let mut store = BlockStore::new();
        let h1 = store.put_block(b"a".to_vec());
        let h2 = BlockHash::of(b"not-stored");
        assert_eq!(store.has_blocks(&[h1, h2]), vec![h1]);
    }

    #[test]
    #[should_panic]
    fn rejects_empty_block() {
        let mut store = BlockStore::new();
        store.put_block(vec![]);
    }
}
