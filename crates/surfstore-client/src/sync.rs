//! The client-side three-way sync: compare the local index, a fresh scan
//! of the base directory, and the server's file info map, and apply
//! exactly one transition per file.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::PathBuf;

use surfstore_proto::{BlockHash, FileInfo};
use surfstore_rpc::{ClientError, SurfstoreRpcClient};

use crate::index;

pub struct SyncClient {
    server: SurfstoreRpcClient,
    base_dir: PathBuf,
    block_size: usize,
}

impl SyncClient {
    pub fn new(hostport: &str, base_dir: impl Into<PathBuf>, block_size: usize) -> io::Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(SyncClient { server: SurfstoreRpcClient::new(hostport), base_dir, block_size })
    }

    /// Scans every regular, non-empty file in `base_dir` other than
    /// `index.txt`, chunking it into `block_size`-byte blocks. Returns the
    /// resulting file info (with a placeholder version of 0) alongside the
    /// raw block bytes, which `upload` needs to fill in any blocks the
    /// server doesn't already have.
    fn scan_base(&self) -> io::Result<HashMap<String, (FileInfo, Vec<Vec<u8>>)>> {
        let mut result = HashMap::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "index.txt" {
                continue;
            }
            let path = entry.path();
            let metadata = entry.metadata()?;
            if !metadata.is_file() || metadata.len() == 0 {
                continue;
            }

            let bytes = fs::read(&path)?;
            let mut blocks = Vec::new();
            let mut hashes = Vec::new();
            for chunk in bytes.chunks(self.block_size) {
                hashes.push(BlockHash::of(chunk));
                blocks.push(chunk.to_vec());
            }
            result.insert(name, (FileInfo { version: 0, blocks: hashes }, blocks));
        }
        Ok(result)
    }

    fn delete_remote(&self, name: &str, version: u64) -> Result<bool, ClientError> {
        self.server.update_file(name, version, Vec::new())
    }

    fn upload(&self, name: &str, info: &FileInfo, raw_blocks: &[Vec<u8>]) -> Result<bool, ClientError> {
        let present: HashSet<BlockHash> = self.server.has_blocks(info.blocks.clone())?.into_iter().collect();
        for (hash, data) in info.blocks.iter().zip(raw_blocks.iter()) {
            if !present.contains(hash) {
                self.server.put_block(data.clone())?;
            }
        }
        self.server.update_file(name, info.version, info.blocks.clone())
    }

    fn download(&self, name: &str, remote: &FileInfo) -> Result<(), ClientError> {
        if remote.blocks.is_empty() {
            return Ok(());
        }
        let mut bytes = Vec::new();
        for hash in &remote.blocks {
            if let Some(block) = self.server.get_block(*hash)? {
                bytes.extend(block);
            }
        }
        fs::write(self.base_dir.join(name), bytes).map_err(ClientError::Io)
    }

    /// One sync pass. Assumes the server and the base directory do not
    /// change concurrently with the run.
    pub fn run(&self) -> Result<(), ClientError> {
        let base_infos = self.scan_base().map_err(ClientError::Io)?;
        let index_infos = index::read(&self.base_dir).map_err(ClientError::Io)?;
        let remote_infos = self.server.get_file_info_map()?;

        let empty = FileInfo { version: 0, blocks: Vec::new() };
        let mut all_files: HashSet<&String> = HashSet::new();
        all_files.extend(base_infos.keys());
        all_files.extend(index_infos.keys());
        all_files.extend(remote_infos.keys());

        let mut local_infos = HashMap::new();

        for name in all_files {
            let index_info = index_infos.get(name).unwrap_or(&empty);
            let (base_info, raw_blocks) = base_infos.get(name).map(|(i, b)| (i, b.as_slice())).unwrap_or((&empty, &[]));
            let remote_info = remote_infos.get(name).unwrap_or(&empty);

            if remote_info == index_info && !index_info.blocks.is_empty() && base_info.blocks.is_empty() {
                // Present locally in the index and on the server, gone from the base dir: delete.
                let new_version = index_info.version + 1;
                self.delete_remote(name, new_version)?;
                local_infos.insert(name.clone(), FileInfo { version: new_version, blocks: Vec::new() });
            } else if remote_info == index_info && base_info.blocks != index_info.blocks {
                // Base dir has newer content than the index: upload.
                let new_info = FileInfo { version: index_info.version + 1, blocks: base_info.blocks.clone() };
                if !self.upload(name, &new_info, raw_blocks)? {
                    return Err(ClientError::Server(format!("server rejected upload of {name}")));
                }
                local_infos.insert(name.clone(), new_info);
            } else if remote_info != index_info {
                if remote_info.blocks.is_empty() && !base_info.blocks.is_empty() {
                    // Server deleted the file and we still have a local copy: remove it.
                    let _ = fs::remove_file(self.base_dir.join(name));
                } else {
                    self.download(name, remote_info)?;
                }
                local_infos.insert(name.clone(), remote_info.clone());
            } else {
                local_infos.insert(name.clone(), index_info.clone());
            }
        }

        index::write(&self.base_dir, &local_infos).map_err(ClientError::Io)
    }
}
