//! The `index.txt` local-state file: one `name version hashHex*` line per
//! tracked file, `0` standing in for "no blocks".

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use surfstore_proto::{BlockHash, FileInfo};

pub fn read(base_dir: &Path) -> io::Result<HashMap<String, FileInfo>> {
    let path = base_dir.join("index.txt");
    if !path.exists() {
        fs::write(&path, b"")?;
        return Ok(HashMap::new());
    }

    let text = fs::read_to_string(&path)?;
    let mut index = HashMap::new();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        let name = match parts.next() {
            Some(n) => n.to_string(),
            None => continue,
        };
        let version: u64 = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        let tokens: Vec<&str> = parts.collect();
        let blocks = if tokens == ["0"] {
            Vec::new()
        } else {
            tokens.iter().filter_map(|h| BlockHash::from_hex(h)).collect()
        };
        index.insert(name, FileInfo { version, blocks });
    }
    Ok(index)
}

pub fn write(base_dir: &Path, entries: &HashMap<String, FileInfo>) -> io::Result<()> {
    let mut names: Vec<&String> = entries.keys().collect();
    names.sort();

    let mut out = String::new();
    for name in names {
        let info = &entries[name];
        let hashes = if info.blocks.is_empty() {
            "0".to_string()
        } else {
            info.blocks.iter().map(|h| h.to_hex()).collect::<Vec<_>>().join(" ")
        };
        out.push_str(&format!("{} {} {}\n", name, info.version, hashes));
    }
    fs::write(base_dir.join("index.txt"), out)
}
