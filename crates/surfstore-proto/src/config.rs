//! The `max N` / `host host:port` cluster config file format.

use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Malformed(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config: {}", e),
            ConfigError::Malformed(s) => write!(f, "malformed config: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub hosts: Vec<String>,
}

impl ClusterConfig {
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut lines = text.lines();

        let header = lines
            .next()
            .ok_or_else(|| ConfigError::Malformed("empty config".into()))?;
        let max_n: usize = header
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| ConfigError::Malformed("missing `max N` header".into()))?
            .parse()
            .map_err(|_| ConfigError::Malformed("`max N` value is not an integer".into()))?;

        let mut hosts = Vec::with_capacity(max_n);
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let hostport = line
                .split_whitespace()
                .nth(1)
                .ok_or_else(|| ConfigError::Malformed(format!("malformed host line: {}", line)))?;
            hosts.push(hostport.to_string());
        }

        if hosts.len() != max_n {
            return Err(ConfigError::Malformed(format!(
                "declared max {} but found {} host lines",
                max_n,
                hosts.len()
            )));
        }

        Ok(ClusterConfig { hosts })
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_config() {
        let text = "max 3\nhost 127.0.0.1:8000\nhost 127.0.0.1:8001\nhost 127.0.0.1:8002\n";
        let cfg = ClusterConfig::parse(text).unwrap();
        assert_eq!(cfg.hosts, vec!["127.0.0.1:8000", "127.0.0.1:8001", "127.0.0.1:8002"]);
    }

    #[test]
    fn rejects_count_mismatch() {
        let text = "max 3\nhost 127.0.0.1:8000\n";
        assert!(ClusterConfig::parse(text).is_err());
    }
}
