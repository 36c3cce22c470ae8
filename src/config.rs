//! Configuration for profbin

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("profbin")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database path
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Port for the secure listener
    #[serde(default = "default_secure_port")]
    pub secure_port: u16,

    /// Port for the plain listener
    #[serde(default = "default_plain_port")]
    pub plain_port: u16,

    /// Public domain used in URLs echoed back to uploaders
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Default number of entries on the recent listing
    #[serde(default = "default_recent_limit")]
    pub recent_limit: u32,
}

fn default_db_path() -> PathBuf {
    default_data_dir().join("profiles.db")
}

fn default_secure_port() -> u16 {
    443
}

fn default_plain_port() -> u16 {
    80
}

fn default_domain() -> String {
    "localhost".to_string()
}

fn default_max_upload_bytes() -> usize {
    1 << 20
}

fn default_recent_limit() -> u32 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            secure_port: default_secure_port(),
            plain_port: default_plain_port(),
            domain: default_domain(),
            max_upload_bytes: default_max_upload_bytes(),
            recent_limit: default_recent_limit(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.as_ref().display(), e)))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.secure_port, 443);
        assert_eq!(config.plain_port, 80);
        assert_eq!(config.max_upload_bytes, 1 << 20);
        assert_eq!(config.recent_limit, 30);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: Config = toml::from_str("plain_port = 8080\ndomain = \"example.org\"").unwrap();
        assert_eq!(config.plain_port, 8080);
        assert_eq!(config.domain, "example.org");
        assert_eq!(config.secure_port, 443);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.secure_port = 8443;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.secure_port, 8443);
        assert_eq!(loaded.domain, config.domain);
    }
}
