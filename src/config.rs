//! Configuration for chain-ledger

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chain-ledger")
}

/// Who receives the indivisible remainder of a reward split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// The request creator absorbs the remainder
    Creator,
    /// The earliest non-creator joiner absorbs the remainder (creator if nobody joined)
    EarliestJoiner,
}

impl Default for RemainderPolicy {
    fn default() -> Self {
        RemainderPolicy::Creator
    }
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding ledger.db and config.toml
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Maximum pooled SQLite connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a writer waits for the SQLite write lock
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Credits a user earns for joining a chain
    #[serde(default = "default_join_chain_credits")]
    pub join_chain_credits: i64,

    /// Credits a chain creator earns when someone else joins
    #[serde(default = "default_others_joined_credits")]
    pub others_joined_credits: i64,

    /// Reward split remainder handling
    #[serde(default)]
    pub remainder_policy: RemainderPolicy,

    /// Upper bound on `limit` for transaction listings
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,

    /// HS256 secret for bearer tokens (required unless dev_mode)
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Token lifetime for tokens issued by this service
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_seconds: u64,

    /// Accept tokens signed with the built-in development secret
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_http_port() -> u16 {
    8095
}

fn default_pool_size() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_join_chain_credits() -> i64 {
    2
}

fn default_others_joined_credits() -> i64 {
    3
}

fn default_max_page_size() -> i64 {
    100
}

fn default_jwt_expiry() -> u64 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            join_chain_credits: default_join_chain_credits(),
            others_joined_credits: default_others_joined_credits(),
            remainder_policy: RemainderPolicy::default(),
            max_page_size: default_max_page_size(),
            jwt_secret: None,
            jwt_expiry_seconds: default_jwt_expiry(),
            dev_mode: false,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get ledger database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join("ledger.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    /// Reject award amounts the ledger would refuse anyway
    pub fn validate(&self) -> Result<(), crate::error::LedgerError> {
        if self.join_chain_credits <= 0 || self.others_joined_credits <= 0 {
            return Err(crate::error::LedgerError::Config(
                "join_chain_credits and others_joined_credits must be positive".into(),
            ));
        }
        if self.max_page_size <= 0 {
            return Err(crate::error::LedgerError::Config(
                "max_page_size must be positive".into(),
            ));
        }
        if self.pool_size == 0 {
            return Err(crate::error::LedgerError::Config("pool_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_awards() {
        let config = Config::default();
        assert_eq!(config.join_chain_credits, 2);
        assert_eq!(config.others_joined_credits, 3);
        assert_eq!(config.remainder_policy, RemainderPolicy::Creator);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            http_port = 9000
            remainder_policy = "earliest_joiner"
            "#,
        )
        .unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.remainder_policy, RemainderPolicy::EarliestJoiner);
        assert_eq!(config.join_chain_credits, 2);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage_dir = dir.path().to_path_buf();
        config.others_joined_credits = 5;
        config.save(config.config_path()).unwrap();

        let loaded = Config::load(config.config_path()).unwrap();
        assert_eq!(loaded.others_joined_credits, 5);
        assert_eq!(loaded.database_path(), dir.path().join("ledger.db"));
    }

    #[test]
    fn test_rejects_non_positive_awards() {
        let config = Config {
            join_chain_credits: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
