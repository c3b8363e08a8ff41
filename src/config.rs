//! Environment-driven configuration.
//!
//! A `.env` file is honored when present. `RPC_URL` is the only required
//! variable for the tracker; everything else has a workable local-chain
//! default. Configuration problems are fatal at startup, before any worker
//! spawns.

use alloy::primitives::Address;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::decoder::DecodeStrategy;
use crate::error::ConfigError;
use crate::store::DEFAULT_MAX_LOG_LEN;

/// Which ingestion loops to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMode {
    /// Live log subscription only.
    Push,
    /// Hash-file polling only.
    Pull,
    /// Both loops, feeding the same store.
    Both,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    /// Signing key for the transfer generator. The tracker never reads it.
    pub deployer_key: Option<String>,
    pub event_mode: EventMode,
    pub decode_strategy: DecodeStrategy,
    pub poll_interval: Duration,
    pub reconcile_interval: Duration,
    pub txgen_interval: Duration,
    pub hash_log_path: PathBuf,
    pub contract_address_file: PathBuf,
    pub owner_address_file: PathBuf,
    pub snapshot_path: PathBuf,
    pub max_log_len: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_url = env::var("RPC_URL")
            .map_err(|_| ConfigError::MissingVariable("RPC_URL".to_string()))?;
        if !rpc_url.starts_with("http://")
            && !rpc_url.starts_with("https://")
            && !rpc_url.starts_with("ws://")
            && !rpc_url.starts_with("wss://")
        {
            return Err(ConfigError::InvalidValue(
                "RPC_URL must start with http(s):// or ws(s)://".to_string(),
            ));
        }

        let deployer_key = env::var("DEPLOYER_PRIVATE_KEY").ok();

        let event_mode = match env::var("EVENT_MODE")
            .unwrap_or_else(|_| "push".to_string())
            .to_lowercase()
            .as_str()
        {
            "push" => EventMode::Push,
            "pull" => EventMode::Pull,
            "both" => EventMode::Both,
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "EVENT_MODE must be push, pull or both, got {other:?}"
                )))
            }
        };

        let decode_strategy = match env::var("DECODE_STRATEGY")
            .unwrap_or_else(|_| "abi".to_string())
            .to_lowercase()
            .as_str()
        {
            "topics" => DecodeStrategy::Topics,
            "abi" => DecodeStrategy::Abi,
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "DECODE_STRATEGY must be topics or abi, got {other:?}"
                )))
            }
        };

        Ok(Self {
            rpc_url,
            deployer_key,
            event_mode,
            decode_strategy,
            poll_interval: duration_var("POLL_INTERVAL_SECS", 5)?,
            reconcile_interval: duration_var("RECONCILE_INTERVAL_SECS", 30)?,
            txgen_interval: duration_var("TXGEN_INTERVAL_SECS", 3)?,
            hash_log_path: path_var("HASH_LOG_PATH", "hash.txt"),
            contract_address_file: path_var("CONTRACT_ADDRESS_FILE", "contract_address.txt"),
            owner_address_file: path_var("OWNER_ADDRESS_FILE", "owner_address.txt"),
            snapshot_path: path_var("SNAPSHOT_PATH", "transfers.json"),
            max_log_len: usize_var("MAX_LOG_LEN", DEFAULT_MAX_LOG_LEN)?,
        })
    }

    /// Signing key, required for the generator binary.
    pub fn require_deployer_key(&self) -> Result<&str, ConfigError> {
        self.deployer_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingVariable("DEPLOYER_PRIVATE_KEY".to_string()))
    }
}

fn duration_var(name: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(Duration::from_secs(default_secs)),
        Ok(raw) => {
            let secs: u64 = raw.parse().map_err(|_| {
                ConfigError::InvalidValue(format!("{name} must be seconds, got {raw:?}"))
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue(format!("{name} must be nonzero")));
            }
            Ok(Duration::from_secs(secs))
        }
    }
}

fn usize_var(name: &str, default: usize) -> Result<usize, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| {
            ConfigError::InvalidValue(format!("{name} must be an integer, got {raw:?}"))
        }),
    }
}

fn path_var(name: &str, default: &str) -> PathBuf {
    env::var(name)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

/// Read a single hex address from a plaintext file, tolerating surrounding
/// whitespace. Used for `contract_address.txt` and `owner_address.txt`.
pub fn read_address_file(path: &std::path::Path) -> Result<Address, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::AddressFile {
        path: path.display().to_string(),
        source,
    })?;

    Address::from_str(raw.trim()).map_err(|e| {
        ConfigError::InvalidValue(format!(
            "{} does not hold a hex address: {e}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn address_file_tolerates_whitespace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contract_address.txt");
        std::fs::write(&path, "  0x5FbDB2315678afecb367f032d93F642f64180aa3\n").unwrap();

        let addr = read_address_file(&path).unwrap();
        assert_eq!(
            addr,
            Address::from_str("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap()
        );
    }

    #[test]
    fn missing_address_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = read_address_file(&dir.path().join("absent.txt")).unwrap_err();
        assert!(matches!(err, ConfigError::AddressFile { .. }));
    }

    #[test]
    fn garbage_address_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contract_address.txt");
        std::fs::write(&path, "not an address").unwrap();
        assert!(matches!(
            read_address_file(&path).unwrap_err(),
            ConfigError::InvalidValue(_)
        ));
    }
}
