use crate::decoder::TransferEvent;
use crate::store::AggregationStore;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, sync::Arc, time::Duration};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

/// Persistence configuration
pub struct PersistenceConfig {
    pub file_path: std::path::PathBuf,
    pub autosave_interval: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            file_path: "transfers.json".into(),
            autosave_interval: Duration::from_secs(60),
        }
    }
}

/// Snapshot of the observed transfer log for persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSnapshot {
    pub transfers: Vec<TransferEvent>,
    pub saved_at: i64,
}

/// Save the transfer log to a JSON file
pub fn save_snapshot(transfers: &[TransferEvent], file_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = LogSnapshot {
        transfers: transfers.to_vec(),
        saved_at: chrono::Utc::now().timestamp(),
    };

    let json = serde_json::to_string_pretty(&snapshot)?;
    fs::write(file_path, json)?;

    log::debug!("Saved {} transfers to {}", transfers.len(), file_path.display());
    Ok(())
}

/// Load a previously saved transfer log, if any
pub fn load_snapshot(file_path: &Path) -> Result<Vec<TransferEvent>, Box<dyn std::error::Error>> {
    if !file_path.exists() {
        log::info!("No existing snapshot file found: {}", file_path.display());
        return Ok(Vec::new());
    }

    let json = fs::read_to_string(file_path)?;
    let snapshot: LogSnapshot = serde_json::from_str(&json)?;

    log::info!(
        "Loaded {} transfers from {}",
        snapshot.transfers.len(),
        file_path.display()
    );
    Ok(snapshot.transfers)
}

/// Background task that periodically saves the transfer log, with a final
/// save on cancellation
pub async fn persistence_task(
    store: Arc<AggregationStore>,
    config: PersistenceConfig,
    cancel: CancellationToken,
) {
    let mut interval_timer = interval(config.autosave_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = save_snapshot(&store.log_snapshot(), &config.file_path) {
                    log::warn!("Failed final snapshot save: {}", e);
                }
                log::info!("Persistence task stopped");
                return;
            }
            _ = interval_timer.tick() => {
                if let Err(e) = save_snapshot(&store.log_snapshot(), &config.file_path) {
                    log::warn!("Failed to save snapshot: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256, U256};
    use tempfile::tempdir;

    fn event(amount: u64, seq: u64) -> TransferEvent {
        TransferEvent {
            from: Address::repeat_byte(0xAA),
            to: Address::repeat_byte(1),
            amount: U256::from(amount),
            tx_hash: B256::repeat_byte(seq as u8),
            seq,
            observed_at: 1_700_000_000,
        }
    }

    #[test]
    fn snapshot_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("transfers.json");

        let transfers = vec![event(10, 0), event(20, 1)];
        save_snapshot(&transfers, &path).unwrap();

        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded, transfers);
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let dir = tempdir().unwrap();
        let loaded = load_snapshot(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_empty());
    }
}
