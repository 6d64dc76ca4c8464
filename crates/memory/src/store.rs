//! Memory persistence: the [`MemoryStore`] contract plus the in-memory and
//! file-backed implementations.
//!
//! The file store keeps one JSON document per (game, power) and replaces it
//! atomically: write to a `.tmp` sibling, fsync, rename. A crash at any
//! point leaves either the old record or the new one, never a torn file.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use backchannel_game::Power;

use crate::schema::AgentMemory;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("record power mismatch: loaded under {expected} but record is for {found}")]
    PowerMismatch { expected: Power, found: Power },
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn load(&self, power: Power, game_id: &str) -> Result<Option<AgentMemory>, StoreError>;
    /// Durable write; replaces any prior record for the same key.
    async fn save(&self, memory: &AgentMemory) -> Result<(), StoreError>;
    async fn has(&self, power: Power, game_id: &str) -> Result<bool, StoreError>;
    async fn delete(&self, power: Power, game_id: &str) -> Result<bool, StoreError>;
}

fn check_power(expected: Power, record: AgentMemory) -> Result<AgentMemory, StoreError> {
    if record.power != expected {
        return Err(StoreError::PowerMismatch { expected, found: record.power });
    }
    Ok(record)
}

// ── In-memory backend ────────────────────────────────────────────────────────

/// Backend for tests and ephemeral games. Records round-trip through JSON so
/// the serialization contract is exercised on every save/load.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<(Power, String), String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn load(&self, power: Power, game_id: &str) -> Result<Option<AgentMemory>, StoreError> {
        let records = self.records.read().await;
        match records.get(&(power, game_id.to_string())) {
            Some(json) => {
                let record: AgentMemory = serde_json::from_str(json)?;
                Ok(Some(check_power(power, record)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, memory: &AgentMemory) -> Result<(), StoreError> {
        let json = serde_json::to_string(memory)?;
        self.records
            .write()
            .await
            .insert((memory.power, memory.game_id.clone()), json);
        Ok(())
    }

    async fn has(&self, power: Power, game_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .contains_key(&(power, game_id.to_string())))
    }

    async fn delete(&self, power: Power, game_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .records
            .write()
            .await
            .remove(&(power, game_id.to_string()))
            .is_some())
    }
}

// ── File backend ─────────────────────────────────────────────────────────────

/// One JSON file per record: `<root>/<game_id>/<POWER>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, power: Power, game_id: &str) -> PathBuf {
        self.root.join(game_id).join(format!("{power}.json"))
    }
}

#[async_trait]
impl MemoryStore for FileStore {
    async fn load(&self, power: Power, game_id: &str) -> Result<Option<AgentMemory>, StoreError> {
        let path = self.record_path(power, game_id);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record: AgentMemory = serde_json::from_str(&json)?;
        debug!(path = %path.display(), "memory loaded");
        Ok(Some(check_power(power, record)?))
    }

    async fn save(&self, memory: &AgentMemory) -> Result<(), StoreError> {
        let path = self.record_path(memory.power, &memory.game_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(memory)?;

        let write_result: Result<(), StoreError> = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .await?;
            file.write_all(&json).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(err) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        if let Err(err) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        info!(power = %memory.power, game = %memory.game_id, "memory saved");
        Ok(())
    }

    async fn has(&self, power: Power, game_id: &str) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.record_path(power, game_id)).await?)
    }

    async fn delete(&self, power: Power, game_id: &str) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(self.record_path(power, game_id)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
