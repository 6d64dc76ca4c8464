//! The manager facade over a [`MemoryStore`].
//!
//! A read-through / write-through cache keyed by (power, game). `get_memory`
//! hands out the shared `Arc<RwLock<_>>` instance, so every holder sees
//! in-process mutations; the store is the single source of truth across
//! restarts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use backchannel_game::Power;

use crate::schema::AgentMemory;
use crate::store::{MemoryStore, StoreError};

pub type SharedMemory = Arc<RwLock<AgentMemory>>;

pub struct MemoryManager {
    store: Arc<dyn MemoryStore>,
    cache: RwLock<HashMap<(Power, String), SharedMemory>>,
}

impl MemoryManager {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store, cache: RwLock::new(HashMap::new()) }
    }

    /// The cached instance for (power, game), loading from the store on a
    /// miss and initializing a fresh record when the store has none.
    pub async fn get_memory(&self, power: Power, game_id: &str) -> Result<SharedMemory, StoreError> {
        let key = (power, game_id.to_string());
        if let Some(shared) = self.cache.read().await.get(&key) {
            return Ok(shared.clone());
        }

        let mut cache = self.cache.write().await;
        // Re-check under the write lock: another task may have loaded it.
        if let Some(shared) = cache.get(&key) {
            return Ok(shared.clone());
        }

        let memory = match self.store.load(power, game_id).await? {
            Some(memory) => {
                debug!(%power, game_id, "memory loaded from store");
                memory
            }
            None => {
                info!(%power, game_id, "initializing fresh memory");
                AgentMemory::new(power, game_id)
            }
        };
        let shared = Arc::new(RwLock::new(memory));
        cache.insert(key, shared.clone());
        Ok(shared)
    }

    /// Write the cached snapshot for (power, game) through to the store.
    pub async fn persist(&self, power: Power, game_id: &str) -> Result<(), StoreError> {
        let shared = {
            let cache = self.cache.read().await;
            cache.get(&(power, game_id.to_string())).cloned()
        };
        if let Some(shared) = shared {
            let snapshot = shared.read().await.clone();
            self.store.save(&snapshot).await?;
        }
        Ok(())
    }

    /// Persist every cached memory.
    pub async fn persist_all(&self) -> Result<(), StoreError> {
        let entries: Vec<SharedMemory> = self.cache.read().await.values().cloned().collect();
        for shared in entries {
            let snapshot = shared.read().await.clone();
            self.store.save(&snapshot).await?;
        }
        Ok(())
    }

    /// Drop the cache; the next `get_memory` reloads from the store.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }
}
