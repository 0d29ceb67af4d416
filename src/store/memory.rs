//! Process-memory store
//!
//! Nothing survives a restart; useful for tests and throwaway deployments.

use crate::banner::GuildConfig;
use crate::store::{GuildStore, StoreResult};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Store that keeps configs in a map
#[derive(Debug, Default)]
pub struct MemoryStore {
    guilds: Mutex<HashMap<u64, GuildConfig>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl GuildStore for MemoryStore {
    async fn load(&self) -> StoreResult<HashMap<u64, GuildConfig>> {
        Ok(self.guilds.lock().await.clone())
    }

    async fn save(&self, config: &GuildConfig) -> StoreResult<()> {
        self.guilds
            .lock()
            .await
            .insert(config.guild_id, config.clone());
        Ok(())
    }

    async fn delete(&self, guild_id: u64) -> StoreResult<()> {
        self.guilds.lock().await.remove(&guild_id);
        Ok(())
    }
}
