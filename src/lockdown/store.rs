//! Guild state store
//!
//! Durable home for each guild's `GuildLockdownState`. Reads fall back to the
//! default record when a guild has never been seen.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use poise::serenity_prelude::GuildId;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{GuildLockdownState, StoreResult};

/// Key-value store holding one lockdown record per guild
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Fetch the record for a guild, or the defaults if none was saved
    async fn load(&self, guild_id: GuildId) -> StoreResult<GuildLockdownState>;

    /// Replace the record for a guild
    async fn save(&self, guild_id: GuildId, state: &GuildLockdownState) -> StoreResult<()>;
}

/// Store that keeps records in memory only
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<GuildId, GuildLockdownState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn load(&self, guild_id: GuildId) -> StoreResult<GuildLockdownState> {
        Ok(self
            .records
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn save(&self, guild_id: GuildId, state: &GuildLockdownState) -> StoreResult<()> {
        self.records.insert(guild_id, state.clone());
        Ok(())
    }
}

/// Store that mirrors every record into a single YAML file
///
/// The whole file is rewritten on each save, through a sibling temp file that
/// is renamed over the original. Saves are serialized, and the in-memory copy
/// only changes once the file on disk does.
#[derive(Clone)]
pub struct YamlStore {
    path: PathBuf,
    records: Arc<DashMap<GuildId, GuildLockdownState>>,
    write_lock: Arc<Mutex<()>>,
}

impl YamlStore {
    /// Open the store at `path`, loading any records already on disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let records = DashMap::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let saved: BTreeMap<u64, GuildLockdownState> = serde_yaml::from_str(&content)?;
                for (guild_id, state) in saved {
                    records.insert(GuildId::new(guild_id), state);
                }
                info!("Loaded lockdown state for {} guild(s)", records.len());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No lockdown state at {}, starting fresh", path.display());
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            path,
            records: Arc::new(records),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Every cached record, with `guild_id` replaced by `state`
    fn snapshot_with(
        &self,
        guild_id: GuildId,
        state: &GuildLockdownState,
    ) -> BTreeMap<u64, GuildLockdownState> {
        let mut snapshot: BTreeMap<u64, GuildLockdownState> = self
            .records
            .iter()
            .map(|entry| (entry.key().get(), entry.value().clone()))
            .collect();
        snapshot.insert(guild_id.get(), state.clone());
        snapshot
    }

    async fn write_snapshot(
        &self,
        snapshot: &BTreeMap<u64, GuildLockdownState>,
    ) -> StoreResult<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let yaml = serde_yaml::to_string(snapshot)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, yaml).await?;
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&temp).await {
                warn!("Failed to remove {}: {cleanup}", temp.display());
            }
            return Err(e.into());
        }

        debug!("Wrote lockdown state to {}", self.path.display());
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for YamlStore {
    async fn load(&self, guild_id: GuildId) -> StoreResult<GuildLockdownState> {
        Ok(self
            .records
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn save(&self, guild_id: GuildId, state: &GuildLockdownState) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.snapshot_with(guild_id, state);
        self.write_snapshot(&snapshot).await?;
        self.records.insert(guild_id, state.clone());
        Ok(())
    }
}
