use std::{ops::Deref, sync::Arc};

use poise::serenity_prelude::Http;

use crate::config::BotConfig;
use crate::lockdown::{Directory, LockdownManager, SerenityDirectory, Store, YamlStore};

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("lockdowns", &"LockdownManager")
            .finish()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Build bot data around any directory and store
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>, store: Arc<dyn Store>) -> Self {
        Self(Arc::new(DataInner {
            lockdowns: LockdownManager::new(directory, store),
        }))
    }

    /// Data backed by the Discord API and the YAML state file from `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the existing state file cannot be read or parsed.
    pub async fn load(
        config: &BotConfig,
        http: Arc<Http>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let store = YamlStore::open(config.state_file()).await?;
        Ok(Self::new(
            Arc::new(SerenityDirectory::new(http)),
            Arc::new(store),
        ))
    }
}

/// Shared state behind `Data`
pub struct DataInner {
    /// Lockdown profiles and transitions for every guild
    pub lockdowns: LockdownManager,
}
