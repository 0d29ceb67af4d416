use std::{ops::Deref, sync::Arc};

use crate::banner::{ModerationController, Platform};
use crate::config::BotConfig;
use crate::store::GuildStore;
use poise::serenity_prelude::prelude::TypeMapKey;

/// Centralized data structure for the bot
#[derive(Clone, Debug)]
pub struct Data(pub Arc<DataInner>);

// Implement TypeMapKey for Data to allow storing it in Serenity's data map
impl TypeMapKey for Data {
    type Value = Data;
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Inner data shared by commands and event handlers
#[derive(Debug)]
pub struct DataInner {
    pub controller: ModerationController,
    /// Prefix for text commands, also shown in the greeting
    pub prefix: String,
}

impl Data {
    #[must_use]
    pub fn new(controller: ModerationController, prefix: impl Into<String>) -> Self {
        Self(Arc::new(DataInner {
            controller,
            prefix: prefix.into(),
        }))
    }

    /// Load every stored guild config and wrap the controller.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn load(
        config: &BotConfig,
        store: Arc<dyn GuildStore>,
        platform: Arc<dyn Platform>,
    ) -> Result<Self, crate::Error> {
        let controller = ModerationController::load(store, platform).await?;
        Ok(Self::new(controller, config.prefix.clone()))
    }

    #[must_use]
    pub fn controller(&self) -> &ModerationController {
        &self.0.controller
    }

    /// Flush and release the store
    ///
    /// # Errors
    /// Returns an error if the store fails to close.
    pub async fn close(&self) -> Result<(), crate::Error> {
        self.0.controller.store().close().await?;
        Ok(())
    }
}
