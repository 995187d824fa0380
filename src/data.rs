use std::{ops::Deref, sync::Arc};

use crate::brig::{BrigService, SweepRequest};
use crate::config::BotConfig;
use serenity::prelude::TypeMapKey;
use tokio::sync::mpsc::Sender;
use tracing::warn;

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

// Lets gateway event handlers reach the bot data through serenity's data map
impl TypeMapKey for Data {
    type Value = Data;
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &self.config)
            .field("brig_entries", &self.brig.store.len())
            .field("sweeper", &self.sweeper)
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
    /// Create a new Data instance
    #[must_use]
    pub fn new(config: BotConfig, brig: BrigService, sweeper: Sender<SweepRequest>) -> Self {
        Self(Arc::new(DataInner {
            config,
            brig,
            sweeper,
        }))
    }

    /// Ask the sweep task to run right away
    pub async fn request_sweep(&self) {
        self.send_to_sweeper(SweepRequest::SweepNow).await;
    }

    /// Stop the sweep task
    pub async fn stop_sweeper(&self) {
        self.send_to_sweeper(SweepRequest::Shutdown).await;
    }

    async fn send_to_sweeper(&self, request: SweepRequest) {
        if let Err(e) = self.sweeper.send(request).await {
            warn!("Failed to send {request} request to the sweep task: {e}");
        }
    }
}

/// Shared state handed to every command
pub struct DataInner {
    pub config: BotConfig,
    pub brig: BrigService,
    // Control channel of the sweep task
    sweeper: Sender<SweepRequest>,
}
