use crate::{Data, EVENT_TARGET};
use poise::serenity_prelude::{self as serenity, ActivityData, Context, EventHandler, GuildId, Ready};
use tracing::{debug, info, warn};

pub struct Handler {
    /// Game shown in the bot's presence
    activity: String,
}

impl Handler {
    #[must_use]
    pub fn new(activity: impl Into<String>) -> Self {
        Self {
            activity: activity.into(),
        }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.tag();
        let user_id = ready.user.id;
        let shard_id = ctx.shard_id;
        info!(target: EVENT_TARGET, "Connected as {user_name} ({user_id}), shard {shard_id}");

        ctx.set_activity(Some(ActivityData::playing(self.activity.clone())));
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                target: EVENT_TARGET,
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!(target: EVENT_TARGET, "Cache ready! The bot is in {guild_count} guild(s)");

        // Release anyone whose sentence ran out while the bot was offline
        let data = ctx.data.read().await.get::<Data>().cloned();
        match data {
            Some(data) => data.request_sweep().await,
            None => debug!(target: EVENT_TARGET, "Bot data not registered yet, skipping catch-up sweep"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_creation() {
        let handler = Handler::new("bowling :)");
        assert_eq!(handler.activity, "bowling :)");
    }

    #[test]
    fn test_handler_implements_event_handler() {
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }
}
