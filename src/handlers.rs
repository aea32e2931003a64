use crate::{Data, EVENT_TARGET};
use poise::serenity_prelude::{self as serenity, Context, EventHandler, GuildId, Member, Ready};
use tracing::{error, info, warn};

pub struct Handler {
    data: Data,
}

impl Handler {
    #[must_use]
    pub const fn new(data: Data) -> Self {
        Self { data }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    /// New members inherit an active lockdown.
    async fn guild_member_addition(&self, _ctx: Context, new_member: Member) {
        let guild_id = new_member.guild_id;
        let user_id = new_member.user.id;

        if let Err(e) = self.data.lockdowns.on_member_join(guild_id, user_id).await {
            error!(
                target: EVENT_TARGET,
                guild_id = %guild_id,
                user_id = %user_id,
                error = %e,
                "Failed to apply lockdown role to new member"
            );
        }
    }
}
