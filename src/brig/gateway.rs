//! Discord side effects of brigging
//!
//! The registry only decides *what* happens; a `BrigGateway` carries it out
//! against the guild: granting and revoking the brig role and posting to the
//! guild's system channel.

use crate::brig::{BrigError, BrigResult};
use poise::serenity_prelude::{
    self as serenity, Cache, GuildId, Http, HttpError, Member, Role, RoleId, UserId,
};
use std::sync::Arc;
use tracing::debug;

/// Trait for the guild operations the brig depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BrigGateway: Send + Sync {
    /// Give the member the brig role
    async fn assign_role(&self, guild_id: GuildId, member_id: UserId) -> BrigResult<()>;

    /// Take the brig role away from the member
    async fn revoke_role(&self, guild_id: GuildId, member_id: UserId) -> BrigResult<()>;

    /// Post a message to the guild's system channel, if it has one
    async fn notify(&self, guild_id: GuildId, message: String) -> BrigResult<()>;
}

/// Find a role by its exact name
pub fn find_role_by_name<'a>(
    roles: impl IntoIterator<Item = &'a Role>,
    name: &str,
) -> Option<RoleId> {
    roles
        .into_iter()
        .find(|role| role.name == name)
        .map(|role| role.id)
}

/// Discord JSON error codes meaning the member is not in the guild
const UNKNOWN_MEMBER_CODES: [isize; 2] = [
    10007, // Unknown Member
    10013, // Unknown User
];

/// Discord's JSON error code, if the request reached Discord and was refused
fn discord_error_code(error: &serenity::Error) -> Option<isize> {
    match error {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            Some(response.error.code)
        }
        _ => None,
    }
}

/// Map a failed member lookup
///
/// Only Discord saying the member is unknown counts as gone. Timeouts, rate
/// limits and server errors stay API errors so the caller tries again later.
fn member_lookup_error(error: serenity::Error, guild_id: GuildId, member_id: UserId) -> BrigError {
    match discord_error_code(&error) {
        Some(code) if UNKNOWN_MEMBER_CODES.contains(&code) => BrigError::MemberNotFound {
            guild_id: guild_id.get(),
            member_id: member_id.get(),
        },
        _ => error.into(),
    }
}

/// Gateway backed by serenity's HTTP client and cache
pub struct SerenityGateway {
    http: Arc<Http>,
    cache: Arc<Cache>,
    role_name: String,
}

impl SerenityGateway {
    /// Create a gateway that manages the role called `role_name`
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, role_name: impl Into<String>) -> Self {
        Self {
            http,
            cache,
            role_name: role_name.into(),
        }
    }

    async fn brig_role(&self, guild_id: GuildId) -> BrigResult<RoleId> {
        let roles = guild_id.roles(&self.http).await?;
        find_role_by_name(roles.values(), &self.role_name).ok_or_else(|| BrigError::RoleMissing {
            role: self.role_name.clone(),
            guild_id: guild_id.get(),
        })
    }

    async fn member(&self, guild_id: GuildId, member_id: UserId) -> BrigResult<Member> {
        guild_id
            .member((&self.cache, self.http.as_ref()), member_id)
            .await
            .map_err(|e| {
                debug!("Failed to fetch member {member_id} in guild {guild_id}: {e}");
                member_lookup_error(e, guild_id, member_id)
            })
    }
}

#[async_trait::async_trait]
impl BrigGateway for SerenityGateway {
    async fn assign_role(&self, guild_id: GuildId, member_id: UserId) -> BrigResult<()> {
        let role_id = self.brig_role(guild_id).await?;
        let member = self.member(guild_id, member_id).await?;

        self.http
            .add_member_role(guild_id, member.user.id, role_id, Some("Put in the brig"))
            .await?;
        Ok(())
    }

    async fn revoke_role(&self, guild_id: GuildId, member_id: UserId) -> BrigResult<()> {
        let role_id = self.brig_role(guild_id).await?;
        let member = self.member(guild_id, member_id).await?;

        self.http
            .remove_member_role(
                guild_id,
                member.user.id,
                role_id,
                Some("Removed from the brig"),
            )
            .await?;
        Ok(())
    }

    async fn notify(&self, guild_id: GuildId, message: String) -> BrigResult<()> {
        let cached = self
            .cache
            .guild(guild_id)
            .map(|guild| guild.system_channel_id);
        let system_channel = match cached {
            Some(channel) => channel,
            None => {
                guild_id
                    .to_partial_guild(self.http.as_ref())
                    .await?
                    .system_channel_id
            }
        };

        match system_channel {
            Some(channel_id) => {
                channel_id.say(self.http.as_ref(), message).await?;
            }
            None => debug!("Guild {guild_id} has no system channel, skipping notification"),
        }
        Ok(())
    }
}
