//! Platform directory
//!
//! Role and member lookups plus the role mutations a lockdown sweep issues.
//! The manager only sees the `Directory` trait; `SerenityDirectory` backs it
//! with the Discord HTTP API.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use poise::serenity_prelude::{GuildId, Http, Member, Role, RoleId, UserId};
use tracing::debug;

use super::{DirectoryError, DirectoryResult};

/// Page size used when walking the guild member list
const MEMBER_PAGE_SIZE: u64 = 1000;

/// Audit log reason attached to every role change
const AUDIT_REASON: &str = "Server lockdown";

/// A guild role with its place in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRef {
    pub id: RoleId,
    pub name: String,
    /// Hierarchy position, higher outranks lower
    pub position: u16,
}

impl RoleRef {
    pub fn new(id: RoleId, name: impl Into<String>, position: u16) -> Self {
        Self {
            id,
            name: name.into(),
            position,
        }
    }
}

impl Ord for RoleRef {
    /// Discord breaks position ties by id, same as serenity's `Role` ordering
    fn cmp(&self, other: &Self) -> Ordering {
        self.position
            .cmp(&other.position)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for RoleRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&Role> for RoleRef {
    fn from(role: &Role) -> Self {
        Self::new(role.id, role.name.clone(), role.position)
    }
}

/// A guild member as seen by a lockdown sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub user_id: UserId,
    pub roles: Vec<RoleId>,
    /// Highest-ranked role, `None` when the member only has `@everyone`
    pub top_role: Option<RoleId>,
}

impl MemberRef {
    #[must_use]
    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}

/// Pick the highest-ranked of `member_roles`, ignoring ids missing from `roles`
#[must_use]
pub fn top_role_of(member_roles: &[RoleId], roles: &HashMap<RoleId, RoleRef>) -> Option<RoleId> {
    member_roles
        .iter()
        .filter_map(|id| roles.get(id))
        .max()
        .map(|role| role.id)
}

/// Role and member access for a guild
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    /// Look up a single role
    async fn role(&self, guild_id: GuildId, role_id: RoleId) -> DirectoryResult<Option<RoleRef>>;

    /// Every role in the guild
    async fn roles(&self, guild_id: GuildId) -> DirectoryResult<Vec<RoleRef>>;

    /// Every member in the guild, with their top role resolved
    async fn members(&self, guild_id: GuildId) -> DirectoryResult<Vec<MemberRef>>;

    /// Add `role_id` to a member
    async fn grant_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> DirectoryResult<()>;

    /// Remove `role_id` from a member
    async fn revoke_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> DirectoryResult<()>;
}

/// Directory backed by the Discord HTTP API
#[derive(Clone)]
pub struct SerenityDirectory {
    http: Arc<Http>,
}

impl SerenityDirectory {
    #[must_use]
    pub const fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn role_map(&self, guild_id: GuildId) -> DirectoryResult<HashMap<RoleId, RoleRef>> {
        let roles = guild_id.roles(&self.http).await?;
        Ok(roles
            .iter()
            .map(|(id, role)| (*id, RoleRef::from(role)))
            .collect())
    }

    async fn all_members(&self, guild_id: GuildId) -> DirectoryResult<Vec<Member>> {
        let mut members = Vec::new();
        let mut after = None;
        loop {
            let page = guild_id
                .members(&self.http, Some(MEMBER_PAGE_SIZE), after)
                .await?;
            let fetched = page.len();
            after = page.last().map(|member| member.user.id);
            members.extend(page);
            if (fetched as u64) < MEMBER_PAGE_SIZE {
                break;
            }
        }
        debug!("Fetched {} members for guild {guild_id}", members.len());
        Ok(members)
    }
}

#[async_trait::async_trait]
impl Directory for SerenityDirectory {
    async fn role(&self, guild_id: GuildId, role_id: RoleId) -> DirectoryResult<Option<RoleRef>> {
        Ok(self.role_map(guild_id).await?.remove(&role_id))
    }

    async fn roles(&self, guild_id: GuildId) -> DirectoryResult<Vec<RoleRef>> {
        let mut roles: Vec<RoleRef> = self.role_map(guild_id).await?.into_values().collect();
        roles.sort();
        Ok(roles)
    }

    async fn members(&self, guild_id: GuildId) -> DirectoryResult<Vec<MemberRef>> {
        let roles = self.role_map(guild_id).await?;
        let members = self.all_members(guild_id).await?;
        Ok(members
            .into_iter()
            .map(|member| {
                let top_role = top_role_of(&member.roles, &roles);
                MemberRef {
                    user_id: member.user.id,
                    roles: member.roles,
                    top_role,
                }
            })
            .collect())
    }

    async fn grant_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> DirectoryResult<()> {
        self.http
            .add_member_role(guild_id, user_id, role_id, Some(AUDIT_REASON))
            .await
            .map_err(DirectoryError::from)
    }

    async fn revoke_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> DirectoryResult<()> {
        self.http
            .remove_member_role(guild_id, user_id, role_id, Some(AUDIT_REASON))
            .await
            .map_err(DirectoryError::from)
    }
}
