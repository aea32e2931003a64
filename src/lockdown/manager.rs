//! Lockdown manager
//!
//! Owns the per-guild lockdown record and drives the engage/disengage
//! transitions against the directory.
//!
//! A sweep stops at the first permission failure. Grants or revokes already
//! issued stay in place, but the persisted lockdown marker is only written
//! once every target has been processed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use poise::serenity_prelude::{GuildId, RoleId, UserId};
use tracing::{debug, info, warn};

use crate::LOCKDOWN_TARGET;

use super::{
    Directory, DirectoryError, LockdownError, LockdownResult, MemberRef, ProfileId, RoleRef,
    Store,
};

/// Result of a bulk role sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Every target was processed and the lockdown marker was updated
    CompletedAll { changed: usize },
    /// The sweep hit a permission error after `completed` role changes
    PartialFailure { completed: usize },
}

impl SweepOutcome {
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::CompletedAll { .. })
    }
}

/// A profile as shown in listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub id: ProfileId,
    pub role_id: RoleId,
    /// `None` when the role has been deleted from the guild
    pub role_name: Option<String>,
}

impl ProfileEntry {
    fn display_name(&self) -> &str {
        self.role_name.as_deref().unwrap_or_default()
    }
}

/// Snapshot of a guild's lockdown status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockdownStatus {
    pub active_role: Option<RoleId>,
    pub locked_at: Option<DateTime<Utc>>,
    pub profile_count: usize,
}

#[derive(Debug, Clone, Copy)]
enum RoleChange {
    Grant,
    Revoke,
}

/// Manager for lockdown profiles and server-wide lockdowns
#[derive(Clone)]
pub struct LockdownManager {
    directory: Arc<dyn Directory>,
    store: Arc<dyn Store>,
}

impl LockdownManager {
    pub fn new(directory: Arc<dyn Directory>, store: Arc<dyn Store>) -> Self {
        Self { directory, store }
    }

    /// Register `role` as a new lockdown profile
    ///
    /// # Errors
    ///
    /// Returns an error if the guild record cannot be loaded or saved.
    pub async fn add_profile(&self, guild_id: GuildId, role: RoleId) -> LockdownResult<ProfileId> {
        let mut state = self.store.load(guild_id).await?;
        let id = state.allocate_profile(role);
        self.store.save(guild_id, &state).await?;

        info!(
            target: LOCKDOWN_TARGET,
            guild_id = %guild_id,
            profile_id = %id,
            role_id = %role,
            event = "profile_added",
            "Lockdown profile added"
        );
        Ok(id)
    }

    /// Delete a lockdown profile
    ///
    /// # Errors
    ///
    /// Returns `ProfileNotFound` if the guild has no such profile, or a store
    /// error if the record cannot be loaded or saved.
    pub async fn remove_profile(&self, guild_id: GuildId, id: ProfileId) -> LockdownResult<()> {
        let mut state = self.store.load(guild_id).await?;
        if state.remove_profile(id).is_none() {
            return Err(LockdownError::ProfileNotFound(id));
        }
        self.store.save(guild_id, &state).await?;

        info!(
            target: LOCKDOWN_TARGET,
            guild_id = %guild_id,
            profile_id = %id,
            event = "profile_removed",
            "Lockdown profile removed"
        );
        Ok(())
    }

    /// All profiles of a guild, sorted by role name
    ///
    /// # Errors
    ///
    /// Returns an error if the record or the guild roles cannot be fetched.
    pub async fn list_profiles(&self, guild_id: GuildId) -> LockdownResult<Vec<ProfileEntry>> {
        let state = self.store.load(guild_id).await?;
        if state.profiles.is_empty() {
            return Ok(Vec::new());
        }

        let names: HashMap<RoleId, String> = self
            .directory
            .roles(guild_id)
            .await?
            .into_iter()
            .map(|role| (role.id, role.name))
            .collect();

        let mut entries: Vec<ProfileEntry> = state
            .profiles
            .iter()
            .map(|(id, role_id)| ProfileEntry {
                id: *id,
                role_id: *role_id,
                role_name: names.get(role_id).cloned(),
            })
            .collect();
        entries.sort_by(|a, b| {
            a.display_name()
                .cmp(b.display_name())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(entries)
    }

    /// Remove every profile and restart numbering; an active lockdown is left alone
    ///
    /// # Errors
    ///
    /// Returns an error if the guild record cannot be loaded or saved.
    pub async fn reset_profiles(&self, guild_id: GuildId) -> LockdownResult<()> {
        let mut state = self.store.load(guild_id).await?;
        state.reset_profiles();
        self.store.save(guild_id, &state).await?;

        info!(
            target: LOCKDOWN_TARGET,
            guild_id = %guild_id,
            event = "profiles_reset",
            "Lockdown profiles reset"
        );
        Ok(())
    }

    /// Current lockdown status of a guild
    ///
    /// # Errors
    ///
    /// Returns an error if the guild record cannot be loaded.
    pub async fn status(&self, guild_id: GuildId) -> LockdownResult<LockdownStatus> {
        let state = self.store.load(guild_id).await?;
        Ok(LockdownStatus {
            active_role: state.current_lockdown_role,
            locked_at: state.locked_at,
            profile_count: state.profiles.len(),
        })
    }

    /// Lock the guild down with the role of profile `id`
    ///
    /// Every member whose top role ranks at or below the lockdown role gets
    /// the role. Engaging while another lockdown is active replaces the
    /// marker without revoking the previous role.
    ///
    /// # Errors
    ///
    /// Returns `ProfileNotFound` or `RoleNotFound` before touching any member,
    /// and propagates store or non-permission directory failures. Permission
    /// failures are reported as `SweepOutcome::PartialFailure`.
    pub async fn engage(&self, guild_id: GuildId, id: ProfileId) -> LockdownResult<SweepOutcome> {
        let mut state = self.store.load(guild_id).await?;
        let role_id = state
            .profile_role(id)
            .ok_or(LockdownError::ProfileNotFound(id))?;
        let lock_role = self
            .directory
            .role(guild_id, role_id)
            .await?
            .ok_or(LockdownError::RoleNotFound(role_id))?;

        if let Some(previous) = state.current_lockdown_role {
            warn!(
                target: LOCKDOWN_TARGET,
                guild_id = %guild_id,
                previous_role_id = %previous,
                role_id = %role_id,
                "Engaging while a lockdown is already active"
            );
        }

        let roles = self.directory.roles(guild_id).await?;
        let members = self.directory.members(guild_id).await?;
        let targets = engage_targets(&lock_role, &roles, members);

        info!(
            target: LOCKDOWN_TARGET,
            guild_id = %guild_id,
            profile_id = %id,
            role_id = %role_id,
            targets = targets.len(),
            event = "engage_start",
            "Starting lockdown sweep"
        );

        let outcome = self
            .sweep(guild_id, role_id, &targets, RoleChange::Grant)
            .await?;
        if let SweepOutcome::CompletedAll { changed } = outcome {
            state.mark_locked(role_id);
            self.store.save(guild_id, &state).await?;
            info!(
                target: LOCKDOWN_TARGET,
                guild_id = %guild_id,
                role_id = %role_id,
                changed,
                event = "engaged",
                "Lockdown engaged"
            );
        }
        Ok(outcome)
    }

    /// Lift the active lockdown
    ///
    /// Only members whose top role is exactly the lockdown role lose it.
    /// Without an active lockdown this touches no member.
    ///
    /// # Errors
    ///
    /// Propagates store or non-permission directory failures. Permission
    /// failures are reported as `SweepOutcome::PartialFailure` and leave the
    /// lockdown marker set.
    pub async fn disengage(&self, guild_id: GuildId) -> LockdownResult<SweepOutcome> {
        let mut state = self.store.load(guild_id).await?;

        let outcome = match state.current_lockdown_role {
            Some(role_id) => {
                let members = self.directory.members(guild_id).await?;
                let targets = disengage_targets(role_id, members);

                info!(
                    target: LOCKDOWN_TARGET,
                    guild_id = %guild_id,
                    role_id = %role_id,
                    targets = targets.len(),
                    event = "disengage_start",
                    "Starting unlock sweep"
                );

                self.sweep(guild_id, role_id, &targets, RoleChange::Revoke)
                    .await?
            }
            None => {
                debug!(
                    target: LOCKDOWN_TARGET,
                    guild_id = %guild_id,
                    "No active lockdown to lift"
                );
                SweepOutcome::CompletedAll { changed: 0 }
            }
        };

        if outcome.is_complete() {
            state.mark_unlocked();
            self.store.save(guild_id, &state).await?;
            info!(
                target: LOCKDOWN_TARGET,
                guild_id = %guild_id,
                event = "disengaged",
                "Lockdown lifted"
            );
        }
        Ok(outcome)
    }

    /// Apply the active lockdown role to a member who just joined
    ///
    /// # Errors
    ///
    /// Returns any store or directory failure; nothing is retried.
    pub async fn on_member_join(&self, guild_id: GuildId, user_id: UserId) -> LockdownResult<()> {
        let state = self.store.load(guild_id).await?;
        let Some(role_id) = state.current_lockdown_role else {
            return Ok(());
        };

        self.directory.grant_role(guild_id, user_id, role_id).await?;
        info!(
            target: LOCKDOWN_TARGET,
            guild_id = %guild_id,
            user_id = %user_id,
            role_id = %role_id,
            event = "join_locked",
            "Applied lockdown role to new member"
        );
        Ok(())
    }

    async fn sweep(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
        targets: &[MemberRef],
        change: RoleChange,
    ) -> LockdownResult<SweepOutcome> {
        let mut completed = 0;
        for member in targets {
            let result = match change {
                RoleChange::Grant => {
                    if member.has_role(role_id) {
                        continue;
                    }
                    self.directory
                        .grant_role(guild_id, member.user_id, role_id)
                        .await
                }
                RoleChange::Revoke => {
                    if !member.has_role(role_id) {
                        continue;
                    }
                    self.directory
                        .revoke_role(guild_id, member.user_id, role_id)
                        .await
                }
            };

            match result {
                Ok(()) => {
                    completed += 1;
                    debug!(
                        target: LOCKDOWN_TARGET,
                        guild_id = %guild_id,
                        user_id = %member.user_id,
                        change = ?change,
                        "Role change applied"
                    );
                }
                Err(DirectoryError::PermissionDenied) => {
                    warn!(
                        target: LOCKDOWN_TARGET,
                        guild_id = %guild_id,
                        user_id = %member.user_id,
                        change = ?change,
                        completed,
                        event = "sweep_aborted",
                        "Missing permissions, aborting sweep"
                    );
                    return Ok(SweepOutcome::PartialFailure { completed });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(SweepOutcome::CompletedAll { changed: completed })
    }
}

/// Members whose top role ranks at or below `lock_role`
///
/// Members with no resolvable top role rank as `@everyone` and are always included.
fn engage_targets(lock_role: &RoleRef, roles: &[RoleRef], members: Vec<MemberRef>) -> Vec<MemberRef> {
    let ranks: HashMap<RoleId, &RoleRef> = roles.iter().map(|role| (role.id, role)).collect();
    members
        .into_iter()
        .filter(|member| {
            member
                .top_role
                .and_then(|top| ranks.get(&top))
                .is_none_or(|top| *top <= lock_role)
        })
        .collect()
}

/// Members whose top role is exactly `role_id`
fn disengage_targets(role_id: RoleId, members: Vec<MemberRef>) -> Vec<MemberRef> {
    members
        .into_iter()
        .filter(|member| member.top_role == Some(role_id))
        .collect()
}
