//! Per-guild lockdown state
//!
//! The typed record kept for every guild: the profile registry, the id counter
//! and the marker for the lockdown role currently enforced.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use derive_more::{Display, From, Into};
use poise::serenity_prelude::RoleId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a lockdown profile, unique within a guild
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    From,
    Into,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ProfileId(u64);

impl ProfileId {
    pub const FIRST: Self = Self(1);

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Lockdown configuration and status for a single guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildLockdownState {
    /// Map of profile id -> role applied by that profile
    #[serde(default)]
    pub profiles: BTreeMap<ProfileId, RoleId>,
    /// Id handed to the next profile; only `reset_profiles` moves it backwards
    #[serde(default = "first_profile_id")]
    pub next_profile_id: ProfileId,
    /// Role enforced by the active lockdown, stored as 0 when unlocked
    #[serde(
        default,
        rename = "current_lockdown_role_id",
        serialize_with = "serialize_role_marker",
        deserialize_with = "deserialize_role_marker"
    )]
    pub current_lockdown_role: Option<RoleId>,
    /// When the active lockdown was engaged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
}

const fn first_profile_id() -> ProfileId {
    ProfileId::FIRST
}

fn serialize_role_marker<S: Serializer>(
    role: &Option<RoleId>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(role.map_or(0, RoleId::get))
}

fn deserialize_role_marker<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<RoleId>, D::Error> {
    let raw = u64::deserialize(deserializer)?;
    Ok((raw != 0).then(|| RoleId::new(raw)))
}

impl Default for GuildLockdownState {
    fn default() -> Self {
        Self {
            profiles: BTreeMap::new(),
            next_profile_id: ProfileId::FIRST,
            current_lockdown_role: None,
            locked_at: None,
        }
    }
}

impl GuildLockdownState {
    /// Register `role` under a fresh profile id and return that id
    pub fn allocate_profile(&mut self, role: RoleId) -> ProfileId {
        let id = self.next_profile_id;
        self.profiles.insert(id, role);
        self.next_profile_id = id.next();
        id
    }

    /// Drop a profile, returning its role if it existed
    pub fn remove_profile(&mut self, id: ProfileId) -> Option<RoleId> {
        self.profiles.remove(&id)
    }

    /// Clear every profile and restart numbering at 1
    pub fn reset_profiles(&mut self) {
        self.profiles.clear();
        self.next_profile_id = ProfileId::FIRST;
    }

    #[must_use]
    pub fn profile_role(&self, id: ProfileId) -> Option<RoleId> {
        self.profiles.get(&id).copied()
    }

    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.current_lockdown_role.is_some()
    }

    pub fn mark_locked(&mut self, role: RoleId) {
        self.current_lockdown_role = Some(role);
        self.locked_at = Some(Utc::now());
    }

    pub fn mark_unlocked(&mut self) {
        self.current_lockdown_role = None;
        self.locked_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = GuildLockdownState::default();
        assert!(state.profiles.is_empty());
        assert_eq!(state.next_profile_id, ProfileId::FIRST);
        assert!(!state.is_locked());
        assert!(state.locked_at.is_none());
    }

    #[test]
    fn test_ids_are_never_reused_after_removal() {
        let mut state = GuildLockdownState::default();
        let first = state.allocate_profile(RoleId::new(10));
        let second = state.allocate_profile(RoleId::new(11));
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);

        assert_eq!(state.remove_profile(second), Some(RoleId::new(11)));
        let third = state.allocate_profile(RoleId::new(12));
        assert_eq!(third.get(), 3);
        assert_eq!(state.remove_profile(second), None);
    }

    #[test]
    fn test_reset_keeps_lockdown_marker() {
        let mut state = GuildLockdownState::default();
        state.allocate_profile(RoleId::new(10));
        state.mark_locked(RoleId::new(10));

        state.reset_profiles();
        assert!(state.profiles.is_empty());
        assert_eq!(state.allocate_profile(RoleId::new(20)).get(), 1);
        assert_eq!(state.current_lockdown_role, Some(RoleId::new(10)));
    }

    #[test]
    fn test_unlocked_marker_serializes_as_zero() {
        let mut state = GuildLockdownState::default();
        state.allocate_profile(RoleId::new(555));

        let serialized = serde_yaml::to_string(&state).expect("Failed to serialize");
        assert!(serialized.contains("current_lockdown_role_id: 0"));
        assert!(serialized.contains("next_profile_id: 2"));
        assert!(serialized.contains("1: '555'") || serialized.contains("1: 555"));
        assert!(!serialized.contains("locked_at"));

        let deserialized: GuildLockdownState =
            serde_yaml::from_str(&serialized).expect("Failed to deserialize");
        assert_eq!(deserialized, state);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let state: GuildLockdownState =
            serde_yaml::from_str("current_lockdown_role_id: 42\n").expect("Failed to deserialize");
        assert_eq!(state.current_lockdown_role, Some(RoleId::new(42)));
        assert_eq!(state.next_profile_id, ProfileId::FIRST);
        assert!(state.profiles.is_empty());
    }
}
