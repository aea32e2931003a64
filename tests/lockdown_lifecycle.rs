use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lockwarden::lockdown::{
    Directory, DirectoryError, DirectoryResult, LockdownManager, MemberRef, MemoryStore, RoleRef,
    Store, SweepOutcome, YamlStore, top_role_of,
};
use poise::serenity_prelude::{GuildId, RoleId, UserId};

const GUILD: GuildId = GuildId::new(42);
const OWNER: RoleId = RoleId::new(1);
const MOD: RoleId = RoleId::new(2);
const LOCK: RoleId = RoleId::new(3);
const MEMBER: RoleId = RoleId::new(4);

/// In-memory guild whose member roles change as the manager mutates them
struct Guild {
    roles: Vec<RoleRef>,
    members: Mutex<HashMap<UserId, Vec<RoleId>>>,
    mutations: Mutex<usize>,
    deny_after: Option<usize>,
}

impl Guild {
    fn new(members: &[(u64, &[RoleId])]) -> Self {
        Self {
            roles: vec![
                RoleRef::new(OWNER, "Owner", 4),
                RoleRef::new(MOD, "Mod", 3),
                RoleRef::new(LOCK, "Lockdown", 2),
                RoleRef::new(MEMBER, "Member", 1),
            ],
            members: Mutex::new(
                members
                    .iter()
                    .map(|(id, roles)| (UserId::new(*id), roles.to_vec()))
                    .collect(),
            ),
            mutations: Mutex::new(0),
            deny_after: None,
        }
    }

    fn roles_of(&self, user: u64) -> Vec<RoleId> {
        self.members.lock().unwrap()[&UserId::new(user)].clone()
    }

    fn mutation_count(&self) -> usize {
        *self.mutations.lock().unwrap()
    }

    fn mutate(&self, user: UserId, apply: impl FnOnce(&mut Vec<RoleId>)) -> DirectoryResult<()> {
        let mut count = self.mutations.lock().unwrap();
        if self.deny_after.is_some_and(|limit| *count >= limit) {
            return Err(DirectoryError::PermissionDenied);
        }
        *count += 1;
        if let Some(roles) = self.members.lock().unwrap().get_mut(&user) {
            apply(roles);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Directory for Guild {
    async fn role(&self, _: GuildId, role_id: RoleId) -> DirectoryResult<Option<RoleRef>> {
        Ok(self.roles.iter().find(|role| role.id == role_id).cloned())
    }

    async fn roles(&self, _: GuildId) -> DirectoryResult<Vec<RoleRef>> {
        Ok(self.roles.clone())
    }

    async fn members(&self, _: GuildId) -> DirectoryResult<Vec<MemberRef>> {
        let by_id: HashMap<RoleId, RoleRef> =
            self.roles.iter().map(|role| (role.id, role.clone())).collect();
        let mut members: Vec<MemberRef> = self
            .members
            .lock()
            .unwrap()
            .iter()
            .map(|(user_id, roles)| MemberRef {
                user_id: *user_id,
                roles: roles.clone(),
                top_role: top_role_of(roles, &by_id),
            })
            .collect();
        members.sort_by_key(|member| member.user_id);
        Ok(members)
    }

    async fn grant_role(&self, _: GuildId, user: UserId, role: RoleId) -> DirectoryResult<()> {
        self.mutate(user, |roles| roles.push(role))
    }

    async fn revoke_role(&self, _: GuildId, user: UserId, role: RoleId) -> DirectoryResult<()> {
        self.mutate(user, |roles| roles.retain(|r| *r != role))
    }
}

#[tokio::test]
async fn test_full_lockdown_cycle() {
    let guild = Arc::new(Guild::new(&[
        (1, &[OWNER]),
        (2, &[MOD]),
        (3, &[MEMBER]),
        (4, &[MEMBER]),
    ]));
    let store = MemoryStore::new();
    let manager = LockdownManager::new(guild.clone(), Arc::new(store.clone()));

    let profile = manager.add_profile(GUILD, LOCK).await.unwrap();
    assert_eq!(profile.get(), 1);

    let outcome = manager.engage(GUILD, profile).await.unwrap();
    assert_eq!(outcome, SweepOutcome::CompletedAll { changed: 2 });
    assert!(guild.roles_of(3).contains(&LOCK));
    assert!(guild.roles_of(4).contains(&LOCK));
    assert_eq!(guild.roles_of(1), vec![OWNER]);
    assert_eq!(guild.roles_of(2), vec![MOD]);

    // Joins during the lockdown are locked too
    guild.members.lock().unwrap().insert(UserId::new(5), Vec::new());
    manager.on_member_join(GUILD, UserId::new(5)).await.unwrap();
    assert_eq!(guild.roles_of(5), vec![LOCK]);

    let outcome = manager.disengage(GUILD).await.unwrap();
    assert_eq!(outcome, SweepOutcome::CompletedAll { changed: 3 });
    assert_eq!(guild.roles_of(3), vec![MEMBER]);
    assert!(guild.roles_of(5).is_empty());
    assert!(store.load(GUILD).await.unwrap().current_lockdown_role.is_none());

    // Joins after the lockdown are left alone
    let before = guild.mutation_count();
    manager.on_member_join(GUILD, UserId::new(6)).await.unwrap();
    assert_eq!(guild.mutation_count(), before);
}

#[tokio::test]
async fn test_partial_engage_can_be_retried() {
    let mut guild = Guild::new(&[(1, &[MEMBER]), (2, &[MEMBER]), (3, &[MEMBER])]);
    guild.deny_after = Some(1);
    let guild = Arc::new(guild);
    let store = MemoryStore::new();
    let manager = LockdownManager::new(guild.clone(), Arc::new(store.clone()));
    let profile = manager.add_profile(GUILD, LOCK).await.unwrap();

    let outcome = manager.engage(GUILD, profile).await.unwrap();
    assert_eq!(outcome, SweepOutcome::PartialFailure { completed: 1 });
    assert!(guild.roles_of(1).contains(&LOCK));
    assert!(!guild.roles_of(2).contains(&LOCK));
    assert!(!guild.roles_of(3).contains(&LOCK));
    assert!(store.load(GUILD).await.unwrap().current_lockdown_role.is_none());

    // A retry with a fresh manager over an unrestricted guild picks up the rest
    let retry_guild = Arc::new(Guild::new(&[
        (1, &[MEMBER, LOCK]),
        (2, &[MEMBER]),
        (3, &[MEMBER]),
    ]));
    let manager = LockdownManager::new(retry_guild.clone(), Arc::new(store.clone()));
    let outcome = manager.engage(GUILD, profile).await.unwrap();
    assert_eq!(outcome, SweepOutcome::CompletedAll { changed: 2 });
    assert_eq!(
        store.load(GUILD).await.unwrap().current_lockdown_role,
        Some(LOCK)
    );
}

#[tokio::test]
async fn test_state_persists_across_restarts() {
    let dir = std::env::temp_dir().join(format!("lockwarden-it-{}", uuid::Uuid::new_v4()));
    let path = dir.join("lockdown.yaml");
    let guild = Arc::new(Guild::new(&[(1, &[MEMBER])]));

    {
        let store = YamlStore::open(&path).await.unwrap();
        let manager = LockdownManager::new(guild.clone(), Arc::new(store));
        manager.add_profile(GUILD, MEMBER).await.unwrap();
        let lock = manager.add_profile(GUILD, LOCK).await.unwrap();
        manager.engage(GUILD, lock).await.unwrap();
    }

    let store = YamlStore::open(&path).await.unwrap();
    let manager = LockdownManager::new(guild.clone(), Arc::new(store));

    let status = manager.status(GUILD).await.unwrap();
    assert_eq!(status.active_role, Some(LOCK));
    assert_eq!(status.profile_count, 2);
    assert_eq!(manager.add_profile(GUILD, LOCK).await.unwrap().get(), 3);

    let names: Vec<Option<String>> = manager
        .list_profiles(GUILD)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.role_name)
        .collect();
    assert_eq!(
        names,
        vec![
            Some("Lockdown".to_string()),
            Some("Lockdown".to_string()),
            Some("Member".to_string()),
        ]
    );

    let _ = std::fs::remove_dir_all(dir);
}
