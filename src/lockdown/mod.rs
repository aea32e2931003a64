//! Lockdown system
//!
//! Profiles map an id to a restrictive role. Engaging a profile hands that
//! role to every member ranked at or below it; disengaging takes it back.

mod directory;
mod error;
mod manager;
mod state;
mod store;

#[cfg(test)]
pub use directory::MockDirectory;
pub use directory::{Directory, MemberRef, RoleRef, SerenityDirectory, top_role_of};
pub use error::{
    DirectoryError, DirectoryResult, LockdownError, LockdownResult, StoreError, StoreResult,
};
pub use manager::{LockdownManager, LockdownStatus, ProfileEntry, SweepOutcome};
pub use state::{GuildLockdownState, ProfileId};
pub use store::{MemoryStore, Store, YamlStore};
