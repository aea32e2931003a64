//! Error types for the lockdown system
//!
//! This module defines the errors raised by lockdown operations and by the
//! collaborators they depend on.

use poise::serenity_prelude::RoleId;
use thiserror::Error;

use super::ProfileId;

/// Errors raised by the platform directory
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The bot lacks the rights to perform the mutation
    #[error("Missing permissions to manage roles")]
    PermissionDenied,

    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for DirectoryError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        if is_permission_error(&error) {
            Self::PermissionDenied
        } else {
            Self::DiscordApi(Box::new(error))
        }
    }
}

/// Discord reports missing permissions either as a 403 or as JSON error code 50013.
const MISSING_PERMISSIONS_CODE: isize = 50013;

fn is_permission_error(error: &poise::serenity_prelude::Error) -> bool {
    use ::serenity::http::HttpError;
    use ::serenity::model::ModelError;

    match error {
        ::serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            response.status_code.as_u16() == 403
                || response.error.code == MISSING_PERMISSIONS_CODE
        }
        ::serenity::Error::Model(ModelError::InvalidPermissions { .. }) => true,
        _ => false,
    }
}

/// Result type for directory calls
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors raised by the guild state store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access store file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode guild state: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur during lockdown operations
#[derive(Debug, Error)]
pub enum LockdownError {
    /// No profile with this ID exists in the guild
    #[error("Profile not found: {0}")]
    ProfileNotFound(ProfileId),

    /// The profile points at a role that is gone from the guild
    #[error("Role not found: {0}")]
    RoleNotFound(RoleId),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for store calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for lockdown operations
pub type LockdownResult<T> = Result<T, LockdownError>;
