use crate::lockdown::{LockdownError, LockdownStatus, ProfileEntry, ProfileId, SweepOutcome};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use std::fmt::Write as _;

const NO_PROFILE: &str = "That profile does not exist!";

/// Enables lockdown for this server
///
/// Applies the profile's role to every member ranked at or below it.
/// To list profiles, use `lockdownset listprofiles`.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES"
)]
pub async fn lockdown(
    ctx: Context<'_>,
    #[description = "ID of the lockdown profile to use"] profile: u64,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;

    match ctx
        .data()
        .lockdowns
        .engage(guild_id, ProfileId::from(profile))
        .await
    {
        Ok(SweepOutcome::CompletedAll { .. }) => {
            ctx.say(format!(
                "Server is locked down. You can unlock the server by doing {}unlockdown",
                ctx.prefix()
            ))
            .await?;
        }
        Ok(SweepOutcome::PartialFailure { .. }) => {
            ctx.say(
                "I don't have permissions to manage roles! \
                 As a result, lockdown has NOT been activated!",
            )
            .await?;
        }
        Err(LockdownError::ProfileNotFound(_)) => {
            ctx.say(NO_PROFILE).await?;
        }
        Err(LockdownError::RoleNotFound(role_id)) => {
            ctx.say(format!(
                "The role for that profile ({role_id}) no longer exists!"
            ))
            .await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Ends the lockdown for this server
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES"
)]
pub async fn unlockdown(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;

    match ctx.data().lockdowns.disengage(guild_id).await? {
        SweepOutcome::CompletedAll { .. } => {
            ctx.say("Server has been unlocked!").await?;
        }
        SweepOutcome::PartialFailure { .. } => {
            ctx.say(
                "I do not have permissions to manage roles, \
                 so I cannot end this lockdown at this time!",
            )
            .await?;
        }
    }
    Ok(())
}

/// Settings for lockdown
///
/// The lockdown role must sit above every role it should affect, and its
/// permissions should deny whatever members may not do during a lockdown.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    subcommands(
        "lockdownset_addprofile",
        "lockdownset_removeprofile",
        "lockdownset_listprofiles",
        "lockdownset_reset",
        "lockdownset_status"
    ),
    subcommand_required
)]
pub async fn lockdownset(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Adds a lockdown profile for the given role
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "addprofile",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn lockdownset_addprofile(
    ctx: Context<'_>,
    #[description = "Role applied when this profile is used"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let id = ctx.data().lockdowns.add_profile(guild_id, role.id).await?;
    ctx.say(format!("Profile {id} added for role {}", role.name))
        .await?;
    Ok(())
}

/// Removes the lockdown profile with the specified ID
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "removeprofile",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn lockdownset_removeprofile(
    ctx: Context<'_>,
    #[description = "ID of the profile to remove"] profile_id: u64,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let id = ProfileId::from(profile_id);

    match ctx.data().lockdowns.remove_profile(guild_id, id).await {
        Ok(()) => {
            ctx.say(format!("Profile {id} removed.")).await?;
        }
        Err(LockdownError::ProfileNotFound(_)) => {
            ctx.say("That profile doesn't exist!").await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Lists all lockdown profiles for this server
#[poise::command(prefix_command, slash_command, guild_only, rename = "listprofiles")]
pub async fn lockdownset_listprofiles(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let profiles = ctx.data().lockdowns.list_profiles(guild_id).await?;
    ctx.say(format!("```\n{}\n```", render_profiles(&profiles)))
        .await?;
    Ok(())
}

/// Removes all lockdown profiles for this server
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "reset",
    check = "owner_or_admin"
)]
pub async fn lockdownset_reset(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    ctx.data().lockdowns.reset_profiles(guild_id).await?;
    ctx.say("All lockdown profiles removed.").await?;
    Ok(())
}

/// Shows whether a lockdown is currently active
#[poise::command(prefix_command, slash_command, guild_only, rename = "status")]
pub async fn lockdownset_status(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let status = ctx.data().lockdowns.status(guild_id).await?;
    ctx.say(render_status(&status)).await?;
    Ok(())
}

/// Every command this bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<crate::Data, Error>> {
    vec![lockdown(), unlockdown(), lockdownset()]
}

fn guild_id(ctx: Context<'_>) -> Result<serenity::GuildId, Error> {
    ctx.guild_id()
        .ok_or_else(|| "This command can only be used in a guild".into())
}

/// Guild owners and administrators only
async fn owner_or_admin(ctx: Context<'_>) -> Result<bool, Error> {
    let Some(member) = ctx.author_member().await else {
        return Ok(false);
    };
    let Some(guild) = ctx.guild() else {
        return Ok(false);
    };
    Ok(guild.owner_id == member.user.id || guild.member_permissions(&member).administrator())
}

fn render_profiles(profiles: &[ProfileEntry]) -> String {
    if profiles.is_empty() {
        return "There are no profiles set up!".to_string();
    }

    let mut output = format!("{:<4}{}", "ID", "Role Name");
    for profile in profiles {
        let name = profile
            .role_name
            .clone()
            .unwrap_or_else(|| format!("(deleted role {})", profile.role_id));
        let _ = write!(output, "\n{:<4}{}", format!("{}.", profile.id), name);
    }
    output
}

fn render_status(status: &LockdownStatus) -> String {
    match status.active_role {
        Some(role_id) => {
            let since = status
                .locked_at
                .map(|at| format!(" since <t:{}:R>", at.timestamp()))
                .unwrap_or_default();
            format!("Lockdown is active with <@&{role_id}>{since}.")
        }
        None => format!(
            "No lockdown is active. {} profile(s) configured.",
            status.profile_count
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use poise::serenity_prelude::RoleId;

    #[test]
    fn test_lockdown_command_definition() {
        let cmd = lockdown();
        assert_eq!(cmd.name, "lockdown");
        assert!(cmd.guild_only);
        assert!(cmd.required_permissions.manage_messages());
        assert_eq!(cmd.parameters.len(), 1);
    }

    #[test]
    fn test_unlockdown_command_definition() {
        let cmd = unlockdown();
        assert_eq!(cmd.name, "unlockdown");
        assert!(cmd.required_permissions.manage_messages());
        assert!(cmd.create_as_slash_command().is_some());
    }

    #[test]
    fn test_lockdownset_subcommands() {
        let cmd = lockdownset();
        let names: Vec<&str> = cmd.subcommands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["addprofile", "removeprofile", "listprofiles", "reset", "status"]
        );
        assert!(cmd.subcommand_required);
    }

    #[test]
    fn test_lockdownset_permissions() {
        let cmd = lockdownset();
        let find = |name: &str| {
            cmd.subcommands
                .iter()
                .find(|c| c.name == name)
                .expect("subcommand")
        };
        assert!(find("addprofile").required_permissions.manage_guild());
        assert!(find("removeprofile").required_permissions.manage_guild());
        assert!(find("listprofiles").required_permissions.is_empty());
        assert!(find("reset").checks.len() == 1);
    }

    #[test]
    fn test_render_empty_profiles() {
        assert_eq!(render_profiles(&[]), "There are no profiles set up!");
    }

    #[test]
    fn test_render_profiles_table() {
        let profiles = vec![
            ProfileEntry {
                id: ProfileId::from(2),
                role_id: RoleId::new(20),
                role_name: Some("Locked".to_string()),
            },
            ProfileEntry {
                id: ProfileId::from(11),
                role_id: RoleId::new(30),
                role_name: None,
            },
        ];
        assert_eq!(
            render_profiles(&profiles),
            "ID  Role Name\n2.  Locked\n11. (deleted role 30)"
        );
    }

    #[test]
    fn test_render_status() {
        let idle = LockdownStatus {
            active_role: None,
            locked_at: None,
            profile_count: 3,
        };
        assert_eq!(
            render_status(&idle),
            "No lockdown is active. 3 profile(s) configured."
        );

        let active = LockdownStatus {
            active_role: Some(RoleId::new(20)),
            locked_at: Utc.timestamp_opt(1_700_000_000, 0).single(),
            profile_count: 1,
        };
        assert_eq!(
            render_status(&active),
            "Lockdown is active with <@&20> since <t:1700000000:R>."
        );
    }

    #[test]
    fn test_all_commands_registered() {
        let names: Vec<String> = all().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["lockdown", "unlockdown", "lockdownset"]);
    }
}
