use crate::{COMMAND_TARGET, CONSOLE_TARGET, Context, Data, ERROR_TARGET, Error, LOCKDOWN_TARGET};
use poise::FrameworkError;
use dashmap::DashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::{Targets, filter_fn},
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Command log file name
pub const COMMAND_LOG_FILE: &str = "commands";
/// Lockdown audit log file name
pub const LOCKDOWN_LOG_FILE: &str = "lockdowns";

/// Initialize the logging system with console and file outputs
pub fn init(log_dir: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)?;
    }

    // Set up file appenders with daily rotation
    let command_file = RollingFileAppender::new(Rotation::DAILY, log_dir, COMMAND_LOG_FILE);
    let lockdown_file = RollingFileAppender::new(Rotation::DAILY, log_dir, LOCKDOWN_LOG_FILE);

    // Human-readable console output
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // Command and error events as JSON
    let command_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(command_file)
        .with_filter(filter_fn(|meta| {
            meta.target() == COMMAND_TARGET || meta.target() == ERROR_TARGET
        }));

    // Every role sweep, skip and transition as JSON
    let lockdown_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(lockdown_file)
        .with_filter(Targets::new().with_target(LOCKDOWN_TARGET, tracing::Level::DEBUG));

    // RUST_LOG wins; otherwise INFO with serenity's heartbeat chatter silenced
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,serenity=error"))?;

    tracing_subscriber::registry()
        .with(console_layer.with_filter(env_filter))
        .with(command_layer)
        .with(lockdown_layer)
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

/// Start times of in-flight commands, keyed by invocation id
///
/// Hooks for one invocation may run on different worker threads.
static COMMAND_START_TIMES: LazyLock<DashMap<u64, Instant>> = LazyLock::new(DashMap::new);

fn mark_command_start(invocation_id: u64) {
    COMMAND_START_TIMES.insert(invocation_id, Instant::now());
}

fn take_command_elapsed(invocation_id: u64) -> Option<Duration> {
    COMMAND_START_TIMES
        .remove(&invocation_id)
        .map(|(_, start)| start.elapsed())
}

fn guild_label(ctx: Context<'_>) -> String {
    ctx.guild_id()
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Log the start of a command execution (pre-command hook)
pub fn log_command_start(ctx: Context<'_>) {
    mark_command_start(ctx.id());

    let args = if ctx.command().parameters.is_empty() {
        String::new()
    } else {
        format!("{:?}", ctx.invocation_string())
    };

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        arguments = %args,
        event = "start",
        "Command execution started"
    );
}

/// Log the end of a command execution (post-command hook)
pub fn log_command_end(ctx: Context<'_>) {
    let duration = take_command_elapsed(ctx.id());
    let duration_ms = u64::try_from(duration.map_or(0, |d| d.as_millis())).unwrap_or_default();

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        duration_ms = duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Log errors that occur during command execution
pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    // post_command never runs for a failed invocation
    if let Some(ctx) = error.ctx() {
        take_command_elapsed(ctx.id());
    }

    match error {
        FrameworkError::Command { error, ctx, .. } => {
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id,
                error = %error,
                "Command error"
            );
        }
        FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            let error_msg = error
                .as_ref()
                .map_or_else(|| "Check failed".to_string(), ToString::to_string);

            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id,
                error = %error_msg,
                "Command check failed"
            );
        }
        FrameworkError::MissingUserPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            info!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id,
                missing = ?missing_permissions,
                "Command rejected for missing permissions"
            );
        }
        err => {
            error!(
                target: ERROR_TARGET,
                error = ?err,
                "Other framework error"
            );
        }
    }
}

pub fn log_console(message: &str) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}
