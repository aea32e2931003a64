pub mod commands;
pub mod config;
pub mod data;
pub mod handlers;
pub mod lockdown;
pub mod logging;

pub const BOT_NAME: &str = "lockwarden";
pub const COMMAND_TARGET: &str = "lockwarden::command";
pub const ERROR_TARGET: &str = "lockwarden::error";
pub const EVENT_TARGET: &str = "lockwarden::handlers";
pub const LOCKDOWN_TARGET: &str = "lockwarden::lockdown";
pub const CONSOLE_TARGET: &str = "lockwarden";

pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
