pub mod banner;
pub mod commands;
pub mod config;
pub mod data;
pub mod handlers;
pub mod logging;
pub mod store;

pub const BOT_NAME: &str = "Entry Warden";
pub const COMMAND_TARGET: &str = "entry_warden::command";
pub const ERROR_TARGET: &str = "entry_warden::error";
pub const EVENT_TARGET: &str = "entry_warden::handlers";
pub const MODERATION_TARGET: &str = "entry_warden::moderation";
pub const CONSOLE_TARGET: &str = "entry_warden";

pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
