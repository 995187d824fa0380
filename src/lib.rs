pub mod brig;
pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod handlers;
pub mod logging;

pub const BOT_NAME: &str = "brig_keeper";
pub const COMMAND_TARGET: &str = "brig_keeper::command";
pub const ERROR_TARGET: &str = "brig_keeper::error";
pub const EVENT_TARGET: &str = "brig_keeper::handlers";
pub const BRIG_TARGET: &str = "brig_keeper::brig";
pub const CONSOLE_TARGET: &str = "brig_keeper";

pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
