//! Twitch chat bot: command dispatch, pluggable modules and an admin RPC
//! surface.

pub mod bot;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod mock;
pub mod modules;
pub mod rpc;
pub mod web;
pub mod worker;

#[cfg(test)]
mod testing;

pub use bot::{Bot, BotHandle, BotSettings, BotState};
pub use commands::{CommandEngine, CommandHandler, FnHandler, ADMIN_LEVEL, DEFAULT_LEVEL};
pub use context::CommandContext;
pub use error::{AppError, AppResult, BotError, CommandError, ModuleError, RpcError};
pub use modules::{Module, ModuleFactory, ModuleRegistry};
pub use rpc::{RequestOrigin, RpcService};
