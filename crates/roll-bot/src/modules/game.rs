//! `!game` and `!setgame`.

use super::{Module, ModuleFactory};
use crate::bot::BotHandle;
use crate::commands::{FnHandler, DEFAULT_LEVEL, MODERATOR_LEVEL};
use crate::context::CommandContext;
use crate::error::{CommandError, ModuleError};
use async_trait::async_trait;
use module_store::Bucket;
use tracing::info;

pub const MODULE_TYPE: &str = "game";

pub struct GameFactory;

#[async_trait]
impl ModuleFactory for GameFactory {
    async fn create(&self, bot: BotHandle, _bucket: Bucket) -> anyhow::Result<Box<dyn Module>> {
        bot.add_command(
            "game",
            "Lists the current game.",
            FnHandler::new(|ctx: CommandContext, _args| game_command(ctx)),
            DEFAULT_LEVEL,
        )?;
        bot.add_command(
            "setgame",
            "Sets the current game.",
            FnHandler::new(set_game_command),
            MODERATOR_LEVEL,
        )?;
        Ok(Box::new(GameModule))
    }
}

/// Stateless; everything happens in the command handlers.
pub struct GameModule;

#[async_trait]
impl Module for GameModule {
    async fn start(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        Ok(())
    }
}

async fn game_command(ctx: CommandContext) -> Result<(), CommandError> {
    let channel = ctx.api.get_channel().await?;
    ctx.say(format!("The game is {}.", channel.game)).await
}

async fn set_game_command(ctx: CommandContext, args: Vec<String>) -> Result<(), CommandError> {
    let channel = ctx.api.get_channel().await?;
    let game = args.join(" ");

    ctx.api.set_channel_game(&channel.name, &game).await?;
    info!(user = %ctx.user.username, %game, "Stream game changed");
    ctx.say(format!("Game set to {}.", game)).await
}
