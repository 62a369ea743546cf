//! Per-invocation command context.

use crate::bot::BotHandle;
use crate::error::CommandError;
use irc_client::{ChatMessage, ChatTransport, ChatUser};
use std::sync::Arc;
use twitch_api_client::ChannelApi;

/// Everything a chat command handler gets to work with.
///
/// Built fresh for every dispatched line.
#[derive(Clone)]
pub struct CommandContext {
    pub bot: BotHandle,
    /// Channel the command came from, without `#`.
    pub channel: String,
    pub user: ChatUser,
    /// The raw inbound message.
    pub message: ChatMessage,
    /// Caller's resolved privilege level.
    pub level: i32,
    pub chat: Arc<dyn ChatTransport>,
    pub api: Arc<dyn ChannelApi>,
}

impl CommandContext {
    /// Reply in the originating channel.
    pub async fn say(&self, text: impl AsRef<str>) -> Result<(), CommandError> {
        self.chat.say(&self.channel, text.as_ref()).await?;
        Ok(())
    }
}
