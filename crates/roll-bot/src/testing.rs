//! Shared fixtures for unit tests.

use crate::bot::{BotHandle, BotSettings};
use crate::context::CommandContext;
use crate::mock::MemoryTransport;
use async_trait::async_trait;
use irc_client::ChatMessage;
use mockall::mock;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use twitch_api_client::{ApiError, Channel, ChannelApi, Follows};

mock! {
    pub Api {}

    #[async_trait]
    impl ChannelApi for Api {
        async fn get_channel(&self) -> Result<Channel, ApiError>;
        async fn set_channel_game(&self, channel: &str, game: &str) -> Result<(), ApiError>;
        async fn get_channel_follows(&self, channel: &str) -> Result<Follows, ApiError>;
    }
}

pub fn test_settings() -> BotSettings {
    BotSettings {
        channel: "testchan".into(),
        admin_user: "konkers".into(),
        command_prefix: "!".into(),
        client_id: "test-client-id".into(),
        api_oauth: SecretString::new("api-token".into()),
        listen_addr: "127.0.0.1:0".into(),
        connect_timeout: Duration::from_secs(3),
    }
}

pub fn chat_message(username: &str, text: &str) -> ChatMessage {
    MemoryTransport::message("testchan", username, text)
}

pub fn channel(name: &str, game: &str) -> Channel {
    Channel {
        id: 1,
        name: name.into(),
        display_name: name.into(),
        game: game.into(),
        status: String::new(),
    }
}

/// A bot handle over a memory transport and the given API.
pub fn test_bot(api: impl ChannelApi + 'static) -> (BotHandle, Arc<MemoryTransport>) {
    let chat = Arc::new(MemoryTransport::new());
    let bot = BotHandle::new(test_settings(), chat.clone(), Arc::new(api));
    (bot, chat)
}

/// Context for `username` as if they had just sent `text`.
pub fn context(bot: &BotHandle, username: &str, text: &str) -> CommandContext {
    bot.context_for(&chat_message(username, text))
}
