//! Common test utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use irc_client::{ChatStream, ChatTransport, IrcError};
use module_store::Store;
use roll_bot::mock::{MemoryTransport, MockChannelApi};
use roll_bot::{Bot, BotSettings, ModuleRegistry};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

pub const CHANNEL: &str = "testchan";
pub const ADMIN: &str = "konkers";
pub const CLIENT_ID: &str = "test-client-id";
pub const API_TOKEN: &str = "api-token";

pub fn test_settings() -> BotSettings {
    BotSettings {
        channel: CHANNEL.into(),
        admin_user: ADMIN.into(),
        command_prefix: "!".into(),
        client_id: CLIENT_ID.into(),
        api_oauth: SecretString::new(API_TOKEN.into()),
        listen_addr: "127.0.0.1:0".into(),
        connect_timeout: Duration::from_millis(200),
    }
}

/// A bot with every built-in module type registered, over a memory
/// transport and an in-memory channel.
pub fn test_bot() -> (Bot, Arc<MemoryTransport>, Arc<MockChannelApi>) {
    let chat = Arc::new(MemoryTransport::new());
    let api = Arc::new(MockChannelApi::new(CHANNEL).with_game("Mega Man 1"));
    let bot = bot_with(chat.clone(), api.clone());
    (bot, chat, api)
}

pub fn bot_with(chat: Arc<dyn ChatTransport>, api: Arc<MockChannelApi>) -> Bot {
    let registry = Arc::new(ModuleRegistry::builtin().unwrap());
    Bot::new(test_settings(), registry, Store::memory(), chat, api)
}

/// Wait until `chat` has said at least `count` lines.
pub async fn wait_for_said(chat: &MemoryTransport, count: usize) -> Vec<String> {
    for _ in 0..200 {
        let said = chat.said();
        if said.len() >= count {
            return said;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} lines, got {:?}", count, chat.said());
}

/// Transport whose connect never completes.
pub struct HangingTransport;

#[async_trait]
impl ChatTransport for HangingTransport {
    fn join(&self, _channel: &str) {}

    async fn connect(&self) -> Result<ChatStream, IrcError> {
        futures::future::pending().await
    }

    async fn say(&self, _channel: &str, _text: &str) -> Result<(), IrcError> {
        Err(IrcError::NotConnected)
    }
}

/// Transport whose login is always rejected.
pub struct RejectingTransport;

#[async_trait]
impl ChatTransport for RejectingTransport {
    fn join(&self, _channel: &str) {}

    async fn connect(&self) -> Result<ChatStream, IrcError> {
        Err(IrcError::LoginFailed("Login authentication failed".into()))
    }

    async fn say(&self, _channel: &str, _text: &str) -> Result<(), IrcError> {
        Err(IrcError::NotConnected)
    }
}
