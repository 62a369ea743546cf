//! End-to-end tests for the bot lifecycle and chat dispatch.

mod common;

use async_trait::async_trait;
use common::{
    bot_with, test_bot, test_settings, wait_for_said, HangingTransport, RejectingTransport, ADMIN,
    CHANNEL,
};
use module_store::{Bucket, Store};
use roll_bot::config::Config;
use roll_bot::mock::{MemoryTransport, MockChannelApi};
use roll_bot::{Bot, BotError, BotHandle, BotState, Module, ModuleError, ModuleFactory, ModuleRegistry};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn say(chat: &MemoryTransport, user: &str, text: &str) {
    chat.push(MemoryTransport::message(CHANNEL, user, text));
}

#[tokio::test]
async fn test_bot_chat_e2e() {
    let (mut bot, chat, api) = test_bot();

    let config: Config = serde_json::from_value(json!({})).unwrap();
    for module in &config.modules {
        bot.add_module_by_name(&module.module_type, module.instance_name())
            .await
            .unwrap();
    }
    assert_eq!(
        bot.module_names(),
        vec!["alert", "game", "giveaway", "marathon", "simplecmd"]
    );

    bot.connect().await.unwrap();
    assert_eq!(bot.state(), BotState::Running);
    assert_eq!(chat.joined(), vec![CHANNEL]);
    assert!(bot.web_addr().is_some());

    say(&chat, "rush", "!game");
    say(&chat, "rush", "just chatting");
    say(&chat, ADMIN, "!setgame Mega Man 2");
    say(&chat, "rush", "!setgame Mega Man 3");
    say(&chat, "rush", "!unknown");
    say(&chat, "rush", "!game");

    let said = wait_for_said(&chat, 4).await;
    assert_eq!(
        said,
        vec![
            "The game is Mega Man 1.",
            "Game set to Mega Man 2.",
            "user level 0 not >= 10",
            "The game is Mega Man 2.",
        ]
    );
    assert_eq!(api.game(), "Mega Man 2");

    bot.stop().await;
}

#[tokio::test]
async fn test_module_instance_uniqueness() {
    let (mut bot, _chat, _api) = test_bot();

    bot.add_module("game").await.unwrap();

    assert!(matches!(
        bot.add_module("game").await,
        Err(BotError::DuplicateModuleInstance(name)) if name == "game"
    ));
    // A second game instance collides on its chat commands.
    assert!(matches!(
        bot.add_module_by_name("game", "game2").await,
        Err(BotError::ModuleConstruction { module_type, .. }) if module_type == "game"
    ));
    assert!(matches!(
        bot.add_module("nope").await,
        Err(BotError::UnknownModuleType(name)) if name == "nope"
    ));

    assert_eq!(bot.module_names(), vec!["game"]);
}

#[tokio::test]
async fn test_modules_of_one_type_under_two_names() {
    let (mut bot, _chat, _api) = test_bot();

    // Alerts register no chat commands, so two instances coexist with
    // separate storage.
    bot.add_module_by_name("alert", "alerts_a").await.unwrap();
    bot.add_module_by_name("alert", "alerts_b").await.unwrap();

    let alert = json!({"period": "10m", "next_alert": "2030-01-01T00:00:00Z", "message": "hi"});
    bot.rpc("alerts_a", "New", alert).await.unwrap();

    let a = bot.rpc("alerts_a", "All", json!(null)).await.unwrap();
    let b = bot.rpc("alerts_b", "All", json!(null)).await.unwrap();
    assert_eq!(a.as_array().unwrap().len(), 1);
    assert_eq!(b, json!([]));
}

#[tokio::test]
async fn test_connect_timeout() {
    let api = Arc::new(MockChannelApi::new(CHANNEL));
    let mut bot = bot_with(Arc::new(HangingTransport), api);

    let result = bot.connect().await;
    assert!(matches!(result, Err(BotError::ConnectTimeout(_))));
    assert_eq!(bot.state(), BotState::Failed);
    bot.stop().await;
}

#[tokio::test]
async fn test_transport_connect_error() {
    let api = Arc::new(MockChannelApi::new(CHANNEL));
    let mut bot = bot_with(Arc::new(RejectingTransport), api);

    let result = bot.connect().await;
    assert!(matches!(result, Err(BotError::TransportConnect(_))));
    assert_eq!(bot.state(), BotState::Failed);
    assert!(matches!(bot.connect().await, Err(BotError::AlreadyConnected)));
    bot.stop().await;
}

#[tokio::test]
async fn test_web_listener_failure_aborts_before_chat() {
    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut settings = test_settings();
    settings.listen_addr = occupied.local_addr().unwrap().to_string();

    let chat = Arc::new(MemoryTransport::new());
    let mut bot = Bot::new(
        settings,
        Arc::new(ModuleRegistry::builtin().unwrap()),
        Store::memory(),
        chat.clone(),
        Arc::new(MockChannelApi::new(CHANNEL)),
    );

    let result = bot.connect().await;
    assert!(matches!(result, Err(BotError::WebListener { .. })));
    assert!(chat.joined().is_empty());
}

#[tokio::test]
async fn test_add_module_after_connect_rejected() {
    let (mut bot, _chat, _api) = test_bot();
    bot.connect().await.unwrap();

    assert!(matches!(
        bot.add_module("game").await,
        Err(BotError::AlreadyConnected)
    ));
    assert!(matches!(bot.connect().await, Err(BotError::AlreadyConnected)));
    bot.stop().await;
}

struct FlagModule {
    started: Arc<AtomicBool>,
    fail: bool,
}

#[async_trait]
impl Module for FlagModule {
    async fn start(&self) -> Result<(), ModuleError> {
        if self.fail {
            return Err(ModuleError::Failed("no thanks".into()));
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct FlagFactory {
    started: Arc<AtomicBool>,
    fail: bool,
}

#[async_trait]
impl ModuleFactory for FlagFactory {
    async fn create(&self, _bot: BotHandle, _bucket: Bucket) -> anyhow::Result<Box<dyn Module>> {
        Ok(Box::new(FlagModule {
            started: self.started.clone(),
            fail: self.fail,
        }))
    }
}

#[tokio::test]
async fn test_module_start_failure_keeps_started_modules() {
    let started = Arc::new(AtomicBool::new(false));
    let mut registry = ModuleRegistry::new();
    registry
        .register(
            "ok",
            FlagFactory {
                started: started.clone(),
                fail: false,
            },
        )
        .unwrap();
    registry
        .register(
            "broken",
            FlagFactory {
                started: Arc::new(AtomicBool::new(false)),
                fail: true,
            },
        )
        .unwrap();

    let mut bot = Bot::new(
        test_settings(),
        Arc::new(registry),
        Store::memory(),
        Arc::new(MemoryTransport::new()),
        Arc::new(MockChannelApi::new(CHANNEL)),
    );
    // Instances start in name order.
    bot.add_module_by_name("ok", "a_ok").await.unwrap();
    bot.add_module_by_name("broken", "b_broken").await.unwrap();

    let result = bot.connect().await;
    assert!(matches!(
        result,
        Err(BotError::ModuleStart { name, .. }) if name == "b_broken"
    ));
    assert_eq!(bot.state(), BotState::Failed);
    assert!(started.load(Ordering::SeqCst));

    bot.stop().await;
    assert!(!started.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_marathon_over_chat_and_rpc() {
    let (mut bot, chat, api) = test_bot();
    bot.add_module("marathon").await.unwrap();

    let marathon = json!([{
        "name": "Mega Man",
        "games": [
            {"name": "Mega Man 1"},
            {"name": "Mega Man II", "twitch_game": "Mega Man 2"},
        ]
    }]);
    assert_eq!(bot.rpc("marathon", "New", marathon).await.unwrap(), json!(1));

    bot.connect().await.unwrap();
    say(&chat, ADMIN, "!marathon next");
    say(&chat, ADMIN, "!marathon next");
    say(&chat, "rush", "!marathon");

    let said = wait_for_said(&chat, 4).await;
    assert_eq!(
        said,
        vec![
            "Mega Man 1 started!",
            "Mega Man 1 complete!",
            "Mega Man II started!",
            "Current game is: Mega Man II",
        ]
    );
    assert_eq!(api.game(), "Mega Man 2");

    let stored = bot.rpc("marathon", "Get", json!([1])).await.unwrap();
    assert_eq!(stored["games"][0]["status"], "finished");
    assert_eq!(stored["games"][1]["status"], "running");

    bot.stop().await;
}
