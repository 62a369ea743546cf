//! In-process stand-ins for the chat server and channel API.
//!
//! Used by `--mock` to drive the bot from the console, and by tests.

use async_trait::async_trait;
use irc_client::{ChatMessage, ChatStream, ChatTransport, ChatUser, IrcError};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use twitch_api_client::{ApiError, Channel, ChannelApi, Follow, FollowUser, Follows};

/// Chat transport backed by a channel instead of a socket.
pub struct MemoryTransport {
    sender: mpsc::UnboundedSender<ChatMessage>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ChatMessage>>>,
    joined: Mutex<Vec<String>>,
    said: Mutex<Vec<(String, String)>>,
    echo: bool,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            joined: Mutex::new(Vec::new()),
            said: Mutex::new(Vec::new()),
            echo: false,
        }
    }

    /// Transport that also prints everything the bot says to stdout.
    pub fn echoing() -> Self {
        Self {
            echo: true,
            ..Self::new()
        }
    }

    /// Build a chat message for tests and the console.
    pub fn message(channel: &str, username: &str, text: &str) -> ChatMessage {
        ChatMessage {
            channel: channel.to_string(),
            user: ChatUser::new(username),
            text: text.to_string(),
            tags: HashMap::new(),
        }
    }

    /// Deliver a message to the connected bot.
    pub fn push(&self, message: ChatMessage) {
        if self.sender.send(message).is_err() {
            warn!("Memory transport closed; message dropped");
        }
    }

    /// Channels joined so far.
    pub fn joined(&self) -> Vec<String> {
        self.joined.lock().clone()
    }

    /// Texts said so far, in order.
    pub fn said(&self) -> Vec<String> {
        self.said.lock().iter().map(|(_, text)| text.clone()).collect()
    }

    /// Forget everything said so far.
    pub fn clear(&self) {
        self.said.lock().clear();
    }
}

#[async_trait]
impl ChatTransport for MemoryTransport {
    fn join(&self, channel: &str) {
        self.joined
            .lock()
            .push(channel.trim_start_matches('#').to_lowercase());
    }

    async fn connect(&self) -> Result<ChatStream, IrcError> {
        let mut receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(IrcError::ConnectionClosed)?;

        Ok(Box::pin(async_stream::stream! {
            while let Some(message) = receiver.recv().await {
                yield message;
            }
        }))
    }

    async fn say(&self, channel: &str, text: &str) -> Result<(), IrcError> {
        if self.echo {
            println!("#{} <bot> {}", channel, text);
        }
        self.said.lock().push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

/// Feed stdin lines into `transport` as chat from `username` until stdin
/// closes or `shutdown` fires.
pub async fn run_console(
    transport: std::sync::Arc<MemoryTransport>,
    channel: String,
    username: String,
    shutdown: CancellationToken,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!(%channel, %username, "Console chat ready");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            line = lines.next_line() => {
                let text = match line {
                    Ok(Some(text)) => text,
                    Ok(None) => {
                        info!("Console stdin closed");
                        break;
                    }
                    Err(e) => {
                        warn!("Console read error: {}", e);
                        break;
                    }
                };
                if text.trim().is_empty() {
                    continue;
                }
                transport.push(MemoryTransport::message(&channel, &username, &text));
            }
        }
    }
}

/// Channel API that keeps channel state in memory.
pub struct MockChannelApi {
    channel: Mutex<Channel>,
    followers: Mutex<Vec<Follow>>,
}

impl MockChannelApi {
    pub fn new(name: &str) -> Self {
        Self {
            channel: Mutex::new(Channel {
                id: 1,
                name: name.to_string(),
                display_name: name.to_string(),
                game: String::new(),
                status: String::new(),
            }),
            followers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_game(self, game: &str) -> Self {
        self.channel.lock().game = game.to_string();
        self
    }

    pub fn add_follower(&self, user_id: i64, name: &str) {
        self.followers.lock().push(Follow {
            user: FollowUser {
                id: user_id,
                name: name.to_string(),
                display_name: name.to_string(),
            },
        });
    }

    /// Current game.
    pub fn game(&self) -> String {
        self.channel.lock().game.clone()
    }
}

#[async_trait]
impl ChannelApi for MockChannelApi {
    async fn get_channel(&self) -> Result<Channel, ApiError> {
        Ok(self.channel.lock().clone())
    }

    async fn set_channel_game(&self, channel: &str, game: &str) -> Result<(), ApiError> {
        let mut state = self.channel.lock();
        if channel != state.name && channel != state.id.to_string() {
            return Err(ApiError::Api {
                status: 404,
                message: format!("no channel {}", channel),
            });
        }
        state.game = game.to_string();
        Ok(())
    }

    async fn get_channel_follows(&self, _channel: &str) -> Result<Follows, ApiError> {
        let follows = self.followers.lock().clone();
        Ok(Follows {
            total: follows.len() as u64,
            follows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_memory_transport_delivers_and_records() {
        let transport = MemoryTransport::new();
        transport.join("#TestChan");
        let mut stream = transport.connect().await.unwrap();

        transport.push(MemoryTransport::message("testchan", "rush", "!game"));
        let message = stream.next().await.unwrap();
        assert_eq!(message.text, "!game");

        transport.say("testchan", "The game is Mega Man 1.").await.unwrap();
        assert_eq!(transport.joined(), vec!["testchan"]);
        assert_eq!(transport.said(), vec!["The game is Mega Man 1."]);
    }

    #[tokio::test]
    async fn test_memory_transport_connects_once() {
        let transport = MemoryTransport::new();
        let _stream = transport.connect().await.unwrap();
        assert!(matches!(
            transport.connect().await,
            Err(IrcError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_mock_api_sets_game_by_name_or_id() {
        let api = MockChannelApi::new("testchan").with_game("Mega Man 1");
        assert_eq!(api.get_channel().await.unwrap().game, "Mega Man 1");

        api.set_channel_game("testchan", "Mega Man 2").await.unwrap();
        assert_eq!(api.game(), "Mega Man 2");

        api.set_channel_game("1", "Mega Man 3").await.unwrap();
        assert_eq!(api.game(), "Mega Man 3");

        assert!(api.set_channel_game("other", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_api_follows() {
        let api = MockChannelApi::new("testchan");
        api.add_follower(7, "rush");

        let follows = api.get_channel_follows("testchan").await.unwrap();
        assert!(follows.contains(7));
        assert!(!follows.contains(8));
    }
}
