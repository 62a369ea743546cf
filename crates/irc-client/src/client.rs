//! Line-oriented IRC client.

use crate::error::IrcError;
use crate::types::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio_stream::Stream;
use tracing::{debug, error, info, instrument, warn};

/// Stream of chat messages from a connected transport.
pub type ChatStream = Pin<Box<dyn Stream<Item = ChatMessage> + Send>>;

/// Chat transport used by the bot.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Queue a channel to join once connected.
    fn join(&self, channel: &str);

    /// Connect and log in. Resolves once the server accepted the login.
    async fn connect(&self) -> Result<ChatStream, IrcError>;

    /// Send a message to a channel.
    async fn say(&self, channel: &str, text: &str) -> Result<(), IrcError>;
}

/// Twitch-flavoured IRC client.
#[derive(Clone)]
pub struct IrcClient {
    inner: Arc<Inner>,
}

struct Inner {
    address: String,
    username: String,
    oauth: SecretString,
    channels: Mutex<Vec<String>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
}

impl IrcClient {
    /// Create a new client. `oauth` is the bare token without the `oauth:` prefix.
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        oauth: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                address: address.into(),
                username: username.into(),
                oauth: SecretString::new(oauth.into()),
                channels: Mutex::new(Vec::new()),
                writer: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Server address (`host:port`).
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    async fn send_raw(&self, line: &str) -> Result<(), IrcError> {
        let mut writer = self.inner.writer.lock().await;
        let writer = writer.as_mut().ok_or(IrcError::NotConnected)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for IrcClient {
    fn join(&self, channel: &str) {
        let channel = channel.trim_start_matches('#').to_lowercase();
        let mut channels = self.inner.channels.lock();
        if !channels.contains(&channel) {
            channels.push(channel);
        }
    }

    #[instrument(skip(self), fields(address = %self.inner.address))]
    async fn connect(&self) -> Result<ChatStream, IrcError> {
        let stream = TcpStream::connect(&self.inner.address).await?;
        let (read_half, write_half) = stream.into_split();
        *self.inner.writer.lock().await = Some(write_half);

        self.send_raw("CAP REQ :twitch.tv/tags twitch.tv/commands")
            .await?;
        self.send_raw(&format!("PASS oauth:{}", self.inner.oauth.expose_secret()))
            .await?;
        self.send_raw(&format!("NICK {}", self.inner.username))
            .await?;

        let mut lines = BufReader::new(read_half).lines();

        // Wait for the welcome numeric.
        loop {
            let Some(raw) = lines.next_line().await? else {
                return Err(IrcError::ConnectionClosed);
            };
            let Some(line) = IrcLine::parse(&raw) else {
                continue;
            };
            match line.command.as_str() {
                "001" => break,
                "PING" => {
                    let token = line.params.last().cloned().unwrap_or_default();
                    self.send_raw(&format!("PONG :{}", token)).await?;
                }
                "NOTICE" => {
                    let text = line.params.last().cloned().unwrap_or_default();
                    if text.contains("authentication failed")
                        || text.contains("Improperly formatted auth")
                    {
                        return Err(IrcError::LoginFailed(text));
                    }
                }
                _ => debug!("Pre-login line: {}", raw),
            }
        }

        info!("Logged in as {}", self.inner.username);

        let channels = self.inner.channels.lock().clone();
        for channel in channels {
            self.send_raw(&format!("JOIN #{}", channel)).await?;
            info!("Joined #{}", channel);
        }

        let client = self.clone();
        let stream = async_stream::stream! {
            loop {
                let raw = match lines.next_line().await {
                    Ok(Some(raw)) => raw,
                    Ok(None) => {
                        warn!("IRC connection closed by server");
                        break;
                    }
                    Err(e) => {
                        error!("IRC read error: {}", e);
                        break;
                    }
                };

                let Some(line) = IrcLine::parse(&raw) else {
                    continue;
                };

                match line.command.as_str() {
                    "PING" => {
                        let token = line.params.last().cloned().unwrap_or_default();
                        if let Err(e) = client.send_raw(&format!("PONG :{}", token)).await {
                            error!("Failed to answer PING: {}", e);
                        }
                    }
                    "PRIVMSG" => {
                        if let Some(message) = ChatMessage::from_line(&line) {
                            debug!("Received: {} from {}",
                                message.text.chars().take(50).collect::<String>(),
                                message.user.username
                            );
                            yield message;
                        }
                    }
                    _ => {}
                }
            }
            client.inner.writer.lock().await.take();
        };

        Ok(Box::pin(stream))
    }

    /// Each line of `text` goes out as its own PRIVMSG.
    #[instrument(skip(self, text))]
    async fn say(&self, channel: &str, text: &str) -> Result<(), IrcError> {
        let channel = channel.trim_start_matches('#');
        for line in text.split(['\r', '\n']).filter(|l| !l.trim().is_empty()) {
            self.send_raw(&format!("PRIVMSG #{} :{}", channel, line))
                .await?;
        }
        debug!("Sent message to #{}", channel);
        Ok(())
    }
}
