//! Channel API HTTP client.

use crate::error::ApiError;
use crate::types::*;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const ACCEPT_V5: &str = "application/vnd.twitchtv.v5+json";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Channel operations the bot depends on.
#[async_trait]
pub trait ChannelApi: Send + Sync {
    /// Channel owned by the API token.
    async fn get_channel(&self) -> Result<Channel, ApiError>;

    /// Set the channel's current game.
    async fn set_channel_game(&self, channel: &str, game: &str) -> Result<(), ApiError>;

    /// Followers of a channel.
    async fn get_channel_follows(&self, channel: &str) -> Result<Follows, ApiError>;
}

/// Twitch channel API client.
///
/// The OAuth token is kept in a `SecretString` so it never shows up in
/// logs or debug output.
#[derive(Clone)]
pub struct TwitchApiClient {
    client: Client,
    url_base: String,
    client_id: String,
    oauth: SecretString,
}

impl TwitchApiClient {
    pub fn new(
        url_base: impl Into<String>,
        client_id: impl Into<String>,
        oauth: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;

        Ok(Self {
            client,
            url_base: url_base.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            oauth: SecretString::new(oauth.into()),
        })
    }

    /// Application client id sent with every request.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Value of the `Authorization` header this client sends.
    pub fn authorization(&self) -> String {
        format!("OAuth {}", self.oauth.expose_secret())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.url_base, path))
            .header("Client-ID", &self.client_id)
            .header("Authorization", self.authorization())
            .header("Accept", ACCEPT_V5)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        if response.status().is_success() {
            let body = response.text().await?;
            debug!(
                "Response body: {}",
                body.chars().take(200).collect::<String>()
            );
            serde_json::from_str(&body).map_err(ApiError::from)
        } else {
            Err(self.extract_error(response).await)
        }
    }

    async fn extract_error(&self, response: reqwest::Response) -> ApiError {
        let status = response.status();

        match status {
            StatusCode::UNAUTHORIZED => {
                warn!("API authentication failed");
                ApiError::Unauthorized
            }
            _ => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".into());
                ApiError::Api {
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }
}

#[async_trait]
impl ChannelApi for TwitchApiClient {
    #[instrument(skip(self))]
    async fn get_channel(&self) -> Result<Channel, ApiError> {
        let response = self
            .request(reqwest::Method::GET, "/channel")
            .send()
            .await?;

        self.handle_response(response).await
    }

    #[instrument(skip(self))]
    async fn set_channel_game(&self, channel: &str, game: &str) -> Result<(), ApiError> {
        let body = ChannelUpdate {
            channel: ChannelUpdateFields { game },
        };
        let response = self
            .request(reqwest::Method::PUT, &format!("/channels/{}", channel))
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            debug!("Channel game updated");
            Ok(())
        } else {
            Err(self.extract_error(response).await)
        }
    }

    #[instrument(skip(self))]
    async fn get_channel_follows(&self, channel: &str) -> Result<Follows, ApiError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/channels/{}/follows", channel),
            )
            .send()
            .await?;

        self.handle_response(response).await
    }
}
