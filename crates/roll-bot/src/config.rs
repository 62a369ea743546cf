//! Bot configuration loaded from a config file and environment variables.

use anyhow::{bail, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Chat connection
    #[serde(default)]
    pub irc: IrcConfig,

    /// Channel REST API
    #[serde(default)]
    pub api: ApiConfig,

    /// Bot behaviour
    #[serde(default)]
    pub bot: BotConfig,

    /// Admin web server
    #[serde(default)]
    pub web: WebConfig,

    /// Module record store
    #[serde(default)]
    pub store: StoreConfig,

    /// Module instances to create, in order
    #[serde(default = "default_modules")]
    pub modules: Vec<ModuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IrcConfig {
    /// Chat server (`host:port`)
    #[serde(default = "default_irc_address")]
    pub address: String,

    /// Bot login name
    #[serde(default)]
    pub username: String,

    /// Chat OAuth token, without the `oauth:` prefix
    #[serde(default = "empty_secret")]
    pub oauth: SecretString,

    /// Channel to join
    #[serde(default)]
    pub channel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub url_base: String,

    /// Application client id
    #[serde(default)]
    pub client_id: String,

    /// Operator OAuth token
    #[serde(default = "empty_secret")]
    pub oauth: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Login name that gets admin level
    #[serde(default)]
    pub admin_user: String,

    /// Prefix that marks a chat line as a command
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Deadline for the chat connection to come up
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Admin and RPC listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Record file path
    #[serde(default = "default_store_path")]
    pub path: String,
}

/// One module instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModuleConfig {
    /// Registered module type
    #[serde(rename = "type")]
    pub module_type: String,

    /// Instance name; defaults to the type name
    #[serde(default)]
    pub name: Option<String>,
}

impl ModuleConfig {
    pub fn new(module_type: impl Into<String>) -> Self {
        Self {
            module_type: module_type.into(),
            name: None,
        }
    }

    pub fn instance_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.module_type)
    }
}

// Default implementations
impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            address: default_irc_address(),
            username: String::new(),
            oauth: empty_secret(),
            channel: String::new(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url_base: default_api_url(),
            client_id: String::new(),
            oauth: empty_secret(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            admin_user: String::new(),
            command_prefix: default_command_prefix(),
            log_level: default_log_level(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            irc: IrcConfig::default(),
            api: ApiConfig::default(),
            bot: BotConfig::default(),
            web: WebConfig::default(),
            store: StoreConfig::default(),
            modules: default_modules(),
        }
    }
}

// Default value functions
fn default_irc_address() -> String {
    "irc.chat.twitch.tv:6667".into()
}

fn default_api_url() -> String {
    "https://api.twitch.tv/kraken".into()
}

fn default_command_prefix() -> String {
    "!".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".into()
}

fn default_store_path() -> String {
    "bot.db".into()
}

fn default_modules() -> Vec<ModuleConfig> {
    ["alert", "game", "giveaway", "marathon", "simplecmd"]
        .into_iter()
        .map(ModuleConfig::new)
        .collect()
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

impl Config {
    /// Load configuration from `path` (if it exists) overlaid with
    /// `ROLL__SECTION__KEY` environment variables.
    pub fn load(path: &Path) -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("ROLL")
                    .prefix_separator("__")
                    .separator("__")
                    // OAuth tokens and ids stay strings.
                    .try_parsing(false),
            )
            .build()
            .with_context(|| format!("Failed to build configuration from {:?}", path))?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Check the settings needed to talk to the real chat and API services.
    pub fn validate(&self) -> Result<()> {
        if self.irc.username.is_empty() {
            bail!("irc.username is not set");
        }
        if self.irc.oauth.expose_secret().is_empty() {
            bail!("irc.oauth is not set");
        }
        if self.irc.channel.is_empty() {
            bail!("irc.channel is not set");
        }
        if self.api.client_id.is_empty() {
            bail!("api.client_id is not set");
        }
        Ok(())
    }
}
