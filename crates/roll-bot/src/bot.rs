//! Bot orchestrator: owns the transport, the command engine and the modules.

use crate::commands::{CommandEngine, CommandHandler, ADMIN_LEVEL, DEFAULT_LEVEL};
use crate::config::Config;
use crate::context::CommandContext;
use crate::error::{BotError, CommandError, RpcError};
use crate::modules::{Module, ModuleRegistry};
use crate::rpc::RequestOrigin;
use crate::web;
use irc_client::{ChatMessage, ChatStream, ChatTransport};
use module_store::Store;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use twitch_api_client::ChannelApi;

/// Settings the orchestrator and modules need at runtime.
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Channel to join, without `#`.
    pub channel: String,
    /// Login name that gets [`ADMIN_LEVEL`].
    pub admin_user: String,
    pub command_prefix: String,
    /// Application client id expected in `Client-ID` on admin requests.
    pub client_id: String,
    /// Operator token expected as `Authorization: OAuth <token>`.
    pub api_oauth: SecretString,
    pub listen_addr: String,
    pub connect_timeout: Duration,
}

impl BotSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            channel: config.irc.channel.trim_start_matches('#').to_lowercase(),
            admin_user: config.bot.admin_user.clone(),
            command_prefix: config.bot.command_prefix.clone(),
            client_id: config.api.client_id.clone(),
            api_oauth: config.api.oauth.clone(),
            listen_addr: config.web.listen_addr.clone(),
            connect_timeout: config.bot.connect_timeout,
        }
    }
}

/// Orchestrator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Unconnected,
    TransportConnecting,
    Connected,
    Running,
    Failed,
}

/// Cheap, cloneable view of the bot handed to modules and handlers.
#[derive(Clone)]
pub struct BotHandle {
    inner: Arc<Shared>,
}

struct Shared {
    settings: BotSettings,
    commands: CommandEngine<CommandContext>,
    chat: Arc<dyn ChatTransport>,
    api: Arc<dyn ChannelApi>,
}

impl BotHandle {
    pub fn new(
        settings: BotSettings,
        chat: Arc<dyn ChatTransport>,
        api: Arc<dyn ChannelApi>,
    ) -> Self {
        Self {
            inner: Arc::new(Shared {
                settings,
                commands: CommandEngine::new(),
                chat,
                api,
            }),
        }
    }

    pub fn settings(&self) -> &BotSettings {
        &self.inner.settings
    }

    pub fn channel(&self) -> &str {
        &self.inner.settings.channel
    }

    pub fn commands(&self) -> &CommandEngine<CommandContext> {
        &self.inner.commands
    }

    pub fn chat(&self) -> Arc<dyn ChatTransport> {
        self.inner.chat.clone()
    }

    pub fn api(&self) -> Arc<dyn ChannelApi> {
        self.inner.api.clone()
    }

    /// Register a chat command.
    pub fn add_command(
        &self,
        name: impl Into<String>,
        help: impl Into<String>,
        handler: impl CommandHandler<CommandContext> + 'static,
        min_level: i32,
    ) -> Result<(), CommandError> {
        self.inner.commands.add(name, help, handler, min_level)
    }

    /// Unregister a chat command. Absent names are ignored.
    pub fn remove_command(&self, name: &str) -> bool {
        self.inner.commands.remove(name)
    }

    /// Say `text` in the bot's channel.
    pub async fn say(&self, text: &str) -> Result<(), CommandError> {
        self.inner.chat.say(self.channel(), text).await?;
        Ok(())
    }

    /// Privilege level of a chat user.
    pub fn user_level(&self, username: &str) -> i32 {
        let admin = &self.inner.settings.admin_user;
        if !admin.is_empty() && username == admin {
            ADMIN_LEVEL
        } else {
            DEFAULT_LEVEL
        }
    }

    /// Whether a request may use admin-only RPC methods and routes.
    ///
    /// Internal calls always qualify. Remote calls need `Client-ID` equal to
    /// the configured client id and `Authorization` equal to
    /// `OAuth <operator token>`; a missing header never matches.
    pub fn is_admin_request(&self, origin: &RequestOrigin) -> bool {
        match origin {
            RequestOrigin::Internal => true,
            RequestOrigin::Remote {
                client_id,
                authorization,
            } => {
                let settings = &self.inner.settings;
                let expected_auth = format!("OAuth {}", settings.api_oauth.expose_secret());
                client_id.as_deref() == Some(settings.client_id.as_str())
                    && authorization.as_deref() == Some(expected_auth.as_str())
            }
        }
    }

    /// Build the execution context for one inbound message.
    pub fn context_for(&self, message: &ChatMessage) -> CommandContext {
        CommandContext {
            bot: self.clone(),
            channel: message.channel.clone(),
            user: message.user.clone(),
            message: message.clone(),
            level: self.user_level(&message.user.username),
            chat: self.chat(),
            api: self.api(),
        }
    }

    /// Dispatch one inbound chat line.
    ///
    /// Lines without the command prefix are ignored. Failures are logged;
    /// privilege failures are also answered in chat. The result is returned
    /// for callers that want it.
    pub async fn handle_message(&self, message: ChatMessage) -> Result<(), CommandError> {
        let Some(line) = message
            .text
            .strip_prefix(self.inner.settings.command_prefix.as_str())
        else {
            return Ok(());
        };

        let ctx = self.context_for(&message);
        let level = ctx.level;
        let result = self.inner.commands.exec_string(ctx, level, line).await;

        match &result {
            Ok(()) => {
                debug!(user = %message.user.username, "Executed {:?}", message.text);
            }
            Err(CommandError::UnknownCommand(name)) => {
                debug!(command = %name, "Ignoring unknown command");
            }
            Err(e @ CommandError::InsufficientPrivilege { .. }) => {
                warn!(user = %message.user.username, "Can't exec {:?}: {}", message.text, e);
                if let Err(say_err) = self.inner.chat.say(&message.channel, &e.to_string()).await {
                    error!("Failed to send reply: {}", say_err);
                }
            }
            Err(e) => {
                warn!(user = %message.user.username, "Can't exec {:?}: {}", message.text, e);
            }
        }

        result
    }
}

/// The bot: module instances plus the transport and web server they use.
pub struct Bot {
    handle: BotHandle,
    registry: Arc<ModuleRegistry>,
    store: Store,
    modules: BTreeMap<String, Box<dyn Module>>,
    state: BotState,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    web_addr: Option<SocketAddr>,
}

impl Bot {
    pub fn new(
        settings: BotSettings,
        registry: Arc<ModuleRegistry>,
        store: Store,
        chat: Arc<dyn ChatTransport>,
        api: Arc<dyn ChannelApi>,
    ) -> Self {
        Self {
            handle: BotHandle::new(settings, chat, api),
            registry,
            store,
            modules: BTreeMap::new(),
            state: BotState::Unconnected,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
            web_addr: None,
        }
    }

    pub fn handle(&self) -> &BotHandle {
        &self.handle
    }

    pub fn state(&self) -> BotState {
        self.state
    }

    /// Bound address of the web server once connected.
    pub fn web_addr(&self) -> Option<SocketAddr> {
        self.web_addr
    }

    /// Instance names, sorted.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    pub fn module(&self, name: &str) -> Option<&dyn Module> {
        self.modules.get(name).map(|m| m.as_ref())
    }

    /// Instantiate a module under its type name.
    pub async fn add_module(&mut self, module_type: &str) -> Result<(), BotError> {
        self.add_module_by_name(module_type, module_type).await
    }

    /// Instantiate `module_type` as `name`, with storage keyed by `name`.
    pub async fn add_module_by_name(
        &mut self,
        module_type: &str,
        name: &str,
    ) -> Result<(), BotError> {
        if self.state != BotState::Unconnected {
            return Err(BotError::AlreadyConnected);
        }

        let factory = self
            .registry
            .get(module_type)
            .ok_or_else(|| BotError::UnknownModuleType(module_type.to_string()))?;

        if self.modules.contains_key(name) {
            return Err(BotError::DuplicateModuleInstance(name.to_string()));
        }

        let module = factory
            .create(self.handle.clone(), self.store.bucket(name))
            .await
            .map_err(|source| BotError::ModuleConstruction {
                module_type: module_type.to_string(),
                source,
            })?;

        info!(module_type, instance = name, "Added module");
        self.modules.insert(name.to_string(), module);
        Ok(())
    }

    /// Web router for the current module set.
    pub fn router(&self) -> axum::Router {
        web::create_router(
            self.handle.clone(),
            self.modules.iter().map(|(name, m)| (name.as_str(), m.as_ref())),
        )
    }

    /// Call a module's RPC service from inside the process.
    pub async fn rpc(&self, instance: &str, method: &str, params: Value) -> Result<Value, RpcError> {
        let service = self
            .modules
            .get(instance)
            .and_then(|m| m.rpc_service())
            .ok_or_else(|| RpcError::UnknownService(instance.to_string()))?;
        service.call(&RequestOrigin::Internal, method, params).await
    }

    /// Start the web server, connect to chat, start every module and begin
    /// serving chat commands.
    pub async fn connect(&mut self) -> Result<(), BotError> {
        if self.state != BotState::Unconnected {
            return Err(BotError::AlreadyConnected);
        }

        let result = self.try_connect().await;
        if result.is_err() {
            self.state = BotState::Failed;
        }
        result
    }

    async fn try_connect(&mut self) -> Result<(), BotError> {
        self.start_web_server().await?;

        self.state = BotState::TransportConnecting;
        let chat = self.handle.chat();
        chat.join(self.handle.channel());

        let timeout = self.handle.settings().connect_timeout;
        let stream = match tokio::time::timeout(timeout, chat.connect()).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("Can't connect to chat: {}", e);
                return Err(BotError::TransportConnect(e));
            }
            Err(_) => {
                error!("Chat connect timed out after {:?}", timeout);
                return Err(BotError::ConnectTimeout(timeout));
            }
        };
        self.state = BotState::Connected;
        info!(channel = %self.handle.channel(), "Connected to chat");

        // Modules started before a failure keep running.
        for (name, module) in &self.modules {
            module.start().await.map_err(|source| {
                error!(instance = %name, "Module failed to start: {}", source);
                BotError::ModuleStart {
                    name: name.clone(),
                    source,
                }
            })?;
            debug!(instance = %name, "Started module");
        }

        self.tasks.push(spawn_dispatch_loop(
            self.handle.clone(),
            stream,
            self.shutdown.child_token(),
        ));

        self.state = BotState::Running;
        info!("Bot running with {} modules", self.modules.len());
        Ok(())
    }

    async fn start_web_server(&mut self) -> Result<(), BotError> {
        let addr = self.handle.settings().listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| BotError::WebListener {
                addr: addr.clone(),
                source,
            })?;
        self.web_addr = listener.local_addr().ok();
        info!("Web server listening on {}", addr);

        let router = self.router();
        let shutdown = self.shutdown.child_token();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                error!("Web server error: {}", e);
            }
        }));
        Ok(())
    }

    /// Stop every module, the dispatch loop and the web server.
    pub async fn stop(&mut self) {
        for (name, module) in &self.modules {
            if let Err(e) = module.stop().await {
                warn!(instance = %name, "Module failed to stop: {}", e);
            }
        }

        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("Bot stopped");
    }
}

/// Process chat lines one at a time, in delivery order.
fn spawn_dispatch_loop(
    bot: BotHandle,
    mut stream: ChatStream,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("Dispatch loop shutting down");
                    break;
                }

                message = stream.next() => {
                    let Some(message) = message else {
                        warn!("Chat stream ended");
                        break;
                    };
                    let _ = bot.handle_message(message).await;
                }
            }
        }
    })
}
