//! Canned chat responses managed over RPC.

use super::{Module, ModuleFactory};
use crate::bot::BotHandle;
use crate::commands::{FnHandler, DEFAULT_LEVEL};
use crate::context::CommandContext;
use crate::error::{CommandError, ModuleError, RpcError};
use crate::rpc::{parse_params, require_admin, to_result, RequestOrigin, RpcService};
use async_trait::async_trait;
use module_store::{Bucket, Record};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

pub const MODULE_TYPE: &str = "simplecmd";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleCommand {
    #[serde(default)]
    pub id: u64,
    pub command: String,
    pub response: String,
}

impl Record for SimpleCommand {
    const KIND: &'static str = "simple_command";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

pub struct SimpleCmdFactory;

#[async_trait]
impl ModuleFactory for SimpleCmdFactory {
    async fn create(&self, bot: BotHandle, bucket: Bucket) -> anyhow::Result<Box<dyn Module>> {
        let service = Arc::new(SimpleCmdService {
            bot,
            bucket,
            active: Mutex::new(HashMap::new()),
            write_lock: AsyncMutex::new(()),
        });

        let stored: Vec<SimpleCommand> = service.bucket.all().await?;
        for cmd in &stored {
            if let Err(e) = service.activate(cmd) {
                warn!(command = %cmd.command, "Skipping stored command: {}", e);
            }
        }
        info!("Loaded {} simple commands", service.active.lock().len());

        Ok(Box::new(SimpleCmdModule { service }))
    }
}

pub struct SimpleCmdModule {
    service: Arc<SimpleCmdService>,
}

#[async_trait]
impl Module for SimpleCmdModule {
    async fn start(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    fn rpc_service(&self) -> Option<Arc<dyn RpcService>> {
        Some(self.service.clone())
    }
}

/// RPC methods: `New`, `Update` and `Del` (admin), `Get`, `All`.
///
/// Also owns the chat registrations; `active` maps record id to the command
/// name registered for it. Mutations hold `write_lock` so the stored name and
/// the registered name change together.
pub struct SimpleCmdService {
    bot: BotHandle,
    bucket: Bucket,
    active: Mutex<HashMap<u64, String>>,
    write_lock: AsyncMutex<()>,
}

impl SimpleCmdService {
    /// Register `cmd` as a chat command. The handler reads the response from
    /// storage on every call, so response edits apply immediately.
    fn register(&self, cmd: &SimpleCommand) -> Result<(), CommandError> {
        let bucket = self.bucket.clone();
        let id = cmd.id;

        self.bot.add_command(
            cmd.command.clone(),
            "Simple Command",
            FnHandler::new(move |ctx: CommandContext, _args| {
                let bucket = bucket.clone();
                async move {
                    let cmd: SimpleCommand = bucket.one(id).await?;
                    ctx.say(&cmd.response).await
                }
            }),
            DEFAULT_LEVEL,
        )
    }

    fn activate(&self, cmd: &SimpleCommand) -> Result<(), CommandError> {
        self.register(cmd)?;
        self.active.lock().insert(cmd.id, cmd.command.clone());
        Ok(())
    }

    fn deactivate(&self, id: u64) {
        if let Some(name) = self.active.lock().remove(&id) {
            self.bot.remove_command(&name);
        }
    }

    async fn create(&self, mut cmd: SimpleCommand) -> Result<Value, RpcError> {
        validate(&cmd)?;
        let _guard = self.write_lock.lock().await;
        cmd.id = 0;
        self.bucket.save(&mut cmd).await?;

        if let Err(e) = self.activate(&cmd) {
            self.bucket.delete::<SimpleCommand>(cmd.id).await?;
            return Err(e.into());
        }
        info!(id = cmd.id, command = %cmd.command, "Added simple command");
        to_result(&cmd.id)
    }

    async fn update(&self, mut cmd: SimpleCommand) -> Result<Value, RpcError> {
        validate(&cmd)?;
        let _guard = self.write_lock.lock().await;
        let old: SimpleCommand = self.bucket.one(cmd.id).await?;

        if old.command == cmd.command {
            self.bucket.save(&mut cmd).await?;
            return to_result(&cmd.id);
        }

        // The new name is claimed before anything is saved; the old one is
        // released only once the record holds the new name.
        self.register(&cmd)?;
        if let Err(e) = self.bucket.save(&mut cmd).await {
            self.bot.remove_command(&cmd.command);
            return Err(e.into());
        }
        let previous = self.active.lock().insert(cmd.id, cmd.command.clone());
        if let Some(name) = previous {
            self.bot.remove_command(&name);
        }
        info!(id = cmd.id, from = %old.command, to = %cmd.command, "Renamed simple command");
        to_result(&cmd.id)
    }

    async fn delete(&self, id: u64) -> Result<Value, RpcError> {
        let _guard = self.write_lock.lock().await;
        let cmd: SimpleCommand = self.bucket.one(id).await?;
        self.bucket.delete::<SimpleCommand>(id).await?;
        self.deactivate(id);
        info!(id, command = %cmd.command, "Deleted simple command");
        to_result(&id)
    }
}

fn validate(cmd: &SimpleCommand) -> Result<(), RpcError> {
    if cmd.command.is_empty() || cmd.command.contains(char::is_whitespace) {
        return Err(RpcError::InvalidParams(format!(
            "invalid command name {:?}",
            cmd.command
        )));
    }
    Ok(())
}

#[async_trait]
impl RpcService for SimpleCmdService {
    async fn call(
        &self,
        origin: &RequestOrigin,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        match method {
            "New" => {
                require_admin(&self.bot, origin)?;
                self.create(parse_params(params)?).await
            }
            "Update" => {
                require_admin(&self.bot, origin)?;
                self.update(parse_params(params)?).await
            }
            "Del" => {
                require_admin(&self.bot, origin)?;
                self.delete(parse_params(params)?).await
            }
            "Get" => {
                let id: u64 = parse_params(params)?;
                to_result(&self.bucket.one::<SimpleCommand>(id).await?)
            }
            "All" => to_result(&self.bucket.all::<SimpleCommand>().await?),
            other => Err(RpcError::UnknownMethod(other.to_string())),
        }
    }
}
