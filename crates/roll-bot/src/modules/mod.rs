//! Bot modules and the factory registry used to instantiate them.

pub mod alert;
pub mod game;
pub mod giveaway;
pub mod marathon;
pub mod simplecmd;

use crate::bot::BotHandle;
use crate::error::ModuleError;
use crate::rpc::RpcService;
use async_trait::async_trait;
use axum::Router;
use module_store::Bucket;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// An independently started and stopped feature of the bot.
///
/// Construction wires up commands and services; `start` begins background
/// work. The optional capabilities default to `None`.
#[async_trait]
pub trait Module: Send + Sync {
    async fn start(&self) -> Result<(), ModuleError>;

    async fn stop(&self) -> Result<(), ModuleError>;

    /// RPC service reachable as `<instance>.<Method>`.
    fn rpc_service(&self) -> Option<Arc<dyn RpcService>> {
        None
    }

    /// Routes served under `/m/<instance>`.
    fn public_routes(&self) -> Option<Router> {
        None
    }

    /// Routes served under `/admin/<instance>`, admin requests only.
    fn admin_routes(&self) -> Option<Router> {
        None
    }
}

/// Constructor for one module type.
#[async_trait]
pub trait ModuleFactory: Send + Sync {
    /// Build an instance. `bucket` is the instance's private storage.
    async fn create(&self, bot: BotHandle, bucket: Bucket) -> anyhow::Result<Box<dyn Module>>;
}

/// Module type name to factory.
///
/// Filled in before the bot is built and read-only afterwards.
#[derive(Default)]
pub struct ModuleRegistry {
    factories: HashMap<String, Arc<dyn ModuleFactory>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in module type.
    pub fn builtin() -> Result<Self, ModuleError> {
        let mut registry = Self::new();
        registry.register(alert::MODULE_TYPE, alert::AlertFactory)?;
        registry.register(game::MODULE_TYPE, game::GameFactory)?;
        registry.register(giveaway::MODULE_TYPE, giveaway::GiveawayFactory)?;
        registry.register(marathon::MODULE_TYPE, marathon::MarathonFactory)?;
        registry.register(simplecmd::MODULE_TYPE, simplecmd::SimpleCmdFactory)?;
        Ok(registry)
    }

    /// Register a factory. Fails if the type name is taken.
    pub fn register(
        &mut self,
        module_type: impl Into<String>,
        factory: impl ModuleFactory + 'static,
    ) -> Result<(), ModuleError> {
        let module_type = module_type.into();
        if self.factories.contains_key(&module_type) {
            return Err(ModuleError::DuplicateFactory(module_type));
        }

        debug!(module_type = %module_type, "Registered module factory");
        self.factories.insert(module_type, Arc::new(factory));
        Ok(())
    }

    pub fn get(&self, module_type: &str) -> Option<Arc<dyn ModuleFactory>> {
        self.factories.get(module_type).cloned()
    }

    /// Registered type names, sorted.
    pub fn module_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}
