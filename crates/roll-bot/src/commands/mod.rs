//! Chat command registry and dispatch.

mod engine;

pub use engine::CommandEngine;

use crate::error::CommandError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Level of the configured administrator.
pub const ADMIN_LEVEL: i32 = 100;

/// Level of every other chat user.
pub const DEFAULT_LEVEL: i32 = 0;

/// Minimum level of commands that change stream state.
pub const MODERATOR_LEVEL: i32 = 10;

/// Command handler.
///
/// `C` is the execution context the owning engine is built for.
#[async_trait]
pub trait CommandHandler<C: Send + 'static>: Send + Sync {
    /// Run the command with the words after the command name.
    async fn execute(&self, ctx: C, args: Vec<String>) -> Result<(), CommandError>;
}

/// Adapter that turns an async closure into a [`CommandHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    pub fn new<C, Fut>(f: F) -> Self
    where
        F: Fn(C, Vec<String>) -> Fut,
        Fut: Future<Output = Result<(), CommandError>>,
    {
        Self(f)
    }
}

#[async_trait]
impl<C, F, Fut> CommandHandler<C> for FnHandler<F>
where
    C: Send + 'static,
    F: Fn(C, Vec<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), CommandError>> + Send + 'static,
{
    async fn execute(&self, ctx: C, args: Vec<String>) -> Result<(), CommandError> {
        (self.0)(ctx, args).await
    }
}

/// A registered command.
pub struct Command<C: Send + 'static> {
    name: String,
    help: String,
    min_level: i32,
    handler: Arc<dyn CommandHandler<C>>,
}

impl<C: Send + 'static> Command<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Help text, display only.
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Lowest caller level allowed to run this command.
    pub fn min_level(&self) -> i32 {
        self.min_level
    }
}

impl<C: Send + 'static> std::fmt::Debug for Command<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("min_level", &self.min_level)
            .finish_non_exhaustive()
    }
}
