//! Command registry and execution engine.

use super::{Command, CommandHandler};
use crate::error::CommandError;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Maps command names to handlers and dispatches command lines.
///
/// Lookups clone the command out of the map, so the lock is never held
/// while a handler runs and handlers may add or remove commands themselves.
pub struct CommandEngine<C: Send + 'static> {
    commands: RwLock<HashMap<String, Arc<Command<C>>>>,
}

impl<C: Send + 'static> Default for CommandEngine<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + 'static> CommandEngine<C> {
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
        }
    }

    /// Register a command. Fails if the name is taken.
    pub fn add(
        &self,
        name: impl Into<String>,
        help: impl Into<String>,
        handler: impl CommandHandler<C> + 'static,
        min_level: i32,
    ) -> Result<(), CommandError> {
        let name = name.into();
        let mut commands = self.commands.write();

        if commands.contains_key(&name) {
            return Err(CommandError::DuplicateCommand(name));
        }

        debug!(command = %name, min_level, "Registered command");
        commands.insert(
            name.clone(),
            Arc::new(Command {
                name,
                help: help.into(),
                min_level,
                handler: Arc::new(handler),
            }),
        );
        Ok(())
    }

    /// Unregister a command. Returns whether it was present.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.commands.write().remove(name).is_some();
        if removed {
            debug!(command = %name, "Removed command");
        }
        removed
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<Command<C>>, CommandError> {
        self.commands
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }

    /// Run `name` with `args` for a caller at `level`.
    #[instrument(skip(self, ctx, args), fields(args = args.len()))]
    pub async fn exec(
        &self,
        ctx: C,
        level: i32,
        name: &str,
        args: Vec<String>,
    ) -> Result<(), CommandError> {
        let command = self.lookup(name)?;

        if level < command.min_level {
            return Err(CommandError::InsufficientPrivilege {
                level,
                required: command.min_level,
            });
        }

        command.handler.execute(ctx, args).await
    }

    /// Split `line` on whitespace and run it as `name args...`.
    pub async fn exec_string(&self, ctx: C, level: i32, line: &str) -> Result<(), CommandError> {
        let mut words = line.split_whitespace().map(String::from);
        let name = words.next().ok_or(CommandError::EmptyCommand)?;
        self.exec(ctx, level, &name, words.collect()).await
    }

    /// Like [`exec_string`](Self::exec_string) but for callers that hold an
    /// untyped context. Fails with `ContextTypeMismatch` when it is not a `C`.
    pub async fn exec_any(
        &self,
        ctx: Box<dyn Any + Send>,
        level: i32,
        line: &str,
    ) -> Result<(), CommandError> {
        let ctx = ctx
            .downcast::<C>()
            .map_err(|_| CommandError::ContextTypeMismatch {
                expected: std::any::type_name::<C>(),
            })?;
        self.exec_string(*ctx, level, line).await
    }
}
