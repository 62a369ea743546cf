//! Error types for the bot.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use irc_client::IrcError;
use module_store::StoreError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use twitch_api_client::ApiError;

/// Errors from registering or executing commands.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("command {0} already registered")]
    DuplicateCommand(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("user level {level} not >= {required}")]
    InsufficientPrivilege { level: i32, required: i32 },

    #[error("empty command")]
    EmptyCommand,

    #[error("context is not a {expected}")]
    ContextTypeMismatch { expected: &'static str },

    #[error("chat error: {0}")]
    Chat(#[from] IrcError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Failed(String),
}

/// Errors raised by modules and the module factory registry.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("module type {0} registered more than once")]
    DuplicateFactory(String),

    #[error("module already started")]
    AlreadyStarted,

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Failed(String),
}

/// Errors from building and connecting the bot.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("module type {0} not found")]
    UnknownModuleType(String),

    #[error("module named {0} already registered")]
    DuplicateModuleInstance(String),

    #[error("can't instantiate module {module_type}: {source}")]
    ModuleConstruction {
        module_type: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("can't start web server on {addr}: {source}")]
    WebListener {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("chat connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("can't connect to chat: {0}")]
    TransportConnect(#[from] IrcError),

    #[error("can't start module {name}: {source}")]
    ModuleStart {
        name: String,
        #[source]
        source: ModuleError,
    },

    #[error("bot already connected")]
    AlreadyConnected,
}

/// Errors returned to RPC and admin web callers.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("access denied")]
    AccessDenied,

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl RpcError {
    /// Status code and machine-readable code for this error.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            RpcError::AccessDenied => (StatusCode::FORBIDDEN, "ACCESS_DENIED"),
            RpcError::UnknownService(_) | RpcError::UnknownMethod(_) => {
                (StatusCode::NOT_FOUND, "METHOD_NOT_FOUND")
            }
            RpcError::InvalidParams(_) => (StatusCode::BAD_REQUEST, "INVALID_PARAMS"),
            RpcError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            RpcError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            RpcError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            RpcError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for RpcError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => RpcError::NotFound(e.to_string()),
            other => RpcError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::InvalidParams(e.to_string())
    }
}

impl From<CommandError> for RpcError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::DuplicateCommand(_) => RpcError::Conflict(e.to_string()),
            other => RpcError::Internal(other.to_string()),
        }
    }
}

/// Top-level application error.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Bot error: {0}")]
    Bot(#[from] BotError),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

/// Result type alias for application errors.
pub type AppResult<T> = Result<T, AppError>;
