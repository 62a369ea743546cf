//! Web request and response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC style request body for `POST /rpc`.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// `<instance>.<Method>`
    pub method: String,

    #[serde(default)]
    pub params: Value,

    #[serde(default)]
    pub id: Value,
}

/// Successful RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub result: Value,
    pub error: Option<String>,
    pub id: Value,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub channel: String,
    pub commands: usize,
    pub services: Vec<String>,
}
