//! HTTP request handlers.

use super::types::{HealthResponse, RpcRequest, RpcResponse};
use super::WebState;
use crate::error::RpcError;
use crate::rpc::RequestOrigin;
use axum::{extract::State, http::HeaderMap, Json};
use tracing::{debug, warn};

/// Health check endpoint.
pub async fn health(State(state): State<WebState>) -> Json<HealthResponse> {
    let mut services: Vec<String> = state.services.keys().cloned().collect();
    services.sort();

    Json(HealthResponse {
        status: "ok".to_string(),
        channel: state.bot.channel().to_string(),
        commands: state.bot.commands().len(),
        services,
    })
}

/// Dispatch `<instance>.<Method>` to the instance's RPC service.
pub async fn rpc_call(
    State(state): State<WebState>,
    headers: HeaderMap,
    Json(request): Json<RpcRequest>,
) -> Result<Json<RpcResponse>, RpcError> {
    let (instance, method) = request
        .method
        .split_once('.')
        .ok_or_else(|| RpcError::UnknownMethod(request.method.clone()))?;

    let service = state
        .services
        .get(instance)
        .ok_or_else(|| RpcError::UnknownService(instance.to_string()))?;

    let origin = RequestOrigin::from_headers(&headers);
    debug!(%instance, %method, "RPC call");

    match service.call(&origin, method, request.params).await {
        Ok(result) => Ok(Json(RpcResponse {
            result,
            error: None,
            id: request.id,
        })),
        Err(e) => {
            warn!(%instance, %method, "RPC call failed: {}", e);
            Err(e)
        }
    }
}
