//! Request middleware.

use crate::bot::BotHandle;
use crate::error::RpcError;
use crate::rpc::RequestOrigin;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

/// Reject requests that don't carry the bot's own credentials.
pub async fn admin_guard(
    State(bot): State<BotHandle>,
    request: Request,
    next: Next,
) -> Result<Response, RpcError> {
    let origin = RequestOrigin::from_headers(request.headers());
    if !bot.is_admin_request(&origin) {
        warn!(uri = %request.uri(), "Rejected non-admin request");
        return Err(RpcError::AccessDenied);
    }

    Ok(next.run(request).await)
}

/// Which surface a path belongs to, and the module instance for module
/// routes.
fn route_target(path: &str) -> (&'static str, Option<&str>) {
    let mut segments = path.trim_start_matches('/').split('/');
    match segments.next() {
        Some("m") => ("public", segments.next().filter(|s| !s.is_empty())),
        Some("admin") => ("admin", segments.next().filter(|s| !s.is_empty())),
        Some("rpc") => ("rpc", None),
        Some("health") => ("health", None),
        _ => ("other", None),
    }
}

/// Logs each request with its surface and module instance.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let (surface, instance) = route_target(&path);
    let instance = instance.unwrap_or("-").to_string();
    let start = std::time::Instant::now();

    debug!(%method, %path, surface, %instance, "Web request");

    let response = next.run(request).await;
    let elapsed = start.elapsed();
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        warn!(%method, %path, surface, %instance, %status, ?elapsed, "Web request rejected");
    } else {
        debug!(%method, %path, surface, %instance, %status, ?elapsed, "Web request done");
    }

    response
}
