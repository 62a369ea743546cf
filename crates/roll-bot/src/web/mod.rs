//! Admin web server: health, JSON RPC and module routes.

mod handlers;
mod middleware;
mod types;

pub use handlers::*;
pub use middleware::{admin_guard, logging_middleware};
pub use types::*;

use crate::bot::BotHandle;
use crate::modules::Module;
use crate::rpc::RpcService;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Shared web state.
#[derive(Clone)]
pub struct WebState {
    pub bot: BotHandle,
    /// Instance name to RPC service
    pub services: Arc<HashMap<String, Arc<dyn RpcService>>>,
}

/// Build the router for a set of module instances.
pub fn create_router<'a>(
    bot: BotHandle,
    modules: impl IntoIterator<Item = (&'a str, &'a dyn Module)>,
) -> Router {
    let mut services = HashMap::new();
    let mut module_routes = Router::new();

    for (name, module) in modules {
        if let Some(service) = module.rpc_service() {
            debug!(instance = %name, "Mounted RPC service");
            services.insert(name.to_string(), service);
        }
        if let Some(public) = module.public_routes() {
            debug!(instance = %name, "Mounted public routes");
            module_routes = module_routes.nest(&format!("/m/{}", name), public);
        }
        if let Some(admin) = module.admin_routes() {
            debug!(instance = %name, "Mounted admin routes");
            let admin = admin.route_layer(axum_middleware::from_fn_with_state(
                bot.clone(),
                admin_guard,
            ));
            module_routes = module_routes.nest(&format!("/admin/{}", name), admin);
        }
    }

    let state = WebState {
        bot,
        services: Arc::new(services),
    };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/rpc", post(handlers::rpc_call))
        .with_state(state)
        .merge(module_routes)
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
}
