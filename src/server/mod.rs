// HTTP server exposing the resolver and the name index

mod config;
pub mod error;
mod handlers;

pub use config::ServerConfig;
pub use handlers::ServerState;

use crate::SharedMirage;
use axum::{
    extract::{Path, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// The DID a `:didOrHandle` route was resolved to, injected by the
/// resolution middleware for downstream handlers.
#[derive(Clone)]
pub struct ResolvedDid(pub String);

/// Interceptor for the `:didOrHandle` route family: handlers want a DID,
/// the route accepts either. Handles are resolved through the lookup tier;
/// an unresolvable input short-circuits with 404.
async fn resolve_did_or_handle(
    State(state): State<ServerState>,
    Path(input): Path<String>,
    mut request: Request,
    next: Next,
) -> Response {
    let did = match state.mirage.did_from_did_or_handle(&input).await {
        Ok(Some(did)) => did,
        Ok(None) => return error::not_found("did or handle not found"),
        Err(e) => return e.into_response(),
    };

    request.extensions_mut().insert(ResolvedDid(did));
    next.run(request).await
}

pub fn create_router(mirage: SharedMirage, config: ServerConfig) -> Router {
    let state = ServerState { mirage, config };

    let did_or_handle_routes = Router::new()
        .route("/service/{did_or_handle}", get(handlers::handle_get_service))
        .route("/created/{did_or_handle}", get(handlers::handle_get_created_at))
        .route("/{did_or_handle}", get(handlers::handle_resolve_did))
        .route("/{did_or_handle}/log", get(handlers::handle_get_op_log))
        .route("/{did_or_handle}/log/audit", get(handlers::handle_get_audit_log))
        .route("/{did_or_handle}/log/last", get(handlers::handle_get_last_op))
        .route("/{did_or_handle}/data", get(handlers::handle_get_plc_data))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            resolve_did_or_handle,
        ));

    Router::new()
        .route("/handle/{did}", get(handlers::handle_get_handle_from_did))
        .route("/did/{handle}", get(handlers::handle_get_did_from_handle))
        .route("/export", get(handlers::handle_export))
        .merge(did_or_handle_routes)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}
