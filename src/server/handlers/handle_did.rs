// DID resolution handlers for the :didOrHandle route family

use crate::server::error::{bad_request, not_found};
use crate::server::{ResolvedDid, ServerState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};

pub async fn handle_resolve_did(
    State(state): State<ServerState>,
    Extension(ResolvedDid(did)): Extension<ResolvedDid>,
) -> Response {
    match state.mirage.resolve_did(&did).await {
        Ok(document) => Json(document).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_get_op_log(
    State(state): State<ServerState>,
    Extension(ResolvedDid(did)): Extension<ResolvedDid>,
) -> Response {
    match state.mirage.op_log(&did).await {
        Ok(entries) if entries.is_empty() => not_found("no plc op log found"),
        Ok(entries) => {
            let ops: Vec<_> = entries.into_iter().map(|entry| entry.operation).collect();
            Json(ops).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn handle_get_audit_log(
    State(state): State<ServerState>,
    Extension(ResolvedDid(did)): Extension<ResolvedDid>,
) -> Response {
    match state.mirage.op_log(&did).await {
        Ok(entries) if entries.is_empty() => not_found("no plc op log found"),
        Ok(entries) => Json(entries).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_get_last_op(
    State(state): State<ServerState>,
    Extension(ResolvedDid(did)): Extension<ResolvedDid>,
) -> Response {
    match state.mirage.last_entry(&did).await {
        Ok(Some(entry)) => Json(entry.operation).into_response(),
        Ok(None) => not_found("no op found"),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_get_plc_data(
    State(state): State<ServerState>,
    Extension(ResolvedDid(did)): Extension<ResolvedDid>,
) -> Response {
    match state.mirage.plc_data(&did).await {
        Ok(Some(data)) => Json(data).into_response(),
        Ok(None) => not_found("no op found"),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_get_service(
    State(state): State<ServerState>,
    Extension(ResolvedDid(did)): Extension<ResolvedDid>,
) -> Response {
    match state.mirage.service_endpoint(&did).await {
        Ok(Some(endpoint)) => endpoint.into_response(),
        Ok(None) => not_found("no op found"),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_get_created_at(
    State(state): State<ServerState>,
    Extension(ResolvedDid(did)): Extension<ResolvedDid>,
) -> Response {
    match state.mirage.created_at(&did).await {
        Ok(Some(created_at)) => created_at.into_response(),
        Ok(None) => bad_request("did not found"),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_export() -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        "this route is not implemented. to export the plc, use https://plc.directory/export",
    )
        .into_response()
}
