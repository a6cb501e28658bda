// Name index lookups: handle for a DID and DID for a handle

use crate::ident::{validate_did, validate_handle};
use crate::server::error::{bad_request, not_found};
use crate::server::ServerState;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
};

pub async fn handle_get_handle_from_did(
    State(state): State<ServerState>,
    Path(did): Path<String>,
) -> Response {
    if validate_did(&did).is_err() {
        return bad_request("invalid did");
    }

    match state.mirage.handle_for_did(&did).await {
        Ok(Some(handle)) => handle.into_response(),
        Ok(None) => not_found("did not found"),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_get_did_from_handle(
    State(state): State<ServerState>,
    Path(handle): Path<String>,
) -> Response {
    if validate_handle(&handle).is_err() {
        return bad_request("invalid handle");
    }

    match state.mirage.did_for_handle(&handle).await {
        Ok(Some(did)) => did.into_response(),
        Ok(None) => {
            not_found("handle not found in cache. it may exist, but we are not tracking it")
        }
        Err(e) => e.into_response(),
    }
}
