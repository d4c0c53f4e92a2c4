use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::session::SessionStore;
use crate::sync::{
    RemoteClient, DEFAULT_BACKOFF_MS, DEFAULT_RETRIES, DEFAULT_TIMEOUT_SECS,
};
use serde_json::json;
use std::path::PathBuf;

fn sanitized_user(state: &AppState) -> Option<serde_json::Value> {
    let mut user = state.session.load()?;
    if let Some(map) = user.as_object_mut() {
        map.remove("password");
        map.remove("token");
    }
    Some(user)
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "backendUrl": state.client.as_ref().map(|c| c.endpoint().to_string()),
            "user": sanitized_user(state),
        }),
    )
}

fn handle_backend_configure(state: &mut AppState, req: &Request) -> serde_json::Value {
    let url = match required_str(&req.params, "url") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return err(&req.id, "bad_params", "url must be http(s)", None);
    }

    let retries = req
        .params
        .get("retries")
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
        .unwrap_or(DEFAULT_RETRIES);
    let timeout_secs = req
        .params
        .get("timeoutSecs")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let backoff_ms = req
        .params
        .get("backoffMs")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_BACKOFF_MS);

    if let Some(session_path) = optional_str(&req.params, "sessionPath") {
        state.session = SessionStore::new(PathBuf::from(session_path));
    }

    match RemoteClient::new(
        url.clone(),
        retries,
        timeout_secs,
        backoff_ms,
        Box::new(state.session.clone()),
    ) {
        Ok(client) => {
            state.client = Some(client);
            tracing::info!(%url, retries, "backend configured");
            ok(&req.id, json!({ "backendUrl": url }))
        }
        Err(e) => err(&req.id, "backend_configure_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "backend.configure" => Some(handle_backend_configure(state, req)),
        _ => None,
    }
}
