use crate::encode::{encode_payload, EncodePlan};
use crate::ipc::error::ok;
use crate::ipc::helpers::{client, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

/// First-run registration carries the principal's photo and the school logo
/// (which the UI hands over as a data URI drawn from its crop widget).
const REGISTER_PLAN: EncodePlan = EncodePlan {
    file_fields: &["profileImage"],
    array_file_fields: &[],
    data_uri_fields: &["schoolLogo"],
};

fn sanitize(mut user: Value) -> Value {
    if let Some(map) = user.as_object_mut() {
        map.remove("password");
        map.remove("token");
    }
    user
}

fn login(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let username = required_str(&req.params, "username")?;
    let password = required_str(&req.params, "password")?;
    let client = client(state, req)?;

    let mut payload = Map::new();
    payload.insert("username".to_string(), json!(username));
    payload.insert("password".to_string(), json!(password));
    let data = client.send("login", payload)?;

    let mut user = data;
    if let Some(map) = user.as_object_mut() {
        // Accounts from before token issuance authenticate subsequent calls
        // with the password, so it has to live in the session record.
        if map.get("token").and_then(|v| v.as_str()).unwrap_or("").is_empty() {
            map.insert("password".to_string(), json!(password));
        }
    }
    state
        .session
        .save(&user)
        .map_err(|e| HandlerErr::new("session_write_failed", e.to_string()))?;

    Ok(json!({ "user": sanitize(user) }))
}

fn logout(state: &AppState) -> Result<Value, HandlerErr> {
    state
        .session
        .clear()
        .map_err(|e| HandlerErr::new("session_write_failed", e.to_string()))?;
    Ok(json!({ "signedOut": true }))
}

fn current(state: &AppState) -> Value {
    json!({ "user": state.session.load().map(sanitize) })
}

fn check_duplicate(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let email = required_str(&req.params, "email")?;
    let client = client(state, req)?;
    let mut payload = Map::new();
    payload.insert("email".to_string(), json!(email));
    if let Some(id_card) = req.params.get("idCard").and_then(|v| v.as_str()) {
        payload.insert("idCard".to_string(), json!(id_card));
    }
    Ok(client.send("checkDuplicateAndSendOTP", payload)?)
}

fn verify_email(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let email = required_str(&req.params, "email")?;
    let code = required_str(&req.params, "code")?;
    let client = client(state, req)?;
    let mut payload = Map::new();
    payload.insert("email".to_string(), json!(email));
    payload.insert("code".to_string(), json!(code));
    Ok(client.send("verifyEmailCode", payload)?)
}

fn register(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let mut record = req
        .params
        .get("record")
        .and_then(|v| v.as_object())
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing record object"))?;
    let client = client(state, req)?;

    encode_payload(&mut record, &REGISTER_PLAN)
        .map_err(|e| HandlerErr::new("file_read_failed", e.to_string()))?;
    Ok(client.send("addPersonnel", record)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "auth.login" => login(state, req),
        "auth.logout" => logout(state),
        "auth.current" => return Some(ok(&req.id, current(state))),
        "auth.checkDuplicate" => check_duplicate(state, req),
        "auth.verifyEmail" => verify_email(state, req),
        "auth.register" => register(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
