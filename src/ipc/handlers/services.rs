use crate::dates::ThaiDate;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    client, dates_to_ui, dates_to_wire, required_record, required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::normalize::normalize_array;
use serde_json::{json, Map, Value};
use uuid::Uuid;

const DATE_FIELDS: &[&str] = &["startDate", "endDate"];

fn normalize_row(row: Value) -> Value {
    let Value::Object(mut map) = row else {
        return row;
    };
    dates_to_ui(&mut map, DATE_FIELDS);
    Value::Object(map)
}

fn list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let client = client(state, req)?;
    let mut payload = Map::new();
    if let Some(facility) = req.params.get("facility").and_then(|v| v.as_str()) {
        payload.insert("facility".to_string(), json!(facility));
    }
    let data = client.send("listServiceRecords", payload)?;
    let records: Vec<Value> = normalize_array(&data).into_iter().map(normalize_row).collect();
    Ok(json!({ "records": records }))
}

fn register(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let mut record = required_record(&req.params)?;
    let client = client(state, req)?;

    for key in ["facility", "purpose", "startDate", "endDate"] {
        if record.get(key).and_then(|v| v.as_str()).unwrap_or("").is_empty() {
            return Err(HandlerErr::bad_params(format!("record.{} is required", key)));
        }
    }
    let start = record.get("startDate").and_then(|v| v.as_str()).unwrap_or("");
    let end = record.get("endDate").and_then(|v| v.as_str()).unwrap_or("");
    let (Some(start), Some(end)) = (ThaiDate::parse_iso(start), ThaiDate::parse_iso(end)) else {
        return Err(HandlerErr::bad_params("dates must be valid YYYY-MM-DD"));
    };
    if (end.year, end.month, end.day) < (start.year, start.month, start.day) {
        return Err(HandlerErr::bad_params("endDate is before startDate"));
    }

    if !record.contains_key("id") {
        record.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
    }
    dates_to_wire(&mut record, DATE_FIELDS);
    Ok(client.send("addServiceRecord", record)?)
}

fn cancel(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let id = required_str(&req.params, "id")?;
    let client = client(state, req)?;
    let mut payload = Map::new();
    payload.insert("id".to_string(), json!(id));
    if let Some(reason) = req.params.get("reason").and_then(|v| v.as_str()) {
        payload.insert("reason".to_string(), json!(reason));
    }
    Ok(client.send("cancelServiceRecord", payload)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "services.list" => list(state, req),
        "services.register" => register(state, req),
        "services.cancel" => cancel(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
