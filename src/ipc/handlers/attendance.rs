use crate::dates;
use crate::ipc::error::ok;
use crate::ipc::helpers::{client, dates_to_ui, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::normalize::normalize_array;
use serde_json::{json, Map, Value};

/// Check-in codes mirror the paper register: present, late, leave, absent.
const VALID_CODES: &[&str] = &["มา", "สาย", "ลา", "ขาด"];

fn required_code(params: &Value) -> Result<String, HandlerErr> {
    let code = required_str(params, "code")?;
    if !VALID_CODES.contains(&code.as_str()) {
        return Err(HandlerErr::bad_params(format!(
            "code must be one of: {}",
            VALID_CODES.join(", ")
        )));
    }
    Ok(code)
}

fn required_wire_date(params: &Value) -> Result<String, HandlerErr> {
    let iso = required_str(params, "date")?;
    let wire = dates::to_buddhist(&iso);
    if wire.is_empty() {
        return Err(HandlerErr::bad_params("date must be a valid YYYY-MM-DD"));
    }
    Ok(wire)
}

fn check_in(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let person_id = required_str(&req.params, "personId")?;
    let code = required_code(&req.params)?;
    let date = required_wire_date(&req.params)?;
    let client = client(state, req)?;

    let mut payload = Map::new();
    payload.insert("personId".to_string(), json!(person_id));
    payload.insert("date".to_string(), json!(date));
    payload.insert("code".to_string(), json!(code));
    if let Some(note) = req.params.get("note").and_then(|v| v.as_str()) {
        payload.insert("note".to_string(), json!(note));
    }
    Ok(client.send("addAttendance", payload)?)
}

fn bulk_check_in(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let code = required_code(&req.params)?;
    let date = required_wire_date(&req.params)?;
    let Some(ids) = req.params.get("personIds").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing personIds"));
    };
    let person_ids: Vec<String> = ids
        .iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect();
    if person_ids.is_empty() {
        return Err(HandlerErr::bad_params("personIds must not be empty"));
    }
    let client = client(state, req)?;

    let mut payload = Map::new();
    payload.insert("personIds".to_string(), json!(person_ids));
    payload.insert("date".to_string(), json!(date));
    payload.insert("code".to_string(), json!(code));
    Ok(client.send("bulkAddAttendance", payload)?)
}

fn valid_month(month: &str) -> bool {
    let Some((year, month)) = month.split_once('-') else {
        return false;
    };
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    month.len() == 2 && matches!(month.parse::<u32>(), Ok(1..=12))
}

fn list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let month = required_str(&req.params, "month")?;
    if !valid_month(&month) {
        return Err(HandlerErr::bad_params("month must be YYYY-MM"));
    }
    let client = client(state, req)?;

    let mut payload = Map::new();
    payload.insert("month".to_string(), json!(month));
    let data = client.send("listAttendance", payload)?;

    let rows: Vec<Value> = normalize_array(&data)
        .into_iter()
        .map(|row| {
            let Value::Object(mut map) = row else {
                return row;
            };
            dates_to_ui(&mut map, &["date"]);
            Value::Object(map)
        })
        .collect();
    Ok(json!({ "month": month, "rows": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "attendance.checkIn" => check_in(state, req),
        "attendance.bulkCheckIn" => bulk_check_in(state, req),
        "attendance.list" => list(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
