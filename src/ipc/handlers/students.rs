use crate::encode::{encode_payload, EncodePlan};
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    client, dates_to_ui, dates_to_wire, required_record, required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::normalize::{normalize_array, normalize_image_url};
use serde_json::{json, Map, Value};
use uuid::Uuid;

const PLAN: EncodePlan = EncodePlan {
    file_fields: &["profileImage"],
    array_file_fields: &["documents"],
    data_uri_fields: &[],
};

const DATE_FIELDS: &[&str] = &["birthDate", "enrolledDate"];

fn normalize_row(row: Value) -> Value {
    let Value::Object(mut map) = row else {
        return row;
    };
    if let Some(v) = map.get("profileImage") {
        let url = normalize_image_url(v);
        map.insert("profileImage".to_string(), json!(url));
    }
    if let Some(v) = map.get("documents") {
        map.insert("documents".to_string(), Value::Array(normalize_array(v)));
    }
    dates_to_ui(&mut map, DATE_FIELDS);
    Value::Object(map)
}

fn list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let client = client(state, req)?;
    let mut payload = Map::new();
    // Optional filter: a classroom key like "ป.4/1".
    if let Some(classroom) = req.params.get("classroom").and_then(|v| v.as_str()) {
        payload.insert("classroom".to_string(), json!(classroom));
    }
    let data = client.send("listStudents", payload)?;
    let records: Vec<Value> = normalize_array(&data).into_iter().map(normalize_row).collect();
    Ok(json!({ "records": records }))
}

fn prepare(record: &mut Map<String, Value>) -> Result<(), HandlerErr> {
    if !record.contains_key("id") {
        record.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
    }
    dates_to_wire(record, DATE_FIELDS);
    encode_payload(record, &PLAN)
        .map_err(|e| HandlerErr::new("file_read_failed", e.to_string()))
}

fn add(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let mut record = required_record(&req.params)?;
    let client = client(state, req)?;
    prepare(&mut record)?;
    Ok(client.send("addStudent", record)?)
}

fn update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let mut record = required_record(&req.params)?;
    if record.get("id").and_then(|v| v.as_str()).unwrap_or("").is_empty() {
        return Err(HandlerErr::bad_params("record.id is required for update"));
    }
    let client = client(state, req)?;
    prepare(&mut record)?;
    Ok(client.send("updateStudent", record)?)
}

fn remove(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let id = required_str(&req.params, "id")?;
    let client = client(state, req)?;
    let mut payload = Map::new();
    payload.insert("id".to_string(), json!(id));
    Ok(client.send("deleteStudent", payload)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "students.list" => list(state, req),
        "students.add" => add(state, req),
        "students.update" => update(state, req),
        "students.remove" => remove(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
