use crate::dates;
use crate::encode::{encode_payload, EncodePlan};
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    client, dates_to_ui, required_record, required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::normalize::normalize_array;
use serde_json::{json, Map, Value};
use uuid::Uuid;

const PLAN: EncodePlan = EncodePlan {
    file_fields: &[],
    array_file_fields: &["attachments"],
    data_uri_fields: &[],
};

const DATE_FIELDS: &[&str] = &["submittedDate", "reviewedDate"];

fn normalize_row(row: Value) -> Value {
    let Value::Object(mut map) = row else {
        return row;
    };
    if let Some(v) = map.get("attachments") {
        map.insert("attachments".to_string(), Value::Array(normalize_array(v)));
    }
    dates_to_ui(&mut map, DATE_FIELDS);
    Value::Object(map)
}

fn list_plans(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let client = client(state, req)?;
    let mut payload = Map::new();
    if let Some(term) = req.params.get("term").and_then(|v| v.as_str()) {
        payload.insert("term".to_string(), json!(term));
    }
    let data = client.send("listAcademicPlans", payload)?;
    let records: Vec<Value> = normalize_array(&data).into_iter().map(normalize_row).collect();
    Ok(json!({ "records": records }))
}

fn submit_plan(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let mut record = required_record(&req.params)?;
    let client = client(state, req)?;

    if !record.contains_key("id") {
        record.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
    }
    // A fresh submission always enters review as pending, whatever the UI
    // happened to send.
    record.insert("status".to_string(), json!("pending"));
    let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
    record.insert(
        "submittedDate".to_string(),
        json!(dates::to_buddhist(&today)),
    );

    encode_payload(&mut record, &PLAN)
        .map_err(|e| HandlerErr::new("file_read_failed", e.to_string()))?;
    Ok(client.send("addAcademicPlan", record)?)
}

fn review_plan(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let id = required_str(&req.params, "id")?;
    let decision = required_str(&req.params, "decision")?;
    if decision != "approved" && decision != "rejected" {
        return Err(HandlerErr::bad_params(
            "decision must be approved or rejected",
        ));
    }
    let client = client(state, req)?;

    let mut payload = Map::new();
    payload.insert("id".to_string(), json!(id));
    payload.insert("status".to_string(), json!(decision));
    if let Some(comment) = req.params.get("comment").and_then(|v| v.as_str()) {
        payload.insert("comment".to_string(), json!(comment));
    }
    let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
    payload.insert(
        "reviewedDate".to_string(),
        json!(dates::to_buddhist(&today)),
    );
    // The backend rejects a review of anything not pending; its message is
    // surfaced verbatim.
    Ok(client.send("reviewAcademicPlan", payload)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "academic.listPlans" => list_plans(state, req),
        "academic.submitPlan" => submit_plan(state, req),
        "academic.reviewPlan" => review_plan(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
