use crate::encode::{encode_payload, EncodePlan};
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    client, dates_to_ui, dates_to_wire, required_record, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::normalize::{normalize_array, normalize_image_url};
use serde_json::{json, Map, Value};
use uuid::Uuid;

const PLAN: EncodePlan = EncodePlan {
    file_fields: &["menuImage"],
    array_file_fields: &[],
    data_uri_fields: &[],
};

/// Meal slots of one menu day. Kept as free-text dish lists; nutrition
/// totals are a backend concern.
const MEAL_SLOTS: &[&str] = &["breakfast", "lunch", "snack"];

fn normalize_row(row: Value) -> Value {
    let Value::Object(mut map) = row else {
        return row;
    };
    if let Some(v) = map.get("menuImage") {
        let url = normalize_image_url(v);
        map.insert("menuImage".to_string(), json!(url));
    }
    // Dish lists come back in the same loose shapes as attachments.
    for slot in MEAL_SLOTS {
        if let Some(v) = map.get(*slot) {
            map.insert(slot.to_string(), Value::Array(normalize_array(v)));
        }
    }
    dates_to_ui(&mut map, &["date"]);
    Value::Object(map)
}

fn list_menus(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let client = client(state, req)?;
    let mut payload = Map::new();
    if let Some(week) = req.params.get("week").and_then(|v| v.as_str()) {
        payload.insert("week".to_string(), json!(week));
    }
    let data = client.send("listMealPlans", payload)?;
    let records: Vec<Value> = normalize_array(&data).into_iter().map(normalize_row).collect();
    Ok(json!({ "records": records }))
}

fn save_menu(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let mut record = required_record(&req.params)?;
    let client = client(state, req)?;

    if record.get("date").and_then(|v| v.as_str()).unwrap_or("").is_empty() {
        return Err(HandlerErr::bad_params("record.date is required"));
    }
    if !record.contains_key("id") {
        record.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
    }
    dates_to_wire(&mut record, &["date"]);
    encode_payload(&mut record, &PLAN)
        .map_err(|e| HandlerErr::new("file_read_failed", e.to_string()))?;
    // Upsert keyed on the date; resubmitting a day replaces its menu.
    Ok(client.send("saveMealPlan", record)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "nutrition.listMenus" => list_menus(state, req),
        "nutrition.saveMenu" => save_menu(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
