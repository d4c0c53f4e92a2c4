use crate::dates;
use crate::dates::BUDDHIST_ERA_OFFSET;
use crate::encode::{encode_payload, EncodePlan};
use crate::export;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    client, dates_to_ui, required_record, required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::normalize::normalize_array;
use chrono::Datelike;
use serde_json::{json, Map, Value};
use uuid::Uuid;

const PLAN: EncodePlan = EncodePlan {
    file_fields: &[],
    array_file_fields: &["quotations"],
    data_uri_fields: &[],
};

const DATE_FIELDS: &[&str] = &["requestedDate", "reviewedDate"];

fn normalize_row(row: Value) -> Value {
    let Value::Object(mut map) = row else {
        return row;
    };
    if let Some(v) = map.get("quotations") {
        map.insert("quotations".to_string(), Value::Array(normalize_array(v)));
    }
    dates_to_ui(&mut map, DATE_FIELDS);
    Value::Object(map)
}

/// Procurement memos are referenced by a Buddhist-year document number.
/// The UI may carry one over from a draft; otherwise we mint one here so
/// the number exists before the backend ever sees the record.
fn document_number() -> String {
    let buddhist_year = chrono::Local::now().year() + BUDDHIST_ERA_OFFSET;
    let suffix = Uuid::new_v4().simple().to_string();
    format!("พด.{}-{}", buddhist_year, &suffix[..8])
}

fn list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let client = client(state, req)?;
    let mut payload = Map::new();
    if let Some(status) = req.params.get("status").and_then(|v| v.as_str()) {
        payload.insert("status".to_string(), json!(status));
    }
    let data = client.send("listSupplyRequests", payload)?;
    let records: Vec<Value> = normalize_array(&data).into_iter().map(normalize_row).collect();
    Ok(json!({ "records": records }))
}

fn parse_items(record: &Map<String, Value>) -> Result<Vec<Value>, HandlerErr> {
    let Some(items) = record.get("items").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing record.items"));
    };
    if items.is_empty() {
        return Err(HandlerErr::bad_params("record.items must not be empty"));
    }
    for (i, item) in items.iter().enumerate() {
        let name = item.get("name").and_then(|v| v.as_str()).unwrap_or("");
        let quantity = item.get("quantity").and_then(|v| v.as_f64()).unwrap_or(0.0);
        if name.is_empty() || quantity <= 0.0 {
            return Err(HandlerErr {
                code: "bad_params",
                message: "each item needs a name and a positive quantity".to_string(),
                details: Some(json!({ "index": i })),
            });
        }
    }
    Ok(items.clone())
}

fn item_total(items: &[Value]) -> f64 {
    items
        .iter()
        .map(|item| {
            let quantity = item.get("quantity").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let unit_price = item.get("unitPrice").and_then(|v| v.as_f64()).unwrap_or(0.0);
            quantity * unit_price
        })
        .sum()
}

fn request(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let mut record = required_record(&req.params)?;
    let client = client(state, req)?;

    let items = parse_items(&record)?;
    record.insert("totalAmount".to_string(), json!(item_total(&items)));
    record.insert("status".to_string(), json!("pending"));
    if record
        .get("documentNumber")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .is_empty()
    {
        record.insert("documentNumber".to_string(), json!(document_number()));
    }
    if !record.contains_key("id") {
        record.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
    }
    let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
    record.insert(
        "requestedDate".to_string(),
        json!(dates::to_buddhist(&today)),
    );

    encode_payload(&mut record, &PLAN)
        .map_err(|e| HandlerErr::new("file_read_failed", e.to_string()))?;
    Ok(client.send("addSupplyRequest", record)?)
}

fn review(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
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
    Ok(client.send("reviewSupplyRequest", payload)?)
}

/// Renders the procurement memo the way the office prints it: a government
/// memo header, the request summary, and an item table. Layout fidelity is
/// left to the Word template the office keeps.
fn memo_html(record: &Map<String, Value>) -> String {
    let field = |key: &str| -> String {
        export::html_escape(record.get(key).and_then(|v| v.as_str()).unwrap_or("-"))
    };
    let items = record
        .get("items")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut rows = String::new();
    for (i, item) in items.iter().enumerate() {
        let name = export::html_escape(item.get("name").and_then(|v| v.as_str()).unwrap_or("-"));
        let quantity = item.get("quantity").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let unit = export::html_escape(item.get("unit").and_then(|v| v.as_str()).unwrap_or("-"));
        let unit_price = item.get("unitPrice").and_then(|v| v.as_f64()).unwrap_or(0.0);
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td></tr>",
            i + 1,
            name,
            quantity,
            unit,
            unit_price,
            quantity * unit_price
        ));
    }
    let total = item_total(&items);

    format!(
        concat!(
            "<p style=\"text-align:center\"><b>บันทึกข้อความ</b></p>",
            "<p>ที่ {} วันที่ {}</p>",
            "<p>เรื่อง ขออนุมัติจัดซื้อจัดจ้าง</p>",
            "<p>เรียน ผู้อำนวยการโรงเรียน</p>",
            "<p>ด้วย {} มีความประสงค์ขอจัดซื้อรายการดังต่อไปนี้</p>",
            "<table border=\"1\" cellspacing=\"0\" cellpadding=\"4\" width=\"100%\">",
            "<tr><th>ที่</th><th>รายการ</th><th>จำนวน</th><th>หน่วย</th>",
            "<th>ราคาต่อหน่วย</th><th>รวม</th></tr>",
            "{}",
            "<tr><td colspan=\"5\" style=\"text-align:right\"><b>รวมทั้งสิ้น</b></td>",
            "<td><b>{:.2}</b></td></tr>",
            "</table>",
            "<p>จึงเรียนมาเพื่อโปรดพิจารณาอนุมัติ</p>",
            "<p style=\"text-align:right\">ลงชื่อ ................................ ผู้ขอ<br>({})</p>"
        ),
        field("documentNumber"),
        field("requestedDate"),
        field("requesterName"),
        rows,
        total,
        field("requesterName"),
    )
}

fn export_doc(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let _ = state;
    let record = required_record(&req.params)?;
    let path = required_str(&req.params, "path")?;

    let title = record
        .get("documentNumber")
        .and_then(|v| v.as_str())
        .unwrap_or("บันทึกข้อความ");
    let html = export::doc_document(title, &memo_html(&record));
    export::write_report(&path, &html)
        .map_err(|e| HandlerErr::new("export_failed", e.to_string()))?;
    Ok(json!({ "path": path }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "supply.list" => list(state, req),
        "supply.request" => request(state, req),
        "supply.review" => review(state, req),
        "supply.exportDoc" => export_doc(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
