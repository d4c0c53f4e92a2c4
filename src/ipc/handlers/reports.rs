use crate::export;
use crate::ipc::error::ok;
use crate::ipc::helpers::{required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn parse_headers(params: &Value) -> Result<Vec<String>, HandlerErr> {
    let Some(headers) = params.get("headers").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing headers array"));
    };
    let headers: Vec<String> = headers
        .iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect();
    if headers.is_empty() {
        return Err(HandlerErr::bad_params("headers must not be empty"));
    }
    Ok(headers)
}

fn parse_rows(params: &Value, width: usize) -> Result<Vec<Vec<String>>, HandlerErr> {
    let Some(rows) = params.get("rows").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing rows array"));
    };
    let mut out = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let Some(cells) = row.as_array() else {
            return Err(HandlerErr {
                code: "bad_params",
                message: "each row must be an array".to_string(),
                details: Some(json!({ "index": i })),
            });
        };
        // Cells arrive as whatever the listing held; stringify scalars,
        // blank out the rest.
        let mut flat: Vec<String> = cells
            .iter()
            .map(|c| match c {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => String::new(),
            })
            .collect();
        flat.resize(width, String::new());
        out.push(flat);
    }
    Ok(out)
}

fn export_csv(req: &Request) -> Result<Value, HandlerErr> {
    let path = required_str(&req.params, "path")?;
    let headers = parse_headers(&req.params)?;
    let rows = parse_rows(&req.params, headers.len())?;

    let header_refs: Vec<&str> = headers.iter().map(|s| s.as_str()).collect();
    let csv = export::csv_document(&header_refs, &rows);
    export::write_report(&path, &csv)
        .map_err(|e| HandlerErr::new("export_failed", e.to_string()))?;
    Ok(json!({ "path": path, "rows": rows.len() }))
}

fn export_doc(req: &Request) -> Result<Value, HandlerErr> {
    let path = required_str(&req.params, "path")?;
    let title = required_str(&req.params, "title")?;
    let body = required_str(&req.params, "bodyHtml")?;

    let html = export::doc_document(&title, &body);
    export::write_report(&path, &html)
        .map_err(|e| HandlerErr::new("export_failed", e.to_string()))?;
    Ok(json!({ "path": path }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let _ = state;
    let resp = match req.method.as_str() {
        "reports.exportCsv" => export_csv(req),
        "reports.exportDoc" => export_doc(req),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
