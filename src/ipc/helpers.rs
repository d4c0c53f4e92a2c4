use crate::dates;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::sync::{RemoteClient, SyncError};
use serde_json::{Map, Value};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<SyncError> for HandlerErr {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Backend(message) => Self::new("backend_error", message),
            SyncError::Connectivity(message) => Self::new("network_failed", message),
        }
    }
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// The `record` param as an owned object, ready for encoding and dispatch.
pub fn required_record(params: &Value) -> Result<Map<String, Value>, HandlerErr> {
    params
        .get("record")
        .and_then(|v| v.as_object())
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing record object"))
}

pub fn client<'a>(state: &'a AppState, _req: &Request) -> Result<&'a RemoteClient, HandlerErr> {
    state
        .client
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_backend", "configure a backend first"))
}

/// UI sends ISO dates; the spreadsheet stores Buddhist display strings.
/// Unparseable values are passed through untouched rather than destroyed.
pub fn dates_to_wire(record: &mut Map<String, Value>, fields: &[&str]) {
    for field in fields {
        if let Some(Value::String(s)) = record.get(*field) {
            let converted = dates::to_buddhist(s);
            if !converted.is_empty() {
                record.insert(field.to_string(), Value::String(converted));
            }
        }
    }
}

/// The reverse direction for rows coming back from the backend.
pub fn dates_to_ui(record: &mut Map<String, Value>, fields: &[&str]) {
    for field in fields {
        if let Some(Value::String(s)) = record.get(*field) {
            let converted = dates::to_iso(s);
            if !converted.is_empty() {
                record.insert(field.to_string(), Value::String(converted));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_dates_converted_and_junk_left_alone() {
        let mut record = json!({"birthDate": "2024-03-15", "note": "x", "startDate": "junk"})
            .as_object()
            .cloned()
            .unwrap();
        dates_to_wire(&mut record, &["birthDate", "startDate"]);
        assert_eq!(record["birthDate"], json!("15/03/2567"));
        assert_eq!(record["startDate"], json!("junk"));
        assert_eq!(record["note"], json!("x"));
    }

    #[test]
    fn ui_dates_round_trip() {
        let mut record = json!({"birthDate": "15/03/2567"}).as_object().cloned().unwrap();
        dates_to_ui(&mut record, &["birthDate"]);
        assert_eq!(record["birthDate"], json!("2024-03-15"));
    }
}
