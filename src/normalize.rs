use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Upper bound on unwrap passes in `normalize_image_url`. A safety valve
/// against values that were JSON-encoded more than once upstream; genuine
/// data needs one pass.
const MAX_UNWRAP_PASSES: usize = 5;

fn drive_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/d/([A-Za-z0-9_-]+)").expect("drive path regex"))
}

fn drive_query_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").expect("drive query regex"))
}

/// Coerces a loosely-typed backend field into a list. The spreadsheet
/// backend returns attachment fields as a native array, a JSON-array string
/// (sometimes single-quoted), a bare string, or null depending on how the
/// row was last written. Idempotent, and never fails: malformed input
/// degrades to `[]` or a single-element wrap.
pub fn normalize_array(input: &Value) -> Vec<Value> {
    match input {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        Value::String(s) => normalize_array_str(s),
        _ => Vec::new(),
    }
}

fn normalize_array_str(s: &str) -> Vec<Value> {
    // An empty cell means "no attachments", not one empty attachment;
    // it never takes the wrap-as-opaque route below.
    if s.is_empty() {
        return Vec::new();
    }
    let t = s.trim();
    if t.starts_with('[') && t.ends_with(']') {
        // Rows written by old clients used single quotes. The global
        // replace does not survive quotes embedded inside values; such a
        // string falls through to the opaque-wrap case below.
        let candidate = t.replace('\'', "\"");
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&candidate) {
            return items;
        }
    }
    vec![Value::String(s.to_string())]
}

/// Resolves a stored image reference into something directly embeddable.
///
/// Accepts the same loose shapes as `normalize_array` plus a local file
/// handle (`{"path": ...}`) for not-yet-uploaded picks, which resolves to a
/// `file://` preview URL owned by the caller. Drive share links are
/// rewritten to the thumbnail endpoint. Never fails; unresolvable input
/// yields `""`.
pub fn normalize_image_url(input: &Value) -> String {
    let mut current = input.clone();
    for _ in 0..MAX_UNWRAP_PASSES {
        match current {
            Value::Null => return String::new(),
            Value::Array(items) => {
                current = items.into_iter().next().unwrap_or(Value::Null);
            }
            Value::Object(map) => {
                let Some(path) = map.get("path").and_then(|v| v.as_str()) else {
                    return String::new();
                };
                return format!("file://{}", path);
            }
            Value::String(s) => {
                let t = s.trim();
                if t.len() >= 2
                    && ((t.starts_with('"') && t.ends_with('"'))
                        || (t.starts_with('\'') && t.ends_with('\'')))
                {
                    current = Value::String(t[1..t.len() - 1].to_string());
                    continue;
                }
                if (t.starts_with('[') && t.ends_with(']'))
                    || (t.starts_with('{') && t.ends_with('}'))
                {
                    let candidate = t.replace('\'', "\"");
                    if let Ok(v) = serde_json::from_str::<Value>(&candidate) {
                        current = v;
                        continue;
                    }
                }
                return resolve_image_str(t);
            }
            _ => return String::new(),
        }
    }
    // Bound reached: settle for whatever string is left.
    match current {
        Value::String(s) => resolve_image_str(s.trim()),
        _ => String::new(),
    }
}

fn resolve_image_str(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    if s.starts_with("data:") {
        return s.to_string();
    }
    if let Some(id) = extract_drive_id(s) {
        return format!("https://drive.google.com/thumbnail?id={}&sz=w1000", id);
    }
    s.to_string()
}

/// Pulls a Drive file id out of either share-link shape:
/// path-style `.../d/<id>/...` or query-style `...?id=<id>`.
pub fn extract_drive_id(url: &str) -> Option<String> {
    if let Some(caps) = drive_path_re().captures(url) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = drive_query_re().captures(url) {
        return Some(caps[1].to_string());
    }
    None
}
