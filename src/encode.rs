use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

/// Images are shrunk to fit this bound and recompressed before upload; the
/// spreadsheet store has a painful per-file overhead.
const MAX_IMAGE_DIMENSION: u32 = 1024;
const JPEG_QUALITY: u8 = 80;

/// Transport shape for an attached file: bare base64, no data-URI prefix.
#[derive(Debug, Clone, Serialize)]
pub struct EncodedFile {
    pub filename: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

/// Declares which fields of an outgoing record carry files, so the encoder
/// never has to guess from value shapes. Undeclared fields are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodePlan {
    /// Fields holding a single local handle or an already-stored URL.
    pub file_fields: &'static [&'static str],
    /// Fields holding a mixed array of local handles and stored URLs.
    pub array_file_fields: &'static [&'static str],
    /// Fields that may hold a raw data-URI string (the school logo) in
    /// addition to a local handle.
    pub data_uri_fields: &'static [&'static str],
}

/// Reads and encodes one local file. An `image/*` file is recompressed to a
/// bounded JPEG; the filename extension and mime are forced accordingly.
/// A file that will not decode as an image (or is not one) is sent as its
/// raw bytes with the original name and mime, so a bad image never fails a
/// submission. Only an unreadable file is an error.
pub fn encode_file(path: &Path) -> anyhow::Result<EncodedFile> {
    let bytes = std::fs::read(path)?;
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file")
        .to_string();
    let mime = mime_for_path(path);

    if mime.starts_with("image/") {
        if let Some(jpeg) = recompress_image(&bytes) {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("image");
            return Ok(EncodedFile {
                filename: format!("{}.jpg", stem),
                mime_type: "image/jpeg".to_string(),
                data: BASE64.encode(&jpeg),
            });
        }
        tracing::debug!(file = %filename, "image recompression failed, sending original bytes");
    }

    Ok(EncodedFile {
        filename,
        mime_type: mime,
        data: BASE64.encode(&bytes),
    })
}

fn recompress_image(bytes: &[u8]) -> Option<Vec<u8>> {
    let img = image::load_from_memory(bytes).ok()?;
    let img = if img.width() > MAX_IMAGE_DIMENSION || img.height() > MAX_IMAGE_DIMENSION {
        img.resize(MAX_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION, FilterType::Triangle)
    } else {
        img
    };
    let rgb = img.to_rgb8();
    let mut out: Vec<u8> = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder.encode_image(&rgb).ok()?;
    Some(out)
}

/// Converts a `data:<mime>;base64,<payload>` string into the transport
/// triple. The payload is taken as-is; a malformed URI yields None.
pub fn encode_data_uri(uri: &str, field: &str) -> Option<EncodedFile> {
    let rest = uri.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?.to_string();
    if mime.is_empty() || data.is_empty() {
        return None;
    }
    let ext = extension_for_mime(&mime);
    Some(EncodedFile {
        filename: format!("{}.{}", field, ext),
        mime_type: mime,
        data: data.to_string(),
    })
}

/// Replaces every declared local handle in `record` with its encoded triple.
/// A local handle is a `{"path": ...}` object from the file picker; strings
/// (stored URLs) and already-encoded objects are left untouched, so mixed
/// arrays of existing and newly attached files work. After this returns Ok,
/// no local handle remains in the declared fields.
pub fn encode_payload(record: &mut Map<String, Value>, plan: &EncodePlan) -> anyhow::Result<()> {
    for field in plan.file_fields {
        if let Some(value) = record.get_mut(*field) {
            if let Some(path) = local_handle_path(value) {
                *value = serde_json::to_value(encode_file(Path::new(&path))?)?;
            }
        }
    }
    for field in plan.array_file_fields {
        if let Some(Value::Array(items)) = record.get_mut(*field) {
            for item in items.iter_mut() {
                if let Some(path) = local_handle_path(item) {
                    *item = serde_json::to_value(encode_file(Path::new(&path))?)?;
                }
            }
        }
    }
    for field in plan.data_uri_fields {
        let Some(value) = record.get_mut(*field) else {
            continue;
        };
        if let Some(path) = local_handle_path(value) {
            *value = serde_json::to_value(encode_file(Path::new(&path))?)?;
            continue;
        }
        if let Some(uri) = value.as_str() {
            if uri.starts_with("data:") {
                if let Some(encoded) = encode_data_uri(uri, field) {
                    *value = serde_json::to_value(encoded)?;
                }
            }
        }
    }
    Ok(())
}

fn local_handle_path(value: &Value) -> Option<String> {
    value
        .as_object()?
        .get("path")?
        .as_str()
        .map(|s| s.to_string())
}

fn mime_for_path(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "csv" => "text/csv",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}
