use std::path::PathBuf;

/// Excel refuses to detect UTF-8 in a CSV without this.
pub const UTF8_BOM: &str = "\u{feff}";

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Builds a complete CSV document: BOM, header row, then data rows.
pub fn csv_document(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = String::from(UTF8_BOM);
    out.push_str(
        &headers
            .iter()
            .map(|h| csv_quote(h))
            .collect::<Vec<_>>()
            .join(","),
    );
    out.push('\n');
    for row in rows {
        out.push_str(
            &row.iter()
                .map(|c| csv_quote(c))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push('\n');
    }
    out
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Wraps report markup in the minimal Word-compatible HTML shell that Word
/// will open from a `.doc` extension. Layout fidelity is the template's
/// problem, not ours.
pub fn doc_document(title: &str, body_html: &str) -> String {
    format!(
        concat!(
            "<html xmlns:o=\"urn:schemas-microsoft-com:office:office\" ",
            "xmlns:w=\"urn:schemas-microsoft-com:office:word\">",
            "<head><meta charset=\"utf-8\"><title>{}</title>",
            "<style>body{{font-family:'TH SarabunPSK','Sarabun',sans-serif;font-size:16pt;}}</style>",
            "</head><body>{}</body></html>"
        ),
        html_escape(title),
        body_html
    )
}

pub fn write_report(path: &str, contents: &str) -> anyhow::Result<()> {
    let out = PathBuf::from(path);
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&out, contents)?;
    Ok(())
}
