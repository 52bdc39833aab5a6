//! Tabular export of recorded events.
//!
//! Produces the rows an external exporter or spreadsheet consumes:
//! `Timestamp, Process, PID, Method, RiskLevel, WindowTitle,
//! ExecutablePath`, timestamps formatted as `YYYY-MM-DD HH:MM:SS`.

use crate::config::ExportFormat;
use crate::error::Result;
use crate::event::CaptureEvent;

/// Timestamp format used in exported rows.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column headers for tabular output.
pub const HEADERS: [&str; 7] = [
    "Timestamp",
    "Process",
    "PID",
    "Method",
    "RiskLevel",
    "WindowTitle",
    "ExecutablePath",
];

/// Render events in the given format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render(
    events: &[CaptureEvent],
    format: ExportFormat,
    include_headers: bool,
) -> Result<String> {
    match format {
        ExportFormat::Csv => Ok(to_csv(events, include_headers)),
        ExportFormat::Json => to_json(events),
    }
}

/// Render events as CSV.
#[must_use]
pub fn to_csv(events: &[CaptureEvent], include_headers: bool) -> String {
    let mut out = String::new();
    if include_headers {
        out.push_str(&HEADERS.join(","));
        out.push('\n');
    }
    for event in events {
        let row = [
            event.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            event.process_name.clone(),
            event.pid.to_string(),
            event.method.to_string(),
            event.risk.to_string(),
            event.window_title.clone(),
            event.executable_path.clone(),
        ];
        let escaped: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }
    out
}

/// Render events as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json(events: &[CaptureEvent]) -> Result<String> {
    Ok(serde_json::to_string_pretty(events)?)
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
