//! CSV export of the selected rows

use crate::error::ExportError;
use crate::infer::ParamDefMap;
use crate::model::{Row, Value, FROM_UID, UID};
use std::io::Write;

/// `uid`, `from_uid`, then the remaining columns in display order.
pub fn export_columns(defs: &ParamDefMap) -> Vec<String> {
    let mut cols = vec![UID.to_string(), FROM_UID.to_string()];
    cols.extend(
        defs.names()
            .iter()
            .filter(|c| c.as_str() != UID && c.as_str() != FROM_UID)
            .cloned(),
    );
    cols
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        // Numbers print as the shortest text that parses back to the same f64.
        Some(v) => v.to_string(),
    }
}

/// Write `rows` as CSV with a header line. Returns the number of data rows.
pub fn write_csv<W: Write>(rows: &[Row], columns: &[String], delimiter: char, writer: W) -> Result<usize, ExportError> {
    if !delimiter.is_ascii() {
        return Err(ExportError::InvalidDelimiter(delimiter));
    }
    let mut out = csv::WriterBuilder::new()
        .delimiter(delimiter as u8)
        .from_writer(writer);
    out.write_record(columns)?;
    for row in rows {
        out.write_record(columns.iter().map(|c| cell(row.get(c))))?;
    }
    out.flush()?;
    tracing::info!("Exported {} rows x {} columns", rows.len(), columns.len());
    Ok(rows.len())
}

/// Default file name for an export taken at `now`.
pub fn export_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("hyperview-{}.csv", now.format("%Y%m%d-%H%M%S"))
}
