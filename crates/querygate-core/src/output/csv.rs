use std::io::Write;

use crate::error::{QueryGateError, Result};
use crate::execute::ResultSet;

/// Write a result set as RFC 4180 CSV: a header row, then one line per row.
/// NULL cells are written as empty fields.
pub fn write_csv<W: Write>(writer: &mut W, result: &ResultSet) -> Result<()> {
    let header = result
        .columns
        .iter()
        .map(|c| csv_escape(c))
        .collect::<Vec<_>>()
        .join(",");
    write_line(writer, &header, "writing CSV header")?;

    for (idx, row) in result.rows.iter().enumerate() {
        let values: Vec<String> = result
            .columns
            .iter()
            .map(|col| {
                row.get(col)
                    .map(|v| csv_escape(&v.to_field()))
                    .unwrap_or_default()
            })
            .collect();
        write_line(writer, &values.join(","), &format!("writing CSV row {}", idx + 1))?;
    }

    writer.flush().map_err(|e| QueryGateError::Output {
        message: "flushing CSV output".to_string(),
        source: e,
    })
}

/// Render a result set to an in-memory CSV string.
pub fn to_csv_string(result: &ResultSet) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(&mut buf, result)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn write_line<W: Write>(writer: &mut W, line: &str, context: &str) -> Result<()> {
    // RFC 4180 line terminator
    write!(writer, "{}\r\n", line).map_err(|e| QueryGateError::Output {
        message: context.to_string(),
        source: e,
    })
}

/// Escape a string for CSV: quote if it contains comma, quote, or newline.
fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
