use std::path::Path;

use anyhow::Context;

use crate::foundation::error::{VisError, VisResult};

/// Numeric table read from a text file.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Table {
    /// Column names from the header row, when one was requested.
    pub header: Vec<String>,
    /// Rows with their 1-based source line numbers.
    pub rows: Vec<(usize, Vec<f64>)>,
}

/// Read a whitespace/comma separated numeric table.
///
/// `#` comments and blank lines are skipped. With `has_header`, the first remaining line is
/// kept as column names instead of being parsed.
pub(crate) fn read_table(path: &Path, has_header: bool) -> VisResult<Table> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read table '{}'", path.display()))?;
    parse_table(&text, has_header).map_err(|(line, msg)| {
        VisError::format(format!("{}:{line}: {msg}", path.display()))
    })
}

pub(crate) fn parse_table(text: &str, has_header: bool) -> Result<Table, (usize, String)> {
    let mut header = Vec::new();
    let mut rows = Vec::new();
    let mut want_header = has_header;

    for (n, raw) in text.lines().enumerate() {
        let line_no = n + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cells = split_cells(line);
        if want_header {
            header = cells.into_iter().map(str::to_owned).collect();
            want_header = false;
            continue;
        }
        let mut row = Vec::with_capacity(cells.len());
        for cell in cells {
            let v: f64 = cell
                .parse()
                .map_err(|_| (line_no, format!("non-numeric cell '{cell}'")))?;
            row.push(v);
        }
        rows.push((line_no, row));
    }

    Ok(Table { header, rows })
}

fn split_cells(line: &str) -> Vec<&str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/data/ascii.rs"]
mod tests;
