//! Output formatting for tool results.
//!
//! `json` returns structured rows only; `table` additionally renders an
//! ASCII grid (like the MySQL CLI) or, for writes, a one-line summary.

use crate::models::{ColumnMetadata, InsertedId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Widest a rendered cell may be, in terminal columns.
pub const MAX_CELL_WIDTH: usize = 50;

const ELLIPSIS: &str = "...";

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON rows (default)
    #[default]
    Json,
    /// Fixed-width ASCII grid
    Table,
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Cut `text` to at most [`MAX_CELL_WIDTH`] columns, marking the cut with `...`.
///
/// Newlines and tabs are flattened to spaces so a cell stays on one line.
pub fn truncate_cell(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
        .collect();
    if flat.width() <= MAX_CELL_WIDTH {
        return flat;
    }

    let budget = MAX_CELL_WIDTH - ELLIPSIS.len();
    let mut out = String::new();
    let mut used = 0;
    for c in flat.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push_str(ELLIPSIS);
    out
}

/// Pad to a display width; `format!` width counts chars, not columns.
fn pad(text: &str, width: usize, right_align: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(text.width()));
    if right_align {
        format!("{}{}", fill, text)
    } else {
        format!("{}{}", text, fill)
    }
}

/// Render rows as an ASCII grid.
pub fn format_as_table(
    columns: &[ColumnMetadata],
    rows: &[serde_json::Map<String, JsonValue>],
    elapsed_ms: u64,
) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let header_cells: Vec<String> = columns.iter().map(|c| truncate_cell(&c.name)).collect();
    let body: Vec<Vec<(String, bool)>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|col| {
                    let value = row.get(&col.name).unwrap_or(&JsonValue::Null);
                    (
                        truncate_cell(&format_value(value)),
                        matches!(value, JsonValue::Number(_)),
                    )
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = header_cells.iter().map(|h| h.width()).collect();
    for cells in &body {
        for (i, (cell, _)) in cells.iter().enumerate() {
            widths[i] = widths[i].max(cell.width());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = String::new();
    output.push_str(&separator);
    let header: String = header_cells
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("| {} ", pad(name, *w, false)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for cells in &body {
        let line: String = cells
            .iter()
            .zip(&widths)
            .map(|((cell, numeric), w)| format!("| {} ", pad(cell, *w, *numeric)))
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }
    output.push_str(&separator);

    let row_text = if rows.len() == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        rows.len(),
        row_text,
        elapsed_ms as f64 / 1000.0
    ));

    output
}

/// One-line summary for a write.
pub fn format_write_summary(
    changes: u64,
    last_insert_id: Option<InsertedId>,
    elapsed_ms: u64,
) -> String {
    let row_text = if changes == 1 { "row" } else { "rows" };
    let mut summary = format!(
        "Query OK, {} {} affected ({:.2} sec)",
        changes,
        row_text,
        elapsed_ms as f64 / 1000.0
    );
    if let Some(id) = last_insert_id {
        summary.push_str(&format!(", last insert id {}", id));
    }
    summary
}
