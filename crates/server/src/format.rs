//! Inline rendering of tabular results as JSON, CSV, or Markdown.

use serde_json::Value;

use gangway_core::OutputFormat;

use crate::executor::TableData;

/// Render a table in the requested format.
pub fn format_table(data: &TableData, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(data),
        OutputFormat::Csv => format_csv(data),
        OutputFormat::Markdown => format_markdown(data),
    }
}

/// JSON array of row objects keyed by column name.
fn format_json(data: &TableData) -> String {
    let rows: Vec<Value> = data
        .rows
        .iter()
        .map(|row| {
            let mut object = serde_json::Map::new();
            for (column, value) in data.columns.iter().zip(row.iter()) {
                object.insert(column.clone(), value.clone());
            }
            Value::Object(object)
        })
        .collect();
    serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
}

fn format_csv(data: &TableData) -> String {
    let mut out = String::new();
    out.push_str(
        &data
            .columns
            .iter()
            .map(|c| csv_field(c))
            .collect::<Vec<_>>()
            .join(","),
    );
    out.push('\n');
    for row in &data.rows {
        out.push_str(
            &row.iter()
                .map(|v| csv_field(&display_value(v)))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push('\n');
    }
    out
}

fn format_markdown(data: &TableData) -> String {
    let mut out = String::new();
    out.push_str("| ");
    out.push_str(
        &data
            .columns
            .iter()
            .map(|c| markdown_cell(c))
            .collect::<Vec<_>>()
            .join(" | "),
    );
    out.push_str(" |\n| ");
    out.push_str(&vec!["---"; data.columns.len()].join(" | "));
    out.push_str(" |\n");
    for row in &data.rows {
        out.push_str("| ");
        out.push_str(
            &row.iter()
                .map(|v| markdown_cell(&display_value(v)))
                .collect::<Vec<_>>()
                .join(" | "),
        );
        out.push_str(" |\n");
    }
    out
}

/// Flatten a JSON value to display text. Nulls render empty; nested
/// values keep their JSON form.
fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Quote a CSV field when it carries a delimiter, quote, or newline.
fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn markdown_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace('\n', " ")
}
