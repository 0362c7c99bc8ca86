//! Grouped box-drawn table rendering.
//!
//! Renders any sequence of same-shape records as a fixed-width table drawn
//! with Unicode box characters. Rows can be grouped by one column; the
//! grouped column comes first and only shows its value on the first row of
//! each group.
//!
//! Widths are measured after stripping ANSI escape sequences, so colored
//! cells line up with plain ones.

use std::borrow::Cow;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid ANSI regex"));

/// Box-drawing characters used for borders.
mod glyph {
    pub const HORIZONTAL: &str = "─";
    pub const VERTICAL: &str = "│";
    pub const TOP_LEFT: &str = "┌";
    pub const TOP_MIDDLE: &str = "┬";
    pub const TOP_RIGHT: &str = "┐";
    pub const LEFT_MIDDLE: &str = "├";
    pub const CROSS: &str = "┼";
    pub const RIGHT_MIDDLE: &str = "┤";
    pub const BOTTOM_LEFT: &str = "└";
    pub const BOTTOM_MIDDLE: &str = "┴";
    pub const BOTTOM_RIGHT: &str = "┘";
}

/// Row data the renderer cannot lay out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Cannot render a table without rows")]
    Empty,

    #[error("Row {row} is missing column '{column}'")]
    MissingField { row: usize, column: String },

    #[error("Row {row} is not a record")]
    NotARecord { row: usize },

    #[error("Failed to serialize row {row}: {message}")]
    Serialize { row: usize, message: String },
}

/// Removes ANSI escape sequences from `text`.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(text, "")
}

/// Printed width of `text`: characters left after stripping escapes.
pub fn display_width(text: &str) -> usize {
    strip_ansi(text).chars().count()
}

/// Column names of the first row, in field order.
pub fn infer_columns<T: Serialize>(rows: &[T]) -> Result<Vec<String>, ShapeError> {
    let first = rows.first().ok_or(ShapeError::Empty)?;
    let record = to_record(0, first)?;
    Ok(record.keys().cloned().collect())
}

/// Renders `rows` using `columns`, optionally grouped by `group_key`.
///
/// # Example
///
/// ```
/// use declscope::export::table::render_table;
/// use serde_json::json;
///
/// let rows = vec![
///     json!({"module": "App", "name": "Foo"}),
///     json!({"module": "App", "name": "Bar"}),
/// ];
/// let table = render_table(&rows, &["name", "module"], Some("module")).unwrap();
/// assert_eq!(table.lines().count(), 6);
/// ```
pub fn render_table<T: Serialize>(
    rows: &[T],
    columns: &[&str],
    group_key: Option<&str>,
) -> Result<String, ShapeError> {
    let mut renderer = TableRenderer::new(columns.iter().copied());
    if let Some(key) = group_key {
        renderer = renderer.grouped_by(key);
    }
    renderer.render(rows)
}

/// Table layout settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRenderer {
    columns: Vec<String>,
    group_key: Option<String>,
}

impl TableRenderer {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            group_key: None,
        }
    }

    /// Group rows by `key`, which becomes the first column.
    pub fn grouped_by(mut self, key: impl Into<String>) -> Self {
        self.group_key = Some(key.into());
        self
    }

    /// Displayed columns: the group key first, then the rest in order.
    pub fn display_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::with_capacity(self.columns.len() + 1);
        if let Some(key) = &self.group_key {
            columns.push(key);
        }
        columns.extend(
            self.columns
                .iter()
                .map(String::as_str)
                .filter(|c| Some(*c) != self.group_key.as_deref()),
        );
        columns
    }

    pub fn render<T: Serialize>(&self, rows: &[T]) -> Result<String, ShapeError> {
        if rows.is_empty() {
            return Err(ShapeError::Empty);
        }
        let columns = self.display_columns();
        let cells = collect_cells(rows, &columns)?;
        let widths = column_widths(&columns, &cells);

        let mut groups: IndexMap<&str, Vec<&[String]>> = IndexMap::new();
        for row in &cells {
            let key = match self.group_key {
                Some(_) => row[0].as_str(),
                None => "",
            };
            groups.entry(key).or_default().push(row);
        }

        let mut out = String::new();
        out.push_str(&rule(&widths, glyph::TOP_LEFT, glyph::TOP_MIDDLE, glyph::TOP_RIGHT));
        let header: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        out.push_str(&line(&header, &widths, false));
        out.push_str(&rule(&widths, glyph::LEFT_MIDDLE, glyph::CROSS, glyph::RIGHT_MIDDLE));

        let grouped = self.group_key.is_some();
        for (index, rows) in groups.values().enumerate() {
            for (position, row) in rows.iter().enumerate() {
                out.push_str(&line(row, &widths, grouped && position > 0));
            }
            if index + 1 < groups.len() {
                out.push_str(&rule(&widths, glyph::LEFT_MIDDLE, glyph::CROSS, glyph::RIGHT_MIDDLE));
            }
        }
        out.push_str(&rule(&widths, glyph::BOTTOM_LEFT, glyph::BOTTOM_MIDDLE, glyph::BOTTOM_RIGHT));
        Ok(out)
    }
}

fn to_record<T: Serialize>(row: usize, value: &T) -> Result<Map<String, Value>, ShapeError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ShapeError::NotARecord { row }),
        Err(e) => Err(ShapeError::Serialize {
            row,
            message: e.to_string(),
        }),
    }
}

fn collect_cells<T: Serialize>(rows: &[T], columns: &[&str]) -> Result<Vec<Vec<String>>, ShapeError> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let record = to_record(index, row)?;
            columns
                .iter()
                .map(|column| {
                    record
                        .get(*column)
                        .map(cell_text)
                        .ok_or_else(|| ShapeError::MissingField {
                            row: index,
                            column: column.to_string(),
                        })
                })
                .collect()
        })
        .collect()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn column_widths(columns: &[&str], cells: &[Vec<String>]) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .map(|(i, header)| {
            cells
                .iter()
                .map(|row| display_width(&row[i]))
                .chain(std::iter::once(display_width(header)))
                .max()
                .unwrap_or(0)
        })
        .collect()
}

fn rule(widths: &[usize], left: &str, middle: &str, right: &str) -> String {
    let segments: Vec<String> = widths
        .iter()
        .map(|w| glyph::HORIZONTAL.repeat(w + 2))
        .collect();
    format!("{}{}{}\n", left, segments.join(middle), right)
}

/// One table line. With `blank_first`, the first cell is left empty.
fn line(cells: &[String], widths: &[usize], blank_first: bool) -> String {
    let mut out = String::from(glyph::VERTICAL);
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        let text = if blank_first && i == 0 { "" } else { cell.as_str() };
        let padding = width.saturating_sub(display_width(text));
        out.push(' ');
        out.push_str(text);
        out.push_str(&" ".repeat(padding));
        out.push(' ');
        out.push_str(glyph::VERTICAL);
    }
    out.push('\n');
    out
}
