//! Report generation and persistence.
//!
//! This module flattens a scan's accumulator into report rows, renders them
//! as a grouped table and writes the three report artifacts: `results.json`,
//! `report.json` and `report.txt`.

pub mod json;
pub mod table;
pub mod text;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::analysis::Accumulator;
use self::table::{infer_columns, ShapeError, TableRenderer};

/// Prefix stripped from kinds when building report rows.
pub const DEFAULT_KIND_PREFIX: &str = "source.lang.swift.decl.";

/// Column the rendered table is grouped by unless configured otherwise.
pub const DEFAULT_TABLE_GROUP: &str = "module";

/// Report artifacts written at the end of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Raw accumulator as JSON.
    Results,
    /// Flattened report rows as JSON.
    Report,
    /// Rendered table as text.
    Table,
}

impl ArtifactKind {
    /// All artifacts, in the order they are written.
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::Results, ArtifactKind::Report, ArtifactKind::Table];

    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Results => "results.json",
            ArtifactKind::Report => "report.json",
            ArtifactKind::Table => "report.txt",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Display-oriented projection of one declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub component_type: String,
    pub component_name: String,
    pub module: String,
    pub is_third_party: bool,
}

/// Report settings.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Stripped from kinds to form `componentType`.
    pub kind_prefix: String,
    /// Column the table is grouped by; `None` renders one block.
    pub table_group: Option<String>,
    /// Directory the artifacts are written to.
    pub output_dir: PathBuf,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            kind_prefix: DEFAULT_KIND_PREFIX.to_string(),
            table_group: Some(DEFAULT_TABLE_GROUP.to_string()),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Everything an exporter may need.
#[derive(Debug, Clone, Copy)]
pub struct ReportData<'a> {
    pub accumulator: &'a Accumulator,
    pub rows: &'a [ReportRow],
    /// Rendered table, when rendering succeeded.
    pub table: Option<&'a str>,
}

impl<'a> ReportData<'a> {
    pub fn new(accumulator: &'a Accumulator, rows: &'a [ReportRow]) -> Self {
        Self {
            accumulator,
            rows,
            table: None,
        }
    }

    pub fn with_table(mut self, table: &'a str) -> Self {
        self.table = Some(table);
        self
    }
}

/// Trait for exporters.
pub trait Exporter {
    /// Export the data to the given writer.
    fn export<W: Write>(&self, data: &ReportData<'_>, writer: &mut W) -> io::Result<()>;
}

/// Export one artifact to a writer.
pub fn export<W: Write>(kind: ArtifactKind, data: &ReportData<'_>, writer: &mut W) -> io::Result<()> {
    match kind {
        ArtifactKind::Results => json::ResultsExporter.export(data, writer),
        ArtifactKind::Report => json::RowsExporter.export(data, writer),
        ArtifactKind::Table => text::TableExporter.export(data, writer),
    }
}

/// Export one artifact to a string.
pub fn export_to_string(kind: ArtifactKind, data: &ReportData<'_>) -> io::Result<String> {
    let mut buffer = Vec::new();
    export(kind, data, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Failure writing one artifact.
#[derive(Error, Debug)]
#[error("Failed to write {}: {source}", .path.display())]
pub struct PersistenceError {
    pub artifact: ArtifactKind,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Which artifacts were written and which failed.
#[derive(Debug, Default)]
pub struct PersistOutcome {
    pub written: Vec<PathBuf>,
    pub failures: Vec<PersistenceError>,
}

impl PersistOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Turns an accumulator into rows, a table and files.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    options: ReportOptions,
}

impl ReportBuilder {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ReportOptions {
        &self.options
    }

    /// Rows in accumulator order: group by group, then insertion order.
    pub fn rows(&self, accumulator: &Accumulator) -> Vec<ReportRow> {
        accumulator
            .records()
            .map(|record| ReportRow {
                component_type: record.kind().short_name(&self.options.kind_prefix).to_string(),
                component_name: record.name().to_string(),
                module: record.module_name().to_string(),
                is_third_party: record.is_third_party(),
            })
            .collect()
    }

    /// Render `rows` as a table grouped by the configured column.
    pub fn render(&self, rows: &[ReportRow]) -> Result<String, ShapeError> {
        let mut renderer = TableRenderer::new(infer_columns(rows)?);
        if let Some(group) = &self.options.table_group {
            renderer = renderer.grouped_by(group.clone());
        }
        renderer.render(rows)
    }

    /// Write every artifact `data` can produce. Each write is independent.
    pub fn persist(&self, data: &ReportData<'_>) -> PersistOutcome {
        let mut outcome = PersistOutcome::default();
        for kind in ArtifactKind::ALL {
            if kind == ArtifactKind::Table && data.table.is_none() {
                continue;
            }
            match self.persist_artifact(kind, data) {
                Ok(path) => {
                    info!("Results written to {}", path.display());
                    outcome.written.push(path);
                }
                Err(e) => {
                    warn!("{}", e);
                    outcome.failures.push(e);
                }
            }
        }
        outcome
    }

    /// Write one artifact into the output directory.
    pub fn persist_artifact(
        &self,
        kind: ArtifactKind,
        data: &ReportData<'_>,
    ) -> Result<PathBuf, PersistenceError> {
        let path = self.options.output_dir.join(kind.file_name());
        write_file(&path, kind, data).map_err(|source| PersistenceError {
            artifact: kind,
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

fn write_file(path: &Path, kind: ArtifactKind, data: &ReportData<'_>) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    export(kind, data, &mut writer)?;
    writer.flush()
}
