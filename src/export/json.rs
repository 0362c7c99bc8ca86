//! JSON export implementation.
//!
//! Writes the raw accumulator (`results.json`) and the flattened report rows
//! (`report.json`) as pretty-printed JSON.

use super::{Exporter, ReportData};
use std::io::{self, Write};

/// Exports the accumulator: grouping key to records, or a flat array.
pub struct ResultsExporter;

/// Exports the flattened report rows.
pub struct RowsExporter;

fn write_pretty<W: Write, T: serde::Serialize + ?Sized>(value: &T, writer: &mut W) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

impl Exporter for ResultsExporter {
    fn export<W: Write>(&self, data: &ReportData<'_>, writer: &mut W) -> io::Result<()> {
        write_pretty(data.accumulator, writer)
    }
}

impl Exporter for RowsExporter {
    fn export<W: Write>(&self, data: &ReportData<'_>, writer: &mut W) -> io::Result<()> {
        write_pretty(data.rows, writer)
    }
}
