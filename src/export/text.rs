//! Plain-text export of the rendered table (`report.txt`).

use super::{Exporter, ReportData};
use std::io::{self, Write};

/// Writes the rendered table verbatim.
pub struct TableExporter;

impl Exporter for TableExporter {
    fn export<W: Write>(&self, data: &ReportData<'_>, writer: &mut W) -> io::Result<()> {
        match data.table {
            Some(table) => writer.write_all(table.as_bytes()),
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no rendered table to write",
            )),
        }
    }
}
