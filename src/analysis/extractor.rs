//! Declaration extraction through an external structure command.
//!
//! The command (by default `sourcekitten structure --file <path>`) prints a
//! JSON structure document for one source file. This module runs it, guards
//! against runaway output, validates the document and turns the visible
//! entries into [`DeclarationRecord`]s.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::debug;

use super::classify::{ModuleResolver, VisibilityFilter};
use crate::parser::types::{Accessibility, DeclKind, DeclarationRecord, Structure};

/// Placeholder replaced by the source file path in the command line.
pub const FILE_PLACEHOLDER: &str = "{file}";

/// Default ceiling on extractor stdout (1 GiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024 * 1024;

/// Ceiling on captured stderr. Anything beyond is drained and dropped.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Errors that can occur while extracting one file.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extractor command is empty")]
    EmptyCommand,

    #[error("Failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read extractor output: {0}")]
    Io(#[from] io::Error),

    #[error("Extractor exited with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },

    #[error("Extractor reported errors: {0}")]
    Stderr(String),

    #[error("Extractor output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },

    #[error("Failed to parse extractor output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for extraction operations.
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Converts one source file into its visible declarations.
pub trait DeclarationExtractor {
    /// Extract declarations from `path`. `relative` is the path relative to
    /// the scan root and is what records carry as their source path.
    fn extract(&mut self, path: &Path, relative: &str) -> ExtractionResult<Vec<DeclarationRecord>>;
}

/// The external command line, with an optional `{file}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorCommand {
    argv: Vec<String>,
}

impl ExtractorCommand {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a command line on whitespace. Quotes are not interpreted;
    /// build arguments containing spaces with [`ExtractorCommand::new`].
    pub fn parse(line: &str) -> Self {
        Self::new(line.split_whitespace())
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Arguments for `path`: placeholders are substituted, and the path is
    /// appended when there is no placeholder at all.
    pub fn args_for(&self, path: &Path) -> Vec<String> {
        let file = path.display().to_string();
        let mut args: Vec<String> = self
            .argv
            .iter()
            .skip(1)
            .map(|arg| arg.replace(FILE_PLACEHOLDER, &file))
            .collect();
        if !self.argv.iter().any(|arg| arg.contains(FILE_PLACEHOLDER)) {
            args.push(file);
        }
        args
    }
}

impl Default for ExtractorCommand {
    fn default() -> Self {
        Self::new(["sourcekitten", "structure", "--file", FILE_PLACEHOLDER])
    }
}

/// Decodes a structure document into the records that pass `filter`.
///
/// Entries without a name or an accessibility tag are not visible
/// declarations and are dropped along with the filtered ones.
pub fn decode_declarations(
    output: &[u8],
    relative: &str,
    filter: &VisibilityFilter,
    resolver: &ModuleResolver,
) -> ExtractionResult<Vec<DeclarationRecord>> {
    let structure: Structure = serde_json::from_slice(output)?;
    let module = resolver.module_for(relative);
    let third_party = resolver.is_third_party(relative);

    let records = structure
        .substructure
        .into_iter()
        .filter_map(|raw| {
            let accessibility = Accessibility::new(raw.accessibility?);
            if !filter.accepts(&accessibility) {
                return None;
            }
            let name = raw.name?;
            Some(
                DeclarationRecord::new(
                    name,
                    DeclKind::new(raw.kind),
                    accessibility,
                    relative,
                    module.clone(),
                    third_party,
                )
                .with_offsets(raw.offset, raw.name_offset),
            )
        })
        .collect();

    Ok(records)
}

/// Extractor backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    command: ExtractorCommand,
    filter: VisibilityFilter,
    resolver: ModuleResolver,
    max_output_bytes: usize,
    strict_stderr: bool,
}

impl CommandExtractor {
    pub fn new(command: ExtractorCommand, filter: VisibilityFilter, resolver: ModuleResolver) -> Self {
        Self {
            command,
            filter,
            resolver,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            strict_stderr: false,
        }
    }

    /// Set the stdout ceiling; output beyond it fails the file.
    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    /// Treat any stderr output as a failure even when the command succeeds.
    pub fn with_strict_stderr(mut self, strict: bool) -> Self {
        self.strict_stderr = strict;
        self
    }

    pub fn filter(&self) -> &VisibilityFilter {
        &self.filter
    }

    pub fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }

    /// Run the command for `path` and return its stdout.
    fn run(&self, path: &Path) -> ExtractionResult<Vec<u8>> {
        let program = self.command.program().ok_or(ExtractionError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(self.command.args_for(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExtractionError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // stderr is drained on its own thread so a chatty child can't block
        // on a full pipe while we read stdout.
        let stderr_reader = child
            .stderr
            .take()
            .map(|pipe| thread::spawn(move || read_capped(pipe, MAX_STDERR_BYTES)));

        let stdout = match child.stdout.take() {
            Some(pipe) => read_bounded(pipe, self.max_output_bytes),
            None => Ok(Some(Vec::new())),
        };
        let stdout = match stdout {
            Ok(Some(stdout)) => stdout,
            Ok(None) => {
                reap(&mut child, stderr_reader);
                return Err(ExtractionError::OutputTooLarge {
                    limit: self.max_output_bytes,
                });
            }
            Err(e) => {
                reap(&mut child, stderr_reader);
                return Err(e.into());
            }
        };

        let status = child.wait()?;
        let stderr = join_stderr(stderr_reader);

        if !status.success() {
            return Err(ExtractionError::NonZeroExit {
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            if self.strict_stderr {
                return Err(ExtractionError::Stderr(stderr.trim().to_string()));
            }
            debug!(path = %path.display(), stderr = %stderr.trim(), "Extractor wrote to stderr");
        }

        Ok(stdout)
    }
}

impl DeclarationExtractor for CommandExtractor {
    fn extract(&mut self, path: &Path, relative: &str) -> ExtractionResult<Vec<DeclarationRecord>> {
        let output = self.run(path)?;
        decode_declarations(&output, relative, &self.filter, &self.resolver)
    }
}

/// Read all of `reader`, or `None` once it yields more than `limit` bytes.
fn read_bounded<R: Read>(reader: R, limit: usize) -> io::Result<Option<Vec<u8>>> {
    let mut buffer = Vec::new();
    reader
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut buffer)?;
    Ok((buffer.len() <= limit).then_some(buffer))
}

/// Kill an abandoned child and wait for it and its stderr drain.
fn reap(child: &mut Child, stderr_reader: Option<JoinHandle<String>>) {
    let _ = child.kill();
    let _ = child.wait();
    join_stderr(stderr_reader);
}

fn join_stderr(stderr_reader: Option<JoinHandle<String>>) -> String {
    stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Read up to `cap` bytes as lossy UTF-8, then discard the rest.
fn read_capped<R: Read>(mut reader: R, cap: usize) -> String {
    let mut buffer = Vec::new();
    let _ = (&mut reader).take(cap as u64).read_to_end(&mut buffer);
    let _ = io::copy(&mut reader, &mut io::sink());
    String::from_utf8_lossy(&buffer).into_owned()
}
