//! Source tree scanning for declscope.
//!
//! This module walks a source tree, runs the external structure command on
//! every matching file and accumulates the visible declarations it reports.
//!
//! # Features
//!
//! - Depth-first walk that skips and records failing files or subtrees
//! - Configurable visibility filter (`public`, `public+internal`, raw tags)
//! - Module and third-party classification from path conventions
//! - Insertion-ordered accumulation grouped by kind, module, or flat
//! - Pluggable progress display
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use declscope::analysis::{
//!     scan_tree, CommandExtractor, ExtractorCommand, ModuleResolver, NoProgress, ScanConfig,
//!     VisibilityFilter,
//! };
//! use declscope::parser::discover_modules;
//!
//! let root = Path::new(".");
//! let resolver = ModuleResolver::new(discover_modules(root));
//! let extractor = CommandExtractor::new(
//!     ExtractorCommand::default(),
//!     VisibilityFilter::public_only(),
//!     resolver,
//! );
//! let outcome = scan_tree(root, ScanConfig::default(), extractor, NoProgress);
//! println!("{}", outcome.summary());
//! ```

pub mod accumulator;
pub mod classify;
pub mod extractor;
pub mod progress;
pub mod walker;

// Re-export main types for convenience
pub use accumulator::{Accumulator, GroupBy};
pub use classify::{ModuleResolver, ModuleStrategy, VisibilityFilter, UNKNOWN_MODULE};
pub use extractor::{
    decode_declarations, CommandExtractor, DeclarationExtractor, ExtractionError,
    ExtractionResult, ExtractorCommand,
};
pub use progress::{
    LogProgress, NoProgress, ProgressCounters, ProgressLogWriter, ProgressReporter, TerminalProgress,
};
pub use walker::{
    scan_tree, FailureKind, ScanConfig, ScanFailure, ScanOutcome, ScanSession, TraversalError,
    TreeWalker,
};
