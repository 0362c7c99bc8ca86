//! Parser module for declscope.
//!
//! This module holds the boundary types for the extractor's JSON output and
//! the readers for dependency manifests.
//!
//! # Supported Manifests
//!
//! - **Podfile** (CocoaPods)
//! - **Package.swift** (SwiftPM)
//! - **Package.resolved** (SwiftPM lockfile, v1 and v2/v3)
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use declscope::parser::discover_modules;
//!
//! let catalog = discover_modules(Path::new("."));
//! println!("Found {} modules", catalog.len());
//! ```

pub mod manifest;
pub mod types;

// Re-export commonly used types for convenience
pub use manifest::{
    discover_modules, module_names_from_package_resolved, module_names_from_package_swift,
    module_names_from_podfile, read_manifest, ManifestError, ManifestKind, ManifestResult,
    ModuleCatalog,
};

pub use types::{Accessibility, DeclKind, DeclarationRecord, RawDeclaration, Structure};
