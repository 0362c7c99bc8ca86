//! Shared types for declaration extraction.
//!
//! This module defines the boundary schema of the extractor's JSON output
//! and the typed records built from it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structure document printed by the extraction command for one file.
///
/// Only the fields the scanner consumes are declared; anything else the
/// extractor emits is ignored.
///
/// # Example
///
/// ```
/// use declscope::parser::types::Structure;
///
/// let json = r#"{"key.substructure": [{"key.kind": "source.lang.swift.decl.class"}]}"#;
/// let structure: Structure = serde_json::from_str(json).unwrap();
/// assert_eq!(structure.substructure.len(), 1);
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Structure {
    /// Declarations found in the file. Absent means none.
    #[serde(rename = "key.substructure", default)]
    pub substructure: Vec<RawDeclaration>,
}

/// One entry of `key.substructure` as reported by the extractor.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDeclaration {
    /// Kind tag, e.g. `source.lang.swift.decl.struct`. Required.
    #[serde(rename = "key.kind")]
    pub kind: String,

    /// Declared identifier. Some entries (extensions of unnamed things,
    /// expressions) carry none.
    #[serde(rename = "key.name")]
    pub name: Option<String>,

    /// Accessibility tag, e.g. `source.lang.swift.accessibility.public`.
    #[serde(rename = "key.accessibility")]
    pub accessibility: Option<String>,

    /// Byte offset of the declaration.
    #[serde(rename = "key.offset")]
    pub offset: Option<u64>,

    /// Byte offset of the declaration's name.
    #[serde(rename = "key.nameoffset")]
    pub name_offset: Option<u64>,
}

/// Classification tag of a declaration.
///
/// The vocabulary belongs to the extractor, so this is an open string tag
/// rather than an enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclKind(String);

impl DeclKind {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the tag without `prefix`, or the full tag if it doesn't start
    /// with it.
    ///
    /// ```
    /// use declscope::parser::types::DeclKind;
    ///
    /// let kind = DeclKind::new("source.lang.swift.decl.class");
    /// assert_eq!(kind.short_name("source.lang.swift.decl."), "class");
    /// assert_eq!(kind.short_name("other."), "source.lang.swift.decl.class");
    /// ```
    pub fn short_name(&self, prefix: &str) -> &str {
        self.0.strip_prefix(prefix).unwrap_or(&self.0)
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accessibility tag of a declaration, as reported by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Accessibility(String);

impl Accessibility {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last dot-separated segment of the tag (`public` for
    /// `source.lang.swift.accessibility.public`).
    pub fn level(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Accessibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One visible declaration found in one file.
///
/// Records are built once by the extractor and never mutated afterwards,
/// so fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationRecord {
    id: String,
    name: String,
    kind: DeclKind,
    accessibility: Accessibility,
    source_path: String,
    module_name: String,
    is_third_party: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    name_offset: Option<u64>,
}

impl DeclarationRecord {
    /// Create a record for `name` declared in `source_path`.
    pub fn new(
        name: impl Into<String>,
        kind: DeclKind,
        accessibility: Accessibility,
        source_path: impl Into<String>,
        module_name: impl Into<String>,
        is_third_party: bool,
    ) -> Self {
        let name = name.into();
        let source_path = source_path.into();
        Self {
            id: format!("{}/{}", source_path, name),
            name,
            kind,
            accessibility,
            source_path,
            module_name: module_name.into(),
            is_third_party,
            offset: None,
            name_offset: None,
        }
    }

    /// Attach the extractor's location offsets.
    pub fn with_offsets(mut self, offset: Option<u64>, name_offset: Option<u64>) -> Self {
        self.offset = offset;
        self.name_offset = name_offset;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &DeclKind {
        &self.kind
    }

    pub fn accessibility(&self) -> &Accessibility {
        &self.accessibility
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn is_third_party(&self) -> bool {
        self.is_third_party
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn name_offset(&self) -> Option<u64> {
        self.name_offset
    }
}
