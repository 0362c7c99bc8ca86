//! Module name discovery from dependency manifests.
//!
//! Reads CocoaPods `Podfile`s, SwiftPM `Package.swift` manifests and
//! `Package.resolved` lockfiles and returns the module names they declare.
//! The names seed the module matching rules used when classifying
//! declarations.

use std::fs;
use std::path::Path;

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

static POD_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"pod\s+['"]([^'"]+)['"]"#).expect("valid pod regex"));

static PACKAGE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"name:\s*['"](.+?)['"]"#).expect("valid package regex"));

/// Errors that can occur while reading a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Failed to read the file from disk.
    #[error("Failed to read manifest: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse a JSON lockfile.
    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The file is not a manifest format we understand.
    #[error("Unsupported manifest: {0}")]
    Unsupported(String),
}

/// Result type alias for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Manifest formats understood by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// CocoaPods `Podfile`.
    Podfile,
    /// SwiftPM `Package.swift`.
    PackageSwift,
    /// SwiftPM `Package.resolved` lockfile.
    PackageResolved,
}

impl ManifestKind {
    /// All kinds, in the order they are consulted during discovery.
    pub const ALL: [ManifestKind; 3] = [
        ManifestKind::Podfile,
        ManifestKind::PackageSwift,
        ManifestKind::PackageResolved,
    ];

    /// Conventional file name of the manifest.
    pub fn file_name(&self) -> &'static str {
        match self {
            ManifestKind::Podfile => "Podfile",
            ManifestKind::PackageSwift => "Package.swift",
            ManifestKind::PackageResolved => "Package.resolved",
        }
    }

    /// Determine the manifest kind from a path's file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Self::ALL.into_iter().find(|kind| kind.file_name() == name)
    }
}

/// Ordered, de-duplicated set of known module names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleCatalog {
    names: IndexSet<String>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from names, keeping the first occurrence of each.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self::new();
        catalog.extend(names);
        catalog
    }

    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Extracts `pod '<Name>'` entries from a Podfile.
///
/// # Example
///
/// ```
/// use declscope::parser::manifest::module_names_from_podfile;
///
/// let podfile = "target 'App' do\n  pod 'Alamofire', '~> 5.0'\nend\n";
/// assert_eq!(module_names_from_podfile(podfile), vec!["Alamofire"]);
/// ```
pub fn module_names_from_podfile(content: &str) -> Vec<String> {
    collect_unique(&POD_ENTRY, content)
}

/// Extracts `name: "<Name>"` entries from a Package.swift manifest.
///
/// This picks up the package name along with its targets, products and
/// named dependencies.
pub fn module_names_from_package_swift(content: &str) -> Vec<String> {
    collect_unique(&PACKAGE_NAME, content)
}

fn collect_unique(pattern: &Regex, content: &str) -> Vec<String> {
    let names: IndexSet<String> = pattern
        .captures_iter(content)
        .map(|caps| caps[1].to_string())
        .collect();
    names.into_iter().collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResolvedFile {
    V2 { pins: Vec<ResolvedPin> },
    V1 { object: ResolvedObject },
}

#[derive(Deserialize)]
struct ResolvedObject {
    pins: Vec<ResolvedPin>,
}

#[derive(Deserialize)]
struct ResolvedPin {
    identity: Option<String>,
    package: Option<String>,
    location: Option<String>,
    #[serde(rename = "repositoryURL")]
    repository_url: Option<String>,
}

impl ResolvedPin {
    /// Checkout directories are named after the repository, so prefer the
    /// last URL segment over the lowercased identity.
    fn module_name(&self) -> Option<String> {
        let from_url = self
            .location
            .as_deref()
            .or(self.repository_url.as_deref())
            .and_then(repository_name);
        from_url.or_else(|| self.package.clone().or_else(|| self.identity.clone()))
    }
}

fn repository_name(url: &str) -> Option<String> {
    let last = url.trim_end_matches('/').rsplit('/').next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Extracts pinned package names from a Package.resolved lockfile.
///
/// Both the v1 (`object.pins`) and v2/v3 (`pins`) layouts are accepted.
pub fn module_names_from_package_resolved(content: &str) -> ManifestResult<Vec<String>> {
    let pins = match serde_json::from_str::<ResolvedFile>(content)? {
        ResolvedFile::V2 { pins } => pins,
        ResolvedFile::V1 { object } => object.pins,
    };
    let names: IndexSet<String> = pins.iter().filter_map(ResolvedPin::module_name).collect();
    Ok(names.into_iter().collect())
}

/// Reads module names from a manifest file, dispatching on its file name.
pub fn read_manifest(path: &Path) -> ManifestResult<Vec<String>> {
    let kind = ManifestKind::from_path(path)
        .ok_or_else(|| ManifestError::Unsupported(path.display().to_string()))?;
    let content = fs::read_to_string(path)?;
    match kind {
        ManifestKind::Podfile => Ok(module_names_from_podfile(&content)),
        ManifestKind::PackageSwift => Ok(module_names_from_package_swift(&content)),
        ManifestKind::PackageResolved => module_names_from_package_resolved(&content),
    }
}

/// Collects module names from every manifest present in `root`.
///
/// Missing manifests contribute nothing. Unreadable or malformed ones are
/// logged and skipped.
pub fn discover_modules(root: &Path) -> ModuleCatalog {
    let mut catalog = ModuleCatalog::new();
    for kind in ManifestKind::ALL {
        let path = root.join(kind.file_name());
        if !path.is_file() {
            continue;
        }
        match read_manifest(&path) {
            Ok(names) => {
                debug!(manifest = kind.file_name(), count = names.len(), "Read module names");
                catalog.extend(names);
            }
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    catalog
}
