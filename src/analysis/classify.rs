//! Visibility filtering and module classification.
//!
//! Everything here is a pure function of a relative path or a tag, so the
//! same tree always classifies the same way.

use std::collections::BTreeSet;
use std::fmt;

use crate::parser::types::Accessibility;
use crate::parser::ModuleCatalog;

/// Module name assigned when no rule matches.
pub const UNKNOWN_MODULE: &str = "unknown";

/// Path segment pairs marking a SwiftPM dependency checkout.
const CHECKOUT_DIRS: [&str; 2] = ["checkouts", "checkout"];

/// Default locations of third-party sources, relative to the scan root.
pub const DEFAULT_THIRD_PARTY_PREFIXES: [&str; 3] = ["Pods", ".build/checkouts", ".build/checkout"];

/// Accessibility levels whose declarations make it into the report.
///
/// An accepted entry matches a tag either exactly or by the tag's last
/// dot-separated segment, so `public` accepts
/// `source.lang.swift.accessibility.public`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityFilter {
    accepted: BTreeSet<String>,
}

impl VisibilityFilter {
    /// Accept exactly the given levels or tags.
    pub fn new<I, S>(accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accepted: accepted.into_iter().map(Into::into).collect(),
        }
    }

    /// Accept `public` declarations only.
    pub fn public_only() -> Self {
        Self::new(["public"])
    }

    /// Accept `public` and `internal` declarations.
    pub fn public_and_internal() -> Self {
        Self::new(["public", "internal"])
    }

    pub fn accepts(&self, accessibility: &Accessibility) -> bool {
        self.accepted.contains(accessibility.as_str()) || self.accepted.contains(accessibility.level())
    }

    pub fn accepted(&self) -> impl Iterator<Item = &str> {
        self.accepted.iter().map(String::as_str)
    }
}

impl Default for VisibilityFilter {
    fn default() -> Self {
        Self::public_only()
    }
}

impl std::str::FromStr for VisibilityFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Self::public_only()),
            "public+internal" | "internal" => Ok(Self::public_and_internal()),
            _ => Err(format!(
                "Unknown visibility preset: '{}'. Valid presets: public, public+internal",
                s
            )),
        }
    }
}

/// How a path's module candidate is turned into a module name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleStrategy {
    /// Accept the candidate only if a manifest declared it.
    #[default]
    Manifest,
    /// Accept any candidate directory name, declared or not.
    PathHeuristic,
}

impl std::str::FromStr for ModuleStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manifest" => Ok(ModuleStrategy::Manifest),
            "path" | "heuristic" => Ok(ModuleStrategy::PathHeuristic),
            _ => Err(format!(
                "Unknown module strategy: '{}'. Valid strategies: manifest, path",
                s
            )),
        }
    }
}

impl fmt::Display for ModuleStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleStrategy::Manifest => write!(f, "manifest"),
            ModuleStrategy::PathHeuristic => write!(f, "path"),
        }
    }
}

/// Assigns module names and third-party flags to scan-root relative paths.
#[derive(Debug, Clone)]
pub struct ModuleResolver {
    catalog: ModuleCatalog,
    strategy: ModuleStrategy,
    third_party_prefixes: Vec<String>,
}

impl ModuleResolver {
    pub fn new(catalog: ModuleCatalog) -> Self {
        Self {
            catalog,
            strategy: ModuleStrategy::default(),
            third_party_prefixes: DEFAULT_THIRD_PARTY_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    pub fn with_strategy(mut self, strategy: ModuleStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the third-party prefixes. Trailing slashes are ignored.
    pub fn with_third_party_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.third_party_prefixes = prefixes
            .into_iter()
            .map(|p| p.into().trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    pub fn strategy(&self) -> ModuleStrategy {
        self.strategy
    }

    /// Owning module of `path`, or [`UNKNOWN_MODULE`].
    ///
    /// # Example
    ///
    /// ```
    /// use declscope::analysis::ModuleResolver;
    /// use declscope::parser::ModuleCatalog;
    ///
    /// let resolver = ModuleResolver::new(ModuleCatalog::from_names(["Alamofire"]));
    /// assert_eq!(resolver.module_for("Pods/Alamofire/Source/Session.swift"), "Alamofire");
    /// assert_eq!(resolver.module_for("App/Views/Main.swift"), "unknown");
    /// ```
    pub fn module_for(&self, path: &str) -> String {
        let accepted = module_candidate(path).filter(|candidate| match self.strategy {
            ModuleStrategy::Manifest => self.catalog.contains(candidate.name),
            ModuleStrategy::PathHeuristic => candidate.is_directory,
        });
        match accepted {
            Some(candidate) => candidate.name.to_string(),
            None => UNKNOWN_MODULE.to_string(),
        }
    }

    /// Whether `path` lies under one of the third-party prefixes.
    pub fn is_third_party(&self, path: &str) -> bool {
        let path = normalize(path);
        self.third_party_prefixes.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::new(ModuleCatalog::new())
    }
}

struct Candidate<'a> {
    name: &'a str,
    is_directory: bool,
}

/// The segment after a `.build/checkouts` marker, or else the second segment.
fn module_candidate(path: &str) -> Option<Candidate<'_>> {
    let segments: Vec<&str> = normalize(path)
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    let checkout = segments
        .windows(2)
        .position(|pair| pair[0] == ".build" && CHECKOUT_DIRS.contains(&pair[1]));
    let index = match checkout {
        Some(marker) => marker + 2,
        None => 1,
    };

    segments.get(index).map(|&name| Candidate {
        name,
        is_directory: index + 1 < segments.len(),
    })
}

fn normalize(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path)
}
