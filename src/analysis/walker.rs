//! Depth-first scan of a source tree.
//!
//! The walker visits every file with the configured extension, hands it to a
//! [`DeclarationExtractor`] and folds the result into a [`ScanSession`].
//! Failures are recorded and skipped; a scan always runs to the end of the
//! tree.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use super::accumulator::{Accumulator, GroupBy};
use super::classify::DEFAULT_THIRD_PARTY_PREFIXES;
use super::extractor::DeclarationExtractor;
use super::progress::{ProgressCounters, ProgressReporter};
use crate::parser::types::DeclarationRecord;
use crate::parser::ModuleCatalog;

/// Errors listing or inspecting part of the tree.
#[derive(Error, Debug)]
pub enum TraversalError {
    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: String,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to list {path}: {source}")]
    List {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Which step of the scan a recovered failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Extraction,
    Traversal,
}

/// A file or subtree that was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    pub kind: FailureKind,
    pub path: String,
    pub message: String,
}

/// Settings for a scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Extension of source files to extract, without the dot.
    pub extension: String,
    /// Bucketing of the accumulator.
    pub group_by: GroupBy,
    /// Visit directory entries sorted by file name.
    pub sort_entries: bool,
    /// Directory names that are never descended into.
    pub ignored_dirs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extension: "swift".to_string(),
            group_by: GroupBy::default(),
            sort_entries: true,
            ignored_dirs: vec![".git".to_string()],
        }
    }
}

/// State owned by one scan run.
#[derive(Debug, Default)]
pub struct ScanSession {
    accumulator: Accumulator,
    counters: ProgressCounters,
    failures: Vec<ScanFailure>,
}

impl ScanSession {
    pub fn new(group_by: GroupBy) -> Self {
        Self {
            accumulator: Accumulator::new(group_by),
            counters: ProgressCounters::default(),
            failures: Vec::new(),
        }
    }

    pub fn counters(&self) -> &ProgressCounters {
        &self.counters
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    pub fn failures(&self) -> &[ScanFailure] {
        &self.failures
    }

    fn record_success(&mut self, records: Vec<DeclarationRecord>) {
        self.counters.files_scanned += 1;
        self.counters.total_components_found += records.len();
        self.accumulator.merge(records);
    }

    fn record_failure(&mut self, kind: FailureKind, path: String, message: String) {
        if kind == FailureKind::Extraction {
            self.counters.files_failed += 1;
        }
        self.failures.push(ScanFailure { kind, path, message });
    }

    /// Freeze the session once the walk is over.
    pub fn finish(self) -> ScanOutcome {
        ScanOutcome {
            accumulator: self.accumulator,
            counters: self.counters,
            failures: self.failures,
        }
    }
}

/// Read-only result of a completed scan.
#[derive(Debug)]
pub struct ScanOutcome {
    pub accumulator: Accumulator,
    pub counters: ProgressCounters,
    pub failures: Vec<ScanFailure>,
}

impl ScanOutcome {
    /// True when no file or subtree had to be skipped.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// One-line summary distinguishing clean and degraded runs.
    pub fn summary(&self) -> String {
        if self.is_clean() {
            format!(
                "Scanning completed successfully: {} files, {} components",
                self.counters.files_scanned, self.counters.total_components_found
            )
        } else {
            format!(
                "Scanning completed with {} skipped: {} files, {} components",
                self.failures.len(),
                self.counters.files_scanned,
                self.counters.total_components_found
            )
        }
    }
}

/// Depth-first walker driving extraction.
pub struct TreeWalker<E, P> {
    config: ScanConfig,
    extractor: E,
    progress: P,
}

impl<E: DeclarationExtractor, P: ProgressReporter> TreeWalker<E, P> {
    pub fn new(config: ScanConfig, extractor: E, progress: P) -> Self {
        Self {
            config,
            extractor,
            progress,
        }
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    pub fn into_parts(self) -> (E, P) {
        (self.extractor, self.progress)
    }

    /// Scan everything under `root`.
    pub fn scan(&mut self, root: &Path, session: &mut ScanSession) {
        info!("Scanning directories under {}", root.display());
        self.walk(root, root, session);
        self.progress.finish(session.counters());
    }

    /// Scan only the module directories of `root`: second-level
    /// directories named in `catalog`, plus dependency checkouts.
    pub fn scan_module_directories(
        &mut self,
        root: &Path,
        catalog: &ModuleCatalog,
        session: &mut ScanSession,
    ) {
        let roots = module_directories(root, catalog, session);
        info!("Scanning {} module directories", roots.len());
        for start in roots {
            self.walk(root, &start, session);
        }
        self.progress.finish(session.counters());
    }

    /// Walk the subtree at `start`, recording paths relative to `root`.
    pub fn walk(&mut self, root: &Path, start: &Path, session: &mut ScanSession) {
        let mut walker = WalkDir::new(start).follow_links(true);
        if self.config.sort_entries {
            walker = walker.sort_by_file_name();
        }
        let ignored = self.config.ignored_dirs.clone();
        let entries = walker
            .into_iter()
            .filter_entry(move |entry| entry.depth() == 0 || !is_ignored_dir(entry, &ignored));

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(|p| relative_path(root, p))
                        .unwrap_or_else(|| relative_path(root, start));
                    let error = TraversalError::Walk {
                        path: path.clone(),
                        source: err,
                    };
                    warn!("Skipping subtree: {}", error);
                    session.record_failure(FailureKind::Traversal, path, error.to_string());
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                if entry.depth() == 1 && start == root {
                    info!("    {}", relative_path(root, entry.path()));
                }
                session.counters.current_path = relative_path(root, entry.path());
                continue;
            }

            if has_extension(entry.path(), &self.config.extension) {
                self.visit_file(root, entry.path(), session);
            }
        }
    }

    fn visit_file(&mut self, root: &Path, path: &Path, session: &mut ScanSession) {
        let relative = relative_path(root, path);
        match self.extractor.extract(path, &relative) {
            Ok(records) => {
                debug!(path = %relative, count = records.len(), "Extracted declarations");
                session.record_success(records);
            }
            Err(e) => {
                warn!("Error extracting declarations from {}: {}", relative, e);
                session.record_failure(FailureKind::Extraction, relative, e.to_string());
            }
        }
        self.progress.report(session.counters());
    }
}

/// Scan `root` with a fresh session and return the frozen outcome.
pub fn scan_tree<E, P>(root: &Path, config: ScanConfig, extractor: E, progress: P) -> ScanOutcome
where
    E: DeclarationExtractor,
    P: ProgressReporter,
{
    let mut session = ScanSession::new(config.group_by);
    let mut walker = TreeWalker::new(config, extractor, progress);
    walker.scan(root, &mut session);
    session.finish()
}

/// Second-level directories whose name is a known module, plus the SwiftPM
/// checkout directories, in listing order.
fn module_directories(root: &Path, catalog: &ModuleCatalog, session: &mut ScanSession) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for parent in list_directories(root, root, session) {
        for child in list_directories(root, &parent, session) {
            let name = child.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let relative = relative_path(root, &child);
            let is_checkout = DEFAULT_THIRD_PARTY_PREFIXES
                .iter()
                .any(|prefix| prefix.starts_with(".build/") && *prefix == relative);
            if catalog.contains(name) || is_checkout {
                found.push(child);
            }
        }
    }
    found
}

fn list_directories(root: &Path, dir: &Path, session: &mut ScanSession) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) => {
            let error = TraversalError::List {
                path: relative_path(root, dir),
                source,
            };
            warn!("{}", error);
            session.record_failure(FailureKind::Traversal, relative_path(root, dir), error.to_string());
            return Vec::new();
        }
    };
    directories_of(root, dir, entries.map(|entry| entry.map(|e| e.path())), session)
}

/// Sorted directories among `entries`. Unreadable entries are recorded and
/// skipped.
fn directories_of<I>(root: &Path, dir: &Path, entries: I, session: &mut ScanSession) -> Vec<PathBuf>
where
    I: Iterator<Item = io::Result<PathBuf>>,
{
    let mut dirs = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => {
                if path.is_dir() {
                    dirs.push(path);
                }
            }
            Err(source) => {
                let error = TraversalError::List {
                    path: relative_path(root, dir),
                    source,
                };
                warn!("{}", error);
                session.record_failure(FailureKind::Traversal, relative_path(root, dir), error.to_string());
            }
        }
    }
    dirs.sort();
    dirs
}

fn is_ignored_dir(entry: &DirEntry, ignored: &[String]) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    ignored.iter().any(|dir| dir == name.as_ref())
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == extension)
}

/// `path` relative to `root`, `/`-separated.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::classify::{ModuleResolver, VisibilityFilter};
    use crate::analysis::extractor::{decode_declarations, ExtractionError, ExtractionResult};
    use crate::analysis::progress::NoProgress;
    use std::collections::HashMap;
    use tempfile::tempdir;

    /// Extractor answering from a table keyed by relative path.
    struct ScriptedExtractor {
        outputs: HashMap<String, String>,
        calls: Vec<String>,
        filter: VisibilityFilter,
        resolver: ModuleResolver,
    }

    impl ScriptedExtractor {
        fn new(outputs: &[(&str, &str)]) -> Self {
            Self {
                outputs: outputs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                calls: Vec::new(),
                filter: VisibilityFilter::public_only(),
                resolver: ModuleResolver::new(ModuleCatalog::from_names(["Alamofire", "App"])),
            }
        }
    }

    impl DeclarationExtractor for ScriptedExtractor {
        fn extract(&mut self, _path: &Path, relative: &str) -> ExtractionResult<Vec<DeclarationRecord>> {
            self.calls.push(relative.to_string());
            match self.outputs.get(relative) {
                Some(json) => decode_declarations(json.as_bytes(), relative, &self.filter, &self.resolver),
                None => Err(ExtractionError::NonZeroExit {
                    status: "exit status: 1".to_string(),
                    stderr: "no such file".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct CountingProgress {
        reports: usize,
        finished: bool,
    }

    impl ProgressReporter for CountingProgress {
        fn report(&mut self, _counters: &ProgressCounters) {
            self.reports += 1;
        }

        fn finish(&mut self, _counters: &ProgressCounters) {
            self.finished = true;
        }
    }

    fn decl(kind: &str, name: &str, access: &str) -> String {
        format!(
            r#"{{"key.kind": "source.lang.swift.decl.{}", "key.name": "{}", "key.accessibility": "source.lang.swift.accessibility.{}"}}"#,
            kind, name, access
        )
    }

    fn structure(decls: &[String]) -> String {
        format!(r#"{{"key.substructure": [{}]}}"#, decls.join(","))
    }

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "// swift").unwrap();
    }

    #[test]
    fn test_walk_visits_every_matching_file() {
        let dir = tempdir().unwrap();
        let files = [
            "Sources/App/A.swift",
            "Sources/App/Nested/Deep/B.swift",
            "Pods/Alamofire/Source/C.swift",
            "README.md",
            "Sources/App/D.m",
        ];
        for file in files {
            touch(dir.path(), file);
        }

        let empty = structure(&[]);
        let extractor = ScriptedExtractor::new(&[
            ("Sources/App/A.swift", &empty),
            ("Sources/App/Nested/Deep/B.swift", &empty),
            ("Pods/Alamofire/Source/C.swift", &empty),
        ]);
        let mut session = ScanSession::new(GroupBy::Kind);
        let mut walker = TreeWalker::new(ScanConfig::default(), extractor, CountingProgress::default());
        walker.scan(dir.path(), &mut session);

        let (extractor, progress) = walker.into_parts();
        assert_eq!(
            extractor.calls,
            vec![
                "Pods/Alamofire/Source/C.swift",
                "Sources/App/A.swift",
                "Sources/App/Nested/Deep/B.swift",
            ]
        );
        assert_eq!(progress.reports, 3);
        assert!(progress.finished);
        assert_eq!(session.counters().files_scanned, 3);
    }

    #[test]
    fn test_walk_merges_records_and_counts() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "Sources/App/Foo.swift");
        touch(dir.path(), "Sources/App/Bar.swift");

        let foo = structure(&[decl("class", "Foo", "public"), decl("function.free", "helper()", "private")]);
        let bar = structure(&[decl("struct", "Bar", "public")]);
        let extractor = ScriptedExtractor::new(&[
            ("Sources/App/Foo.swift", &foo),
            ("Sources/App/Bar.swift", &bar),
        ]);

        let outcome = scan_tree(dir.path(), ScanConfig::default(), extractor, NoProgress);

        assert!(outcome.is_clean());
        assert_eq!(outcome.counters.files_scanned, 2);
        assert_eq!(outcome.counters.total_components_found, 2);
        let keys: Vec<_> = outcome.accumulator.groups().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec!["source.lang.swift.decl.struct", "source.lang.swift.decl.class"]
        );
        assert!(outcome.accumulator.records().all(|r| r.module_name() == "App"));
    }

    #[test]
    fn test_walk_skips_failed_files() {
        let dir = tempdir().unwrap();
        let good = structure(&[decl("class", "Ok", "public")]);
        let mut outputs = Vec::new();
        let names = ["A", "B", "C", "D", "E"];
        let paths: Vec<String> = names.iter().map(|n| format!("Sources/App/{}.swift", n)).collect();
        for path in &paths {
            touch(dir.path(), path);
        }
        for path in paths.iter().filter(|p| !p.ends_with("C.swift")) {
            outputs.push((path.as_str(), good.as_str()));
        }

        let mut progress = CountingProgress::default();
        let mut session = ScanSession::new(GroupBy::Flat);
        let mut walker = TreeWalker::new(
            ScanConfig::default(),
            ScriptedExtractor::new(&outputs),
            &mut progress,
        );
        walker.scan(dir.path(), &mut session);
        drop(walker);

        let outcome = session.finish();
        assert_eq!(outcome.counters.files_scanned, 4);
        assert_eq!(outcome.counters.files_failed, 1);
        assert_eq!(outcome.accumulator.len(), 4);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::Extraction);
        assert_eq!(outcome.failures[0].path, "Sources/App/C.swift");
        assert!(!outcome.is_clean());
        assert!(outcome.summary().contains("1 skipped"));
        // Progress is reported for the failed file too.
        assert_eq!(progress.reports, 5);
    }

    #[test]
    fn test_walk_prunes_ignored_dirs() {
        let dir = tempdir().unwrap();
        touch(dir.path(), ".git/hooks/Hook.swift");
        touch(dir.path(), "Sources/App/A.swift");

        let empty = structure(&[]);
        let extractor = ScriptedExtractor::new(&[("Sources/App/A.swift", &empty)]);
        let mut session = ScanSession::new(GroupBy::Kind);
        let mut walker = TreeWalker::new(ScanConfig::default(), extractor, NoProgress);
        walker.scan(dir.path(), &mut session);

        assert_eq!(walker.extractor().calls, vec!["Sources/App/A.swift"]);
    }

    #[test]
    fn test_walk_custom_extension() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "src/a.kt");
        touch(dir.path(), "src/b.swift");

        let config = ScanConfig {
            extension: "kt".to_string(),
            ..ScanConfig::default()
        };
        let empty = structure(&[]);
        let extractor = ScriptedExtractor::new(&[("src/a.kt", &empty)]);
        let mut session = ScanSession::new(GroupBy::Kind);
        let mut walker = TreeWalker::new(config, extractor, NoProgress);
        walker.scan(dir.path(), &mut session);

        assert_eq!(walker.extractor().calls, vec!["src/a.kt"]);
    }

    #[test]
    fn test_missing_root_is_traversal_failure() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let extractor = ScriptedExtractor::new(&[]);

        let outcome = scan_tree(&missing, ScanConfig::default(), extractor, NoProgress);

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::Traversal);
        assert_eq!(outcome.counters.files_scanned, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_skips_only_that_entry() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "A/a.swift");
        touch(dir.path(), "C/c.swift");
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("B")).unwrap();

        let empty = structure(&[decl("class", "Kept", "public")]);
        let extractor = ScriptedExtractor::new(&[("A/a.swift", &empty), ("C/c.swift", &empty)]);
        let mut session = ScanSession::new(GroupBy::Kind);
        let mut walker = TreeWalker::new(ScanConfig::default(), extractor, NoProgress);
        walker.scan(dir.path(), &mut session);

        assert_eq!(walker.extractor().calls, vec!["A/a.swift", "C/c.swift"]);
        let outcome = session.finish();
        assert_eq!(outcome.counters.files_scanned, 2);
        assert_eq!(outcome.counters.files_failed, 0);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::Traversal);
        assert_eq!(outcome.failures[0].path, "B");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_skipped() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "A/a.swift");
        touch(dir.path(), "C/c.swift");
        std::os::unix::fs::symlink(dir.path().join("C"), dir.path().join("C/loop")).unwrap();

        let empty = structure(&[]);
        let extractor = ScriptedExtractor::new(&[("A/a.swift", &empty), ("C/c.swift", &empty)]);
        let outcome = scan_tree(dir.path(), ScanConfig::default(), extractor, NoProgress);

        assert_eq!(outcome.counters.files_scanned, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::Traversal);
        assert_eq!(outcome.failures[0].path, "C/loop");
    }

    #[test]
    fn test_unreadable_listing_entry_is_recorded() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "Pods/Alamofire/a.swift");
        touch(dir.path(), "Pods/Kingfisher/b.swift");
        let pods = dir.path().join("Pods");
        let entries = vec![
            Ok(pods.join("Kingfisher")),
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
            Ok(pods.join("Alamofire")),
            Ok(pods.join("Kingfisher/b.swift")),
        ];

        let mut session = ScanSession::new(GroupBy::Kind);
        let dirs = directories_of(dir.path(), &pods, entries.into_iter(), &mut session);

        assert_eq!(dirs, vec![pods.join("Alamofire"), pods.join("Kingfisher")]);
        assert_eq!(session.failures().len(), 1);
        assert_eq!(session.failures()[0].kind, FailureKind::Traversal);
        assert_eq!(session.failures()[0].path, "Pods");
        assert!(session.failures()[0].message.contains("denied"));
        assert_eq!(session.counters().files_failed, 0);
    }

    #[test]
    fn test_scan_module_directories() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "Pods/Alamofire/Source/Session.swift");
        touch(dir.path(), "Pods/Unlisted/Source/Other.swift");
        touch(dir.path(), "Sources/App/Main.swift");
        touch(dir.path(), ".build/checkouts/SnapKit/Sources/View.swift");
        touch(dir.path(), "Scripts/Tool.swift");

        let empty = structure(&[]);
        let extractor = ScriptedExtractor::new(&[
            ("Pods/Alamofire/Source/Session.swift", &empty),
            ("Sources/App/Main.swift", &empty),
            (".build/checkouts/SnapKit/Sources/View.swift", &empty),
        ]);
        let catalog = ModuleCatalog::from_names(["Alamofire", "App"]);
        let mut session = ScanSession::new(GroupBy::Kind);
        let mut walker = TreeWalker::new(ScanConfig::default(), extractor, NoProgress);
        walker.scan_module_directories(dir.path(), &catalog, &mut session);

        assert_eq!(
            walker.extractor().calls,
            vec![
                ".build/checkouts/SnapKit/Sources/View.swift",
                "Pods/Alamofire/Source/Session.swift",
                "Sources/App/Main.swift",
            ]
        );
        assert!(session.failures().is_empty());
    }

    #[test]
    fn test_relative_path() {
        let root = Path::new("/work/project");
        assert_eq!(
            relative_path(root, Path::new("/work/project/Sources/App/A.swift")),
            "Sources/App/A.swift"
        );
        assert_eq!(relative_path(root, root), ".");
        assert_eq!(relative_path(Path::new("."), Path::new("./Pods/X/a.swift")), "Pods/X/a.swift");
    }
}
