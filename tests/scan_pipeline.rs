//! End-to-end scans driven by a real external command.
//!
//! Each source file holds the structure document the extractor would print,
//! so `cat` stands in for the structure tool.

#![cfg(unix)]

use std::fs;
use std::path::Path;

use declscope::analysis::{
    scan_tree, CommandExtractor, ExtractorCommand, GroupBy, ModuleResolver, ModuleStrategy,
    NoProgress, ScanConfig, ScanOutcome, ScanSession, TreeWalker, VisibilityFilter,
};
use declscope::export::{ReportBuilder, ReportData, ReportOptions, ReportRow};
use declscope::parser::discover_modules;
use tempfile::tempdir;

fn decl(kind: &str, name: &str, access: &str) -> String {
    format!(
        r#"{{"key.kind": "source.lang.swift.decl.{}", "key.name": "{}", "key.accessibility": "source.lang.swift.accessibility.{}", "key.offset": 0, "key.nameoffset": 6}}"#,
        kind, name, access
    )
}

fn write_source(root: &Path, relative: &str, decls: &[String]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!(r#"{{"key.substructure": [{}]}}"#, decls.join(","))).unwrap();
}

fn cat_extractor(root: &Path, strategy: ModuleStrategy) -> CommandExtractor {
    let resolver = ModuleResolver::new(discover_modules(root)).with_strategy(strategy);
    CommandExtractor::new(
        ExtractorCommand::parse("cat {file}"),
        VisibilityFilter::public_only(),
        resolver,
    )
}

fn scan(root: &Path, strategy: ModuleStrategy) -> ScanOutcome {
    scan_tree(root, ScanConfig::default(), cat_extractor(root, strategy), NoProgress)
}

fn find<'a>(rows: &'a [ReportRow], name: &str) -> &'a ReportRow {
    rows.iter()
        .find(|row| row.component_name == name)
        .unwrap_or_else(|| panic!("no row for {}", name))
}

#[test]
fn test_public_declarations_become_rows() {
    let dir = tempdir().unwrap();
    write_source(
        dir.path(),
        "Sources/App/Foo.swift",
        &[decl("class", "Foo", "public"), decl("function.free", "helper()", "private")],
    );
    write_source(dir.path(), "Sources/App/Bar.swift", &[decl("struct", "Bar", "public")]);

    let outcome = scan(dir.path(), ModuleStrategy::PathHeuristic);
    assert!(outcome.is_clean(), "{:?}", outcome.failures);
    assert_eq!(outcome.counters.files_scanned, 2);
    assert_eq!(outcome.counters.total_components_found, 2);

    let builder = ReportBuilder::new(ReportOptions::default());
    let rows = builder.rows(&outcome.accumulator);
    assert_eq!(rows.len(), 2);

    let foo = find(&rows, "Foo");
    assert_eq!(foo.component_type, "class");
    assert_eq!(foo.module, "App");
    assert!(!foo.is_third_party);

    let bar = find(&rows, "Bar");
    assert_eq!(bar.component_type, "struct");
    assert!(rows.iter().all(|row| row.component_name != "helper()"));
}

#[test]
fn test_third_party_modules_from_podfile() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("Podfile"), "target 'App' do\n  pod 'Alamofire', '~> 5.0'\nend\n").unwrap();
    write_source(
        dir.path(),
        "Pods/Alamofire/Source/Session.swift",
        &[decl("class", "Session", "public")],
    );
    write_source(dir.path(), "App/Main.swift", &[decl("struct", "Main", "public")]);

    let outcome = scan(dir.path(), ModuleStrategy::Manifest);
    let rows = ReportBuilder::new(ReportOptions::default()).rows(&outcome.accumulator);

    let session = find(&rows, "Session");
    assert_eq!(session.module, "Alamofire");
    assert!(session.is_third_party);

    let main = find(&rows, "Main");
    assert_eq!(main.module, "unknown");
    assert!(!main.is_third_party);
}

#[test]
fn test_one_failing_file_is_skipped() {
    let dir = tempdir().unwrap();
    for name in ["A", "B", "C", "D"] {
        write_source(
            dir.path(),
            &format!("Sources/App/{}.swift", name),
            &[decl("class", name, "public")],
        );
    }
    fs::write(dir.path().join("Sources/App/Broken.swift"), "not a structure document").unwrap();

    let outcome = scan(dir.path(), ModuleStrategy::PathHeuristic);
    assert_eq!(outcome.counters.files_scanned, 4);
    assert_eq!(outcome.counters.files_failed, 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].path, "Sources/App/Broken.swift");

    let out = tempdir().unwrap();
    let builder = ReportBuilder::new(ReportOptions {
        output_dir: out.path().to_path_buf(),
        ..ReportOptions::default()
    });
    let rows = builder.rows(&outcome.accumulator);
    let persisted = builder.persist(&ReportData::new(&outcome.accumulator, &rows));
    assert!(persisted.is_complete());

    let results: serde_json::Value =
        serde_json::from_slice(&fs::read(out.path().join("results.json")).unwrap()).unwrap();
    let mut names: Vec<&str> = results["source.lang.swift.decl.class"]
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["name"].as_str().unwrap())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["A", "B", "C", "D"]);
}

#[test]
fn test_repeated_scans_write_identical_artifacts() {
    let dir = tempdir().unwrap();
    write_source(dir.path(), "Sources/App/Foo.swift", &[decl("class", "Foo", "public")]);
    write_source(dir.path(), "Sources/Core/Bar.swift", &[decl("struct", "Bar", "public")]);
    write_source(dir.path(), "Sources/Core/Baz.swift", &[decl("enum", "Baz", "public")]);

    let mut artifacts = Vec::new();
    for _ in 0..2 {
        let out = tempdir().unwrap();
        let outcome = scan(dir.path(), ModuleStrategy::PathHeuristic);
        let builder = ReportBuilder::new(ReportOptions {
            output_dir: out.path().to_path_buf(),
            ..ReportOptions::default()
        });
        let rows = builder.rows(&outcome.accumulator);
        let table = builder.render(&rows).unwrap();
        let persisted = builder.persist(&ReportData::new(&outcome.accumulator, &rows).with_table(&table));
        assert_eq!(persisted.written.len(), 3);

        artifacts.push((
            fs::read(out.path().join("results.json")).unwrap(),
            fs::read(out.path().join("report.json")).unwrap(),
            fs::read_to_string(out.path().join("report.txt")).unwrap(),
        ));
    }

    assert_eq!(artifacts[0], artifacts[1]);
}

#[test]
fn test_table_has_one_block_per_module() {
    let dir = tempdir().unwrap();
    write_source(
        dir.path(),
        "Sources/App/Foo.swift",
        &[decl("class", "Foo", "public"), decl("struct", "FooState", "public")],
    );
    write_source(dir.path(), "Sources/Core/Bar.swift", &[decl("struct", "Bar", "public")]);
    write_source(dir.path(), "Sources/Net/Client.swift", &[decl("protocol", "Client", "public")]);

    let outcome = scan(dir.path(), ModuleStrategy::PathHeuristic);
    let builder = ReportBuilder::new(ReportOptions::default());
    let rows = builder.rows(&outcome.accumulator);
    let table = builder.render(&rows).unwrap();

    // Top rule, header, separator, bottom rule, plus one rule between groups.
    assert_eq!(table.lines().count(), rows.len() + 4 + 2);
    assert!(table.lines().nth(1).unwrap().starts_with("│ module "));
}

#[test]
fn test_empty_scan_cannot_render() {
    let dir = tempdir().unwrap();
    write_source(dir.path(), "Sources/App/Hidden.swift", &[decl("class", "Hidden", "internal")]);

    let outcome = scan(dir.path(), ModuleStrategy::PathHeuristic);
    assert!(outcome.accumulator.is_empty());

    let builder = ReportBuilder::new(ReportOptions::default());
    let rows = builder.rows(&outcome.accumulator);
    assert!(builder.render(&rows).is_err());
}

#[test]
fn test_module_directories_only() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("Podfile"), "pod 'Alamofire'\n").unwrap();
    write_source(
        dir.path(),
        "Pods/Alamofire/Source/Session.swift",
        &[decl("class", "Session", "public")],
    );
    write_source(dir.path(), "Scripts/Tool.swift", &[decl("class", "Tool", "public")]);

    let catalog = discover_modules(dir.path());
    let extractor = cat_extractor(dir.path(), ModuleStrategy::Manifest);
    let mut session = ScanSession::new(GroupBy::Module);
    let mut walker = TreeWalker::new(ScanConfig::default(), extractor, NoProgress);
    walker.scan_module_directories(dir.path(), &catalog, &mut session);
    let outcome = session.finish();

    let names: Vec<&str> = outcome.accumulator.records().map(|r| r.name()).collect();
    assert_eq!(names, vec!["Session"]);
    assert!(outcome.accumulator.group("Alamofire").is_some());
}
