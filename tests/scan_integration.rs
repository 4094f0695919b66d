//! End-to-end scans over temporary source trees.

use std::fs;
use std::path::Path;

use tierscan::analysis::{Language, ParserTier};
use tierscan::{Config, Engine, ScanResult};

const GO_SOURCE: &str = r#"package main

import "fmt"

// Greet prints a greeting when a name is given.
func Greet(name string) {
	if name != "" {
		fmt.Println("hello", name)
	}
}
"#;

const RUST_SOURCE: &str = r#"/// First.
pub fn first(x: u32) -> u32 {
    x + 1
}

pub fn second() {}
"#;

fn write(root: &Path, name: &str, content: &[u8]) {
    fs::write(root.join(name), content).unwrap();
}

fn by_name<'a>(results: &'a [ScanResult], name: &str) -> &'a ScanResult {
    results
        .iter()
        .find(|r| r.file.name == name)
        .unwrap_or_else(|| panic!("no result for {}", name))
}

#[test]
fn test_scan_go_and_rust() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.go", GO_SOURCE.as_bytes());
    write(dir.path(), "lib.rs", RUST_SOURCE.as_bytes());

    let engine = Engine::new(vec![dir.path().to_path_buf()], Config::default()).unwrap();
    let (summary, results) = engine.scan().unwrap();

    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.scanned_files, 2);
    assert_eq!(summary.skipped_files, 0);
    assert!(summary.errors.is_empty());

    let go = by_name(&results, "main.go");
    assert_eq!(go.file.language, Language::Go);
    let go_ast = go.ast.as_ref().unwrap();
    assert_eq!(go_ast.functions.len(), 1);
    let greet = &go_ast.functions[0];
    assert_eq!(greet.name, "Greet");
    assert!(greet.is_exported());
    assert_eq!(greet.complexity, 2);
    assert_eq!(go_ast.imports.len(), 1);

    let rust = by_name(&results, "lib.rs");
    assert_eq!(rust.file.language, Language::Rust);
    let rust_ast = rust.ast.as_ref().unwrap();
    assert_eq!(rust_ast.functions.len(), 2);
    assert!(rust_ast.functions.iter().all(|f| f.is_exported()));
    assert_ne!(rust.provenance(), Some(ParserTier::Stub));
    assert_eq!(
        summary.files_by_tier.values().sum::<usize>(),
        2,
        "every scanned file records its tier"
    );

    engine.release_results(results);
}

#[test]
fn test_one_bad_file_among_valid_ones() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..9 {
        let source = format!("package main\n\nfunc F{}() int {{\n\treturn {}\n}}\n", i, i);
        write(dir.path(), &format!("f{}.go", i), source.as_bytes());
    }
    // NUL bytes: neither Rust tier accepts the file.
    write(dir.path(), "blob.rs", b"fn a() {}\0\0\0");

    let engine = Engine::new(vec![dir.path().to_path_buf()], Config::default()).unwrap();
    let (summary, results) = engine.scan().unwrap();

    assert_eq!(summary.total_files, 10);
    assert_eq!(summary.scanned_files, 9);
    assert_eq!(summary.errors.len(), 1);

    let failed: Vec<&ScanResult> = results.iter().filter(|r| r.file.error.is_some()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].file.name, "blob.rs");
    assert!(!failed[0].file.scanned);
    assert!(failed[0].ast.is_none());
}

#[test]
fn test_complexity_violation_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = String::from("package main\n\nfunc Branchy(x int) int {\n");
    for i in 0..12 {
        body.push_str(&format!("\tif x == {} {{\n\t\treturn {}\n\t}}\n", i, i));
    }
    body.push_str("\treturn -1\n}\n");
    write(dir.path(), "branchy.go", body.as_bytes());

    let engine = Engine::new(vec![dir.path().to_path_buf()], Config::default()).unwrap();
    let (summary, results) = engine.scan().unwrap();

    assert_eq!(summary.violations_by_type.get("high_complexity"), Some(&1));
    let violation = &results[0].violations[0];
    assert_eq!(violation.line, 3);
    assert!(violation.message.contains("complexity 13"));
    assert!(!summary.has_errors(), "13 is a warning at the default limit of 10");
}

#[test]
fn test_config_file_drives_walker() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "keep.go", b"package main\n");
    fs::create_dir_all(dir.path().join("gen")).unwrap();
    write(&dir.path().join("gen"), "skip.go", b"package gen\n");
    let config_path = dir.path().join("tierscan.yaml");
    fs::write(&config_path, "scan:\n  exclude: [\"gen/**\"]\n  workers: 2\n").unwrap();

    let (config, _) = Config::load(Some(&config_path)).unwrap();
    let engine = Engine::new(vec![dir.path().to_path_buf()], config).unwrap();
    let (summary, results) = engine.scan().unwrap();

    assert_eq!(summary.total_files, 1);
    assert_eq!(results[0].file.name, "keep.go");
}

#[test]
fn test_file_removed_after_discovery() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..10 {
        let source = format!("package main\n\nfunc G{}() {{}}\n", i);
        write(dir.path(), &format!("a{:02}.go", i), source.as_bytes());
    }
    write(dir.path(), "z.go", b"package main\n");

    // One worker takes files in path order, so `z.go` is still unread when
    // progress fires for the tenth file.
    let mut config = Config::default();
    config.scan.workers = 1;
    let engine = Engine::new(vec![dir.path().to_path_buf()], config).unwrap();
    let doomed = dir.path().join("z.go");
    let (summary, results) = engine
        .scan_with_progress(|p| {
            if p.completed == 10 {
                fs::remove_file(&doomed).unwrap();
            }
        })
        .unwrap();

    assert_eq!(summary.total_files, 11);
    assert_eq!(summary.scanned_files, 10);
    assert_eq!(summary.errors.len(), 1);

    let gone = by_name(&results, "z.go");
    assert!(!gone.file.scanned);
    assert!(gone.ast.is_none());
    let error = gone.file.error.as_deref().unwrap();
    assert!(error.starts_with("read failed"), "{}", error);
    assert!(results
        .iter()
        .filter(|r| r.file.name != "z.go")
        .all(|r| r.file.scanned));
}
