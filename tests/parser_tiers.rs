//! Parser tier behavior under concurrency and resource limits.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use tierscan::analysis::ParserTier;
use tierscan::cache::{content_hash, AstCache};
use tierscan::parser::{ManagerOptions, TierManager};
use tierscan::ParseError;

const THREADS: usize = 20;
const PARSES_PER_THREAD: usize = 100;

fn sources() -> Vec<(PathBuf, String)> {
    (0..5)
        .map(|i| {
            (
                PathBuf::from(format!("src/m{}.rs", i)),
                format!("pub fn f{}(x: u32) -> u32 {{\n    x + {}\n}}\n", i, i),
            )
        })
        .collect()
}

#[test]
fn test_concurrent_lookups_are_all_counted() {
    let manager = Arc::new(TierManager::new());
    let cache = Arc::new(AstCache::default());
    let sources = Arc::new(sources());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let manager = Arc::clone(&manager);
            let cache = Arc::clone(&cache);
            let sources = Arc::clone(&sources);
            thread::spawn(move || {
                for i in 0..PARSES_PER_THREAD {
                    let (path, source) = &sources[(t + i) % sources.len()];
                    let hash = content_hash(source.as_bytes());
                    if cache.get(path, hash).is_none() {
                        let ast = manager.parse(path, source.as_bytes()).unwrap();
                        assert_eq!(ast.functions.len(), 1);
                        cache.put(path, Arc::new(ast), hash);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let metrics = cache.metrics();
    assert_eq!(metrics.hits + metrics.misses, (THREADS * PARSES_PER_THREAD) as u64);
    assert!(metrics.misses >= 5);
    assert_eq!(cache.len(), 5);
}

#[test]
fn test_heuristic_tier_when_native_disabled() {
    let manager = TierManager::with_options(ManagerOptions {
        disable_native: true,
        ..ManagerOptions::default()
    });
    assert_eq!(manager.tier(), ParserTier::Heuristic);
    assert!(manager.fallback_reason().is_some());

    let ast = manager
        .parse(Path::new("lib.rs"), b"pub struct A;\npub fn make() -> A { A }\n")
        .unwrap();
    assert_eq!(ast.provenance, ParserTier::Heuristic);
    assert_eq!(ast.types.len(), 1);
    assert_eq!(ast.functions.len(), 1);
    assert!(matches!(
        manager.parse_expression("1 + 2"),
        Err(ParseError::Unsupported(_))
    ));

    let caps = manager.capabilities();
    assert!(!caps.features.complexity);
    assert!(caps.features.functions);
}

#[test]
fn test_stub_tier_when_everything_disabled() {
    let manager = TierManager::with_options(ManagerOptions {
        disable_native: true,
        disable_heuristic: true,
        ..ManagerOptions::default()
    });
    assert_eq!(manager.tier(), ParserTier::Stub);
    assert!(matches!(
        manager.parse(Path::new("a.rs"), b"fn a() {}"),
        Err(ParseError::Unavailable(_))
    ));
}

#[cfg(feature = "rust-native")]
mod native {
    use super::*;
    use tierscan::parser::NativeRustParser;

    #[test]
    fn test_no_outstanding_handles_after_concurrent_parses() {
        let parser = Arc::new(NativeRustParser::new().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let parser = Arc::clone(&parser);
                thread::spawn(move || {
                    for i in 0..25 {
                        let source = format!("fn f{}_{}() -> u8 {{ if true {{ 1 }} else {{ 2 }} }}", t, i);
                        let ast = parser.parse(Path::new("lib.rs"), source.as_bytes()).unwrap();
                        assert_eq!(ast.functions[0].complexity, 2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = parser.memory_stats();
        assert_eq!(stats.outstanding_handles, 0);
        assert_eq!(stats.in_flight_calls, 0);
        assert!(parser.validate_memory_state().is_ok());
    }

    #[test]
    fn test_oversized_input_rejected_without_allocating() {
        let manager = TierManager::new();
        assert_eq!(manager.tier(), ParserTier::Native);
        let native = manager.native().unwrap();
        let before = native.memory_stats().outstanding_handles;

        let huge = vec![b'a'; 100 * 1024 * 1024];
        let err = manager.parse(Path::new("huge.rs"), &huge).unwrap_err();
        assert!(matches!(err, ParseError::TooLarge { .. }));
        assert_eq!(native.memory_stats().outstanding_handles, before);
        assert_eq!(manager.status().fallbacks, 0);
    }

    #[test]
    fn test_syntax_error_falls_back_per_call() {
        let manager = TierManager::new();
        let ast = manager
            .parse(Path::new("broken.rs"), b"pub fn ok() {}\npub fn broken( {\n")
            .unwrap();
        assert_eq!(ast.provenance, ParserTier::Heuristic);
        assert_eq!(manager.tier(), ParserTier::Native);
        assert_eq!(manager.status().fallbacks, 1);
        assert_eq!(manager.native().unwrap().memory_stats().consecutive_failures, 0);
    }
}
