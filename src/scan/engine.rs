//! Concurrent scan orchestration.
//!
//! ```text
//!  walker ──▶ producer ──[work]──▶ worker × N ──[results]──▶ caller
//!                                      │
//!                                      └──[errors]──▶ drain (log only)
//! ```
//!
//! Both channels are bounded at twice the worker count. Workers block on the
//! result channel (backpressure) but never on the error channel; an error
//! that does not fit is still recorded on its result.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use crossbeam_channel::bounded;

use super::{discover, result_pool, FileDescriptor, FileMetrics, ScanResult, ScanSummary};
use crate::analysis::{go_analyzer, FileAst, Language, LanguageAnalyzer};
use crate::cache::{content_hash, AstCache, CacheMetrics};
use crate::config::Config;
use crate::detect::DetectorRegistry;
use crate::error::ParseError;
use crate::parser::{global_manager, TierManager};

/// The progress callback fires on every this many completed files.
const PROGRESS_EVERY: usize = 10;

/// Progress notification passed to the scan callback.
#[derive(Debug, Clone)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    /// The file whose completion triggered this notification.
    pub current: PathBuf,
}

/// Scans a set of roots with a fixed configuration.
pub struct Engine {
    roots: Vec<PathBuf>,
    config: Config,
    manager: Arc<TierManager>,
    cache: AstCache,
    detectors: DetectorRegistry,
}

impl Engine {
    /// Engine using the process-wide parser manager when the parser section
    /// of `config` is left at its defaults.
    ///
    /// Fails only when the Go parser cannot be initialized.
    pub fn new(roots: Vec<PathBuf>, config: Config) -> anyhow::Result<Self> {
        go_analyzer().context("Go parser failed to initialize")?;

        let manager = if config.parser.is_default() {
            global_manager()
        } else {
            Arc::new(TierManager::with_options(config.parser.manager_options()))
        };
        Ok(Self::with_manager(roots, config, manager))
    }

    /// Engine sharing an existing parser manager.
    pub fn with_manager(roots: Vec<PathBuf>, config: Config, manager: Arc<TierManager>) -> Self {
        let cache = AstCache::new(config.cache.max_entries, config.cache.ttl());
        let detectors = DetectorRegistry::from_config(&config.detectors);
        Self {
            roots,
            config,
            manager,
            cache,
            detectors,
        }
    }

    /// Replace the built-in detectors.
    pub fn with_detectors(mut self, detectors: DetectorRegistry) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn manager(&self) -> &Arc<TierManager> {
        &self.manager
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scan(&self) -> anyhow::Result<(ScanSummary, Vec<ScanResult>)> {
        self.scan_with_progress(|_| {})
    }

    /// Scan every discovered file. Results come back in completion order.
    ///
    /// Per-file failures are recorded on their results; only a failed walk
    /// makes the scan itself fail.
    pub fn scan_with_progress<F>(&self, progress: F) -> anyhow::Result<(ScanSummary, Vec<ScanResult>)>
    where
        F: Fn(Progress) + Sync,
    {
        let started = Instant::now();
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        self.detectors.reset_all();
        self.cache.cleanup();

        let files = discover(&self.roots, &self.config.scan.walk_options())?;
        if files.is_empty() {
            tracing::info!("no files to scan");
            let elapsed = started.elapsed().as_millis() as u64;
            return Ok((ScanSummary::from_results(&[], started_at, elapsed), Vec::new()));
        }

        let total = files.len();
        let workers = self.config.scan.effective_workers().clamp(1, total);
        tracing::debug!(files = total, workers, "starting scan");

        let (work_tx, work_rx) = bounded::<FileDescriptor>(workers * 2);
        let (result_tx, result_rx) = bounded::<ScanResult>(workers * 2);
        let (error_tx, error_rx) = bounded::<String>(workers * 2);
        let completed = AtomicUsize::new(0);

        let (results, reported) = thread::scope(|s| {
            s.spawn(move || {
                for file in files {
                    if work_tx.send(file).is_err() {
                        break;
                    }
                }
            });

            let completed = &completed;
            let progress = &progress;
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                let error_tx = error_tx.clone();
                s.spawn(move || {
                    for file in work_rx.iter() {
                        let result = self.process(file);
                        if let Some(error) = &result.file.error {
                            let _ = error_tx.try_send(format!("{}: {}", result.file.path.display(), error));
                        }

                        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        if done % PROGRESS_EVERY == 0 || done == total {
                            progress(Progress {
                                completed: done,
                                total,
                                current: result.file.path.clone(),
                            });
                        }

                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(work_rx);
            drop(result_tx);
            drop(error_tx);

            let drain = s.spawn(move || {
                let mut count = 0usize;
                for error in error_rx.iter() {
                    tracing::warn!(%error, "file failed");
                    count += 1;
                }
                count
            });

            let results: Vec<ScanResult> = result_rx.iter().collect();
            let reported = drain.join().unwrap_or(0);
            (results, reported)
        });

        let duration_ms = started.elapsed().as_millis() as u64;
        let summary = ScanSummary::from_results(&results, started_at, duration_ms);
        tracing::info!(
            scanned = summary.scanned_files,
            skipped = summary.skipped_files,
            violations = summary.total_violations,
            errors_reported = reported,
            duration_ms,
            "scan finished"
        );
        Ok((summary, results))
    }

    fn process(&self, mut file: FileDescriptor) -> ScanResult {
        let mut result = result_pool().acquire();

        let source = match fs::read(&file.path) {
            Ok(source) => source,
            Err(e) => {
                file.error = Some(format!("read failed: {}", e));
                result.file = file;
                return result;
            }
        };
        file.lines = line_count(&source);

        match self.parse(&file.path, file.language, &source) {
            Ok(ast) => {
                let text = String::from_utf8_lossy(&source);
                result.metrics = FileMetrics::measure(&text, &ast);
                result.violations.extend(self.detectors.detect_all(&file, &ast));
                result.ast = Some(ast);
                file.scanned = true;
            }
            Err(e) => {
                tracing::debug!(path = %file.path.display(), error = %e, "parse failed");
                file.error = Some(e.to_string());
            }
        }

        result.file = file;
        result
    }

    fn parse(&self, path: &Path, language: Language, source: &[u8]) -> Result<Arc<FileAst>, ParseError> {
        match language {
            Language::Go => go_analyzer()?.analyze(path, source).map(Arc::new),
            Language::Rust => {
                let hash = content_hash(source);
                if let Some(ast) = self.cache.get(path, hash) {
                    return Ok(ast);
                }
                let ast = Arc::new(self.manager.parse(path, source)?);
                self.cache.put(path, Arc::clone(&ast), hash);
                Ok(ast)
            }
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        self.cache.reset_metrics();
    }

    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }

    /// Hand results back to the shared pool once the caller is done with them.
    pub fn release_results(&self, results: Vec<ScanResult>) {
        let pool = result_pool();
        for result in results {
            pool.release(result);
        }
    }
}

fn line_count(source: &[u8]) -> usize {
    if source.is_empty() {
        return 0;
    }
    let newlines = source.iter().filter(|&&b| b == b'\n').count();
    if source.ends_with(b"\n") {
        newlines
    } else {
        newlines + 1
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::parser::ManagerOptions;

    const GO_SOURCE: &str = "package main\n\nfunc Run(x int) int {\n\tif x > 0 {\n\t\treturn x\n\t}\n\treturn 0\n}\n";
    const RUST_SOURCE: &str = "pub fn first() {}\n\npub fn second() -> u8 {\n    1\n}\n";

    fn heuristic_engine(root: &Path) -> Engine {
        let manager = Arc::new(TierManager::with_options(ManagerOptions {
            disable_native: true,
            ..ManagerOptions::default()
        }));
        Engine::with_manager(vec![root.to_path_buf()], Config::default(), manager)
    }

    #[test]
    fn test_line_count() {
        assert_eq!(line_count(b""), 0);
        assert_eq!(line_count(b"a"), 1);
        assert_eq!(line_count(b"a\n"), 1);
        assert_eq!(line_count(b"a\nb"), 2);
    }

    #[test]
    fn test_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let engine = heuristic_engine(dir.path());
        let (summary, results) = engine.scan().unwrap();
        assert_eq!(summary.total_files, 0);
        assert!(results.is_empty());
    }

    #[test]
    fn test_scan_mixed_languages() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.go"), GO_SOURCE).unwrap();
        fs::write(dir.path().join("lib.rs"), RUST_SOURCE).unwrap();

        let engine = heuristic_engine(dir.path());
        let (summary, mut results) = engine.scan().unwrap();
        assert_eq!(summary.total_files, 2);
        assert_eq!(summary.scanned_files, 2);
        assert!(summary.errors.is_empty());

        results.sort_by(|a, b| a.file.path.cmp(&b.file.path));
        let rust = &results[0];
        let go = &results[1];

        let go_ast = go.ast.as_ref().unwrap();
        assert_eq!(go_ast.functions[0].name, "Run");
        assert_eq!(go_ast.functions[0].complexity, 2);
        assert_eq!(go.file.lines, 8);
        assert_eq!(go.metrics.function_count, 1);

        let rust_ast = rust.ast.as_ref().unwrap();
        assert_eq!(rust_ast.functions.len(), 2);
        assert_eq!(rust.provenance(), Some(crate::analysis::ParserTier::Heuristic));

        engine.release_results(results);
    }

    #[test]
    fn test_failed_file_does_not_fail_scan() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            fs::write(dir.path().join(format!("ok{}.go", i)), GO_SOURCE).unwrap();
        }
        fs::write(dir.path().join("broken.go"), "package main\n\nfunc (\n").unwrap();

        let engine = heuristic_engine(dir.path());
        let (summary, results) = engine.scan().unwrap();
        assert_eq!(summary.total_files, 4);
        assert_eq!(summary.scanned_files, 3);
        assert_eq!(summary.skipped_files, 1);
        assert_eq!(summary.errors.len(), 1);

        let broken = results.iter().find(|r| r.file.name == "broken.go").unwrap();
        assert!(broken.ast.is_none());
        assert!(broken.file.error.as_deref().unwrap().contains("syntax error"));
    }

    #[test]
    fn test_unreadable_file_becomes_result_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = heuristic_engine(dir.path());
        let file = FileDescriptor {
            path: dir.path().join("vanished.go"),
            name: "vanished.go".to_string(),
            extension: "go".to_string(),
            language: Language::Go,
            ..FileDescriptor::default()
        };

        let result = engine.process(file);
        assert!(!result.file.scanned);
        assert!(result.ast.is_none());
        assert!(result.file.error.as_deref().unwrap().starts_with("read failed"));
    }

    #[test]
    fn test_progress_and_cache_reuse() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..25 {
            fs::write(dir.path().join(format!("m{:02}.rs", i)), RUST_SOURCE).unwrap();
        }

        let engine = heuristic_engine(dir.path());
        let seen = Mutex::new(Vec::new());
        let (summary, _) = engine
            .scan_with_progress(|p| seen.lock().unwrap().push((p.completed, p.total)))
            .unwrap();
        assert_eq!(summary.scanned_files, 25);
        let seen = seen.into_inner().unwrap();
        let mut counts: Vec<usize> = seen.iter().map(|(c, _)| *c).collect();
        counts.sort_unstable();
        assert_eq!(counts, vec![10, 20, 25]);
        assert!(seen.iter().all(|(_, t)| *t == 25));

        let first = engine.cache_metrics();
        assert_eq!(first.misses, 25);
        assert_eq!(first.entries, 25);

        engine.scan().unwrap();
        assert_eq!(engine.cache_metrics().hits, 25);

        engine.clear_cache();
        let cleared = engine.cache_metrics();
        assert_eq!(cleared.entries, 0);
        assert_eq!(cleared.hits, 0);
    }

    #[test]
    fn test_duplicates_reset_between_scans() {
        let dir = tempfile::tempdir().unwrap();
        let body = "package main\n\nfunc Same(a int) int {\n\tb := a\n\tc := b\n\td := c\n\treturn d\n}\n";
        fs::write(dir.path().join("a.go"), body).unwrap();
        fs::write(dir.path().join("b.go"), body).unwrap();

        let engine = heuristic_engine(dir.path());
        for _ in 0..2 {
            let (summary, _) = engine.scan().unwrap();
            assert_eq!(summary.violations_by_type.get("duplicate_signature"), Some(&1));
        }
    }
}
