//! Per-file and per-run scan records.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::analysis::{FileAst, Language, ParserTier};
use crate::cache::{ast_pool, ObjectPool, Poolable};
use crate::detect::{Severity, Violation};

/// Violation slots a pooled result starts with.
const RESULT_VIOLATION_CAPACITY: usize = 50;

/// Results holding more violations than this are not pooled.
const RESULT_RETAIN_LIMIT: usize = 200;

/// A discovered source file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub name: String,
    pub extension: String,
    pub size: u64,
    /// Filled in once the file has been read.
    pub lines: usize,
    /// Unix seconds.
    pub modified: u64,
    pub language: Language,
    pub scanned: bool,
    pub error: Option<String>,
}

/// Line and declaration counts for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileMetrics {
    pub total_lines: usize,
    pub code_lines: usize,
    pub comment_lines: usize,
    pub blank_lines: usize,
    pub function_count: usize,
    pub type_count: usize,
    /// Sum of function complexities.
    pub complexity_score: u32,
}

impl FileMetrics {
    /// Count lines of `source` and declarations of `ast`. Go and Rust share
    /// `//` and `/* */` comment syntax.
    pub fn measure(source: &str, ast: &FileAst) -> Self {
        let mut metrics = FileMetrics {
            function_count: ast.functions.len(),
            type_count: ast.types.len(),
            complexity_score: ast.total_complexity(),
            ..FileMetrics::default()
        };

        let mut in_block = false;
        for line in source.lines() {
            metrics.total_lines += 1;
            let trimmed = line.trim();
            if in_block {
                metrics.comment_lines += 1;
                if trimmed.contains("*/") {
                    in_block = false;
                }
            } else if trimmed.is_empty() {
                metrics.blank_lines += 1;
            } else if trimmed.starts_with("//") {
                metrics.comment_lines += 1;
            } else if trimmed.starts_with("/*") {
                metrics.comment_lines += 1;
                in_block = !trimmed.contains("*/");
            } else {
                metrics.code_lines += 1;
            }
        }

        metrics
    }
}

/// Outcome for one file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub file: FileDescriptor,
    #[serde(skip)]
    pub ast: Option<Arc<FileAst>>,
    pub violations: Vec<Violation>,
    pub metrics: FileMetrics,
}

impl ScanResult {
    pub fn provenance(&self) -> Option<ParserTier> {
        self.ast.as_ref().map(|a| a.provenance)
    }
}

impl Poolable for ScanResult {
    fn fresh() -> Self {
        ScanResult {
            violations: Vec::with_capacity(RESULT_VIOLATION_CAPACITY),
            ..ScanResult::default()
        }
    }

    fn reset(&mut self) {
        self.file = FileDescriptor::default();
        if let Some(ast) = self.ast.take() {
            if let Ok(ast) = Arc::try_unwrap(ast) {
                ast_pool().release(ast);
            }
        }
        self.violations.clear();
        self.metrics = FileMetrics::default();
    }

    fn is_oversized(&self) -> bool {
        self.violations.len() > RESULT_RETAIN_LIMIT
    }
}

static RESULT_POOL: Lazy<ObjectPool<ScanResult>> = Lazy::new(ObjectPool::default);

/// Process-wide pool of scan results.
pub fn result_pool() -> &'static ObjectPool<ScanResult> {
    &RESULT_POOL
}

/// Aggregate of one scan run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub total_files: usize,
    pub scanned_files: usize,
    pub skipped_files: usize,
    pub total_violations: usize,
    pub error_violations: usize,
    pub violations_by_type: BTreeMap<String, usize>,
    /// Files per parser tier that produced their tree.
    pub files_by_tier: BTreeMap<String, usize>,
    pub errors: Vec<String>,
    /// Unix milliseconds.
    pub started_at: u64,
    pub duration_ms: u64,
}

impl ScanSummary {
    /// Reduce per-file results into a summary.
    pub fn from_results(results: &[ScanResult], started_at: u64, duration_ms: u64) -> Self {
        let mut summary = ScanSummary {
            total_files: results.len(),
            started_at,
            duration_ms,
            ..ScanSummary::default()
        };

        for result in results {
            if result.file.scanned {
                summary.scanned_files += 1;
            } else {
                summary.skipped_files += 1;
            }
            if let Some(error) = &result.file.error {
                summary
                    .errors
                    .push(format!("{}: {}", result.file.path.display(), error));
            }
            if let Some(tier) = result.provenance() {
                *summary.files_by_tier.entry(tier.to_string()).or_insert(0) += 1;
            }
            for violation in &result.violations {
                summary.total_violations += 1;
                if violation.severity == Severity::Error {
                    summary.error_violations += 1;
                }
                *summary
                    .violations_by_type
                    .entry(violation.rule.to_string())
                    .or_insert(0) += 1;
            }
        }

        summary
    }

    pub fn has_errors(&self) -> bool {
        self.error_violations > 0
    }
}
