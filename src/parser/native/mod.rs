//! Native Rust parser adapter.
//!
//! Rust source is parsed by the tree-sitter C runtime with the Rust grammar.
//! Everything that crosses into the runtime is tracked:
//!
//! - parsers and trees are [`ForeignHandle`]s counted by an
//!   [`AllocationLedger`], released on every exit path including unwinding;
//! - calls in flight are registered with their start instant;
//! - consecutive backend failures feed a circuit breaker.
//!
//! A background [`monitor`] thread logs the ledger and trims idle parsers
//! under allocation pressure. Health is exposed through
//! [`NativeRustParser::validate_memory_state`].
//!
//! Without the `rust-native` feature the grammar is not linked and
//! [`NativeRustParser::new`] fails with [`ParseError::Unavailable`].

mod extract;
pub mod handle;
mod monitor;

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, Query, QueryCursor, Tree};

use self::extract::{Extractor, COMPLEXITY_QUERY};
use self::handle::{AllocationLedger, ForeignHandle, ParserPool};
use self::monitor::Monitor;
use super::module_name;
use crate::analysis::{first_error_line, FileAst, Language as SourceLanguage, ParsedFile, ParserTier, TypeKind};
use crate::cache::ast_pool;
use crate::error::{MemoryFault, ParseError};

/// Largest input accepted, checked before any foreign allocation.
pub const MAX_INPUT_BYTES: usize = 50 * 1024 * 1024;

/// Snippet parsed to confirm the backend works before it is put into service.
pub const VERIFY_SNIPPET: &str = "fn test_function() -> i32 { 42 } struct TestStruct { field: i32, }";

/// Idle parsers kept after a pressure trim.
const IDLE_AFTER_TRIM: usize = 2;

#[cfg(feature = "rust-native")]
fn rust_language() -> Result<Language, ParseError> {
    Ok(tree_sitter_rust::LANGUAGE.into())
}

#[cfg(not(feature = "rust-native"))]
fn rust_language() -> Result<Language, ParseError> {
    Err(ParseError::Unavailable(
        "built without the rust-native feature".to_string(),
    ))
}

/// What the native adapter extracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    /// Detect outer doc comments.
    pub include_docs: bool,
    /// Keep column positions. Lines are always kept.
    pub include_positions: bool,
    /// Extract `macro_rules!` definitions.
    pub parse_macros: bool,
    /// Keep declarations without a `pub` modifier.
    pub include_private: bool,
    /// Upper bound on the complexity reported for one function.
    pub max_complexity_calc: u32,
    /// Keep generic arguments in type strings.
    pub include_generics: bool,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            include_docs: true,
            include_positions: true,
            parse_macros: true,
            include_private: true,
            max_complexity_calc: 100,
            include_generics: true,
        }
    }
}

/// Thresholds used by the health checks and the monitor.
#[derive(Debug, Clone)]
pub struct MemoryLimits {
    /// Breaker trips when consecutive failures exceed this.
    pub max_consecutive_failures: u32,
    /// A call open longer than this is reported as stalled.
    pub stall_after: Duration,
    /// Monitor wake-up interval.
    pub monitor_interval: Duration,
    /// Outstanding handles above which the monitor trims idle parsers.
    pub pressure_threshold: i64,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 10,
            stall_after: Duration::from_secs(30 * 60),
            monitor_interval: Duration::from_secs(5 * 60),
            pressure_threshold: 100,
        }
    }
}

/// Snapshot of the adapter's bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub outstanding_handles: i64,
    pub handles_allocated: u64,
    pub handles_released: u64,
    pub in_flight_calls: usize,
    pub consecutive_failures: u32,
    pub total_parses: u64,
    pub failed_parses: u64,
    pub idle_parsers: usize,
    /// Unix seconds of the last monitor pass.
    pub last_cleanup: Option<u64>,
    pub monitor_running: bool,
}

/// Measurements from a single parse.
#[derive(Debug, Clone, Serialize)]
pub struct ParseStats {
    pub duration_ms: f64,
    pub input_bytes: usize,
    pub node_count: usize,
    pub error_nodes: usize,
    pub missing_nodes: usize,
    pub has_errors: bool,
    /// File-wide decision points plus one per function.
    pub complexity: u32,
    /// Occurrences of interesting constructs by name.
    pub features: BTreeMap<&'static str, usize>,
    pub parser_version: String,
}

/// The outermost node of a parsed expression.
#[derive(Debug, Clone, Serialize)]
pub struct ExpressionInfo {
    pub kind: String,
    pub text: String,
    pub child_count: usize,
    pub sexp: String,
}

/// What the linked library supports.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryCapabilities {
    pub version: String,
    pub abi_version: usize,
    pub features: Vec<&'static str>,
    pub max_input_bytes: usize,
    pub max_consecutive_failures: u32,
}

const SUPPORTED_FEATURES: &[&str] = &[
    "functions",
    "methods",
    "structs",
    "enums",
    "traits",
    "impls",
    "modules",
    "constants",
    "statics",
    "imports",
    "macros",
    "doc_comments",
    "complexity",
    "expressions",
    "syntax_validation",
];

/// State shared between the adapter and its monitor thread.
struct AdapterState {
    ledger: Arc<AllocationLedger>,
    parsers: ParserPool,
    in_flight: Mutex<BTreeMap<u64, Instant>>,
    next_call: AtomicU64,
    consecutive_failures: AtomicU32,
    total_parses: AtomicU64,
    failed_parses: AtomicU64,
    last_cleanup: Mutex<Option<SystemTime>>,
    limits: MemoryLimits,
}

impl AdapterState {
    fn begin_call(&self) -> CallGuard<'_> {
        let id = self.next_call.fetch_add(1, Ordering::Relaxed);
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Instant::now());
        CallGuard { state: self, id }
    }

    fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn oldest_call_age(&self) -> Option<Duration> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .min()
            .map(Instant::elapsed)
    }

    fn record_success(&self) {
        self.total_parses.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    fn record_failure(&self, error: ParseError) -> ParseError {
        self.total_parses.fetch_add(1, Ordering::Relaxed);
        self.failed_parses.fetch_add(1, Ordering::Relaxed);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(error = %error, consecutive = failures, "native parser failure");
        error
    }

    /// One monitor pass.
    fn maintain(&self) {
        let outstanding = self.ledger.outstanding();
        tracing::debug!(
            outstanding,
            in_flight = self.in_flight(),
            idle_parsers = self.parsers.idle(),
            "native parser health check"
        );
        if outstanding > self.limits.pressure_threshold {
            let freed = self.parsers.trim(IDLE_AFTER_TRIM);
            tracing::warn!(outstanding, freed, "native parser under allocation pressure, trimmed idle parsers");
        }
        *self.last_cleanup.lock().unwrap_or_else(PoisonError::into_inner) = Some(SystemTime::now());
    }
}

/// Registration of one call in flight, removed on drop.
struct CallGuard<'a> {
    state: &'a AdapterState,
    id: u64,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.state
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Rust parser backed by the tree-sitter runtime.
pub struct NativeRustParser {
    // Declared first so the monitor stops before the state it inspects.
    monitor: Monitor,
    state: Arc<AdapterState>,
    config: NativeConfig,
    complexity_query: Query,
}

impl NativeRustParser {
    pub fn new() -> Result<Self, ParseError> {
        Self::with_limits(NativeConfig::default(), MemoryLimits::default())
    }

    pub fn with_config(config: NativeConfig) -> Result<Self, ParseError> {
        Self::with_limits(config, MemoryLimits::default())
    }

    pub fn with_limits(config: NativeConfig, limits: MemoryLimits) -> Result<Self, ParseError> {
        let language = rust_language()?;
        let complexity_query = Query::new(&language, COMPLEXITY_QUERY)
            .map_err(|e| ParseError::Unavailable(format!("rust complexity query: {}", e)))?;

        let ledger = Arc::new(AllocationLedger::new());
        let state = Arc::new(AdapterState {
            parsers: ParserPool::new(language, Arc::clone(&ledger)),
            ledger,
            in_flight: Mutex::new(BTreeMap::new()),
            next_call: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            total_parses: AtomicU64::new(0),
            failed_parses: AtomicU64::new(0),
            last_cleanup: Mutex::new(None),
            limits,
        });
        let monitor = Monitor::spawn(state.limits.monitor_interval, Arc::downgrade(&state));

        Ok(Self {
            monitor,
            state,
            config,
            complexity_query,
        })
    }

    pub fn config(&self) -> &NativeConfig {
        &self.config
    }

    /// Parse the canned snippet and confirm one function and one struct.
    pub fn verify(&self) -> Result<(), ParseError> {
        let ast = self.parse(Path::new("verify.rs"), VERIFY_SNIPPET.as_bytes())?;
        let functions = ast.functions.len();
        let structs = ast.types.iter().filter(|t| t.kind == TypeKind::Struct).count();
        ast_pool().release(ast);

        if functions == 1 && structs == 1 {
            Ok(())
        } else {
            Err(ParseError::Unavailable(format!(
                "native self-check found {} functions and {} structs, expected 1 and 1",
                functions, structs
            )))
        }
    }

    /// Parse with the adapter's own configuration.
    pub fn parse(&self, path: &Path, content: &[u8]) -> Result<FileAst, ParseError> {
        self.parse_with_config(path, content, &self.config)
    }

    /// Parse with a caller-supplied configuration.
    pub fn parse_with_config(
        &self,
        path: &Path,
        content: &[u8],
        config: &NativeConfig,
    ) -> Result<FileAst, ParseError> {
        self.admit(content)?;
        let path_str = path.to_string_lossy().to_string();
        if content.contains(&0) || std::str::from_utf8(content).is_err() {
            return Err(ParseError::NotText { path: path_str });
        }

        let _call = self.state.begin_call();
        let tree = self.parse_tree(content)?;
        let root = tree.root_node();
        if root.has_error() {
            // Input problem: the breaker is left alone.
            return Err(ParseError::Syntax {
                path: path_str,
                line: first_error_line(root),
            });
        }

        let translated = panic::catch_unwind(AssertUnwindSafe(|| {
            let parsed = ParsedFile::new(&tree, content, &path_str);
            let mut ast = ast_pool().acquire();
            ast.path = path_str.clone();
            ast.language = SourceLanguage::Rust;
            ast.provenance = ParserTier::Native;
            ast.module = module_name(path);
            Extractor::new(&parsed, config, &self.complexity_query).extract(&mut ast);
            ast
        }));

        match translated {
            Ok(ast) => {
                self.state.record_success();
                tracing::trace!(
                    path = %path_str,
                    functions = ast.functions.len(),
                    types = ast.types.len(),
                    "parsed rust file"
                );
                Ok(ast)
            }
            Err(_) => Err(self
                .state
                .record_failure(ParseError::Backend("panic while translating syntax tree".to_string()))),
        }
    }

    /// Whether `content` parses without syntax errors.
    pub fn validate_syntax(&self, content: &[u8]) -> Result<bool, ParseError> {
        self.admit(content)?;
        let _call = self.state.begin_call();
        let tree = self.parse_tree(content)?;
        let valid = !tree.root_node().has_error();
        Ok(valid)
    }

    /// Parse a single expression and describe its outermost node.
    pub fn parse_expression(&self, expr: &str) -> Result<ExpressionInfo, ParseError> {
        let wrapped = format!("fn __expression() {{ {} }}", expr);
        let source = wrapped.as_bytes();
        self.admit(source)?;

        let _call = self.state.begin_call();
        let tree = self.parse_tree(source)?;
        let root = tree.root_node();
        let invalid = || ParseError::Syntax {
            path: "<expression>".to_string(),
            line: 1,
        };
        if root.has_error() {
            return Err(invalid());
        }

        let body = root
            .named_child(0)
            .and_then(|f| f.child_by_field_name("body"))
            .ok_or_else(invalid)?;
        let last = body
            .named_child(body.named_child_count().saturating_sub(1))
            .ok_or_else(invalid)?;
        let node = if last.kind() == "expression_statement" {
            last.named_child(0).unwrap_or(last)
        } else {
            last
        };

        Ok(ExpressionInfo {
            kind: node.kind().to_string(),
            text: node.utf8_text(source).unwrap_or("").to_string(),
            child_count: node.named_child_count(),
            sexp: node.to_sexp(),
        })
    }

    /// Parse `content` and measure the tree.
    pub fn parse_stats(&self, content: &[u8]) -> Result<ParseStats, ParseError> {
        self.admit(content)?;
        let started = Instant::now();
        let _call = self.state.begin_call();
        let tree = self.parse_tree(content)?;
        let root = tree.root_node();

        let mut node_count = 0;
        let mut error_nodes = 0;
        let mut missing_nodes = 0;
        let mut features: BTreeMap<&'static str, usize> = BTreeMap::new();

        let mut cursor = root.walk();
        'walk: loop {
            let node = cursor.node();
            node_count += 1;
            if node.is_error() {
                error_nodes += 1;
            }
            if node.is_missing() {
                missing_nodes += 1;
            }
            if let Some(feature) = feature_name(node) {
                *features.entry(feature).or_insert(0) += 1;
            }

            if cursor.goto_first_child() {
                continue;
            }
            while !cursor.goto_next_sibling() {
                if !cursor.goto_parent() {
                    break 'walk;
                }
            }
        }

        let functions = features.get("functions").copied().unwrap_or(0) as u32;
        let complexity = functions + self.decision_points(root, content);

        Ok(ParseStats {
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            input_bytes: content.len(),
            node_count,
            error_nodes,
            missing_nodes,
            has_errors: root.has_error(),
            complexity,
            features,
            parser_version: self.version(),
        })
    }

    pub fn capabilities(&self) -> LibraryCapabilities {
        LibraryCapabilities {
            version: self.version(),
            abi_version: self.state.parsers.language().version(),
            features: SUPPORTED_FEATURES.to_vec(),
            max_input_bytes: MAX_INPUT_BYTES,
            max_consecutive_failures: self.state.limits.max_consecutive_failures,
        }
    }

    pub fn version(&self) -> String {
        format!(
            "tree-sitter-rust (ABI {})",
            self.state.parsers.language().version()
        )
    }

    pub fn memory_stats(&self) -> MemoryStats {
        let last_cleanup = *self
            .state
            .last_cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let last_cleanup = last_cleanup
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs());

        MemoryStats {
            outstanding_handles: self.state.ledger.outstanding(),
            handles_allocated: self.state.ledger.allocated(),
            handles_released: self.state.ledger.released(),
            in_flight_calls: self.state.in_flight(),
            consecutive_failures: self.state.consecutive_failures.load(Ordering::SeqCst),
            total_parses: self.state.total_parses.load(Ordering::Relaxed),
            failed_parses: self.state.failed_parses.load(Ordering::Relaxed),
            idle_parsers: self.state.parsers.idle(),
            last_cleanup,
            monitor_running: self.monitor.is_running(),
        }
    }

    /// Check the bookkeeping for leaks, instability and stalled calls.
    pub fn validate_memory_state(&self) -> Result<(), MemoryFault> {
        let outstanding = self.state.ledger.outstanding();
        let in_flight = self.state.in_flight();
        if outstanding > 2 * in_flight as i64 {
            return Err(MemoryFault::Leak {
                outstanding,
                in_flight,
            });
        }

        let failures = self.state.consecutive_failures.load(Ordering::SeqCst);
        if failures > self.state.limits.max_consecutive_failures {
            return Err(MemoryFault::Unstable(failures));
        }

        if let Some(age) = self.state.oldest_call_age() {
            if age > self.state.limits.stall_after {
                return Err(MemoryFault::Stalled(age));
            }
        }

        Ok(())
    }

    /// Run one monitor pass now.
    pub fn run_maintenance(&self) {
        self.state.maintain();
    }

    /// Size cap and circuit breaker, both checked before touching the runtime.
    fn admit(&self, content: &[u8]) -> Result<(), ParseError> {
        if content.len() > MAX_INPUT_BYTES {
            return Err(ParseError::TooLarge {
                size: content.len(),
                limit: MAX_INPUT_BYTES,
            });
        }
        let failures = self.state.consecutive_failures.load(Ordering::SeqCst);
        if failures > self.state.limits.max_consecutive_failures {
            return Err(ParseError::Unstable(failures));
        }
        Ok(())
    }

    fn parse_tree(&self, content: &[u8]) -> Result<ForeignHandle<Tree>, ParseError> {
        let mut parser = self
            .state
            .parsers
            .checkout()
            .map_err(|e| self.state.record_failure(e))?;
        let tree = parser.parse(content, None);
        self.state.parsers.checkin(parser);

        match tree {
            Some(tree) => Ok(ForeignHandle::track(tree, &self.state.ledger)),
            None => Err(self
                .state
                .record_failure(ParseError::Backend("parser returned no tree".to_string()))),
        }
    }

    fn decision_points(&self, root: Node, source: &[u8]) -> u32 {
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.complexity_query, root, source);
        let mut count = 0u32;
        while let Some(m) = matches.next() {
            count += m.captures.len() as u32;
        }
        count
    }
}

fn feature_name(node: Node) -> Option<&'static str> {
    Some(match node.kind() {
        "function_item" => "functions",
        "struct_item" => "structs",
        "enum_item" => "enums",
        "trait_item" => "traits",
        "impl_item" => "impls",
        "mod_item" => "modules",
        "macro_definition" => "macro_definitions",
        "macro_invocation" => "macro_invocations",
        "closure_expression" => "closures",
        "unsafe_block" => "unsafe_blocks",
        "async_block" => "async_blocks",
        "match_expression" => "match_expressions",
        _ => return None,
    })
}


#[cfg(all(test, not(feature = "rust-native")))]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_without_feature() {
        assert!(matches!(NativeRustParser::new(), Err(ParseError::Unavailable(_))));
    }
}
