//! Rust parsing through a tiered backend.
//!
//! The [`TierManager`] picks one backend at initialization and keeps it until
//! [`TierManager::cleanup`]:
//!
//! 1. [`NativeRustParser`]: tree-sitter Rust grammar behind tracked handles.
//! 2. [`HeuristicParser`]: line-oriented regex extraction, approximate.
//! 3. Stub: every parse fails with [`ParseError::Unavailable`].
//!
//! On the native tier a failed call is retried once through the heuristic
//! parser, so a single file the grammar chokes on still yields declarations.
//! Every [`FileAst`] records the tier that actually produced it.

pub mod heuristic;
pub mod native;
pub mod status;

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

pub use heuristic::HeuristicParser;
pub use native::{
    ExpressionInfo, LibraryCapabilities, MemoryLimits, MemoryStats, NativeConfig, NativeRustParser,
    ParseStats,
};
pub use status::{status_report, SelfTest, StatusReport};

use crate::analysis::{FileAst, Language, LanguageAnalyzer, ParserTier};
use crate::cache::ast_pool;
use crate::error::{MemoryFault, ParseError};

/// Errors kept for diagnostics.
const RECENT_ERROR_CAPACITY: usize = 10;

/// Set once the first degradation notice has been logged.
static DEGRADATION_NOTICE: AtomicBool = AtomicBool::new(false);
static NOTICES_EMITTED: AtomicU64 = AtomicU64::new(0);

/// Number of degradation notices logged by this process (0 or 1).
pub fn degradation_notices() -> u64 {
    NOTICES_EMITTED.load(Ordering::SeqCst)
}

fn notify_degradation(reason: &str) {
    if DEGRADATION_NOTICE
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        NOTICES_EMITTED.fetch_add(1, Ordering::SeqCst);
        tracing::warn!(
            reason,
            "native Rust parser unavailable; falling back to heuristic parsing, results are approximate"
        );
    }
}

/// Module name for a Rust source path.
///
/// `mod.rs`, `lib.rs` and `main.rs` take the name of their directory.
pub fn module_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    if matches!(stem, "mod" | "lib" | "main") {
        if let Some(dir) = path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) {
            return Some(dir.to_string());
        }
    }
    Some(stem.to_string())
}

/// How a manager chooses its tier.
#[derive(Debug, Clone, Default)]
pub struct ManagerOptions {
    pub native: NativeConfig,
    pub limits: MemoryLimits,
    /// Skip the native tier even when it is compiled in.
    pub disable_native: bool,
    /// Skip the heuristic tier, both as a tier and as a per-call fallback.
    pub disable_heuristic: bool,
}

/// What the active tier can extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureFlags {
    pub functions: bool,
    pub types: bool,
    pub impls: bool,
    pub macros: bool,
    pub precise_spans: bool,
    pub complexity: bool,
    pub doc_comments: bool,
    pub expressions: bool,
    pub syntax_validation: bool,
}

impl FeatureFlags {
    pub fn for_tier(tier: ParserTier) -> Self {
        match tier {
            ParserTier::Native => Self {
                functions: true,
                types: true,
                impls: true,
                macros: true,
                precise_spans: true,
                complexity: true,
                doc_comments: true,
                expressions: true,
                syntax_validation: true,
            },
            ParserTier::Heuristic => Self {
                functions: true,
                types: true,
                impls: true,
                macros: true,
                precise_spans: false,
                complexity: false,
                doc_comments: true,
                expressions: false,
                syntax_validation: true,
            },
            ParserTier::Stub => Self {
                functions: false,
                types: false,
                impls: false,
                macros: false,
                precise_spans: false,
                complexity: false,
                doc_comments: false,
                expressions: false,
                syntax_validation: false,
            },
        }
    }
}

/// Capabilities of the active tier.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub tier: ParserTier,
    pub accuracy: &'static str,
    pub performance: &'static str,
    pub features: FeatureFlags,
    pub fallback_reason: Option<String>,
    /// Present on the native tier.
    pub library: Option<LibraryCapabilities>,
}

/// Counters and state of a manager.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub tier: ParserTier,
    pub fallback_reason: Option<String>,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Calls retried through the heuristic parser.
    pub fallbacks: u64,
    pub success_rate: f64,
    pub recent_errors: Vec<String>,
    /// Unix seconds.
    pub initialized_at: u64,
    pub uptime_secs: u64,
    pub native_memory: Option<MemoryStats>,
}

pub fn accuracy_label(tier: ParserTier) -> &'static str {
    match tier {
        ParserTier::Native => "high",
        ParserTier::Heuristic => "basic",
        ParserTier::Stub => "none",
    }
}

pub fn performance_label(tier: ParserTier) -> &'static str {
    match tier {
        ParserTier::Native => "optimal",
        ParserTier::Heuristic => "good",
        ParserTier::Stub => "n/a",
    }
}

struct TierState {
    tier: ParserTier,
    native: Option<Arc<NativeRustParser>>,
    heuristic: Option<Arc<HeuristicParser>>,
    fallback_reason: Option<String>,
}

impl TierState {
    fn select(options: &ManagerOptions) -> Self {
        let heuristic = if options.disable_heuristic {
            Err("heuristic parser disabled".to_string())
        } else {
            let parser = HeuristicParser::new();
            parser.verify().map(|_| Arc::new(parser)).map_err(|e| e.to_string())
        };

        let native = if options.disable_native {
            Err("native parser disabled".to_string())
        } else {
            NativeRustParser::with_limits(options.native.clone(), options.limits.clone())
                .and_then(|parser| parser.verify().map(|_| parser))
                .map(Arc::new)
                .map_err(|e| e.to_string())
        };

        match (native, heuristic) {
            (Ok(native), heuristic) => {
                tracing::debug!(version = %native.version(), "using native Rust parser");
                TierState {
                    tier: ParserTier::Native,
                    native: Some(native),
                    heuristic: heuristic.ok(),
                    fallback_reason: None,
                }
            }
            (Err(native_err), Ok(heuristic)) => {
                notify_degradation(&native_err);
                TierState {
                    tier: ParserTier::Heuristic,
                    native: None,
                    heuristic: Some(heuristic),
                    fallback_reason: Some(native_err),
                }
            }
            (Err(native_err), Err(heuristic_err)) => {
                tracing::warn!(
                    native = %native_err,
                    heuristic = %heuristic_err,
                    "no Rust parser available; Rust files will not be analyzed"
                );
                TierState {
                    tier: ParserTier::Stub,
                    native: None,
                    heuristic: None,
                    fallback_reason: Some(format!("{}; {}", native_err, heuristic_err)),
                }
            }
        }
    }
}

/// Chooses and supervises the Rust parser backend.
pub struct TierManager {
    state: RwLock<TierState>,
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    fallbacks: AtomicU64,
    recent_errors: Mutex<VecDeque<String>>,
    initialized_at: SystemTime,
    started: Instant,
}

impl Default for TierManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TierManager {
    /// Manager with default options. Always succeeds; the stub tier is the floor.
    pub fn new() -> Self {
        Self::with_options(ManagerOptions::default())
    }

    pub fn with_options(options: ManagerOptions) -> Self {
        let state = TierState::select(&options);
        Self {
            state: RwLock::new(state),
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            recent_errors: Mutex::new(VecDeque::with_capacity(RECENT_ERROR_CAPACITY)),
            initialized_at: SystemTime::now(),
            started: Instant::now(),
        }
    }

    pub fn tier(&self) -> ParserTier {
        self.state.read().unwrap_or_else(PoisonError::into_inner).tier
    }

    pub fn fallback_reason(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .fallback_reason
            .clone()
    }

    /// The native adapter, when it is the active tier.
    pub fn native(&self) -> Option<Arc<NativeRustParser>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).native.clone()
    }

    fn backends(&self) -> (ParserTier, Option<Arc<NativeRustParser>>, Option<Arc<HeuristicParser>>) {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        (state.tier, state.native.clone(), state.heuristic.clone())
    }

    /// Parse a Rust file through the active tier.
    pub fn parse(&self, path: &Path, content: &[u8]) -> Result<FileAst, ParseError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let result = self.dispatch(path, content, true);

        match &result {
            Ok(_) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                self.record_error(err);
            }
        }
        result
    }

    /// Same tier selection as [`TierManager::parse`], leaving counters and
    /// recent errors untouched.
    pub(crate) fn parse_untracked(&self, path: &Path, content: &[u8]) -> Result<FileAst, ParseError> {
        self.dispatch(path, content, false)
    }

    fn dispatch(&self, path: &Path, content: &[u8], track: bool) -> Result<FileAst, ParseError> {
        let (tier, native, heuristic) = self.backends();

        match (tier, native, heuristic) {
            (ParserTier::Native, Some(native), heuristic) => match native.parse(path, content) {
                Ok(ast) => Ok(ast),
                Err(err) if !err.is_retryable() => Err(err),
                Err(err) => match heuristic {
                    Some(heuristic) => {
                        if track {
                            self.fallbacks.fetch_add(1, Ordering::Relaxed);
                        }
                        tracing::debug!(
                            path = %path.display(),
                            error = %err,
                            "native parse failed, retrying with heuristic parser"
                        );
                        let retried = heuristic.parse(path, content);
                        // A failed retry is recorded once, by the caller.
                        if track && retried.is_ok() {
                            self.record_error(&err);
                        }
                        retried
                    }
                    None => Err(err),
                },
            },
            (ParserTier::Heuristic, _, Some(heuristic)) => heuristic.parse(path, content),
            _ => Err(self.unavailable()),
        }
    }

    /// Whether `content` is syntactically valid Rust, as far as the active
    /// tier can tell.
    pub fn validate_syntax(&self, content: &[u8]) -> Result<bool, ParseError> {
        let (tier, native, heuristic) = self.backends();
        match (tier, native, heuristic) {
            (ParserTier::Native, Some(native), _) => {
                if !heuristic::sniff(content) {
                    return Ok(false);
                }
                native.validate_syntax(content)
            }
            (ParserTier::Heuristic, _, Some(heuristic)) => {
                if !heuristic.sniff(content) {
                    return Ok(false);
                }
                match heuristic.parse(Path::new("<validate>"), content) {
                    Ok(ast) => {
                        ast_pool().release(ast);
                        Ok(true)
                    }
                    Err(_) => Ok(false),
                }
            }
            _ => Err(self.unavailable()),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        let (tier, native, _) = self.backends();
        let fallback_reason = self.fallback_reason();
        if tier == ParserTier::Heuristic {
            notify_degradation(fallback_reason.as_deref().unwrap_or("unknown"));
        }
        Capabilities {
            tier,
            accuracy: accuracy_label(tier),
            performance: performance_label(tier),
            features: FeatureFlags::for_tier(tier),
            fallback_reason,
            library: native.map(|n| n.capabilities()),
        }
    }

    pub fn status(&self) -> ManagerStatus {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let success_rate = if attempts == 0 {
            1.0
        } else {
            successes as f64 / attempts as f64
        };

        ManagerStatus {
            tier: self.tier(),
            fallback_reason: self.fallback_reason(),
            attempts,
            successes,
            failures: self.failures.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            success_rate,
            recent_errors: self.recent_errors(),
            initialized_at: self
                .initialized_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            uptime_secs: self.started.elapsed().as_secs(),
            native_memory: self.native().map(|n| n.memory_stats()),
        }
    }

    /// Health of the native adapter, `None` on other tiers.
    pub fn memory_state(&self) -> Option<Result<(), MemoryFault>> {
        self.native().map(|n| n.validate_memory_state())
    }

    /// Describe a single expression. Native tier only.
    pub fn parse_expression(&self, expr: &str) -> Result<ExpressionInfo, ParseError> {
        match self.native() {
            Some(native) if self.tier() == ParserTier::Native => native.parse_expression(expr),
            _ => Err(ParseError::Unsupported("expression parsing")),
        }
    }

    pub fn recent_errors(&self) -> Vec<String> {
        self.recent_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Release all backends. The manager answers every later call as the
    /// stub tier.
    pub fn cleanup(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.native = None;
        state.heuristic = None;
        state.tier = ParserTier::Stub;
        state.fallback_reason = Some("manager has been cleaned up".to_string());
        tracing::debug!("parser tier manager cleaned up");
    }

    fn unavailable(&self) -> ParseError {
        let reason = self
            .fallback_reason()
            .unwrap_or_else(|| "no parser tier available".to_string());
        ParseError::Unavailable(reason)
    }

    fn record_error(&self, err: &ParseError) {
        let mut recent = self.recent_errors.lock().unwrap_or_else(PoisonError::into_inner);
        if recent.len() == RECENT_ERROR_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(err.to_string());
    }
}

impl LanguageAnalyzer for TierManager {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn analyze(&self, path: &Path, source: &[u8]) -> Result<FileAst, ParseError> {
        self.parse(path, source)
    }
}

static GLOBAL_MANAGER: RwLock<Option<Arc<TierManager>>> = RwLock::new(None);

/// Process-wide manager, created on first use.
pub fn global_manager() -> Arc<TierManager> {
    if let Some(manager) = GLOBAL_MANAGER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return Arc::clone(manager);
    }

    let mut slot = GLOBAL_MANAGER.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(manager) = slot.as_ref() {
        return Arc::clone(manager);
    }
    let manager = Arc::new(TierManager::new());
    *slot = Some(Arc::clone(&manager));
    manager
}

/// Tear down the process-wide manager. The next [`global_manager`] call
/// builds a fresh one.
pub fn cleanup_global_manager() {
    let taken = GLOBAL_MANAGER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(manager) = taken {
        manager.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heuristic_only() -> TierManager {
        TierManager::with_options(ManagerOptions {
            disable_native: true,
            ..ManagerOptions::default()
        })
    }

    #[test]
    fn test_module_name() {
        assert_eq!(module_name(Path::new("src/cache/pool.rs")).as_deref(), Some("pool"));
        assert_eq!(module_name(Path::new("src/cache/mod.rs")).as_deref(), Some("cache"));
        assert_eq!(module_name(Path::new("mycrate/lib.rs")).as_deref(), Some("mycrate"));
        assert_eq!(module_name(Path::new("lib.rs")).as_deref(), Some("lib"));
    }

    #[test]
    fn test_heuristic_tier_when_native_disabled() {
        let manager = heuristic_only();
        assert_eq!(manager.tier(), ParserTier::Heuristic);
        assert_eq!(manager.fallback_reason().as_deref(), Some("native parser disabled"));

        for _ in 0..5 {
            let caps = manager.capabilities();
            assert_eq!(caps.accuracy, "basic");
            assert!(caps.library.is_none());
        }
        assert_eq!(degradation_notices(), 1);

        let ast = manager.parse(Path::new("lib.rs"), b"pub fn a() {}\npub fn b() {}\n").unwrap();
        assert_eq!(ast.functions.len(), 2);
        assert_eq!(ast.provenance, ParserTier::Heuristic);
        assert_eq!(manager.status().successes, 1);
    }

    #[test]
    fn test_stub_tier() {
        let manager = TierManager::with_options(ManagerOptions {
            disable_native: true,
            disable_heuristic: true,
            ..ManagerOptions::default()
        });
        assert_eq!(manager.tier(), ParserTier::Stub);

        let err = manager.parse(Path::new("a.rs"), b"fn a() {}").unwrap_err();
        assert!(matches!(err, ParseError::Unavailable(_)));
        assert!(manager.validate_syntax(b"fn a() {}").is_err());
        assert_eq!(manager.capabilities().performance, "n/a");

        let status = manager.status();
        assert_eq!(status.attempts, 1);
        assert_eq!(status.failures, 1);
        assert_eq!(status.recent_errors.len(), 1);
    }

    #[test]
    fn test_recent_errors_capped() {
        let manager = TierManager::with_options(ManagerOptions {
            disable_native: true,
            disable_heuristic: true,
            ..ManagerOptions::default()
        });
        for _ in 0..25 {
            let _ = manager.parse(Path::new("a.rs"), b"");
        }
        assert_eq!(manager.recent_errors().len(), RECENT_ERROR_CAPACITY);
        assert_eq!(manager.status().attempts, 25);
    }

    #[test]
    fn test_heuristic_validate_syntax() {
        let manager = heuristic_only();
        assert_eq!(manager.validate_syntax(b"fn a() { (1) }"), Ok(true));
        assert_eq!(manager.validate_syntax(b"fn a() { (1 }"), Ok(false));
        assert_eq!(manager.validate_syntax(&[0xff, 0x00]), Ok(false));
    }

    #[test]
    fn test_parse_expression_requires_native() {
        let manager = heuristic_only();
        assert_eq!(
            manager.parse_expression("1 + 1").unwrap_err(),
            ParseError::Unsupported("expression parsing")
        );
    }

    #[test]
    fn test_cleanup_degrades_to_stub() {
        let manager = heuristic_only();
        manager.cleanup();
        assert_eq!(manager.tier(), ParserTier::Stub);
        assert_eq!(
            manager.fallback_reason().as_deref(),
            Some("manager has been cleaned up")
        );
        assert!(manager.parse(Path::new("a.rs"), b"fn a() {}").is_err());
    }

    #[test]
    fn test_global_manager_lifecycle() {
        let first = global_manager();
        let second = global_manager();
        assert!(Arc::ptr_eq(&first, &second));

        cleanup_global_manager();
        assert_eq!(first.tier(), ParserTier::Stub);

        let fresh = global_manager();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_ne!(fresh.tier(), ParserTier::Stub);
        cleanup_global_manager();
    }

    #[cfg(feature = "rust-native")]
    #[test]
    fn test_native_tier_and_per_call_fallback() {
        let manager = TierManager::new();
        assert_eq!(manager.tier(), ParserTier::Native);
        assert!(manager.fallback_reason().is_none());

        let ast = manager.parse(Path::new("ok.rs"), b"pub fn a() -> u8 { 1 }").unwrap();
        assert_eq!(ast.provenance, ParserTier::Native);

        // Unbalanced input fails natively; the heuristic retry still finds `b`.
        let ast = manager
            .parse(Path::new("broken.rs"), b"pub fn b() {\n    let x = (1;\n")
            .unwrap();
        assert_eq!(ast.provenance, ParserTier::Heuristic);
        assert_eq!(ast.functions[0].name, "b");

        let status = manager.status();
        assert_eq!(status.attempts, 2);
        assert_eq!(status.successes, 2);
        assert_eq!(status.fallbacks, 1);
        assert_eq!(status.recent_errors.len(), 1);

        let caps = manager.capabilities();
        assert_eq!(caps.accuracy, "high");
        assert!(caps.library.is_some());
        assert_eq!(manager.parse_expression("x * 2").unwrap().kind, "binary_expression");
        assert_eq!(manager.memory_state(), Some(Ok(())));
    }

    #[cfg(feature = "rust-native")]
    #[test]
    fn test_oversized_input_not_retried() {
        let manager = TierManager::new();
        let big = vec![b'\n'; native::MAX_INPUT_BYTES + 1];
        let err = manager.parse(Path::new("big.rs"), &big).unwrap_err();
        assert!(matches!(err, ParseError::TooLarge { .. }));
        assert_eq!(manager.status().fallbacks, 0);
    }

    #[test]
    fn test_binary_input_recorded_once() {
        let manager = TierManager::new();
        let err = manager.parse(Path::new("bin.rs"), b"fn a() {}\0").unwrap_err();
        assert!(matches!(err, ParseError::NotText { .. }));

        let status = manager.status();
        assert_eq!(status.attempts, 1);
        assert_eq!(status.failures, 1);
        assert_eq!(status.fallbacks, 0);
        assert_eq!(status.recent_errors, vec!["bin.rs: not a text file".to_string()]);
    }

    #[cfg(feature = "rust-native")]
    #[test]
    fn test_native_validate_syntax() {
        let manager = TierManager::new();
        assert_eq!(manager.validate_syntax(b"fn a() { }"), Ok(true));
        assert_eq!(manager.validate_syntax(b"fn a() { let = ; }"), Ok(false));
        assert_eq!(manager.validate_syntax(b"fn a() { "), Ok(false));
    }
}
