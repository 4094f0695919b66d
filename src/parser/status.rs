//! Diagnostics for the `status` command.

use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use super::{accuracy_label, performance_label, FeatureFlags, ManagerStatus, MemoryStats, TierManager};
use crate::analysis::ParserTier;
use crate::cache::ast_pool;

/// Parsed by the self-test: three functions and one type.
const SELF_TEST_SNIPPET: &str = r#"
pub struct Config {
    name: String,
}

impl Config {
    pub fn new(name: &str) -> Self {
        Config { name: name.to_string() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn helper() -> bool {
    true
}
"#;

const EXPECTED_FUNCTIONS: usize = 3;
const EXPECTED_TYPES: usize = 1;

/// Below this success rate the report recommends looking at recent errors.
const HEALTHY_SUCCESS_RATE: f64 = 0.9;

/// Outcome of parsing the canned snippet through the active tier.
#[derive(Debug, Clone, Serialize)]
pub struct SelfTest {
    pub passed: bool,
    pub functions_found: usize,
    pub types_found: usize,
    pub provenance: Option<ParserTier>,
    pub duration_ms: f64,
    pub error: Option<String>,
}

/// Native adapter health, when the native tier is active.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryState {
    pub healthy: bool,
    pub fault: Option<String>,
    pub stats: Option<MemoryStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Unix seconds.
    pub timestamp: u64,
    pub tier: ParserTier,
    pub fallback_reason: Option<String>,
    /// Whether the native backend was compiled into this binary.
    pub native_compiled: bool,
    /// Whether Rust files can be analyzed at all.
    pub rust_available: bool,
    pub accuracy: &'static str,
    pub performance: &'static str,
    pub features: FeatureFlags,
    pub recent_errors: Vec<String>,
    pub recommendations: Vec<String>,
    pub memory_state: Option<MemoryState>,
    pub self_test: SelfTest,
    pub details: ManagerStatus,
}

/// Run the self-test against `manager` and collect its state.
///
/// The self-test bypasses the manager's counters, so `details` reflects real
/// workload only.
pub fn status_report(manager: &TierManager) -> StatusReport {
    let self_test = self_test(manager);
    let details = manager.status();
    let tier = details.tier;

    let memory_state = manager.memory_state().map(|state| MemoryState {
        healthy: state.is_ok(),
        fault: state.err().map(|f| f.to_string()),
        stats: details.native_memory.clone(),
    });

    let native_compiled = cfg!(feature = "rust-native");
    let recommendations = recommendations(&details, native_compiled, memory_state.as_ref(), &self_test);

    StatusReport {
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        tier,
        fallback_reason: details.fallback_reason.clone(),
        native_compiled,
        rust_available: tier != ParserTier::Stub,
        accuracy: accuracy_label(tier),
        performance: performance_label(tier),
        features: FeatureFlags::for_tier(tier),
        recent_errors: details.recent_errors.clone(),
        recommendations,
        memory_state,
        self_test,
        details,
    }
}

fn self_test(manager: &TierManager) -> SelfTest {
    let started = Instant::now();
    let result = manager.parse_untracked(Path::new("self_test.rs"), SELF_TEST_SNIPPET.as_bytes());
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(ast) => {
            let functions_found = ast.functions.len();
            let types_found = ast.types.len();
            let provenance = ast.provenance;
            ast_pool().release(ast);
            SelfTest {
                passed: functions_found == EXPECTED_FUNCTIONS && types_found == EXPECTED_TYPES,
                functions_found,
                types_found,
                provenance: Some(provenance),
                duration_ms,
                error: None,
            }
        }
        Err(e) => SelfTest {
            passed: false,
            functions_found: 0,
            types_found: 0,
            provenance: None,
            duration_ms,
            error: Some(e.to_string()),
        },
    }
}

fn recommendations(
    status: &ManagerStatus,
    native_compiled: bool,
    memory: Option<&MemoryState>,
    self_test: &SelfTest,
) -> Vec<String> {
    let mut out = Vec::new();

    match status.tier {
        ParserTier::Native => {}
        ParserTier::Heuristic if !native_compiled => out.push(
            "Rust analysis is approximate; rebuild with the `rust-native` feature for exact spans and complexity"
                .to_string(),
        ),
        ParserTier::Heuristic => out.push(format!(
            "native Rust parser failed to start ({}); Rust analysis is approximate",
            status.fallback_reason.as_deref().unwrap_or("unknown reason")
        )),
        ParserTier::Stub => out.push(
            "no Rust parser is available; Rust files are reported as errors".to_string(),
        ),
    }

    if status.attempts > 0 && status.success_rate < HEALTHY_SUCCESS_RATE {
        out.push(format!(
            "parse success rate is {:.1}%; check the recent errors",
            status.success_rate * 100.0
        ));
    }

    if let Some(fault) = memory.and_then(|m| m.fault.as_deref()) {
        out.push(format!("native parser memory check failed: {}", fault));
    }

    if !self_test.passed && status.tier != ParserTier::Stub {
        out.push(format!(
            "self-test found {} functions and {} types, expected {} and {}",
            self_test.functions_found, self_test.types_found, EXPECTED_FUNCTIONS, EXPECTED_TYPES
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ManagerOptions;

    #[test]
    fn test_counters_reflect_workload_only() {
        let manager = TierManager::with_options(ManagerOptions {
            disable_native: true,
            ..ManagerOptions::default()
        });
        manager
            .parse(Path::new("a.rs"), b"fn a() {}")
            .map(|ast| ast_pool().release(ast))
            .unwrap();
        let _ = manager.parse(Path::new("b.rs"), b"\0");

        let report = status_report(&manager);
        assert!(report.self_test.passed);
        assert_eq!(report.details.attempts, 2);
        assert_eq!(report.details.successes, 1);
        assert_eq!(report.details.failures, 1);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("success rate is 50.0%")));

        // Repeated reports do not feed on their own self-tests.
        assert_eq!(status_report(&manager).details.attempts, 2);
    }

    #[test]
    fn test_heuristic_report() {
        let manager = TierManager::with_options(ManagerOptions {
            disable_native: true,
            ..ManagerOptions::default()
        });
        let report = status_report(&manager);

        assert_eq!(report.tier, ParserTier::Heuristic);
        assert!(report.rust_available);
        assert_eq!(report.accuracy, "basic");
        assert!(!report.features.precise_spans);
        assert!(report.self_test.passed, "{:?}", report.self_test);
        assert_eq!(report.self_test.provenance, Some(ParserTier::Heuristic));
        assert!(report.memory_state.is_none());
        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(report.details.attempts, 0);
        assert_eq!(report.details.successes, 0);
    }

    #[test]
    fn test_stub_report_recommends() {
        let manager = TierManager::with_options(ManagerOptions {
            disable_native: true,
            disable_heuristic: true,
            ..ManagerOptions::default()
        });
        let report = status_report(&manager);

        assert!(!report.rust_available);
        assert!(!report.self_test.passed);
        assert!(report.self_test.error.is_some());
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("no Rust parser is available")));
        assert!(report.recent_errors.is_empty());
        assert_eq!(report.details.attempts, 0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tier"], "stub");
        assert_eq!(json["features"]["functions"], false);
    }

    #[cfg(feature = "rust-native")]
    #[test]
    fn test_native_report() {
        let manager = TierManager::new();
        let report = status_report(&manager);

        assert_eq!(report.tier, ParserTier::Native);
        assert!(report.native_compiled);
        assert!(report.self_test.passed, "{:?}", report.self_test);
        assert!(report.recommendations.is_empty());
        assert_eq!(report.details.attempts, 0);

        let memory = report.memory_state.unwrap();
        assert!(memory.healthy);
        assert_eq!(memory.stats.unwrap().outstanding_handles, 0);
    }
}
