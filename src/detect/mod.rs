//! Quality-violation detectors.
//!
//! Detectors receive each successfully parsed file together with its
//! [`FileAst`] and return violations. The scan engine fans every file out to
//! all registered detectors through a [`DetectorRegistry`], from many worker
//! threads at once, so detectors keep any cross-file state behind a lock and
//! clear it in [`Detector::reset`].

mod complexity;
mod duplicates;
mod types;

use serde::{Deserialize, Serialize};

pub use complexity::{ComplexityConfig, ComplexityDetector};
pub use duplicates::{DuplicateConfig, DuplicateDetector};
pub use types::{Severity, Violation, ViolationRule};

use crate::analysis::FileAst;
use crate::scan::FileDescriptor;

/// A pluggable check over one parsed file.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn detect(&self, file: &FileDescriptor, ast: &FileAst) -> Vec<Violation>;

    /// Forget state carried between files. Called once before every scan.
    fn reset(&self) {}
}

/// Per-detector settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorsConfig {
    pub complexity: ComplexityConfig,
    pub duplicates: DuplicateConfig,
}

/// Ordered set of detectors run against every file.
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in detectors enabled in `config`.
    pub fn from_config(config: &DetectorsConfig) -> Self {
        let mut registry = Self::new();
        if config.complexity.enabled {
            registry.register(Box::new(ComplexityDetector::new(config.complexity.clone())));
        }
        if config.duplicates.enabled {
            registry.register(Box::new(DuplicateDetector::new(config.duplicates.clone())));
        }
        registry
    }

    pub fn register(&mut self, detector: Box<dyn Detector>) {
        tracing::debug!(detector = detector.name(), "registered detector");
        self.detectors.push(detector);
    }

    /// Run every detector and merge their findings in registration order.
    pub fn detect_all(&self, file: &FileDescriptor, ast: &FileAst) -> Vec<Violation> {
        self.detectors
            .iter()
            .flat_map(|d| d.detect(file, ast))
            .collect()
    }

    pub fn reset_all(&self) {
        for detector in &self.detectors {
            detector.reset();
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::analysis::{Language, ParserTier};

    struct CountingDetector {
        resets: Arc<AtomicUsize>,
    }

    impl Detector for CountingDetector {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn description(&self) -> &'static str {
            "one info violation per file"
        }

        fn detect(&self, file: &FileDescriptor, _ast: &FileAst) -> Vec<Violation> {
            vec![Violation {
                rule: ViolationRule::LongFunction,
                message: "seen".to_string(),
                file: file.path.to_string_lossy().to_string(),
                line: 1,
                severity: Severity::Info,
            }]
        }

        fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_registry_fans_out_and_resets() {
        let resets = Arc::new(AtomicUsize::new(0));
        let mut registry = DetectorRegistry::from_config(&DetectorsConfig::default());
        registry.register(Box::new(CountingDetector {
            resets: Arc::clone(&resets),
        }));
        assert_eq!(registry.names(), vec!["complexity", "duplicates", "counting"]);

        let file = FileDescriptor {
            path: "main.go".into(),
            ..FileDescriptor::default()
        };
        let ast = FileAst::new("main.go", Language::Go, ParserTier::Native);
        let violations = registry.detect_all(&file, &ast);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].file, "main.go");

        registry.reset_all();
        assert_eq!(resets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_detectors_not_registered() {
        let config = DetectorsConfig {
            complexity: ComplexityConfig {
                enabled: false,
                ..ComplexityConfig::default()
            },
            ..DetectorsConfig::default()
        };
        let registry = DetectorRegistry::from_config(&config);
        assert_eq!(registry.names(), vec!["duplicates"]);
    }
}
