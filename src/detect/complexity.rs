//! Detection of overly complex and overly long functions.
//!
//! Cyclomatic complexity comes straight from the syntax tree:
//! - Start at 1
//! - Add 1 for each branch point the language analyzer counts
//!
//! Trees from the heuristic tier report complexity 1 and one-line spans for
//! every function, so they are skipped rather than reported as clean.

use serde::{Deserialize, Serialize};

use crate::analysis::FileAst;
use crate::scan::FileDescriptor;

use super::{Detector, Severity, Violation, ViolationRule};

/// Thresholds for complexity detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityConfig {
    pub enabled: bool,
    /// Maximum cyclomatic complexity per function (default: 10)
    pub max_complexity: u32,
    /// Maximum lines per function before flagging (default: 50)
    pub max_function_lines: usize,
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_complexity: 10,
            max_function_lines: 50,
        }
    }
}

/// Flags functions over the complexity or length thresholds.
#[derive(Debug, Clone, Default)]
pub struct ComplexityDetector {
    config: ComplexityConfig,
}

impl ComplexityDetector {
    pub fn new(config: ComplexityConfig) -> Self {
        Self { config }
    }
}

impl Detector for ComplexityDetector {
    fn name(&self) -> &'static str {
        "complexity"
    }

    fn description(&self) -> &'static str {
        "functions whose cyclomatic complexity or length exceeds the configured limits"
    }

    fn detect(&self, file: &FileDescriptor, ast: &FileAst) -> Vec<Violation> {
        if !ast.provenance.is_precise() {
            return Vec::new();
        }

        let path = file.path.to_string_lossy();
        let mut violations = Vec::new();

        for func in &ast.functions {
            if func.complexity > self.config.max_complexity {
                // Twice the limit is an error, anything else a warning.
                let severity = if func.complexity > self.config.max_complexity.saturating_mul(2) {
                    Severity::Error
                } else {
                    Severity::Warning
                };
                violations.push(Violation {
                    rule: ViolationRule::HighComplexity,
                    message: format!(
                        "function {:?} has complexity {} (max {})",
                        func.qualified_name(),
                        func.complexity,
                        self.config.max_complexity
                    ),
                    file: path.to_string(),
                    line: func.span.start_line,
                    severity,
                });
            }

            if func.line_count > self.config.max_function_lines {
                violations.push(Violation {
                    rule: ViolationRule::LongFunction,
                    message: format!(
                        "function {:?} is {} lines (max {})",
                        func.qualified_name(),
                        func.line_count,
                        self.config.max_function_lines
                    ),
                    file: path.to_string(),
                    line: func.span.start_line,
                    severity: Severity::Warning,
                });
            }
        }

        violations
    }
}
