//! Detection of functions repeated across files.
//!
//! Two functions are considered duplicates when they share a name,
//! parameter types, result types and line count. State spans files, so the
//! detector must be reset before each scan.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::analysis::FileAst;
use crate::scan::FileDescriptor;

use super::{Detector, Severity, Violation, ViolationRule};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    pub enabled: bool,
    /// Shorter functions are ignored (default: 5)
    pub min_lines: usize,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_lines: 5,
        }
    }
}

#[derive(Debug, Clone)]
struct FirstSeen {
    file: String,
    line: usize,
}

/// Reports the second and later occurrences of a function shape.
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    config: DuplicateConfig,
    seen: Mutex<HashMap<String, FirstSeen>>,
}

impl DuplicateDetector {
    pub fn new(config: DuplicateConfig) -> Self {
        Self {
            config,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct shapes recorded since the last reset.
    pub fn tracked(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Detector for DuplicateDetector {
    fn name(&self) -> &'static str {
        "duplicates"
    }

    fn description(&self) -> &'static str {
        "functions with the same signature and length in more than one file"
    }

    fn detect(&self, file: &FileDescriptor, ast: &FileAst) -> Vec<Violation> {
        let path = file.path.to_string_lossy().to_string();
        let mut violations = Vec::new();
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);

        for func in ast.functions.iter().filter(|f| f.line_count >= self.config.min_lines) {
            let key = format!("{}|{}", func.signature(), func.line_count);
            match seen.get(&key) {
                Some(first) if first.file != path => violations.push(Violation {
                    rule: ViolationRule::DuplicateSignature,
                    message: format!(
                        "function {:?} duplicates the one at {}:{}",
                        func.qualified_name(),
                        first.file,
                        first.line
                    ),
                    file: path.clone(),
                    line: func.span.start_line,
                    severity: Severity::Info,
                }),
                Some(_) => {}
                None => {
                    seen.insert(
                        key,
                        FirstSeen {
                            file: path.clone(),
                            line: func.span.start_line,
                        },
                    );
                }
            }
        }

        violations
    }

    fn reset(&self) {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{FunctionDecl, Language, Param, ParserTier, Span};

    fn ast_with(path: &str, lines: usize) -> (FileDescriptor, FileAst) {
        let mut ast = FileAst::new(path, Language::Go, ParserTier::Native);
        ast.functions.push(FunctionDecl {
            name: "Parse".to_string(),
            params: vec![Param {
                name: "input".to_string(),
                ty: "string".to_string(),
                ..Param::default()
            }],
            results: vec!["error".to_string()],
            span: Span {
                start_line: 3,
                end_line: 3 + lines - 1,
                ..Span::default()
            },
            line_count: lines,
            ..FunctionDecl::default()
        });
        let file = FileDescriptor {
            path: path.into(),
            ..FileDescriptor::default()
        };
        (file, ast)
    }

    #[test]
    fn test_reports_cross_file_duplicates() {
        let detector = DuplicateDetector::new(DuplicateConfig::default());

        let (a_file, a_ast) = ast_with("a.go", 8);
        let (b_file, b_ast) = ast_with("b.go", 8);
        let (c_file, c_ast) = ast_with("c.go", 9);

        assert!(detector.detect(&a_file, &a_ast).is_empty());
        let found = detector.detect(&b_file, &b_ast);
        assert_eq!(found.len(), 1);
        assert!(found[0].message.contains("a.go:3"));
        assert!(detector.detect(&c_file, &c_ast).is_empty());

        // Same file again is not a duplicate of itself.
        assert!(detector.detect(&a_file, &a_ast).is_empty());
    }

    #[test]
    fn test_short_functions_ignored_and_reset_clears() {
        let detector = DuplicateDetector::new(DuplicateConfig::default());
        let (a_file, a_ast) = ast_with("a.go", 2);
        let (b_file, b_ast) = ast_with("b.go", 2);
        detector.detect(&a_file, &a_ast);
        assert!(detector.detect(&b_file, &b_ast).is_empty());
        assert_eq!(detector.tracked(), 0);

        let (c_file, c_ast) = ast_with("c.go", 6);
        detector.detect(&c_file, &c_ast);
        assert_eq!(detector.tracked(), 1);
        detector.reset();
        assert_eq!(detector.tracked(), 0);
    }
}
