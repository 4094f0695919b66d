//! Violation records produced by detectors.

use serde::{Deserialize, Serialize};

/// Ordered from most to least severe so sorting puts errors first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Severity::Error, Severity::Warning, Severity::Info]
            .into_iter()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown severity '{}'", s))
    }
}

/// Which detector raised a violation. Serialized as the snake_case rule id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ViolationRule {
    #[serde(rename = "high_complexity")]
    HighComplexity,
    #[serde(rename = "long_function")]
    LongFunction,
    #[serde(rename = "duplicate_signature")]
    DuplicateSignature,
}

impl ViolationRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationRule::HighComplexity => "high_complexity",
            ViolationRule::LongFunction => "long_function",
            ViolationRule::DuplicateSignature => "duplicate_signature",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high_complexity" => Some(ViolationRule::HighComplexity),
            "long_function" => Some(ViolationRule::LongFunction),
            "duplicate_signature" => Some(ViolationRule::DuplicateSignature),
            _ => None,
        }
    }
}

impl std::fmt::Display for ViolationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One finding, anchored to a 1-based line in `file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: ViolationRule,
    pub message: String,
    pub file: String,
    pub line: usize,
    pub severity: Severity,
}
