//! Error types for parsing and parser health.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while turning a file into a syntax tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// No parser tier can serve the request.
    #[error("parser unavailable: {0}")]
    Unavailable(String),

    /// Input exceeds the size accepted by the native backend.
    #[error("input of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    /// Input is not text (invalid UTF-8 or contains NUL bytes).
    #[error("{path}: not a text file")]
    NotText { path: String },

    /// The source did not parse cleanly.
    #[error("{path}: syntax error at line {line}")]
    Syntax { path: String, line: usize },

    /// Too many consecutive backend failures; the backend refuses new work.
    #[error("native parser refused work after {0} consecutive failures")]
    Unstable(u32),

    /// The backend failed internally.
    #[error("native parser failure: {0}")]
    Backend(String),

    /// The requested operation is not supported by the active tier.
    #[error("{0} is not supported by the active parser tier")]
    Unsupported(&'static str),
}

impl ParseError {
    /// Whether another tier could still accept the same input. Oversized and
    /// binary input is rejected by every tier.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ParseError::TooLarge { .. } | ParseError::NotText { .. })
    }
}

/// Health-check failures reported by the native adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryFault {
    #[error("possible leak: {outstanding} foreign handles outstanding with {in_flight} calls in flight")]
    Leak { outstanding: i64, in_flight: usize },

    #[error("parser unstable: {0} consecutive failures")]
    Unstable(u32),

    #[error("possible deadlock: a parse call has been running for {0:?}")]
    Stalled(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ParseError::TooLarge {
            size: 100,
            limit: 10,
        };
        assert_eq!(err.to_string(), "input of 100 bytes exceeds the 10 byte limit");

        let fault = MemoryFault::Leak {
            outstanding: 4,
            in_flight: 1,
        };
        assert!(fault.to_string().contains("4 foreign handles"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ParseError::Backend("boom".into()).is_retryable());
        assert!(ParseError::Syntax {
            path: "a.rs".into(),
            line: 3
        }
        .is_retryable());
        assert!(!ParseError::NotText { path: "a.rs".into() }.is_retryable());
        assert!(!ParseError::TooLarge { size: 2, limit: 1 }.is_retryable());
    }
}
