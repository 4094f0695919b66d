//! In-process language analyzers.
//!
//! Only Go has one; Rust goes through the parser tier manager.

mod go;

pub use go::GoAnalyzer;

use once_cell::sync::OnceCell;

use crate::error::ParseError;

/// Static storage for the Go analyzer.
static GO_ANALYZER: OnceCell<GoAnalyzer> = OnceCell::new();

/// Shared Go analyzer, created on first use.
///
/// An error here means the primary language cannot be parsed at all.
pub fn go_analyzer() -> Result<&'static GoAnalyzer, ParseError> {
    GO_ANALYZER.get_or_try_init(GoAnalyzer::new)
}
