//! tierscan - concurrent Go and Rust source scanner.
//!
//! Files are discovered once, parsed on a pool of worker threads and handed
//! to pluggable detectors. Go is parsed in-process with tree-sitter. Rust
//! goes through a tier manager that prefers the native tree-sitter backend
//! and degrades to a heuristic parser, recording on every tree which tier
//! produced it.
//!
//! # Architecture
//!
//! - `analysis`: language-normalized syntax trees and the Go analyzer
//! - `parser`: Rust parser tiers, the tier manager and diagnostics
//! - `cache`: content-hashed AST cache and object pools
//! - `scan`: file walker, scan engine and result types
//! - `detect`: detector trait, registry and built-in detectors
//! - `config`, `logging`, `report`, `cli`: the command-line surface

pub mod analysis;
pub mod cache;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod logging;
pub mod parser;
pub mod report;
pub mod scan;

pub use analysis::{Declaration, DeclarationKind, FileAst, Language, LanguageAnalyzer, ParserTier};
pub use cache::{content_hash, AstCache, CacheMetrics};
pub use config::Config;
pub use detect::{Detector, DetectorRegistry, Severity, Violation, ViolationRule};
pub use error::{MemoryFault, ParseError};
pub use parser::{global_manager, status_report, StatusReport, TierManager};
pub use scan::{Engine, FileDescriptor, ScanResult, ScanSummary};
