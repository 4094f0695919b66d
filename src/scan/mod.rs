//! Scanning: discovering files, parsing them concurrently and reducing the
//! per-file outcomes into a summary.

mod engine;
mod model;
mod walker;

pub use engine::{Engine, Progress};
pub use model::{result_pool, FileDescriptor, FileMetrics, ScanResult, ScanSummary};
pub use walker::{discover, discover_path, WalkOptions};
