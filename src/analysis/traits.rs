//! Core traits for language analysis.

use std::path::Path;

use super::{FileAst, Language};
use crate::error::ParseError;

/// A tree-sitter tree borrowed together with the source it was built from.
pub struct ParsedFile<'a> {
    pub tree: &'a tree_sitter::Tree,
    pub source: &'a [u8],
    pub path: &'a str,
}

impl<'a> ParsedFile<'a> {
    pub fn new(tree: &'a tree_sitter::Tree, source: &'a [u8], path: &'a str) -> Self {
        Self { tree, source, path }
    }

    /// Get text for a tree-sitter node.
    pub fn node_text(&self, node: tree_sitter::Node) -> &'a str {
        node.utf8_text(self.source).unwrap_or("")
    }
}

/// Something that turns source bytes into a [`FileAst`].
///
/// # Thread Safety
///
/// tree_sitter::Parser is not Sync, so implementations create or pool
/// parsers per call rather than sharing one.
pub trait LanguageAnalyzer: Send + Sync {
    /// The language this analyzer handles.
    fn language(&self) -> Language;

    /// File extensions handled (without dot).
    fn file_extensions(&self) -> &'static [&'static str];

    /// Parse `source` and extract its declarations.
    fn analyze(&self, path: &Path, source: &[u8]) -> Result<FileAst, ParseError>;

    /// Check if this analyzer handles the given file extension.
    fn handles_extension(&self, ext: &str) -> bool {
        self.file_extensions().contains(&ext)
    }
}
