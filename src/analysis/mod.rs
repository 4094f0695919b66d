//! Language-normalized syntax trees.
//!
//! Every parser in the crate, whatever its tier, produces a [`FileAst`]:
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────┐     ┌─────────────┐
//! │ Go source   │────▶│ GoAnalyzer (in-proc) │────▶│             │
//! └─────────────┘     └──────────────────────┘     │   FileAst   │
//! ┌─────────────┐     ┌──────────────────────┐     │ (functions, │
//! │ Rust source │────▶│ TierManager          │────▶│  types, ..) │
//! └─────────────┘     │  native | heuristic  │     └─────────────┘
//!                     └──────────────────────┘
//! ```
//!
//! Detectors consume the tree through its typed collections or through the
//! uniform [`Declaration`] view.

mod facts;
pub mod languages;
mod traits;

pub use facts::{
    Declaration, DeclarationKind, FileAst, FunctionDecl, ImplBlock, ImportDecl, Language,
    MacroDecl, ModuleDecl, Param, ParserTier, Span, TypeDecl, TypeKind, ValueDecl, ValueKind,
    Visibility,
};
pub use languages::{go_analyzer, GoAnalyzer};
pub use traits::{LanguageAnalyzer, ParsedFile};

/// Line (1-based) of the first syntax error below `node`.
pub(crate) fn first_error_line(node: tree_sitter::Node) -> usize {
    let mut current = node;
    loop {
        if current.is_error() || current.is_missing() {
            return current.start_position().row + 1;
        }
        let next = {
            let mut cursor = current.walk();
            let found = current
                .children(&mut cursor)
                .find(|c| c.is_error() || c.is_missing() || c.has_error());
            found
        };
        match next {
            Some(child) => current = child,
            None => return current.start_position().row + 1,
        }
    }
}
