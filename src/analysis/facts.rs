//! Language-normalized declaration facts.
//!
//! Both analyzed languages produce the same [`FileAst`] container. Fields that
//! only make sense for one language (receivers for Go, impl blocks and macros
//! for Rust) are simply left empty by the other.

use std::fmt;

use serde::Serialize;

/// Source location span with byte offsets and line/column positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Span {
    /// Start byte offset (0-indexed).
    pub start_byte: usize,
    /// End byte offset (0-indexed, exclusive).
    pub end_byte: usize,
    /// Start line (1-indexed).
    pub start_line: usize,
    /// Start column (1-indexed, 0 when positions are not tracked).
    pub start_col: usize,
    /// End line (1-indexed).
    pub end_line: usize,
    /// End column (1-indexed, 0 when positions are not tracked).
    pub end_col: usize,
}

impl Span {
    /// Create a span from a tree-sitter node.
    pub fn from_node(node: tree_sitter::Node) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: start.row + 1, // tree-sitter is 0-indexed
            start_col: start.column + 1,
            end_line: end.row + 1,
            end_col: end.column + 1,
        }
    }

    /// Span covering a single source line.
    pub fn line(line: usize, start_byte: usize, text: &str) -> Self {
        Self {
            start_byte,
            end_byte: start_byte + text.len(),
            start_line: line,
            start_col: 1,
            end_line: line,
            end_col: text.chars().count() + 1,
        }
    }

    /// Drop column information, keeping lines.
    pub fn without_columns(mut self) -> Self {
        self.start_col = 0;
        self.end_col = 0;
        self
    }

    /// Number of lines covered by the span.
    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// Analyzed source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Go,
    Rust,
}

impl Language {
    /// Map a file extension (without the dot) to a language.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.') {
            "go" => Some(Language::Go),
            "rs" => Some(Language::Rust),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::Rust => "rust",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which parser backend produced a syntax tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParserTier {
    /// Full grammar-based parse with precise ranges.
    #[default]
    Native,
    /// Line-oriented approximation; every declaration spans one line.
    Heuristic,
    /// Inert backend; never produces a tree.
    Stub,
}

impl ParserTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserTier::Native => "native",
            ParserTier::Heuristic => "heuristic",
            ParserTier::Stub => "stub",
        }
    }

    /// Whether declarations from this tier have exact source ranges.
    pub fn is_precise(&self) -> bool {
        matches!(self, ParserTier::Native)
    }
}

impl fmt::Display for ParserTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declaration visibility, normalized across languages.
///
/// Go maps exported identifiers to `Public` and everything else to `Private`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Crate,
    Super,
    Restricted,
    #[default]
    Private,
}

impl Visibility {
    /// Parse a Rust visibility modifier such as `pub(crate)`.
    pub fn from_modifier(text: &str) -> Self {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.as_str() {
            "" => Visibility::Private,
            "pub" => Visibility::Public,
            "pub(crate)" => Visibility::Crate,
            "pub(super)" => Visibility::Super,
            "pub(self)" => Visibility::Private,
            s if s.starts_with("pub(") => Visibility::Restricted,
            _ => Visibility::Private,
        }
    }

    /// Visibility of a Go identifier (exported when it starts uppercase).
    pub fn from_go_identifier(name: &str) -> Self {
        if name.chars().next().is_some_and(char::is_uppercase) {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "pub",
            Visibility::Crate => "pub(crate)",
            Visibility::Super => "pub(super)",
            Visibility::Restricted => "pub(in ..)",
            Visibility::Private => "private",
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::Public)
    }
}

/// Kind of declaration, used as the discriminant of [`Declaration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Function,
    Method,
    Struct,
    Interface,
    Enum,
    Trait,
    Alias,
    Const,
    Var,
    Import,
    Impl,
    Module,
    Macro,
}

impl DeclarationKind {
    /// Convert to a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationKind::Function => "function",
            DeclarationKind::Method => "method",
            DeclarationKind::Struct => "struct",
            DeclarationKind::Interface => "interface",
            DeclarationKind::Enum => "enum",
            DeclarationKind::Trait => "trait",
            DeclarationKind::Alias => "alias",
            DeclarationKind::Const => "const",
            DeclarationKind::Var => "var",
            DeclarationKind::Import => "import",
            DeclarationKind::Impl => "impl",
            DeclarationKind::Module => "module",
            DeclarationKind::Macro => "macro",
        }
    }

    /// Check if this is a callable (function or method).
    pub fn is_callable(&self) -> bool {
        matches!(self, DeclarationKind::Function | DeclarationKind::Method)
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A function or method parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: String,
    pub is_mut: bool,
    pub is_ref: bool,
}

/// A function or method declaration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    pub span: Span,
    pub params: Vec<Param>,
    /// Return types. Go may have several; Rust has at most one.
    pub results: Vec<String>,
    pub visibility: Visibility,
    /// Receiver type for Go methods, or the impl target for Rust methods.
    pub receiver: Option<String>,
    pub is_async: bool,
    pub is_unsafe: bool,
    pub is_const: bool,
    /// Cyclomatic complexity, at least 1.
    pub complexity: u32,
    pub line_count: usize,
    pub has_doc: bool,
}

impl FunctionDecl {
    pub fn is_method(&self) -> bool {
        self.receiver.is_some()
    }

    pub fn is_exported(&self) -> bool {
        self.visibility.is_public()
    }

    /// Get the fully qualified name (receiver.name for methods).
    pub fn qualified_name(&self) -> String {
        match self.receiver {
            Some(ref recv) => format!("{}.{}", recv, self.name),
            None => self.name.clone(),
        }
    }

    /// Parameter types and results, independent of names and position.
    pub fn signature(&self) -> String {
        let params: Vec<&str> = self.params.iter().map(|p| p.ty.as_str()).collect();
        format!("{}({}) -> ({})", self.name, params.join(", "), self.results.join(", "))
    }
}

/// Kind of a type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    #[default]
    Struct,
    Interface,
    Enum,
    Trait,
    Alias,
}

/// A struct, interface, enum, trait or alias declaration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
    pub span: Span,
    pub visibility: Visibility,
    pub field_count: usize,
    pub method_count: usize,
    pub variant_count: usize,
    pub has_doc: bool,
}

/// An import (Go) or use declaration (Rust).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportDecl {
    pub path: String,
    pub alias: Option<String>,
    pub span: Span,
    /// Re-exports in Rust carry a visibility.
    pub visibility: Visibility,
}

/// Kind of a value declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    #[default]
    Const,
    /// Go `var`, Rust `static`.
    Var,
}

/// A top-level constant or variable.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValueDecl {
    pub name: String,
    pub kind: ValueKind,
    pub ty: Option<String>,
    pub span: Span,
    pub visibility: Visibility,
    pub has_doc: bool,
}

/// A Rust impl block.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImplBlock {
    pub target_type: String,
    /// `None` for inherent impls.
    pub trait_name: Option<String>,
    pub method_count: usize,
    pub span: Span,
}

/// A Rust module declaration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleDecl {
    pub name: String,
    pub span: Span,
    pub visibility: Visibility,
    pub has_doc: bool,
}

/// A macro definition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MacroDecl {
    pub name: String,
    pub span: Span,
    pub macro_type: String,
    pub is_exported: bool,
    pub has_doc: bool,
}

/// All declarations extracted from a single file.
///
/// Once cached, a `FileAst` is shared behind an `Arc` and treated as
/// read-only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileAst {
    pub path: String,
    pub language: Language,
    /// Go package name or Rust module name.
    pub module: Option<String>,
    /// Tier that produced this tree.
    pub provenance: ParserTier,
    pub has_syntax_errors: bool,
    pub functions: Vec<FunctionDecl>,
    pub types: Vec<TypeDecl>,
    pub imports: Vec<ImportDecl>,
    pub values: Vec<ValueDecl>,
    pub impls: Vec<ImplBlock>,
    pub modules: Vec<ModuleDecl>,
    pub macros: Vec<MacroDecl>,
}

impl FileAst {
    /// Create an empty container for a file.
    pub fn new(path: &str, language: Language, provenance: ParserTier) -> Self {
        Self {
            path: path.to_string(),
            language,
            provenance,
            ..Self::default()
        }
    }

    /// Find a function by name.
    pub fn find_function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Find a type by name.
    pub fn find_type(&self, name: &str) -> Option<&TypeDecl> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Sum of function complexities.
    pub fn total_complexity(&self) -> u32 {
        self.functions.iter().map(|f| f.complexity).sum()
    }

    /// Number of declarations across all collections.
    pub fn declaration_count(&self) -> usize {
        self.functions.len()
            + self.types.len()
            + self.imports.len()
            + self.values.len()
            + self.impls.len()
            + self.modules.len()
            + self.macros.len()
    }

    /// Iterate every declaration in a uniform view.
    pub fn declarations(&self) -> impl Iterator<Item = Declaration<'_>> {
        self.functions
            .iter()
            .map(Declaration::Function)
            .chain(self.types.iter().map(Declaration::Type))
            .chain(self.imports.iter().map(Declaration::Import))
            .chain(self.values.iter().map(Declaration::Value))
            .chain(self.impls.iter().map(Declaration::Impl))
            .chain(self.modules.iter().map(Declaration::Module))
            .chain(self.macros.iter().map(Declaration::Macro))
    }

    /// Declarations of one kind.
    pub fn declarations_by_kind(&self, kind: DeclarationKind) -> impl Iterator<Item = Declaration<'_>> {
        self.declarations().filter(move |d| d.kind() == kind)
    }
}

/// Borrowed view over one declaration of any kind.
#[derive(Debug, Clone, Copy)]
pub enum Declaration<'a> {
    Function(&'a FunctionDecl),
    Type(&'a TypeDecl),
    Import(&'a ImportDecl),
    Value(&'a ValueDecl),
    Impl(&'a ImplBlock),
    Module(&'a ModuleDecl),
    Macro(&'a MacroDecl),
}

impl<'a> Declaration<'a> {
    pub fn kind(&self) -> DeclarationKind {
        match self {
            Declaration::Function(f) if f.is_method() => DeclarationKind::Method,
            Declaration::Function(_) => DeclarationKind::Function,
            Declaration::Type(t) => match t.kind {
                TypeKind::Struct => DeclarationKind::Struct,
                TypeKind::Interface => DeclarationKind::Interface,
                TypeKind::Enum => DeclarationKind::Enum,
                TypeKind::Trait => DeclarationKind::Trait,
                TypeKind::Alias => DeclarationKind::Alias,
            },
            Declaration::Import(_) => DeclarationKind::Import,
            Declaration::Value(v) => match v.kind {
                ValueKind::Const => DeclarationKind::Const,
                ValueKind::Var => DeclarationKind::Var,
            },
            Declaration::Impl(_) => DeclarationKind::Impl,
            Declaration::Module(_) => DeclarationKind::Module,
            Declaration::Macro(_) => DeclarationKind::Macro,
        }
    }

    /// Declared name. Imports use their path and impls their target type.
    pub fn name(&self) -> &'a str {
        match self {
            Declaration::Function(f) => &f.name,
            Declaration::Type(t) => &t.name,
            Declaration::Import(i) => &i.path,
            Declaration::Value(v) => &v.name,
            Declaration::Impl(i) => &i.target_type,
            Declaration::Module(m) => &m.name,
            Declaration::Macro(m) => &m.name,
        }
    }

    pub fn span(&self) -> &'a Span {
        match self {
            Declaration::Function(f) => &f.span,
            Declaration::Type(t) => &t.span,
            Declaration::Import(i) => &i.span,
            Declaration::Value(v) => &v.span,
            Declaration::Impl(i) => &i.span,
            Declaration::Module(m) => &m.span,
            Declaration::Macro(m) => &m.span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start_line: usize, end_line: usize) -> Span {
        Span {
            start_byte: 0,
            end_byte: 10,
            start_line,
            start_col: 1,
            end_line,
            end_col: 11,
        }
    }

    #[test]
    fn test_function_qualified_name() {
        let func = FunctionDecl {
            name: "Validate".to_string(),
            span: span(3, 5),
            receiver: Some("Config".to_string()),
            complexity: 1,
            ..FunctionDecl::default()
        };
        assert_eq!(func.qualified_name(), "Config.Validate");
        assert!(func.is_method());

        let plain = FunctionDecl {
            name: "main".to_string(),
            ..FunctionDecl::default()
        };
        assert_eq!(plain.qualified_name(), "main");
    }

    #[test]
    fn test_visibility_parsing() {
        assert_eq!(Visibility::from_modifier("pub"), Visibility::Public);
        assert_eq!(Visibility::from_modifier("pub(crate)"), Visibility::Crate);
        assert_eq!(Visibility::from_modifier("pub( super )"), Visibility::Super);
        assert_eq!(Visibility::from_modifier("pub(in crate::a)"), Visibility::Restricted);
        assert_eq!(Visibility::from_modifier(""), Visibility::Private);

        assert_eq!(Visibility::from_go_identifier("Handler"), Visibility::Public);
        assert_eq!(Visibility::from_go_identifier("handler"), Visibility::Private);
        assert_eq!(Visibility::from_go_identifier("_x"), Visibility::Private);
    }

    #[test]
    fn test_declaration_view_kinds() {
        let mut ast = FileAst::new("lib.rs", Language::Rust, ParserTier::Native);
        ast.functions.push(FunctionDecl {
            name: "run".to_string(),
            span: span(1, 3),
            ..FunctionDecl::default()
        });
        ast.types.push(TypeDecl {
            name: "Shape".to_string(),
            kind: TypeKind::Trait,
            span: span(5, 8),
            ..TypeDecl::default()
        });
        ast.impls.push(ImplBlock {
            target_type: "Circle".to_string(),
            trait_name: Some("Shape".to_string()),
            method_count: 1,
            span: span(10, 14),
        });

        let kinds: Vec<_> = ast.declarations().map(|d| d.kind()).collect();
        assert_eq!(
            kinds,
            vec![DeclarationKind::Function, DeclarationKind::Trait, DeclarationKind::Impl]
        );
        assert_eq!(ast.declaration_count(), 3);
        assert_eq!(ast.declarations_by_kind(DeclarationKind::Impl).count(), 1);
        assert!(ast.declarations().all(|d| d.span().end_line >= d.span().start_line));
    }

    #[test]
    fn test_line_span() {
        let s = Span::line(4, 30, "fn main() {");
        assert_eq!(s.start_line, 4);
        assert_eq!(s.end_line, 4);
        assert_eq!(s.end_byte, 41);
        assert_eq!(s.line_count(), 1);
        assert_eq!(s.clone().without_columns().start_col, 0);
    }

    #[test]
    fn test_signature_ignores_param_names() {
        let a = FunctionDecl {
            name: "sum".to_string(),
            params: vec![Param { name: "a".into(), ty: "int".into(), ..Param::default() }],
            results: vec!["int".to_string()],
            ..FunctionDecl::default()
        };
        let mut b = a.clone();
        b.params[0].name = "x".to_string();
        assert_eq!(a.signature(), b.signature());
    }
}
