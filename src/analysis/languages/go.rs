//! Go language analyzer using tree-sitter.
//!
//! Go is parsed entirely in-process. Extracts:
//! - Package name
//! - Functions and methods (parameters, results, receiver, doc comments)
//! - Struct, interface and alias types with member counts
//! - Top-level constants and variables
//! - Imports with aliases
//! - Cyclomatic complexity per function

use std::path::Path;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor};

use crate::analysis::{
    first_error_line, FileAst, FunctionDecl, ImportDecl, Language as SourceLanguage,
    LanguageAnalyzer, Param, ParsedFile, ParserTier, Span, TypeDecl, TypeKind, ValueDecl,
    ValueKind, Visibility,
};
use crate::cache::ast_pool;
use crate::error::ParseError;

/// Decision points counted for cyclomatic complexity.
///
/// `for` covers both classic and range loops. Each non-default case clause
/// adds a path; `default` does not.
const COMPLEXITY_QUERY: &str = r#"
(if_statement) @if
(for_statement) @for
(expression_switch_statement) @switch
(type_switch_statement) @switch
(expression_case) @case
(type_case) @case
"#;

/// Go language analyzer.
pub struct GoAnalyzer {
    language: Language,
    complexity_query: Query,
}

impl GoAnalyzer {
    /// Create a new Go analyzer.
    ///
    /// Fails when the grammar cannot be loaded into the tree-sitter runtime,
    /// which leaves the primary language without a parser.
    pub fn new() -> Result<Self, ParseError> {
        let language: Language = tree_sitter_go::LANGUAGE.into();
        Parser::new()
            .set_language(&language)
            .map_err(|e| ParseError::Unavailable(format!("go grammar: {}", e)))?;
        let complexity_query = Query::new(&language, COMPLEXITY_QUERY)
            .map_err(|e| ParseError::Unavailable(format!("go complexity query: {}", e)))?;

        Ok(Self {
            language,
            complexity_query,
        })
    }

    /// Create a new parser for this call.
    fn create_parser(&self) -> Result<Parser, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| ParseError::Backend(e.to_string()))?;
        Ok(parser)
    }

    fn extract(&self, parsed: &ParsedFile, ast: &mut FileAst) {
        let root = parsed.tree.root_node();
        let mut cursor = root.walk();

        for node in root.named_children(&mut cursor) {
            match node.kind() {
                "package_clause" => {
                    ast.module = node
                        .named_child(0)
                        .map(|n| parsed.node_text(n).to_string());
                }
                "function_declaration" | "method_declaration" => {
                    if let Some(func) = self.extract_function(parsed, node) {
                        ast.functions.push(func);
                    }
                }
                "type_declaration" => self.extract_types(parsed, node, &mut ast.types),
                "const_declaration" => {
                    self.extract_values(parsed, node, "const_spec", ValueKind::Const, &mut ast.values)
                }
                "var_declaration" => {
                    self.extract_values(parsed, node, "var_spec", ValueKind::Var, &mut ast.values)
                }
                "import_declaration" => self.extract_imports(parsed, node, &mut ast.imports),
                _ => {}
            }
        }
    }

    fn extract_function(&self, parsed: &ParsedFile, node: Node) -> Option<FunctionDecl> {
        let name = parsed.node_text(node.child_by_field_name("name")?).to_string();
        let span = Span::from_node(node);

        let params = node
            .child_by_field_name("parameters")
            .map(|list| extract_params(parsed, list))
            .unwrap_or_default();

        let results = match node.child_by_field_name("result") {
            Some(list) if list.kind() == "parameter_list" => extract_params(parsed, list)
                .into_iter()
                .map(|p| p.ty)
                .collect(),
            Some(ty) => vec![parsed.node_text(ty).to_string()],
            None => Vec::new(),
        };

        let receiver = node
            .child_by_field_name("receiver")
            .and_then(|list| extract_params(parsed, list).into_iter().next())
            .map(|p| receiver_type_name(&p.ty));

        let complexity = node
            .child_by_field_name("body")
            .map(|body| self.complexity(parsed, body))
            .unwrap_or(1);

        Some(FunctionDecl {
            visibility: Visibility::from_go_identifier(&name),
            line_count: span.line_count(),
            has_doc: has_doc_comment(node),
            name,
            span,
            params,
            results,
            receiver,
            complexity,
            ..FunctionDecl::default()
        })
    }

    /// 1 + number of decision points inside `body`.
    fn complexity(&self, parsed: &ParsedFile, body: Node) -> u32 {
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.complexity_query, body, parsed.source);

        let mut decisions = 0u32;
        while let Some(m) = matches.next() {
            decisions += m.captures.len() as u32;
        }
        1 + decisions
    }

    fn extract_types(&self, parsed: &ParsedFile, decl: Node, out: &mut Vec<TypeDecl>) {
        let has_doc = has_doc_comment(decl);
        let mut cursor = decl.walk();

        for spec in decl.named_children(&mut cursor) {
            if spec.kind() != "type_spec" && spec.kind() != "type_alias" {
                continue;
            }
            let Some(name_node) = spec.child_by_field_name("name") else {
                continue;
            };
            let name = parsed.node_text(name_node).to_string();
            let body = spec.child_by_field_name("type");

            let (kind, field_count, method_count) = match body.map(|b| b.kind()) {
                _ if spec.kind() == "type_alias" => (TypeKind::Alias, 0, 0),
                Some("struct_type") => (TypeKind::Struct, body.map(count_struct_fields).unwrap_or(0), 0),
                Some("interface_type") => {
                    (TypeKind::Interface, 0, body.map(count_interface_methods).unwrap_or(0))
                }
                _ => (TypeKind::Alias, 0, 0),
            };

            out.push(TypeDecl {
                visibility: Visibility::from_go_identifier(&name),
                name,
                kind,
                span: Span::from_node(spec),
                field_count,
                method_count,
                variant_count: 0,
                has_doc: has_doc || has_doc_comment(spec),
            });
        }
    }

    fn extract_values(
        &self,
        parsed: &ParsedFile,
        decl: Node,
        spec_kind: &str,
        kind: ValueKind,
        out: &mut Vec<ValueDecl>,
    ) {
        let has_doc = has_doc_comment(decl);
        let mut specs = Vec::new();
        collect_named(decl, spec_kind, &mut specs);

        for spec in specs {
            let ty = spec
                .child_by_field_name("type")
                .map(|t| parsed.node_text(t).to_string());
            let mut cursor = spec.walk();
            for name_node in spec.children_by_field_name("name", &mut cursor) {
                let name = parsed.node_text(name_node).to_string();
                out.push(ValueDecl {
                    visibility: Visibility::from_go_identifier(&name),
                    name,
                    kind,
                    ty: ty.clone(),
                    span: Span::from_node(spec),
                    has_doc: has_doc || has_doc_comment(spec),
                });
            }
        }
    }

    fn extract_imports(&self, parsed: &ParsedFile, decl: Node, out: &mut Vec<ImportDecl>) {
        let mut specs = Vec::new();
        collect_named(decl, "import_spec", &mut specs);

        for spec in specs {
            let Some(path_node) = spec.child_by_field_name("path") else {
                continue;
            };
            // Remove quotes from path
            let path = parsed
                .node_text(path_node)
                .trim_matches(|c| c == '"' || c == '`')
                .to_string();
            let alias = spec
                .child_by_field_name("name")
                .map(|n| parsed.node_text(n).to_string());

            out.push(ImportDecl {
                path,
                alias,
                span: Span::from_node(spec),
                visibility: Visibility::Private,
            });
        }
    }
}

impl LanguageAnalyzer for GoAnalyzer {
    fn language(&self) -> SourceLanguage {
        SourceLanguage::Go
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn analyze(&self, path: &Path, source: &[u8]) -> Result<FileAst, ParseError> {
        let path_str = path.to_string_lossy().to_string();
        let mut parser = self.create_parser()?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ParseError::Backend(format!("failed to parse Go source: {}", path_str)))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(ParseError::Syntax {
                path: path_str,
                line: first_error_line(root),
            });
        }

        let parsed = ParsedFile::new(&tree, source, &path_str);
        let mut ast = ast_pool().acquire();
        ast.path = path_str.clone();
        ast.language = SourceLanguage::Go;
        ast.provenance = ParserTier::Native;
        self.extract(&parsed, &mut ast);

        tracing::trace!(
            path = %path_str,
            functions = ast.functions.len(),
            types = ast.types.len(),
            "analyzed go file"
        );
        Ok(ast)
    }
}

/// Flatten a Go parameter list into one entry per declared name.
fn extract_params(parsed: &ParsedFile, list: Node) -> Vec<Param> {
    let mut params = Vec::new();
    let mut cursor = list.walk();

    for decl in list.named_children(&mut cursor) {
        let variadic = match decl.kind() {
            "parameter_declaration" => false,
            "variadic_parameter_declaration" => true,
            _ => continue,
        };
        let raw_ty = decl
            .child_by_field_name("type")
            .map(|t| parsed.node_text(t).to_string())
            .unwrap_or_default();
        let ty = if variadic { format!("...{}", raw_ty) } else { raw_ty };

        let mut name_cursor = decl.walk();
        let names: Vec<String> = decl
            .children_by_field_name("name", &mut name_cursor)
            .map(|n| parsed.node_text(n).to_string())
            .collect();

        let is_ref = ty.starts_with('*');
        if names.is_empty() {
            params.push(Param {
                name: String::new(),
                ty,
                is_mut: false,
                is_ref,
            });
        } else {
            params.extend(names.into_iter().map(|name| Param {
                name,
                ty: ty.clone(),
                is_mut: false,
                is_ref,
            }));
        }
    }

    params
}

/// `*Config` and `Cache[K, V]` both name their base type.
fn receiver_type_name(ty: &str) -> String {
    let base = ty.trim_start_matches('*');
    base.split('[').next().unwrap_or(base).trim().to_string()
}

fn count_struct_fields(struct_node: Node) -> usize {
    let mut cursor = struct_node.walk();
    let Some(list) = struct_node
        .named_children(&mut cursor)
        .find(|n| n.kind() == "field_declaration_list")
    else {
        return 0;
    };

    let mut list_cursor = list.walk();
    let mut count = 0;
    for field in list.named_children(&mut list_cursor) {
        if field.kind() != "field_declaration" {
            continue;
        }
        let mut names = field.walk();
        let named = field.children_by_field_name("name", &mut names).count();
        // Embedded fields have no name but still count once.
        count += named.max(1);
    }
    count
}

fn count_interface_methods(iface: Node) -> usize {
    let mut cursor = iface.walk();
    let count = iface
        .named_children(&mut cursor)
        .filter(|n| matches!(n.kind(), "method_elem" | "method_spec"))
        .count();
    count
}

/// Collect nodes of `kind` below `node`, looking through grouping lists.
fn collect_named<'t>(node: Node<'t>, kind: &str, out: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == kind {
            out.push(child);
        } else if child.kind().ends_with("_list") {
            collect_named(child, kind, out);
        }
    }
}

/// A `//` comment ending on the line right above the node.
fn has_doc_comment(node: Node) -> bool {
    node.prev_named_sibling().is_some_and(|prev| {
        prev.kind() == "comment" && prev.end_position().row + 1 == node.start_position().row
    })
}
