//! Translation from a tree-sitter Rust tree into a [`FileAst`].

use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Query, QueryCursor};

use super::NativeConfig;
use crate::analysis::{
    FileAst, FunctionDecl, ImplBlock, ImportDecl, MacroDecl, ModuleDecl, Param, ParsedFile, Span,
    TypeDecl, TypeKind, ValueDecl, ValueKind, Visibility,
};

/// Decision points counted for cyclomatic complexity.
///
/// Matched over the whole function body, so closures and nested `fn` items
/// add to the enclosing function's score. Every match arm counts, the
/// wildcard arm included.
pub(super) const COMPLEXITY_QUERY: &str = r#"
(if_expression) @if
(for_expression) @for
(while_expression) @while
(loop_expression) @loop
(match_arm) @match_arm
(binary_expression operator: "&&") @and
(binary_expression operator: "||") @or
"#;

/// Enclosing item for declarations found in a nested body.
#[derive(Clone, Copy)]
enum Scope<'s> {
    TopLevel,
    /// Inherent impl: methods keep their own visibility.
    Impl(&'s str),
    /// Trait definition or trait impl: methods are as visible as the trait.
    Trait(&'s str),
}

impl<'s> Scope<'s> {
    fn receiver(&self) -> Option<String> {
        match self {
            Scope::TopLevel => None,
            Scope::Impl(name) | Scope::Trait(name) => Some(name.to_string()),
        }
    }
}

pub(super) struct Extractor<'a> {
    parsed: &'a ParsedFile<'a>,
    config: &'a NativeConfig,
    complexity_query: &'a Query,
}

impl<'a> Extractor<'a> {
    pub fn new(parsed: &'a ParsedFile<'a>, config: &'a NativeConfig, complexity_query: &'a Query) -> Self {
        Self {
            parsed,
            config,
            complexity_query,
        }
    }

    pub fn extract(&self, ast: &mut FileAst) {
        let root = self.parsed.tree.root_node();
        self.extract_items(root, Scope::TopLevel, ast);
    }

    fn extract_items(&self, container: Node, scope: Scope, ast: &mut FileAst) {
        let mut cursor = container.walk();
        for node in container.named_children(&mut cursor) {
            // Associated consts and types are not module-level declarations.
            if !matches!(scope, Scope::TopLevel) && node.kind() != "function_item" {
                continue;
            }
            match node.kind() {
                "function_item" => {
                    if let Some(func) = self.function(node, scope) {
                        if self.keep(func.visibility) {
                            ast.functions.push(func);
                        }
                    }
                }
                "struct_item" | "union_item" => self.push_type(node, TypeKind::Struct, ast),
                "enum_item" => self.push_type(node, TypeKind::Enum, ast),
                "type_item" => self.push_type(node, TypeKind::Alias, ast),
                "trait_item" => {
                    self.push_type(node, TypeKind::Trait, ast);
                    if let (Some(name), Some(body)) =
                        (self.field_text(node, "name"), node.child_by_field_name("body"))
                    {
                        self.extract_items(body, Scope::Trait(name), ast);
                    }
                }
                "impl_item" => self.impl_block(node, ast),
                "mod_item" => {
                    let visibility = visibility_of(self.parsed, node);
                    if let Some(name) = self.field_text(node, "name") {
                        if self.keep(visibility) {
                            ast.modules.push(ModuleDecl {
                                name: name.to_string(),
                                span: self.span(node),
                                visibility,
                                has_doc: self.has_doc(node),
                            });
                        }
                    }
                    if let Some(body) = node.child_by_field_name("body") {
                        self.extract_items(body, Scope::TopLevel, ast);
                    }
                }
                "const_item" => self.push_value(node, ValueKind::Const, ast),
                "static_item" => self.push_value(node, ValueKind::Var, ast),
                "use_declaration" => self.push_import(node, ast),
                "macro_definition" if self.config.parse_macros => {
                    if let Some(name) = self.field_text(node, "name") {
                        ast.macros.push(MacroDecl {
                            name: name.to_string(),
                            span: self.span(node),
                            macro_type: "macro_rules!".to_string(),
                            is_exported: has_attribute(self.parsed, node, "macro_export"),
                            has_doc: self.has_doc(node),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    fn function(&self, node: Node, scope: Scope) -> Option<FunctionDecl> {
        let name = self.field_text(node, "name")?.to_string();
        let span = self.span(node);

        let visibility = match scope {
            Scope::Trait(_) => Visibility::Public,
            _ => visibility_of(self.parsed, node),
        };

        let params = node
            .child_by_field_name("parameters")
            .map(|list| self.params(list))
            .unwrap_or_default();

        let results = node
            .child_by_field_name("return_type")
            .map(|ty| vec![self.type_text(ty)])
            .unwrap_or_default();

        let modifiers = {
            let mut cursor = node.walk();
            let found = node
                .children(&mut cursor)
                .find(|c| c.kind() == "function_modifiers")
                .map(|m| self.parsed.node_text(m).to_string())
                .unwrap_or_default();
            found
        };
        let has_modifier = |word: &str| modifiers.split_whitespace().any(|w| w == word);

        let complexity = node
            .child_by_field_name("body")
            .map(|body| self.complexity(body))
            .unwrap_or(1);

        Some(FunctionDecl {
            name,
            line_count: span.line_count(),
            span,
            params,
            results,
            visibility,
            receiver: scope.receiver(),
            is_async: has_modifier("async"),
            is_unsafe: has_modifier("unsafe"),
            is_const: has_modifier("const"),
            complexity,
            has_doc: self.has_doc(node),
        })
    }

    fn params(&self, list: Node) -> Vec<Param> {
        let mut params = Vec::new();
        let mut cursor = list.walk();

        for param in list.named_children(&mut cursor) {
            match param.kind() {
                "self_parameter" => {
                    let text = self.parsed.node_text(param);
                    params.push(Param {
                        name: "self".to_string(),
                        ty: text.to_string(),
                        is_mut: text.contains("mut"),
                        is_ref: text.starts_with('&'),
                    });
                }
                "parameter" => {
                    let pattern = self.field_text(param, "pattern").unwrap_or("_");
                    let ty = param
                        .child_by_field_name("type")
                        .map(|t| self.type_text(t))
                        .unwrap_or_default();
                    let is_mut = {
                        let mut c = param.walk();
                        let found = param.children(&mut c).any(|n| n.kind() == "mutable_specifier");
                        found
                    } || pattern.starts_with("mut ");
                    params.push(Param {
                        name: pattern.trim_start_matches("mut ").to_string(),
                        is_ref: ty.starts_with('&'),
                        ty,
                        is_mut,
                    });
                }
                "variadic_parameter" => params.push(Param {
                    name: String::new(),
                    ty: "...".to_string(),
                    is_mut: false,
                    is_ref: false,
                }),
                _ => {}
            }
        }

        params
    }

    /// 1 + number of decision points, capped by the configured limit.
    fn complexity(&self, body: Node) -> u32 {
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(self.complexity_query, body, self.parsed.source);

        let cap = self.config.max_complexity_calc.max(1);
        let mut complexity = 1u32;
        while let Some(m) = matches.next() {
            complexity += m.captures.len() as u32;
            if complexity >= cap {
                return cap;
            }
        }
        complexity
    }

    fn push_type(&self, node: Node, kind: TypeKind, ast: &mut FileAst) {
        let Some(name) = self.field_text(node, "name") else {
            return;
        };
        let visibility = visibility_of(self.parsed, node);
        if !self.keep(visibility) {
            return;
        }

        let body = node.child_by_field_name("body");
        let (field_count, method_count, variant_count) = match (kind, body) {
            (TypeKind::Struct, Some(body)) => (count_kinds(body, &["field_declaration"], true), 0, 0),
            (TypeKind::Enum, Some(body)) => (0, 0, count_kinds(body, &["enum_variant"], false)),
            (TypeKind::Trait, Some(body)) => (
                0,
                count_kinds(body, &["function_item", "function_signature_item"], false),
                0,
            ),
            _ => (0, 0, 0),
        };

        ast.types.push(TypeDecl {
            name: name.to_string(),
            kind,
            span: self.span(node),
            visibility,
            field_count,
            method_count,
            variant_count,
            has_doc: self.has_doc(node),
        });
    }

    fn impl_block(&self, node: Node, ast: &mut FileAst) {
        let Some(target) = node.child_by_field_name("type").map(|t| base_type_name(self.parsed, t)) else {
            return;
        };
        let trait_name = node
            .child_by_field_name("trait")
            .map(|t| base_type_name(self.parsed, t));
        let body = node.child_by_field_name("body");
        let method_count = body
            .map(|b| count_kinds(b, &["function_item"], false))
            .unwrap_or(0);

        ast.impls.push(ImplBlock {
            target_type: target.to_string(),
            trait_name: trait_name.map(str::to_string),
            method_count,
            span: self.span(node),
        });

        if let Some(body) = body {
            let scope = if node.child_by_field_name("trait").is_some() {
                Scope::Trait(target)
            } else {
                Scope::Impl(target)
            };
            self.extract_items(body, scope, ast);
        }
    }

    fn push_value(&self, node: Node, kind: ValueKind, ast: &mut FileAst) {
        let Some(name) = self.field_text(node, "name") else {
            return;
        };
        let visibility = visibility_of(self.parsed, node);
        if !self.keep(visibility) {
            return;
        }
        ast.values.push(ValueDecl {
            name: name.to_string(),
            kind,
            ty: node.child_by_field_name("type").map(|t| self.type_text(t)),
            span: self.span(node),
            visibility,
            has_doc: self.has_doc(node),
        });
    }

    fn push_import(&self, node: Node, ast: &mut FileAst) {
        let Some(argument) = node.child_by_field_name("argument") else {
            return;
        };
        let visibility = visibility_of(self.parsed, node);
        let (path, alias) = if argument.kind() == "use_as_clause" {
            (
                self.field_text(argument, "path").unwrap_or_default().to_string(),
                self.field_text(argument, "alias").map(str::to_string),
            )
        } else {
            (self.parsed.node_text(argument).to_string(), None)
        };

        ast.imports.push(ImportDecl {
            path,
            alias,
            span: self.span(node),
            visibility,
        });
    }

    fn keep(&self, visibility: Visibility) -> bool {
        self.config.include_private || visibility != Visibility::Private
    }

    fn span(&self, node: Node) -> Span {
        let span = Span::from_node(node);
        if self.config.include_positions {
            span
        } else {
            span.without_columns()
        }
    }

    fn has_doc(&self, node: Node) -> bool {
        self.config.include_docs && has_doc_comment(self.parsed, node)
    }

    fn field_text(&self, node: Node, field: &str) -> Option<&'a str> {
        node.child_by_field_name(field).map(|n| self.parsed.node_text(n))
    }

    fn type_text(&self, node: Node) -> String {
        let text = self.parsed.node_text(node);
        if self.config.include_generics {
            text.to_string()
        } else {
            strip_generics(text)
        }
    }
}

fn visibility_of(parsed: &ParsedFile, node: Node) -> Visibility {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .find(|c| c.kind() == "visibility_modifier")
        .map(|v| Visibility::from_modifier(parsed.node_text(v)))
        .unwrap_or(Visibility::Private);
    found
}

/// `Vec<T>` and `crate::a::Holder<T>` name their base type.
fn base_type_name<'t>(parsed: &ParsedFile<'t>, node: Node) -> &'t str {
    let named = match node.kind() {
        "generic_type" => node.child_by_field_name("type").unwrap_or(node),
        "reference_type" => node.child_by_field_name("type").unwrap_or(node),
        _ => node,
    };
    let text = parsed.node_text(named);
    text.split('<').next().unwrap_or(text).trim()
}

/// Count named children of `body` whose kind is in `kinds`. Tuple structs
/// count each positional type as a field.
fn count_kinds(body: Node, kinds: &[&str], positional_fields: bool) -> usize {
    let mut cursor = body.walk();
    let mut count = 0;
    for child in body.named_children(&mut cursor) {
        if kinds.contains(&child.kind()) {
            count += 1;
        } else if positional_fields
            && body.kind() == "ordered_field_declaration_list"
            && !matches!(
                child.kind(),
                "attribute_item" | "visibility_modifier" | "line_comment" | "block_comment"
            )
        {
            count += 1;
        }
    }
    count
}

/// Walk back over attributes to the nearest comment and check it is an
/// outer doc comment.
fn has_doc_comment(parsed: &ParsedFile, node: Node) -> bool {
    let mut prev = node.prev_named_sibling();
    while let Some(sibling) = prev {
        match sibling.kind() {
            "attribute_item" => prev = sibling.prev_named_sibling(),
            "line_comment" => {
                let text = parsed.node_text(sibling);
                return text.starts_with("///") && !text.starts_with("////");
            }
            "block_comment" => return parsed.node_text(sibling).starts_with("/**"),
            _ => return false,
        }
    }
    false
}

fn has_attribute(parsed: &ParsedFile, node: Node, name: &str) -> bool {
    let mut prev = node.prev_named_sibling();
    while let Some(sibling) = prev {
        match sibling.kind() {
            "attribute_item" => {
                if parsed.node_text(sibling).contains(name) {
                    return true;
                }
                prev = sibling.prev_named_sibling();
            }
            "line_comment" | "block_comment" => prev = sibling.prev_named_sibling(),
            _ => return false,
        }
    }
    false
}

/// Remove every `<...>` group, e.g. `HashMap<K, Vec<V>>` becomes `HashMap`.
pub(super) fn strip_generics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_generics() {
        assert_eq!(strip_generics("HashMap<K, Vec<V>>"), "HashMap");
        assert_eq!(strip_generics("&'a str"), "&'a str");
        assert_eq!(strip_generics("Result<(), E>"), "Result");
    }
}
