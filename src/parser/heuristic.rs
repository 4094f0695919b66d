//! Regex-based Rust parser used when the native tier is unavailable.
//!
//! This parser is lossy on purpose. It reads one line at a time and never
//! matches braces, so every declaration it reports starts and ends on the
//! line where its signature begins, and every function has complexity 1.
//! Signatures split across several lines lose whatever is on the later
//! lines. Detectors must treat trees with [`ParserTier::Heuristic`]
//! provenance as approximate.

use std::path::Path;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use super::module_name;
use crate::analysis::{
    FileAst, FunctionDecl, ImplBlock, ImportDecl, Language, MacroDecl, ModuleDecl, Param,
    ParserTier, Span, TypeDecl, TypeKind, ValueDecl, ValueKind, Visibility,
};
use crate::cache::ast_pool;
use crate::error::ParseError;

lazy_static! {
    static ref FN_PATTERN: Regex = Regex::new(
        r#"^\s*(pub(?:\s*\([^)]*\))?\s+)?((?:(?:const|async|unsafe|default)\s+|extern\s+(?:"[^"]*"\s+)?)*)fn\s+(\w+)\s*(?:<[^(]*>)?\s*\(([^)]*)(\))?(?:\s*->\s*([^{;]+?))?\s*(?:where\b[^{;]*)?(?:[{;].*)?$"#
    ).unwrap();

    static ref STRUCT_PATTERN: Regex = Regex::new(
        r"^\s*(pub(?:\s*\([^)]*\))?\s+)?struct\s+(\w+)"
    ).unwrap();

    static ref ENUM_PATTERN: Regex = Regex::new(
        r"^\s*(pub(?:\s*\([^)]*\))?\s+)?enum\s+(\w+)"
    ).unwrap();

    static ref TRAIT_PATTERN: Regex = Regex::new(
        r"^\s*(pub(?:\s*\([^)]*\))?\s+)?(?:unsafe\s+)?(?:auto\s+)?trait\s+(\w+)"
    ).unwrap();

    static ref IMPL_PATTERN: Regex = Regex::new(
        r"^\s*(?:unsafe\s+)?impl(?:\s*<[^>]*>)?\s+(?:!?([\w:]+)(?:<[^>]*>)?\s+for\s+)?&?([\w:]+)"
    ).unwrap();

    static ref MOD_PATTERN: Regex = Regex::new(
        r"^\s*(pub(?:\s*\([^)]*\))?\s+)?mod\s+(\w+)"
    ).unwrap();

    static ref CONST_PATTERN: Regex = Regex::new(
        r"^\s*(pub(?:\s*\([^)]*\))?\s+)?(const|static(?:\s+mut)?)\s+(\w+)\s*:\s*([^=;]+)"
    ).unwrap();

    static ref USE_PATTERN: Regex = Regex::new(
        r"^\s*(pub(?:\s*\([^)]*\))?\s+)?use\s+([^;]+)"
    ).unwrap();

    static ref MACRO_PATTERN: Regex = Regex::new(
        r"^\s*macro_rules!\s+(\w+)"
    ).unwrap();
}

/// Snippet used to check the parser works before it is put into service.
pub const VERIFY_SNIPPET: &str = r#"fn test() { println!("hello"); }"#;

/// Line-oriented Rust declaration extractor.
#[derive(Debug, Clone, Default)]
pub struct HeuristicParser;

impl HeuristicParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse the canned snippet and confirm a function comes back.
    pub fn verify(&self) -> Result<(), ParseError> {
        let ast = self.parse(Path::new("verify.rs"), VERIFY_SNIPPET.as_bytes())?;
        let found = ast.functions.len();
        ast_pool().release(ast);
        if found == 1 {
            Ok(())
        } else {
            Err(ParseError::Unavailable(format!(
                "heuristic self-check found {} functions, expected 1",
                found
            )))
        }
    }

    /// Extract declarations line by line. Fails only on non-text input.
    pub fn parse(&self, path: &Path, content: &[u8]) -> Result<FileAst, ParseError> {
        let path_str = path.to_string_lossy().to_string();
        let text = as_text(content).ok_or_else(|| ParseError::NotText {
            path: path_str.clone(),
        })?;

        let mut ast = ast_pool().acquire();
        ast.path = path_str;
        ast.language = Language::Rust;
        ast.provenance = ParserTier::Heuristic;
        ast.module = module_name(path);

        let mut offset = 0usize;
        let mut in_block_comment = false;
        let mut doc_pending = false;
        let mut macro_export_pending = false;

        for (idx, raw_line) in text.split_inclusive('\n').enumerate() {
            let line_no = idx + 1;
            let start = offset;
            offset += raw_line.len();
            let line = raw_line.trim_end_matches(['\n', '\r']);
            let trimmed = line.trim_start();

            if in_block_comment {
                if trimmed.contains("*/") {
                    in_block_comment = false;
                }
                continue;
            }
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with("///") || trimmed.starts_with("/**") {
                doc_pending = true;
                if trimmed.starts_with("/**") && !trimmed.contains("*/") {
                    in_block_comment = true;
                }
                continue;
            }
            if trimmed.starts_with("//") {
                continue;
            }
            if trimmed.starts_with("/*") {
                if !trimmed.contains("*/") {
                    in_block_comment = true;
                }
                continue;
            }
            if trimmed.starts_with("#[") || trimmed.starts_with("#![") {
                if trimmed.contains("macro_export") {
                    macro_export_pending = true;
                }
                continue;
            }

            let span = Span::line(line_no, start, line);
            let has_doc = std::mem::take(&mut doc_pending);
            let macro_export = std::mem::take(&mut macro_export_pending);
            match_line(line, span, has_doc, macro_export, &mut ast);
        }

        Ok(ast)
    }

    /// Cheap structural check: are `()`, `[]` and `{}` balanced outside
    /// strings, chars and comments?
    ///
    /// A `false` is a reliable "this will not parse"; a `true` says nothing
    /// about anything beyond delimiter balance.
    pub fn sniff(&self, content: &[u8]) -> bool {
        sniff(content)
    }
}

/// See [`HeuristicParser::sniff`]. Usable without a parser instance.
pub fn sniff(content: &[u8]) -> bool {
    match as_text(content) {
        Some(text) => delimiters_balanced(text),
        None => false,
    }
}

fn as_text(content: &[u8]) -> Option<&str> {
    if content.contains(&0) {
        return None;
    }
    std::str::from_utf8(content).ok()
}

/// Try each pattern in order; the first that matches claims the line.
fn match_line(line: &str, span: Span, has_doc: bool, macro_export: bool, ast: &mut FileAst) {
    if let Some(caps) = FN_PATTERN.captures(line) {
        ast.functions.push(function_from(&caps, span, has_doc));
    } else if let Some(caps) = STRUCT_PATTERN.captures(line) {
        ast.types.push(type_from(&caps, TypeKind::Struct, span, has_doc));
    } else if let Some(caps) = ENUM_PATTERN.captures(line) {
        ast.types.push(type_from(&caps, TypeKind::Enum, span, has_doc));
    } else if let Some(caps) = TRAIT_PATTERN.captures(line) {
        ast.types.push(type_from(&caps, TypeKind::Trait, span, has_doc));
    } else if let Some(caps) = IMPL_PATTERN.captures(line) {
        ast.impls.push(ImplBlock {
            target_type: group(&caps, 2).to_string(),
            trait_name: caps.get(1).map(|m| m.as_str().to_string()),
            method_count: 0,
            span,
        });
    } else if let Some(caps) = MOD_PATTERN.captures(line) {
        ast.modules.push(ModuleDecl {
            name: group(&caps, 2).to_string(),
            span,
            visibility: visibility(&caps),
            has_doc,
        });
    } else if let Some(caps) = CONST_PATTERN.captures(line) {
        let kind = if group(&caps, 2) == "const" {
            ValueKind::Const
        } else {
            ValueKind::Var
        };
        ast.values.push(ValueDecl {
            name: group(&caps, 3).to_string(),
            kind,
            ty: Some(group(&caps, 4).trim().to_string()),
            span,
            visibility: visibility(&caps),
            has_doc,
        });
    } else if let Some(caps) = USE_PATTERN.captures(line) {
        let target = group(&caps, 2).trim();
        let (path, alias) = match target.split_once(" as ") {
            Some((path, alias)) if !target.contains('{') => {
                (path.trim().to_string(), Some(alias.trim().to_string()))
            }
            _ => (target.to_string(), None),
        };
        ast.imports.push(ImportDecl {
            path,
            alias,
            span,
            visibility: visibility(&caps),
        });
    } else if let Some(caps) = MACRO_PATTERN.captures(line) {
        ast.macros.push(MacroDecl {
            name: group(&caps, 1).to_string(),
            span,
            macro_type: "macro_rules!".to_string(),
            is_exported: macro_export,
            has_doc,
        });
    }
}

fn group<'t>(caps: &Captures<'t>, idx: usize) -> &'t str {
    caps.get(idx).map(|m| m.as_str()).unwrap_or("")
}

fn visibility(caps: &Captures) -> Visibility {
    Visibility::from_modifier(group(caps, 1).trim())
}

fn function_from(caps: &Captures, span: Span, has_doc: bool) -> FunctionDecl {
    let qualifiers = group(caps, 2);
    // Only trust the parameter list when it closes on this line.
    let params = if caps.get(5).is_some() {
        parse_params(group(caps, 4))
    } else {
        Vec::new()
    };
    let results = caps
        .get(6)
        .map(|m| vec![m.as_str().trim().to_string()])
        .unwrap_or_default();

    FunctionDecl {
        name: group(caps, 3).to_string(),
        line_count: span.line_count(),
        span,
        params,
        results,
        visibility: visibility(caps),
        receiver: None,
        is_async: qualifiers.contains("async"),
        is_unsafe: qualifiers.contains("unsafe"),
        is_const: qualifiers.contains("const"),
        complexity: 1,
        has_doc,
    }
}

fn type_from(caps: &Captures, kind: TypeKind, span: Span, has_doc: bool) -> TypeDecl {
    TypeDecl {
        name: group(caps, 2).to_string(),
        kind,
        span,
        visibility: visibility(caps),
        field_count: 0,
        method_count: 0,
        variant_count: 0,
        has_doc,
    }
}

/// Split `a: u32, mut b: &str` into parameters, respecting nested generics.
fn parse_params(list: &str) -> Vec<Param> {
    let mut params = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();

    for c in list.chars() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                push_param(&current, &mut params);
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    push_param(&current, &mut params);
    params
}

fn push_param(raw: &str, out: &mut Vec<Param>) {
    let raw = raw.trim();
    if raw.is_empty() {
        return;
    }
    match raw.split_once(':') {
        Some((pattern, ty)) if !pattern.contains('<') => {
            let pattern = pattern.trim();
            let is_mut = pattern.starts_with("mut ");
            let ty = ty.trim();
            out.push(Param {
                name: pattern.trim_start_matches("mut ").trim().to_string(),
                ty: ty.to_string(),
                is_mut,
                is_ref: ty.starts_with('&'),
            });
        }
        _ => {
            // self receivers: self, &self, &mut self, mut self
            out.push(Param {
                name: "self".to_string(),
                ty: raw.to_string(),
                is_mut: raw.contains("mut"),
                is_ref: raw.starts_with('&'),
            });
        }
    }
}

/// Delimiter balance check that skips comments, strings and char literals.
fn delimiters_balanced(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let mut stack: Vec<char> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                // Block comments nest in Rust.
                let mut depth = 0;
                while i < chars.len() {
                    if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
                        depth += 1;
                        i += 2;
                    } else if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        depth -= 1;
                        i += 2;
                        if depth == 0 {
                            break;
                        }
                    } else {
                        i += 1;
                    }
                }
                if depth != 0 {
                    return false;
                }
                continue;
            }
            'r' if is_raw_string_start(&chars, i) => {
                i += 1;
                let mut hashes = 0;
                while chars.get(i) == Some(&'#') {
                    hashes += 1;
                    i += 1;
                }
                // opening quote
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return false,
                        Some('"') if (1..=hashes).all(|h| chars.get(i + h) == Some(&'#')) => {
                            i += hashes;
                            break;
                        }
                        _ => i += 1,
                    }
                }
            }
            '"' => {
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return false,
                        Some('\\') => i += 2,
                        Some('"') => break,
                        _ => i += 1,
                    }
                }
            }
            '\'' => {
                // Char literal or lifetime. Only skip when it closes like a char.
                if next == Some('\\') {
                    let mut j = i + 3;
                    while j < chars.len() && chars[j] != '\'' && chars[j] != '\n' {
                        j += 1;
                    }
                    i = j;
                } else if chars.get(i + 2) == Some(&'\'') {
                    i += 2;
                }
            }
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return false;
                }
            }
            _ => {}
        }
        i += 1;
    }

    stack.is_empty()
}

/// `r"..."` or `r#"..."#`, but not an identifier ending in `r`.
fn is_raw_string_start(chars: &[char], i: usize) -> bool {
    if i > 0 && (chars[i - 1].is_alphanumeric() || chars[i - 1] == '_') {
        return false;
    }
    let mut j = i + 1;
    while chars.get(j) == Some(&'#') {
        j += 1;
    }
    chars.get(j) == Some(&'"')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> FileAst {
        HeuristicParser::new()
            .parse(Path::new("src/widget.rs"), source.as_bytes())
            .expect("heuristic parse should succeed")
    }

    #[test]
    fn test_verify_snippet() {
        assert!(HeuristicParser::new().verify().is_ok());
    }

    #[test]
    fn test_functions_with_qualifiers() {
        let source = r#"
/// Entry point.
pub async fn serve(addr: &str, mut retries: u32) -> Result<(), Error> {
    todo!()
}

pub(crate) const unsafe fn raw() -> *const u8 {
    std::ptr::null()
}

fn private_helper() {}
"#;
        let ast = parse(source);
        assert_eq!(ast.functions.len(), 3);
        assert_eq!(ast.provenance, ParserTier::Heuristic);

        let serve = ast.find_function("serve").unwrap();
        assert!(serve.is_async);
        assert!(serve.has_doc);
        assert_eq!(serve.visibility, Visibility::Public);
        assert_eq!(serve.span.start_line, 3);
        assert_eq!(serve.span.end_line, 3);
        assert_eq!(serve.params.len(), 2);
        assert!(serve.params[0].is_ref);
        assert!(serve.params[1].is_mut);
        assert_eq!(serve.params[1].name, "retries");
        assert_eq!(serve.results, vec!["Result<(), Error>".to_string()]);

        let raw = ast.find_function("raw").unwrap();
        assert!(raw.is_const);
        assert!(raw.is_unsafe);
        assert_eq!(raw.visibility, Visibility::Crate);

        let helper = ast.find_function("private_helper").unwrap();
        assert_eq!(helper.visibility, Visibility::Private);
        assert_eq!(helper.complexity, 1);
    }

    #[test]
    fn test_types_impls_and_modules() {
        let source = r#"
pub struct Widget {
    size: u32,
}

enum Mode { Fast, Slow }

pub trait Render {
    fn render(&self) -> String;
}

impl Render for Widget {
    fn render(&self) -> String { String::new() }
}

impl<T: Clone> Holder<T> {}

pub mod shapes;
"#;
        let ast = parse(source);
        assert_eq!(ast.types.len(), 3);
        assert_eq!(ast.find_type("Widget").unwrap().kind, TypeKind::Struct);
        assert_eq!(ast.find_type("Mode").unwrap().kind, TypeKind::Enum);
        assert_eq!(ast.find_type("Render").unwrap().kind, TypeKind::Trait);

        assert_eq!(ast.impls.len(), 2);
        assert_eq!(ast.impls[0].target_type, "Widget");
        assert_eq!(ast.impls[0].trait_name.as_deref(), Some("Render"));
        assert_eq!(ast.impls[1].target_type, "Holder");
        assert!(ast.impls[1].trait_name.is_none());

        assert_eq!(ast.modules.len(), 1);
        assert_eq!(ast.modules[0].name, "shapes");
        // trait method signature and impl method both count
        assert_eq!(ast.functions.len(), 2);
    }

    #[test]
    fn test_constants_uses_and_macros() {
        let source = r#"
use std::collections::HashMap;
use std::io::Result as IoResult;
pub use crate::{a, b};

pub const MAX: usize = 10;
static mut COUNTER: u64 = 0;

#[macro_export]
macro_rules! shout {
    () => {};
}
"#;
        let ast = parse(source);
        assert_eq!(ast.imports.len(), 3);
        assert_eq!(ast.imports[1].path, "std::io::Result");
        assert_eq!(ast.imports[1].alias.as_deref(), Some("IoResult"));
        assert_eq!(ast.imports[2].visibility, Visibility::Public);

        assert_eq!(ast.values.len(), 2);
        assert_eq!(ast.values[0].kind, ValueKind::Const);
        assert_eq!(ast.values[0].ty.as_deref(), Some("usize"));
        assert_eq!(ast.values[1].kind, ValueKind::Var);

        assert_eq!(ast.macros.len(), 1);
        assert!(ast.macros[0].is_exported);
    }

    #[test]
    fn test_comments_skipped() {
        let source = r#"
// fn commented_out() {}
/*
fn inside_block() {}
*/
fn real() {}
"#;
        let ast = parse(source);
        assert_eq!(ast.functions.len(), 1);
        assert_eq!(ast.functions[0].name, "real");
        assert_eq!(ast.functions[0].span.start_line, 6);
    }

    #[test]
    fn test_non_text_rejected() {
        let parser = HeuristicParser::new();
        let err = parser.parse(Path::new("bin.rs"), &[0x66, 0x00, 0x6e]).unwrap_err();
        assert!(matches!(err, ParseError::NotText { .. }));
        assert!(parser.parse(Path::new("bad.rs"), &[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_sniff() {
        let parser = HeuristicParser::new();
        assert!(parser.sniff(b"fn main() { let v = vec![1, 2]; }"));
        assert!(parser.sniff(br#"fn s() -> &'static str { "}{" }"#));
        assert!(parser.sniff(b"fn c() -> char { '{' }"));
        assert!(parser.sniff(br##"fn r() { let _ = r#"(("#; }"##));
        assert!(parser.sniff(b"// }\nfn ok() {}"));
        assert!(!parser.sniff(b"fn main() { "));
        assert!(!parser.sniff(b"fn main() ) {"));
    }
}
