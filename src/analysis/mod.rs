//! Code-structure analysis.
//!
//! Parses a source file with tree-sitter and extracts the facts the test
//! generator needs: imports, top-level functions, classes with their
//! constructors and methods, and per-function signatures (parameters,
//! return type, async flag, exceptions raised).
//!
//! Extraction is shallow on purpose: only top-level declarations (and the
//! members of top-level classes, including those nested in namespaces) are
//! reported.

mod cpp;
mod csharp;
mod javascript;
mod python;

use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use std::path::Path;
use tree_sitter::{Language, Node, Parser};

use crate::lang::Lang;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamFact {
    pub name: String,
    pub type_hint: Option<String>,
    pub has_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionFact {
    pub name: String,
    pub params: Vec<ParamFact>,
    pub return_type: Option<String>,
    pub is_async: bool,
    pub is_static: bool,
    pub is_public: bool,
    /// Exception types raised or thrown in the body, in source order.
    pub raises: Vec<String>,
    /// 1-based.
    pub line: usize,
}

impl FunctionFact {
    fn new(name: String, line: usize) -> Self {
        Self {
            name,
            params: Vec::new(),
            return_type: None,
            is_async: false,
            is_static: false,
            is_public: true,
            raises: Vec::new(),
            line,
        }
    }

    pub fn returns_value(&self) -> bool {
        match self.return_type.as_deref() {
            None => true,
            Some(t) => !matches!(
                t.trim(),
                "void" | "None" | "Task" | "Promise<void>" | "never" | "undefined"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassFact {
    pub name: String,
    pub bases: Vec<String>,
    pub constructor: Option<FunctionFact>,
    pub methods: Vec<FunctionFact>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeFacts {
    pub language: Lang,
    /// Namespace for C#/C++ when declared, otherwise the file stem.
    pub module_name: String,
    pub namespace: Option<String>,
    pub imports: Vec<String>,
    pub functions: Vec<FunctionFact>,
    pub classes: Vec<ClassFact>,
}

impl CodeFacts {
    pub fn function(&self, name: &str) -> Option<&FunctionFact> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn class(&self, name: &str) -> Option<&ClassFact> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Find `Class.method` (or `Class::method`) among class members.
    pub fn method(&self, qualified: &str) -> Option<(&ClassFact, &FunctionFact)> {
        let (class_name, method_name) = qualified
            .split_once("::")
            .or_else(|| qualified.split_once('.'))?;
        let class = self.class(class_name)?;
        let method = class.methods.iter().find(|m| m.name == method_name)?;
        Some((class, method))
    }
}

fn tree_sitter_language(lang: Lang, path: &Path) -> Option<Language> {
    match lang {
        Lang::Python => Some(tree_sitter_python::LANGUAGE.into()),
        Lang::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Lang::TypeScript => {
            let tsx = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("tsx"));
            if tsx {
                Some(tree_sitter_typescript::LANGUAGE_TSX.into())
            } else {
                Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            }
        }
        Lang::CSharp => Some(tree_sitter_c_sharp::LANGUAGE.into()),
        Lang::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
        _ => None,
    }
}

/// Parse `source` and extract its [`CodeFacts`].
pub fn analyze_source(path: &Path, source: &str, lang: Lang) -> Result<CodeFacts> {
    let Some(language) = tree_sitter_language(lang, path) else {
        bail!("no structure analyser for {} ({})", lang, path.display());
    };

    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| anyhow!("Failed to set language for {}: {:?}", path.display(), e))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| anyhow!("Failed to parse file: {}", path.display()))?;
    let root = tree.root_node();
    if root.has_error() {
        tracing::debug!(path = %path.display(), "syntax errors in source; extracting what parsed");
    }

    let mut facts = CodeFacts {
        language: lang,
        module_name: path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
        namespace: None,
        imports: Vec::new(),
        functions: Vec::new(),
        classes: Vec::new(),
    };

    match lang {
        Lang::Python => python::extract(root, source, &mut facts),
        Lang::JavaScript | Lang::TypeScript => javascript::extract(root, source, &mut facts),
        Lang::CSharp => csharp::extract(root, source, &mut facts),
        Lang::Cpp => cpp::extract(root, source, &mut facts),
        _ => {}
    }

    Ok(facts)
}

// ============ Shared tree helpers ============

fn text<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn field_text(node: &Node, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| normalize(text(&n, source)))
        .filter(|s| !s.is_empty())
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn line_of(node: &Node) -> usize {
    node.start_position().row + 1
}

/// Whether `node` has a direct child (named or anonymous) of `kind`.
fn has_child_kind(node: &Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == kind);
    found
}

/// Node kinds that open a new function scope in any supported grammar.
const NESTED_FUNCTION_KINDS: &[&str] = &[
    "function_definition",
    "lambda",
    "function_declaration",
    "function_expression",
    "function",
    "generator_function",
    "generator_function_declaration",
    "arrow_function",
    "method_definition",
    "local_function_statement",
    "lambda_expression",
    "anonymous_method_expression",
];

/// Visit `node` and its descendants in document order, without entering
/// nested function bodies.
fn walk_scope<'t>(node: Node<'t>, visit: &mut dyn FnMut(Node<'t>)) {
    visit(node);
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if NESTED_FUNCTION_KINDS.contains(&child.kind()) {
            continue;
        }
        walk_scope(child, visit);
    }
}

/// Collect exception type names thrown inside `body`.
///
/// `kinds` are the throw/raise statement kinds of the grammar; `name_of`
/// maps one such statement to the thrown type, if it names one. Raises in
/// nested functions and lambdas belong to those, not to the enclosing body.
fn collect_raises(
    body: Option<Node>,
    source: &str,
    kinds: &[&str],
    name_of: fn(Node, &str) -> Option<String>,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(body) = body {
        walk_scope(body, &mut |n| {
            if kinds.contains(&n.kind()) {
                if let Some(name) = name_of(n, source) {
                    if !out.contains(&name) {
                        out.push(name);
                    }
                }
            }
        });
    }
    out
}
