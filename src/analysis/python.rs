//! Python extraction.

use tree_sitter::Node;

use super::{
    collect_raises, field_text, has_child_kind, line_of, text, ClassFact, CodeFacts, FunctionFact,
    ParamFact,
};

pub(super) fn extract(root: Node, source: &str, facts: &mut CodeFacts) {
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        top_level(child, source, facts);
    }
}

fn top_level(node: Node, source: &str, facts: &mut CodeFacts) {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                let module = match name.kind() {
                    "aliased_import" => field_text(&name, "name", source),
                    _ => Some(text(&name, source).to_string()),
                };
                facts.imports.extend(module);
            }
        }
        "import_from_statement" => {
            facts.imports.extend(field_text(&node, "module_name", source));
        }
        "function_definition" => facts.functions.push(function(node, source)),
        "class_definition" => {
            if let Some(class) = class(node, source) {
                facts.classes.push(class);
            }
        }
        "decorated_definition" => {
            if let Some(def) = node.child_by_field_name("definition") {
                top_level(def, source, facts);
            }
        }
        _ => {}
    }
}

fn function(node: Node, source: &str) -> FunctionFact {
    let name = field_text(&node, "name", source).unwrap_or_default();
    let mut f = FunctionFact::new(name, line_of(&node));
    f.is_public = !f.name.starts_with('_') || is_dunder(&f.name);
    f.is_async = has_child_kind(&node, "async");
    f.return_type = field_text(&node, "return_type", source);
    if let Some(params) = node.child_by_field_name("parameters") {
        f.params = parameters(params, source);
    }
    f.raises = collect_raises(
        node.child_by_field_name("body"),
        source,
        &["raise_statement"],
        raised_type,
    );
    f
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

fn parameters(node: Node, source: &str) -> Vec<ParamFact> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for p in node.named_children(&mut cursor) {
        let param = match p.kind() {
            "identifier" => ParamFact {
                name: text(&p, source).to_string(),
                type_hint: None,
                has_default: false,
            },
            "typed_parameter" => {
                let mut c = p.walk();
                let name = p
                    .named_children(&mut c)
                    .next()
                    .map(|n| text(&n, source).to_string())
                    .unwrap_or_default();
                ParamFact {
                    has_default: name.starts_with('*'),
                    name,
                    type_hint: field_text(&p, "type", source),
                }
            }
            "default_parameter" | "typed_default_parameter" => ParamFact {
                name: field_text(&p, "name", source).unwrap_or_default(),
                type_hint: field_text(&p, "type", source),
                has_default: true,
            },
            "list_splat_pattern" | "dictionary_splat_pattern" => ParamFact {
                name: text(&p, source).to_string(),
                type_hint: None,
                has_default: true,
            },
            _ => continue,
        };
        out.push(param);
    }
    out
}

/// `raise ValueError("x")` → `ValueError`; bare `raise` → none.
fn raised_type(node: Node, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    let expr = node.named_children(&mut cursor).next()?;
    let name = match expr.kind() {
        "call" => field_text(&expr, "function", source)?,
        "identifier" | "attribute" => text(&expr, source).to_string(),
        _ => return None,
    };
    Some(name)
}

fn class(node: Node, source: &str) -> Option<ClassFact> {
    let name = field_text(&node, "name", source)?;
    let mut class = ClassFact {
        name,
        bases: Vec::new(),
        constructor: None,
        methods: Vec::new(),
        line: line_of(&node),
    };

    if let Some(supers) = node.child_by_field_name("superclasses") {
        let mut cursor = supers.walk();
        for base in supers.named_children(&mut cursor) {
            if base.kind() != "keyword_argument" {
                class.bases.push(text(&base, source).to_string());
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            let (def, decorators) = match member.kind() {
                "function_definition" => (member, String::new()),
                "decorated_definition" => match member.child_by_field_name("definition") {
                    Some(d) if d.kind() == "function_definition" => {
                        (d, text(&member, source).to_string())
                    }
                    _ => continue,
                },
                _ => continue,
            };

            let mut method = function(def, source);
            method.is_static = decorators.contains("@staticmethod");
            let drop_receiver = !method.is_static
                && method
                    .params
                    .first()
                    .is_some_and(|p| p.name == "self" || p.name == "cls");
            if drop_receiver {
                method.params.remove(0);
            }

            if method.name == "__init__" {
                class.constructor = Some(method);
            } else {
                class.methods.push(method);
            }
        }
    }

    Some(class)
}

#[cfg(test)]
mod tests {
    use crate::analysis::analyze_source;
    use crate::lang::Lang;
    use std::path::Path;

    const SOURCE: &str = r#"
import os
from typing import Optional

def parse_port(value: str, default: int = 8080) -> int:
    if not value:
        raise ValueError("empty")
    return int(value)

async def fetch(url, *args, **kwargs):
    return None

def _helper():
    pass

class Cache(Base):
    def __init__(self, capacity: int):
        self.capacity = capacity

    def get(self, key):
        if key is None:
            raise KeyError(key)
        return None

    @staticmethod
    def build(size):
        return Cache(size)
"#;

    #[test]
    fn test_extracts_imports_and_functions() {
        let facts = analyze_source(Path::new("pkg/util.py"), SOURCE, Lang::Python).unwrap();
        assert_eq!(facts.module_name, "util");
        assert_eq!(facts.imports, vec!["os", "typing"]);

        let names: Vec<_> = facts.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["parse_port", "fetch", "_helper"]);

        let parse = facts.function("parse_port").unwrap();
        assert_eq!(parse.params.len(), 2);
        assert_eq!(parse.params[0].name, "value");
        assert_eq!(parse.params[0].type_hint.as_deref(), Some("str"));
        assert!(!parse.params[0].has_default);
        assert_eq!(parse.params[1].name, "default");
        assert!(parse.params[1].has_default);
        assert_eq!(parse.return_type.as_deref(), Some("int"));
        assert_eq!(parse.raises, vec!["ValueError"]);
        assert!(!parse.is_async);

        let fetch = facts.function("fetch").unwrap();
        assert!(fetch.is_async);
        assert_eq!(fetch.params.len(), 3);

        assert!(!facts.function("_helper").unwrap().is_public);
    }

    #[test]
    fn test_extracts_class_members() {
        let facts = analyze_source(Path::new("cache.py"), SOURCE, Lang::Python).unwrap();
        let cache = facts.class("Cache").unwrap();
        assert_eq!(cache.bases, vec!["Base"]);

        let ctor = cache.constructor.as_ref().unwrap();
        assert_eq!(ctor.params.len(), 1);
        assert_eq!(ctor.params[0].name, "capacity");

        let get = &cache.methods[0];
        assert_eq!(get.name, "get");
        assert_eq!(get.params.len(), 1);
        assert_eq!(get.raises, vec!["KeyError"]);

        let build = &cache.methods[1];
        assert!(build.is_static);
        assert_eq!(build.params[0].name, "size");
    }
}
