//! JavaScript and TypeScript extraction.

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
            if let Some(src) = field_text(&node, "source", source) {
                facts.imports.push(unquote(&src));
            }
        }
        "export_statement" => {
            if let Some(decl) = node.child_by_field_name("declaration") {
                top_level(decl, source, facts);
            }
        }
        "function_declaration" | "generator_function_declaration" => {
            let name = field_text(&node, "name", source).unwrap_or_default();
            facts.functions.push(function(node, name, source));
        }
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            for decl in node.named_children(&mut cursor) {
                if decl.kind() != "variable_declarator" {
                    continue;
                }
                let Some(value) = decl.child_by_field_name("value") else {
                    continue;
                };
                if matches!(
                    value.kind(),
                    "arrow_function" | "function_expression" | "function"
                ) {
                    let name = field_text(&decl, "name", source).unwrap_or_default();
                    let mut f = function(value, name, source);
                    f.line = line_of(&decl);
                    facts.functions.push(f);
                }
            }
        }
        "class_declaration" | "abstract_class_declaration" => {
            if let Some(class) = class(node, source) {
                facts.classes.push(class);
            }
        }
        _ => {}
    }
}

fn unquote(s: &str) -> String {
    s.trim_matches(|c: char| c == '"' || c == '\'' || c == '`').to_string()
}

/// Strip the leading `:` of a TypeScript `type_annotation`.
fn annotation(node: &Node, field: &str, source: &str) -> Option<String> {
    field_text(node, field, source)
        .map(|t| t.trim_start_matches(':').trim().to_string())
        .filter(|t| !t.is_empty())
}

fn function(node: Node, name: String, source: &str) -> FunctionFact {
    let mut f = FunctionFact::new(name, line_of(&node));
    f.is_async = has_child_kind(&node, "async");
    f.return_type = annotation(&node, "return_type", source);

    if let Some(params) = node.child_by_field_name("parameters") {
        f.params = parameters(params, source);
    } else if let Some(single) = node.child_by_field_name("parameter") {
        // `x => x + 1`
        f.params.push(ParamFact {
            name: text(&single, source).to_string(),
            type_hint: None,
            has_default: false,
        });
    }

    f.raises = collect_raises(
        node.child_by_field_name("body"),
        source,
        &["throw_statement"],
        thrown_type,
    );
    f
}

fn parameters(node: Node, source: &str) -> Vec<ParamFact> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for p in node.named_children(&mut cursor) {
        let param = match p.kind() {
            "identifier" | "object_pattern" | "array_pattern" => ParamFact {
                name: text(&p, source).to_string(),
                type_hint: None,
                has_default: false,
            },
            "assignment_pattern" => ParamFact {
                name: field_text(&p, "left", source).unwrap_or_default(),
                type_hint: None,
                has_default: true,
            },
            "rest_pattern" => ParamFact {
                name: text(&p, source).to_string(),
                type_hint: None,
                has_default: true,
            },
            "required_parameter" | "optional_parameter" => ParamFact {
                name: field_text(&p, "pattern", source).unwrap_or_default(),
                type_hint: annotation(&p, "type", source),
                has_default: p.kind() == "optional_parameter"
                    || p.child_by_field_name("value").is_some(),
            },
            _ => continue,
        };
        out.push(param);
    }
    out
}

/// `throw new TypeError("x")` → `TypeError`.
fn thrown_type(node: Node, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    let expr = node.named_children(&mut cursor).next()?;
    match expr.kind() {
        "new_expression" => field_text(&expr, "constructor", source),
        "call_expression" => field_text(&expr, "function", source),
        "identifier" => Some(text(&expr, source).to_string()),
        _ => None,
    }
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

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "class_heritage" {
            continue;
        }
        let mut hc = child.walk();
        for clause in child.named_children(&mut hc) {
            match clause.kind() {
                "extends_clause" => class.bases.extend(field_text(&clause, "value", source)),
                "implements_clause" => {}
                _ => class.bases.push(text(&clause, source).to_string()),
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            if member.kind() != "method_definition" {
                continue;
            }
            let name = field_text(&member, "name", source).unwrap_or_default();
            let mut method = function(member, name, source);
            method.is_static = has_child_kind(&member, "static");
            method.is_public = !method.name.starts_with('#') && !is_private_ts(&member, source);

            if method.name == "constructor" {
                class.constructor = Some(method);
            } else {
                class.methods.push(method);
            }
        }
    }

    Some(class)
}

fn is_private_ts(member: &Node, source: &str) -> bool {
    let mut cursor = member.walk();
    let private = member
        .named_children(&mut cursor)
        .any(|c| c.kind() == "accessibility_modifier" && text(&c, source) != "public");
    private
}

#[cfg(test)]
mod tests {
    use crate::analysis::analyze_source;
    use crate::lang::Lang;
    use std::path::Path;

    #[test]
    fn test_javascript_functions_and_classes() {
        let source = r#"
import fs from 'fs';
const path = require("path");

export function slugify(title, sep = "-") {
  if (typeof title !== "string") {
    throw new TypeError("title must be a string");
  }
  return title.toLowerCase();
}

export const load = async (file) => {
  return fs.promises.readFile(file);
};

class Queue extends Base {
  constructor(limit) {
    super();
    this.limit = limit;
  }

  push(item) {
    if (this.items.length >= this.limit) throw new RangeError("full");
  }

  static create() {
    return new Queue(10);
  }
}
"#;
        let facts = analyze_source(Path::new("src/util.js"), source, Lang::JavaScript).unwrap();
        assert_eq!(facts.imports, vec!["fs"]);

        let slugify = facts.function("slugify").unwrap();
        assert_eq!(slugify.params.len(), 2);
        assert_eq!(slugify.params[1].name, "sep");
        assert!(slugify.params[1].has_default);
        assert_eq!(slugify.raises, vec!["TypeError"]);

        let load = facts.function("load").unwrap();
        assert!(load.is_async);
        assert_eq!(load.params[0].name, "file");

        let queue = facts.class("Queue").unwrap();
        assert_eq!(queue.bases, vec!["Base"]);
        assert_eq!(queue.constructor.as_ref().unwrap().params[0].name, "limit");
        assert_eq!(queue.methods.len(), 2);
        assert_eq!(queue.methods[0].raises, vec!["RangeError"]);
        assert!(queue.methods[1].is_static);
    }

    #[test]
    fn test_typescript_types() {
        let source = r#"
import { Injectable } from "./di";

export async function fetchUser(id: number, verbose?: boolean): Promise<User> {
  return api.get(id);
}

export class UserService {
  constructor(private readonly repo: Repo) {}

  private cache(): void {}

  find(id: string = "x"): User | undefined {
    return undefined;
  }
}
"#;
        let facts = analyze_source(Path::new("user.ts"), source, Lang::TypeScript).unwrap();
        assert_eq!(facts.imports, vec!["./di"]);

        let fetch = facts.function("fetchUser").unwrap();
        assert!(fetch.is_async);
        assert_eq!(fetch.return_type.as_deref(), Some("Promise<User>"));
        assert_eq!(fetch.params[0].type_hint.as_deref(), Some("number"));
        assert!(!fetch.params[0].has_default);
        assert!(fetch.params[1].has_default);

        let svc = facts.class("UserService").unwrap();
        assert!(svc.constructor.is_some());
        let cache = svc.methods.iter().find(|m| m.name == "cache").unwrap();
        assert!(!cache.is_public);
        let find = svc.methods.iter().find(|m| m.name == "find").unwrap();
        assert!(find.is_public);
        assert!(find.params[0].has_default);
        assert_eq!(find.params[0].type_hint.as_deref(), Some("string"));
    }
}
