//! C++ extraction.

use tree_sitter::Node;

use super::{collect_raises, field_text, line_of, text, ClassFact, CodeFacts, FunctionFact, ParamFact};

pub(super) fn extract(root: Node, source: &str, facts: &mut CodeFacts) {
    declarations(root, source, facts);
}

fn declarations(node: Node, source: &str, facts: &mut CodeFacts) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "preproc_include" => {
                if let Some(path) = field_text(&child, "path", source) {
                    facts
                        .imports
                        .push(path.trim_matches(|c: char| c == '"' || c == '<' || c == '>').to_string());
                }
            }
            "namespace_definition" => {
                if let Some(name) = field_text(&child, "name", source) {
                    facts.module_name = name.clone();
                    facts.namespace = Some(name);
                }
                if let Some(body) = child.child_by_field_name("body") {
                    declarations(body, source, facts);
                }
            }
            "function_definition" => {
                if let Some(f) = function(child, source) {
                    attach_or_push(f, facts);
                }
            }
            "class_specifier" | "struct_specifier" => {
                if let Some(class) = class(child, source) {
                    facts.classes.push(class);
                }
            }
            "template_declaration" | "declaration" | "linkage_specification" => {
                declarations(child, source, facts);
            }
            _ => {}
        }
    }
}

/// Out-of-line `Class::method` definitions are merged into their class.
fn attach_or_push(mut f: FunctionFact, facts: &mut CodeFacts) {
    let split = f.name.rsplit_once("::").map(|(scope, name)| {
        let scope = scope.rsplit("::").next().unwrap_or(scope);
        (scope.to_string(), name.to_string())
    });
    if let Some((scope, name)) = split {
        if let Some(class) = facts.classes.iter_mut().find(|c| c.name == scope) {
            let params = param_types(&f);
            if let Some(m) = class
                .methods
                .iter_mut()
                .find(|m| m.name == name && param_types(m) == params)
            {
                m.raises = f.raises;
                return;
            }
            f.name = name;
            class.methods.push(f);
            return;
        }
    }
    facts.functions.push(f);
}

fn param_types(f: &FunctionFact) -> Vec<Option<&str>> {
    f.params.iter().map(|p| p.type_hint.as_deref()).collect()
}

/// The declarator wrapped by `node`. Reference declarators carry theirs
/// as an unnamed child rather than a `declarator` field.
fn inner_declarator<'t>(node: Node<'t>) -> Option<Node<'t>> {
    if let Some(inner) = node.child_by_field_name("declarator") {
        return Some(inner);
    }
    if node.kind() == "reference_declarator" {
        return node.named_child(0);
    }
    None
}

/// Descend nested declarators to the `function_declarator`.
fn function_declarator<'t>(node: Node<'t>) -> Option<Node<'t>> {
    let mut current = node;
    loop {
        if current.kind() == "function_declarator" {
            return Some(current);
        }
        current = inner_declarator(current)?;
    }
}

/// Innermost declarator name (`*p`, `&ref`, `arr[]` → the identifier).
fn declarator_name(node: Node, source: &str) -> String {
    let mut current = node;
    while let Some(inner) = inner_declarator(current) {
        current = inner;
    }
    text(&current, source).to_string()
}

fn function(node: Node, source: &str) -> Option<FunctionFact> {
    let declarator = node
        .child_by_field_name("declarator")
        .and_then(function_declarator)?;
    let name = field_text(&declarator, "declarator", source)?;
    let mut f = FunctionFact::new(name, line_of(&node));

    if let Some(ret) = field_text(&node, "type", source) {
        // Pointer/reference markers live on the declarator.
        let outer = node
            .child_by_field_name("declarator")
            .map(|d| d.kind())
            .unwrap_or("");
        let suffix = match outer {
            "pointer_declarator" => "*",
            "reference_declarator" => "&",
            _ => "",
        };
        f.return_type = Some(format!("{}{}", ret, suffix));
    }
    if let Some(params) = declarator.child_by_field_name("parameters") {
        f.params = parameters(params, source);
    }
    f.raises = collect_raises(
        node.child_by_field_name("body"),
        source,
        &["throw_statement"],
        thrown_type,
    );
    Some(f)
}

fn parameters(node: Node, source: &str) -> Vec<ParamFact> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for (i, p) in node.named_children(&mut cursor).enumerate() {
        let has_default = match p.kind() {
            "parameter_declaration" => false,
            "optional_parameter_declaration" => true,
            _ => continue,
        };
        let base_type = field_text(&p, "type", source).unwrap_or_default();
        let Some(decl) = p.child_by_field_name("declarator") else {
            if base_type != "void" {
                out.push(ParamFact {
                    name: format!("arg{}", i),
                    type_hint: Some(base_type),
                    has_default,
                });
            }
            continue;
        };
        let name = declarator_name(decl, source);
        let decl_text = text(&decl, source);
        let marker: String = decl_text
            .chars()
            .take_while(|c| matches!(c, '*' | '&' | ' '))
            .filter(|c| !c.is_whitespace())
            .collect();
        let type_prefix = if let Some(q) = p.child(0).filter(|c| c.kind() == "type_qualifier") {
            format!("{} ", text(&q, source))
        } else {
            String::new()
        };
        out.push(ParamFact {
            name,
            type_hint: Some(format!("{}{}{}", type_prefix, base_type, marker)),
            has_default,
        });
    }
    out
}

/// `throw std::invalid_argument("x")` → `std::invalid_argument`.
fn thrown_type(node: Node, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    let expr = node.named_children(&mut cursor).next()?;
    match expr.kind() {
        "call_expression" => field_text(&expr, "function", source),
        "compound_literal_expression" => field_text(&expr, "type", source),
        "identifier" | "qualified_identifier" => Some(text(&expr, source).to_string()),
        _ => None,
    }
}

fn class(node: Node, source: &str) -> Option<ClassFact> {
    let body = node.child_by_field_name("body")?;
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
        if child.kind() == "base_class_clause" {
            let mut bc = child.walk();
            for base in child.named_children(&mut bc) {
                if matches!(
                    base.kind(),
                    "type_identifier" | "qualified_identifier" | "template_type"
                ) {
                    class.bases.push(text(&base, source).to_string());
                }
            }
        }
    }

    let mut public = node.kind() == "struct_specifier";
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        let f = match member.kind() {
            "access_specifier" => {
                public = text(&member, source).trim_end_matches(':').trim() == "public";
                continue;
            }
            "function_definition" => function(member, source),
            "field_declaration" | "declaration" => declared_method(member, source),
            _ => None,
        };
        let Some(mut f) = f else {
            continue;
        };
        if f.name.starts_with('~') {
            continue;
        }
        f.is_public = public;
        f.is_static = text(&member, source).trim_start().starts_with("static ");
        if f.name == class.name {
            f.return_type = None;
            if public {
                class.constructor = Some(f);
            }
        } else {
            class.methods.push(f);
        }
    }

    Some(class)
}

/// `int size() const;` inside a class body.
fn declared_method(node: Node, source: &str) -> Option<FunctionFact> {
    let declarator = node
        .child_by_field_name("declarator")
        .and_then(function_declarator)?;
    let name = field_text(&declarator, "declarator", source)?;
    let mut f = FunctionFact::new(name, line_of(&node));
    f.return_type = field_text(&node, "type", source);
    if let Some(params) = declarator.child_by_field_name("parameters") {
        f.params = parameters(params, source);
    }
    Some(f)
}
