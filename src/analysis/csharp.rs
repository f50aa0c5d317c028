//! C# extraction.

use tree_sitter::Node;

use super::{collect_raises, field_text, line_of, text, ClassFact, CodeFacts, FunctionFact, ParamFact};

pub(super) fn extract(root: Node, source: &str, facts: &mut CodeFacts) {
    members(root, source, facts);
}

fn members(node: Node, source: &str, facts: &mut CodeFacts) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "using_directive" => {
                let using = text(&child, source)
                    .trim()
                    .trim_start_matches("global ")
                    .trim_start_matches("using")
                    .trim_end_matches(';')
                    .trim()
                    .to_string();
                if !using.is_empty() {
                    facts.imports.push(using);
                }
            }
            "namespace_declaration" => {
                if let Some(name) = field_text(&child, "name", source) {
                    facts.module_name = name.clone();
                    facts.namespace = Some(name);
                }
                if let Some(body) = child.child_by_field_name("body") {
                    members(body, source, facts);
                }
            }
            "file_scoped_namespace_declaration" => {
                if let Some(name) = field_text(&child, "name", source) {
                    facts.module_name = name.clone();
                    facts.namespace = Some(name);
                }
                members(child, source, facts);
            }
            "class_declaration" | "struct_declaration" | "record_declaration" => {
                if let Some(class) = class(child, source) {
                    facts.classes.push(class);
                }
            }
            _ => {}
        }
    }
}

fn modifiers(node: &Node, source: &str) -> Vec<String> {
    let mut cursor = node.walk();
    let mods = node
        .children(&mut cursor)
        .filter(|c| c.kind() == "modifier")
        .map(|c| text(&c, source).to_string())
        .collect();
    mods
}

fn method(node: Node, source: &str) -> FunctionFact {
    let name = field_text(&node, "name", source).unwrap_or_default();
    let mut f = FunctionFact::new(name, line_of(&node));
    let mods = modifiers(&node, source);
    f.is_async = mods.iter().any(|m| m == "async");
    f.is_static = mods.iter().any(|m| m == "static");
    f.is_public = mods.iter().any(|m| m == "public" || m == "internal");
    f.return_type =
        field_text(&node, "returns", source).or_else(|| field_text(&node, "type", source));
    if let Some(params) = node.child_by_field_name("parameters") {
        f.params = parameters(params, source);
    }
    f.raises = collect_raises(
        node.child_by_field_name("body"),
        source,
        &["throw_statement", "throw_expression"],
        thrown_type,
    );
    f
}

fn parameters(node: Node, source: &str) -> Vec<ParamFact> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for p in node.named_children(&mut cursor) {
        if p.kind() != "parameter" {
            continue;
        }
        out.push(ParamFact {
            name: field_text(&p, "name", source).unwrap_or_default(),
            type_hint: field_text(&p, "type", source),
            has_default: text(&p, source).contains('='),
        });
    }
    out
}

/// `throw new ArgumentException(...)` → `ArgumentException`.
fn thrown_type(node: Node, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    let expr = node.named_children(&mut cursor).next()?;
    match expr.kind() {
        "object_creation_expression" => field_text(&expr, "type", source),
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
        if child.kind() == "base_list" {
            let mut bc = child.walk();
            for base in child.named_children(&mut bc) {
                class.bases.push(text(&base, source).to_string());
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            match member.kind() {
                "method_declaration" => class.methods.push(method(member, source)),
                "constructor_declaration" => {
                    let ctor = method(member, source);
                    let more_params = class
                        .constructor
                        .as_ref()
                        .map_or(true, |c| ctor.params.len() > c.params.len());
                    if ctor.is_public && more_params {
                        class.constructor = Some(ctor);
                    }
                }
                _ => {}
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

    #[test]
    fn test_csharp_class_members() {
        let source = r#"
using System;
using System.Threading.Tasks;

namespace Shop.Billing
{
    public class InvoiceService : IInvoiceService
    {
        public InvoiceService(IRepository repo, int retries = 3)
        {
        }

        public decimal Total(decimal net, decimal rate)
        {
            if (rate < 0) throw new ArgumentOutOfRangeException(nameof(rate));
            return net * (1 + rate);
        }

        public async Task<Invoice> LoadAsync(string id)
        {
            return await repo.Find(id);
        }

        private void Audit() { }
    }
}
"#;
        let facts = analyze_source(Path::new("InvoiceService.cs"), source, Lang::CSharp).unwrap();
        assert_eq!(facts.module_name, "Shop.Billing");
        assert_eq!(facts.imports, vec!["System", "System.Threading.Tasks"]);

        let svc = facts.class("InvoiceService").unwrap();
        let ctor = svc.constructor.as_ref().unwrap();
        assert_eq!(ctor.params.len(), 2);
        assert!(ctor.params[1].has_default);

        let total = svc.methods.iter().find(|m| m.name == "Total").unwrap();
        assert!(total.is_public);
        assert_eq!(total.params[0].name, "net");
        assert_eq!(total.params[0].type_hint.as_deref(), Some("decimal"));
        assert_eq!(total.raises, vec!["ArgumentOutOfRangeException"]);

        let load = svc.methods.iter().find(|m| m.name == "LoadAsync").unwrap();
        assert!(load.is_async);

        let audit = svc.methods.iter().find(|m| m.name == "Audit").unwrap();
        assert!(!audit.is_public);
    }
}
