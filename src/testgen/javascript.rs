//! Jest and Mocha templates for JavaScript and TypeScript.

use std::path::{Path, PathBuf};

use super::{sentence, Arg, CaseKind, ClassPlan, Sample, Subject, TemplateProducer, TestCase, TestFramework, TestPlan};
use crate::lang::Lang;

pub struct Jest;
pub struct Mocha;

#[derive(Clone, Copy, PartialEq)]
enum Flavor {
    Jest,
    Mocha,
}

impl TemplateProducer for Jest {
    fn framework(&self) -> TestFramework {
        TestFramework::Jest
    }

    /// Jest tests sit next to the module: `src/util.js` → `src/util.test.js`.
    fn suggested_path(&self, plan: &TestPlan) -> PathBuf {
        plan.source_dir()
            .join(format!("{}.test.{}", plan.source_stem(), extension(plan)))
    }

    fn render(&self, plan: &TestPlan) -> String {
        render(plan, Flavor::Jest, &format!("./{}", plan.source_stem()))
    }
}

impl TemplateProducer for Mocha {
    fn framework(&self) -> TestFramework {
        TestFramework::Mocha
    }

    fn suggested_path(&self, plan: &TestPlan) -> PathBuf {
        PathBuf::from("test").join(format!("{}.spec.{}", plan.source_stem(), extension(plan)))
    }

    fn render(&self, plan: &TestPlan) -> String {
        let path = Path::new(&plan.source_path).with_extension("");
        let module = if path.is_absolute() {
            path.to_string_lossy().to_string()
        } else {
            format!("../{}", path.to_string_lossy().trim_start_matches("./"))
        };
        render(plan, Flavor::Mocha, &module)
    }
}

fn extension(plan: &TestPlan) -> String {
    Path::new(&plan.source_path)
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| match plan.language {
            Lang::TypeScript => "ts".to_string(),
            _ => "js".to_string(),
        })
}

/// ES module syntax for TypeScript and for sources that use `import`.
fn is_esm(plan: &TestPlan) -> bool {
    plan.language == Lang::TypeScript || !plan.source_imports.is_empty()
}

fn render(plan: &TestPlan, flavor: Flavor, module: &str) -> String {
    let ts = plan.language == Lang::TypeScript;
    let esm = is_esm(plan);
    let mut out = format!(
        "// Tests for {}. Generated by coderag; replace placeholder inputs and assertions.\n",
        plan.source_path
    );

    let mut requires: Vec<(String, &str)> = Vec::new();
    if flavor == Flavor::Mocha {
        requires.push(("{ expect }".to_string(), "chai"));
        if plan.uses_mocks() {
            requires.push(("sinon".to_string(), "sinon"));
        }
    }
    let names = plan.exported_names();
    if !names.is_empty() {
        requires.push((format!("{{ {} }}", names.join(", ")), module));
    }
    for (binding, from) in &requires {
        if esm {
            out.push_str(&format!("import {} from '{}';\n", binding, from));
        } else {
            out.push_str(&format!("const {} = require('{}');\n", binding, from));
        }
    }

    let ctx = Ctx { flavor, ts };

    for subject in &plan.functions {
        out.push_str(&format!("\ndescribe('{}', () => {{\n", subject.name));
        for case in &subject.cases {
            ctx.case(&mut out, subject, case, None, "  ");
        }
        out.push_str("});\n");
    }

    for class in &plan.classes {
        out.push_str(&format!("\ndescribe('{}', () => {{\n", class.name));
        if ts {
            out.push_str(&format!("  let sut: {};\n", class.name));
        } else {
            out.push_str("  let sut;\n");
        }
        out.push_str(&format!(
            "\n  beforeEach(() => {{\n    sut = {};\n  }});\n",
            ctx.construct(class)
        ));
        out.push_str("\n  it('can be constructed', () => {\n");
        match flavor {
            Flavor::Jest => out.push_str(&format!("    expect(sut).toBeInstanceOf({});\n", class.name)),
            Flavor::Mocha => out.push_str(&format!("    expect(sut).to.be.instanceOf({});\n", class.name)),
        }
        out.push_str("  });\n");

        for method in &class.methods {
            out.push_str(&format!("\n  describe('{}', () => {{\n", method.name));
            for case in &method.cases {
                ctx.case(&mut out, method, case, Some(class), "    ");
            }
            out.push_str("  });\n");
        }
        out.push_str("});\n");
    }

    out
}

struct Ctx {
    flavor: Flavor,
    ts: bool,
}

impl Ctx {
    fn case(
        &self,
        out: &mut String,
        subject: &Subject,
        case: &TestCase,
        class: Option<&ClassPlan>,
        indent: &str,
    ) {
        let it = if case.kind == CaseKind::Integration {
            "it.skip"
        } else {
            "it"
        };
        let asynchronous = if subject.is_async { "async " } else { "" };
        out.push_str(&format!(
            "\n{}{}('{}', {}() => {{\n",
            indent,
            it,
            sentence(&case.name),
            asynchronous
        ));

        let args: Vec<String> = case.args.iter().map(|a| self.literal(a)).collect();
        let target = match class {
            Some(c) if subject.is_static => format!("{}.{}", c.name, subject.name),
            Some(_) => format!("sut.{}", subject.name),
            None => subject.name.clone(),
        };
        let call = format!("{}({})", target, args.join(", "));
        let inner = format!("{}  ", indent);

        if let Some(error) = &case.expected_error {
            let lines = match (self.flavor, subject.is_async) {
                (Flavor::Jest, false) => vec![format!("expect(() => {}).toThrow({});", call, error)],
                (Flavor::Jest, true) => {
                    vec![format!("await expect({}).rejects.toThrow({});", call, error)]
                }
                (Flavor::Mocha, false) => {
                    vec![format!("expect(() => {}).to.throw({});", call, error)]
                }
                (Flavor::Mocha, true) => vec![
                    "let error;".to_string(),
                    format!("try {{\n{}  await {};\n{}}} catch (err) {{\n{}  error = err;\n{}}}", inner, call, inner, inner, inner),
                    format!("expect(error).to.be.instanceOf({});", error),
                ],
            };
            for line in lines {
                out.push_str(&format!("{}{}\n", inner, line));
            }
        } else {
            let call = if subject.is_async {
                format!("await {}", call)
            } else {
                call
            };
            if case.kind == CaseKind::EdgeCase {
                out.push_str(&format!(
                    "{}// Boundary input: adjust the expectation if this should throw.\n",
                    inner
                ));
            }
            if subject.returns_value {
                out.push_str(&format!("{}const result = {};\n", inner, call));
                match self.flavor {
                    Flavor::Jest => out.push_str(&format!("{}expect(result).toBeDefined();\n", inner)),
                    Flavor::Mocha => {
                        out.push_str(&format!("{}expect(result).to.not.equal(undefined);\n", inner))
                    }
                }
            } else {
                out.push_str(&format!("{}{};\n", inner, call));
            }
        }
        out.push_str(&format!("{}}});\n", indent));
    }

    fn construct(&self, class: &ClassPlan) -> String {
        let args: Vec<String> = class
            .constructor_args
            .iter()
            .map(|a| self.literal(a))
            .collect();
        format!("new {}({})", class.name, args.join(", "))
    }

    fn literal(&self, arg: &Arg) -> String {
        let any = if self.ts { " as any" } else { "" };
        if arg.sample == Sample::Mock {
            let double = match self.flavor {
                Flavor::Jest => "jest.fn()",
                Flavor::Mocha => "sinon.stub()",
            };
            return format!("{}{}", double, any);
        }
        let boundary = arg.sample == Sample::Boundary;
        let hint = arg.type_hint.as_deref().unwrap_or("").trim();
        let value = if hint.ends_with("[]") || hint.starts_with("Array<") {
            "[]"
        } else {
            match hint {
                "number" | "bigint" => if boundary { "0" } else { "1" },
                "string" => if boundary { "''" } else { "'example'" },
                "boolean" => if boundary { "false" } else { "true" },
                "object" => "{}",
                "" => if boundary { "null" } else { "'example'" },
                _ => return format!("{}{}", if boundary { "null" } else { "{}" }, any),
            }
        };
        value.to_string()
    }
}
