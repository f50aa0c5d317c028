//! GoogleTest and Catch2 templates.

use std::path::{Path, PathBuf};

use super::{pascal_case, sentence, snake_case, Arg, CaseKind, ClassPlan, Sample, Subject, TemplateProducer, TestCase, TestFramework, TestPlan};

pub struct GoogleTest;
pub struct Catch2;

impl TemplateProducer for GoogleTest {
    fn framework(&self) -> TestFramework {
        TestFramework::Gtest
    }

    fn suggested_path(&self, plan: &TestPlan) -> PathBuf {
        PathBuf::from("tests").join(format!("{}_test.cpp", plan.source_stem()))
    }

    fn render(&self, plan: &TestPlan) -> String {
        let mut out = preamble(plan, "<gtest/gtest.h>");

        for subject in &plan.functions {
            let suite = pascal_case(&subject.label);
            for case in &subject.cases {
                out.push('\n');
                let name = gtest_name(&pascal_case(&case.name), case.kind);
                out.push_str(&format!("TEST({}Test, {}) {{\n", suite, name));
                let call = call(subject, case, None);
                gtest_body(&mut out, case, &call);
                out.push_str("}\n");
            }
        }

        for class in &plan.classes {
            let suite = format!("{}Test", class.name);
            out.push_str(&format!(
                "\nTEST({}, CanBeConstructed) {{\n    EXPECT_NO_THROW({{ {} }});\n}}\n",
                suite,
                declare(class)
            ));
            for method in &class.methods {
                for case in &method.cases {
                    out.push('\n');
                    let name = gtest_name(
                        &format!("{}{}", pascal_case(&method.label), pascal_case(&case.name)),
                        case.kind,
                    );
                    out.push_str(&format!("TEST({}, {}) {{\n", suite, name));
                    if !method.is_static {
                        out.push_str(&format!("    {}\n", declare(class)));
                    }
                    let call = call(method, case, Some(class));
                    gtest_body(&mut out, case, &call);
                    out.push_str("}\n");
                }
            }
        }

        out
    }
}

/// Integration tests are compiled but disabled until wired up.
fn gtest_name(name: &str, kind: CaseKind) -> String {
    if kind == CaseKind::Integration {
        format!("DISABLED_{}", name)
    } else {
        name.to_string()
    }
}

fn gtest_body(out: &mut String, case: &TestCase, call: &str) {
    match &case.expected_error {
        Some(error) => out.push_str(&format!("    EXPECT_THROW({}, {});\n", call, error)),
        None => {
            if case.kind == CaseKind::EdgeCase {
                out.push_str("    // Boundary input: adjust the expectation if this should throw.\n");
            }
            out.push_str(&format!("    EXPECT_NO_THROW({});\n", call));
        }
    }
}

impl TemplateProducer for Catch2 {
    fn framework(&self) -> TestFramework {
        TestFramework::Catch2
    }

    fn suggested_path(&self, plan: &TestPlan) -> PathBuf {
        PathBuf::from("tests").join(format!("test_{}.cpp", plan.source_stem()))
    }

    fn render(&self, plan: &TestPlan) -> String {
        let mut out = preamble(plan, "<catch2/catch_test_macros.hpp>");

        for subject in &plan.functions {
            for case in &subject.cases {
                out.push('\n');
                out.push_str(&format!(
                    "TEST_CASE(\"{} {}\", \"{}\") {{\n",
                    subject.label,
                    sentence(&case.name),
                    catch2_tags(&subject.name, case.kind)
                ));
                let call = call(subject, case, None);
                catch2_body(&mut out, case, &call, "    ");
                out.push_str("}\n");
            }
        }

        for class in &plan.classes {
            let tag = format!("[{}]", class.name);
            let (integration, sections): (Vec<_>, Vec<_>) = class
                .methods
                .iter()
                .flat_map(|m| m.cases.iter().map(move |c| (m, c)))
                .partition(|(_, c)| c.kind == CaseKind::Integration);

            out.push_str(&format!(
                "\nTEST_CASE(\"{}\", \"{}\") {{\n    {}\n",
                class.name,
                tag,
                declare(class)
            ));
            out.push_str("\n    SECTION(\"can be constructed\") {\n        SUCCEED();\n    }\n");
            for (method, case) in sections {
                out.push_str(&format!(
                    "\n    SECTION(\"{} {}\") {{\n",
                    method.label,
                    sentence(&case.name)
                ));
                let call = call(method, case, Some(class));
                catch2_body(&mut out, case, &call, "        ");
                out.push_str("    }\n");
            }
            out.push_str("}\n");

            for (method, case) in integration {
                out.push_str(&format!(
                    "\nTEST_CASE(\"{}::{} integration\", \"{}[.integration]\") {{\n    {}\n",
                    class.name,
                    method.label,
                    tag,
                    declare(class)
                ));
                let call = call(method, case, Some(class));
                catch2_body(&mut out, case, &call, "    ");
                out.push_str("}\n");
            }
        }

        out
    }
}

/// Hidden tags (`[.integration]`) keep integration tests out of default runs.
fn catch2_tags(name: &str, kind: CaseKind) -> String {
    let tag = format!("[{}]", snake_case(name));
    if kind == CaseKind::Integration {
        format!("{}[.integration]", tag)
    } else {
        tag
    }
}

fn catch2_body(out: &mut String, case: &TestCase, call: &str, indent: &str) {
    match &case.expected_error {
        Some(error) => out.push_str(&format!("{}REQUIRE_THROWS_AS({}, {});\n", indent, call, error)),
        None => {
            if case.kind == CaseKind::EdgeCase {
                out.push_str(&format!(
                    "{}// Boundary input: adjust the expectation if this should throw.\n",
                    indent
                ));
            }
            out.push_str(&format!("{}REQUIRE_NOTHROW({});\n", indent, call));
        }
    }
}

// ============ Shared pieces ============

fn preamble(plan: &TestPlan, framework_header: &str) -> String {
    let mut out = format!(
        "// Tests for {}. Generated by coderag; replace placeholder inputs and assertions.\n",
        plan.source_path
    );
    out.push_str(&format!("#include {}\n", framework_header));
    if plan.raises_anything() {
        out.push_str("#include <stdexcept>\n");
    }
    out.push_str(&format!("\n#include \"{}\"\n", header_for(plan)));
    if let Some(ns) = &plan.namespace {
        out.push_str(&format!("\nusing namespace {};\n", ns));
    }
    out
}

/// Headers are included as-is; for an implementation file the sibling
/// `.hpp` is assumed.
fn header_for(plan: &TestPlan) -> String {
    let path = Path::new(&plan.source_path);
    let is_header = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e, "h" | "hpp" | "hxx" | "hh"));
    if is_header {
        path.file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default()
    } else {
        format!("{}.hpp", plan.source_stem())
    }
}

/// `Stack sut(1);`, or `Stack sut;` when the constructor takes nothing.
fn declare(class: &ClassPlan) -> String {
    if class.constructor_args.is_empty() {
        format!("{} sut;", class.name)
    } else {
        let args: Vec<String> = class.constructor_args.iter().map(literal).collect();
        format!("{} sut({});", class.name, args.join(", "))
    }
}

fn call(subject: &Subject, case: &TestCase, class: Option<&ClassPlan>) -> String {
    let args: Vec<String> = case.args.iter().map(literal).collect();
    let target = match class {
        Some(c) if subject.is_static => format!("{}::{}", c.name, subject.name),
        Some(_) => format!("sut.{}", subject.name),
        None => subject.name.clone(),
    };
    format!("{}({})", target, args.join(", "))
}

fn literal(arg: &Arg) -> String {
    let boundary = arg.sample == Sample::Boundary;
    let hint = arg.type_hint.as_deref().unwrap_or("").trim();
    if hint.ends_with('*') {
        if hint.contains("char") && !boundary {
            return "\"example\"".to_string();
        }
        return "nullptr".to_string();
    }
    let base = hint
        .trim_start_matches("const ")
        .trim_end_matches('&')
        .trim();
    let value = match base {
        "int" | "long" | "short" | "unsigned" | "unsigned int" | "long long" | "size_t"
        | "std::size_t" | "int32_t" | "int64_t" | "uint32_t" | "uint64_t" | "std::int32_t"
        | "std::int64_t" | "std::uint32_t" | "std::uint64_t" => {
            if boundary { "0" } else { "1" }
        }
        "double" | "float" => if boundary { "0.0" } else { "1.0" },
        "bool" => if boundary { "false" } else { "true" },
        "char" => if boundary { "'\\0'" } else { "'a'" },
        "std::string" | "string" | "std::string_view" => {
            if boundary { "\"\"" } else { "\"example\"" }
        }
        _ => "{}",
    };
    value.to_string()
}

#[cfg(test)]
mod tests {
    use crate::config::TestGenConfig;
    use crate::testgen::{generate_tests, GeneratedTests, TestFramework, TestGenOptions, TestTarget};
    use std::path::Path;

    const SOURCE: &str = r#"
#include <stdexcept>
#include <string>

namespace util {

int clamp(int value, int lo, int hi) {
    if (lo > hi) {
        throw std::invalid_argument("lo > hi");
    }
    return value;
}

class Stack {
public:
    Stack(int capacity) : capacity_(capacity) {}
    void push(const std::string& item) {
        if (item.empty()) throw std::length_error("empty");
    }
    static Stack make() { return Stack(4); }
private:
    int capacity_;
};

}
"#;

    fn generate(framework: TestFramework) -> GeneratedTests {
        generate_tests(
            Path::new("src/stack.cpp"),
            SOURCE,
            &TestTarget::Module,
            Some(framework),
            &TestGenConfig::default(),
            &TestGenOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_gtest_render() {
        let out = generate(TestFramework::Gtest);
        let src = &out.source;
        assert!(src.contains("#include <gtest/gtest.h>\n#include <stdexcept>\n"));
        assert!(src.contains("#include \"stack.hpp\"\n"));
        assert!(src.contains("using namespace util;\n"));
        assert!(src.contains("TEST(ClampTest, ReturnsExpectedValue) {\n    EXPECT_NO_THROW(clamp(1, 1, 1));\n}\n"));
        assert!(src.contains("EXPECT_THROW(clamp(1, 1, 1), std::invalid_argument);"));
        assert!(src.contains("EXPECT_NO_THROW(clamp(0, 1, 1));"));
        assert!(src.contains("TEST(StackTest, CanBeConstructed) {\n    EXPECT_NO_THROW({ Stack sut(1); });\n}\n"));
        assert!(src.contains("TEST(StackTest, PushFailsWithLengthError) {\n    Stack sut(1);\n    EXPECT_THROW(sut.push(\"example\"), std::length_error);\n}\n"));
        assert!(src.contains("EXPECT_NO_THROW(Stack::make());"));
        assert_eq!(out.suggested_path, Path::new("tests/stack_test.cpp"));
    }

    #[test]
    fn test_catch2_render() {
        let out = generate(TestFramework::Catch2);
        let src = &out.source;
        assert!(src.contains("#include <catch2/catch_test_macros.hpp>\n"));
        assert!(src.contains("TEST_CASE(\"clamp returns expected value\", \"[clamp]\") {\n    REQUIRE_NOTHROW(clamp(1, 1, 1));\n}\n"));
        assert!(src.contains("REQUIRE_THROWS_AS(clamp(1, 1, 1), std::invalid_argument);"));
        assert!(src.contains("TEST_CASE(\"Stack\", \"[Stack]\") {\n    Stack sut(1);\n"));
        assert!(src.contains("    SECTION(\"push fails with length error\") {\n        REQUIRE_THROWS_AS(sut.push(\"example\"), std::length_error);\n    }\n"));
        assert!(src.contains("REQUIRE_NOTHROW(sut.push(\"\"));"));
        assert_eq!(out.suggested_path, Path::new("tests/test_stack.cpp"));
    }

    #[test]
    fn test_overloads_render_unique_test_names() {
        let source = "int add(int a, int b) { return a + b; }\n\
                      double add(double a, double b) { return a + b; }\n";
        for framework in [TestFramework::Gtest, TestFramework::Catch2] {
            let out = generate_tests(
                Path::new("src/math.cpp"),
                source,
                &TestTarget::Module,
                Some(framework),
                &TestGenConfig::default(),
                &TestGenOptions::default(),
            )
            .unwrap();
            let src = &out.source;
            let (first, second) = match framework {
                TestFramework::Gtest => (
                    "TEST(AddIntIntTest, ReturnsExpectedValue)",
                    "TEST(AddDoubleDoubleTest, ReturnsExpectedValue)",
                ),
                _ => (
                    "TEST_CASE(\"add_int_int returns expected value\"",
                    "TEST_CASE(\"add_double_double returns expected value\"",
                ),
            };
            assert_eq!(src.matches(first).count(), 1, "{}", src);
            assert_eq!(src.matches(second).count(), 1, "{}", src);
            assert!(src.contains("add(1.0, 1.0)"));
        }
    }
}
