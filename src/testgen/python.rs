//! pytest and unittest templates.

use std::path::{Component, Path, PathBuf};

use super::{
    pascal_case, snake_case, Arg, CaseKind, ClassPlan, Sample, Subject, TemplateProducer,
    TestCase, TestFramework, TestPlan,
};

const SKIP_REASON: &str = "integration test: wire up real collaborators";

pub struct Pytest;
pub struct Unittest;

impl TemplateProducer for Pytest {
    fn framework(&self) -> TestFramework {
        TestFramework::Pytest
    }

    fn suggested_path(&self, plan: &TestPlan) -> PathBuf {
        PathBuf::from("tests").join(format!("test_{}.py", plan.source_stem()))
    }

    fn render(&self, plan: &TestPlan) -> String {
        let mut out = header(plan);
        out.push_str("import pytest\n");
        imports(plan, &mut out);

        for subject in &plan.functions {
            for case in &subject.cases {
                out.push_str("\n\n");
                pytest_case(&mut out, subject, case, None);
            }
        }

        for class in &plan.classes {
            let fixture = snake_case(&class.name);
            out.push_str(&format!(
                "\n\n@pytest.fixture\ndef {}():\n    return {}\n",
                fixture,
                construct(class)
            ));
            out.push_str(&format!(
                "\n\ndef test_{}_can_be_constructed({}):\n    assert isinstance({}, {})\n",
                fixture, fixture, fixture, class.name
            ));
            for method in &class.methods {
                for case in &method.cases {
                    out.push_str("\n\n");
                    pytest_case(&mut out, method, case, Some(class));
                }
            }
        }

        out
    }
}

fn pytest_case(out: &mut String, subject: &Subject, case: &TestCase, class: Option<&ClassPlan>) {
    let fixture = class.map(|c| snake_case(&c.name));
    let test_name = match &fixture {
        Some(f) => format!("test_{}_{}_{}", f, snake_case(&subject.label), case.name),
        None => format!("test_{}_{}", snake_case(&subject.label), case.name),
    };
    let receiver = match (class, &fixture) {
        (Some(c), _) if subject.is_static => Some(c.name.clone()),
        (Some(_), Some(f)) => Some(f.clone()),
        _ => None,
    };
    let takes_fixture = class.is_some() && !subject.is_static;

    if case.kind == CaseKind::Integration {
        out.push_str(&format!("@pytest.mark.skip(reason=\"{}\")\n", SKIP_REASON));
    }
    if subject.is_async {
        out.push_str("@pytest.mark.asyncio\n");
    }
    out.push_str(&format!(
        "{}def {}({}):\n",
        if subject.is_async { "async " } else { "" },
        test_name,
        if takes_fixture {
            fixture.as_deref().unwrap_or("")
        } else {
            ""
        }
    ));

    let call = call(subject, case, receiver.as_deref());
    body(out, subject, case, &call, Assertions::Pytest);
}

impl TemplateProducer for Unittest {
    fn framework(&self) -> TestFramework {
        TestFramework::Unittest
    }

    fn suggested_path(&self, plan: &TestPlan) -> PathBuf {
        PathBuf::from("tests").join(format!("test_{}.py", plan.source_stem()))
    }

    fn render(&self, plan: &TestPlan) -> String {
        let mut out = header(plan);
        out.push_str("import unittest\n");
        imports(plan, &mut out);

        for subject in &plan.functions {
            out.push_str(&format!(
                "\n\nclass Test{}({}):\n",
                pascal_case(&subject.label),
                test_case_base(subject.is_async)
            ));
            for (i, case) in subject.cases.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                unittest_case(&mut out, subject, case, None, &case.name);
            }
        }

        for class in &plan.classes {
            let any_async = class.methods.iter().any(|m| m.is_async);
            out.push_str(&format!(
                "\n\nclass Test{}({}):\n",
                class.name,
                test_case_base(any_async)
            ));
            out.push_str(&format!("    def setUp(self):\n        self.sut = {}\n", construct(class)));
            out.push_str(&format!(
                "\n    def test_can_be_constructed(self):\n        self.assertIsInstance(self.sut, {})\n",
                class.name
            ));
            for method in &class.methods {
                for case in &method.cases {
                    out.push('\n');
                    let name = format!("{}_{}", snake_case(&method.label), case.name);
                    unittest_case(&mut out, method, case, Some(class), &name);
                }
            }
        }

        out.push_str("\n\nif __name__ == \"__main__\":\n    unittest.main()\n");
        out
    }
}

fn test_case_base(is_async: bool) -> &'static str {
    if is_async {
        "unittest.IsolatedAsyncioTestCase"
    } else {
        "unittest.TestCase"
    }
}

fn unittest_case(
    out: &mut String,
    subject: &Subject,
    case: &TestCase,
    class: Option<&ClassPlan>,
    name: &str,
) {
    if case.kind == CaseKind::Integration {
        out.push_str(&format!("    @unittest.skip(\"{}\")\n", SKIP_REASON));
    }
    out.push_str(&format!(
        "    {}def test_{}(self):\n",
        if subject.is_async { "async " } else { "" },
        name
    ));
    let receiver = match class {
        Some(c) if subject.is_static => Some(c.name.clone()),
        Some(_) => Some("self.sut".to_string()),
        None => None,
    };
    let call = call(subject, case, receiver.as_deref());
    let mut inner = String::new();
    body(&mut inner, subject, case, &call, Assertions::Unittest);
    for line in inner.lines() {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
}

// ============ Shared pieces ============

#[derive(Clone, Copy)]
enum Assertions {
    Pytest,
    Unittest,
}

fn header(plan: &TestPlan) -> String {
    format!(
        "\"\"\"Tests for {}.\n\nGenerated by coderag from {}. Replace the placeholder inputs and\nassertions with real expectations.\n\"\"\"\n",
        plan.module_name, plan.source_path
    )
}

fn imports(plan: &TestPlan, out: &mut String) {
    if plan.uses_mocks() {
        out.push_str("from unittest.mock import MagicMock\n");
    }
    let names = plan.exported_names();
    if !names.is_empty() {
        out.push_str(&format!(
            "\nfrom {} import {}\n",
            module_path(plan),
            names.join(", ")
        ));
    }
}

/// `pkg/util.py` → `pkg.util`; a leading `src/` is dropped.
fn module_path(plan: &TestPlan) -> String {
    let path = Path::new(&plan.source_path);
    if path.is_absolute() {
        return plan.source_stem();
    }
    let mut parts: Vec<String> = path
        .with_extension("")
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    if parts.len() > 1 && parts[0] == "src" {
        parts.remove(0);
    }
    if parts.last().is_some_and(|p| p == "__init__") {
        parts.pop();
    }
    if parts.is_empty() {
        return plan.module_name.clone();
    }
    parts.join(".")
}

fn construct(class: &ClassPlan) -> String {
    let args: Vec<String> = class.constructor_args.iter().map(literal).collect();
    format!("{}({})", class.name, args.join(", "))
}

fn call(subject: &Subject, case: &TestCase, receiver: Option<&str>) -> String {
    let args: Vec<String> = case.args.iter().map(literal).collect();
    let target = match receiver {
        Some(r) => format!("{}.{}", r, subject.name),
        None => subject.name.clone(),
    };
    let call = format!("{}({})", target, args.join(", "));
    if subject.is_async {
        format!("await {}", call)
    } else {
        call
    }
}

fn body(out: &mut String, subject: &Subject, case: &TestCase, call: &str, style: Assertions) {
    if let Some(error) = &case.expected_error {
        let guard = match style {
            Assertions::Pytest => format!("pytest.raises({})", error),
            Assertions::Unittest => format!("self.assertRaises({})", error),
        };
        out.push_str(&format!("    # Arrange inputs that trigger {}.\n", error));
        out.push_str(&format!("    with {}:\n        {}\n", guard, call));
        return;
    }

    if case.kind == CaseKind::EdgeCase {
        out.push_str("    # Boundary input: adjust the expectation if this should raise.\n");
    }
    if subject.returns_value {
        out.push_str(&format!("    result = {}\n", call));
        match style {
            Assertions::Pytest => out.push_str("    assert result is not None\n"),
            Assertions::Unittest => out.push_str("    self.assertIsNotNone(result)\n"),
        }
    } else {
        out.push_str(&format!("    {}\n", call));
    }
}

fn literal(arg: &Arg) -> String {
    if arg.sample == Sample::Mock {
        return "MagicMock()".to_string();
    }
    let boundary = arg.sample == Sample::Boundary;
    let hint = arg.type_hint.as_deref().unwrap_or("").trim();
    let base = hint.split('[').next().unwrap_or(hint).trim();
    let value = match base {
        "int" => if boundary { "0" } else { "1" },
        "float" => if boundary { "0.0" } else { "1.0" },
        "str" => if boundary { "\"\"" } else { "\"example\"" },
        "bytes" => if boundary { "b\"\"" } else { "b\"example\"" },
        "bool" => if boundary { "False" } else { "True" },
        "list" | "List" | "Sequence" | "Iterable" => if boundary { "[]" } else { "[1]" },
        "tuple" | "Tuple" => if boundary { "()" } else { "(1,)" },
        "set" | "Set" => if boundary { "set()" } else { "{1}" },
        "dict" | "Dict" | "Mapping" => if boundary { "{}" } else { "{\"key\": \"value\"}" },
        _ => if boundary { "None" } else { "\"example\"" },
    };
    value.to_string()
}

#[cfg(test)]
mod tests {
    use crate::config::TestGenConfig;
    use crate::testgen::{generate_tests, GeneratedTests, TestFramework, TestGenOptions};
    use std::path::Path;

    const SOURCE: &str = r#"
def parse_port(value: str, default: int = 8080) -> int:
    if not value:
        raise ValueError("empty")
    return int(value)

async def fetch(url):
    return None

class Cache:
    def __init__(self, store: Store, capacity: int):
        self.store = store

    def get(self, key: str):
        return None

    @staticmethod
    def build(size: int):
        return Cache(None, size)
"#;

    fn generate(framework: TestFramework) -> GeneratedTests {
        generate_tests(
            Path::new("src/pkg/cache.py"),
            SOURCE,
            &crate::testgen::TestTarget::Module,
            Some(framework),
            &TestGenConfig::default(),
            &TestGenOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_pytest_render() {
        let out = generate(TestFramework::Pytest);
        let src = &out.source;
        assert!(src.contains("import pytest\n"));
        assert!(src.contains("from unittest.mock import MagicMock\n"));
        assert!(src.contains("from pkg.cache import parse_port, fetch, Cache\n"));
        assert!(src.contains("def test_parse_port_returns_expected_value():\n    result = parse_port(\"example\")\n"));
        assert!(src.contains("    with pytest.raises(ValueError):\n        parse_port(\"example\")\n"));
        assert!(src.contains("result = parse_port(\"\")"));
        assert!(src.contains("@pytest.mark.asyncio\nasync def test_fetch_returns_expected_value():\n    result = await fetch(\"example\")\n"));
        assert!(src.contains("@pytest.fixture\ndef cache():\n    return Cache(MagicMock(), 1)\n"));
        assert!(src.contains("def test_cache_get_returns_expected_value(cache):\n    result = cache.get(\"example\")\n"));
        assert!(src.contains("def test_cache_build_returns_expected_value():\n    result = Cache.build(1)\n"));
        assert_eq!(out.suggested_path, Path::new("tests/test_cache.py"));
    }

    #[test]
    fn test_unittest_render() {
        let out = generate(TestFramework::Unittest);
        let src = &out.source;
        assert!(src.contains("import unittest\n"));
        assert!(src.contains("class TestParsePort(unittest.TestCase):\n"));
        assert!(src.contains("class TestFetch(unittest.IsolatedAsyncioTestCase):\n"));
        assert!(src.contains("        with self.assertRaises(ValueError):\n            parse_port(\"example\")\n"));
        assert!(src.contains("class TestCache(unittest.TestCase):\n    def setUp(self):\n        self.sut = Cache(MagicMock(), 1)\n"));
        assert!(src.contains("    def test_get_returns_expected_value(self):\n        result = self.sut.get(\"example\")\n        self.assertIsNotNone(result)\n"));
        assert!(src.contains("result = Cache.build(1)"));
        assert!(src.ends_with("unittest.main()\n"));
    }

    #[test]
    fn test_redefined_functions_render_unique_names() {
        let source = "def load(path):\n    return 1\n\n\ndef load(path):\n    return 2\n";
        let render = |framework| {
            crate::testgen::generate_tests(
                Path::new("io.py"),
                source,
                &crate::testgen::TestTarget::Module,
                Some(framework),
                &TestGenConfig::default(),
                &TestGenOptions::default(),
            )
            .unwrap()
            .source
        };

        let pytest = render(TestFramework::Pytest);
        assert_eq!(pytest.matches("def test_load_1_returns_expected_value(").count(), 1);
        assert_eq!(pytest.matches("def test_load_2_returns_expected_value(").count(), 1);

        let unittest = render(TestFramework::Unittest);
        assert_eq!(unittest.matches("class TestLoad1(").count(), 1);
        assert_eq!(unittest.matches("class TestLoad2(").count(), 1);
    }
}
