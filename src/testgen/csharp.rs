//! xUnit, NUnit, and MSTest templates.

use std::path::PathBuf;

use super::{pascal_case, Arg, CaseKind, ClassPlan, Sample, Subject, TemplateProducer, TestCase, TestFramework, TestPlan};

pub enum DotNet {
    Xunit,
    Nunit,
    Mstest,
}

impl DotNet {
    fn using(&self) -> &'static str {
        match self {
            DotNet::Xunit => "Xunit",
            DotNet::Nunit => "NUnit.Framework",
            DotNet::Mstest => "Microsoft.VisualStudio.TestTools.UnitTesting",
        }
    }

    fn class_attribute(&self) -> Option<&'static str> {
        match self {
            DotNet::Xunit => None,
            DotNet::Nunit => Some("[TestFixture]"),
            DotNet::Mstest => Some("[TestClass]"),
        }
    }

    fn test_attribute(&self, kind: CaseKind) -> &'static str {
        match (self, kind == CaseKind::Integration) {
            (DotNet::Xunit, false) => "[Fact]",
            (DotNet::Xunit, true) => "[Fact(Skip = \"Integration test: requires real dependencies\")]",
            (DotNet::Nunit, false) => "[Test]",
            (DotNet::Nunit, true) => {
                "[Test, Category(\"Integration\"), Ignore(\"Requires real dependencies\")]"
            }
            (DotNet::Mstest, false) => "[TestMethod]",
            (DotNet::Mstest, true) => "[TestMethod, TestCategory(\"Integration\"), Ignore]",
        }
    }

    fn assert_not_null(&self, expr: &str) -> String {
        match self {
            DotNet::Xunit => format!("Assert.NotNull({});", expr),
            DotNet::Nunit => format!("Assert.That({}, Is.Not.Null);", expr),
            DotNet::Mstest => format!("Assert.IsNotNull({});", expr),
        }
    }

    fn assert_throws(&self, error: &str, call: &str, is_async: bool) -> String {
        match (self, is_async) {
            (DotNet::Xunit, false) => format!("Assert.Throws<{}>(() => {});", error, call),
            (DotNet::Xunit, true) => format!("await Assert.ThrowsAsync<{}>(() => {});", error, call),
            (DotNet::Nunit, false) => format!("Assert.Throws<{}>(() => {});", error, call),
            (DotNet::Nunit, true) => {
                format!("Assert.ThrowsAsync<{}>(async () => await {});", error, call)
            }
            (DotNet::Mstest, false) => format!("Assert.ThrowsException<{}>(() => {});", error, call),
            (DotNet::Mstest, true) => {
                format!("await Assert.ThrowsExceptionAsync<{}>(() => {});", error, call)
            }
        }
    }
}

impl TemplateProducer for DotNet {
    fn framework(&self) -> TestFramework {
        match self {
            DotNet::Xunit => TestFramework::Xunit,
            DotNet::Nunit => TestFramework::Nunit,
            DotNet::Mstest => TestFramework::Mstest,
        }
    }

    fn suggested_path(&self, plan: &TestPlan) -> PathBuf {
        let project = plan
            .namespace
            .clone()
            .unwrap_or_else(|| pascal_case(&plan.module_name));
        PathBuf::from("tests")
            .join(format!("{}.Tests", project))
            .join(format!("{}Tests.cs", plan.source_stem()))
    }

    fn render(&self, plan: &TestPlan) -> String {
        let mut out = format!(
            "// Tests for {}. Generated by coderag; replace placeholder inputs and assertions.\n",
            plan.source_path
        );
        out.push_str("using System;\n");
        if plan.has_async() {
            out.push_str("using System.Threading.Tasks;\n");
        }
        if plan.uses_mocks() {
            out.push_str("using Moq;\n");
        }
        out.push_str(&format!("using {};\n", self.using()));
        if let Some(ns) = &plan.namespace {
            out.push_str(&format!("using {};\n", ns));
        }

        let test_ns = match &plan.namespace {
            Some(ns) => format!("{}.Tests", ns),
            None => format!("{}.Tests", pascal_case(&plan.module_name)),
        };
        out.push_str(&format!("\nnamespace {}\n{{\n", test_ns));

        let mut first = true;
        for class in &plan.classes {
            if !first {
                out.push('\n');
            }
            first = false;
            self.class(&mut out, class);
        }

        out.push_str("}\n");
        out
    }
}

impl DotNet {
    fn class(&self, out: &mut String, class: &ClassPlan) {
        if let Some(attr) = self.class_attribute() {
            out.push_str(&format!("    {}\n", attr));
        }
        out.push_str(&format!("    public class {}Tests\n    {{\n", class.name));

        out.push_str(&format!(
            "        {}\n        public void Constructor_CreatesInstance()\n        {{\n            var sut = {};\n            {}\n        }}\n",
            self.test_attribute(CaseKind::HappyPath),
            construct(class),
            self.assert_not_null("sut")
        ));

        for method in &class.methods {
            for case in &method.cases {
                out.push('\n');
                self.case(out, class, method, case);
            }
        }

        out.push_str("    }\n");
    }

    fn case(&self, out: &mut String, class: &ClassPlan, method: &Subject, case: &TestCase) {
        let signature = if method.is_async {
            "public async Task"
        } else {
            "public void"
        };
        out.push_str(&format!(
            "        {}\n        {} {}_{}()\n        {{\n",
            self.test_attribute(case.kind),
            signature,
            pascal_case(&method.label),
            pascal_case(&case.name)
        ));

        let receiver = if method.is_static {
            class.name.clone()
        } else {
            out.push_str(&format!("            var sut = {};\n", construct(class)));
            "sut".to_string()
        };
        let args: Vec<String> = case.args.iter().map(literal).collect();
        let call = format!("{}.{}({})", receiver, method.name, args.join(", "));

        let line = |s: String| format!("            {}\n", s);
        if let Some(error) = &case.expected_error {
            out.push_str(&line(self.assert_throws(error, &call, method.is_async)));
        } else {
            if case.kind == CaseKind::EdgeCase {
                out.push_str(&line(
                    "// Boundary input: adjust the expectation if this should throw.".to_string(),
                ));
            }
            let call = if method.is_async {
                format!("await {}", call)
            } else {
                call
            };
            if method.returns_value {
                out.push_str(&line(format!("var result = {};", call)));
                out.push_str(&line(self.assert_not_null("result")));
            } else {
                out.push_str(&line(format!("{};", call)));
            }
        }
        out.push_str("        }\n");
    }
}

fn construct(class: &ClassPlan) -> String {
    let args: Vec<String> = class.constructor_args.iter().map(literal).collect();
    format!("new {}({})", class.name, args.join(", "))
}

fn literal(arg: &Arg) -> String {
    let hint = arg.type_hint.as_deref().unwrap_or("object").trim();
    if arg.sample == Sample::Mock {
        return format!("new Mock<{}>().Object", hint);
    }
    let boundary = arg.sample == Sample::Boundary;
    if let Some(inner) = hint.strip_suffix('?') {
        if boundary {
            return "null".to_string();
        }
        return literal(&Arg {
            name: arg.name.clone(),
            type_hint: Some(inner.to_string()),
            sample: Sample::Typical,
        });
    }
    if let Some(element) = hint.strip_suffix("[]") {
        return format!("Array.Empty<{}>()", element);
    }
    let value = match hint {
        "int" | "long" | "short" | "byte" | "uint" | "ulong" | "ushort" | "sbyte" => {
            if boundary { "0" } else { "1" }
        }
        "double" => if boundary { "0.0" } else { "1.0" },
        "float" => if boundary { "0f" } else { "1f" },
        "decimal" => if boundary { "0m" } else { "1m" },
        "string" => if boundary { "\"\"" } else { "\"example\"" },
        "bool" => if boundary { "false" } else { "true" },
        "char" => if boundary { "'\\0'" } else { "'a'" },
        "object" => if boundary { "null" } else { "new object()" },
        _ if hint.contains('<') => return format!("new {}()", hint),
        _ => return format!("default({})", hint),
    };
    value.to_string()
}

#[cfg(test)]
mod tests {
    use crate::config::TestGenConfig;
    use crate::testgen::{generate_tests, GeneratedTests, TestFramework, TestGenOptions, TestTarget};
    use std::path::Path;

    const SOURCE: &str = r#"
using System;

namespace Shop.Billing
{
    public class InvoiceService
    {
        public InvoiceService(IRepository repo, int retries)
        {
        }

        public decimal Total(decimal net, decimal rate)
        {
            if (rate < 0) throw new ArgumentOutOfRangeException(nameof(rate));
            return net * (1 + rate);
        }

        public async Task<Invoice> LoadAsync(string id)
        {
            throw new InvalidOperationException("offline");
        }

        public static void Reset() { }
    }
}
"#;

    fn generate(framework: TestFramework) -> GeneratedTests {
        generate_tests(
            Path::new("src/InvoiceService.cs"),
            SOURCE,
            &TestTarget::Class("InvoiceService".to_string()),
            Some(framework),
            &TestGenConfig::default(),
            &TestGenOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_xunit_render() {
        let out = generate(TestFramework::Xunit);
        let src = &out.source;
        assert!(src.contains("using Moq;\nusing Xunit;\nusing Shop.Billing;\n"));
        assert!(src.contains("namespace Shop.Billing.Tests\n{\n    public class InvoiceServiceTests\n"));
        assert!(src.contains("var sut = new InvoiceService(new Mock<IRepository>().Object, 1);"));
        assert!(src.contains("        [Fact]\n        public void Total_ReturnsExpectedValue()\n"));
        assert!(src.contains("var result = sut.Total(1m, 1m);\n            Assert.NotNull(result);"));
        assert!(src.contains("Assert.Throws<ArgumentOutOfRangeException>(() => sut.Total(1m, 1m));"));
        assert!(src.contains("sut.Total(0m, 1m)"));
        assert!(src.contains("public async Task LoadAsync_FailsWithInvalidOperationException()"));
        assert!(src.contains("await Assert.ThrowsAsync<InvalidOperationException>(() => sut.LoadAsync(\"example\"));"));
        assert!(src.contains("InvoiceService.Reset();"));
        assert_eq!(
            out.suggested_path,
            Path::new("tests/Shop.Billing.Tests/InvoiceServiceTests.cs")
        );
    }

    #[test]
    fn test_nunit_and_mstest_render() {
        let nunit = generate(TestFramework::Nunit).source;
        assert!(nunit.contains("using NUnit.Framework;"));
        assert!(nunit.contains("    [TestFixture]\n    public class InvoiceServiceTests"));
        assert!(nunit.contains("        [Test]\n"));
        assert!(nunit.contains("Assert.That(result, Is.Not.Null);"));

        let mstest = generate(TestFramework::Mstest).source;
        assert!(mstest.contains("using Microsoft.VisualStudio.TestTools.UnitTesting;"));
        assert!(mstest.contains("    [TestClass]\n"));
        assert!(mstest.contains("        [TestMethod]\n"));
        assert!(mstest.contains("Assert.ThrowsException<ArgumentOutOfRangeException>(() => sut.Total(1m, 1m));"));
        assert!(mstest.contains("await Assert.ThrowsExceptionAsync<InvalidOperationException>(() => sut.LoadAsync(\"example\"));"));
    }

    #[test]
    fn test_overloaded_methods_render_unique_names() {
        let source = r#"
namespace Shop
{
    public class Calc
    {
        public int Add(int a, int b) { return a + b; }
        public double Add(double a, double b) { return a + b; }
    }
}
"#;
        for framework in [TestFramework::Xunit, TestFramework::Nunit, TestFramework::Mstest] {
            let src = generate_tests(
                Path::new("src/Calc.cs"),
                source,
                &TestTarget::Module,
                Some(framework),
                &TestGenConfig::default(),
                &TestGenOptions::default(),
            )
            .unwrap()
            .source;
            assert_eq!(src.matches("AddIntInt_ReturnsExpectedValue()").count(), 1, "{}", src);
            assert_eq!(src.matches("AddDoubleDouble_ReturnsExpectedValue()").count(), 1, "{}", src);
            assert!(!src.contains(" Add_ReturnsExpectedValue()"));
            assert!(src.contains("sut.Add("));
        }
    }
}
