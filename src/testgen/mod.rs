//! Test scaffolding generator.
//!
//! Generation runs in two stages. First the source file is analysed (see
//! [`crate::analysis`]) and a framework-independent [`TestPlan`] is built
//! from the facts, the requested [`TestTarget`], and [`TestGenOptions`].
//! Then the plan is handed to the selected framework's [`TemplateProducer`],
//! which renders test source text and suggests where to write it.
//!
//! Because the plan is built before the framework is consulted, switching
//! between frameworks of the same language only changes the emitted syntax.
//!
//! ```text
//! source ──▶ analyze_source ──▶ CodeFacts ──▶ build_plan ──▶ TestPlan
//!                                                              │
//!                          pytest / unittest / jest / ... ◀────┘
//! ```

mod cpp;
mod csharp;
mod javascript;
mod python;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::analysis::{self, ClassFact, CodeFacts, FunctionFact, ParamFact};
use crate::config::TestGenConfig;
use crate::lang::Lang;

// ============ Errors ============

#[derive(Error, Debug)]
pub enum TestGenError {
    #[error("Unknown test framework: '{0}'. Must be one of pytest, unittest, jest, mocha, xunit, nunit, mstest, gtest, catch2.")]
    UnknownFramework(String),

    #[error("Unsupported language for test generation: {path}")]
    UnsupportedLanguage { path: String },

    #[error("Framework '{framework}' cannot test {language} code")]
    FrameworkMismatch {
        framework: TestFramework,
        language: Lang,
    },

    #[error("Invalid target '{0}': expected function:<name>, class:<name>, or module")]
    InvalidTarget(String),

    #[error("Target not found in {path}: {target}")]
    TargetNotFound { target: String, path: String },

    #[error("Failed to analyse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============ Frameworks ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TestFramework {
    Pytest,
    Unittest,
    Jest,
    Mocha,
    Xunit,
    Nunit,
    Mstest,
    Gtest,
    Catch2,
}

impl TestFramework {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestFramework::Pytest => "pytest",
            TestFramework::Unittest => "unittest",
            TestFramework::Jest => "jest",
            TestFramework::Mocha => "mocha",
            TestFramework::Xunit => "xunit",
            TestFramework::Nunit => "nunit",
            TestFramework::Mstest => "mstest",
            TestFramework::Gtest => "gtest",
            TestFramework::Catch2 => "catch2",
        }
    }

    /// Languages this framework can test.
    pub fn languages(&self) -> &'static [Lang] {
        match self {
            TestFramework::Pytest | TestFramework::Unittest => &[Lang::Python],
            TestFramework::Jest | TestFramework::Mocha => &[Lang::JavaScript, Lang::TypeScript],
            TestFramework::Xunit | TestFramework::Nunit | TestFramework::Mstest => &[Lang::CSharp],
            TestFramework::Gtest | TestFramework::Catch2 => &[Lang::Cpp],
        }
    }

    pub fn supports(&self, lang: Lang) -> bool {
        self.languages().contains(&lang)
    }

    /// Framework used when neither the CLI nor the config picks one.
    pub fn default_for(lang: Lang) -> Option<Self> {
        match lang {
            Lang::Python => Some(TestFramework::Pytest),
            Lang::JavaScript | Lang::TypeScript => Some(TestFramework::Jest),
            Lang::CSharp => Some(TestFramework::Xunit),
            Lang::Cpp => Some(TestFramework::Gtest),
            _ => None,
        }
    }
}

impl fmt::Display for TestFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestFramework {
    type Err = TestGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pytest" => Ok(TestFramework::Pytest),
            "unittest" => Ok(TestFramework::Unittest),
            "jest" => Ok(TestFramework::Jest),
            "mocha" => Ok(TestFramework::Mocha),
            "xunit" | "xunit.net" => Ok(TestFramework::Xunit),
            "nunit" => Ok(TestFramework::Nunit),
            "mstest" => Ok(TestFramework::Mstest),
            "gtest" | "googletest" | "google-test" | "google_test" => Ok(TestFramework::Gtest),
            "catch2" | "catch" => Ok(TestFramework::Catch2),
            other => Err(TestGenError::UnknownFramework(other.to_string())),
        }
    }
}

// ============ Targets and options ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum TestTarget {
    /// A top-level function, or a method written `Class.method`.
    Function(String),
    Class(String),
    Module,
}

impl fmt::Display for TestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestTarget::Function(name) => write!(f, "function:{}", name),
            TestTarget::Class(name) => write!(f, "class:{}", name),
            TestTarget::Module => f.write_str("module"),
        }
    }
}

impl FromStr for TestTarget {
    type Err = TestGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "module" {
            return Ok(TestTarget::Module);
        }
        match s.split_once(':') {
            Some(("function", name)) if !name.trim().is_empty() => {
                Ok(TestTarget::Function(name.trim().to_string()))
            }
            Some(("class", name)) if !name.trim().is_empty() => {
                Ok(TestTarget::Class(name.trim().to_string()))
            }
            _ => Err(TestGenError::InvalidTarget(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestGenOptions {
    pub include_mocks: bool,
    pub include_edge_cases: bool,
    pub include_error_cases: bool,
    pub include_integration_tests: bool,
    pub max_tests_per_function: usize,
}

impl Default for TestGenOptions {
    fn default() -> Self {
        Self::from(&TestGenConfig::default())
    }
}

impl From<&TestGenConfig> for TestGenOptions {
    fn from(config: &TestGenConfig) -> Self {
        Self {
            include_mocks: config.include_mocks,
            include_edge_cases: config.include_edge_cases,
            include_error_cases: config.include_error_cases,
            include_integration_tests: config.include_integration_tests,
            max_tests_per_function: config.max_tests_per_function,
        }
    }
}

// ============ Plan ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    HappyPath,
    EdgeCase,
    ErrorCase,
    Integration,
}

/// Which value a renderer should put in an argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sample {
    /// An ordinary value of the parameter's type.
    Typical,
    /// Zero, empty, or null for the parameter's type.
    Boundary,
    /// A test double standing in for a collaborator.
    Mock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Arg {
    pub name: String,
    pub type_hint: Option<String>,
    pub sample: Sample,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub kind: CaseKind,
    /// Lower snake_case words, e.g. `fails_with_value_error`.
    pub name: String,
    pub args: Vec<Arg>,
    pub expected_error: Option<String>,
}

/// A function or method under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subject {
    pub name: String,
    /// Identifier stem for generated tests. Equal to `name` unless the
    /// subject is one of several overloads sharing that name.
    pub label: String,
    pub is_async: bool,
    pub is_static: bool,
    pub returns_value: bool,
    pub cases: Vec<TestCase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassPlan {
    pub name: String,
    pub constructor_args: Vec<Arg>,
    pub methods: Vec<Subject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestPlan {
    pub language: Lang,
    pub module_name: String,
    pub namespace: Option<String>,
    /// Source path as given, with `/` separators.
    pub source_path: String,
    pub source_imports: Vec<String>,
    pub target: TestTarget,
    pub functions: Vec<Subject>,
    pub classes: Vec<ClassPlan>,
    /// Types (or parameter names, when untyped) replaced by test doubles.
    pub mocks: Vec<String>,
}

impl TestPlan {
    pub fn uses_mocks(&self) -> bool {
        !self.mocks.is_empty()
    }

    pub fn has_async(&self) -> bool {
        self.functions.iter().any(|s| s.is_async)
            || self
                .classes
                .iter()
                .any(|c| c.methods.iter().any(|m| m.is_async))
    }

    pub fn raises_anything(&self) -> bool {
        self.subjects().any(|s| s.cases.iter().any(|c| c.expected_error.is_some()))
    }

    pub fn has_integration(&self) -> bool {
        self.subjects()
            .any(|s| s.cases.iter().any(|c| c.kind == CaseKind::Integration))
    }

    /// Names a test file must import from the module under test.
    pub fn exported_names(&self) -> Vec<String> {
        self.functions
            .iter()
            .map(|s| s.name.clone())
            .chain(self.classes.iter().map(|c| c.name.clone()))
            .collect()
    }

    pub fn test_count(&self) -> usize {
        self.subjects().map(|s| s.cases.len()).sum::<usize>() + self.classes.len()
    }

    fn subjects(&self) -> impl Iterator<Item = &Subject> {
        self.functions
            .iter()
            .chain(self.classes.iter().flat_map(|c| c.methods.iter()))
    }

    fn source_stem(&self) -> String {
        Path::new(&self.source_path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.module_name.clone())
    }

    fn source_dir(&self) -> PathBuf {
        Path::new(&self.source_path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/// Build the framework-independent plan for `target`.
pub fn build_plan(
    facts: &CodeFacts,
    path: &Path,
    target: &TestTarget,
    options: &TestGenOptions,
) -> Result<TestPlan, TestGenError> {
    let lang = facts.language;
    let mut plan = TestPlan {
        language: lang,
        module_name: facts.module_name.clone(),
        namespace: facts.namespace.clone(),
        source_path: path.to_string_lossy().replace('\\', "/"),
        source_imports: facts.imports.clone(),
        target: target.clone(),
        functions: Vec::new(),
        classes: Vec::new(),
        mocks: Vec::new(),
    };
    let not_found = || TestGenError::TargetNotFound {
        target: target.to_string(),
        path: path.display().to_string(),
    };

    match target {
        TestTarget::Function(name) => {
            if let Some(f) = facts.function(name) {
                plan.functions.push(subject(f, options));
            } else if let Some((class, method)) = facts.method(name) {
                let mut class_plan = class_plan(class, lang, options, &mut plan.mocks);
                class_plan.methods = vec![subject(method, options)];
                plan.classes.push(class_plan);
            } else {
                return Err(not_found());
            }
        }
        TestTarget::Class(name) => {
            let class = facts.class(name).ok_or_else(not_found)?;
            plan.classes
                .push(class_plan(class, lang, options, &mut plan.mocks));
        }
        TestTarget::Module => {
            plan.functions = subjects(facts.functions.iter().filter(|f| f.is_public), options);
            for class in &facts.classes {
                let class_plan = class_plan(class, lang, options, &mut plan.mocks);
                plan.classes.push(class_plan);
            }
            if plan.functions.is_empty() && plan.classes.is_empty() {
                return Err(not_found());
            }
        }
    }

    Ok(plan)
}

fn class_plan(
    class: &ClassFact,
    lang: Lang,
    options: &TestGenOptions,
    mocks: &mut Vec<String>,
) -> ClassPlan {
    let mut constructor_args = Vec::new();
    if let Some(ctor) = &class.constructor {
        for p in required(&ctor.params) {
            let sample = if options.include_mocks && is_collaborator(lang, p) {
                let mocked = p.type_hint.clone().unwrap_or_else(|| p.name.clone());
                if !mocks.contains(&mocked) {
                    mocks.push(mocked);
                }
                Sample::Mock
            } else {
                Sample::Typical
            };
            constructor_args.push(arg(p, sample));
        }
    }

    ClassPlan {
        name: class.name.clone(),
        constructor_args,
        methods: subjects(
            class
                .methods
                .iter()
                .filter(|m| m.is_public && !m.name.starts_with("__")),
            options,
        ),
    }
}

/// Plan every function in `fns`, giving overloads distinct labels: the
/// parameter types when those tell them apart, otherwise an ordinal.
fn subjects<'f>(
    fns: impl IntoIterator<Item = &'f FunctionFact>,
    options: &TestGenOptions,
) -> Vec<Subject> {
    let fns: Vec<&FunctionFact> = fns.into_iter().collect();
    let mut out: Vec<Subject> = fns.iter().map(|f| subject(f, options)).collect();

    for (i, f) in fns.iter().enumerate() {
        let overloads: Vec<usize> = (0..fns.len()).filter(|&j| fns[j].name == f.name).collect();
        if overloads.len() < 2 {
            continue;
        }
        let by_type = signature_suffix(f);
        let unique = overloads
            .iter()
            .filter(|&&j| signature_suffix(fns[j]) == by_type)
            .count()
            == 1;
        let suffix = if unique && !by_type.is_empty() {
            by_type
        } else {
            let ordinal = overloads.iter().position(|&j| j == i).unwrap_or(0) + 1;
            ordinal.to_string()
        };
        out[i].label = format!("{}_{}", f.name, suffix);
    }
    out
}

/// `add(int, double)` → `int_double`.
fn signature_suffix(f: &FunctionFact) -> String {
    let types: Vec<&str> = f
        .params
        .iter()
        .filter_map(|p| p.type_hint.as_deref())
        .collect();
    snake_case(&types.join(" "))
}

fn subject(f: &FunctionFact, options: &TestGenOptions) -> Subject {
    let params: Vec<&ParamFact> = required(&f.params).collect();
    let typical: Vec<Arg> = params.iter().map(|p| arg(p, Sample::Typical)).collect();
    let mut cases = Vec::new();

    cases.push(TestCase {
        kind: CaseKind::HappyPath,
        name: if f.returns_value() {
            "returns_expected_value".to_string()
        } else {
            "completes_successfully".to_string()
        },
        args: typical.clone(),
        expected_error: None,
    });

    if options.include_error_cases {
        for raised in &f.raises {
            cases.push(TestCase {
                kind: CaseKind::ErrorCase,
                name: format!("fails_with_{}", snake_case(short_name(raised))),
                args: typical.clone(),
                expected_error: Some(raised.clone()),
            });
        }
    }

    if options.include_edge_cases {
        for (i, p) in params.iter().enumerate() {
            let mut args = typical.clone();
            args[i].sample = Sample::Boundary;
            cases.push(TestCase {
                kind: CaseKind::EdgeCase,
                name: format!("handles_boundary_{}", snake_case(&p.name)),
                args,
                expected_error: None,
            });
        }
    }

    if options.include_integration_tests {
        cases.push(TestCase {
            kind: CaseKind::Integration,
            name: "integration".to_string(),
            args: typical,
            expected_error: None,
        });
    }

    cases.truncate(options.max_tests_per_function.max(1));

    Subject {
        name: f.name.clone(),
        label: f.name.clone(),
        is_async: f.is_async,
        is_static: f.is_static,
        returns_value: f.returns_value(),
        cases,
    }
}

/// Parameters a call must supply: no defaults, no `*args`/`...rest`.
fn required(params: &[ParamFact]) -> impl Iterator<Item = &ParamFact> {
    params
        .iter()
        .filter(|p| !p.has_default && !p.name.starts_with('*') && !p.name.starts_with("..."))
}

fn arg(p: &ParamFact, sample: Sample) -> Arg {
    Arg {
        name: p.name.clone(),
        type_hint: p.type_hint.clone(),
        sample,
    }
}

const VALUE_TYPES: &[&str] = &[
    "String", "Boolean", "Number", "Object", "Decimal", "Double", "Int32", "Int64", "DateTime",
    "Guid", "Optional", "List", "Dict", "Tuple", "Set", "Sequence", "Mapping", "Any", "Array",
    "Record", "Map", "Promise", "Task", "IEnumerable", "IList", "ICollection", "Func", "Action",
];

/// Constructor parameters worth replacing with a test double.
fn is_collaborator(lang: Lang, p: &ParamFact) -> bool {
    if lang == Lang::Cpp {
        return false;
    }
    match p.type_hint.as_deref() {
        None => lang != Lang::CSharp,
        Some(t) => {
            let base = t
                .split(|c: char| c == '<' || c == '[' || c == '?')
                .next()
                .unwrap_or(t)
                .trim();
            base.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && !VALUE_TYPES.contains(&base)
        }
    }
}

// ============ Rendering ============

/// Renders a [`TestPlan`] in one framework's syntax.
pub trait TemplateProducer {
    fn framework(&self) -> TestFramework;

    /// Where the generated file would conventionally live, relative to the
    /// project root.
    fn suggested_path(&self, plan: &TestPlan) -> PathBuf;

    fn render(&self, plan: &TestPlan) -> String;
}

pub fn producer_for(framework: TestFramework) -> Box<dyn TemplateProducer> {
    match framework {
        TestFramework::Pytest => Box::new(python::Pytest),
        TestFramework::Unittest => Box::new(python::Unittest),
        TestFramework::Jest => Box::new(javascript::Jest),
        TestFramework::Mocha => Box::new(javascript::Mocha),
        TestFramework::Xunit => Box::new(csharp::DotNet::Xunit),
        TestFramework::Nunit => Box::new(csharp::DotNet::Nunit),
        TestFramework::Mstest => Box::new(csharp::DotNet::Mstest),
        TestFramework::Gtest => Box::new(cpp::GoogleTest),
        TestFramework::Catch2 => Box::new(cpp::Catch2),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedTests {
    pub framework: TestFramework,
    pub language: Lang,
    pub suggested_path: PathBuf,
    pub source: String,
    pub facts: CodeFacts,
    pub plan: TestPlan,
}

/// Pick the framework: explicit choice, then the `[testgen]` selector for
/// the language, then the built-in default.
pub fn resolve_framework(
    lang: Lang,
    explicit: Option<TestFramework>,
    config: &TestGenConfig,
) -> Result<TestFramework, TestGenError> {
    if let Some(framework) = explicit {
        return Ok(framework);
    }
    if let Some(selector) = config.framework_for(lang) {
        return selector.parse();
    }
    TestFramework::default_for(lang).ok_or(TestGenError::UnsupportedLanguage {
        path: lang.to_string(),
    })
}

/// Generate tests for already-loaded source text.
pub fn generate_tests(
    path: &Path,
    source: &str,
    target: &TestTarget,
    framework: Option<TestFramework>,
    config: &TestGenConfig,
    options: &TestGenOptions,
) -> Result<GeneratedTests, TestGenError> {
    let lang = Lang::from_path(path)
        .filter(Lang::supports_testgen)
        .ok_or_else(|| TestGenError::UnsupportedLanguage {
            path: path.display().to_string(),
        })?;

    let framework = resolve_framework(lang, framework, config)?;
    if !framework.supports(lang) {
        return Err(TestGenError::FrameworkMismatch {
            framework,
            language: lang,
        });
    }

    let facts = analysis::analyze_source(path, source, lang).map_err(|e| TestGenError::Parse {
        path: path.display().to_string(),
        message: format!("{:#}", e),
    })?;
    let plan = build_plan(&facts, path, target, options)?;

    let producer = producer_for(framework);
    let rendered = producer.render(&plan);
    tracing::debug!(
        framework = %framework,
        tests = plan.test_count(),
        "rendered test scaffold"
    );

    Ok(GeneratedTests {
        framework,
        language: lang,
        suggested_path: producer.suggested_path(&plan),
        source: rendered,
        facts,
        plan,
    })
}

/// Read `path` and generate tests for it.
pub fn generate_for_file(
    path: &Path,
    target: &TestTarget,
    framework: Option<TestFramework>,
    config: &TestGenConfig,
    options: &TestGenOptions,
) -> Result<GeneratedTests, TestGenError> {
    // Language is checked before reading so unsupported files fail fast.
    if !Lang::from_path(path).is_some_and(|l| l.supports_testgen()) {
        return Err(TestGenError::UnsupportedLanguage {
            path: path.display().to_string(),
        });
    }
    let source = std::fs::read_to_string(path)?;
    generate_tests(path, &source, target, framework, config, options)
}

/// `gen-tests` command.
pub fn run_gen_tests(
    config: &TestGenConfig,
    file: &Path,
    target: &str,
    framework: Option<TestFramework>,
    output: Option<&Path>,
    options: &TestGenOptions,
) -> anyhow::Result<()> {
    let target: TestTarget = target.parse()?;
    let generated = generate_for_file(file, &target, framework, config, options)?;

    match output {
        Some(out) => {
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, &generated.source)?;
            eprintln!(
                "Wrote {} {} test(s) to {} (suggested: {})",
                generated.plan.test_count(),
                generated.framework,
                out.display(),
                generated.suggested_path.display()
            );
        }
        None => {
            print!("{}", generated.source);
            eprintln!(
                "# {} test(s), framework {}, suggested path {}",
                generated.plan.test_count(),
                generated.framework,
                generated.suggested_path.display()
            );
        }
    }
    Ok(())
}

// ============ Identifier helpers ============

/// `std::invalid_argument` → `invalid_argument`; `errors.NotFound` → `NotFound`.
fn short_name(qualified: &str) -> &str {
    qualified
        .rsplit(|c: char| c == ':' || c == '.')
        .next()
        .unwrap_or(qualified)
}

/// `parseHTTPPort` → `parse_http_port`; non-identifier characters become `_`.
pub(crate) fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|j| chars[j]);
            let next = chars.get(i + 1).copied();
            let boundary = prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit())
                || (prev.is_some_and(|p| p.is_ascii_uppercase())
                    && next.is_some_and(|n| n.is_ascii_lowercase()));
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// `parse_port` → `ParsePort`; `Cache::get` → `CacheGet`.
pub(crate) fn pascal_case(name: &str) -> String {
    snake_case(name)
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// `returns_expected_value` → `returns expected value`.
pub(crate) fn sentence(name: &str) -> String {
    name.replace('_', " ")
}
