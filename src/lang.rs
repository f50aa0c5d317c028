//! Language detection from file extensions.

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Source languages recognised by the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Python,
    JavaScript,
    TypeScript,
    CSharp,
    Cpp,
    C,
    Rust,
    Go,
    Java,
    Ruby,
    Kotlin,
    Markdown,
}

const ALL: [Lang; 12] = [
    Lang::Python,
    Lang::JavaScript,
    Lang::TypeScript,
    Lang::CSharp,
    Lang::Cpp,
    Lang::C,
    Lang::Rust,
    Lang::Go,
    Lang::Java,
    Lang::Ruby,
    Lang::Kotlin,
    Lang::Markdown,
];

impl Lang {
    pub fn all() -> &'static [Lang] {
        &ALL
    }

    /// Detect language from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        ALL.iter()
            .copied()
            .find(|l| l.extensions().contains(&ext.as_str()))
    }

    /// Parse a canonical language name (as stored in chunk metadata).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        match name.as_str() {
            "c#" | "cs" => Some(Self::CSharp),
            "c++" => Some(Self::Cpp),
            "js" => Some(Self::JavaScript),
            "ts" => Some(Self::TypeScript),
            "py" => Some(Self::Python),
            _ => ALL.iter().copied().find(|l| l.name() == name),
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Python => &["py", "pyi"],
            Self::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Self::TypeScript => &["ts", "tsx", "mts", "cts"],
            Self::CSharp => &["cs"],
            Self::Cpp => &["cpp", "cc", "cxx", "hpp", "hxx", "hh"],
            Self::C => &["c", "h"],
            Self::Rust => &["rs"],
            Self::Go => &["go"],
            Self::Java => &["java"],
            Self::Ruby => &["rb"],
            Self::Kotlin => &["kt", "kts"],
            Self::Markdown => &["md", "markdown"],
        }
    }

    /// Canonical lowercase name, used as the chunk language tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::CSharp => "csharp",
            Self::Cpp => "cpp",
            Self::C => "c",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::Ruby => "ruby",
            Self::Kotlin => "kotlin",
            Self::Markdown => "markdown",
        }
    }

    /// Whether the test generator has templates for this language.
    pub fn supports_testgen(&self) -> bool {
        matches!(
            self,
            Self::Python | Self::JavaScript | Self::TypeScript | Self::CSharp | Self::Cpp
        )
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_from_path() {
        assert_eq!(Lang::from_path(Path::new("src/app.py")), Some(Lang::Python));
        assert_eq!(Lang::from_path(Path::new("a/b/C.CS")), Some(Lang::CSharp));
        assert_eq!(Lang::from_path(Path::new("lib.hpp")), Some(Lang::Cpp));
        assert_eq!(Lang::from_path(Path::new("Makefile")), None);
        assert_eq!(Lang::from_path(Path::new("image.png")), None);
    }

    #[test]
    fn test_name_roundtrip() {
        for lang in Lang::all() {
            assert_eq!(Lang::from_name(lang.name()), Some(*lang));
        }
        assert_eq!(Lang::from_name("C#"), Some(Lang::CSharp));
    }

    #[test]
    fn test_extensions_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for lang in Lang::all() {
            for ext in lang.extensions() {
                assert!(seen.insert(*ext), "duplicate extension {}", ext);
            }
        }
    }

    #[test]
    fn test_testgen_support() {
        assert!(Lang::Python.supports_testgen());
        assert!(Lang::Cpp.supports_testgen());
        assert!(!Lang::Rust.supports_testgen());
        assert!(!Lang::Markdown.supports_testgen());
    }
}
