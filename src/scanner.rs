//! Source tree walker.
//!
//! Walks `indexing.root`, drops excluded paths and unknown extensions, and
//! records files above `max_file_size` without ever opening them. Output is
//! sorted by relative path.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::Path;
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::config::IndexingConfig;
use crate::lang::Lang;
use crate::models::ScannedFile;

const BUILTIN_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/target/**",
    "**/node_modules/**",
    "**/__pycache__/**",
    "**/.venv/**",
    "**/dist/**",
    "**/build/**",
];

#[derive(Debug, Default)]
pub struct ScanReport {
    /// Files eligible for indexing, sorted by `rel_path`.
    pub files: Vec<ScannedFile>,
    /// Relative paths of files over the size limit.
    pub skipped_large: Vec<String>,
}

pub fn scan(config: &IndexingConfig) -> Result<ScanReport> {
    let root = &config.root;
    if !root.exists() {
        bail!("Indexing root does not exist: {}", root.display());
    }

    let mut excludes: Vec<String> = BUILTIN_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let extensions: HashSet<String> = config
        .include_extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let mut report = ScanReport::default();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }

        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(e) => e.to_lowercase(),
            None => continue,
        };
        if !extensions.contains(&ext) {
            continue;
        }
        let Some(lang) = Lang::from_extension(&ext) else {
            continue;
        };

        let metadata = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        if metadata.len() > config.max_file_size {
            tracing::debug!(path = %rel_str, size = metadata.len(), "skipping oversized file");
            report.skipped_large.push(rel_str);
            continue;
        }

        report.files.push(ScannedFile {
            rel_path: rel_str,
            abs_path: path.to_path_buf(),
            language: lang.name().to_string(),
            size_bytes: metadata.len(),
            modified_at: modified_secs(&metadata),
        });
    }

    report.files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    report.skipped_large.sort();

    Ok(report)
}

fn modified_secs(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid exclude glob: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}

/// Read a scanned file as UTF-8. Returns `None` for binary or non-UTF-8 content.
pub fn read_source(path: &Path) -> Result<Option<String>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if bytes.contains(&0) {
        return Ok(None);
    }
    Ok(String::from_utf8(bytes).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config_for(root: &Path) -> IndexingConfig {
        IndexingConfig {
            root: root.to_path_buf(),
            ..IndexingConfig::default()
        }
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("src/b.py"), "x = 1\n").unwrap();
        fs::write(root.join("src/a.ts"), "let x = 1;\n").unwrap();
        fs::write(root.join("notes.bin"), "data").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "1").unwrap();

        let report = scan(&config_for(root)).unwrap();
        let paths: Vec<_> = report.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.ts", "src/b.py"]);
        assert_eq!(report.files[0].language, "typescript");
        assert_eq!(report.files[1].language, "python");
    }

    #[test]
    fn test_oversized_files_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("small.py"), "x = 1\n").unwrap();
        fs::write(root.join("big.py"), "y".repeat(2048)).unwrap();

        let mut config = config_for(root);
        config.max_file_size = 1024;
        let report = scan(&config).unwrap();

        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].rel_path, "small.py");
        assert_eq!(report.skipped_large, vec!["big.py".to_string()]);
    }

    #[test]
    fn test_exclude_globs_and_extension_filter() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("gen")).unwrap();
        fs::write(root.join("gen/out.py"), "x").unwrap();
        fs::write(root.join("keep.py"), "x").unwrap();
        fs::write(root.join("keep.rs"), "x").unwrap();

        let mut config = config_for(root);
        config.exclude_globs = vec!["gen/**".to_string()];
        config.include_extensions = vec![".py".to_string()];
        let report = scan(&config).unwrap();
        let paths: Vec<_> = report.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["keep.py"]);
    }

    #[test]
    fn test_missing_root_is_error() {
        let config = config_for(Path::new("/definitely/not/here"));
        assert!(scan(&config).is_err());
    }

    #[test]
    fn test_read_source_rejects_binary() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = tmp.path().join("x.py");
        fs::write(&bin, [0x66u8, 0x00, 0x67]).unwrap();
        assert_eq!(read_source(&bin).unwrap(), None);

        let txt = tmp.path().join("y.py");
        fs::write(&txt, "ok").unwrap();
        assert_eq!(read_source(&txt).unwrap().as_deref(), Some("ok"));
    }
}
