//! Architectural Enforcement Integration Tests
//!
//! This package holds tests that keep the framework core honest:
//! - No sleep() calls in the core's production code
//! - No UI toolkit or terminal crates in the core's dependency graph
//!
//! The helpers below walk source trees relative to the workspace root so the
//! tests behave the same from any working directory.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace root, two levels above this package
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// A line of production code
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line belongs to
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// Line text with any trailing `//` comment removed
    pub code: String,
}

impl std::fmt::Display for SourceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.number, self.code.trim())
    }
}

/// All `.rs` files under `dir` (relative to the workspace root)
pub fn rust_sources(dir: &str) -> Vec<PathBuf> {
    let path = workspace_root().join(dir);
    if !path.exists() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Production lines of a file: everything before its `#[cfg(test)]` module
///
/// Doc comments and line comments are skipped.
pub fn production_lines(path: &Path) -> Vec<SourceLine> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(idx, line)| SourceLine {
            path: path.to_path_buf(),
            number: idx + 1,
            code: line.split("//").next().unwrap_or(line).to_string(),
        })
        .collect()
}

/// Every dependency name a manifest declares
///
/// Covers `[dependencies]`, `[dev-dependencies]`, `[build-dependencies]`,
/// their `[dependencies.<name>]` spellings, and the same tables under
/// `[target.'cfg(..)']`. Renamed dependencies report their `package`.
pub fn declared_dependencies(manifest: &str) -> Vec<String> {
    match fs::read_to_string(workspace_root().join(manifest)) {
        Ok(content) => dependency_names(&content),
        Err(_) => Vec::new(),
    }
}

/// Dependency names in manifest text; unparsable manifests declare nothing
pub fn dependency_names(content: &str) -> Vec<String> {
    let Ok(manifest) = content.parse::<toml::Table>() else {
        return Vec::new();
    };

    let mut names = Vec::new();
    collect_tables(&manifest, &mut names);
    if let Some(targets) = manifest.get("target").and_then(|t| t.as_table()) {
        for target in targets.values().filter_map(|t| t.as_table()) {
            collect_tables(target, &mut names);
        }
    }
    names.sort();
    names.dedup();
    names
}

const DEPENDENCY_TABLES: &[&str] = &["dependencies", "dev-dependencies", "build-dependencies"];

fn collect_tables(table: &toml::Table, names: &mut Vec<String>) {
    for key in DEPENDENCY_TABLES {
        let Some(deps) = table.get(*key).and_then(|d| d.as_table()) else {
            continue;
        };
        for (name, spec) in deps {
            let package = spec
                .as_table()
                .and_then(|t| t.get("package"))
                .and_then(|p| p.as_str())
                .unwrap_or(name);
            names.push(package.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let mut file = std::env::temp_dir();
        file.push(format!("arch-enforcement-{}.rs", std::process::id()));
        fs::write(
            &file,
            "//! docs\nfn a() {} // trailing\n#[cfg(test)]\nmod tests { fn b() {} }\n",
        )
        .unwrap();

        let lines = production_lines(&file);
        let _ = fs::remove_file(&file);

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].number, 2);
        assert_eq!(lines[0].code.trim(), "fn a() {}");
    }

    #[test]
    fn test_dependency_names_cover_every_table() {
        let manifest = r#"
            [package]
            name = "sample"

            [dependencies]
            tokio = "1"

            [dependencies.winit]
            version = "0.29"

            [dev-dependencies]
            tempfile = "3"

            [target.'cfg(unix)'.dependencies]
            crossterm = "0.27"

            [target.'cfg(windows)'.build-dependencies]
            term = { version = "1", package = "ratatui" }
        "#;

        assert_eq!(
            dependency_names(manifest),
            vec!["crossterm", "ratatui", "tempfile", "tokio", "winit"]
        );
    }

    #[test]
    fn test_core_manifest_is_found() {
        assert!(declared_dependencies("caliburn/core/Cargo.toml").contains(&"tokio".to_string()));
    }
}
