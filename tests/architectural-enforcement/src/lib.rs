//! Architectural Enforcement Helpers
//!
//! Shared scanning code for the integration tests in `tests/`, which enforce
//! the workspace's structural rules:
//! - no sleeping in production code (wait on I/O or a deadline instead)
//! - the brain core stays transport-agnostic (no WebSocket crates)
//!
//! Production code is everything in a source file before its
//! `#[cfg(test)]` module.

use std::fs;
use std::path::{Path, PathBuf};

/// Root of the workspace, resolved from this crate's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|_| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../..")))
}

/// All `.rs` files under `dir`, relative to the workspace root
#[must_use]
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let path = workspace_root().join(dir);
    if !path.exists() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// A line of production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    /// 1-based line number
    pub number: usize,
    /// The line with any `//` comment removed
    pub code: String,
}

/// Production lines of `source`: stops at `#[cfg(test)]`, drops comments
#[must_use]
pub fn production_lines(source: &str) -> Vec<CodeLine> {
    source
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .filter_map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line).trim_end();
            if code.trim().is_empty() {
                None
            } else {
                Some(CodeLine {
                    number: idx + 1,
                    code: code.to_string(),
                })
            }
        })
        .collect()
}

/// Every production line under `dir` for which `is_violation` holds,
/// formatted as `path:line - code`
#[must_use]
pub fn find_violations(dir: &str, is_violation: impl Fn(&str) -> bool) -> Vec<String> {
    let mut violations = Vec::new();
    for file in rust_files(dir) {
        let Ok(content) = fs::read_to_string(&file) else {
            continue;
        };
        for line in production_lines(&content) {
            if is_violation(&line.code) {
                violations.push(format!(
                    "{}:{} - {}",
                    file.display(),
                    line.number,
                    line.code.trim()
                ));
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let source = "fn a() {}\n// note\nfn b() {} // trailing\n#[cfg(test)]\nmod tests {}\n";
        let lines = production_lines(source);

        assert_eq!(
            lines,
            vec![
                CodeLine {
                    number: 1,
                    code: "fn a() {}".to_string()
                },
                CodeLine {
                    number: 3,
                    code: "fn b() {}".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_workspace_root_contains_brain() {
        assert!(workspace_root().join("brain/core/Cargo.toml").exists());
        assert!(!rust_files("brain/core/src").is_empty());
    }
}
