//! Architectural Enforcement Integration Tests
//!
//! This package scans the production sources of the workspace and enforces
//! rules that the compiler cannot:
//! - No sleep() calls in production code
//! - No blocking file I/O inside async functions
//! - No global mutable state (polls live in an explicit registry)
//! - No unwrap()/expect() outside tests
//!
//! The scanners are line based. Everything from the first `#[cfg(test)]`
//! line of a file onwards is treated as test code.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["pollbot/core/src", "pollbot/daemon/src"];

/// Workspace root (two levels above this package)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// A rule violation at one source line
#[derive(Debug, Clone)]
pub struct Violation {
    /// File the line is in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
    /// What rule it breaks
    pub reason: &'static str,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.reason,
            self.text
        )
    }
}

/// Kind of function a line sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnKind {
    /// `async fn`
    Async,
    /// plain `fn`
    Sync,
}

/// One production line handed to a rule
pub struct LineContext<'a> {
    /// All lines of the file
    pub lines: &'a [&'a str],
    /// 0-based index of this line
    pub index: usize,
    /// The line with any `//` comment removed
    pub code: &'a str,
}

impl LineContext<'_> {
    /// Function the line is inside, if any
    #[must_use]
    pub fn enclosing_fn(&self) -> Option<FnKind> {
        enclosing_fn(self.lines, self.index)
    }
}

/// Strip a trailing `//` comment (including doc comments)
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Number of leading lines that are production code
#[must_use]
pub fn production_len(lines: &[&str]) -> usize {
    lines
        .iter()
        .position(|l| l.trim_start().starts_with("#[cfg(test)]"))
        .unwrap_or(lines.len())
}

/// Find the nearest function definition above `index`
#[must_use]
pub fn enclosing_fn(lines: &[&str], index: usize) -> Option<FnKind> {
    for line in lines[..=index].iter().rev() {
        let code = code_part(line);
        if code.contains("async fn ") {
            return Some(FnKind::Async);
        }
        if code.contains("fn ") {
            return Some(FnKind::Sync);
        }
        let trimmed = code.trim_start();
        if trimmed.starts_with("mod ") || (trimmed.starts_with("impl") && code.contains('{')) {
            return None;
        }
    }
    None
}

/// All `.rs` files below `dir`
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// Run `rule` over every production line in `source`
pub fn scan_source<F>(path: &Path, source: &str, rule: &F) -> Vec<Violation>
where
    F: Fn(&LineContext<'_>) -> Option<&'static str>,
{
    let lines: Vec<&str> = source.lines().collect();
    let mut violations = Vec::new();

    for index in 0..production_len(&lines) {
        let context = LineContext {
            lines: &lines,
            index,
            code: code_part(lines[index]),
        };
        if let Some(reason) = rule(&context) {
            violations.push(Violation {
                path: path.to_path_buf(),
                line: index + 1,
                text: lines[index].trim().to_string(),
                reason,
            });
        }
    }
    violations
}

/// Run `rule` over every production file in the workspace
///
/// # Panics
///
/// If a production directory is missing, so a moved crate cannot silently
/// disable the checks.
pub fn scan_workspace<F>(rule: F) -> Vec<Violation>
where
    F: Fn(&LineContext<'_>) -> Option<&'static str>,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        let dir = root.join(dir);
        assert!(dir.is_dir(), "missing production directory {}", dir.display());
        for file in rust_files(&dir) {
            let Ok(source) = fs::read_to_string(&file) else {
                continue;
            };
            violations.extend(scan_source(&file, &source, &rule));
        }
    }
    violations
}

/// Panic with a readable report if there are violations
///
/// # Panics
///
/// When `violations` is not empty.
pub fn assert_clean(rule_name: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} {rule_name} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enclosing_fn_detection() {
        let code = [
            "impl Store {",
            "    async fn load(&self) {",
            "        let x = 1;",
            "    }",
            "    fn sync_helper() {",
            "        let y = 2;",
            "    }",
            "}",
        ];
        assert_eq!(enclosing_fn(&code, 2), Some(FnKind::Async));
        assert_eq!(enclosing_fn(&code, 5), Some(FnKind::Sync));
        assert_eq!(enclosing_fn(&code, 0), None);
    }

    #[test]
    fn test_test_module_is_skipped() {
        let source = "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() { x.unwrap(); }\n}\n";
        let violations = scan_source(Path::new("x.rs"), source, &|ctx| {
            ctx.code.contains(".unwrap()").then_some("unwrap")
        });
        assert!(violations.is_empty());
    }

    #[test]
    fn test_comments_are_ignored() {
        let source = "fn a() {\n    // call thread::sleep( here\n    let b = 1; /// sleep(\n}\n";
        let violations = scan_source(Path::new("x.rs"), source, &|ctx| {
            ctx.code.contains("sleep(").then_some("sleep")
        });
        assert!(violations.is_empty());
    }

    #[test]
    fn test_violation_display() {
        let source = "fn a() {\n    std::thread::sleep(d);\n}\n";
        let violations = scan_source(Path::new("src/a.rs"), source, &|ctx| {
            ctx.code.contains("sleep(").then_some("sleep")
        });
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].to_string(),
            "src/a.rs:2 - sleep: std::thread::sleep(d);"
        );
    }
}
