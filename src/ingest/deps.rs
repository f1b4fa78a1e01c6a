//! Per-language dependency extraction.
//!
//! Line-anchored pattern matching over import/include statements, not full
//! parsing. For dotted imports only the top-level segment is recorded.
//! Output is deduplicated and lexicographically sorted; an unrecognized
//! language yields an empty set.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Source languages with recognized import forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    Java,
    Cpp,
    Rust,
    JavaScript,
    Unknown,
}

impl Language {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_lowercase().as_str() {
            "python" | "py" => Language::Python,
            "java" => Language::Java,
            "cpp" | "c++" | "c" => Language::Cpp,
            "rust" | "rs" => Language::Rust,
            "javascript" | "js" | "jsx" | "typescript" | "ts" | "tsx" => Language::JavaScript,
            _ => Language::Unknown,
        }
    }
}

static PYTHON_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:from\s+(\S+)\s+)?import\s+(\S+)").unwrap());

static JAVA_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^import\s+(?:static\s+)?([\w.]+)").unwrap());

static CPP_INCLUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^#include\s+[<"]([\w./]+)[>"]"#).unwrap());

static RUST_USE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:pub\s+)?use\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());

static JS_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^import\s+.*?from\s+['"]([^'"]+)['"]|require\(\s*['"]([^'"]+)['"]\s*\)"#)
        .unwrap()
});

/// Extract imported module roots from snippet text.
///
/// Running this twice on the same text yields the same sorted set.
pub fn extract_dependencies(code: &str, language: Language) -> Vec<String> {
    let mut deps: BTreeSet<String> = BTreeSet::new();

    for raw_line in code.split('\n') {
        let line = raw_line.trim();
        match language {
            Language::Python => {
                if let Some(caps) = PYTHON_IMPORT.captures(line) {
                    // `from a.b import c` and `import a.b` both record `a`
                    let module = caps
                        .get(1)
                        .or_else(|| caps.get(2))
                        .map(|m| m.as_str())
                        .unwrap_or_default();
                    if let Some(root) = module_root(module, '.') {
                        deps.insert(root);
                    }
                }
            }
            Language::Java => {
                if let Some(caps) = JAVA_IMPORT.captures(line) {
                    if let Some(root) = module_root(&caps[1], '.') {
                        deps.insert(root);
                    }
                }
            }
            Language::Cpp => {
                if let Some(caps) = CPP_INCLUDE.captures(line) {
                    deps.insert(caps[1].to_string());
                }
            }
            Language::Rust => {
                if let Some(caps) = RUST_USE.captures(line) {
                    let root = &caps[1];
                    // Paths rooted in the crate itself are not dependencies
                    if !matches!(root, "crate" | "self" | "super") {
                        deps.insert(root.to_string());
                    }
                }
            }
            Language::JavaScript => {
                if let Some(caps) = JS_IMPORT.captures(line) {
                    let module = caps
                        .get(1)
                        .or_else(|| caps.get(2))
                        .map(|m| m.as_str())
                        .unwrap_or_default();
                    if let Some(root) = js_package_root(module) {
                        deps.insert(root);
                    }
                }
            }
            Language::Unknown => {}
        }
    }

    deps.into_iter().collect()
}

fn module_root(module: &str, sep: char) -> Option<String> {
    let root = module.split(sep).next().unwrap_or_default();
    if root.is_empty() {
        None
    } else {
        Some(root.to_string())
    }
}

/// Package root of a JS import specifier. Relative paths are not
/// dependencies; scoped packages keep the `@scope/name` pair.
fn js_package_root(module: &str) -> Option<String> {
    if module.is_empty() || module.starts_with('.') || module.starts_with('/') {
        return None;
    }
    if let Some(rest) = module.strip_prefix('@') {
        let mut parts = rest.splitn(3, '/');
        let scope = parts.next()?;
        let name = parts.next()?;
        return Some(format!("@{scope}/{name}"));
    }
    module_root(module, '/')
}
