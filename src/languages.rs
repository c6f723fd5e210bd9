//! Per-language boundary detection for the chunker.
//!
//! This is a heuristic stand-in for real parsing: each language family gets
//! a table of line-anchored regexes that mark declaration boundaries
//! (functions, classes, interfaces, modules). The dispatch is keyed by a
//! [`Language`] tag so a future real parser can replace a family's rules
//! without touching the chunking pipeline.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::ChunkKind;

/// Language family used to select boundary and import rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Rust,
    Go,
    Java,
    Ruby,
    /// No boundary rules; the chunker falls back to line windows.
    Other,
}

impl Language {
    /// Resolve a language from an explicit hint (e.g. `"python"`).
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.to_lowercase().as_str() {
            "typescript" | "ts" | "tsx" => Some(Self::TypeScript),
            "javascript" | "js" | "jsx" => Some(Self::JavaScript),
            "python" | "py" => Some(Self::Python),
            "rust" | "rs" => Some(Self::Rust),
            "go" | "golang" => Some(Self::Go),
            "java" => Some(Self::Java),
            "ruby" | "rb" => Some(Self::Ruby),
            _ => None,
        }
    }

    /// Resolve a language from a file path's extension.
    pub fn from_path(path: &str) -> Self {
        let ext = path.rsplit('.').next().unwrap_or("");
        match ext {
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "py" | "pyi" => Self::Python,
            "rs" => Self::Rust,
            "go" => Self::Go,
            "java" => Self::Java,
            "rb" | "rake" => Self::Ruby,
            _ => Self::Other,
        }
    }

    /// Canonical lowercase name, as stored on chunks and embeddings.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::TypeScript => Some("typescript"),
            Self::JavaScript => Some("javascript"),
            Self::Python => Some("python"),
            Self::Rust => Some("rust"),
            Self::Go => Some("go"),
            Self::Java => Some("java"),
            Self::Ruby => Some("ruby"),
            Self::Other => None,
        }
    }
}

/// One boundary rule: a line-anchored regex with a `name` capture group.
pub struct BoundaryRule {
    pub regex: Regex,
    pub kind: ChunkKind,
}

fn rule(pattern: &str, kind: ChunkKind) -> BoundaryRule {
    BoundaryRule {
        regex: Regex::new(pattern).expect("invalid boundary pattern"),
        kind,
    }
}

fn ts_rules() -> &'static [BoundaryRule] {
    static RULES: OnceLock<Vec<BoundaryRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            rule(
                r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>[A-Za-z_$][\w$]*)",
                ChunkKind::Function,
            ),
            rule(
                r"^\s*(?:export\s+)?(?:abstract\s+)?class\s+(?P<name>[A-Za-z_$][\w$]*)",
                ChunkKind::Class,
            ),
            rule(
                r"^\s*(?:export\s+)?interface\s+(?P<name>[A-Za-z_$][\w$]*)",
                ChunkKind::Class,
            ),
            rule(
                r"^\s*(?:export\s+)?const\s+(?P<name>[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s*)?\(",
                ChunkKind::Function,
            ),
            rule(
                r"^\s*(?:export\s+)?type\s+(?P<name>[A-Za-z_$][\w$]*)\s*=",
                ChunkKind::Section,
            ),
        ]
    })
}

fn python_rules() -> &'static [BoundaryRule] {
    static RULES: OnceLock<Vec<BoundaryRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            rule(r"^(?:async\s+)?def\s+(?P<name>\w+)", ChunkKind::Function),
            rule(r"^class\s+(?P<name>\w+)", ChunkKind::Class),
        ]
    })
}

fn rust_rules() -> &'static [BoundaryRule] {
    static RULES: OnceLock<Vec<BoundaryRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            rule(
                r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+(?P<name>\w+)",
                ChunkKind::Function,
            ),
            rule(
                r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|union)\s+(?P<name>\w+)",
                ChunkKind::Class,
            ),
            rule(
                r"^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+(?P<name>\w+)",
                ChunkKind::Module,
            ),
            rule(r"^impl\b.*?\bfor\s+(?P<name>\w+)", ChunkKind::Class),
            rule(r"^impl(?:<[^>]*>)?\s+(?P<name>\w+)", ChunkKind::Class),
        ]
    })
}

fn go_rules() -> &'static [BoundaryRule] {
    static RULES: OnceLock<Vec<BoundaryRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            rule(
                r"^func\s+(?:\([^)]*\)\s*)?(?P<name>\w+)",
                ChunkKind::Function,
            ),
            rule(
                r"^type\s+(?P<name>\w+)\s+(?:struct|interface)",
                ChunkKind::Class,
            ),
        ]
    })
}

fn java_rules() -> &'static [BoundaryRule] {
    static RULES: OnceLock<Vec<BoundaryRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![rule(
            r"^\s*(?:public|protected|private)?\s*(?:static\s+)?(?:final\s+)?(?:abstract\s+)?(?:class|interface|enum|record)\s+(?P<name>\w+)",
            ChunkKind::Class,
        )]
    })
}

fn ruby_rules() -> &'static [BoundaryRule] {
    static RULES: OnceLock<Vec<BoundaryRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            rule(r"^\s*def\s+(?P<name>[\w.?!]+)", ChunkKind::Function),
            rule(r"^\s*class\s+(?P<name>[\w:]+)", ChunkKind::Class),
            rule(r"^\s*module\s+(?P<name>[\w:]+)", ChunkKind::Module),
        ]
    })
}

/// Boundary rules for a language. Empty for [`Language::Other`].
pub fn boundary_rules(language: Language) -> &'static [BoundaryRule] {
    match language {
        Language::TypeScript | Language::JavaScript => ts_rules(),
        Language::Python => python_rules(),
        Language::Rust => rust_rules(),
        Language::Go => go_rules(),
        Language::Java => java_rules(),
        Language::Ruby => ruby_rules(),
        Language::Other => &[],
    }
}

/// Match a line against a language's boundary rules.
///
/// Returns the chunk kind and captured declaration name of the first rule
/// that matches, or `None` when the line is not a boundary.
pub fn match_boundary(language: Language, line: &str) -> Option<(ChunkKind, Option<String>)> {
    for rule in boundary_rules(language) {
        if let Some(caps) = rule.regex.captures(line) {
            let name = caps.name("name").map(|m| m.as_str().to_string());
            return Some((rule.kind, name));
        }
    }
    None
}

/// Extract imported module names from source text, line by line.
pub fn extract_imports(language: Language, content: &str) -> Vec<String> {
    static TS_IMPORT: OnceLock<Regex> = OnceLock::new();
    static PY_IMPORT: OnceLock<Regex> = OnceLock::new();
    static RUST_USE: OnceLock<Regex> = OnceLock::new();
    static GO_IMPORT: OnceLock<Regex> = OnceLock::new();

    let mut imports = Vec::new();
    for line in content.lines() {
        let captured = match language {
            Language::TypeScript | Language::JavaScript => TS_IMPORT
                .get_or_init(|| {
                    Regex::new(r#"^\s*import\s+.*?from\s+['"](?P<module>[^'"]+)['"]"#).unwrap()
                })
                .captures(line),
            Language::Python => PY_IMPORT
                .get_or_init(|| {
                    Regex::new(r"^\s*(?:from\s+(?P<module>[\w.]+)\s+import|import\s+(?P<plain>[\w.]+))")
                        .unwrap()
                })
                .captures(line),
            Language::Rust => RUST_USE
                .get_or_init(|| Regex::new(r"^\s*(?:pub\s+)?use\s+(?P<module>[\w:]+)").unwrap())
                .captures(line),
            Language::Go => GO_IMPORT
                .get_or_init(|| Regex::new(r#"^\s*(?:import\s+)?"(?P<module>[^"]+)"\s*$"#).unwrap())
                .captures(line),
            _ => None,
        };

        if let Some(caps) = captured {
            let module = caps
                .name("module")
                .or_else(|| caps.name("plain"))
                .map(|m| m.as_str().to_string());
            if let Some(m) = module {
                if !imports.contains(&m) {
                    imports.push(m);
                }
            }
        }
    }
    imports
}

/// Extract exported declaration names from source text, line by line.
///
/// Only meaningful for languages with explicit export syntax; others
/// return an empty list.
pub fn extract_exports(language: Language, content: &str) -> Vec<String> {
    static TS_EXPORT: OnceLock<Regex> = OnceLock::new();

    let mut exports = Vec::new();
    if matches!(language, Language::TypeScript | Language::JavaScript) {
        let re = TS_EXPORT.get_or_init(|| {
            Regex::new(
                r"^\s*export\s+(?:default\s+)?(?:async\s+)?(?:function|class|interface|const|let|var|type|enum)\s+(?P<name>[A-Za-z_$][\w$]*)",
            )
            .unwrap()
        });
        for line in content.lines() {
            if let Some(caps) = re.captures(line) {
                if let Some(name) = caps.name("name") {
                    let name = name.as_str().to_string();
                    if !exports.contains(&name) {
                        exports.push(name);
                    }
                }
            }
        }
    }
    exports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_from_path() {
        assert_eq!(Language::from_path("src/app.tsx"), Language::TypeScript);
        assert_eq!(Language::from_path("lib/util.py"), Language::Python);
        assert_eq!(Language::from_path("main.rs"), Language::Rust);
        assert_eq!(Language::from_path("README.md"), Language::Other);
    }

    #[test]
    fn hint_overrides() {
        assert_eq!(Language::from_hint("ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_hint("brainfuck"), None);
    }

    #[test]
    fn ts_function_boundary() {
        let (kind, name) =
            match_boundary(Language::TypeScript, "export async function loadUser(id: string) {")
                .unwrap();
        assert_eq!(kind, ChunkKind::Function);
        assert_eq!(name.as_deref(), Some("loadUser"));
    }

    #[test]
    fn ts_arrow_const_boundary() {
        let (kind, name) =
            match_boundary(Language::TypeScript, "export const useAuth = () => {").unwrap();
        assert_eq!(kind, ChunkKind::Function);
        assert_eq!(name.as_deref(), Some("useAuth"));
    }

    #[test]
    fn python_class_boundary() {
        let (kind, name) = match_boundary(Language::Python, "class OrderService:").unwrap();
        assert_eq!(kind, ChunkKind::Class);
        assert_eq!(name.as_deref(), Some("OrderService"));
    }

    #[test]
    fn rust_fn_and_impl_boundaries() {
        let (kind, _) = match_boundary(Language::Rust, "pub async fn ingest() -> Result<()> {").unwrap();
        assert_eq!(kind, ChunkKind::Function);
        let (kind, name) = match_boundary(Language::Rust, "impl Display for Token {").unwrap();
        assert_eq!(kind, ChunkKind::Class);
        assert_eq!(name.as_deref(), Some("Token"));
    }

    #[test]
    fn plain_line_is_not_boundary() {
        assert!(match_boundary(Language::TypeScript, "  return value + 1;").is_none());
        assert!(match_boundary(Language::Other, "def anything():").is_none());
    }

    #[test]
    fn ts_imports_extracted() {
        let src = "import { useState } from 'react';\nimport axios from 'axios';\nconst x = 1;\n";
        let imports = extract_imports(Language::TypeScript, src);
        assert_eq!(imports, vec!["react".to_string(), "axios".to_string()]);
    }

    #[test]
    fn python_imports_extracted() {
        let src = "import os\nfrom collections import defaultdict\n";
        let imports = extract_imports(Language::Python, src);
        assert_eq!(imports, vec!["os".to_string(), "collections".to_string()]);
    }

    #[test]
    fn ts_exports_extracted() {
        let src = "export function render() {}\nexport const theme = {};\nfunction hidden() {}\n";
        let exports = extract_exports(Language::TypeScript, src);
        assert_eq!(exports, vec!["render".to_string(), "theme".to_string()]);
    }
}
