//! Heuristic pattern detection over a scan result.
//!
//! Each rule is independent and fires at most once; there is no exclusivity
//! between detections, so a repository can match several architecture
//! patterns simultaneously. Naming rules require a minimum number of
//! matching files before firing, which keeps one-off files from producing
//! false positives.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::models::{DetectedPattern, PatternCategory, TreeItem, TreeItemKind};
use crate::scanner::ScanResult;

/// Minimum matching files before a naming rule fires.
const MIN_NAMING_MATCHES: usize = 3;

/// Run every rule set over the scan result and return all detections.
pub fn analyze_patterns(
    scan: &ScanResult,
    items: &[TreeItem],
    languages: &[String],
) -> Vec<DetectedPattern> {
    let files: Vec<&str> = items
        .iter()
        .filter(|i| i.kind == TreeItemKind::Blob)
        .map(|i| i.path.as_str())
        .collect();

    let mut patterns = Vec::new();
    patterns.extend(architecture_rules(scan, &files));
    patterns.extend(naming_rules(&files));
    patterns.extend(testing_rules(scan));
    patterns.extend(api_rules(scan));
    patterns.extend(state_rules(scan, languages));

    debug_assert!(patterns
        .iter()
        .all(|p| (0.0..=1.0).contains(&p.confidence)));
    patterns
}

fn dir_basenames(scan: &ScanResult) -> BTreeSet<String> {
    scan.all_directories
        .iter()
        .map(|d| d.rsplit('/').next().unwrap_or(d).to_lowercase())
        .collect()
}

fn dirs_matching<'a>(scan: &'a ScanResult, name: &str) -> Vec<&'a str> {
    scan.all_directories
        .iter()
        .filter(|d| d.rsplit('/').next().unwrap_or(d).eq_ignore_ascii_case(name))
        .map(|d| d.as_str())
        .collect()
}

fn pattern(
    category: PatternCategory,
    name: &str,
    description: &str,
    examples: Vec<String>,
    confidence: f64,
) -> DetectedPattern {
    DetectedPattern {
        category,
        name: name.to_string(),
        description: description.to_string(),
        examples,
        confidence,
    }
}

fn architecture_rules(scan: &ScanResult, files: &[&str]) -> Vec<DetectedPattern> {
    let mut patterns = Vec::new();
    let basenames = dir_basenames(scan);

    // Top-level apps/ and packages/, each with at least one file.
    let apps_populated = files.iter().any(|f| f.starts_with("apps/"));
    let packages_populated = files.iter().any(|f| f.starts_with("packages/"));
    if apps_populated && packages_populated {
        patterns.push(pattern(
            PatternCategory::Architecture,
            "Monorepo Structure",
            "Top-level apps/ and packages/ directories organize multiple workspace packages",
            vec!["apps".to_string(), "packages".to_string()],
            0.95,
        ));
    }

    if basenames.contains("controllers") && basenames.contains("models") && basenames.contains("views")
    {
        let mut examples: Vec<String> = Vec::new();
        for name in ["controllers", "models", "views"] {
            examples.extend(dirs_matching(scan, name).iter().map(|s| s.to_string()));
        }
        patterns.push(pattern(
            PatternCategory::Architecture,
            "MVC",
            "Controllers, models, and views are separated into dedicated directories",
            examples,
            0.9,
        ));
    }

    let has_domain = basenames.contains("domain") || basenames.contains("entities");
    let has_usecases = basenames.contains("use-cases")
        || basenames.contains("usecases")
        || basenames.contains("application");
    if has_domain && has_usecases {
        patterns.push(pattern(
            PatternCategory::Architecture,
            "Clean Architecture",
            "Domain entities are isolated from application use cases",
            scan.all_directories
                .iter()
                .filter(|d| {
                    let b = d.rsplit('/').next().unwrap_or(d).to_lowercase();
                    matches!(b.as_str(), "domain" | "entities" | "use-cases" | "usecases" | "application")
                })
                .cloned()
                .collect(),
            0.85,
        ));
    }

    if basenames.contains("components") {
        patterns.push(pattern(
            PatternCategory::Architecture,
            "Component-Based UI",
            "UI is organized into reusable components",
            dirs_matching(scan, "components")
                .iter()
                .map(|s| s.to_string())
                .collect(),
            0.8,
        ));
    }

    if basenames.contains("services") {
        patterns.push(pattern(
            PatternCategory::Architecture,
            "Service Layer Pattern",
            "Business logic is grouped into a dedicated service layer",
            dirs_matching(scan, "services")
                .iter()
                .map(|s| s.to_string())
                .collect(),
            0.8,
        ));
    }

    patterns
}

fn naming_rules(files: &[&str]) -> Vec<DetectedPattern> {
    static PASCAL: OnceLock<Regex> = OnceLock::new();
    static KEBAB: OnceLock<Regex> = OnceLock::new();
    static TEST_SUFFIX: OnceLock<Regex> = OnceLock::new();

    let pascal = PASCAL
        .get_or_init(|| Regex::new(r"^[A-Z][A-Za-z0-9]*\.(tsx|jsx|vue)$").unwrap());
    let kebab =
        KEBAB.get_or_init(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)+\.[a-z0-9.]+$").unwrap());
    let test_suffix =
        TEST_SUFFIX.get_or_init(|| Regex::new(r"\.(test|spec)\.[a-z]+$").unwrap());

    let basenames: Vec<&str> = files
        .iter()
        .map(|f| f.rsplit('/').next().unwrap_or(f))
        .collect();

    let mut patterns = Vec::new();

    let matching =
        |re: &Regex| -> Vec<String> {
            files
                .iter()
                .zip(basenames.iter())
                .filter(|(_, b)| re.is_match(b))
                .map(|(f, _)| f.to_string())
                .take(5)
                .collect()
        };

    let pascal_count = basenames.iter().filter(|b| pascal.is_match(b)).count();
    if pascal_count >= MIN_NAMING_MATCHES {
        patterns.push(pattern(
            PatternCategory::Naming,
            "PascalCase Component Files",
            "Component files are named in PascalCase",
            matching(pascal),
            0.8,
        ));
    }

    let kebab_count = basenames.iter().filter(|b| kebab.is_match(b)).count();
    if kebab_count >= MIN_NAMING_MATCHES {
        patterns.push(pattern(
            PatternCategory::Naming,
            "Kebab-Case Filenames",
            "Files are named in kebab-case",
            matching(kebab),
            0.7,
        ));
    }

    let test_count = basenames.iter().filter(|b| test_suffix.is_match(b)).count();
    if test_count >= MIN_NAMING_MATCHES {
        patterns.push(pattern(
            PatternCategory::Naming,
            "Test File Suffixes",
            "Tests are colocated using .test/.spec file suffixes",
            matching(test_suffix),
            0.8,
        ));
    }

    let barrel_count = basenames
        .iter()
        .zip(files.iter())
        .filter(|(b, f)| (**b == "index.ts" || **b == "index.js") && f.contains('/'))
        .count();
    if barrel_count >= MIN_NAMING_MATCHES {
        patterns.push(pattern(
            PatternCategory::Naming,
            "Barrel Module Exports",
            "Directories re-export their contents through index files",
            files
                .iter()
                .filter(|f| f.ends_with("/index.ts") || f.ends_with("/index.js"))
                .map(|f| f.to_string())
                .take(5)
                .collect(),
            0.7,
        ));
    }

    patterns
}

fn testing_rules(scan: &ScanResult) -> Vec<DetectedPattern> {
    let basenames = dir_basenames(scan);
    let mut patterns = Vec::new();

    let test_dirs: Vec<String> = ["tests", "test", "__tests__", "spec", "e2e"]
        .iter()
        .flat_map(|name| dirs_matching(scan, name))
        .map(|s| s.to_string())
        .collect();
    if !test_dirs.is_empty() {
        let conventional = basenames.contains("tests") || basenames.contains("__tests__");
        patterns.push(pattern(
            PatternCategory::Testing,
            "Dedicated Test Directories",
            "Tests live in conventional test directories",
            test_dirs,
            if conventional { 0.85 } else { 0.7 },
        ));
    }

    patterns
}

fn api_rules(scan: &ScanResult) -> Vec<DetectedPattern> {
    let mut patterns = Vec::new();

    let api_dirs = dirs_matching(scan, "api");
    if !api_dirs.is_empty() {
        patterns.push(pattern(
            PatternCategory::Api,
            "API Route Organization",
            "API endpoints are grouped under api/ directories",
            api_dirs.iter().map(|s| s.to_string()).collect(),
            0.75,
        ));
    }

    let graphql_dirs = dirs_matching(scan, "graphql");
    if !graphql_dirs.is_empty() {
        patterns.push(pattern(
            PatternCategory::Api,
            "GraphQL API",
            "GraphQL schema and resolvers are present",
            graphql_dirs.iter().map(|s| s.to_string()).collect(),
            0.85,
        ));
    }

    let trpc_dirs = dirs_matching(scan, "trpc");
    if !trpc_dirs.is_empty() {
        patterns.push(pattern(
            PatternCategory::Api,
            "tRPC API",
            "tRPC routers provide typed API procedures",
            trpc_dirs.iter().map(|s| s.to_string()).collect(),
            0.85,
        ));
    }

    patterns
}

fn state_rules(scan: &ScanResult, languages: &[String]) -> Vec<DetectedPattern> {
    let mut patterns = Vec::new();

    let store_dirs: Vec<String> = ["store", "stores"]
        .iter()
        .flat_map(|name| dirs_matching(scan, name))
        .map(|s| s.to_string())
        .collect();
    if !store_dirs.is_empty() {
        patterns.push(pattern(
            PatternCategory::State,
            "Centralized State Store",
            "Application state is managed in dedicated store modules",
            store_dirs,
            0.75,
        ));
    }

    let context_dirs = dirs_matching(scan, "contexts");
    if !context_dirs.is_empty() {
        patterns.push(pattern(
            PatternCategory::State,
            "Context-Based State",
            "Shared state flows through context providers",
            context_dirs.iter().map(|s| s.to_string()).collect(),
            0.7,
        ));
    }

    let hooks_dirs = dirs_matching(scan, "hooks");
    let is_js = languages
        .iter()
        .any(|l| l == "typescript" || l == "javascript");
    if !hooks_dirs.is_empty() && is_js {
        patterns.push(pattern(
            PatternCategory::State,
            "Custom Hooks",
            "Reusable stateful logic is extracted into custom hooks",
            hooks_dirs.iter().map(|s| s.to_string()).collect(),
            0.7,
        ));
    }

    patterns
}

/// Priority of an advisory improvement suggestion. Ordered so that
/// `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionPriority {
    Low,
    Medium,
    High,
}

/// An advisory improvement from the best-practice checklist. Not persisted
/// as a detected pattern.
#[derive(Debug, Clone, Serialize)]
pub struct PatternSuggestion {
    pub priority: SuggestionPriority,
    pub title: String,
    pub rationale: String,
}

/// Compare detections against a best-practice checklist and return a
/// prioritized improvement list (highest priority first).
pub fn suggest_patterns(detected: &[DetectedPattern]) -> Vec<PatternSuggestion> {
    let has = |category: PatternCategory| detected.iter().any(|p| p.category == category);
    let has_named = |name: &str| detected.iter().any(|p| p.name == name);

    let mut suggestions = Vec::new();

    if !has(PatternCategory::Testing) && !has_named("Test File Suffixes") {
        suggestions.push(PatternSuggestion {
            priority: SuggestionPriority::High,
            title: "Add colocated tests".to_string(),
            rationale: "No test directories or .test/.spec files were detected".to_string(),
        });
    }

    if !has(PatternCategory::Architecture) {
        suggestions.push(PatternSuggestion {
            priority: SuggestionPriority::Medium,
            title: "Establish a clear architectural convention".to_string(),
            rationale: "No recognizable architecture pattern was detected".to_string(),
        });
    }

    if !has(PatternCategory::Naming) {
        suggestions.push(PatternSuggestion {
            priority: SuggestionPriority::Medium,
            title: "Adopt a consistent file naming convention".to_string(),
            rationale: "No consistent naming convention was detected across files".to_string(),
        });
    }

    if has_named("Component-Based UI") && !has(PatternCategory::State) {
        suggestions.push(PatternSuggestion {
            priority: SuggestionPriority::Low,
            title: "Introduce a dedicated state management layer".to_string(),
            rationale: "Components are present but no state management convention was found"
                .to_string(),
        });
    }

    suggestions.sort_by(|a, b| b.priority.cmp(&a.priority));
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TreeItemKind;
    use crate::scanner::scan_tree;

    fn blob(path: &str) -> TreeItem {
        TreeItem {
            path: path.to_string(),
            kind: TreeItemKind::Blob,
            content_hash: String::new(),
            size: Some(10),
        }
    }

    fn analyze(paths: &[&str]) -> Vec<DetectedPattern> {
        let items: Vec<TreeItem> = paths.iter().map(|p| blob(p)).collect();
        let scan = scan_tree(&items, "main");
        analyze_patterns(&scan, &items, &["typescript".to_string()])
    }

    #[test]
    fn monorepo_detected_at_095() {
        let patterns = analyze(&["apps/web/package.json", "packages/ui/package.json"]);
        let monorepo = patterns
            .iter()
            .find(|p| p.name == "Monorepo Structure")
            .unwrap();
        assert_eq!(monorepo.confidence, 0.95);
        assert_eq!(monorepo.category, PatternCategory::Architecture);
    }

    #[test]
    fn monorepo_absent_without_both_directories() {
        let patterns = analyze(&["apps/web/package.json", "src/index.ts"]);
        assert!(!patterns.iter().any(|p| p.name == "Monorepo Structure"));
    }

    #[test]
    fn mvc_detected_at_09() {
        let patterns = analyze(&[
            "app/controllers/users.rb",
            "app/models/user.rb",
            "app/views/users.erb",
        ]);
        let mvc = patterns.iter().find(|p| p.name == "MVC").unwrap();
        assert_eq!(mvc.confidence, 0.9);
    }

    #[test]
    fn clean_architecture_detected_at_085() {
        let patterns = analyze(&["src/domain/order.ts", "src/use-cases/place-order.ts"]);
        let clean = patterns
            .iter()
            .find(|p| p.name == "Clean Architecture")
            .unwrap();
        assert_eq!(clean.confidence, 0.85);
    }

    #[test]
    fn multiple_architectures_coexist() {
        let patterns = analyze(&[
            "apps/web/src/components/App.tsx",
            "packages/core/src/services/order.ts",
        ]);
        assert!(patterns.iter().any(|p| p.name == "Monorepo Structure"));
        assert!(patterns.iter().any(|p| p.name == "Component-Based UI"));
        assert!(patterns.iter().any(|p| p.name == "Service Layer Pattern"));
    }

    #[test]
    fn naming_rule_needs_minimum_count() {
        let two = analyze(&["src/Button.tsx", "src/Card.tsx", "src/util.ts"]);
        assert!(!two.iter().any(|p| p.name == "PascalCase Component Files"));

        let three = analyze(&["src/Button.tsx", "src/Card.tsx", "src/Modal.tsx"]);
        assert!(three.iter().any(|p| p.name == "PascalCase Component Files"));
    }

    #[test]
    fn test_suffix_rule_fires() {
        let patterns = analyze(&[
            "src/a.test.ts",
            "src/b.test.ts",
            "src/c.spec.ts",
        ]);
        assert!(patterns.iter().any(|p| p.name == "Test File Suffixes"));
    }

    #[test]
    fn state_and_api_rules() {
        let patterns = analyze(&[
            "src/store/auth.ts",
            "src/hooks/useAuth.ts",
            "src/api/users.ts",
        ]);
        assert!(patterns.iter().any(|p| p.name == "Centralized State Store"));
        assert!(patterns.iter().any(|p| p.name == "Custom Hooks"));
        assert!(patterns.iter().any(|p| p.name == "API Route Organization"));
    }

    #[test]
    fn confidences_within_unit_interval() {
        let patterns = analyze(&[
            "apps/a/x.ts",
            "packages/b/y.ts",
            "src/components/App.tsx",
            "src/store/s.ts",
            "tests/t.test.ts",
        ]);
        assert!(!patterns.is_empty());
        for p in &patterns {
            assert!((0.0..=1.0).contains(&p.confidence), "{}", p.name);
        }
    }

    #[test]
    fn suggestions_flag_missing_tests_first() {
        let patterns = analyze(&["src/components/App.tsx", "src/components/Nav.tsx"]);
        let suggestions = suggest_patterns(&patterns);
        assert_eq!(suggestions[0].priority, SuggestionPriority::High);
        assert!(suggestions[0].title.contains("tests"));
    }

    #[test]
    fn no_suggestion_when_tests_present() {
        let patterns = analyze(&[
            "tests/a.test.ts",
            "tests/b.test.ts",
            "tests/c.test.ts",
        ]);
        let suggestions = suggest_patterns(&patterns);
        assert!(!suggestions
            .iter()
            .any(|s| s.title == "Add colocated tests"));
    }
}
