//! Repository tree scanner.
//!
//! Turns a flat tree listing into a [`ScanResult`]: a directory map with
//! responsibility labels, key files ranked by importance, entry points,
//! detected frameworks/build tools/test frameworks/package manager, and two
//! template-filled free-text summaries. Detection is purely presence-based
//! over file paths; no file content is read and no model is called here.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{DirectoryInfo, ImportanceTier, KeyFile, TreeItem, TreeItemKind};

/// Output of one scan over a tree listing.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Labeled directories only. Unlabeled directories are tracked during
    /// the scan but omitted here.
    pub directory_map: BTreeMap<String, DirectoryInfo>,
    pub key_files: Vec<KeyFile>,
    pub entry_points: Vec<String>,
    pub frameworks: Vec<String>,
    pub build_tools: Vec<String>,
    pub testing_frameworks: Vec<String>,
    pub package_manager: Option<String>,
    pub repo_summary: String,
    pub architecture_summary: String,
    /// Every directory seen as a path prefix, labeled or not.
    pub all_directories: BTreeSet<String>,
}

/// Responsibility labels keyed by lower-cased directory basename.
const DIRECTORY_RESPONSIBILITIES: &[(&str, &str)] = &[
    ("src", "Application source"),
    ("lib", "Library code"),
    ("app", "Application routes and entries"),
    ("apps", "Application packages"),
    ("packages", "Shared workspace packages"),
    ("components", "UI components"),
    ("pages", "Page components and routes"),
    ("controllers", "Request controllers"),
    ("models", "Data models"),
    ("views", "View templates"),
    ("services", "Business/service layer"),
    ("api", "API endpoints"),
    ("routes", "Route definitions"),
    ("middleware", "Request middleware"),
    ("utils", "Shared utilities"),
    ("helpers", "Shared utilities"),
    ("hooks", "Reusable hooks"),
    ("store", "State management"),
    ("stores", "State management"),
    ("contexts", "Shared context providers"),
    ("domain", "Domain layer"),
    ("entities", "Domain entities"),
    ("use-cases", "Application use cases"),
    ("usecases", "Application use cases"),
    ("application", "Application layer"),
    ("infrastructure", "Infrastructure layer"),
    ("graphql", "GraphQL schema and resolvers"),
    ("trpc", "tRPC routers"),
    ("tests", "Test suites"),
    ("test", "Test suites"),
    ("__tests__", "Test suites"),
    ("spec", "Test specifications"),
    ("e2e", "End-to-end tests"),
    ("migrations", "Database migrations"),
    ("config", "Configuration"),
    ("scripts", "Build and maintenance scripts"),
    ("docs", "Documentation"),
    ("public", "Static public assets"),
    ("static", "Static assets"),
    ("assets", "Static assets"),
    ("types", "Type definitions"),
    ("styles", "Stylesheets"),
];

/// Framework detection: name → marker filenames (basename match).
const FRAMEWORK_MARKERS: &[(&str, &[&str])] = &[
    ("next.js", &["next.config.js", "next.config.mjs", "next.config.ts"]),
    ("tailwindcss", &["tailwind.config.js", "tailwind.config.cjs", "tailwind.config.ts"]),
    ("nuxt", &["nuxt.config.js", "nuxt.config.ts"]),
    ("angular", &["angular.json"]),
    ("svelte", &["svelte.config.js"]),
    ("remix", &["remix.config.js"]),
    ("astro", &["astro.config.mjs", "astro.config.ts"]),
    ("gatsby", &["gatsby-config.js", "gatsby-config.ts"]),
    ("django", &["manage.py"]),
    ("rails", &["config.ru"]),
    ("laravel", &["artisan"]),
    ("expo", &["app.json"]),
];

/// Build tool detection: name → marker filenames.
const BUILD_TOOL_MARKERS: &[(&str, &[&str])] = &[
    ("vite", &["vite.config.js", "vite.config.mjs", "vite.config.ts"]),
    ("webpack", &["webpack.config.js", "webpack.config.ts"]),
    ("rollup", &["rollup.config.js", "rollup.config.mjs"]),
    ("esbuild", &["esbuild.config.js", "esbuild.config.mjs"]),
    ("typescript", &["tsconfig.json"]),
    ("babel", &["babel.config.js", ".babelrc"]),
    ("turborepo", &["turbo.json"]),
    ("make", &["Makefile"]),
    ("cargo", &["Cargo.toml"]),
    ("gradle", &["build.gradle", "build.gradle.kts"]),
    ("maven", &["pom.xml"]),
];

/// Test framework detection: name → marker filenames.
const TEST_FRAMEWORK_MARKERS: &[(&str, &[&str])] = &[
    ("jest", &["jest.config.js", "jest.config.ts", "jest.config.mjs"]),
    ("vitest", &["vitest.config.js", "vitest.config.ts"]),
    ("cypress", &["cypress.config.js", "cypress.config.ts", "cypress.json"]),
    ("playwright", &["playwright.config.js", "playwright.config.ts"]),
    ("karma", &["karma.conf.js"]),
    ("pytest", &["pytest.ini", "conftest.py"]),
    ("rspec", &[".rspec"]),
];

/// Package manager detection, first match wins (lockfiles are authoritative).
const PACKAGE_MANAGER_MARKERS: &[(&str, &[&str])] = &[
    ("pnpm", &["pnpm-lock.yaml"]),
    ("yarn", &["yarn.lock"]),
    ("bun", &["bun.lockb"]),
    ("npm", &["package-lock.json", "package.json"]),
    ("cargo", &["Cargo.lock"]),
    ("poetry", &["poetry.lock"]),
    ("pipenv", &["Pipfile.lock"]),
    ("pip", &["requirements.txt"]),
    ("go modules", &["go.sum", "go.mod"]),
    ("bundler", &["Gemfile.lock"]),
    ("composer", &["composer.lock"]),
];

/// Prioritized key-file rules: (basename or suffix pattern, tier, reason).
/// A leading `*` matches any basename with that suffix.
const KEY_FILE_RULES: &[(&str, ImportanceTier, &str)] = &[
    ("package.json", ImportanceTier::Critical, "Package manifest"),
    ("Cargo.toml", ImportanceTier::Critical, "Crate manifest"),
    ("go.mod", ImportanceTier::Critical, "Go module definition"),
    ("pyproject.toml", ImportanceTier::Critical, "Python project manifest"),
    ("pom.xml", ImportanceTier::Critical, "Maven project manifest"),
    ("build.gradle", ImportanceTier::Critical, "Gradle build script"),
    ("Gemfile", ImportanceTier::Critical, "Ruby gem manifest"),
    ("composer.json", ImportanceTier::Critical, "PHP package manifest"),
    ("Dockerfile", ImportanceTier::Critical, "Container build definition"),
    ("docker-compose.yml", ImportanceTier::Critical, "Service composition"),
    ("docker-compose.yaml", ImportanceTier::Critical, "Service composition"),
    ("tsconfig.json", ImportanceTier::High, "TypeScript compiler configuration"),
    ("README.md", ImportanceTier::High, "Project documentation"),
    (".env.example", ImportanceTier::High, "Environment variable template"),
    ("schema.prisma", ImportanceTier::High, "Database schema"),
    ("*.config.js", ImportanceTier::High, "Tool configuration"),
    ("*.config.ts", ImportanceTier::High, "Tool configuration"),
    ("*.config.mjs", ImportanceTier::High, "Tool configuration"),
    ("Makefile", ImportanceTier::Medium, "Build automation"),
    (".eslintrc.json", ImportanceTier::Medium, "Lint configuration"),
    (".eslintrc.js", ImportanceTier::Medium, "Lint configuration"),
    (".prettierrc", ImportanceTier::Medium, "Format configuration"),
    ("LICENSE", ImportanceTier::Medium, "License"),
    ("*.yml", ImportanceTier::Medium, "CI or service configuration"),
];

/// At most this many key files are exported, highest tier first.
const MAX_KEY_FILES: usize = 50;

/// Conventional entry-point path patterns. `*` matches any extension.
const ENTRY_POINT_PATTERNS: &[&str] = &[
    "src/index.*",
    "src/main.*",
    "src/app.*",
    "src/server.*",
    "index.*",
    "main.*",
    "app/page.*",
    "pages/index.*",
    "app/layout.*",
];

/// Scan a flat tree listing into a structural summary.
///
/// An empty tree yields empty summaries, no key files, and no architecture
/// claim.
pub fn scan_tree(items: &[TreeItem], default_branch: &str) -> ScanResult {
    let files: Vec<&TreeItem> = items
        .iter()
        .filter(|i| i.kind == TreeItemKind::Blob)
        .collect();

    if files.is_empty() {
        return ScanResult::default();
    }

    let all_directories = collect_directories(&files);
    let directory_map = build_directory_map(&files, &all_directories);
    let key_files = find_key_files(&files);
    let entry_points = find_entry_points(&files);
    let frameworks = detect_by_markers(&files, FRAMEWORK_MARKERS);
    let build_tools = detect_by_markers(&files, BUILD_TOOL_MARKERS);
    let testing_frameworks = detect_by_markers(&files, TEST_FRAMEWORK_MARKERS);
    let package_manager = detect_by_markers(&files, PACKAGE_MANAGER_MARKERS)
        .into_iter()
        .next();

    let repo_summary = build_repo_summary(
        files.len(),
        all_directories.len(),
        default_branch,
        package_manager.as_deref(),
    );
    let architecture_summary = build_architecture_summary(&frameworks, &build_tools, &directory_map);

    ScanResult {
        directory_map,
        key_files,
        entry_points,
        frameworks,
        build_tools,
        testing_frameworks,
        package_manager,
        repo_summary,
        architecture_summary,
        all_directories,
    }
}

/// Fingerprint of a tree listing: digest over the sorted (path, hash) pairs.
pub fn tree_hash(items: &[TreeItem]) -> String {
    let mut entries: Vec<(&str, &str)> = items
        .iter()
        .filter(|i| i.kind == TreeItemKind::Blob)
        .map(|i| (i.path.as_str(), i.content_hash.as_str()))
        .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (path, hash) in entries {
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn collect_directories(files: &[&TreeItem]) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    for file in files {
        let mut path = file.path.as_str();
        while let Some(idx) = path.rfind('/') {
            path = &path[..idx];
            dirs.insert(path.to_string());
        }
    }
    dirs
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|idx| &path[..idx]).unwrap_or("")
}

fn build_directory_map(
    files: &[&TreeItem],
    dirs: &BTreeSet<String>,
) -> BTreeMap<String, DirectoryInfo> {
    let mut map = BTreeMap::new();

    for dir in dirs {
        let base = basename(dir).to_lowercase();
        let responsibility = DIRECTORY_RESPONSIBILITIES
            .iter()
            .find(|(name, _)| *name == base)
            .map(|(_, label)| *label);

        // Unlabeled directories stay out of the exported map.
        let responsibility = match responsibility {
            Some(r) => r,
            None => continue,
        };

        let direct: Vec<&&TreeItem> = files
            .iter()
            .filter(|f| parent_dir(&f.path) == dir.as_str())
            .collect();
        let file_count = files
            .iter()
            .filter(|f| f.path.starts_with(&format!("{dir}/")))
            .count();

        map.insert(
            dir.clone(),
            DirectoryInfo {
                responsibility: responsibility.to_string(),
                representative_files: direct
                    .iter()
                    .take(3)
                    .map(|f| f.path.clone())
                    .collect(),
                file_count,
            },
        );
    }

    map
}

fn rule_matches(pattern: &str, name: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        name.ends_with(suffix)
    } else {
        name == pattern
    }
}

fn find_key_files(files: &[&TreeItem]) -> Vec<KeyFile> {
    let mut seen = BTreeSet::new();
    let mut key_files = Vec::new();

    for file in files {
        let name = basename(&file.path);
        for (pattern, tier, reason) in KEY_FILE_RULES {
            if rule_matches(pattern, name) {
                if seen.insert(file.path.clone()) {
                    key_files.push(KeyFile {
                        path: file.path.clone(),
                        tier: *tier,
                        reason: reason.to_string(),
                    });
                }
                break;
            }
        }
    }

    // Highest importance first; path as tiebreaker for stable output.
    key_files.sort_by(|a, b| b.tier.cmp(&a.tier).then_with(|| a.path.cmp(&b.path)));
    key_files.truncate(MAX_KEY_FILES);
    key_files
}

fn entry_pattern_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix("*") {
        Some(prefix) => path.starts_with(prefix) && !path[prefix.len()..].contains('/'),
        None => path == pattern,
    }
}

fn find_entry_points(files: &[&TreeItem]) -> Vec<String> {
    let mut entries = Vec::new();
    for pattern in ENTRY_POINT_PATTERNS {
        for file in files {
            if entry_pattern_matches(pattern, &file.path) && !entries.contains(&file.path) {
                entries.push(file.path.clone());
            }
        }
    }
    entries
}

fn detect_by_markers(files: &[&TreeItem], table: &[(&str, &[&str])]) -> Vec<String> {
    let basenames: BTreeSet<&str> = files.iter().map(|f| basename(&f.path)).collect();
    table
        .iter()
        .filter(|(_, markers)| markers.iter().any(|m| basenames.contains(m)))
        .map(|(name, _)| name.to_string())
        .collect()
}

fn build_repo_summary(
    file_count: usize,
    dir_count: usize,
    default_branch: &str,
    package_manager: Option<&str>,
) -> String {
    let mut summary = format!(
        "Repository ({default_branch}) with {file_count} files across {dir_count} directories."
    );
    if let Some(pm) = package_manager {
        summary.push_str(&format!(" Package manager: {pm}."));
    }
    summary
}

fn build_architecture_summary(
    frameworks: &[String],
    build_tools: &[String],
    directory_map: &BTreeMap<String, DirectoryInfo>,
) -> String {
    let mut parts = Vec::new();
    if !frameworks.is_empty() {
        parts.push(format!("Frameworks: {}.", frameworks.join(", ")));
    }
    if !build_tools.is_empty() {
        parts.push(format!("Build tools: {}.", build_tools.join(", ")));
    }
    if !directory_map.is_empty() {
        let dirs: Vec<&str> = directory_map.keys().take(8).map(|s| s.as_str()).collect();
        parts.push(format!("Key directories: {}.", dirs.join(", ")));
    }
    parts.join(" ")
}
