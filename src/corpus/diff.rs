//! Pattern-based summary of a pull-request diff.
//!
//! The summary is a compact, deterministic rendering of what a diff
//! touches: declared classes, methods, and Maven dependencies added or
//! commented out. Comments are counted but not rendered.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)//[^\n]*|/\*.*?\*/").expect("Invalid regex"));
static CLASS_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclass\s+(\w+)").expect("Invalid regex"));
static METHOD_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:public|private|protected)?\s+[\w<>\[\]]+\s+(\w+)\s*\(.*?\)\s*\{")
        .expect("Invalid regex")
});
static ADDED_DEPENDENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<dependency>.*?<artifactId>(.*?)</artifactId>.*?</dependency>")
        .expect("Invalid regex")
});
static REMOVED_DEPENDENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?REMOVE.*?<artifactId>(.*?)</artifactId>.*?-->")
        .expect("Invalid regex")
});

/// What a diff declares, in first-occurrence order without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub classes: Vec<String>,
    pub methods: Vec<String>,
    pub added_dependencies: Vec<String>,
    pub removed_dependencies: Vec<String>,
    pub comment_count: usize,
}

impl DiffSummary {
    /// True when nothing worth embedding was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
            && self.methods.is_empty()
            && self.added_dependencies.is_empty()
            && self.removed_dependencies.is_empty()
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "classes=[{}] methods=[{}] added_deps=[{}] removed_deps=[{}]",
            self.classes.join(", "),
            self.methods.join(", "),
            self.added_dependencies.join(", "),
            self.removed_dependencies.join(", "),
        )
    }
}

/// Extracts a [`DiffSummary`] from raw diff text.
#[must_use]
pub fn extract_diff_summary(diff: &str) -> DiffSummary {
    DiffSummary {
        classes: captures(&CLASS_NAME, diff),
        methods: captures(&METHOD_NAME, diff),
        added_dependencies: captures(&ADDED_DEPENDENCY, diff),
        removed_dependencies: captures(&REMOVED_DEPENDENCY, diff),
        comment_count: COMMENT.find_iter(diff).count(),
    }
}

fn captures(pattern: &Regex, text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in pattern.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            let name = m.as_str().trim();
            if !name.is_empty() && !seen.iter().any(|s: &String| s == name) {
                seen.push(name.to_string());
            }
        }
    }
    seen
}
