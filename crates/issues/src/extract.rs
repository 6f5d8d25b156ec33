//! Heuristic file-reference extraction from free-form issue text.
//!
//! A pluggable, language-keyed set of path regexes, generalized from the
//! teacher's failure-classification-by-regex idiom
//! (`healer::ci::router`'s `static ... LazyLock<Vec<Regex>>` tables) to
//! extract candidate file paths instead of classifying failure types.

use std::sync::LazyLock;

use regex::Regex;

/// One extraction pattern, named for diagnostics.
struct PathPattern {
    language: &'static str,
    regex: Regex,
}

static PATTERNS: LazyLock<Vec<PathPattern>> = LazyLock::new(|| {
    vec![
        PathPattern {
            language: "rust",
            regex: Regex::new(r"\b[\w./-]+\.rs\b").unwrap(),
        },
        PathPattern {
            language: "javascript",
            regex: Regex::new(r"\b[\w./-]+\.(?:js|jsx|ts|tsx)\b").unwrap(),
        },
        PathPattern {
            language: "python",
            regex: Regex::new(r"\b[\w./-]+\.py\b").unwrap(),
        },
        PathPattern {
            language: "template",
            regex: Regex::new(r"\b[\w./-]+\.(?:hbs|html|jinja|j2|ejs)\b").unwrap(),
        },
        PathPattern {
            language: "style",
            regex: Regex::new(r"\b[\w./-]+\.(?:css|scss|less)\b").unwrap(),
        },
        PathPattern {
            language: "endpoint",
            regex: Regex::new(r"(?:GET|POST|PUT|PATCH|DELETE)\s+(/api/[\w./-]+)").unwrap(),
        },
    ]
});

/// Extract candidate file (or API endpoint) references from `text`, in
/// order of first appearance, deduplicated.
#[must_use]
pub fn extract_file_references(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut found = Vec::new();

    for pattern in PATTERNS.iter() {
        for capture in pattern.regex.captures_iter(text) {
            let matched = if pattern.language == "endpoint" {
                capture.get(1)
            } else {
                capture.get(0)
            };
            if let Some(m) = matched {
                let value = m.as_str().to_string();
                if seen.insert(value.clone()) {
                    found.push(value);
                }
            }
        }
    }

    found
}

/// Small set of key files always worth reading for context, independent of
/// what the description mentions (e.g. a project's README or top-level
/// config). Callers combine this with [`extract_file_references`].
#[must_use]
pub fn always_include_key_files(repository_root: &str) -> Vec<String> {
    vec![
        format!("{repository_root}/README.md"),
        format!("{repository_root}/Cargo.toml"),
    ]
}
