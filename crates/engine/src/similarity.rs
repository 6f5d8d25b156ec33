//! Issue-similarity check used by the `validate` stage: a freshly
//! re-reported issue counts as "the same bug" as the one a session just
//! fixed if either its title overlaps enough or its description contains
//! (or is contained by) the original's.

use std::collections::HashSet;

use issues::Issue;

const TITLE_JACCARD_THRESHOLD: f64 = 0.5;

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|s| s.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// `true` if `candidate` looks like a re-report of `original`.
#[must_use]
pub fn matches_original(original: &Issue, candidate: &Issue) -> bool {
    let title_sim = jaccard(&tokenize(&original.title), &tokenize(&candidate.title));
    if title_sim > TITLE_JACCARD_THRESHOLD {
        return true;
    }

    let a = original.description.to_lowercase();
    let b = candidate.description.to_lowercase();
    if a.trim().is_empty() || b.trim().is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use issues::RawIssue;

    fn issue(title: &str, description: &str) -> Issue {
        Issue::normalize(RawIssue {
            title: Some(title.to_string()),
            description: Some(description.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn matches_on_overlapping_titles() {
        let original = issue("Login button misaligned on mobile", "desc one");
        let candidate = issue("Login button is misaligned on mobile Safari", "desc two");
        assert!(matches_original(&original, &candidate));
    }

    #[test]
    fn matches_on_substring_description() {
        let original = issue("Crash on submit", "Tapping submit crashes the app immediately");
        let candidate = issue("App crashes", "Tapping submit crashes the app");
        assert!(matches_original(&original, &candidate));
    }

    #[test]
    fn unrelated_issues_do_not_match() {
        let original = issue("Login button misaligned", "cosmetic issue on mobile");
        let candidate = issue("Database connection pool exhausted", "queries time out under load");
        assert!(!matches_original(&original, &candidate));
    }

    #[test]
    fn empty_descriptions_fall_back_to_title_only() {
        let original = issue("Checkout fails", "");
        let candidate = issue("Checkout fails silently", "");
        assert!(matches_original(&original, &candidate));
    }
}
