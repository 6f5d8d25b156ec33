//! Anchored-replacement code editor.
//!
//! Applies an `{old_code, new_code}` pair to a file's contents by trying an
//! ordered pipeline of increasingly loose matching strategies, stopping at
//! the first one that finds an unambiguous (single-occurrence) match.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("old code not found")]
    NotFound,
    #[error("replacement would leave the file unchanged")]
    NoChange,
}

/// Which of the five strategies produced the accepted match. Exposed for
/// logging/telemetry, not load-bearing for correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Exact,
    WhitespaceNormalized,
    CaseInsensitive,
    Fuzzy,
    AnchorLine,
}

#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub contents: String,
    pub strategy: MatchStrategy,
}

/// Anchored-replacement editor. Stateless aside from its fuzzy-match
/// threshold, so a single instance is shared across sessions.
#[derive(Debug, Clone)]
pub struct CodeEditor {
    fuzzy_threshold: f64,
    max_window_lines: usize,
}

impl Default for CodeEditor {
    fn default() -> Self {
        Self::new(0.85)
    }
}

impl CodeEditor {
    #[must_use]
    pub fn new(fuzzy_threshold: f64) -> Self {
        Self {
            fuzzy_threshold,
            max_window_lines: 30,
        }
    }

    /// Apply `old_code -> new_code` to `contents`, trying each strategy in
    /// order and refusing a match that would leave the file unchanged.
    pub fn apply(
        &self,
        contents: &str,
        old_code: &str,
        new_code: &str,
    ) -> Result<EditOutcome, EditError> {
        let attempt = self
            .try_exact(contents, old_code, new_code)
            .or_else(|| self.try_whitespace_normalized(contents, old_code, new_code))
            .or_else(|| self.try_case_insensitive(contents, old_code, new_code))
            .or_else(|| self.try_fuzzy(contents, old_code, new_code))
            .or_else(|| self.try_anchor_line(contents, old_code, new_code));

        let (result, strategy) = attempt.ok_or(EditError::NotFound)?;
        if result == contents {
            return Err(EditError::NoChange);
        }
        Ok(EditOutcome {
            contents: result,
            strategy,
        })
    }

    /// Strategy 1: exact substring, unique occurrence.
    fn try_exact(
        &self,
        contents: &str,
        old_code: &str,
        new_code: &str,
    ) -> Option<(String, MatchStrategy)> {
        if count_occurrences(contents, old_code) == 1 {
            let idx = contents.find(old_code)?;
            let mut out = String::with_capacity(contents.len());
            out.push_str(&contents[..idx]);
            out.push_str(new_code);
            out.push_str(&contents[idx + old_code.len()..]);
            return Some((out, MatchStrategy::Exact));
        }
        None
    }

    /// Strategy 2: slide a window the height of `old_code` (capped at 30
    /// lines) over the file, comparing with runs of whitespace collapsed.
    fn try_whitespace_normalized(
        &self,
        contents: &str,
        old_code: &str,
        new_code: &str,
    ) -> Option<(String, MatchStrategy)> {
        let file_lines: Vec<&str> = contents.lines().collect();
        let window = old_code.lines().count().max(1).min(self.max_window_lines);
        if window == 0 || window > file_lines.len() {
            return None;
        }
        let normalized_old = normalize_whitespace(old_code);

        let mut matches = Vec::new();
        for start in 0..=(file_lines.len() - window) {
            let candidate = file_lines[start..start + window].join("\n");
            if normalize_whitespace(&candidate) == normalized_old {
                matches.push(start);
            }
        }

        if matches.len() == 1 {
            let start = matches[0];
            return Some((
                splice_lines(&file_lines, start, window, new_code, contents),
                MatchStrategy::WhitespaceNormalized,
            ));
        }
        None
    }

    /// Strategy 3: case-insensitive single-line substitution, mapping the
    /// matched text's case pattern onto `new_code`.
    fn try_case_insensitive(
        &self,
        contents: &str,
        old_code: &str,
        new_code: &str,
    ) -> Option<(String, MatchStrategy)> {
        if old_code.lines().count() != 1 {
            return None;
        }
        let lower_old = old_code.to_lowercase();
        let lower_contents = contents.to_lowercase();
        if count_occurrences(&lower_contents, &lower_old) != 1 {
            return None;
        }
        let idx = lower_contents.find(&lower_old)?;
        let matched = &contents[idx..idx + old_code.len()];
        let cased_new = apply_case_pattern(matched, new_code);

        let mut out = String::with_capacity(contents.len());
        out.push_str(&contents[..idx]);
        out.push_str(&cased_new);
        out.push_str(&contents[idx + old_code.len()..]);
        Some((out, MatchStrategy::CaseInsensitive))
    }

    /// Strategy 4: slide a window and accept the single best similarity
    /// score above the configured threshold.
    fn try_fuzzy(
        &self,
        contents: &str,
        old_code: &str,
        new_code: &str,
    ) -> Option<(String, MatchStrategy)> {
        let file_lines: Vec<&str> = contents.lines().collect();
        let window = old_code.lines().count().max(1).min(self.max_window_lines);
        if window == 0 || window > file_lines.len() {
            return None;
        }

        let mut best_score = 0.0_f64;
        let mut best_start = None;
        for start in 0..=(file_lines.len() - window) {
            let candidate = file_lines[start..start + window].join("\n");
            let score = strsim::normalized_levenshtein(&candidate, old_code);
            if score > best_score {
                best_score = score;
                best_start = Some(start);
            }
        }

        if best_score > self.fuzzy_threshold {
            let start = best_start?;
            return Some((
                splice_lines(&file_lines, start, window, new_code, contents),
                MatchStrategy::Fuzzy,
            ));
        }
        None
    }

    /// Strategy 5: find the most discriminating line in `old_code` that
    /// occurs exactly once in the file, then splice `new_code` in at the
    /// range that line's position implies.
    fn try_anchor_line(
        &self,
        contents: &str,
        old_code: &str,
        new_code: &str,
    ) -> Option<(String, MatchStrategy)> {
        let file_lines: Vec<&str> = contents.lines().collect();
        let old_lines: Vec<&str> = old_code.lines().collect();

        let mut candidates: Vec<(usize, &str)> = old_lines
            .iter()
            .enumerate()
            .map(|(i, l)| (i, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !is_comment_line(l))
            .collect();
        // Prefer longer (more discriminating) lines first.
        candidates.sort_by_key(|(_, l)| std::cmp::Reverse(l.len()));

        for (anchor_idx_in_old, anchor_text) in candidates {
            let occurrences: Vec<usize> = file_lines
                .iter()
                .enumerate()
                .filter(|(_, l)| l.trim() == anchor_text)
                .map(|(i, _)| i)
                .collect();
            if occurrences.len() != 1 {
                continue;
            }
            let anchor_idx_in_file = occurrences[0];
            let lines_before = anchor_idx_in_old;
            let lines_after = old_lines.len() - anchor_idx_in_old - 1;

            let start = anchor_idx_in_file.saturating_sub(lines_before);
            let end = (anchor_idx_in_file + lines_after + 1).min(file_lines.len());
            if start >= end {
                continue;
            }
            return Some((
                splice_lines(&file_lines, start, end - start, new_code, contents),
                MatchStrategy::AnchorLine,
            ));
        }
        None
    }
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with("//") || line.starts_with('#') || line.starts_with("/*") || line.starts_with('*')
}

/// Replace `file_lines[start..start+count]` with `new_code`, reassembling
/// the whole file. Preserves a trailing newline if the original had one.
fn splice_lines(
    file_lines: &[&str],
    start: usize,
    count: usize,
    new_code: &str,
    original: &str,
) -> String {
    let mut out_lines: Vec<&str> = Vec::with_capacity(file_lines.len());
    out_lines.extend_from_slice(&file_lines[..start]);
    let new_code_lines: Vec<&str> = new_code.lines().collect();
    out_lines.extend_from_slice(&new_code_lines);
    out_lines.extend_from_slice(&file_lines[start + count..]);

    let mut joined = out_lines.join("\n");
    if original.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

/// Map the case pattern observed in `matched` onto `replacement`.
fn apply_case_pattern(matched: &str, replacement: &str) -> String {
    if matched.chars().all(|c| !c.is_alphabetic() || c.is_uppercase()) {
        replacement.to_uppercase()
    } else if matched.chars().all(|c| !c.is_alphabetic() || c.is_lowercase()) {
        replacement.to_lowercase()
    } else if matched.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = replacement.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    } else {
        replacement.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_replaces_unique_occurrence() {
        let editor = CodeEditor::default();
        let contents = "fn a() {}\nfn b() {}\n";
        let out = editor.apply(contents, "fn a() {}", "fn a() { 1 }").unwrap();
        assert_eq!(out.contents, "fn a() { 1 }\nfn b() {}\n");
        assert_eq!(out.strategy, MatchStrategy::Exact);
    }

    #[test]
    fn refuses_ambiguous_exact_match() {
        let editor = CodeEditor::default();
        let contents = "let x = 1;\nlet x = 1;\n";
        // whitespace-normalized / fuzzy will also see two identical lines,
        // so this must fail end to end, not silently fall through.
        let result = editor.apply(contents, "let x = 1;", "let x = 2;");
        assert_eq!(result.unwrap_err(), EditError::NotFound);
    }

    #[test]
    fn whitespace_normalized_matches_reflowed_block() {
        let editor = CodeEditor::default();
        let contents = "fn a(  x: i32,   y: i32 ) -> i32 {\n    x + y\n}\n";
        let old = "fn a(x: i32, y: i32) -> i32 {\n    x + y\n}";
        let new = "fn a(x: i32, y: i32) -> i32 {\n    x - y\n}";
        let out = editor.apply(contents, old, new).unwrap();
        assert_eq!(out.strategy, MatchStrategy::WhitespaceNormalized);
        assert!(out.contents.contains("x - y"));
    }

    #[test]
    fn case_insensitive_maps_case_pattern_onto_replacement() {
        let editor = CodeEditor::default();
        let contents = "<button>SUBMIT</button>\n";
        let out = editor.apply(contents, "submit", "confirm").unwrap();
        assert_eq!(out.strategy, MatchStrategy::CaseInsensitive);
        assert!(out.contents.contains("CONFIRM"));
    }

    #[test]
    fn fuzzy_accepts_above_threshold() {
        let editor = CodeEditor::new(0.85);
        let contents = "function greet(name) {\n  console.log('Hello ' + name)\n}\n";
        let old = "function greet(name) {\n  console.log(\"Hello \" + name)\n}";
        let new = "function greet(name) {\n  console.log(`Hi ${name}`)\n}";
        let out = editor.apply(contents, old, new).unwrap();
        assert_eq!(out.strategy, MatchStrategy::Fuzzy);
    }

    #[test]
    fn fuzzy_rejects_below_threshold() {
        let editor = CodeEditor::new(0.85);
        let contents = "completely unrelated content\nanother line\n";
        let old = "function greet(name) {\n  console.log(\"Hello \" + name)\n}";
        let new = "function greet(name) {\n  return name\n}";
        assert_eq!(
            editor.apply(contents, old, new).unwrap_err(),
            EditError::NotFound
        );
    }

    #[test]
    fn anchor_line_splices_using_most_discriminating_line() {
        let editor = CodeEditor::default();
        let contents = "struct Foo {\n    // a field\n    bar: i32,\n}\n\nimpl Foo {\n    fn new() -> Self {\n        Self { bar: 0 }\n    }\n}\n";
        // old_code includes a comment line (generic, appears nowhere verbatim)
        // and one highly discriminating line.
        let old = "// totally different comment\n    fn new() -> Self {\n        Self { bar: 0 }\n    }";
        let new = "    fn new(bar: i32) -> Self {\n        Self { bar }\n    }";
        let out = editor.apply(contents, old, new).unwrap();
        assert_eq!(out.strategy, MatchStrategy::AnchorLine);
        assert!(out.contents.contains("fn new(bar: i32) -> Self {"));
    }

    #[test]
    fn refuses_noop_replacement() {
        let editor = CodeEditor::default();
        let contents = "let x = 1;\n";
        let result = editor.apply(contents, "let x = 1;", "let x = 1;");
        assert_eq!(result.unwrap_err(), EditError::NoChange);
    }

    #[test]
    fn reports_not_found_when_nothing_matches() {
        let editor = CodeEditor::default();
        let contents = "totally unrelated\n";
        assert_eq!(
            editor.apply(contents, "missing code", "replacement").unwrap_err(),
            EditError::NotFound
        );
    }
}
