//! Size-capped file reads for the `analyze`/`strategize` stages. Templates
//! get a larger cap than source files per §4.2's `strategize` contract,
//! since a template's relevant context is usually one large markup block
//! rather than a tight function body.

use std::path::Path;

const CODE_FILE_CAP_BYTES: usize = 8 * 1024;
const TEMPLATE_FILE_CAP_BYTES: usize = 24 * 1024;

const TEMPLATE_EXTENSIONS: &[&str] = &["hbs", "html", "jinja", "j2", "ejs"];

fn cap_for(path: &str) -> usize {
    let is_template = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext));
    if is_template {
        TEMPLATE_FILE_CAP_BYTES
    } else {
        CODE_FILE_CAP_BYTES
    }
}

/// Read `rel_path` under `repo_root`, truncated to its type's size cap.
/// Returns `None` rather than an error when the file is missing or
/// unreadable — callers pass a best-effort file list to the LLM and
/// should not fail a whole stage over one stale reference.
pub async fn read_capped(repo_root: &Path, rel_path: &str) -> Option<String> {
    let full_path = repo_root.join(rel_path);
    let contents = tokio::fs::read_to_string(&full_path).await.ok()?;
    let cap = cap_for(rel_path);
    if contents.len() <= cap {
        Some(contents)
    } else {
        Some(contents[..cap].to_string())
    }
}

/// Read every path in `paths`, skipping ones that can't be read, in order.
pub async fn read_many(repo_root: &Path, paths: &[String]) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        if let Some(contents) = read_capped(repo_root, path).await {
            out.push((path.clone(), contents));
        }
    }
    out
}
