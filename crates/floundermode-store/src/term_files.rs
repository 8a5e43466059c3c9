use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

/// One `*.json` file in the terms directory. `file_id` is the bare file name
/// and keys the manifest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TermFileEntry {
    pub file_id: String,
    pub path: PathBuf,
}

/// List term files in `terms_dir`, sorted by file id. Hidden files and
/// subdirectories are skipped.
///
/// # Errors
/// Returns an error when `terms_dir` is missing or cannot be listed.
pub fn discover_term_files(terms_dir: &Path) -> Result<Vec<TermFileEntry>> {
    if !terms_dir.is_dir() {
        return Err(anyhow!("terms directory not found: {}", terms_dir.display()));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(terms_dir)
        .with_context(|| format!("failed to list terms directory {}", terms_dir.display()))?
    {
        let entry = entry.with_context(|| {
            format!("failed to read entry in terms directory {}", terms_dir.display())
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_id) = path.file_name().and_then(|name| name.to_str()) else {
            tracing::warn!(path = %path.display(), "skipping term file with non UTF-8 name");
            continue;
        };
        if file_id.starts_with('.') {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        entries.push(TermFileEntry { file_id: file_id.to_string(), path });
    }

    entries.sort();
    Ok(entries)
}
