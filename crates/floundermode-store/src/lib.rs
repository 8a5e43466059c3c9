//! Persistent state for the dictionary: the build manifest, term-file
//! discovery, and the local SQLite vote/submission store.

mod manifest;
mod term_files;
mod votes;

use anyhow::{Context, Result};
use time::OffsetDateTime;

pub use manifest::{Manifest, ManifestStore, MANIFEST_VERSION};
pub use term_files::{discover_term_files, TermFileEntry};
pub use votes::{SchemaStatus, SqliteVoteStore, StoredSubmission};

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}
