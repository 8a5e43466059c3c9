use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use floundermode_core::ContentDigest;
use serde::{Deserialize, Serialize};

use crate::now_rfc3339;

pub const MANIFEST_VERSION: &str = "2.0";

/// On-disk build state: which digest each term file was last rendered from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub terms: Vec<String>,
    pub term_hashes: BTreeMap<String, ContentDigest>,
    pub last_updated: String,
    pub version: String,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            terms: Vec::new(),
            term_hashes: BTreeMap::new(),
            last_updated: String::new(),
            version: MANIFEST_VERSION.to_string(),
        }
    }
}

/// Read-modify-write wrapper around one manifest file.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
    manifest: Manifest,
}

impl ManifestStore {
    /// Load the manifest at `path`. A missing or unreadable manifest yields an
    /// empty one so every term file is treated as new.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let manifest = match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<Manifest>(&bytes) {
                Ok(manifest) => manifest,
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "manifest is corrupt; rebuilding from scratch"
                    );
                    Manifest::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no manifest yet");
                Manifest::default()
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "manifest is unreadable; rebuilding from scratch"
                );
                Manifest::default()
            }
        };

        Self { path: path.to_path_buf(), manifest }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    #[must_use]
    pub fn digest_for(&self, file_id: &str) -> Option<ContentDigest> {
        self.manifest.term_hashes.get(file_id).copied()
    }

    pub fn record_digest(&mut self, file_id: &str, digest: ContentDigest) {
        self.manifest.term_hashes.insert(file_id.to_string(), digest);
    }

    /// Drop entries whose file id is not in `current`. Returns the dropped ids.
    pub fn prune(&mut self, current: &BTreeSet<String>) -> Vec<String> {
        let stale = self
            .manifest
            .term_hashes
            .keys()
            .filter(|file_id| !current.contains(*file_id))
            .cloned()
            .collect::<Vec<_>>();
        for file_id in &stale {
            self.manifest.term_hashes.remove(file_id);
        }
        stale
    }

    /// Persist with a fresh `lastUpdated`. Writes a sibling temp file and
    /// renames it over the manifest.
    ///
    /// # Errors
    /// Returns an error when the manifest cannot be serialized or written.
    pub fn save(&mut self) -> Result<()> {
        self.manifest.terms = self.manifest.term_hashes.keys().cloned().collect();
        self.manifest.last_updated = now_rfc3339()?;
        self.manifest.version = MANIFEST_VERSION.to_string();

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create manifest directory {}", parent.display())
            })?;
        }

        let mut bytes =
            serde_json::to_vec_pretty(&self.manifest).context("failed to serialize manifest")?;
        bytes.push(b'\n');

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, bytes)
            .with_context(|| format!("failed to write manifest {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!("failed to move manifest into place at {}", self.path.display())
        })?;
        Ok(())
    }
}
