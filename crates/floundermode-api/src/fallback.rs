use std::fs;
use std::path::Path;

use floundermode_core::{
    normalize, search, sort_definitions, Definition, SearchResult, TermFile, TermRecord,
    TermSummary,
};
use floundermode_store::discover_term_files;

use crate::ApiError;

/// Static copy of the dictionary, loaded from term files, that answers reads
/// when the live backend is unavailable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackDataset {
    records: Vec<TermRecord>,
}

impl FallbackDataset {
    #[must_use]
    pub fn from_records(mut records: Vec<TermRecord>) -> Self {
        records.sort_by(|left, right| left.term.to_lowercase().cmp(&right.term.to_lowercase()));
        Self { records }
    }

    /// Load every parseable term file under `terms_dir`. Unparseable or
    /// invalid files are skipped with a warning.
    ///
    /// # Errors
    /// Returns [`ApiError::Configuration`] when the directory cannot be listed.
    pub fn load_dir(terms_dir: &Path) -> Result<Self, ApiError> {
        let entries = discover_term_files(terms_dir).map_err(|err| {
            ApiError::Configuration(format!("failed to load fallback dataset: {err:#}"))
        })?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let parsed = fs::read(&entry.path)
                .map_err(|err| err.to_string())
                .and_then(|bytes| TermFile::parse(&bytes).map_err(|err| err.to_string()));
            let record = match parsed {
                Ok(file) => normalize(&file),
                Err(reason) => {
                    tracing::warn!(file_id = %entry.file_id, %reason, "skipping fallback term file");
                    continue;
                }
            };
            if record.definitions.is_empty() {
                tracing::warn!(file_id = %entry.file_id, "skipping fallback term without definitions");
                continue;
            }
            if let Err(err) = record.validate() {
                tracing::warn!(file_id = %entry.file_id, error = %err, "skipping invalid fallback term");
                continue;
            }
            records.push(record);
        }

        tracing::info!(terms = records.len(), dir = %terms_dir.display(), "loaded fallback dataset");
        Ok(Self::from_records(records))
    }

    #[must_use]
    pub fn records(&self) -> &[TermRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<TermSummary> {
        self.records.iter().map(TermRecord::summary).collect()
    }

    #[must_use]
    pub fn record(&self, slug: &str) -> Option<&TermRecord> {
        self.records.iter().find(|record| record.slug == slug)
    }

    /// Definitions for `slug`, ranked.
    #[must_use]
    pub fn definitions(&self, slug: &str) -> Option<Vec<Definition>> {
        self.record(slug).map(|record| {
            let mut definitions = record.definitions.clone();
            sort_definitions(&mut definitions);
            definitions
        })
    }

    #[must_use]
    pub fn contains_definition(&self, definition_id: &str) -> bool {
        self.records.iter().any(|record| record.find_definition(definition_id).is_some())
    }

    #[must_use]
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        search(&self.records, query, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_terms(files: &[(&str, &str)]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("floundermode-fallback-{}", ulid::Ulid::new()));
        if let Err(err) = fs::create_dir_all(&dir) {
            panic!("failed to create temp dir: {err}");
        }
        for (name, content) in files {
            if let Err(err) = fs::write(dir.join(name), content) {
                panic!("failed to write {name}: {err}");
            }
        }
        dir
    }

    #[test]
    fn loads_valid_files_and_skips_broken_ones() -> Result<(), ApiError> {
        let dir = write_terms(&[
            (
                "mvp-theater.json",
                r#"{"term":"MVP Theater","related":["startup"],"definition":"Shipping a demo, calling it a product.","usage":"Pure MVP theater.","votes":4}"#,
            ),
            ("broken.json", "{ not json"),
            ("empty.json", r#"{"term":"Empty","related":[],"definitions":[]}"#),
        ]);

        let dataset = FallbackDataset::load_dir(&dir)?;
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.summaries()[0].slug, "mvp-theater");

        let definitions = dataset.definitions("mvp-theater").unwrap_or_default();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].upvotes, 4);
        assert!(dataset.contains_definition("mvp-theater-def-1"));
        assert_eq!(dataset.search("theat", 10).len(), 1);

        let _ = fs::remove_dir_all(&dir);
        Ok(())
    }

    #[test]
    fn missing_directory_is_a_configuration_error() {
        let dir = std::env::temp_dir().join(format!("floundermode-nofallback-{}", ulid::Ulid::new()));
        assert!(matches!(FallbackDataset::load_dir(&dir), Err(ApiError::Configuration(_))));
    }
}
