use std::path::Path;
use std::sync::{Mutex, PoisonError};

use floundermode_core::{
    Definition, SearchResult, Submission, TermSummary, VoteEvent, VoteTransition,
};
use floundermode_store::SqliteVoteStore;

use crate::backend::{SubmissionReceipt, TermBackend, VoteRequest};
use crate::fallback::FallbackDataset;
use crate::ApiError;

/// Offline backend: terms come from the static dataset, votes and
/// submissions from a local SQLite database.
pub struct LocalBackend {
    dataset: FallbackDataset,
    store: Mutex<SqliteVoteStore>,
}

impl LocalBackend {
    /// # Errors
    /// Returns [`ApiError::Storage`] when the vote database cannot be opened or migrated.
    pub fn open(dataset: FallbackDataset, votes_db: &Path) -> Result<Self, ApiError> {
        let store = SqliteVoteStore::open(votes_db).map_err(storage_error)?;
        Self::with_store(dataset, store)
    }

    /// # Errors
    /// Returns [`ApiError::Storage`] when the in-memory database cannot be created.
    pub fn in_memory(dataset: FallbackDataset) -> Result<Self, ApiError> {
        let store = SqliteVoteStore::open_in_memory().map_err(storage_error)?;
        Self::with_store(dataset, store)
    }

    fn with_store(dataset: FallbackDataset, mut store: SqliteVoteStore) -> Result<Self, ApiError> {
        store.migrate().map_err(storage_error)?;
        Ok(Self { dataset, store: Mutex::new(store) })
    }
}

fn storage_error(err: impl std::fmt::Display) -> ApiError {
    ApiError::Storage(format!("{err:#}"))
}

impl TermBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn list_terms(&self) -> Result<Vec<TermSummary>, ApiError> {
        Ok(self.dataset.summaries())
    }

    fn definitions(&self, slug: &str) -> Result<Vec<Definition>, ApiError> {
        self.dataset
            .record(slug)
            .map(|record| record.definitions.clone())
            .ok_or_else(|| ApiError::NotFound(format!("term {slug}")))
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ApiError> {
        Ok(self.dataset.search(query, limit))
    }

    fn vote_events(&self, definition_ids: &[String]) -> Result<Vec<VoteEvent>, ApiError> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.vote_events(definition_ids).map_err(storage_error)
    }

    fn cast_vote(&self, vote: &VoteRequest) -> Result<VoteTransition, ApiError> {
        if !self.dataset.contains_definition(&vote.definition_id) {
            return Err(ApiError::NotFound(format!("definition {}", vote.definition_id)));
        }
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.cast_vote(&vote.definition_id, &vote.user_id, vote.vote_type).map_err(storage_error)
    }

    fn submit_definition(&self, submission: &Submission) -> Result<SubmissionReceipt, ApiError> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = store.record_submission(submission).map_err(storage_error)?;
        tracing::info!(id = %stored.submission_id, term = %submission.term, "queued submission");
        Ok(SubmissionReceipt { id: stored.submission_id })
    }

    fn ping(&self) -> Result<(), ApiError> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.schema_status().map(|_| ()).map_err(storage_error)
    }
}
