use floundermode_core::{
    pin_definition_ids, Definition, SearchResult, SourceDefinition, Submission, TermSummary,
    VoteEvent, VoteTransition, VoteType,
};
use serde::{Deserialize, Serialize};

use crate::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub definition_id: String,
    pub vote_type: VoteType,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub id: String,
}

/// Storage behind the dictionary proxy. Calls are blocking; the cached
/// client rate-limits them and layers caching and fallback on top.
pub trait TermBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// # Errors
    /// Returns an [`ApiError`] when the backend cannot be reached or decoded.
    fn list_terms(&self) -> Result<Vec<TermSummary>, ApiError>;

    /// Stored definitions for `slug`, in storage order. Counts are the
    /// recorded baseline; live votes are merged by the caller.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] for an unknown slug.
    fn definitions(&self, slug: &str) -> Result<Vec<Definition>, ApiError>;

    /// # Errors
    /// Returns an [`ApiError`] when the backend cannot be reached or decoded.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ApiError>;

    /// Live vote events for the given definitions.
    ///
    /// # Errors
    /// Returns an [`ApiError`] when the backend cannot be reached or decoded.
    fn vote_events(&self, definition_ids: &[String]) -> Result<Vec<VoteEvent>, ApiError>;

    /// Apply one vote click under the one-vote-per-user rule.
    ///
    /// # Errors
    /// Returns an [`ApiError`] when the vote cannot be stored.
    fn cast_vote(&self, vote: &VoteRequest) -> Result<VoteTransition, ApiError>;

    /// # Errors
    /// Returns an [`ApiError`] when the submission cannot be stored.
    fn submit_definition(&self, submission: &Submission) -> Result<SubmissionReceipt, ApiError>;

    /// # Errors
    /// Returns an [`ApiError`] when the backend is unreachable.
    fn ping(&self) -> Result<(), ApiError>;
}

/// Published rows of one term, in storage order. Ids are pinned against the
/// full row list first, so a pending row never shifts a published row's id.
pub(crate) fn published_definitions<R>(
    slug: &str,
    rows: Vec<R>,
    is_published: impl Fn(&R) -> bool,
) -> Vec<SourceDefinition>
where
    R: Into<SourceDefinition>,
{
    let published = rows.iter().map(&is_published).collect::<Vec<_>>();
    let mut definitions = rows.into_iter().map(Into::into).collect::<Vec<_>>();
    pin_definition_ids(slug, &mut definitions);
    definitions
        .into_iter()
        .zip(published)
        .filter_map(|(definition, published)| published.then_some(definition))
        .collect()
}
