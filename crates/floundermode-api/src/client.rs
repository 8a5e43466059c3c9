use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use floundermode_core::{
    aggregate, sort_definitions, Definition, SearchResult, Submission, TermSummary, VoteTally,
    VoteTransition,
};
use serde::{Deserialize, Serialize};

use crate::backend::{SubmissionReceipt, TermBackend, VoteRequest};
use crate::cache::TtlCache;
use crate::config::ClientTuning;
use crate::fallback::FallbackDataset;
use crate::limiter::{Clock, RateLimiter};
use crate::ApiError;

const TERMS_KEY: &str = "terms";
pub const SEARCH_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheStats {
    pub terms: usize,
    pub definitions: usize,
    pub searches: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthReport {
    pub status: &'static str,
    pub backend: BackendStatus,
    pub cache: CacheStats,
    pub fallback: bool,
}

/// Rate-limited, cached access to a [`TermBackend`], degrading to a static
/// dataset when the backend fails.
pub struct CachedClient {
    backend: Arc<dyn TermBackend>,
    limiter: RateLimiter,
    terms: TtlCache<Vec<TermSummary>>,
    definitions: TtlCache<Vec<Definition>>,
    searches: TtlCache<Vec<SearchResult>>,
    definitions_ttl: Duration,
    fallback: Option<FallbackDataset>,
}

impl CachedClient {
    #[must_use]
    pub fn new(
        backend: Arc<dyn TermBackend>,
        tuning: &ClientTuning,
        clock: Arc<dyn Clock>,
        fallback: Option<FallbackDataset>,
    ) -> Self {
        Self {
            backend,
            limiter: RateLimiter::new(tuning.rate_limit, Arc::clone(&clock)),
            terms: TtlCache::new(tuning.default_ttl, Arc::clone(&clock)),
            definitions: TtlCache::new(tuning.default_ttl, Arc::clone(&clock)),
            searches: TtlCache::new(tuning.default_ttl, clock),
            definitions_ttl: tuning.definitions_ttl,
            fallback,
        }
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[must_use]
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Run one backend operation once the rate limiter admits it.
    ///
    /// # Errors
    /// Returns whatever the operation returns.
    pub fn execute<T>(
        &self,
        operation: impl FnOnce(&dyn TermBackend) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        self.limiter.acquire();
        operation(self.backend.as_ref())
    }

    fn degrade<T>(
        &self,
        err: ApiError,
        what: &str,
        derive: impl FnOnce(&FallbackDataset) -> Option<T>,
    ) -> Result<T, ApiError> {
        match &self.fallback {
            Some(dataset) if err.is_recoverable() => {
                tracing::warn!(error = %err, what, "backend failed; serving fallback data");
                derive(dataset).ok_or_else(|| ApiError::NotFound(what.to_string()))
            }
            _ => Err(err),
        }
    }

    /// # Errors
    /// Returns the backend error when it is not recoverable or no fallback is loaded.
    pub fn fetch_terms(&self) -> Result<Vec<TermSummary>, ApiError> {
        if let Some(terms) = self.terms.get(TERMS_KEY) {
            return Ok(terms);
        }
        match self.execute(|backend| backend.list_terms()) {
            Ok(terms) => {
                self.terms.insert(TERMS_KEY, terms.clone());
                Ok(terms)
            }
            Err(err) => self.degrade(err, "terms", |dataset| Some(dataset.summaries())),
        }
    }

    /// Ranked definitions for `slug` with live vote tallies merged in.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] for an unknown slug, or the backend
    /// error when no fallback can answer.
    pub fn definitions_for(&self, slug: &str) -> Result<Vec<Definition>, ApiError> {
        if let Some(definitions) = self.definitions.get(slug) {
            return Ok(definitions);
        }
        let fetched = self.execute(|backend| backend.definitions(slug)).and_then(|definitions| {
            let ids = definitions.iter().map(|definition| definition.id.clone()).collect::<Vec<_>>();
            let events = self.execute(|backend| backend.vote_events(&ids))?;
            Ok(merge_tallies(definitions, &aggregate(&events)))
        });
        match fetched {
            Ok(definitions) => {
                self.definitions.insert_with_ttl(slug, definitions.clone(), self.definitions_ttl);
                Ok(definitions)
            }
            Err(err) => self.degrade(err, &format!("term {slug}"), |dataset| dataset.definitions(slug)),
        }
    }

    /// # Errors
    /// Returns the backend error when no fallback can answer.
    pub fn search(&self, query: &str) -> Result<Vec<SearchResult>, ApiError> {
        let key = query.trim().to_lowercase();
        if key.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(results) = self.searches.get(&key) {
            return Ok(results);
        }
        match self.execute(|backend| backend.search(&key, SEARCH_LIMIT)) {
            Ok(results) => {
                self.searches.insert(key, results.clone());
                Ok(results)
            }
            Err(err) => {
                self.degrade(err, "search", |dataset| Some(dataset.search(&key, SEARCH_LIMIT)))
            }
        }
    }

    /// Authoritative tallies for `definition_ids`, straight from the backend.
    ///
    /// # Errors
    /// Returns the backend error; there is no fallback for live tallies.
    pub fn vote_tallies(
        &self,
        definition_ids: &[String],
    ) -> Result<BTreeMap<String, VoteTally>, ApiError> {
        let events = self.execute(|backend| backend.vote_events(definition_ids))?;
        Ok(aggregate(&events))
    }

    /// Cast a vote and drop cached definition lists so the next read sees it.
    ///
    /// # Errors
    /// Returns [`ApiError::Validation`] for blank ids, or the backend error.
    pub fn vote(&self, vote: &VoteRequest) -> Result<VoteTransition, ApiError> {
        if vote.definition_id.trim().is_empty() {
            return Err(ApiError::missing("definitionId"));
        }
        if vote.user_id.trim().is_empty() {
            return Err(ApiError::missing("userId"));
        }
        let outcome = self.execute(|backend| backend.cast_vote(vote))?;
        self.definitions.clear();
        tracing::debug!(
            definition_id = %vote.definition_id,
            delta = outcome.delta,
            "vote recorded"
        );
        Ok(outcome)
    }

    /// # Errors
    /// Returns the backend error; submissions are never served from fallback.
    pub fn submit_definition(&self, submission: &Submission) -> Result<SubmissionReceipt, ApiError> {
        self.execute(|backend| backend.submit_definition(submission))
    }

    #[must_use]
    pub fn health(&self) -> HealthReport {
        let backend = match self.execute(|backend| backend.ping()) {
            Ok(()) => BackendStatus::Connected,
            Err(err) => {
                tracing::warn!(error = %err, "backend health check failed");
                BackendStatus::Disconnected
            }
        };
        HealthReport {
            status: "ok",
            backend,
            cache: CacheStats {
                terms: self.terms.len(),
                definitions: self.definitions.len(),
                searches: self.searches.len(),
            },
            fallback: self.fallback.is_some(),
        }
    }
}

/// Add live tallies to each definition's recorded counts, then rank.
#[must_use]
pub fn merge_tallies(
    mut definitions: Vec<Definition>,
    tallies: &BTreeMap<String, VoteTally>,
) -> Vec<Definition> {
    for definition in &mut definitions {
        if let Some(tally) = tallies.get(&definition.id) {
            definition.upvotes += tally.upvotes;
            definition.downvotes += tally.downvotes;
            definition.net_score = definition.upvotes - definition.downvotes;
        }
    }
    sort_definitions(&mut definitions);
    definitions
}
