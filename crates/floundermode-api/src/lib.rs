//! Dictionary backend access: a rate-limited, cached client over Airtable,
//! Supabase or a local store, with a static fallback dataset.

mod airtable;
mod backend;
mod cache;
mod client;
mod config;
mod error;
mod fallback;
mod http;
mod limiter;
mod local;
mod supabase;

use std::path::Path;
use std::sync::Arc;

use floundermode_core::{
    Definition, FieldLimits, SearchResult, Submission, TermSummary, Validator, VoteTransition,
};
use serde::{Deserialize, Serialize};

pub use airtable::AirtableBackend;
pub use backend::{SubmissionReceipt, TermBackend, VoteRequest};
pub use cache::TtlCache;
pub use client::{
    merge_tallies, BackendStatus, CacheStats, CachedClient, HealthReport, SEARCH_LIMIT,
};
pub use config::{
    AirtableCredentials, BackendConfig, BackendKind, ClientTuning, SupabaseCredentials,
};
pub use error::ApiError;
pub use fallback::FallbackDataset;
pub use limiter::{Clock, ManualClock, RateLimitPolicy, RateLimiter, SystemClock};
pub use local::LocalBackend;
pub use supabase::SupabaseBackend;

/// Fields of a proposed definition as posted by the browser.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionData {
    pub definition: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub related: Vec<String>,
    #[serde(default)]
    pub author: Option<String>,
}

/// Entry point used by the proxy service and the build's live-vote lookup.
#[derive(Clone)]
pub struct DictionaryApi {
    client: Arc<CachedClient>,
}

impl DictionaryApi {
    #[must_use]
    pub fn new(client: CachedClient) -> Self {
        Self { client: Arc::new(client) }
    }

    /// Build the backend selected by `config`. Credentials are checked here,
    /// before any request is made.
    ///
    /// # Errors
    /// Returns [`ApiError::Configuration`] for missing credentials or an
    /// unreadable fallback directory, and [`ApiError::Storage`] when the local
    /// vote database cannot be opened.
    pub fn from_config(
        config: &BackendConfig,
        fallback_dir: Option<&Path>,
        votes_db: Option<&Path>,
    ) -> Result<Self, ApiError> {
        let fallback = fallback_dir.map(FallbackDataset::load_dir).transpose()?;

        let backend: Arc<dyn TermBackend> = match config.kind {
            BackendKind::Airtable => {
                Arc::new(AirtableBackend::new(&config.airtable_credentials()?, &config.tuning))
            }
            BackendKind::Supabase => {
                Arc::new(SupabaseBackend::new(&config.supabase_credentials()?, &config.tuning))
            }
            BackendKind::Local => {
                let dataset = fallback.clone().ok_or_else(|| {
                    ApiError::Configuration(
                        "the local backend needs a fallback terms directory".to_string(),
                    )
                })?;
                match votes_db {
                    Some(path) => Arc::new(LocalBackend::open(dataset, path)?),
                    None => Arc::new(LocalBackend::in_memory(dataset)?),
                }
            }
        };
        tracing::info!(backend = backend.name(), fallback = fallback.is_some(), "backend ready");

        Ok(Self::new(CachedClient::new(
            backend,
            &config.tuning,
            Arc::new(SystemClock::default()),
            fallback,
        )))
    }

    #[must_use]
    pub fn client(&self) -> &CachedClient {
        &self.client
    }

    /// # Errors
    /// See [`CachedClient::fetch_terms`].
    pub fn list_terms(&self) -> Result<Vec<TermSummary>, ApiError> {
        self.client.fetch_terms()
    }

    /// # Errors
    /// See [`CachedClient::definitions_for`].
    pub fn definitions(&self, slug: &str) -> Result<Vec<Definition>, ApiError> {
        self.client.definitions_for(slug)
    }

    /// # Errors
    /// See [`CachedClient::search`].
    pub fn search(&self, query: &str) -> Result<Vec<SearchResult>, ApiError> {
        self.client.search(query)
    }

    /// # Errors
    /// See [`CachedClient::vote`].
    pub fn vote(&self, request: &VoteRequest) -> Result<VoteTransition, ApiError> {
        self.client.vote(request)
    }

    /// Validate a proposed definition and hand it to the backend for review.
    ///
    /// # Errors
    /// Returns [`ApiError::Validation`] naming the rejected field, or the backend error.
    pub fn submit_definition(
        &self,
        term_name: &str,
        data: &DefinitionData,
    ) -> Result<SubmissionReceipt, ApiError> {
        let submission = Submission {
            term: term_name.to_string(),
            definition: data.definition.clone(),
            usage: data.usage.clone(),
            related: data.related.clone(),
            author: data.author.clone(),
        };
        FieldLimits.validate(&submission)?;
        self.client.submit_definition(&submission)
    }

    #[must_use]
    pub fn health(&self) -> HealthReport {
        self.client.health()
    }
}
