//! Domain model and pure logic for the Floundermode Dictionary.
//!
//! Everything in this crate is free of I/O: term-file parsing, legacy
//! normalization, content digests, page rendering, vote aggregation, search,
//! contribution payloads, and the toolkit-agnostic client state.

pub mod contribution;
pub mod hash;
pub mod model;
pub mod normalize;
pub mod render;
pub mod search;
pub mod session;
pub mod votes;

pub use contribution::{
    pull_request_payload, FieldLimits, PullRequestPayload, Submission, Validator, ValidatorChain,
};
pub use hash::{digest, ContentDigest};
pub use model::{Definition, SourceDefinition, TermFile, TermRecord, TermSummary};
pub use normalize::{definition_id, normalize, pin_definition_ids, slugify, sort_definitions};
pub use render::{PageRenderer, PageTemplate};
pub use search::{search, MatchKind, SearchResult};
pub use session::{ClientState, CommandArgs, CommandDispatcher, CommandOutcome, PendingVote, TermView};
pub use votes::{aggregate, transition, VoteEvent, VoteTally, VoteTransition, VoteType};

pub const MAX_TERM_CHARS: usize = 50;
pub const MAX_DEFINITION_CHARS: usize = 200;
pub const MAX_USAGE_CHARS: usize = 150;
pub const MAX_RELATED_TAGS: usize = 4;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum DictionaryError {
    #[error("validation error on `{field}`: {message}")]
    Validation { field: &'static str, message: String },
    #[error("term `{term}` has no definitions")]
    EmptyDefinitions { term: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("unknown definition: {0}")]
    UnknownDefinition(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
}

impl DictionaryError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { field, message: message.into() }
    }
}
