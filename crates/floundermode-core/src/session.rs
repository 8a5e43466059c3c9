//! Toolkit-agnostic client state and command dispatch.
//!
//! A UI layer owns one [`ClientState`], forwards user actions through a
//! [`CommandDispatcher`], and renders the returned [`CommandOutcome`]. Votes
//! are applied optimistically and either confirmed with the authoritative
//! tally or reverted when the round-trip fails.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Definition, TermRecord};
use crate::normalize::sort_definitions;
use crate::search::{search, SearchResult};
use crate::votes::{transition, VoteTally, VoteTransition, VoteType};
use crate::DictionaryError;

const SEARCH_RESULT_LIMIT: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct ClientState {
    terms: Vec<TermRecord>,
    all_votes: BTreeMap<String, VoteTally>,
    user_votes: BTreeMap<String, VoteType>,
}

/// Optimistic vote awaiting the authoritative round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingVote<'a> {
    pub definition_id: &'a str,
    pub transition: VoteTransition,
    pub previous_tally: VoteTally,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionView {
    pub definition: Definition,
    pub user_vote: Option<VoteType>,
}

/// Modal content for one term.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TermView {
    pub term: String,
    pub slug: String,
    pub related: Vec<String>,
    pub definitions: Vec<DefinitionView>,
}

impl ClientState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_terms(&mut self, terms: Vec<TermRecord>) {
        self.terms = terms;
    }

    pub fn set_all_votes(&mut self, tallies: BTreeMap<String, VoteTally>) {
        self.all_votes = tallies;
    }

    pub fn set_user_votes(&mut self, votes: BTreeMap<String, VoteType>) {
        self.user_votes = votes;
    }

    #[must_use]
    pub fn terms(&self) -> &[TermRecord] {
        &self.terms
    }

    #[must_use]
    pub fn user_vote(&self, definition_id: &str) -> Option<VoteType> {
        self.user_votes.get(definition_id).copied()
    }

    fn find_definition(&self, definition_id: &str) -> Option<&Definition> {
        self.terms.iter().find_map(|record| record.find_definition(definition_id))
    }

    /// Current tally: fetched votes win over counts baked into the term data.
    #[must_use]
    pub fn tally(&self, definition_id: &str) -> Option<VoteTally> {
        if let Some(tally) = self.all_votes.get(definition_id) {
            return Some(*tally);
        }
        self.find_definition(definition_id).map(|definition| VoteTally {
            upvotes: definition.upvotes,
            downvotes: definition.downvotes,
            net_score: definition.net_score,
        })
    }

    /// Apply a click immediately and return what is needed to undo it.
    ///
    /// # Errors
    /// Returns [`DictionaryError::UnknownDefinition`] when no loaded term owns
    /// `definition_id`.
    pub fn begin_vote<'a>(
        &mut self,
        definition_id: &'a str,
        click: VoteType,
    ) -> Result<PendingVote<'a>, DictionaryError> {
        let previous_tally = self
            .tally(definition_id)
            .ok_or_else(|| DictionaryError::UnknownDefinition(definition_id.to_string()))?;
        let step = transition(self.user_vote(definition_id), click);

        self.all_votes.insert(definition_id.to_string(), previous_tally.apply(step));
        match step.current {
            Some(vote) => self.user_votes.insert(definition_id.to_string(), vote),
            None => self.user_votes.remove(definition_id),
        };

        Ok(PendingVote { definition_id, transition: step, previous_tally })
    }

    /// Replace the optimistic tally with the authoritative one, when provided.
    pub fn confirm_vote(&mut self, pending: &PendingVote<'_>, authoritative: Option<VoteTally>) {
        if let Some(tally) = authoritative {
            self.all_votes.insert(pending.definition_id.to_string(), tally);
        }
    }

    /// Undo an optimistic vote after a failed round-trip.
    pub fn revert_vote(&mut self, pending: &PendingVote<'_>) {
        self.all_votes.insert(pending.definition_id.to_string(), pending.previous_tally);
        match pending.transition.previous {
            Some(vote) => self.user_votes.insert(pending.definition_id.to_string(), vote),
            None => self.user_votes.remove(pending.definition_id),
        };
    }

    #[must_use]
    pub fn term_view(&self, slug: &str) -> Option<TermView> {
        let record = self.terms.iter().find(|record| record.slug == slug)?;
        let mut definitions = record
            .definitions
            .iter()
            .map(|definition| {
                let mut definition = definition.clone();
                if let Some(tally) = self.all_votes.get(&definition.id) {
                    definition.upvotes = tally.upvotes;
                    definition.downvotes = tally.downvotes;
                    definition.net_score = tally.net_score;
                }
                definition
            })
            .collect::<Vec<_>>();
        sort_definitions(&mut definitions);

        Some(TermView {
            term: record.term.clone(),
            slug: record.slug.clone(),
            related: record.related.clone(),
            definitions: definitions
                .into_iter()
                .map(|definition| DefinitionView {
                    user_vote: self.user_vote(&definition.id),
                    definition,
                })
                .collect(),
        })
    }
}

/// String arguments carried by a UI action (think `data-*` attributes).
pub type CommandArgs = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    VoteApplied { definition_id: String, transition: VoteTransition, previous_tally: VoteTally },
    TermView(TermView),
    SearchResults(Vec<SearchResult>),
}

type Handler = fn(&mut ClientState, &CommandArgs) -> Result<CommandOutcome, DictionaryError>;

/// Action name to handler table.
pub struct CommandDispatcher {
    handlers: BTreeMap<&'static str, Handler>,
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        let mut dispatcher = Self { handlers: BTreeMap::new() };
        dispatcher.register("vote-up", |state, args| vote(state, args, VoteType::Up));
        dispatcher.register("vote-down", |state, args| vote(state, args, VoteType::Down));
        dispatcher.register("open-term", open_term);
        dispatcher.register("search", run_search);
        dispatcher
    }
}

impl CommandDispatcher {
    pub fn register(&mut self, action: &'static str, handler: Handler) {
        self.handlers.insert(action, handler);
    }

    #[must_use]
    pub fn actions(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// # Errors
    /// Returns [`DictionaryError::UnknownAction`] for unregistered actions, or
    /// whatever the handler reports.
    pub fn dispatch(
        &self,
        action: &str,
        state: &mut ClientState,
        args: &CommandArgs,
    ) -> Result<CommandOutcome, DictionaryError> {
        let handler = self
            .handlers
            .get(action)
            .ok_or_else(|| DictionaryError::UnknownAction(action.to_string()))?;
        handler(state, args)
    }
}

fn required<'a>(args: &'a CommandArgs, key: &'static str) -> Result<&'a str, DictionaryError> {
    args.get(key)
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or(DictionaryError::MissingArgument(key))
}

fn vote(
    state: &mut ClientState,
    args: &CommandArgs,
    click: VoteType,
) -> Result<CommandOutcome, DictionaryError> {
    let definition_id = required(args, "definitionId")?;
    let pending = state.begin_vote(definition_id, click)?;
    Ok(CommandOutcome::VoteApplied {
        definition_id: definition_id.to_string(),
        transition: pending.transition,
        previous_tally: pending.previous_tally,
    })
}

fn open_term(state: &mut ClientState, args: &CommandArgs) -> Result<CommandOutcome, DictionaryError> {
    let slug = required(args, "slug")?;
    state
        .term_view(slug)
        .map(CommandOutcome::TermView)
        .ok_or_else(|| DictionaryError::Validation {
            field: "slug",
            message: format!("no term with slug `{slug}`"),
        })
}

fn run_search(state: &mut ClientState, args: &CommandArgs) -> Result<CommandOutcome, DictionaryError> {
    let query = args.get("query").map_or("", String::as_str);
    Ok(CommandOutcome::SearchResults(search(state.terms(), query, SEARCH_RESULT_LIMIT)))
}
