use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::DictionaryError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    /// # Errors
    /// Returns [`DictionaryError::Validation`] for anything other than `up`/`down`.
    pub fn parse(value: &str) -> Result<Self, DictionaryError> {
        match value {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(DictionaryError::Validation {
                field: "voteType",
                message: format!("voteType MUST be `up` or `down`, got `{other}`"),
            }),
        }
    }

    fn weight(vote: Option<Self>) -> i64 {
        match vote {
            Some(Self::Up) => 1,
            Some(Self::Down) => -1,
            None => 0,
        }
    }
}

/// One live vote. The backing store keeps at most one per `(definition_id, user_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteEvent {
    pub definition_id: String,
    pub user_id: String,
    pub vote_type: VoteType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub upvotes: i64,
    pub downvotes: i64,
    pub net_score: i64,
}

impl VoteTally {
    #[must_use]
    pub fn new(upvotes: i64, downvotes: i64) -> Self {
        Self { upvotes, downvotes, net_score: upvotes - downvotes }
    }

    /// Tally after moving one user's vote along `transition`.
    #[must_use]
    pub fn apply(self, transition: VoteTransition) -> Self {
        let mut upvotes = self.upvotes;
        let mut downvotes = self.downvotes;
        match transition.previous {
            Some(VoteType::Up) => upvotes -= 1,
            Some(VoteType::Down) => downvotes -= 1,
            None => {}
        }
        match transition.current {
            Some(VoteType::Up) => upvotes += 1,
            Some(VoteType::Down) => downvotes += 1,
            None => {}
        }
        Self::new(upvotes, downvotes)
    }
}

/// Result of one click on a vote button.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteTransition {
    pub previous: Option<VoteType>,
    pub current: Option<VoteType>,
    /// Signed change to the displayed net score.
    pub delta: i64,
}

/// Same type toggles off, opposite type switches, no prior vote adds.
#[must_use]
pub fn transition(previous: Option<VoteType>, click: VoteType) -> VoteTransition {
    let current = if previous == Some(click) { None } else { Some(click) };
    VoteTransition {
        previous,
        current,
        delta: VoteType::weight(current) - VoteType::weight(previous),
    }
}

/// Count up/down events per definition. Trusts upstream uniqueness and does
/// not deduplicate.
#[must_use]
pub fn aggregate(events: &[VoteEvent]) -> BTreeMap<String, VoteTally> {
    let mut tallies: BTreeMap<String, VoteTally> = BTreeMap::new();
    for event in events {
        let tally = tallies.entry(event.definition_id.clone()).or_default();
        match event.vote_type {
            VoteType::Up => tally.upvotes += 1,
            VoteType::Down => tally.downvotes += 1,
        }
    }
    for tally in tallies.values_mut() {
        tally.net_score = tally.upvotes - tally.downvotes;
    }
    tallies
}
