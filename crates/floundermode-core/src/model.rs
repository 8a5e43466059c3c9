use serde::{Deserialize, Serialize};

use crate::normalize::display_order;
use crate::{
    DictionaryError, MAX_DEFINITION_CHARS, MAX_RELATED_TAGS, MAX_TERM_CHARS, MAX_USAGE_CHARS,
};

/// One definition as it appears in a multi-definition term file.
///
/// Every vote field is optional so that older files carrying only the scalar
/// `votes` count still parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SourceDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub definition: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upvotes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downvotes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<i64>,
}

/// A term file in either of its two on-disk shapes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TermFile {
    Legacy {
        term: String,
        related: Vec<String>,
        definition: String,
        usage: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        date: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        votes: Option<i64>,
    },
    Multi {
        term: String,
        related: Vec<String>,
        definitions: Vec<SourceDefinition>,
    },
}

#[derive(Debug, Deserialize)]
struct RawTermFile {
    term: Option<String>,
    #[serde(default)]
    related: Vec<String>,
    definitions: Option<Vec<SourceDefinition>>,
    definition: Option<String>,
    #[serde(default)]
    usage: String,
    author: Option<String>,
    date: Option<String>,
    votes: Option<i64>,
}

impl TermFile {
    /// Parse the raw bytes of one term file.
    ///
    /// # Errors
    /// Returns [`DictionaryError::Parse`] for malformed JSON or when neither
    /// `definitions` nor the legacy `definition` field is present.
    pub fn parse(bytes: &[u8]) -> Result<Self, DictionaryError> {
        let raw: RawTermFile = serde_json::from_slice(bytes)
            .map_err(|err| DictionaryError::Parse(format!("invalid term JSON: {err}")))?;
        let term = raw
            .term
            .ok_or_else(|| DictionaryError::Parse("missing required field `term`".to_string()))?;

        if let Some(definitions) = raw.definitions {
            return Ok(Self::Multi { term, related: raw.related, definitions });
        }

        let Some(definition) = raw.definition else {
            return Err(DictionaryError::Parse(format!(
                "term `{term}` has neither `definitions` nor `definition`"
            )));
        };

        Ok(Self::Legacy {
            term,
            related: raw.related,
            definition,
            usage: raw.usage,
            author: raw.author,
            date: raw.date,
            votes: raw.votes,
        })
    }

    #[must_use]
    pub fn term(&self) -> &str {
        match self {
            Self::Legacy { term, .. } | Self::Multi { term, .. } => term,
        }
    }

    #[must_use]
    pub fn related(&self) -> &[String] {
        match self {
            Self::Legacy { related, .. } | Self::Multi { related, .. } => related,
        }
    }
}

/// Canonical definition shape used everywhere after normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    pub id: String,
    pub definition: String,
    pub usage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    pub upvotes: i64,
    pub downvotes: i64,
    pub net_score: i64,
}

/// Canonical term record. Built once from a [`TermFile`] or a backend row and
/// never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TermRecord {
    pub term: String,
    pub slug: String,
    pub related: Vec<String>,
    pub definitions: Vec<Definition>,
}

impl TermRecord {
    /// Check field presence and length limits.
    ///
    /// # Errors
    /// Returns [`DictionaryError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), DictionaryError> {
        validate_term_name(&self.term)?;
        validate_related(&self.related)?;
        for definition in &self.definitions {
            validate_definition_text(&definition.definition, &definition.usage)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn summary(&self) -> TermSummary {
        TermSummary {
            term: self.term.clone(),
            slug: self.slug.clone(),
            related: self.related.clone(),
            definition_count: self.definitions.len(),
            top_definition: self
                .definitions
                .iter()
                .min_by(|lhs, rhs| display_order(lhs, rhs))
                .map(|definition| definition.definition.clone()),
        }
    }

    #[must_use]
    pub fn find_definition(&self, definition_id: &str) -> Option<&Definition> {
        self.definitions.iter().find(|definition| definition.id == definition_id)
    }
}

/// Term list entry returned by `GET /terms`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TermSummary {
    pub term: String,
    pub slug: String,
    pub related: Vec<String>,
    pub definition_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_definition: Option<String>,
}

pub(crate) fn validate_term_name(term: &str) -> Result<(), DictionaryError> {
    if term.trim().is_empty() {
        return Err(DictionaryError::validation("term", "term MUST be non-empty"));
    }
    if term.chars().count() > MAX_TERM_CHARS {
        return Err(DictionaryError::validation(
            "term",
            format!("term MUST be at most {MAX_TERM_CHARS} characters"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_definition_text(definition: &str, usage: &str) -> Result<(), DictionaryError> {
    if definition.trim().is_empty() {
        return Err(DictionaryError::validation("definition", "definition MUST be non-empty"));
    }
    if definition.chars().count() > MAX_DEFINITION_CHARS {
        return Err(DictionaryError::validation(
            "definition",
            format!("definition MUST be at most {MAX_DEFINITION_CHARS} characters"),
        ));
    }
    if usage.chars().count() > MAX_USAGE_CHARS {
        return Err(DictionaryError::validation(
            "usage",
            format!("usage MUST be at most {MAX_USAGE_CHARS} characters"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_related(related: &[String]) -> Result<(), DictionaryError> {
    if related.len() > MAX_RELATED_TAGS {
        return Err(DictionaryError::validation(
            "related",
            format!("related MUST contain at most {MAX_RELATED_TAGS} tags"),
        ));
    }
    if related.iter().any(|tag| tag.trim().is_empty()) {
        return Err(DictionaryError::validation("related", "related tags MUST be non-empty"));
    }
    Ok(())
}
