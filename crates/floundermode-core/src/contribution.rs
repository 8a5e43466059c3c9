use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::model::{validate_definition_text, validate_related, validate_term_name};
use crate::model::{SourceDefinition, TermFile};
use crate::normalize::{definition_id, slugify};
use crate::DictionaryError;

/// A visitor-submitted term.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub term: String,
    pub definition: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub related: Vec<String>,
    #[serde(default)]
    pub author: Option<String>,
}

/// Pluggable check run over submissions before anything is generated.
pub trait Validator {
    /// # Errors
    /// Returns [`DictionaryError::Validation`] naming the rejected field.
    fn validate(&self, submission: &Submission) -> Result<(), DictionaryError>;
}

/// Presence and length limits shared with term-file validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldLimits;

impl Validator for FieldLimits {
    fn validate(&self, submission: &Submission) -> Result<(), DictionaryError> {
        validate_term_name(&submission.term)?;
        validate_definition_text(&submission.definition, &submission.usage)?;
        validate_related(&submission.related)?;
        if slugify(&submission.term).is_empty() {
            return Err(DictionaryError::validation(
                "term",
                "term MUST contain at least one letter or digit",
            ));
        }
        Ok(())
    }
}

/// Runs validators in order and stops at the first rejection.
#[derive(Default)]
pub struct ValidatorChain {
    validators: Vec<Box<dyn Validator + Send + Sync>>,
}

impl ValidatorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, validator: impl Validator + Send + Sync + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }
}

impl Validator for ValidatorChain {
    fn validate(&self, submission: &Submission) -> Result<(), DictionaryError> {
        for validator in &self.validators {
            validator.validate(submission)?;
        }
        Ok(())
    }
}

impl Submission {
    /// Term file in the multi-definition shape, dated `date`.
    #[must_use]
    pub fn to_term_file(&self, date: Date) -> TermFile {
        let slug = slugify(&self.term);
        TermFile::Multi {
            term: self.term.trim().to_string(),
            related: self.related.iter().map(|tag| tag.trim().to_string()).collect(),
            definitions: vec![SourceDefinition {
                id: Some(definition_id(&slug, 1)),
                definition: self.definition.trim().to_string(),
                usage: self.usage.trim().to_string(),
                author: self.author.as_ref().map(|author| author.trim().to_string()),
                date: Some(iso_date(date)),
                is_primary: Some(true),
                upvotes: Some(0),
                downvotes: Some(0),
                net_score: Some(0),
                votes: None,
            }],
        }
    }
}

/// Everything needed to open a pull request adding one term file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestPayload {
    pub branch: String,
    pub file_path: String,
    pub file_content: String,
    pub commit_message: String,
    pub title: String,
    pub body: String,
}

/// Validate `submission` with `validator` and build its pull-request payload.
///
/// # Errors
/// Returns the validator's rejection, or [`DictionaryError::Parse`] if the
/// term file cannot be serialized.
pub fn pull_request_payload(
    submission: &Submission,
    validator: &dyn Validator,
    date: Date,
) -> Result<PullRequestPayload, DictionaryError> {
    validator.validate(submission)?;

    let slug = slugify(&submission.term);
    let term = submission.term.trim();
    let file = submission.to_term_file(date);
    let mut file_content = serde_json::to_string_pretty(&file)
        .map_err(|err| DictionaryError::Parse(format!("failed to serialize term file: {err}")))?;
    file_content.push('\n');

    let mut body = String::new();
    let _ = writeln!(body, "## New term: {term}\n");
    let _ = writeln!(body, "**Definition:** {}\n", submission.definition.trim());
    if !submission.usage.trim().is_empty() {
        let _ = writeln!(body, "**Usage:** {}\n", submission.usage.trim());
    }
    if !submission.related.is_empty() {
        let _ = writeln!(body, "**Related:** {}\n", submission.related.join(", "));
    }
    let author = submission.author.as_deref().map_or("anonymous", str::trim);
    let _ = writeln!(body, "Submitted by {author} on {}.", iso_date(date));

    Ok(PullRequestPayload {
        branch: format!("add-term/{slug}"),
        file_path: format!("terms/{slug}.json"),
        file_content,
        commit_message: format!("Add term: {term}"),
        title: format!("Add \"{term}\" to the dictionary"),
        body,
    })
}

fn iso_date(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use time::Month;

    fn fixture_date() -> Date {
        match Date::from_calendar_date(2024, Month::March, 7) {
            Ok(date) => date,
            Err(err) => panic!("invalid fixture date: {err}"),
        }
    }

    fn submission() -> Submission {
        Submission {
            term: "Quiet Quitting".to_string(),
            definition: "Doing exactly the job you were hired for.".to_string(),
            usage: "He's not lazy, he's quiet quitting.".to_string(),
            related: vec!["work".to_string()],
            author: Some("flounder".to_string()),
        }
    }

    struct RejectEverything;

    impl Validator for RejectEverything {
        fn validate(&self, _submission: &Submission) -> Result<(), DictionaryError> {
            Err(DictionaryError::validation("definition", "blocked"))
        }
    }

    #[test]
    fn payload_contains_a_parseable_term_file() -> Result<(), DictionaryError> {
        let payload = pull_request_payload(&submission(), &FieldLimits, fixture_date())?;
        assert_eq!(payload.branch, "add-term/quiet-quitting");
        assert_eq!(payload.file_path, "terms/quiet-quitting.json");
        assert_eq!(payload.commit_message, "Add term: Quiet Quitting");
        assert!(payload.body.contains("Submitted by flounder on 2024-03-07."));

        let parsed = TermFile::parse(payload.file_content.as_bytes())?;
        let record = normalize(&parsed);
        assert_eq!(record.slug, "quiet-quitting");
        assert_eq!(record.definitions[0].id, "quiet-quitting-def-1");
        assert_eq!(record.definitions[0].date.as_deref(), Some("2024-03-07"));
        Ok(())
    }

    #[test]
    fn field_limits_reject_oversized_definition() {
        let mut oversized = submission();
        oversized.definition = "x".repeat(crate::MAX_DEFINITION_CHARS + 1);
        assert!(matches!(
            pull_request_payload(&oversized, &FieldLimits, fixture_date()),
            Err(DictionaryError::Validation { field: "definition", .. })
        ));

        let mut punctuation_only = submission();
        punctuation_only.term = "!!!".to_string();
        assert!(matches!(
            FieldLimits.validate(&punctuation_only),
            Err(DictionaryError::Validation { field: "term", .. })
        ));
    }

    #[test]
    fn chain_stops_at_first_rejection() {
        let chain = ValidatorChain::new().with(FieldLimits).with(RejectEverything);
        assert!(matches!(
            chain.validate(&submission()),
            Err(DictionaryError::Validation { field: "definition", .. })
        ));
        assert!(ValidatorChain::new().with(FieldLimits).validate(&submission()).is_ok());
    }
}
