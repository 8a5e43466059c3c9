use std::collections::BTreeMap;

use floundermode_core::{
    normalize, search, slugify, transition, Definition, SearchResult, SourceDefinition, Submission,
    TermFile, TermRecord, TermSummary, VoteEvent, VoteTransition, VoteType,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::backend::{published_definitions, SubmissionReceipt, TermBackend, VoteRequest};
use crate::config::{AirtableCredentials, ClientTuning};
use crate::http::{agent, call, read_json, send_json};
use crate::ApiError;

const AIRTABLE_ENDPOINT: &str = "https://api.airtable.com/v0";
const TERMS_TABLE: &str = "Terms";
const DEFINITIONS_TABLE: &str = "Definitions";
const VOTES_TABLE: &str = "Votes";
const PAGE_SIZE: &str = "100";
/// Definitions are listed oldest first, so derived ids follow submission order.
const DEFINITION_SORT: &[(&str, &str)] =
    &[("sort[0][field]", "CreatedAt"), ("sort[0][direction]", "asc")];

#[derive(Debug, Deserialize)]
struct RecordPage<F> {
    records: Vec<AirtableRecord<F>>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AirtableRecord<F> {
    id: String,
    fields: F,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TermFields {
    term: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    related: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DefinitionFields {
    #[serde(default)]
    definition_id: Option<String>,
    #[serde(default)]
    term_slug: Option<String>,
    #[serde(default)]
    definition: String,
    #[serde(default)]
    usage: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    is_primary: Option<bool>,
    #[serde(default)]
    upvotes: Option<i64>,
    #[serde(default)]
    downvotes: Option<i64>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VoteFields {
    definition_id: String,
    user_id: String,
    vote_type: String,
}

impl From<DefinitionFields> for SourceDefinition {
    fn from(fields: DefinitionFields) -> Self {
        Self {
            id: fields.definition_id,
            definition: fields.definition,
            usage: fields.usage,
            author: fields.author,
            date: fields.date,
            is_primary: fields.is_primary,
            upvotes: fields.upvotes,
            downvotes: fields.downvotes,
            net_score: None,
            votes: None,
        }
    }
}

/// Airtable REST backend over the `Terms`, `Definitions` and `Votes` tables.
pub struct AirtableBackend {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl AirtableBackend {
    #[must_use]
    pub fn new(credentials: &AirtableCredentials, tuning: &ClientTuning) -> Self {
        Self::with_endpoint(AIRTABLE_ENDPOINT, credentials, tuning)
    }

    #[must_use]
    pub fn with_endpoint(
        endpoint: &str,
        credentials: &AirtableCredentials,
        tuning: &ClientTuning,
    ) -> Self {
        Self {
            agent: agent(tuning.request_timeout),
            base_url: format!("{}/{}", endpoint.trim_end_matches('/'), credentials.base_id),
            api_key: credentials.api_key.clone(),
        }
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .request(method, &format!("{}/{path}", self.base_url))
            .set("Authorization", &format!("Bearer {}", self.api_key))
    }

    fn list_request(
        &self,
        table: &str,
        formula: Option<&str>,
        sort: &[(&str, &str)],
        offset: Option<&str>,
    ) -> ureq::Request {
        let mut request = self.request("GET", table).query("pageSize", PAGE_SIZE);
        if let Some(formula) = formula {
            request = request.query("filterByFormula", formula);
        }
        for (param, value) in sort {
            request = request.query(param, value);
        }
        if let Some(offset) = offset {
            request = request.query("offset", offset);
        }
        request
    }

    fn list_all<F: DeserializeOwned>(
        &self,
        table: &str,
        formula: Option<&str>,
        sort: &[(&str, &str)],
    ) -> Result<Vec<AirtableRecord<F>>, ApiError> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let request = self.list_request(table, formula, sort, offset.as_deref());
            let page: RecordPage<F> = read_json(call(request)?)?;
            records.extend(page.records);
            match page.offset {
                Some(next) => offset = Some(next),
                None => return Ok(records),
            }
        }
    }

    fn records(&self) -> Result<Vec<TermRecord>, ApiError> {
        let terms = self.list_all::<TermFields>(TERMS_TABLE, None, &[])?;
        let definitions =
            self.list_all::<DefinitionFields>(DEFINITIONS_TABLE, None, DEFINITION_SORT)?;
        Ok(assemble_records(
            terms.into_iter().map(|record| record.fields).collect(),
            definitions.into_iter().map(|record| record.fields).collect(),
        ))
    }

    fn find_vote(&self, vote: &VoteRequest) -> Result<Option<AirtableRecord<VoteFields>>, ApiError> {
        let formula = format!(
            "AND({{DefinitionId}}={},{{UserId}}={})",
            formula_literal(&vote.definition_id),
            formula_literal(&vote.user_id)
        );
        Ok(self.list_all::<VoteFields>(VOTES_TABLE, Some(&formula), &[])?.into_iter().next())
    }
}

impl TermBackend for AirtableBackend {
    fn name(&self) -> &'static str {
        "airtable"
    }

    fn list_terms(&self) -> Result<Vec<TermSummary>, ApiError> {
        Ok(self.records()?.iter().map(TermRecord::summary).collect())
    }

    fn definitions(&self, slug: &str) -> Result<Vec<Definition>, ApiError> {
        let formula = format!("{{TermSlug}}={}", formula_literal(slug));
        let rows = self
            .list_all::<DefinitionFields>(DEFINITIONS_TABLE, Some(&formula), DEFINITION_SORT)?
            .into_iter()
            .map(|record| record.fields)
            .collect::<Vec<_>>();
        let definitions = published_definitions(slug, rows, is_published);
        if definitions.is_empty() {
            return Err(ApiError::NotFound(format!("term {slug}")));
        }
        let file = TermFile::Multi { term: slug.to_string(), related: Vec::new(), definitions };
        Ok(normalize(&file).definitions)
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ApiError> {
        Ok(search(&self.records()?, query, limit))
    }

    fn vote_events(&self, definition_ids: &[String]) -> Result<Vec<VoteEvent>, ApiError> {
        let formula = (!definition_ids.is_empty()).then(|| {
            let clauses = definition_ids
                .iter()
                .map(|id| format!("{{DefinitionId}}={}", formula_literal(id)))
                .collect::<Vec<_>>();
            format!("OR({})", clauses.join(","))
        });
        self.list_all::<VoteFields>(VOTES_TABLE, formula.as_deref(), &[])?
            .into_iter()
            .map(|record| {
                Ok(VoteEvent {
                    vote_type: VoteType::parse(&record.fields.vote_type)?,
                    definition_id: record.fields.definition_id,
                    user_id: record.fields.user_id,
                })
            })
            .collect()
    }

    fn cast_vote(&self, vote: &VoteRequest) -> Result<VoteTransition, ApiError> {
        let existing = self.find_vote(vote)?;
        let previous = existing
            .as_ref()
            .map(|record| VoteType::parse(&record.fields.vote_type))
            .transpose()?;
        let outcome = transition(previous, vote.vote_type);

        match (existing, outcome.current) {
            (Some(record), None) => {
                call(self.request("DELETE", &format!("{VOTES_TABLE}/{}", record.id)))?;
            }
            (Some(record), Some(current)) => {
                send_json(
                    self.request("PATCH", &format!("{VOTES_TABLE}/{}", record.id)),
                    &json!({ "fields": { "VoteType": current.as_str() } }),
                )?;
            }
            (None, Some(current)) => {
                send_json(
                    self.request("POST", VOTES_TABLE),
                    &json!({ "records": [{ "fields": {
                        "DefinitionId": vote.definition_id,
                        "UserId": vote.user_id,
                        "VoteType": current.as_str(),
                    } }] }),
                )?;
            }
            (None, None) => {}
        }
        Ok(outcome)
    }

    fn submit_definition(&self, submission: &Submission) -> Result<SubmissionReceipt, ApiError> {
        let response = send_json(
            self.request("POST", DEFINITIONS_TABLE),
            &json!({ "records": [{ "fields": {
                "TermName": submission.term.trim(),
                "TermSlug": slugify(&submission.term),
                "Definition": submission.definition.trim(),
                "Usage": submission.usage.trim(),
                "Related": submission.related,
                "Author": submission.author,
                "Status": "pending",
            } }] }),
        )?;
        let page: RecordPage<serde_json::Value> = read_json(response)?;
        page.records
            .into_iter()
            .next()
            .map(|record| SubmissionReceipt { id: record.id })
            .ok_or_else(|| ApiError::Decode("airtable returned no created record".to_string()))
    }

    fn ping(&self) -> Result<(), ApiError> {
        call(self.request("GET", TERMS_TABLE).query("maxRecords", "1")).map(|_| ())
    }
}

fn is_published(fields: &DefinitionFields) -> bool {
    fields.status.as_deref().map_or(true, |status| status != "pending")
}

/// Quote `value` as an Airtable formula string literal.
fn formula_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn assemble_records(terms: Vec<TermFields>, definitions: Vec<DefinitionFields>) -> Vec<TermRecord> {
    let mut by_slug: BTreeMap<String, Vec<DefinitionFields>> = BTreeMap::new();
    for fields in definitions {
        if let Some(slug) = fields.term_slug.clone() {
            by_slug.entry(slug).or_default().push(fields);
        }
    }

    terms
        .into_iter()
        .map(|fields| {
            let slug = fields.slug.clone().unwrap_or_else(|| slugify(&fields.term));
            let file = TermFile::Multi {
                term: fields.term,
                related: fields.related,
                definitions: published_definitions(
                    &slug,
                    by_slug.remove(&slug).unwrap_or_default(),
                    is_published,
                ),
            };
            let mut record = normalize(&file);
            record.slug = slug;
            record
        })
        .collect()
}
