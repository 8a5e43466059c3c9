use floundermode_core::{
    normalize, search, slugify, transition, Definition, SearchResult, SourceDefinition, Submission,
    TermFile, TermRecord, TermSummary, VoteEvent, VoteTransition, VoteType,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::backend::{published_definitions, SubmissionReceipt, TermBackend, VoteRequest};
use crate::config::{ClientTuning, SupabaseCredentials};
use crate::http::{agent, call, read_json, send_json};
use crate::ApiError;

const DEFINITION_COLUMNS: &str = "id,definition,usage,author,date,is_primary,upvotes,downvotes,status";
/// Oldest first with the row id as tie-break, so derived ids follow submission order.
const DEFINITION_ORDER: &str = "created_at.asc,id.asc";

#[derive(Debug, Clone, Deserialize)]
struct TermRow {
    term: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    related: Vec<String>,
    #[serde(default)]
    definitions: Vec<DefinitionRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DefinitionRow {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    definition: String,
    #[serde(default)]
    usage: Option<String>,
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
struct VoteRow {
    definition_id: String,
    user_id: String,
    vote_type: String,
}

impl DefinitionRow {
    fn is_published(&self) -> bool {
        self.status.as_deref().map_or(true, |status| status != "pending")
    }
}

impl From<DefinitionRow> for SourceDefinition {
    fn from(row: DefinitionRow) -> Self {
        Self {
            id: row.id.as_ref().and_then(value_as_id),
            definition: row.definition,
            usage: row.usage.unwrap_or_default(),
            author: row.author,
            date: row.date,
            is_primary: row.is_primary,
            upvotes: row.upvotes,
            downvotes: row.downvotes,
            net_score: None,
            votes: None,
        }
    }
}

/// Supabase (PostgREST) backend over the `terms`, `definitions` and `votes` tables.
pub struct SupabaseBackend {
    agent: ureq::Agent,
    rest_url: String,
    anon_key: String,
}

impl SupabaseBackend {
    #[must_use]
    pub fn new(credentials: &SupabaseCredentials, tuning: &ClientTuning) -> Self {
        Self {
            agent: agent(tuning.request_timeout),
            rest_url: format!("{}/rest/v1", credentials.url.trim_end_matches('/')),
            anon_key: credentials.anon_key.clone(),
        }
    }

    fn request(&self, method: &str, table: &str) -> ureq::Request {
        self.agent
            .request(method, &format!("{}/{table}", self.rest_url))
            .set("apikey", &self.anon_key)
            .set("Authorization", &format!("Bearer {}", self.anon_key))
    }

    fn rows<T: DeserializeOwned>(&self, request: ureq::Request) -> Result<Vec<T>, ApiError> {
        read_json(call(request)?)
    }

    fn records_request(&self) -> ureq::Request {
        let select = format!("term,slug,related,definitions({DEFINITION_COLUMNS})");
        self.request("GET", "terms")
            .query("select", &select)
            .query("order", "term.asc")
            .query("definitions.order", DEFINITION_ORDER)
    }

    fn definitions_request(&self, slug: &str) -> ureq::Request {
        self.request("GET", "definitions")
            .query("select", DEFINITION_COLUMNS)
            .query("term_slug", &format!("eq.{slug}"))
            .query("order", DEFINITION_ORDER)
    }

    fn records(&self) -> Result<Vec<TermRecord>, ApiError> {
        let rows: Vec<TermRow> = self.rows(self.records_request())?;
        Ok(rows.into_iter().map(term_record).collect())
    }

    fn vote_filter(vote: &VoteRequest) -> [(&'static str, String); 2] {
        [
            ("definition_id", format!("eq.{}", vote.definition_id)),
            ("user_id", format!("eq.{}", vote.user_id)),
        ]
    }
}

impl TermBackend for SupabaseBackend {
    fn name(&self) -> &'static str {
        "supabase"
    }

    fn list_terms(&self) -> Result<Vec<TermSummary>, ApiError> {
        Ok(self.records()?.iter().map(TermRecord::summary).collect())
    }

    fn definitions(&self, slug: &str) -> Result<Vec<Definition>, ApiError> {
        let rows: Vec<DefinitionRow> = self.rows(self.definitions_request(slug))?;
        let definitions = published_definitions(slug, rows, DefinitionRow::is_published);
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
        let mut request =
            self.request("GET", "votes").query("select", "definition_id,user_id,vote_type");
        if !definition_ids.is_empty() {
            request = request.query("definition_id", &in_filter(definition_ids));
        }
        let rows: Vec<VoteRow> = self.rows(request)?;
        rows.into_iter()
            .map(|row| {
                Ok(VoteEvent {
                    vote_type: VoteType::parse(&row.vote_type)?,
                    definition_id: row.definition_id,
                    user_id: row.user_id,
                })
            })
            .collect()
    }

    fn cast_vote(&self, vote: &VoteRequest) -> Result<VoteTransition, ApiError> {
        let filter = Self::vote_filter(vote);
        let mut lookup =
            self.request("GET", "votes").query("select", "definition_id,user_id,vote_type");
        for (column, value) in &filter {
            lookup = lookup.query(column, value);
        }
        let existing: Vec<VoteRow> = self.rows(lookup)?;
        let previous =
            existing.first().map(|row| VoteType::parse(&row.vote_type)).transpose()?;
        let outcome = transition(previous, vote.vote_type);

        let scoped = |method: &str| {
            filter
                .iter()
                .fold(self.request(method, "votes"), |request, (column, value)| {
                    request.query(column, value)
                })
        };
        match (previous, outcome.current) {
            (Some(_), None) => {
                call(scoped("DELETE"))?;
            }
            (Some(_), Some(current)) => {
                send_json(scoped("PATCH"), &json!({ "vote_type": current.as_str() }))?;
            }
            (None, Some(current)) => {
                send_json(
                    self.request("POST", "votes"),
                    &json!({
                        "definition_id": vote.definition_id,
                        "user_id": vote.user_id,
                        "vote_type": current.as_str(),
                    }),
                )?;
            }
            (None, None) => {}
        }
        Ok(outcome)
    }

    fn submit_definition(&self, submission: &Submission) -> Result<SubmissionReceipt, ApiError> {
        let response = send_json(
            self.request("POST", "definitions").set("Prefer", "return=representation"),
            &json!({
                "term_name": submission.term.trim(),
                "term_slug": slugify(&submission.term),
                "definition": submission.definition.trim(),
                "usage": submission.usage.trim(),
                "related": submission.related,
                "author": submission.author,
                "status": "pending",
            }),
        )?;
        let rows: Vec<DefinitionRow> = read_json(response)?;
        rows.first()
            .and_then(|row| row.id.as_ref())
            .and_then(value_as_id)
            .map(|id| SubmissionReceipt { id })
            .ok_or_else(|| ApiError::Decode("supabase returned no created row".to_string()))
    }

    fn ping(&self) -> Result<(), ApiError> {
        call(self.request("GET", "terms").query("select", "slug").query("limit", "1")).map(|_| ())
    }
}

fn term_record(row: TermRow) -> TermRecord {
    let slug = row.slug.clone().unwrap_or_else(|| slugify(&row.term));
    let file = TermFile::Multi {
        term: row.term,
        related: row.related,
        definitions: published_definitions(&slug, row.definitions, DefinitionRow::is_published),
    };
    let mut record = normalize(&file);
    record.slug = slug;
    record
}

fn value_as_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(id) => Some(id.clone()),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// PostgREST `in.(...)` filter with each value double-quoted.
fn in_filter(values: &[String]) -> String {
    let quoted = values
        .iter()
        .map(|value| format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect::<Vec<_>>();
    format!("in.({})", quoted.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_rows_become_term_records() -> Result<(), serde_json::Error> {
        let rows: Vec<TermRow> = serde_json::from_str(
            r#"[{"term":"Bandwidth","slug":"bandwidth","related":["work"],"definitions":[
                {"id":17,"definition":"Willingness, disguised as capacity.","usage":null,"upvotes":3,"downvotes":0},
                {"id":"bandwidth-def-2","definition":"Not yet reviewed.","status":"pending"}
            ]}]"#,
        )?;
        let record = term_record(rows.into_iter().next().unwrap_or_else(|| panic!("no rows")));
        assert_eq!(record.slug, "bandwidth");
        assert_eq!(record.definitions.len(), 1);
        assert_eq!(record.definitions[0].id, "17");
        assert_eq!(record.definitions[0].net_score, 3);
        assert_eq!(record.definitions[0].usage, "");
        Ok(())
    }

    #[test]
    fn in_filter_quotes_values() {
        assert_eq!(
            in_filter(&["a-def-1".to_string(), "b,\"c\"".to_string()]),
            r#"in.("a-def-1","b,\"c\"")"#
        );
    }

    #[test]
    fn pending_rows_do_not_shift_derived_ids() -> Result<(), serde_json::Error> {
        let rows: Vec<TermRow> = serde_json::from_str(
            r#"[{"term":"Bandwidth","slug":"bandwidth","definitions":[
                {"definition":"Not yet reviewed.","status":"pending"},
                {"definition":"Willingness, disguised as capacity."},
                {"definition":"Calendar space.","status":"approved"}
            ]}]"#,
        )?;
        let record = term_record(rows.into_iter().next().unwrap_or_else(|| panic!("no rows")));
        let ids = record.definitions.iter().map(|d| d.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["bandwidth-def-2", "bandwidth-def-3"]);
        Ok(())
    }

    #[test]
    fn definition_queries_request_a_stable_order() {
        let backend = SupabaseBackend::new(
            &SupabaseCredentials {
                url: "https://project.supabase.test/".to_string(),
                anon_key: "anon".to_string(),
            },
            &ClientTuning::default(),
        );

        let records = backend
            .records_request()
            .request_url()
            .unwrap_or_else(|err| panic!("invalid request url: {err}"));
        assert!(records.query_pairs().contains(&("definitions.order", DEFINITION_ORDER)));
        assert_eq!(records.path(), "/rest/v1/terms");

        let definitions = backend
            .definitions_request("bandwidth")
            .request_url()
            .unwrap_or_else(|err| panic!("invalid request url: {err}"));
        let pairs = definitions.query_pairs();
        assert!(pairs.contains(&("order", "created_at.asc,id.asc")));
        assert!(pairs.contains(&("term_slug", "eq.bandwidth")));
    }
}
