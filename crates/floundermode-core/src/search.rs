use serde::{Deserialize, Serialize};

use crate::model::TermRecord;

/// Why a term matched, best first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    TermPrefix,
    TermContains,
    Tag,
    Definition,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub term: String,
    pub slug: String,
    pub matched: MatchKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

fn classify(record: &TermRecord, needle: &str) -> Option<(MatchKind, Option<String>)> {
    let term = record.term.to_lowercase();
    if term.starts_with(needle) {
        return Some((MatchKind::TermPrefix, None));
    }
    if term.contains(needle) {
        return Some((MatchKind::TermContains, None));
    }
    if record.related.iter().any(|tag| tag.to_lowercase().contains(needle)) {
        return Some((MatchKind::Tag, None));
    }
    record
        .definitions
        .iter()
        .find(|definition| definition.definition.to_lowercase().contains(needle))
        .map(|definition| (MatchKind::Definition, Some(definition.definition.clone())))
}

/// Case-insensitive autocomplete search; ties ordered by term name.
#[must_use]
pub fn search(records: &[TermRecord], query: &str, limit: usize) -> Vec<SearchResult> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut results = records
        .iter()
        .filter_map(|record| {
            classify(record, &needle).map(|(matched, snippet)| SearchResult {
                term: record.term.clone(),
                slug: record.slug.clone(),
                matched,
                snippet,
            })
        })
        .collect::<Vec<_>>();
    results.sort_by(|lhs, rhs| {
        lhs.matched
            .cmp(&rhs.matched)
            .then_with(|| lhs.term.to_lowercase().cmp(&rhs.term.to_lowercase()))
    });
    results.truncate(limit);
    results
}
