use std::cmp::Ordering;

use crate::model::{Definition, SourceDefinition, TermFile, TermRecord};

/// Ids handed out by the old fixed-id scheme. They collide across terms, so
/// they are re-derived from the slug like a missing id.
const MIGRATED_FIXED_IDS: [&str; 2] = ["def-1", "def-2"];

/// Lowercase the term and collapse every run of non-alphanumerics into `-`.
#[must_use]
pub fn slugify(term: &str) -> String {
    let mut slug = String::with_capacity(term.len());
    let mut pending_dash = false;
    for ch in term.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Deterministic id for the definition at 1-based `ordinal` of the term `slug`.
#[must_use]
pub fn definition_id(slug: &str, ordinal: usize) -> String {
    format!("{slug}-def-{ordinal}")
}

fn resolve_id(existing: Option<&str>, slug: &str, ordinal: usize) -> String {
    match existing.map(str::trim) {
        Some(id) if !id.is_empty() && !MIGRATED_FIXED_IDS.contains(&id) => id.to_string(),
        _ => definition_id(slug, ordinal),
    }
}

/// Fix each definition's id by its position among all of `definitions`.
///
/// Remote rows are filtered (pending submissions dropped) before they are
/// normalized; pinning first keeps a derived id attached to the same row
/// whatever is filtered out around it.
pub fn pin_definition_ids(slug: &str, definitions: &mut [SourceDefinition]) {
    for (index, source) in definitions.iter_mut().enumerate() {
        source.id = Some(resolve_id(source.id.as_deref(), slug, index + 1));
    }
}

/// Vote counts derived from whatever the source carried.
///
/// Raw `upvotes`/`downvotes` win and always recompute `netScore`; a legacy
/// scalar `votes` maps to `upvotes = votes, downvotes = 0`.
fn backfill_votes(
    upvotes: Option<i64>,
    downvotes: Option<i64>,
    net_score: Option<i64>,
    votes: Option<i64>,
) -> (i64, i64, i64) {
    if upvotes.is_some() || downvotes.is_some() {
        let up = upvotes.unwrap_or(0);
        let down = downvotes.unwrap_or(0);
        return (up, down, up - down);
    }
    if let Some(votes) = votes {
        return (votes, 0, votes);
    }
    (0, 0, net_score.unwrap_or(0))
}

fn normalize_source_definition(
    source: &SourceDefinition,
    slug: &str,
    ordinal: usize,
) -> Definition {
    let (upvotes, downvotes, net_score) =
        backfill_votes(source.upvotes, source.downvotes, source.net_score, source.votes);
    Definition {
        id: resolve_id(source.id.as_deref(), slug, ordinal),
        definition: source.definition.clone(),
        usage: source.usage.clone(),
        author: source.author.clone(),
        date: source.date.clone(),
        is_primary: source.is_primary.unwrap_or(ordinal == 1),
        upvotes,
        downvotes,
        net_score,
    }
}

fn dedupe_related(related: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(related.len());
    for tag in related {
        let tag = tag.trim();
        if !tag.is_empty() && !seen.iter().any(|existing: &String| existing == tag) {
            seen.push(tag.to_string());
        }
    }
    seen
}

/// Resolve either term-file shape into the canonical [`TermRecord`].
///
/// Source order of definitions is preserved; sorting is a separate step.
#[must_use]
pub fn normalize(file: &TermFile) -> TermRecord {
    let slug = slugify(file.term());
    let definitions = match file {
        TermFile::Legacy { definition, usage, author, date, votes, .. } => {
            let (upvotes, downvotes, net_score) = backfill_votes(None, None, None, *votes);
            vec![Definition {
                id: definition_id(&slug, 1),
                definition: definition.clone(),
                usage: usage.clone(),
                author: author.clone(),
                date: date.clone(),
                is_primary: true,
                upvotes,
                downvotes,
                net_score,
            }]
        }
        TermFile::Multi { definitions, .. } => definitions
            .iter()
            .enumerate()
            .map(|(index, source)| normalize_source_definition(source, &slug, index + 1))
            .collect(),
    };

    TermRecord {
        term: file.term().trim().to_string(),
        related: dedupe_related(file.related()),
        slug,
        definitions,
    }
}

pub(crate) fn display_order(lhs: &Definition, rhs: &Definition) -> Ordering {
    rhs.net_score.cmp(&lhs.net_score).then_with(|| rhs.upvotes.cmp(&lhs.upvotes))
}

/// Stable sort: `netScore` desc, then `upvotes` desc, then source order.
pub fn sort_definitions(definitions: &mut [Definition]) {
    definitions.sort_by(display_order);
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn scored(id: &str, net_score: i64, upvotes: i64) -> Definition {
        Definition {
            id: id.to_string(),
            definition: format!("definition {id}"),
            usage: String::new(),
            author: None,
            date: None,
            is_primary: false,
            upvotes,
            downvotes: upvotes - net_score,
            net_score,
        }
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("MVP Theater"), "mvp-theater");
        assert_eq!(slugify("  Move Fast & Break Things!! "), "move-fast-break-things");
        assert_eq!(slugify("10x Engineer"), "10x-engineer");
    }

    #[test]
    fn legacy_votes_backfill_upvotes_only() {
        let record = normalize(&TermFile::Legacy {
            term: "Growth Hacking".to_string(),
            related: vec!["marketing".to_string()],
            definition: "Marketing, but with a hoodie.".to_string(),
            usage: String::new(),
            author: None,
            date: None,
            votes: Some(7),
        });
        assert_eq!(record.definitions.len(), 1);
        let definition = &record.definitions[0];
        assert_eq!(definition.id, "growth-hacking-def-1");
        assert_eq!((definition.upvotes, definition.downvotes, definition.net_score), (7, 0, 7));
        assert!(definition.is_primary);
    }

    #[test]
    fn raw_counts_recompute_net_score() {
        let record = normalize(&TermFile::Multi {
            term: "Synergy".to_string(),
            related: Vec::new(),
            definitions: vec![SourceDefinition {
                id: Some("synergy-a".to_string()),
                definition: "Two meetings become one.".to_string(),
                upvotes: Some(4),
                downvotes: Some(1),
                net_score: Some(99),
                votes: Some(50),
                ..SourceDefinition::default()
            }],
        });
        let definition = &record.definitions[0];
        assert_eq!(definition.id, "synergy-a");
        assert_eq!((definition.upvotes, definition.downvotes, definition.net_score), (4, 1, 3));
    }

    #[test]
    fn missing_and_fixed_ids_are_derived_from_slug_and_ordinal() {
        let file = TermFile::Multi {
            term: "Circle Back".to_string(),
            related: vec!["meetings".to_string(), "meetings".to_string(), " ".to_string()],
            definitions: vec![
                SourceDefinition {
                    id: Some("def-1".to_string()),
                    definition: "Never.".to_string(),
                    ..SourceDefinition::default()
                },
                SourceDefinition { definition: "Later.".to_string(), ..SourceDefinition::default() },
                SourceDefinition {
                    id: Some("custom".to_string()),
                    definition: "Maybe.".to_string(),
                    ..SourceDefinition::default()
                },
            ],
        };
        let first = normalize(&file);
        let second = normalize(&file);
        let ids = first.definitions.iter().map(|d| d.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["circle-back-def-1", "circle-back-def-2", "custom"]);
        assert_eq!(first, second);
        assert_eq!(first.related, ["meetings".to_string()]);
    }

    #[test]
    fn pinned_ids_survive_dropping_earlier_rows() {
        let mut rows = vec![
            SourceDefinition { definition: "Pending.".to_string(), ..SourceDefinition::default() },
            SourceDefinition {
                id: Some("def-2".to_string()),
                definition: "Legacy id.".to_string(),
                ..SourceDefinition::default()
            },
            SourceDefinition {
                id: Some("kept".to_string()),
                definition: "Own id.".to_string(),
                ..SourceDefinition::default()
            },
            SourceDefinition { definition: "Third.".to_string(), ..SourceDefinition::default() },
        ];
        pin_definition_ids("bandwidth", &mut rows);
        rows.remove(0);

        let record = normalize(&TermFile::Multi {
            term: "Bandwidth".to_string(),
            related: Vec::new(),
            definitions: rows,
        });
        let ids = record.definitions.iter().map(|d| d.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["bandwidth-def-2", "kept", "bandwidth-def-4"]);
        assert!(record.definitions[0].is_primary);
    }

    #[test]
    fn sort_prefers_net_score_then_upvotes() {
        let mut definitions =
            vec![scored("A", 5, 2), scored("B", 5, 7), scored("C", 3, 10), scored("D", 1, 0)];
        sort_definitions(&mut definitions);
        let order = definitions.iter().map(|d| d.id.as_str()).collect::<Vec<_>>();
        assert_eq!(order, ["B", "A", "C", "D"]);
    }

    #[test]
    fn sort_keeps_source_order_for_full_ties() {
        let mut definitions = vec![scored("first", 2, 2), scored("second", 2, 2), scored("third", 2, 2)];
        sort_definitions(&mut definitions);
        let order = definitions.iter().map(|d| d.id.as_str()).collect::<Vec<_>>();
        assert_eq!(order, ["first", "second", "third"]);
    }

    proptest! {
        #[test]
        fn property_sorted_definitions_are_ordered_and_stable(
            scores in proptest::collection::vec((-5_i64..5, 0_i64..5), 0..12)
        ) {
            let mut definitions = scores
                .iter()
                .enumerate()
                .map(|(index, (net, up))| scored(&format!("{index:02}"), *net, *up))
                .collect::<Vec<_>>();
            sort_definitions(&mut definitions);
            for pair in definitions.windows(2) {
                let (lhs, rhs) = (&pair[0], &pair[1]);
                prop_assert!(lhs.net_score >= rhs.net_score);
                if lhs.net_score == rhs.net_score {
                    prop_assert!(lhs.upvotes >= rhs.upvotes);
                    if lhs.upvotes == rhs.upvotes {
                        prop_assert!(lhs.id < rhs.id);
                    }
                }
            }
        }
    }
}
