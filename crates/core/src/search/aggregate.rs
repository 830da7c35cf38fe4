//! # Aggregator
//!
//! Merges per-slot search output into one deduplicated candidate set.
//! Titles are the identity: lower-cased and trimmed, first occurrence wins,
//! later duplicates are dropped whole.

use super::executor::SlotResult;
use crate::parsing::parse_generation;
use crate::records::{normalize_paper, CandidateRecord};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Conventional keys a paper list may be wrapped in, tried in order
pub const WRAPPER_KEYS: &[&str] = &["papers", "results", "search_results", "items"];

/// Outcome of merging one fan-out
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub candidates: Vec<CandidateRecord>,
    /// Slots that yielded at least one valid record
    pub successful_searches: usize,
    /// Valid records before deduplication
    pub records_found: usize,
    pub duplicates_dropped: usize,
}

/// Parse, normalize and merge every slot, in slot order
pub fn aggregate(slots: &BTreeMap<usize, SlotResult>) -> Aggregation {
    let mut all = Vec::new();
    let mut successful_searches = 0;

    for (slot, result) in slots {
        let SlotResult::Completed { query_id, output } = result else {
            continue;
        };

        let Some(parsed) = parse_generation(output, None, &format!("search_{}", slot)) else {
            continue;
        };

        let records: Vec<CandidateRecord> = extract_paper_list(parsed)
            .into_iter()
            .enumerate()
            .filter_map(|(index, raw)| normalize_paper(raw, index))
            .map(|mut record| {
                record.source_query_id = Some(*query_id);
                record
            })
            .collect();

        tracing::debug!(slot, records = records.len(), "Slot normalized");
        if !records.is_empty() {
            successful_searches += 1;
        }
        all.extend(records);
    }

    let records_found = all.len();
    let candidates = dedup_by_title(all);
    let duplicates_dropped = records_found - candidates.len();

    tracing::info!(
        records_found,
        unique = candidates.len(),
        duplicates_dropped,
        successful_searches,
        "Aggregated search results"
    );

    Aggregation {
        candidates,
        successful_searches,
        records_found,
        duplicates_dropped,
    }
}

/// Find the paper list inside a parsed payload.
///
/// A list is taken as is; an object is searched for a wrapper key holding a
/// list, and otherwise treated as a single paper.
pub fn extract_paper_list(parsed: Value) -> Vec<Value> {
    match parsed {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let wrapped = WRAPPER_KEYS
                .iter()
                .find(|key| map.get(**key).is_some_and(Value::is_array))
                .and_then(|key| map.remove(*key));

            match wrapped {
                Some(Value::Array(items)) => items,
                _ if map.is_empty() => Vec::new(),
                _ => vec![Value::Object(map)],
            }
        }
        other => {
            tracing::warn!(kind = ?other, "Search output is neither list nor object");
            Vec::new()
        }
    }
}

/// Keep the first record for each normalized title
pub fn dedup_by_title(records: Vec<CandidateRecord>) -> Vec<CandidateRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.dedup_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::Generation;
    use serde_json::json;

    fn completed(query_id: u32, output: Generation) -> SlotResult {
        SlotResult::Completed { query_id, output }
    }

    #[test]
    fn test_duplicate_titles_across_slots_merge() {
        let mut slots = BTreeMap::new();
        slots.insert(
            1,
            completed(
                10,
                Generation::Structured(json!({"papers": [
                    {"title": "Revumenib in KMT2A-rearranged AML", "year": 2024, "journal": "NEJM"}
                ]})),
            ),
        );
        slots.insert(
            2,
            completed(
                11,
                Generation::Text(
                    "```json\n[{\"title\": \"  revumenib in kmt2a-REARRANGED aml \", \"year\": 2023}]\n```"
                        .to_string(),
                ),
            ),
        );

        let aggregation = aggregate(&slots);

        assert_eq!(aggregation.candidates.len(), 1);
        assert_eq!(aggregation.records_found, 2);
        assert_eq!(aggregation.duplicates_dropped, 1);
        assert_eq!(aggregation.successful_searches, 2);
        // Earliest slot wins, no field merge
        let kept = &aggregation.candidates[0];
        assert_eq!(kept.journal.as_deref(), Some("NEJM"));
        assert_eq!(kept.source_query_id, Some(10));
    }

    #[test]
    fn test_wrapper_keys_and_lone_object() {
        assert_eq!(extract_paper_list(json!({"items": [{"title": "a"}]})).len(), 1);
        assert_eq!(
            extract_paper_list(json!({"results": [{"title": "a"}, {"title": "b"}]})).len(),
            2
        );
        // Wrapper key present but not a list: the object itself is one paper
        let lone = extract_paper_list(json!({"title": "x", "papers": "none"}));
        assert_eq!(lone.len(), 1);
        assert_eq!(lone[0]["title"], "x");
        assert!(extract_paper_list(json!({})).is_empty());
        assert!(extract_paper_list(json!(42)).is_empty());
    }

    #[test]
    fn test_lone_paper_with_non_list_wrapper_key() {
        let mut slots = BTreeMap::new();
        slots.insert(
            1,
            completed(
                7,
                Generation::Structured(json!({"title": "Lone paper", "papers": "see below"})),
            ),
        );
        slots.insert(
            2,
            completed(
                8,
                Generation::Text("```json\n{\"results\": [{\"title\": \"Wrapped paper\"}]}\n```".to_string()),
            ),
        );

        let aggregation = aggregate(&slots);
        let titles: Vec<&str> = aggregation.candidates.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Lone paper", "Wrapped paper"]);
        assert_eq!(aggregation.candidates[0].source_query_id, Some(7));
        assert_eq!(aggregation.successful_searches, 2);
    }

    #[test]
    fn test_failed_and_empty_slots_count_as_zero() {
        let mut slots = BTreeMap::new();
        slots.insert(
            1,
            SlotResult::Failed {
                query_id: 1,
                error: "timeout".to_string(),
            },
        );
        slots.insert(2, completed(2, Generation::Text("no papers found".to_string())));
        slots.insert(3, completed(3, Generation::Structured(json!({"papers": []}))));
        slots.insert(
            4,
            completed(4, Generation::Structured(json!({"papers": ["just a string", {"abstract": "no title"}]}))),
        );

        let aggregation = aggregate(&slots);
        assert!(aggregation.candidates.is_empty());
        assert_eq!(aggregation.successful_searches, 0);
        assert_eq!(aggregation.records_found, 0);
    }

    #[test]
    fn test_dedup_keeps_one_per_distinct_title() {
        let records = vec![
            CandidateRecord::titled("A"),
            CandidateRecord::titled("b"),
            CandidateRecord::titled(" a "),
            CandidateRecord::titled("B"),
            CandidateRecord::titled("c"),
        ];
        let titles: Vec<String> = dedup_by_title(records).into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["A", "b", "c"]);
    }
}
