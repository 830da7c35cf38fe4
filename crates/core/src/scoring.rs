//! # Scorer & Selector
//!
//! Dimension scores come from the generation backend; this module owns only
//! the arithmetic: clamping, the weighted composite, thresholding, ranking,
//! and the citation links attached to whatever gets selected.

use crate::config::{ScoringWeights, SelectionPolicy};
use crate::records::CandidateRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 10.0;

/// Per-dimension scores on a 0-10 scale. `None` means the backend gave none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionScores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_relevance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actionability: Option<f64>,
}

impl DimensionScores {
    /// Read the four dimensions from a score entry, either at the top level or
    /// under a nested `scores` object. Non-numeric values are ignored.
    pub fn from_entry(entry: &Map<String, Value>) -> Self {
        let nested = entry.get("scores").and_then(Value::as_object);
        let dimension = |key: &str| {
            entry
                .get(key)
                .or_else(|| nested.and_then(|scores| scores.get(key)))
                .and_then(numeric)
                .map(clamp_score)
        };

        Self {
            clinical_relevance: dimension("clinical_relevance"),
            evidence_quality: dimension("evidence_quality"),
            recency: dimension("recency"),
            actionability: dimension("actionability"),
        }
    }

    /// Normalized weighted sum, always within 0-10. Missing dimensions count as 0.
    pub fn composite(&self, weights: &ScoringWeights) -> f64 {
        let total = weights.sum();
        if total <= 0.0 {
            return SCORE_MIN;
        }
        let weighted = weights.clinical_relevance * self.clinical_relevance.unwrap_or(0.0)
            + weights.evidence_quality * self.evidence_quality.unwrap_or(0.0)
            + weights.recency * self.recency.unwrap_or(0.0)
            + weights.actionability * self.actionability.unwrap_or(0.0);
        clamp_score(weighted / total)
    }
}

/// Links and formatted text for citing a paper
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubmed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi_url: Option<String>,
    pub citation_text: String,
    pub formatted_reference: String,
}

impl CitationLinks {
    /// Build links for the paper ranked `n` (1-based)
    pub fn for_record(record: &CandidateRecord, n: usize) -> Self {
        let authors = format_authors_for_citation(&record.authors);
        let title = record.title.trim();
        let journal = record.journal.as_deref().map(str::trim).unwrap_or("");
        let year = record.year.as_ref().map(|y| y.to_string()).unwrap_or_default();

        if authors.is_empty() && journal.is_empty() && year.is_empty() {
            return Self::fallback(record, n);
        }

        let citation_parts: Vec<&str> = [authors.as_str(), title, journal, year.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();

        let rank = format!("[{}]", n);
        let italic_journal = if journal.is_empty() {
            String::new()
        } else {
            format!("*{}*", journal)
        };
        let ids = [
            record.identifiers.pmid.as_ref().map(|pmid| format!("PMID: {}", pmid)),
            record.identifiers.doi.as_ref().map(|doi| format!("DOI: {}", doi)),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" | ");

        let reference_parts: Vec<&str> = [
            rank.as_str(),
            authors.as_str(),
            title,
            italic_journal.as_str(),
            year.as_str(),
            ids.as_str(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();

        Self {
            pubmed_url: record.identifiers.pubmed_url(),
            doi_url: record.identifiers.doi_url(),
            citation_text: format!("{}.", citation_parts.join(". ")),
            formatted_reference: format!("{}.", reference_parts.join(". ")),
        }
    }

    /// Minimal reference: `[n] <title>`
    pub fn fallback(record: &CandidateRecord, n: usize) -> Self {
        Self {
            pubmed_url: record.identifiers.pubmed_url(),
            doi_url: record.identifiers.doi_url(),
            citation_text: record.title.clone(),
            formatted_reference: format!("[{}] {}", n, record.title),
        }
    }
}

/// A candidate annotated with its scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub record: CandidateRecord,
    pub scores: DimensionScores,
    pub composite_score: f64,
    /// Relevance as used by the quality gate, when the backend supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_links: Option<CitationLinks>,
}

/// Score entry as matched back to a candidate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreEntry {
    pub scores: DimensionScores,
    pub relevance_score: Option<f64>,
}

/// Weighted scoring and top-k selection
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScoringWeights,
    policy: SelectionPolicy,
    current_year: i32,
}

impl Scorer {
    pub fn new(weights: ScoringWeights, policy: SelectionPolicy, current_year: i32) -> Self {
        Self {
            weights,
            policy,
            current_year,
        }
    }

    /// Candidates as presented to the scoring backend, numbered from 1
    pub fn scoring_context(case: &str, candidates: &[CandidateRecord]) -> String {
        let mut context = format!("Case:\n{}\n\nCandidates:\n", case.trim());
        for (i, record) in candidates.iter().enumerate() {
            context.push_str(&format!("{}. {}", i + 1, record.title));
            if let Some(year) = &record.year {
                context.push_str(&format!(" ({})", year));
            }
            if let Some(journal) = &record.journal {
                context.push_str(&format!(" - {}", journal));
            }
            if let Some(study_type) = &record.study_type {
                context.push_str(&format!(" [{}]", study_type));
            }
            context.push('\n');
            if let Some(summary) = &record.abstract_text {
                context.push_str(&format!("   {}\n", summary.trim()));
            }
        }
        context
    }

    /// Match score entries back to candidates: by 1-based `id`, else by
    /// normalized title. Unmatched entries are ignored; unmatched candidates
    /// get `None`.
    pub fn match_entries(entries: &[Value], candidates: &[CandidateRecord]) -> Vec<Option<ScoreEntry>> {
        let by_title: HashMap<String, usize> = candidates
            .iter()
            .enumerate()
            .map(|(i, record)| (record.dedup_key(), i))
            .rev()
            .collect();

        let mut matched: Vec<Option<ScoreEntry>> = vec![None; candidates.len()];

        for (index, entry) in entries.iter().enumerate() {
            let Some(map) = entry.as_object() else {
                tracing::warn!(index, "Score entry is not an object, dropped");
                continue;
            };

            let position = map
                .get("id")
                .and_then(numeric)
                .filter(|id| id.fract() == 0.0 && *id >= 1.0)
                .map(|id| id as usize - 1)
                .filter(|i| *i < candidates.len())
                .or_else(|| {
                    map.get("title")
                        .and_then(Value::as_str)
                        .and_then(|title| by_title.get(&title.trim().to_lowercase()).copied())
                });

            let Some(position) = position else {
                tracing::warn!(index, "Score entry matches no candidate, dropped");
                continue;
            };

            let scores = DimensionScores::from_entry(map);
            let relevance_score = map
                .get("relevance_score")
                .and_then(numeric)
                .map(clamp_score)
                .or(scores.clinical_relevance);

            if matched[position].is_some() {
                tracing::debug!(position, "Duplicate score entry, first kept");
                continue;
            }
            matched[position] = Some(ScoreEntry {
                scores,
                relevance_score,
            });
        }

        matched
    }

    /// Annotate every candidate. A missing recency score falls back to one
    /// derived from the publication year.
    pub fn score(
        &self,
        candidates: Vec<CandidateRecord>,
        entries: Vec<Option<ScoreEntry>>,
    ) -> Vec<ScoredCandidate> {
        let mut entries = entries.into_iter();
        candidates
            .into_iter()
            .map(|record| {
                let ScoreEntry {
                    mut scores,
                    relevance_score,
                } = entries.next().flatten().unwrap_or_default();

                if scores.recency.is_none() {
                    scores.recency = record
                        .year_value()
                        .and_then(|year| recency_score(year, self.current_year));
                }

                let composite_score = scores.composite(&self.weights);
                ScoredCandidate {
                    record,
                    scores,
                    composite_score,
                    relevance_score,
                    citation_links: None,
                }
            })
            .collect()
    }

    /// Keep candidates at or above the threshold, best first, truncated to the
    /// maximum selection size. Citation links are attached by rank.
    pub fn select(&self, scored: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
        let mut selected: Vec<ScoredCandidate> = scored
            .into_iter()
            .filter(|c| c.composite_score >= self.policy.min_composite_score)
            .collect();

        // Stable: ties keep aggregation order
        selected.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
        selected.truncate(self.policy.max_selected);

        for (i, candidate) in selected.iter_mut().enumerate() {
            let record = &candidate.record;
            candidate
                .citation_links
                .get_or_insert_with(|| CitationLinks::for_record(record, i + 1));
        }
        selected
    }
}

/// Recency from publication age, for papers the backend did not rate
pub fn recency_score(year: i32, current_year: i32) -> Option<f64> {
    let age = current_year.checked_sub(year)?;
    let score = match age {
        i32::MIN..=-1 => return None,
        0 => 10.0,
        1 => 9.0,
        2 => 8.0,
        3..=4 => 6.5,
        5..=6 => 4.0,
        _ => 1.5,
    };
    Some(score)
}

/// Author list for references: "Last, First" form, at most six considered,
/// one name alone, up to three as "A, B, and C", beyond that "A, et al."
pub fn format_authors_for_citation(authors: &[String]) -> String {
    let clean: Vec<String> = authors
        .iter()
        .take(6)
        .map(|author| author.trim())
        .filter(|author| !author.is_empty())
        .map(|author| {
            if author.contains(',') {
                return author.to_string();
            }
            let parts: Vec<&str> = author.split_whitespace().collect();
            match parts.split_last() {
                Some((last, rest)) if !rest.is_empty() => format!("{}, {}", last, rest.join(" ")),
                _ => author.to_string(),
            }
        })
        .collect();

    match clean.as_slice() {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] if clean.len() <= 3 => format!("{}, and {}", init.join(", "), last),
        [first, ..] => format!("{}, et al.", first),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(SCORE_MIN, SCORE_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Identifiers, PublicationYear};
    use serde_json::json;

    fn record(title: &str, year: i64) -> CandidateRecord {
        let mut record = CandidateRecord::titled(title);
        record.year = Some(PublicationYear::Number(year));
        record
    }

    fn scorer() -> Scorer {
        Scorer::new(ScoringWeights::default(), SelectionPolicy::default(), 2025)
    }

    #[test]
    fn test_composite_weighted_and_bounded() {
        let weights = ScoringWeights::default();
        let all_ten = DimensionScores {
            clinical_relevance: Some(10.0),
            evidence_quality: Some(10.0),
            recency: Some(10.0),
            actionability: Some(10.0),
        };
        assert!((all_ten.composite(&weights) - 10.0).abs() < 1e-9);

        let mixed = DimensionScores {
            clinical_relevance: Some(8.0),
            evidence_quality: Some(6.0),
            recency: Some(10.0),
            actionability: Some(4.0),
        };
        // 0.3*8 + 0.25*6 + 0.2*10 + 0.25*4 = 6.9
        assert!((mixed.composite(&weights) - 6.9).abs() < 1e-9);

        assert_eq!(DimensionScores::default().composite(&weights), 0.0);
    }

    #[test]
    fn test_out_of_range_scores_clamped() {
        let entry = json!({"clinical_relevance": 42, "evidence_quality": -3, "recency": "7.5", "actionability": "n/a"});
        let scores = DimensionScores::from_entry(entry.as_object().unwrap());
        assert_eq!(scores.clinical_relevance, Some(10.0));
        assert_eq!(scores.evidence_quality, Some(0.0));
        assert_eq!(scores.recency, Some(7.5));
        assert_eq!(scores.actionability, None);
    }

    #[test]
    fn test_entries_matched_by_id_then_title() {
        let candidates = vec![record("Alpha", 2024), record("Beta", 2024), record("Gamma", 2024)];
        let entries = vec![
            json!({"id": 2, "clinical_relevance": 9}),
            json!({"title": " alpha ", "scores": {"clinical_relevance": 7}}),
            json!({"id": 99, "title": "nobody", "clinical_relevance": 1}),
            json!("garbage"),
        ];

        let matched = Scorer::match_entries(&entries, &candidates);

        assert_eq!(matched[0].as_ref().and_then(|e| e.relevance_score), Some(7.0));
        assert_eq!(matched[1].as_ref().and_then(|e| e.relevance_score), Some(9.0));
        assert!(matched[2].is_none());
    }

    #[test]
    fn test_recency_fallback() {
        assert_eq!(recency_score(2025, 2025), Some(10.0));
        assert_eq!(recency_score(2023, 2025), Some(8.0));
        assert_eq!(recency_score(2021, 2025), Some(6.5));
        assert_eq!(recency_score(2019, 2025), Some(4.0));
        assert_eq!(recency_score(1999, 2025), Some(1.5));
        assert_eq!(recency_score(2030, 2025), None);
        assert_eq!(recency_score(i32::MIN, 2025), None);
        assert_eq!(recency_score(i32::MAX, -5), None);

        let scored = scorer().score(vec![record("Alpha", 2024)], vec![None]);
        assert_eq!(scored[0].scores.recency, Some(9.0));
        assert_eq!(scored[0].relevance_score, None);
    }

    #[test]
    fn test_absurd_year_leaves_recency_unset() {
        let record = crate::records::normalize_paper(json!({"title": "t", "year": -2147483648i64}), 0).unwrap();
        let scored = scorer().score(vec![record], vec![None]);
        assert_eq!(scored[0].scores.recency, None);
        assert!((0.0..=10.0).contains(&scored[0].composite_score));
    }

    #[test]
    fn test_select_threshold_order_and_cap() {
        let scorer = Scorer::new(
            ScoringWeights::default(),
            SelectionPolicy {
                min_composite_score: 6.0,
                max_selected: 2,
            },
            2025,
        );
        let candidates: Vec<CandidateRecord> =
            ["low", "mid", "high", "top"].iter().map(|t| record(t, 2025)).collect();
        let entries: Vec<Value> = [2.0, 6.5, 8.0, 9.5]
            .iter()
            .enumerate()
            .map(|(i, s)| {
                json!({"id": i + 1, "clinical_relevance": s, "evidence_quality": s,
                       "recency": s, "actionability": s})
            })
            .collect();

        let scored = scorer.score(candidates.clone(), Scorer::match_entries(&entries, &candidates));
        assert!(scored.iter().all(|c| (0.0..=10.0).contains(&c.composite_score)));

        let selected = scorer.select(scored);
        let titles: Vec<&str> = selected.iter().map(|c| c.record.title.as_str()).collect();
        assert_eq!(titles, vec!["top", "high"]);
        assert!(selected.iter().all(|c| c.composite_score >= 6.0));
        assert!(selected[0].citation_links.as_ref().unwrap().formatted_reference.starts_with("[1]"));
    }

    #[test]
    fn test_author_formatting() {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(format_authors_for_citation(&names(&["Ghayas C Issa"])), "Issa, Ghayas C");
        assert_eq!(format_authors_for_citation(&names(&["Lee"])), "Lee");
        assert_eq!(
            format_authors_for_citation(&names(&["Smith, John", "Mary Johnson", "Davis, R"])),
            "Smith, John, Johnson, Mary, and Davis, R"
        );
        assert_eq!(
            format_authors_for_citation(&names(&["A B", "C D", "E F", "G H"])),
            "B, A, et al."
        );
        assert_eq!(format_authors_for_citation(&[]), "");
    }

    #[test]
    fn test_citation_links() {
        let mut paper = record("Revumenib in relapsed KMT2A-rearranged acute leukemia", 2024);
        paper.authors = vec!["Smith, John A".to_string()];
        paper.journal = Some("New England Journal of Medicine".to_string());
        paper.identifiers = Identifiers {
            pmid: Some("38754448".to_string()),
            doi: Some("10.1056/NEJMoa2402245".to_string()),
            url: None,
        };

        let links = CitationLinks::for_record(&paper, 1);
        assert_eq!(links.pubmed_url.as_deref(), Some("https://pubmed.ncbi.nlm.nih.gov/38754448/"));
        assert_eq!(links.doi_url.as_deref(), Some("https://doi.org/10.1056/NEJMoa2402245"));
        assert_eq!(
            links.citation_text,
            "Smith, John A. Revumenib in relapsed KMT2A-rearranged acute leukemia. New England Journal of Medicine. 2024."
        );
        assert_eq!(
            links.formatted_reference,
            "[1]. Smith, John A. Revumenib in relapsed KMT2A-rearranged acute leukemia. *New England Journal of Medicine*. 2024. PMID: 38754448 | DOI: 10.1056/NEJMoa2402245."
        );

        let bare = CitationLinks::for_record(&CandidateRecord::titled("Only a title"), 3);
        assert_eq!(bare.formatted_reference, "[3] Only a title");
    }
}
