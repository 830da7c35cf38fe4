//! # Source Registry
//!
//! Append-only map from canonical source URL to a short id `src-N`.
//! Ids are handed out in order and never reused; registering a URL that is
//! already known returns its existing id.

use crate::records::{CandidateRecord, Identifiers, PublicationYear};
use crate::scoring::ScoredCandidate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A registered source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub short_id: String,
    pub url: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<PublicationYear>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    pub identifiers: Identifiers,
    pub relevance_score: f64,
    #[serde(default)]
    pub supported_claims: Vec<String>,
}

impl Source {
    /// Numeric part of the short id
    pub fn ordinal(&self) -> usize {
        parse_ordinal(&self.short_id).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Source>,
    by_url: HashMap<String, usize>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scored paper under its canonical URL.
    /// `None` when the paper has no URL of any kind.
    pub fn register(&mut self, candidate: &ScoredCandidate) -> Option<String> {
        let relevance = candidate.relevance_score.unwrap_or(candidate.composite_score);
        self.register_record(&candidate.record, relevance)
    }

    pub fn register_record(&mut self, record: &CandidateRecord, relevance_score: f64) -> Option<String> {
        let Some(url) = record.identifiers.canonical_url() else {
            tracing::debug!(title = %record.title, "No canonical URL, source not registered");
            return None;
        };

        if let Some(&index) = self.by_url.get(&url) {
            return Some(self.sources[index].short_id.clone());
        }

        let short_id = format!("src-{}", self.sources.len() + 1);
        tracing::debug!(%short_id, %url, "Source registered");

        self.by_url.insert(url.clone(), self.sources.len());
        self.sources.push(Source {
            short_id: short_id.clone(),
            url,
            title: record.title.clone(),
            authors: record.authors.clone(),
            year: record.year.clone(),
            journal: record.journal.clone(),
            identifiers: record.identifiers.clone(),
            relevance_score,
            supported_claims: Vec::new(),
        });
        Some(short_id)
    }

    /// Exact short-id lookup: `src-01` is not `src-1`
    pub fn get(&self, short_id: &str) -> Option<&Source> {
        self.position(short_id).map(|index| &self.sources[index])
    }

    /// Attach a claim the source supports. Duplicates and blanks are ignored.
    pub fn record_claim(&mut self, short_id: &str, claim: &str) -> bool {
        let claim = claim.trim();
        let Some(index) = self.position(short_id) else {
            return false;
        };
        match self.sources.get_mut(index) {
            Some(source) if !claim.is_empty() => {
                if !source.supported_claims.iter().any(|c| c == claim) {
                    source.supported_claims.push(claim.to_string());
                }
                true
            }
            _ => false,
        }
    }

    /// All sources in short-id order
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn position(&self, short_id: &str) -> Option<usize> {
        let index = parse_ordinal(short_id)?.checked_sub(1)?;
        self.sources
            .get(index)
            .filter(|source| source.short_id == short_id)
            .map(|_| index)
    }
}

fn parse_ordinal(short_id: &str) -> Option<usize> {
    short_id.strip_prefix("src-")?.parse().ok()
}
