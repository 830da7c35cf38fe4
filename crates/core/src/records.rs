//! # Record Normalizer
//!
//! Turns the loosely shaped records produced by the generation backend into
//! the canonical `Query` and `CandidateRecord` schemas.
//!
//! Normalization never fails loudly: a record that cannot be salvaged is
//! logged and dropped so one bad entry cannot sink its batch.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

// ============================================================================
// Raw boundary shape
// ============================================================================

/// A record as it arrives from a parsed generation output
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Object(Map<String, Value>),
    Text(String),
    Other(Value),
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RawRecord::Object(map),
            Value::String(text) => RawRecord::Text(text),
            other => RawRecord::Other(other),
        }
    }
}

impl RawRecord {
    fn kind(&self) -> &'static str {
        match self {
            RawRecord::Object(_) => "object",
            RawRecord::Text(_) => "string",
            RawRecord::Other(Value::Null) => "null",
            RawRecord::Other(Value::Array(_)) => "array",
            RawRecord::Other(Value::Number(_)) => "number",
            RawRecord::Other(Value::Bool(_)) => "bool",
            RawRecord::Other(_) => "value",
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

/// What aspect of the case a query targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QueryCategory {
    General,
    Molecular,
    Treatment,
    ClinicalTrials,
    Combination,
    Resistance,
    Guidelines,
    CaseReports,
    Other(String),
}

impl QueryCategory {
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "" | "general" => Self::General,
            "molecular" | "genetic" => Self::Molecular,
            "treatment" => Self::Treatment,
            "clinical_trials" | "clinical_trial" => Self::ClinicalTrials,
            "combination" => Self::Combination,
            "resistance" | "relapse" => Self::Resistance,
            "guidelines" => Self::Guidelines,
            "case_reports" | "case_report" => Self::CaseReports,
            _ => Self::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::General => "general",
            Self::Molecular => "molecular",
            Self::Treatment => "treatment",
            Self::ClinicalTrials => "clinical_trials",
            Self::Combination => "combination",
            Self::Resistance => "resistance",
            Self::Guidelines => "guidelines",
            Self::CaseReports => "case_reports",
            Self::Other(label) => label,
        }
    }
}

impl From<String> for QueryCategory {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<QueryCategory> for String {
    fn from(category: QueryCategory) -> Self {
        category.as_str().to_string()
    }
}

/// Query priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "high" | "critical" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }
}

/// A search query issued in one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: u32,
    pub text: String,
    pub category: QueryCategory,
    pub priority: Priority,
    #[serde(default)]
    pub focus: String,
}

/// Normalize one query record. Bare strings become general, medium-priority
/// queries identified by their position.
pub fn normalize_query(raw: impl Into<RawRecord>, index: usize) -> Option<Query> {
    let fallback_id = u32::try_from(index).unwrap_or(u32::MAX);

    match raw.into() {
        RawRecord::Text(text) if !text.trim().is_empty() => Some(Query {
            id: fallback_id,
            text: text.trim().to_string(),
            category: QueryCategory::General,
            priority: Priority::Medium,
            focus: String::new(),
        }),
        RawRecord::Object(map) => {
            let text = string_field(&map, &["query", "text"]);
            let Some(text) = text else {
                tracing::warn!(index, "Query record missing 'query' field, dropped");
                return None;
            };

            Some(Query {
                id: integer_field(&map, "id").unwrap_or(fallback_id),
                text,
                category: string_field(&map, &["type", "category"])
                    .map(|label| QueryCategory::from_label(&label))
                    .unwrap_or(QueryCategory::General),
                priority: string_field(&map, &["priority"])
                    .map(|label| Priority::from_label(&label))
                    .unwrap_or_default(),
                focus: string_field(&map, &["focus"]).unwrap_or_default(),
            })
        }
        other => {
            tracing::warn!(index, kind = other.kind(), "Query record is not an object or string, dropped");
            None
        }
    }
}

/// Normalize a batch of queries, giving every query a unique id within the batch
pub fn normalize_queries(raw: Vec<Value>) -> Vec<Query> {
    let mut seen = HashSet::new();
    let mut queries = Vec::with_capacity(raw.len());

    for (index, value) in raw.into_iter().enumerate() {
        let Some(mut query) = normalize_query(value, index) else {
            continue;
        };
        if !seen.insert(query.id) {
            let reassigned = (0..=u32::MAX).find(|id| !seen.contains(id)).unwrap_or(u32::MAX);
            tracing::debug!(from = query.id, to = reassigned, "Duplicate query id reassigned");
            query.id = reassigned;
            seen.insert(reassigned);
        }
        queries.push(query);
    }

    queries
}

// ============================================================================
// Papers
// ============================================================================

/// Publication year as supplied: numeric or free text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PublicationYear {
    Number(i64),
    Text(String),
}

impl PublicationYear {
    /// Best-effort integer year. `None` for text that is not a plain integer.
    pub fn value(&self) -> Option<i32> {
        match self {
            PublicationYear::Number(n) => i32::try_from(*n).ok(),
            PublicationYear::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for PublicationYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublicationYear::Number(n) => write!(f, "{}", n),
            PublicationYear::Text(text) => f.write_str(text.trim()),
        }
    }
}

/// External identifiers of a paper, already cleaned
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Identifiers {
    pub fn pubmed_url(&self) -> Option<String> {
        self.pmid
            .as_ref()
            .map(|pmid| format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid))
    }

    pub fn doi_url(&self) -> Option<String> {
        self.doi.as_ref().map(|doi| format!("https://doi.org/{}", doi))
    }

    /// DOI URL, else PubMed URL, else the raw URL
    pub fn canonical_url(&self) -> Option<String> {
        self.doi_url()
            .or_else(|| self.pubmed_url())
            .or_else(|| self.url.clone())
    }
}

/// A retrieved paper in canonical form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<PublicationYear>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default)]
    pub identifiers: Identifiers,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    /// Study design label ("rct", "review", ...). Feeds the diversity check.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub study_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_query_id: Option<u32>,
    /// Fields the normalizer does not know about, passed through verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CandidateRecord {
    /// A bare record with only a title
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            authors: Vec::new(),
            year: None,
            journal: None,
            identifiers: Identifiers::default(),
            abstract_text: None,
            study_type: None,
            source_query_id: None,
            extra: Map::new(),
        }
    }

    /// Deduplication key: lower-cased and trimmed title
    pub fn dedup_key(&self) -> String {
        self.title.trim().to_lowercase()
    }

    pub fn year_value(&self) -> Option<i32> {
        self.year.as_ref().and_then(PublicationYear::value)
    }
}

const KNOWN_PAPER_FIELDS: &[&str] = &[
    "title",
    "authors",
    "year",
    "journal",
    "pmid",
    "doi",
    "url",
    "link",
    "abstract",
    "summary",
    "type",
    "study_type",
    "source_query_id",
    "identifiers",
];

/// Normalize one paper record.
///
/// Requires a `title` or `query` field. Missing optional fields stay empty;
/// unknown fields are preserved in `extra`.
pub fn normalize_paper(raw: impl Into<RawRecord>, index: usize) -> Option<CandidateRecord> {
    let map = match raw.into() {
        RawRecord::Object(map) => map,
        other => {
            tracing::warn!(index, kind = other.kind(), "Paper record is not an object, dropped");
            return None;
        }
    };

    let title = string_field(&map, &["title"]);
    if title.is_none() && string_field(&map, &["query"]).is_none() {
        tracing::warn!(index, "Paper record missing title or query field, dropped");
        return None;
    }

    let nested = map.get("identifiers").and_then(Value::as_object);
    let lookup = |key: &str| {
        map.get(key)
            .or_else(|| nested.and_then(|ids| ids.get(key)))
            .and_then(scalar_text)
    };

    let identifiers = Identifiers {
        pmid: lookup("pmid").and_then(|raw| clean_pmid(&raw)),
        doi: lookup("doi").and_then(|raw| clean_doi(&raw)),
        url: lookup("url")
            .or_else(|| lookup("link"))
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty()),
    };

    let extra = map
        .iter()
        .filter(|(key, _)| !KNOWN_PAPER_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Some(CandidateRecord {
        title: title.unwrap_or_else(|| "Unknown Title".to_string()),
        authors: map.get("authors").map(parse_authors).unwrap_or_default(),
        year: map.get("year").and_then(parse_year),
        journal: string_field(&map, &["journal"]),
        identifiers,
        abstract_text: string_field(&map, &["abstract", "summary"]),
        study_type: string_field(&map, &["type", "study_type"]),
        source_query_id: integer_field(&map, "source_query_id"),
        extra,
    })
}

/// Reduce a PubMed id to its digits; accept only 6+ digit ids
pub fn clean_pmid(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= 6).then_some(digits)
}

/// Strip resolver prefixes from a DOI and accept only `10.<n>/<suffix>` forms
pub fn clean_doi(raw: &str) -> Option<String> {
    static PREFIX: OnceLock<Option<Regex>> = OnceLock::new();
    static SHAPE: OnceLock<Option<Regex>> = OnceLock::new();

    let prefix = PREFIX.get_or_init(|| Regex::new(r"(?i)^(https?://)?(dx\.)?doi\.org/").ok());
    let shape = SHAPE.get_or_init(|| Regex::new(r"^10\.\d+/.+").ok());
    let (Some(prefix), Some(shape)) = (prefix, shape) else {
        return None;
    };

    let doi = prefix.replace(raw.trim(), "").trim().to_string();
    shape.is_match(&doi).then_some(doi)
}

/// Authors arrive as a list or as one delimited string
pub fn parse_authors(value: &Value) -> Vec<String> {
    static SPLIT: OnceLock<Option<Regex>> = OnceLock::new();

    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(scalar_text)
            .map(|author| author.trim().to_string())
            .filter(|author| !author.is_empty())
            .collect(),
        Value::String(text) => {
            let split = SPLIT.get_or_init(|| Regex::new(r"[,;]|\sand\s|\bet\sal\.?").ok());
            let Some(split) = split else {
                return vec![text.trim().to_string()];
            };
            split
                .split(text)
                .map(str::trim)
                .filter(|author| !author.is_empty())
                .map(str::to_string)
                .collect()
        }
        _ => Vec::new(),
    }
}

fn parse_year(value: &Value) -> Option<PublicationYear> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(PublicationYear::Number),
        Value::String(text) if !text.trim().is_empty() => {
            Some(PublicationYear::Text(text.trim().to_string()))
        }
        _ => None,
    }
}

/// First non-empty string (or number rendered as text) among `keys`
fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .filter_map(scalar_text)
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
}

fn integer_field(map: &Map<String, Value>, key: &str) -> Option<u32> {
    match map.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_string_query() {
        let query = normalize_query(json!("menin inhibitor resistance"), 2).unwrap();
        assert_eq!(query.id, 2);
        assert_eq!(query.text, "menin inhibitor resistance");
        assert_eq!(query.category, QueryCategory::General);
        assert_eq!(query.priority, Priority::Medium);
    }

    #[test]
    fn test_object_query() {
        let query = normalize_query(
            json!({
                "id": 4,
                "query": "CD33 CD123 targeted therapy AML",
                "type": "clinical_trials",
                "priority": "high",
                "focus": "Immunotherapy"
            }),
            0,
        )
        .unwrap();
        assert_eq!(query.id, 4);
        assert_eq!(query.category, QueryCategory::ClinicalTrials);
        assert_eq!(query.priority, Priority::High);
        assert_eq!(query.focus, "Immunotherapy");
    }

    #[test]
    fn test_invalid_queries_dropped() {
        assert!(normalize_query(json!({"type": "molecular"}), 0).is_none());
        assert!(normalize_query(json!(42), 0).is_none());
        assert!(normalize_query(json!("   "), 0).is_none());
    }

    #[test]
    fn test_query_batch_ids_unique() {
        let queries = normalize_queries(vec![
            json!({"id": 1, "query": "a"}),
            json!({"id": 1, "query": "b"}),
            json!("c"),
            json!(null),
        ]);
        assert_eq!(queries.len(), 3);
        let ids: HashSet<u32> = queries.iter().map(|q| q.id).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_unknown_category_preserved() {
        let category = QueryCategory::from_label("Pharmacokinetics");
        assert_eq!(category, QueryCategory::Other("pharmacokinetics".to_string()));
        let json = serde_json::to_value(&category).unwrap();
        assert_eq!(json, json!("pharmacokinetics"));
    }

    #[test]
    fn test_paper_requires_title_or_query() {
        assert!(normalize_paper(json!({"authors": ["Lee"]}), 0).is_none());
        assert!(normalize_paper(json!("Revumenib in AML"), 0).is_none());

        let from_query = normalize_paper(json!({"query": "revumenib"}), 0).unwrap();
        assert_eq!(from_query.title, "Unknown Title");
        assert_eq!(from_query.extra.get("query"), Some(&json!("revumenib")));
    }

    #[test]
    fn test_paper_fields_cleaned() {
        let paper = normalize_paper(
            json!({
                "title": "  Revumenib in KMT2A-rearranged AML ",
                "authors": "Issa GC, Aldoss I and Thirman MJ",
                "year": "2023",
                "journal": "Nature",
                "pmid": "PMID: 36922593",
                "doi": "https://doi.org/10.1038/s41586-023-05812-3",
                "summary": "Phase 1 results",
                "type": "clinical_trial",
                "relevance_note": "keep me"
            }),
            0,
        )
        .unwrap();

        assert_eq!(paper.title, "Revumenib in KMT2A-rearranged AML");
        assert_eq!(paper.authors, vec!["Issa GC", "Aldoss I", "Thirman MJ"]);
        assert_eq!(paper.year_value(), Some(2023));
        assert_eq!(paper.identifiers.pmid.as_deref(), Some("36922593"));
        assert_eq!(
            paper.identifiers.doi.as_deref(),
            Some("10.1038/s41586-023-05812-3")
        );
        assert_eq!(paper.abstract_text.as_deref(), Some("Phase 1 results"));
        assert_eq!(paper.study_type.as_deref(), Some("clinical_trial"));
        assert_eq!(paper.extra.get("relevance_note"), Some(&json!("keep me")));
        assert!(!paper.extra.contains_key("summary"));
    }

    #[test]
    fn test_identifier_cleaning() {
        assert_eq!(clean_pmid("12345"), None);
        assert_eq!(clean_pmid("38754448"), Some("38754448".to_string()));
        assert_eq!(clean_doi("doi: nonsense"), None);
        assert_eq!(
            clean_doi("dx.doi.org/10.1056/NEJMoa2402245"),
            Some("10.1056/NEJMoa2402245".to_string())
        );
    }

    #[test]
    fn test_canonical_url_precedence() {
        let ids = Identifiers {
            pmid: Some("38754448".to_string()),
            doi: Some("10.1/x".to_string()),
            url: Some("https://example.org/paper".to_string()),
        };
        assert_eq!(ids.canonical_url().as_deref(), Some("https://doi.org/10.1/x"));

        let ids = Identifiers {
            doi: None,
            ..ids
        };
        assert_eq!(
            ids.canonical_url().as_deref(),
            Some("https://pubmed.ncbi.nlm.nih.gov/38754448/")
        );

        let ids = Identifiers {
            pmid: None,
            ..ids
        };
        assert_eq!(ids.canonical_url().as_deref(), Some("https://example.org/paper"));
        assert_eq!(Identifiers::default().canonical_url(), None);
    }

    #[test]
    fn test_uncoercible_year() {
        let paper = normalize_paper(json!({"title": "t", "year": "in press"}), 0).unwrap();
        assert_eq!(paper.year, Some(PublicationYear::Text("in press".to_string())));
        assert_eq!(paper.year_value(), None);
    }

    #[test]
    fn test_record_roundtrips_through_checkpoint_form() {
        let paper = normalize_paper(
            json!({"title": "t", "pmid": "38754448", "extra_field": [1, 2]}),
            0,
        )
        .unwrap();
        let value = serde_json::to_value(&paper).unwrap();
        let restored: CandidateRecord = serde_json::from_value(value).unwrap();
        assert_eq!(restored, paper);
    }
}
