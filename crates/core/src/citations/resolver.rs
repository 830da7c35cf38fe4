//! # Citation Resolver
//!
//! Replaces `<cite source="src-N"/>` markers with inline citations and
//! appends a References section built from the registry.
//!
//! Accepted marker forms (self-closing only):
//!
//! ```text
//! <cite source="src-3"/>   <cite source='src-3'/>   <cite source=src-3/>
//! < cite  source = "src-3"  / >
//! ```

use super::registry::{Source, SourceRegistry};
use crate::scoring::format_authors_for_citation;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const REFERENCES_HEADING: &str = "## References";

fn marker_pattern() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| {
            Regex::new(r#"<\s*cite\s+source\s*=\s*["']?(src-\d+)["']?\s*/\s*>"#).ok()
        })
        .as_ref()
}

fn space_before_punctuation() -> Option<&'static Regex> {
    static SPACE: OnceLock<Option<Regex>> = OnceLock::new();
    SPACE
        .get_or_init(|| Regex::new(r"[ \t]+([.,;:!?])").ok())
        .as_ref()
}

/// Outcome of resolving one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub document: String,
    pub resolved: usize,
    pub unresolved: Vec<String>,
}

/// Substitute every marker, tidy punctuation, append the references.
/// Claims preceding resolved markers are recorded on their sources.
pub fn resolve_citations(document: &str, registry: &mut SourceRegistry) -> Resolution {
    let document = strip_references(document);
    let Some(marker) = marker_pattern() else {
        return Resolution {
            document: append_references(document, registry),
            resolved: 0,
            unresolved: Vec::new(),
        };
    };

    let mut output = String::with_capacity(document.len());
    let mut claims: Vec<(String, String)> = Vec::new();
    let mut resolved = 0;
    let mut unresolved = Vec::new();
    let mut last = 0;

    for captures in marker.captures_iter(document) {
        let (Some(whole), Some(id)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        output.push_str(&document[last..whole.start()]);
        last = whole.end();

        let short_id = id.as_str();
        match registry.get(short_id) {
            Some(source) => {
                let before = marker.replace_all(&document[..whole.start()], "");
                claims.push((short_id.to_string(), preceding_fragment(&before)));
                let trimmed = output.trim_end_matches([' ', '\t']).len();
                output.truncate(trimmed);
                output.push_str(&inline_citation(source));
                resolved += 1;
            }
            None => {
                tracing::warn!(short_id, "Citation marker references unknown source, removed");
                unresolved.push(short_id.to_string());
            }
        }
    }
    output.push_str(&document[last..]);

    for (short_id, claim) in claims {
        registry.record_claim(&short_id, &claim);
    }

    let tidied = match space_before_punctuation() {
        Some(space) => space.replace_all(&output, "$1").into_owned(),
        None => output,
    };

    Resolution {
        document: append_references(tidied.trim_end(), registry),
        resolved,
        unresolved,
    }
}

/// ` [Authors, Year](url)`, with a leading space
pub fn inline_citation(source: &Source) -> String {
    let authors = inline_authors(&source.authors);
    let label = match &source.year {
        Some(year) => format!("{}, {}", authors, year),
        None => authors,
    };
    if source.url.is_empty() {
        format!(" ({})", label)
    } else {
        format!(" [{}]({})", label, source.url)
    }
}

fn inline_authors(authors: &[String]) -> String {
    let surname = |name: &String| {
        name.split(',')
            .next()
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };
    match authors {
        [] => "Unknown".to_string(),
        [only] => surname(only),
        [first, second] => format!("{} and {}", surname(first), surname(second)),
        [first, ..] => format!("{} et al.", surname(first)),
    }
}

/// Sentence fragment before a marker: back to the previous sentence end
fn preceding_fragment(text: &str) -> String {
    let start = text
        .trim_end()
        .rfind(['.', '!', '?', '\n'])
        .map(|i| i + 1)
        .unwrap_or(0);
    text[start..].trim().to_string()
}

/// Markdown references section for every registered source, by short id
pub fn references_section(registry: &SourceRegistry) -> String {
    let mut section = format!("{}\n\n", REFERENCES_HEADING);
    if registry.is_empty() {
        section.push_str("No references available.\n");
        return section;
    }

    let mut sources: Vec<&Source> = registry.sources().iter().collect();
    sources.sort_by_key(|s| s.ordinal());

    for source in sources {
        section.push_str(&format!("- [{}] {}\n", source.short_id, reference_entry(source)));
    }
    section
}

/// `Author(s) (Year). Title. *Journal*. link`, DOI link preferred over PMID
pub fn reference_entry(source: &Source) -> String {
    let authors = match format_authors_for_citation(&source.authors) {
        formatted if formatted.is_empty() => "Unknown".to_string(),
        formatted => formatted,
    };
    let mut entry = match &source.year {
        Some(year) => format!("{} ({}). {}.", authors, year, source.title),
        None => format!("{}. {}.", authors.trim_end_matches('.'), source.title),
    };
    if let Some(journal) = source.journal.as_deref().filter(|j| !j.trim().is_empty()) {
        entry.push_str(&format!(" *{}*.", journal.trim()));
    }
    let link = source
        .identifiers
        .doi_url()
        .or_else(|| source.identifiers.pubmed_url())
        .unwrap_or_else(|| source.url.clone());
    if !link.is_empty() {
        entry.push_str(&format!(" {}", link));
    }
    entry
}

/// Append the references section, replacing one that is already present
pub fn append_references(document: &str, registry: &SourceRegistry) -> String {
    let body = strip_references(document).trim_end();
    let section = references_section(registry);
    if body.is_empty() {
        section
    } else {
        format!("{}\n\n{}", body, section)
    }
}

/// The document without any existing references section
fn strip_references(document: &str) -> &str {
    if document.starts_with(REFERENCES_HEADING) {
        return "";
    }
    match document.find(&format!("\n{}", REFERENCES_HEADING)) {
        Some(index) => &document[..index],
        None => document,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{CandidateRecord, Identifiers, PublicationYear};

    fn registry_with_lee_as_src3() -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        for (title, doi) in [("First", "10.1/a"), ("Second", "10.1/b")] {
            let mut record = CandidateRecord::titled(title);
            record.identifiers.doi = Some(doi.to_string());
            registry.register_record(&record, 7.0);
        }
        let mut lee = CandidateRecord::titled("Menin inhibition");
        lee.authors = vec!["Lee".to_string()];
        lee.year = Some(PublicationYear::Number(2023));
        lee.journal = Some("Blood".to_string());
        lee.identifiers = Identifiers {
            pmid: Some("37000001".to_string()),
            doi: Some("10.1/x".to_string()),
            url: None,
        };
        registry.register_record(&lee, 9.0);
        registry
    }

    #[test]
    fn test_single_quoted_marker_resolves() {
        let registry = registry_with_lee_as_src3();
        let lee = registry.get("src-3").unwrap();
        assert_eq!(inline_citation(lee), " [Lee, 2023](https://doi.org/10.1/x)");

        let mut registry = registry;
        let resolution = resolve_citations("Menin inhibitors work<cite source='src-3'/>.", &mut registry);
        assert!(resolution
            .document
            .starts_with("Menin inhibitors work [Lee, 2023](https://doi.org/10.1/x)."));
        assert_eq!(resolution.resolved, 1);
        assert_eq!(
            registry.get("src-3").unwrap().supported_claims,
            vec!["Menin inhibitors work".to_string()]
        );
    }

    #[test]
    fn test_marker_variants() {
        let mut registry = registry_with_lee_as_src3();
        let doc = "a <cite source=\"src-1\"/> b <cite source=src-2/> c < cite  source = 'src-3'  / >";
        let resolution = resolve_citations(doc, &mut registry);
        assert_eq!(resolution.resolved, 3);
        assert!(!resolution.document.contains("<cite"));
        assert!(!resolution.document.contains("cite "));
    }

    #[test]
    fn test_unknown_marker_removed() {
        let mut registry = registry_with_lee_as_src3();
        let resolution = resolve_citations("Claim <cite source=\"src-9\"/> .", &mut registry);
        assert!(resolution.document.starts_with("Claim.\n\n## References"));
        assert_eq!(resolution.unresolved, vec!["src-9".to_string()]);
        assert_eq!(resolution.resolved, 0);
    }

    #[test]
    fn test_zero_padded_id_is_not_an_alias() {
        let mut registry = registry_with_lee_as_src3();
        let resolution = resolve_citations("Claim <cite source=\"src-03\"/>.", &mut registry);
        assert!(!resolution.document.contains("Lee, 2023"));
        assert_eq!(resolution.unresolved, vec!["src-03".to_string()]);
        assert_eq!(resolution.resolved, 0);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut registry = registry_with_lee_as_src3();
        let once = resolve_citations("Text <cite source=\"src-1\"/>.", &mut registry).document;
        let twice = resolve_citations(&once, &mut registry).document;
        assert_eq!(once, twice);
        assert_eq!(twice.matches(REFERENCES_HEADING).count(), 1);
    }

    #[test]
    fn test_references_section() {
        let registry = registry_with_lee_as_src3();
        let section = references_section(&registry);
        let lines: Vec<&str> = section.lines().filter(|l| l.starts_with("- ")).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("- [src-1] Unknown. First."));
        assert_eq!(
            lines[2],
            "- [src-3] Lee (2023). Menin inhibition. *Blood*. https://doi.org/10.1/x"
        );
        assert!(references_section(&SourceRegistry::new()).contains("No references available."));
    }

    #[test]
    fn test_inline_author_forms() {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(inline_authors(&names(&["Smith, John", "Doe, Jane"])), "Smith and Doe");
        assert_eq!(inline_authors(&names(&["Issa GC", "Aldoss I", "Stein EM"])), "Issa GC et al.");
        assert_eq!(inline_authors(&[]), "Unknown");
    }
}
