//! # Citations
//!
//! Short ids for selected sources and resolution of inline cite markers.

pub mod registry;
pub mod resolver;

pub use registry::{Source, SourceRegistry};
pub use resolver::{resolve_citations, Resolution};

use crate::scoring::{CitationLinks, ScoredCandidate};
use serde::{Deserialize, Serialize};

/// Identifier coverage of the final reference list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationSummary {
    pub total_references: usize,
    pub papers_with_pmid: usize,
    pub papers_with_doi: usize,
}

impl CitationSummary {
    pub fn from_papers<'a>(papers: impl IntoIterator<Item = &'a ScoredCandidate>) -> Self {
        papers.into_iter().fold(Self::default(), |mut summary, paper| {
            summary.total_references += 1;
            if paper.record.identifiers.pmid.is_some() {
                summary.papers_with_pmid += 1;
            }
            if paper.record.identifiers.doi.is_some() {
                summary.papers_with_doi += 1;
            }
            summary
        })
    }
}

/// Numbered markdown reference list of the final papers, with PubMed and
/// DOI links where known
pub fn markdown_reference_list(papers: &[ScoredCandidate]) -> String {
    if papers.is_empty() {
        return "## References\n\nNo references available.\n".to_string();
    }

    let mut lines = vec!["## References\n".to_string()];
    for (i, paper) in papers.iter().enumerate() {
        let links = paper
            .citation_links
            .clone()
            .unwrap_or_else(|| CitationLinks::for_record(&paper.record, i + 1));

        let mut line = links.formatted_reference;
        let urls: Vec<String> = [
            links.pubmed_url.map(|url| format!("[PubMed]({})", url)),
            links.doi_url.map(|url| format!("[DOI]({})", url)),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !urls.is_empty() {
            line.push_str(&format!(" | {}", urls.join(" | ")));
        }
        lines.push(format!("{}\n", line));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::CandidateRecord;
    use crate::scoring::DimensionScores;

    fn paper(title: &str, pmid: Option<&str>, doi: Option<&str>) -> ScoredCandidate {
        let mut record = CandidateRecord::titled(title);
        record.identifiers.pmid = pmid.map(str::to_string);
        record.identifiers.doi = doi.map(str::to_string);
        ScoredCandidate {
            record,
            scores: DimensionScores::default(),
            composite_score: 7.0,
            relevance_score: None,
            citation_links: None,
        }
    }

    #[test]
    fn test_citation_summary_counts() {
        let papers = vec![
            paper("a", Some("1234567"), Some("10.1/a")),
            paper("b", Some("7654321"), None),
            paper("c", None, None),
        ];
        let summary = CitationSummary::from_papers(&papers);
        assert_eq!(
            summary,
            CitationSummary {
                total_references: 3,
                papers_with_pmid: 2,
                papers_with_doi: 1,
            }
        );
    }

    #[test]
    fn test_markdown_reference_list() {
        let list = markdown_reference_list(&[paper("Alpha", Some("1234567"), Some("10.1/a"))]);
        assert!(list.starts_with("## References\n"));
        assert!(list.contains(
            "[1] Alpha | [PubMed](https://pubmed.ncbi.nlm.nih.gov/1234567/) | [DOI](https://doi.org/10.1/a)"
        ));
        assert!(markdown_reference_list(&[]).contains("No references available."));
    }
}
