//! # LLM Generator
//!
//! Production `Generator` over radkit. Structured tasks run as typed
//! `LlmFunction` calls; literature search runs as an `LlmWorker` with the
//! retrieval tools attached. The typed outputs are immediately flattened back
//! into JSON so the rest of the pipeline treats them like any other
//! untrusted generation.

use super::{Generation, GenerationRequest, GenerationTask, Generator};
use crate::models::GeneratorConfig;
use crate::search::tools;
use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One planned search query
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct PlannedQuery {
    /// The search string
    pub query: String,
    /// general, molecular, treatment, clinical_trials, combination, resistance, guidelines, case_reports
    pub category: String,
    /// high, medium or low
    pub priority: String,
    /// What this query is meant to find
    #[serde(default)]
    pub focus: Option<String>,
}

/// Output of query generation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct QueryPlan {
    pub search_queries: Vec<PlannedQuery>,
}

/// A paper found by the search worker
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct FoundPaper {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub pmid: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Study design, e.g. "RCT", "phase 2 trial", "review", "case report"
    #[serde(default, rename = "type")]
    pub study_type: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
}

/// Output of one literature search slot
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct LiteratureSearchOutput {
    pub papers: Vec<FoundPaper>,
}

/// Scores for one candidate, each 0-10
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct PaperScore {
    /// 1-based position of the candidate in the list given
    pub id: u32,
    #[serde(default)]
    pub title: Option<String>,
    pub clinical_relevance: f64,
    pub evidence_quality: f64,
    pub recency: f64,
    pub actionability: f64,
}

/// Output of candidate scoring
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct ScoringOutput {
    pub scores: Vec<PaperScore>,
}

/// Drafted report body
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct DraftedReport {
    /// Markdown report with inline cite markers
    pub markdown: String,
}

/// Generator that calls a hosted LLM per task
pub struct LlmGenerator {
    config: GeneratorConfig,
}

impl LlmGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, request: GenerationRequest) -> anyhow::Result<Generation> {
        let model = self.config.for_task(request.task);
        tracing::debug!(
            task = request.task.as_str(),
            provider = ?model.provider,
            model = %model.model,
            "Calling LLM"
        );

        let GenerationRequest {
            task,
            instructions,
            context,
        } = request;

        match task {
            GenerationTask::QueryGeneration => {
                let plan = crate::run_llm_function!(model, QueryPlan, instructions, context)?;
                Ok(Generation::Structured(serde_json::to_value(plan)?))
            }
            GenerationTask::LiteratureSearch => {
                let found = crate::run_llm_worker!(
                    model,
                    LiteratureSearchOutput,
                    instructions,
                    context,
                    tools::search_pubmed,
                    tools::search_literature,
                )?;
                Ok(Generation::Structured(serde_json::to_value(found)?))
            }
            GenerationTask::PaperScoring => {
                let scored = crate::run_llm_function!(model, ScoringOutput, instructions, context)?;
                Ok(Generation::Structured(serde_json::to_value(scored)?))
            }
            GenerationTask::ReportDrafting => {
                let report = crate::run_llm_function!(model, DraftedReport, instructions, context)?;
                Ok(Generation::Text(report.markdown))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_found_paper_uses_wire_field_names() {
        let paper = FoundPaper {
            title: "Menin inhibition in AML".to_string(),
            authors: vec!["Issa GC".to_string()],
            year: Some(2023),
            journal: None,
            pmid: Some("36922593".to_string()),
            doi: None,
            url: None,
            study_type: Some("review".to_string()),
            abstract_text: None,
        };
        let value = serde_json::to_value(&paper).unwrap();
        assert_eq!(value["type"], "review");
        assert!(value.get("study_type").is_none());
        assert!(value.get("abstract").is_some());
    }

    #[test]
    fn test_query_plan_shape() {
        let plan: QueryPlan = serde_json::from_value(json!({
            "search_queries": [
                {"query": "revumenib KMT2A", "category": "treatment", "priority": "high"}
            ]
        }))
        .unwrap();
        assert_eq!(plan.search_queries.len(), 1);
        assert_eq!(plan.search_queries[0].focus, None);
    }
}
