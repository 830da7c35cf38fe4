//! # Generation
//!
//! The text-generation backend seen through one method: given a task,
//! instructions and context, produce structured data or raw text.
//!
//! ```text
//! Generator::generate(GenerationRequest) -> Generation::{Structured, Text}
//!    ├── LlmGenerator   (radkit providers, production)
//!    └── FnGenerator    (closure, deterministic runs and tests)
//! ```
//!
//! Nothing downstream trusts the output shape. Every `Generation` goes through
//! the output parser and record normalizer before it is used.

pub mod llm;
mod llm_helpers;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use llm::LlmGenerator;

/// Which step of the pipeline is asking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTask {
    #[serde(alias = "queries")]
    QueryGeneration,
    #[serde(alias = "search")]
    LiteratureSearch,
    #[serde(alias = "scoring")]
    PaperScoring,
    #[serde(alias = "report")]
    ReportDrafting,
}

impl GenerationTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueryGeneration => "query_generation",
            Self::LiteratureSearch => "literature_search",
            Self::PaperScoring => "paper_scoring",
            Self::ReportDrafting => "report_drafting",
        }
    }
}

/// One call into the generation backend
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub task: GenerationTask,
    /// System-level instructions for the task
    pub instructions: &'static str,
    /// Case text, feedback, candidates: whatever the task needs
    pub context: String,
}

impl GenerationRequest {
    /// Request with the bundled default instructions for `task`
    pub fn new(task: GenerationTask, context: impl Into<String>) -> Self {
        Self {
            task,
            instructions: prompts::for_task(task),
            context: context.into(),
        }
    }
}

/// What the backend produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Generation {
    Structured(serde_json::Value),
    Text(String),
}

impl Generation {
    pub fn is_empty(&self) -> bool {
        match self {
            Generation::Structured(value) => value.is_null(),
            Generation::Text(text) => text.trim().is_empty(),
        }
    }
}

/// The black-box generation capability
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> anyhow::Result<Generation>;
}

/// Generator backed by a plain closure.
///
/// Deterministic: the same request always gets the same answer, which makes
/// whole pipeline runs reproducible without a network.
pub struct FnGenerator<F> {
    respond: F,
}

impl<F> FnGenerator<F>
where
    F: Fn(&GenerationRequest) -> anyhow::Result<Generation> + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self { respond }
    }
}

#[async_trait]
impl<F> Generator for FnGenerator<F>
where
    F: Fn(&GenerationRequest) -> anyhow::Result<Generation> + Send + Sync,
{
    async fn generate(&self, request: GenerationRequest) -> anyhow::Result<Generation> {
        (self.respond)(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_generator_dispatches_on_task() {
        let generator = FnGenerator::new(|request: &GenerationRequest| match request.task {
            GenerationTask::QueryGeneration => Ok(Generation::Structured(json!(["q1"]))),
            _ => anyhow::bail!("unsupported task {}", request.task.as_str()),
        });

        let output = generator
            .generate(GenerationRequest::new(GenerationTask::QueryGeneration, "case"))
            .await
            .unwrap();
        assert_eq!(output, Generation::Structured(json!(["q1"])));

        let failed = generator
            .generate(GenerationRequest::new(GenerationTask::PaperScoring, "case"))
            .await;
        assert!(failed.is_err());
    }

    #[test]
    fn test_fn_generator_outside_runtime() {
        let generator = FnGenerator::new(|request: &GenerationRequest| {
            Ok(Generation::Text(request.context.clone()))
        });
        let output = tokio_test::block_on(
            generator.generate(GenerationRequest::new(GenerationTask::ReportDrafting, "draft")),
        );
        let output = tokio_test::assert_ok!(output);
        assert_eq!(output, Generation::Text("draft".to_string()));
    }

    #[test]
    fn test_default_instructions_bundled() {
        let request = GenerationRequest::new(GenerationTask::ReportDrafting, "");
        assert!(request.instructions.contains("<cite source=\"src-N\"/>"));
        assert!(!prompts::for_task(GenerationTask::QueryGeneration).is_empty());
    }

    #[test]
    fn test_task_short_names() {
        let task: GenerationTask = serde_json::from_value(json!("scoring")).unwrap();
        assert_eq!(task, GenerationTask::PaperScoring);
        let task: GenerationTask = serde_json::from_value(json!("report_drafting")).unwrap();
        assert_eq!(task, GenerationTask::ReportDrafting);
    }

    #[test]
    fn test_empty_generation() {
        assert!(Generation::Text("  \n".to_string()).is_empty());
        assert!(Generation::Structured(serde_json::Value::Null).is_empty());
        assert!(!Generation::Structured(json!([])).is_empty());
    }
}
