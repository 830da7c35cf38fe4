//! Default instructions bundled at compile time, one per generation task.

use super::GenerationTask;

/// Query Generator - turns a case (plus feedback) into search queries
pub const QUERY_GENERATOR: &str = include_str!("defaults/query_generator.md");

/// Literature Search - retrieves papers for a single query
pub const LITERATURE_SEARCH: &str = include_str!("defaults/literature_search.md");

/// Paper Scoring - rates candidates on the scoring rubric
pub const PAPER_SCORING: &str = include_str!("defaults/paper_scoring.md");

/// Report Drafting - writes the cited evidence summary
pub const REPORT_DRAFTING: &str = include_str!("defaults/report_drafting.md");

/// Instructions used for a task unless the caller supplies its own
pub fn for_task(task: GenerationTask) -> &'static str {
    match task {
        GenerationTask::QueryGeneration => QUERY_GENERATOR,
        GenerationTask::LiteratureSearch => LITERATURE_SEARCH,
        GenerationTask::PaperScoring => PAPER_SCORING,
        GenerationTask::ReportDrafting => REPORT_DRAFTING,
    }
}
