//! # Iteration Controller
//!
//! Drives the retrieval loop for one case:
//!
//! ```text
//! queries -> fan-out/fan-in -> aggregate -> score/select -> quality gate
//!    ^                                                          │
//!    └──────────── refinement feedback (gate failed) ───────────┘
//! ```
//!
//! After the loop the final papers are registered as sources, a report is
//! drafted with cite markers and the markers are resolved.

use super::events::{PipelineEvent, PipelineEventKind};
use super::stage::{IterationLoop, Termination};
use crate::citations::{markdown_reference_list, resolve_citations, CitationSummary, Source, SourceRegistry};
use crate::config::PipelineConfig;
use crate::generation::{Generation, GenerationRequest, GenerationTask, Generator};
use crate::parsing::parse_generation;
use crate::quality::{GateOutcome, QualityGate};
use crate::records::{normalize_queries, CandidateRecord, Query};
use crate::scoring::{ScoredCandidate, Scorer};
use crate::search::{aggregate, SearchExecutor, SlotResult};
use crate::state::{
    CheckpointArchive, EvidenceDb, IterationMetrics, PipelineContext, RefinementEntry,
    SearchMetrics,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Everything a caller gets back from one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub final_papers: Vec<ScoredCandidate>,
    pub total_iterations: u32,
    pub termination: Termination,
    /// True only when the quality gate passed
    pub passed: bool,
    pub refinement_history: Vec<RefinementEntry>,
    pub search_metrics: SearchMetrics,
    pub iteration_metrics: Vec<IterationMetrics>,
    pub queries_used: Vec<Query>,
    pub formatted_references: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    pub sources: Vec<Source>,
    pub citation_summary: CitationSummary,
    /// Archive run id when checkpoints were persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub events: Vec<PipelineEvent>,
}

pub struct IterationController {
    config: PipelineConfig,
    generator: Arc<dyn Generator>,
    events: Vec<PipelineEvent>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl IterationController {
    pub fn new(config: PipelineConfig, generator: Arc<dyn Generator>) -> Self {
        Self {
            config,
            generator,
            events: Vec::new(),
            event_tx: None,
        }
    }

    /// Also stream every event into `tx` as it happens
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Run the whole pipeline for one case description.
    ///
    /// Errors only on invalid configuration or an unusable checkpoint
    /// database; every data problem along the way degrades instead.
    #[tracing::instrument(skip_all, fields(max_iterations = self.config.max_iterations))]
    pub async fn run(&mut self, case_description: &str) -> Result<PipelineResult> {
        self.config.validate()?;
        self.events.clear();

        let current_year = self.config.reference_year();
        let gate = QualityGate::new(self.config.quality.clone());
        let scorer = Scorer::new(
            self.config.weights.clone(),
            self.config.selection.clone(),
            current_year,
        );
        let executor = SearchExecutor::new(self.generator.clone(), self.config.max_search_slots)
            .with_timeout(self.config.search_timeout_secs.map(Duration::from_secs));

        let archive = match &self.config.checkpoint_db {
            Some(path) => {
                let db = EvidenceDb::open_at(path).context("Failed to open checkpoint database")?;
                Some(CheckpointArchive::begin_run(&db, case_description)?)
            }
            None => None,
        };

        let mut ctx = PipelineContext::new(case_description);
        ctx.reset();
        let mut iterations = IterationLoop::new(self.config.max_iterations);

        self.emit(PipelineEvent::new(PipelineEventKind::PipelineStarted).with_data(json!({
            "max_iterations": self.config.max_iterations,
            "max_search_slots": self.config.max_search_slots,
            "current_year": current_year,
        })))
        .await;

        iterations.start();
        while let Some(iteration) = iterations.current_iteration() {
            ctx.begin_iteration();
            tracing::info!(iteration, "Iteration started");
            self.emit(PipelineEvent::new(PipelineEventKind::IterationStarted).in_iteration(iteration))
                .await;

            // Queries replace the previous batch
            let queries = self.generate_queries(&ctx).await;
            ctx.set_queries(queries);
            self.emit(
                PipelineEvent::new(PipelineEventKind::QueriesGenerated)
                    .in_iteration(iteration)
                    .with_data(json!({
                        "count": ctx.queries.len(),
                        "queries": ctx.queries.iter().map(|q| q.text.as_str()).collect::<Vec<_>>(),
                    })),
            )
            .await;

            // Fan-out / fan-in
            let batch = executor.execute(&ctx.queries).await;
            for (slot, result) in &batch.slots {
                let (kind, data) = match result {
                    SlotResult::Completed { query_id, .. } => (
                        PipelineEventKind::SearchSlotCompleted,
                        json!({ "slot": slot, "query_id": query_id }),
                    ),
                    SlotResult::Failed { query_id, error } => (
                        PipelineEventKind::SearchSlotFailed,
                        json!({ "slot": slot, "query_id": query_id, "error": error }),
                    ),
                };
                self.emit(PipelineEvent::new(kind).in_iteration(iteration).with_data(data))
                    .await;
            }
            ctx.search_results = batch.slots;

            let aggregation = aggregate(&ctx.search_results);
            ctx.search_metrics.total_queries = ctx.queries.len();
            ctx.search_metrics.successful_searches = aggregation.successful_searches;
            ctx.search_metrics.papers_found += aggregation.records_found;
            self.emit(
                PipelineEvent::new(PipelineEventKind::CandidatesAggregated)
                    .in_iteration(iteration)
                    .with_data(json!({
                        "records_found": aggregation.records_found,
                        "unique": aggregation.candidates.len(),
                        "duplicates_dropped": aggregation.duplicates_dropped,
                        "successful_searches": aggregation.successful_searches,
                    })),
            )
            .await;

            // Score and select
            let candidates = aggregation.candidates;
            let scored = self.score_candidates(&scorer, &ctx.case_description, &candidates).await;
            ctx.search_metrics.papers_analyzed = candidates.len();
            ctx.candidates = candidates;
            ctx.selected = scorer.select(scored);
            ctx.consider_best();
            self.emit(
                PipelineEvent::new(PipelineEventKind::CandidatesScored)
                    .in_iteration(iteration)
                    .with_data(json!({
                        "analyzed": ctx.candidates.len(),
                        "selected": ctx.selected.len(),
                    })),
            )
            .await;

            // Gate
            let outcome = gate.evaluate(&ctx.selected, current_year);
            let passed = outcome == GateOutcome::Pass;
            match outcome {
                GateOutcome::Pass => {
                    self.emit(
                        PipelineEvent::new(PipelineEventKind::QualityGatePassed)
                            .in_iteration(iteration)
                            .with_data(json!({ "selected": ctx.selected.len() })),
                    )
                    .await;
                    iterations.pass();
                }
                GateOutcome::Refine { reason } => {
                    ctx.record_refinement(&reason);
                    self.emit(
                        PipelineEvent::new(PipelineEventKind::QualityGateFailed)
                            .in_iteration(iteration)
                            .with_data(json!({ "reason": reason })),
                    )
                    .await;
                    iterations.refine();
                }
            }

            ctx.iteration_metrics.push(IterationMetrics {
                iteration,
                total_queries: ctx.search_metrics.total_queries,
                successful_searches: ctx.search_metrics.successful_searches,
                papers_found: ctx.search_metrics.papers_found,
                papers_analyzed: ctx.search_metrics.papers_analyzed,
                papers_selected: ctx.selected.len(),
                passed,
            });

            let checkpoint_name = format!("iteration_{}", iteration);
            match ctx.checkpoint(&checkpoint_name) {
                Ok(checkpoint) => {
                    if let Some(archive) = &archive {
                        if let Err(e) = archive.save(checkpoint) {
                            tracing::warn!(error = %e, checkpoint = %checkpoint_name, "Checkpoint not archived");
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, checkpoint = %checkpoint_name, "Checkpoint failed"),
            }
        }

        let termination = iterations.termination().unwrap_or(Termination::MaxIterations);
        let final_papers = match termination {
            Termination::QualityMet { .. } => ctx.selected.clone(),
            Termination::MaxIterations => {
                tracing::warn!(
                    iterations = ctx.iteration,
                    best_iteration = ?ctx.best_iteration,
                    "Iteration budget spent without passing the quality gate, using best selection"
                );
                ctx.best_selection.clone()
            }
        };

        let mut registry = SourceRegistry::new();
        for paper in &final_papers {
            registry.register(paper);
        }

        let report = match self.draft_report(&ctx.case_description, &registry).await {
            Some(draft) => {
                let resolution = resolve_citations(&draft, &mut registry);
                self.emit(
                    PipelineEvent::new(PipelineEventKind::CitationsResolved).with_data(json!({
                        "resolved": resolution.resolved,
                        "unresolved": resolution.unresolved,
                        "sources": registry.len(),
                    })),
                )
                .await;
                Some(resolution.document)
            }
            None => None,
        };

        let passed = matches!(termination, Termination::QualityMet { .. });
        self.emit(PipelineEvent::new(PipelineEventKind::PipelineCompleted).with_data(json!({
            "total_iterations": ctx.iteration,
            "passed": passed,
            "final_papers": final_papers.len(),
        })))
        .await;

        tracing::info!(
            total_iterations = ctx.iteration,
            passed,
            final_papers = final_papers.len(),
            "Pipeline completed"
        );

        Ok(PipelineResult {
            formatted_references: markdown_reference_list(&final_papers),
            citation_summary: CitationSummary::from_papers(&final_papers),
            final_papers,
            total_iterations: ctx.iteration,
            termination,
            passed,
            refinement_history: ctx.refinement_history,
            search_metrics: ctx.search_metrics,
            iteration_metrics: ctx.iteration_metrics,
            queries_used: ctx.queries_used,
            report,
            sources: registry.sources().to_vec(),
            run_id: archive.as_ref().map(|a| a.run_id().to_string()),
            events: self.events.clone(),
        })
    }

    /// Ask for a new query batch. Failures yield an empty batch.
    async fn generate_queries(&self, ctx: &PipelineContext) -> Vec<Query> {
        let mut context = format!("Case:\n{}", ctx.case_description.trim());
        if let Some(reason) = &ctx.refinement_feedback {
            context.push_str(&format!(
                "\n\nPrevious search was insufficient: {}. Generate more targeted queries.",
                reason
            ));
        }

        let request = GenerationRequest::new(GenerationTask::QueryGeneration, context);
        let output = match self.generator.generate(request).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(error = %e, "Query generation failed");
                return Vec::new();
            }
        };

        match parse_generation(&output, Some("search_queries"), "query_generation") {
            Some(Value::Array(items)) => normalize_queries(items),
            Some(Value::Object(mut map)) => match map.remove("queries") {
                Some(Value::Array(items)) => normalize_queries(items),
                _ => {
                    tracing::warn!("Query generation returned no query list");
                    Vec::new()
                }
            },
            Some(other) => normalize_queries(vec![other]),
            None => Vec::new(),
        }
    }

    /// Score every candidate. A failed scoring call leaves all of them unscored.
    async fn score_candidates(
        &self,
        scorer: &Scorer,
        case_description: &str,
        candidates: &[CandidateRecord],
    ) -> Vec<ScoredCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let request = GenerationRequest::new(
            GenerationTask::PaperScoring,
            Scorer::scoring_context(case_description, candidates),
        );
        let entries = match self.generator.generate(request).await {
            Ok(output) => match parse_generation(&output, Some("scores"), "paper_scoring") {
                Some(Value::Array(entries)) => entries,
                Some(Value::Object(mut map)) => match map.remove("analyzed_papers") {
                    Some(Value::Array(entries)) => entries,
                    _ => vec![Value::Object(map)],
                },
                _ => Vec::new(),
            },
            Err(e) => {
                tracing::error!(error = %e, "Paper scoring failed");
                Vec::new()
            }
        };

        let matched = Scorer::match_entries(&entries, candidates);
        scorer.score(candidates.to_vec(), matched)
    }

    /// Draft the final document with cite markers for the registered sources
    async fn draft_report(&self, case_description: &str, registry: &SourceRegistry) -> Option<String> {
        let mut context = format!("Case:\n{}\n\nSources:\n", case_description.trim());
        for source in registry.sources() {
            let year = source.year.as_ref().map(|y| y.to_string()).unwrap_or_default();
            context.push_str(&format!(
                "- {}: {} ({}) {}\n",
                source.short_id,
                source.title,
                year,
                source.authors.join(", ")
            ));
        }

        let request = GenerationRequest::new(GenerationTask::ReportDrafting, context);
        match self.generator.generate(request).await {
            Ok(output) if output.is_empty() => {
                tracing::warn!("Report drafting returned nothing");
                None
            }
            Ok(Generation::Text(text)) => Some(text),
            Ok(Generation::Structured(value)) => {
                let markdown = value
                    .get("markdown")
                    .or_else(|| value.get("report"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if markdown.is_none() {
                    tracing::warn!("Report drafting returned no markdown or report field");
                }
                markdown
            }
            Err(e) => {
                tracing::warn!(error = %e, "Report drafting failed");
                None
            }
        }
    }

    /// Record an event and forward it to the channel, if any
    async fn emit(&mut self, event: PipelineEvent) {
        self.events.push(event.clone());
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}
