//! # Pipeline Context
//!
//! All state of one pipeline run, owned by the iteration controller and
//! lent to each stage. Namespaces are plain fields; a checkpoint is the
//! whole context minus the checkpoint collection, as nested JSON.

use crate::records::{CandidateRecord, Query};
use crate::scoring::ScoredCandidate;
use crate::search::SlotResult;
use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running search counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetrics {
    /// Queries issued in the latest iteration
    pub total_queries: usize,
    /// Slots of the latest iteration that yielded at least one valid record
    pub successful_searches: usize,
    /// Valid records before deduplication, summed over all iterations
    pub papers_found: usize,
    /// Unique candidates scored in the latest iteration
    pub papers_analyzed: usize,
}

/// Per-iteration metrics record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationMetrics {
    pub iteration: u32,
    pub total_queries: usize,
    pub successful_searches: usize,
    pub papers_found: usize,
    pub papers_analyzed: usize,
    pub papers_selected: usize,
    pub passed: bool,
}

/// Why an iteration's gate failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementEntry {
    pub iteration: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// A named copy of the context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub state: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineContext {
    pub case_description: String,
    /// Counts up from 0, one per started iteration
    pub iteration: u32,
    /// Active query set, replaced every iteration
    pub queries: Vec<Query>,
    /// Every query issued so far, in order
    pub queries_used: Vec<Query>,
    /// Latest fan-out, keyed by slot
    pub search_results: BTreeMap<usize, SlotResult>,
    pub candidates: Vec<CandidateRecord>,
    pub selected: Vec<ScoredCandidate>,
    /// Best selection seen so far and the iteration it came from
    pub best_selection: Vec<ScoredCandidate>,
    pub best_iteration: Option<u32>,
    pub search_metrics: SearchMetrics,
    pub iteration_metrics: Vec<IterationMetrics>,
    pub refinement_history: Vec<RefinementEntry>,
    /// Feedback for the next query generation
    pub refinement_feedback: Option<String>,
    #[serde(skip)]
    checkpoints: BTreeMap<String, Checkpoint>,
}

impl PipelineContext {
    pub fn new(case_description: impl Into<String>) -> Self {
        Self {
            case_description: case_description.into(),
            ..Self::default()
        }
    }

    /// Clear every namespace, keeping the case and checkpoints
    pub fn reset(&mut self) {
        let case_description = std::mem::take(&mut self.case_description);
        let checkpoints = std::mem::take(&mut self.checkpoints);
        *self = Self {
            case_description,
            checkpoints,
            ..Self::default()
        };
    }

    pub fn begin_iteration(&mut self) -> u32 {
        self.iteration += 1;
        self.iteration
    }

    /// Replace the active queries, remembering them in `queries_used`
    pub fn set_queries(&mut self, queries: Vec<Query>) {
        self.queries_used.extend(queries.iter().cloned());
        self.queries = queries;
    }

    pub fn record_refinement(&mut self, reason: &str) {
        self.refinement_history.push(RefinementEntry {
            iteration: self.iteration,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
        self.refinement_feedback = Some(reason.to_string());
    }

    /// Keep `selected` as the best so far if it beats the current best by
    /// size, then by mean composite score
    pub fn consider_best(&mut self) -> bool {
        let rank = |set: &[ScoredCandidate]| {
            let mean = if set.is_empty() {
                0.0
            } else {
                set.iter().map(|c| c.composite_score).sum::<f64>() / set.len() as f64
            };
            (set.len(), mean)
        };
        let (new_len, new_mean) = rank(&self.selected);
        let (best_len, best_mean) = rank(&self.best_selection);

        let better = self.best_iteration.is_none()
            || new_len > best_len
            || (new_len == best_len && new_mean > best_mean);
        if better {
            self.best_selection = self.selected.clone();
            self.best_iteration = Some(self.iteration);
        }
        better
    }

    /// The context without its checkpoints, as nested JSON
    pub fn snapshot(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).context("Failed to serialize pipeline context")
    }

    /// Store a named snapshot, replacing any checkpoint of the same name
    pub fn checkpoint(&mut self, name: &str) -> Result<&Checkpoint> {
        let checkpoint = Checkpoint {
            name: name.to_string(),
            timestamp: Utc::now(),
            state: self.snapshot()?,
        };
        tracing::debug!(checkpoint = %name, "Checkpoint taken");
        self.checkpoints.insert(name.to_string(), checkpoint);
        self.checkpoints
            .get(name)
            .with_context(|| format!("Checkpoint {} missing after insert", name))
    }

    /// Replace the live state with a checkpoint's contents
    pub fn restore(&mut self, name: &str) -> Result<()> {
        let state = self
            .checkpoints
            .get(name)
            .map(|c| c.state.clone())
            .with_context(|| format!("No checkpoint named {}", name))?;
        self.restore_from(state)
            .with_context(|| format!("Failed to restore checkpoint {}", name))?;
        tracing::info!(checkpoint = %name, iteration = self.iteration, "State restored from checkpoint");
        Ok(())
    }

    /// Replace the live state with a snapshot from elsewhere (e.g. the archive)
    pub fn restore_from(&mut self, state: serde_json::Value) -> Result<()> {
        let restored: PipelineContext = serde_json::from_value(state)?;
        let checkpoints = std::mem::take(&mut self.checkpoints);
        *self = restored;
        self.checkpoints = checkpoints;
        Ok(())
    }

    /// Import a checkpoint, e.g. one loaded from the archive
    pub fn insert_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.insert(checkpoint.name.clone(), checkpoint);
    }

    pub fn get_checkpoint(&self, name: &str) -> Option<&Checkpoint> {
        self.checkpoints.get(name)
    }

    /// `(name, timestamp)` of every checkpoint, oldest first
    pub fn list_checkpoints(&self) -> Vec<(String, DateTime<Utc>)> {
        let mut list: Vec<(String, DateTime<Utc>)> = self
            .checkpoints
            .values()
            .map(|c| (c.name.clone(), c.timestamp))
            .collect();
        list.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        list
    }
}
