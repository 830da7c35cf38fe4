//! # Pipeline Events
//!
//! Progress events emitted by the iteration controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of pipeline event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventKind {
    /// Run accepted a case description
    PipelineStarted,
    /// A search iteration began
    IterationStarted,
    /// Queries produced for this iteration
    QueriesGenerated,
    /// One search slot returned output
    SearchSlotCompleted,
    /// One search slot errored; others continue
    SearchSlotFailed,
    /// Slot outputs merged and deduplicated
    CandidatesAggregated,
    /// Candidates scored and top set selected
    CandidatesScored,
    /// Selected set missed one or more thresholds
    QualityGateFailed,
    /// Selected set met every threshold
    QualityGatePassed,
    /// Report citation tags rewritten to links
    CitationsResolved,
    /// Run finished with a termination reason
    PipelineCompleted,
}

/// An event in the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: PipelineEventKind,
    /// Iteration the event belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl PipelineEvent {
    pub fn new(kind: PipelineEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            iteration: None,
            data: None,
        }
    }

    pub fn in_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
