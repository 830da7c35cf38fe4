//! # Search Executor
//!
//! Fan-out/fan-in over a fixed number of search slots.
//!
//! ```text
//! queries[..K] ──spawn──> slot 1 ─┐
//!                         slot 2 ─┤ join_next until all K are terminal
//!                         ...     ├──> BTreeMap<slot, SlotResult>
//!                         slot K ─┘
//! ```
//!
//! Every slot is independent: an error, timeout or panic in one slot becomes
//! that slot's `Failed` entry and never touches its siblings.

use crate::generation::{Generation, GenerationRequest, GenerationTask, Generator};
use crate::records::Query;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Terminal state of one search slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlotResult {
    Completed { query_id: u32, output: Generation },
    Failed { query_id: u32, error: String },
}

impl SlotResult {
    pub fn query_id(&self) -> u32 {
        match self {
            SlotResult::Completed { query_id, .. } | SlotResult::Failed { query_id, .. } => {
                *query_id
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SlotResult::Failed { .. })
    }
}

/// Results of one fan-out, keyed by 1-based slot index
#[derive(Debug, Clone, Default)]
pub struct SearchBatch {
    pub slots: BTreeMap<usize, SlotResult>,
    /// Queries actually dispatched, in slot order
    pub dispatched: Vec<Query>,
    /// Queries dropped because they exceeded the slot count
    pub dropped: usize,
}

/// Runs one retrieval task per query slot, concurrently
pub struct SearchExecutor {
    generator: Arc<dyn Generator>,
    max_slots: usize,
    timeout: Option<Duration>,
}

impl SearchExecutor {
    pub fn new(generator: Arc<dyn Generator>, max_slots: usize) -> Self {
        Self {
            generator,
            max_slots,
            timeout: None,
        }
    }

    /// Bound each slot's wall-clock time. A slot that exceeds it is `Failed`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Dispatch the first `max_slots` queries and wait for every slot to finish
    pub async fn execute(&self, queries: &[Query]) -> SearchBatch {
        let dropped = queries.len().saturating_sub(self.max_slots);
        if dropped > 0 {
            tracing::warn!(
                issued = queries.len(),
                max_slots = self.max_slots,
                dropped,
                "More queries than search slots, excess queries dropped"
            );
        }

        let dispatched: Vec<Query> = queries.iter().take(self.max_slots).cloned().collect();

        // Pre-fill so a slot whose task vanishes still reads as zero records
        let mut slots: BTreeMap<usize, SlotResult> = dispatched
            .iter()
            .enumerate()
            .map(|(i, query)| {
                (
                    i + 1,
                    SlotResult::Failed {
                        query_id: query.id,
                        error: "slot did not report".to_string(),
                    },
                )
            })
            .collect();

        let mut join_set = JoinSet::new();

        // SCATTER
        for (i, query) in dispatched.iter().enumerate() {
            let slot = i + 1;
            let generator = self.generator.clone();
            let timeout = self.timeout;
            let query_id = query.id;
            let request = GenerationRequest::new(GenerationTask::LiteratureSearch, search_context(query));

            join_set.spawn(async move {
                let outcome = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, generator.generate(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(anyhow::anyhow!("timed out after {}s", limit.as_secs())),
                    },
                    None => generator.generate(request).await,
                };

                let result = match outcome {
                    Ok(output) => SlotResult::Completed { query_id, output },
                    Err(e) => SlotResult::Failed {
                        query_id,
                        error: e.to_string(),
                    },
                };
                (slot, result)
            });
        }

        // GATHER
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((slot, result)) => {
                    if let SlotResult::Failed { error, .. } = &result {
                        tracing::warn!(slot, %error, "Search slot failed");
                    } else {
                        tracing::debug!(slot, "Search slot completed");
                    }
                    slots.insert(slot, result);
                }
                Err(e) => tracing::error!("Search task panicked: {}", e),
            }
        }

        SearchBatch {
            slots,
            dispatched,
            dropped,
        }
    }
}

/// The retrieval task sees only its own query
fn search_context(query: &Query) -> String {
    let mut context = format!(
        "Search query: {}\nCategory: {}\nPriority: {:?}",
        query.text,
        query.category.as_str(),
        query.priority
    );
    if !query.focus.is_empty() {
        context.push_str(&format!("\nFocus: {}", query.focus));
    }
    context
}
