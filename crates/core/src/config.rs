//! # Pipeline Configuration
//!
//! Policy values for the retrieval loop: iteration bound, search fan-out width,
//! quality thresholds, selection policy and scoring weights.
//!
//! The numeric defaults mirror the clinical literature workflow the pipeline
//! was built for. None of them are structural; all are overridable.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Invalid configuration. Surfaced to the caller before the loop starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_iterations must be at least 1")]
    NoIterations,

    #[error("max_search_slots must be at least 1")]
    NoSearchSlots,

    #[error("max_selected must be at least 1")]
    EmptySelection,

    #[error("recent_window_years must not be negative, got {0}")]
    NegativeRecencyWindow(i32),

    #[error("{field} must be a finite value in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("scoring weight '{dimension}' must be finite and non-negative, got {value}")]
    NegativeWeight { dimension: &'static str, value: f64 },

    #[error("scoring weights sum to zero")]
    ZeroWeightSum,
}

/// Thresholds checked by the quality gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Minimum number of selected papers
    pub min_papers: usize,
    /// Minimum number of papers published within the recency window
    pub min_recent_papers: usize,
    /// A paper is recent when `year >= current_year - recent_window_years`
    pub recent_window_years: i32,
    /// Minimum mean relevance, checked only when every paper carries one
    pub min_average_relevance: f64,
    /// Minimum number of distinct known study types
    pub min_distinct_types: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_papers: 5,
            min_recent_papers: 3,
            recent_window_years: 2,
            min_average_relevance: 7.0,
            min_distinct_types: 2,
        }
    }
}

/// Which scored candidates make it into the selected set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    /// Candidates below this composite score are dropped (0-10 scale)
    pub min_composite_score: f64,
    /// Upper bound on the selected set
    pub max_selected: usize,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            min_composite_score: 6.0,
            max_selected: 7,
        }
    }
}

/// Relative weight of each scoring dimension.
///
/// Weights are normalized by their sum, so the composite score stays on the
/// same 0-10 scale as the dimension scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub clinical_relevance: f64,
    pub evidence_quality: f64,
    pub recency: f64,
    pub actionability: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            clinical_relevance: 0.30,
            evidence_quality: 0.25,
            recency: 0.20,
            actionability: 0.25,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.clinical_relevance + self.evidence_quality + self.recency + self.actionability
    }

    fn entries(&self) -> [(&'static str, f64); 4] {
        [
            ("clinical_relevance", self.clinical_relevance),
            ("evidence_quality", self.evidence_quality),
            ("recency", self.recency),
            ("actionability", self.actionability),
        ]
    }
}

/// Configuration for one pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on loop iterations
    pub max_iterations: u32,
    /// Number of concurrent search slots; extra queries are dropped
    pub max_search_slots: usize,
    pub quality: QualityThresholds,
    pub selection: SelectionPolicy,
    pub weights: ScoringWeights,
    /// Per-slot deadline. `None` waits on the generation backend indefinitely.
    pub search_timeout_secs: Option<u64>,
    /// Reference year for recency checks. `None` uses the wall clock.
    pub current_year: Option<i32>,
    /// Archive every checkpoint into this SQLite database
    pub checkpoint_db: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            max_search_slots: 5,
            quality: QualityThresholds::default(),
            selection: SelectionPolicy::default(),
            weights: ScoringWeights::default(),
            search_timeout_secs: Some(120),
            current_year: None,
            checkpoint_db: None,
        }
    }
}

impl PipelineConfig {
    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::NoIterations);
        }
        if self.max_search_slots == 0 {
            return Err(ConfigError::NoSearchSlots);
        }
        if self.selection.max_selected == 0 {
            return Err(ConfigError::EmptySelection);
        }
        if self.quality.recent_window_years < 0 {
            return Err(ConfigError::NegativeRecencyWindow(
                self.quality.recent_window_years,
            ));
        }

        check_range(
            "selection.min_composite_score",
            self.selection.min_composite_score,
            0.0,
            10.0,
        )?;
        check_range(
            "quality.min_average_relevance",
            self.quality.min_average_relevance,
            0.0,
            10.0,
        )?;

        for (dimension, value) in self.weights.entries() {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeWeight { dimension, value });
            }
        }
        if self.weights.sum() <= 0.0 {
            return Err(ConfigError::ZeroWeightSum);
        }

        Ok(())
    }

    /// The year recency is measured against
    pub fn reference_year(&self) -> i32 {
        use chrono::Datelike;
        self.current_year
            .unwrap_or_else(|| chrono::Utc::now().year())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}
