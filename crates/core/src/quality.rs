//! # Quality Gate
//!
//! A pure function of the selected set. Checks run in a fixed order and the
//! first failure short-circuits with a reason naming the threshold:
//!
//! 1. paper count
//! 2. recent papers (year within the recency window)
//! 3. average relevance (only if every paper carries a relevance score)
//! 4. study type diversity (skipped when no type is known)

use crate::config::QualityThresholds;
use crate::scoring::ScoredCandidate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Pass/fail with the failing threshold described
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub pass: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What the controller should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Thresholds met: stop iterating
    Pass,
    /// Thresholds missed: iterate again with this feedback
    Refine { reason: String },
}

impl GateOutcome {
    pub fn verdict(&self) -> QualityVerdict {
        match self {
            GateOutcome::Pass => QualityVerdict {
                pass: true,
                reason: None,
            },
            GateOutcome::Refine { reason } => QualityVerdict {
                pass: false,
                reason: Some(reason.clone()),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct QualityGate {
    thresholds: QualityThresholds,
}

impl QualityGate {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn evaluate(&self, selected: &[ScoredCandidate], current_year: i32) -> GateOutcome {
        let t = &self.thresholds;

        if selected.len() < t.min_papers {
            return refine(format!(
                "Insufficient papers ({} < {})",
                selected.len(),
                t.min_papers
            ));
        }

        let cutoff = current_year.saturating_sub(t.recent_window_years);
        let recent = selected
            .iter()
            .filter_map(|c| c.record.year_value())
            .filter(|year| *year >= cutoff)
            .count();
        if recent < t.min_recent_papers {
            return refine(format!(
                "Insufficient recent literature ({} papers from {} or later < {})",
                recent, cutoff, t.min_recent_papers
            ));
        }

        let relevance: Option<Vec<f64>> = selected.iter().map(|c| c.relevance_score).collect();
        match relevance {
            Some(scores) if !scores.is_empty() => {
                let average = scores.iter().sum::<f64>() / scores.len() as f64;
                if average < t.min_average_relevance {
                    return refine(format!(
                        "Low average relevance score ({:.1} < {:.1})",
                        average, t.min_average_relevance
                    ));
                }
            }
            _ => tracing::debug!("Relevance scores incomplete, average relevance check skipped"),
        }

        let types: HashSet<String> = selected
            .iter()
            .filter_map(|c| c.record.study_type.as_deref())
            .map(|kind| kind.trim().to_lowercase())
            .filter(|kind| !kind.is_empty() && kind != "unknown")
            .collect();
        if !types.is_empty() && types.len() < t.min_distinct_types {
            return refine(format!(
                "Insufficient study type diversity ({} < {} distinct types)",
                types.len(),
                t.min_distinct_types
            ));
        }

        GateOutcome::Pass
    }
}

fn refine(reason: String) -> GateOutcome {
    tracing::info!(%reason, "Quality gate failed");
    GateOutcome::Refine { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{CandidateRecord, PublicationYear};
    use crate::scoring::DimensionScores;

    fn candidate(title: &str, year: Option<PublicationYear>, relevance: Option<f64>, kind: Option<&str>) -> ScoredCandidate {
        let mut record = CandidateRecord::titled(title);
        record.year = year;
        record.study_type = kind.map(str::to_string);
        ScoredCandidate {
            record,
            scores: DimensionScores::default(),
            composite_score: 7.0,
            relevance_score: relevance,
            citation_links: None,
        }
    }

    fn good_set() -> Vec<ScoredCandidate> {
        let kinds = ["rct", "review", "rct", "cohort", "case report"];
        (0..5)
            .map(|i| {
                candidate(
                    &format!("paper {}", i),
                    Some(PublicationYear::Number(2024)),
                    Some(8.0),
                    Some(kinds[i]),
                )
            })
            .collect()
    }

    fn gate() -> QualityGate {
        QualityGate::new(QualityThresholds::default())
    }

    #[test]
    fn test_passes_healthy_set() {
        assert_eq!(gate().evaluate(&good_set(), 2025), GateOutcome::Pass);
        assert!(GateOutcome::Pass.verdict().pass);
    }

    #[test]
    fn test_insufficient_papers() {
        let mut set = good_set();
        set.pop();
        let verdict = gate().evaluate(&set, 2025).verdict();
        assert!(!verdict.pass);
        assert!(verdict.reason.unwrap().contains("Insufficient papers (4 < 5)"));
    }

    #[test]
    fn test_recency_tolerates_text_years() {
        let mut set = good_set();
        for (i, c) in set.iter_mut().enumerate() {
            c.record.year = Some(match i {
                0 => PublicationYear::Text("2023".to_string()),
                1 => PublicationYear::Text(" 2024 ".to_string()),
                2 => PublicationYear::Text("in press".to_string()),
                _ => PublicationYear::Number(2010),
            });
        }
        match gate().evaluate(&set, 2025) {
            GateOutcome::Refine { reason } => assert!(reason.contains("recent literature (2 papers")),
            GateOutcome::Pass => panic!("expected recency failure"),
        }

        set[3].record.year = Some(PublicationYear::Number(2025));
        assert_eq!(gate().evaluate(&set, 2025), GateOutcome::Pass);
    }

    #[test]
    fn test_recency_cutoff_saturates() {
        let gate = QualityGate::new(QualityThresholds {
            recent_window_years: i32::MAX,
            ..QualityThresholds::default()
        });
        assert_eq!(gate.evaluate(&good_set(), -10), GateOutcome::Pass);
    }

    #[test]
    fn test_average_relevance_only_with_complete_data() {
        let mut set = good_set();
        for c in set.iter_mut() {
            c.relevance_score = Some(5.0);
        }
        assert!(matches!(gate().evaluate(&set, 2025), GateOutcome::Refine { reason } if reason.contains("relevance")));

        set[0].relevance_score = None;
        assert_eq!(gate().evaluate(&set, 2025), GateOutcome::Pass);
    }

    #[test]
    fn test_diversity() {
        let mut set = good_set();
        for c in set.iter_mut() {
            c.record.study_type = Some("RCT".to_string());
        }
        assert!(matches!(gate().evaluate(&set, 2025), GateOutcome::Refine { reason } if reason.contains("diversity")));

        for c in set.iter_mut() {
            c.record.study_type = Some("unknown".to_string());
        }
        assert_eq!(gate().evaluate(&set, 2025), GateOutcome::Pass);
    }

    #[test]
    fn test_deterministic() {
        let mut set = good_set();
        set.truncate(2);
        let first = gate().evaluate(&set, 2025);
        for _ in 0..10 {
            assert_eq!(gate().evaluate(&set, 2025), first);
        }
    }
}
