//! # Checkpoint Archive
//!
//! Persists context checkpoints in SQLite so a run can be inspected or
//! resumed from any iteration after the process exits.

use super::context::Checkpoint;
use super::db::EvidenceDb;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::sync::{Arc, Mutex};

pub struct CheckpointArchive {
    conn: Arc<Mutex<rusqlite::Connection>>,
    run_id: String,
}

impl CheckpointArchive {
    /// Start archiving a new run
    pub fn begin_run(db: &EvidenceDb, case_description: &str) -> Result<Self> {
        let started_at = Utc::now();
        let run_id = format!(
            "run_{}_{:x}",
            started_at.format("%Y%m%d_%H%M%S"),
            started_at.timestamp_subsec_nanos()
        );

        let archive = Self {
            conn: db.connection(),
            run_id,
        };

        {
            let conn = archive.lock()?;
            conn.execute(
                "INSERT INTO runs (id, case_description, started_at) VALUES (?1, ?2, ?3)",
                params![archive.run_id, case_description, started_at.to_rfc3339()],
            )
            .context("Failed to record run")?;
        }

        tracing::info!(run_id = %archive.run_id, "Checkpoint archive opened");
        Ok(archive)
    }

    /// Archive for an existing run
    pub fn for_run(db: &EvidenceDb, run_id: &str) -> Self {
        Self {
            conn: db.connection(),
            run_id: run_id.to_string(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Save a checkpoint, replacing one of the same name in this run
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let state_json = serde_json::to_string(&checkpoint.state)?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO checkpoints (run_id, name, timestamp, state)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                self.run_id,
                checkpoint.name,
                checkpoint.timestamp.to_rfc3339(),
                state_json
            ],
        )
        .with_context(|| format!("Failed to archive checkpoint {}", checkpoint.name))?;

        tracing::debug!(run_id = %self.run_id, checkpoint = %checkpoint.name, "Checkpoint archived");
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<Checkpoint> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT name, timestamp, state FROM checkpoints WHERE run_id = ?1 AND name = ?2",
            params![self.run_id, name],
            Self::row_to_checkpoint,
        )
        .with_context(|| format!("Checkpoint {} not found in run {}", name, self.run_id))
    }

    /// `(name, timestamp)` of this run's checkpoints, oldest first
    pub fn list(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name, timestamp, state FROM checkpoints WHERE run_id = ?1 ORDER BY timestamp, name",
        )?;
        let checkpoints = stmt
            .query_map(params![self.run_id], Self::row_to_checkpoint)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list checkpoints")?;
        Ok(checkpoints
            .into_iter()
            .map(|c| (c.name, c.timestamp))
            .collect())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    fn row_to_checkpoint(row: &rusqlite::Row) -> rusqlite::Result<Checkpoint> {
        let name: String = row.get(0)?;
        let timestamp_str: String = row.get(1)?;
        let state_json: String = row.get(2)?;

        Ok(Checkpoint {
            name,
            timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            state: serde_json::from_str(&state_json).unwrap_or(serde_json::Value::Null),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PipelineContext;

    #[test]
    fn test_archive_roundtrip_into_context() {
        let db = EvidenceDb::open_in_memory().unwrap();
        let archive = CheckpointArchive::begin_run(&db, "case").unwrap();

        let mut ctx = PipelineContext::new("case");
        ctx.begin_iteration();
        ctx.search_metrics.papers_found = 3;
        archive.save(ctx.checkpoint("iteration_1").unwrap()).unwrap();
        ctx.begin_iteration();
        archive.save(ctx.checkpoint("iteration_2").unwrap()).unwrap();

        let names: Vec<String> = archive.list().unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["iteration_1", "iteration_2"]);

        let mut fresh = PipelineContext::new("other");
        fresh.insert_checkpoint(archive.load("iteration_1").unwrap());
        fresh.restore("iteration_1").unwrap();
        assert_eq!(fresh.iteration, 1);
        assert_eq!(fresh.search_metrics.papers_found, 3);
        assert_eq!(fresh.case_description, "case");

        assert!(archive.load("iteration_9").is_err());
    }

    #[test]
    fn test_runs_are_isolated() {
        let db = EvidenceDb::open_in_memory().unwrap();
        let first = CheckpointArchive::begin_run(&db, "a").unwrap();
        let mut ctx = PipelineContext::new("a");
        first.save(ctx.checkpoint("iteration_1").unwrap()).unwrap();

        let other = CheckpointArchive::for_run(&db, "run_unknown");
        assert!(other.list().unwrap().is_empty());
        assert_eq!(CheckpointArchive::for_run(&db, first.run_id()).list().unwrap().len(), 1);
    }
}
