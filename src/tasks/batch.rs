//! Batch state is derived, never stored: a batch is whatever tasks share a
//! `batch_id`, so the summary can never drift from its members.

use anyhow::Result;
use rusqlite::params;
use serde::Serialize;

use crate::db::pool::ControlPool;

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub processing: u32,
    pub pending: u32,
    /// Mean of member progress; tasks not yet started contribute 0.
    pub overall_progress: f64,
    pub is_finished: bool,
}

/// Single aggregate scan of the ledger. `None` when no task carries this id.
pub fn summarize(db: &ControlPool, batch_id: &str) -> Result<Option<BatchSummary>> {
    let row = db.read(|conn| {
        let row = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'completed'), 0),
                    COALESCE(SUM(status = 'failed'), 0),
                    COALESCE(SUM(status = 'processing'), 0),
                    COALESCE(SUM(status = 'pending'), 0),
                    COALESCE(AVG(progress), 0.0)
             FROM tasks WHERE batch_id = ?1",
            params![batch_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, f64>(5)?,
                ))
            },
        )?;
        Ok(row)
    })?;

    let (total, completed, failed, processing, pending, overall_progress) = row;
    if total == 0 {
        return Ok(None);
    }

    Ok(Some(BatchSummary {
        total: total as u32,
        completed: completed as u32,
        failed: failed as u32,
        processing: processing as u32,
        pending: pending as u32,
        overall_progress,
        is_finished: completed + failed == total,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::tasks::{ledger, ContentScope, TaskPayload, TaskResult};

    fn test_pool() -> (ControlPool, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("siteforge-batch-{}.db", uuid::Uuid::new_v4()));
        let pool = ControlPool::open(path.to_str().unwrap(), 1).unwrap();
        db::run_migrations(&pool).unwrap();
        (pool, path)
    }

    fn payload() -> TaskPayload {
        TaskPayload::BulkContent {
            provider: "openai".into(),
            scope: ContentScope::Pages,
            overwrite: false,
            daily_count: 5,
        }
    }

    fn done() -> TaskResult {
        TaskResult::BulkContent {
            created: 1,
            skipped: 0,
            errors: vec![],
        }
    }

    #[test]
    fn test_unknown_batch_is_none() {
        let (pool, path) = test_pool();
        assert!(summarize(&pool, "nope").unwrap().is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_mixed_statuses_aggregate() {
        let (pool, path) = test_pool();

        let a = ledger::create(&pool, &payload(), None, Some("t1"), Some("b1")).unwrap();
        let b = ledger::create(&pool, &payload(), None, Some("t2"), Some("b1")).unwrap();
        let c = ledger::create(&pool, &payload(), None, Some("t3"), Some("b1")).unwrap();
        let d = ledger::create(&pool, &payload(), None, Some("t4"), Some("b1")).unwrap();

        // a: completed (100), b: failed at 35, c: processing at 25, d: pending (0)
        ledger::mark_processing(&pool, a.id, 5).unwrap();
        ledger::complete(&pool, a.id, &done()).unwrap();
        ledger::mark_processing(&pool, b.id, 5).unwrap();
        ledger::update_progress(&pool, b.id, 35).unwrap();
        ledger::fail(&pool, b.id, "boom").unwrap();
        ledger::mark_processing(&pool, c.id, 5).unwrap();
        ledger::update_progress(&pool, c.id, 25).unwrap();
        let _ = d;

        let summary = summarize(&pool, "b1").unwrap().unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processing, 1);
        assert_eq!(summary.pending, 1);
        // mean(100, 35, 25, 0)
        assert!((summary.overall_progress - 40.0).abs() < 1e-9);
        assert!(!summary.is_finished);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_finished_when_all_terminal() {
        let (pool, path) = test_pool();

        let a = ledger::create(&pool, &payload(), None, Some("t1"), Some("b2")).unwrap();
        let b = ledger::create(&pool, &payload(), None, Some("t2"), Some("b2")).unwrap();
        ledger::mark_processing(&pool, a.id, 5).unwrap();
        ledger::complete(&pool, a.id, &done()).unwrap();
        ledger::mark_processing(&pool, b.id, 5).unwrap();
        ledger::fail(&pool, b.id, "boom").unwrap();

        let summary = summarize(&pool, "b2").unwrap().unwrap();
        assert!(summary.is_finished);
        // A failed member never fails the batch; the mix is just reported.
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_membership_is_by_stored_batch_id_only() {
        let (pool, path) = test_pool();
        ledger::create(&pool, &payload(), None, Some("t1"), Some("b3")).unwrap();
        ledger::create(&pool, &payload(), None, Some("t1"), Some("other")).unwrap();
        ledger::create(&pool, &payload(), None, Some("t1"), None).unwrap();

        let summary = summarize(&pool, "b3").unwrap().unwrap();
        assert_eq!(summary.total, 1);
        let _ = std::fs::remove_file(&path);
    }
}
