//! Durable task records. Transitions are single atomic UPDATEs guarded so a
//! task can never leave a terminal state, and the completed/failed invariants
//! (`completed ⇒ progress 100, no error`; `failed ⇒ error set`) are encoded in
//! the operations themselves rather than left to callers.

use anyhow::{bail, Result};
use rusqlite::params;

use crate::db::pool::ControlPool;
use crate::tasks::{Task, TaskPayload, TaskResult, TASK_COLUMNS};

pub fn create(
    db: &ControlPool,
    payload: &TaskPayload,
    source_tenant_id: Option<&str>,
    target_tenant_id: Option<&str>,
    batch_id: Option<&str>,
) -> Result<Task> {
    let payload_json = serde_json::to_string(payload)?;
    let task_type = payload.task_type();

    let id = db.write(|conn| {
        conn.execute(
            "INSERT INTO tasks (task_type, status, progress, source_tenant_id, target_tenant_id, batch_id, payload)
             VALUES (?1, 'pending', 0, ?2, ?3, ?4, ?5)",
            params![
                task_type.as_str(),
                source_tenant_id,
                target_tenant_id,
                batch_id,
                payload_json,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })?;

    get(db, id)?.ok_or_else(|| anyhow::anyhow!("task {id} vanished after insert"))
}

pub fn get(db: &ControlPool, id: i64) -> Result<Option<Task>> {
    db.read(|conn| {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], Task::from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    })
}

pub fn list_by_batch(db: &ControlPool, batch_id: &str) -> Result<Vec<Task>> {
    db.read(|conn| {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE batch_id = ?1 ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![batch_id], Task::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// `pending -> processing`. The worker that owns the task calls this exactly
/// once before doing any work.
pub fn mark_processing(db: &ControlPool, id: i64, progress: u8) -> Result<()> {
    transition(
        db,
        id,
        "UPDATE tasks
         SET status = 'processing', progress = ?2,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
         WHERE id = ?1 AND status = 'pending'",
        params![id, progress as i64],
    )
}

/// Progress report while `processing`. Values are expected to be
/// non-decreasing; the pipelines only ever move checkpoints forward.
pub fn update_progress(db: &ControlPool, id: i64, progress: u8) -> Result<()> {
    transition(
        db,
        id,
        "UPDATE tasks
         SET progress = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
         WHERE id = ?1 AND status = 'processing'",
        params![id, progress as i64],
    )
}

/// Terminal success: progress pinned at 100, error cleared, result stored.
pub fn complete(db: &ControlPool, id: i64, result: &TaskResult) -> Result<()> {
    let result_json = serde_json::to_string(result)?;
    transition(
        db,
        id,
        "UPDATE tasks
         SET status = 'completed', progress = 100, result = ?2, error_message = NULL,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
         WHERE id = ?1 AND status IN ('pending', 'processing')",
        params![id, result_json],
    )
}

/// Terminal failure: error recorded, progress frozen at its last value.
pub fn fail(db: &ControlPool, id: i64, error_message: &str) -> Result<()> {
    transition(
        db,
        id,
        "UPDATE tasks
         SET status = 'failed', error_message = ?2,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
         WHERE id = ?1 AND status IN ('pending', 'processing')",
        params![id, error_message],
    )
}

/// Run one guarded transition UPDATE. Zero affected rows means the task is
/// missing or already terminal; both are caller bugs worth surfacing.
fn transition(db: &ControlPool, id: i64, sql: &str, params: impl rusqlite::Params) -> Result<()> {
    let changed = db.write(|conn| Ok(conn.execute(sql, params)?))?;
    if changed == 0 {
        match get(db, id)? {
            Some(task) => bail!(
                "task {id} is '{}' and cannot transition",
                task.status.as_str()
            ),
            None => bail!("task {id} not found"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::tasks::{ContentScope, TaskStatus};

    fn test_pool() -> (ControlPool, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("siteforge-ledger-{}.db", uuid::Uuid::new_v4()));
        let pool = ControlPool::open(path.to_str().unwrap(), 1).unwrap();
        db::run_migrations(&pool).unwrap();
        (pool, path)
    }

    fn bulk_payload() -> TaskPayload {
        TaskPayload::BulkContent {
            provider: "openai".into(),
            scope: ContentScope::All,
            overwrite: false,
            daily_count: 5,
        }
    }

    #[test]
    fn test_create_starts_pending_at_zero() {
        let (pool, path) = test_pool();
        let task = create(&pool, &bulk_payload(), None, Some("t1"), Some("b1")).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
        assert_eq!(task.target_tenant_id.as_deref(), Some("t1"));
        assert_eq!(task.batch_id.as_deref(), Some("b1"));
        assert!(task.result.is_none());
        assert!(task.error_message.is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_lifecycle_to_completed() {
        let (pool, path) = test_pool();
        let task = create(&pool, &bulk_payload(), None, Some("t1"), None).unwrap();

        mark_processing(&pool, task.id, 5).unwrap();
        update_progress(&pool, task.id, 50).unwrap();
        complete(
            &pool,
            task.id,
            &TaskResult::BulkContent {
                created: 3,
                skipped: 1,
                errors: vec![],
            },
        )
        .unwrap();

        let done = get(&pool, task.id).unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        // completed ⇒ progress == 100 ∧ error_message == null
        assert_eq!(done.progress, 100);
        assert!(done.error_message.is_none());
        assert!(done.result.is_some());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_fail_records_error_and_freezes_progress() {
        let (pool, path) = test_pool();
        let task = create(&pool, &bulk_payload(), None, Some("t1"), None).unwrap();

        mark_processing(&pool, task.id, 5).unwrap();
        update_progress(&pool, task.id, 35).unwrap();
        fail(&pool, task.id, "tenant store unreachable").unwrap();

        let failed = get(&pool, task.id).unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        // failed ⇒ error_message != null; progress frozen at last value
        assert_eq!(failed.error_message.as_deref(), Some("tenant store unreachable"));
        assert_eq!(failed.progress, 35);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_no_transition_out_of_terminal_state() {
        let (pool, path) = test_pool();
        let task = create(&pool, &bulk_payload(), None, Some("t1"), None).unwrap();
        mark_processing(&pool, task.id, 5).unwrap();
        fail(&pool, task.id, "boom").unwrap();

        assert!(update_progress(&pool, task.id, 50).is_err());
        assert!(mark_processing(&pool, task.id, 5).is_err());
        assert!(complete(
            &pool,
            task.id,
            &TaskResult::BulkContent {
                created: 0,
                skipped: 0,
                errors: vec![]
            }
        )
        .is_err());

        let still = get(&pool, task.id).unwrap().unwrap();
        assert_eq!(still.status, TaskStatus::Failed);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_mark_processing_requires_pending() {
        let (pool, path) = test_pool();
        let task = create(&pool, &bulk_payload(), None, Some("t1"), None).unwrap();
        mark_processing(&pool, task.id, 5).unwrap();
        // Second claim must fail: exactly one worker owns a task.
        assert!(mark_processing(&pool, task.id, 5).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_transition_on_missing_task() {
        let (pool, path) = test_pool();
        let err = mark_processing(&pool, 999, 5).unwrap_err();
        assert!(err.to_string().contains("not found"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_list_by_batch_only_returns_members() {
        let (pool, path) = test_pool();
        create(&pool, &bulk_payload(), None, Some("t1"), Some("b1")).unwrap();
        create(&pool, &bulk_payload(), None, Some("t2"), Some("b1")).unwrap();
        create(&pool, &bulk_payload(), None, Some("t3"), Some("b2")).unwrap();
        create(&pool, &bulk_payload(), None, Some("t4"), None).unwrap();

        let members = list_by_batch(&pool, "b1").unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|t| t.batch_id.as_deref() == Some("b1")));
        let _ = std::fs::remove_file(&path);
    }
}
