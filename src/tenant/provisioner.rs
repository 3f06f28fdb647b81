use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::Connection;

const BASELINE_SCHEMA: &str = include_str!("../content/schema.sql");

/// Creates and tears down the physical per-tenant stores.
///
/// Both `create_database` and `apply_baseline_schema` are idempotent for the
/// same store name, so a retry after a partial failure reuses whatever is
/// already on disk.
pub struct StoreProvisioner {
    data_dir: PathBuf,
}

impl StoreProvisioner {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn database_path(&self, database_name: &str) -> PathBuf {
        self.data_dir.join(format!("{database_name}.db"))
    }

    /// Create the store file (and the data directory if needed).
    pub fn create_database(&self, database_name: &str) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("failed to create data dir {}", self.data_dir.display())
        })?;

        let path = self.database_path(database_name);
        let conn = Connection::open(&path)
            .with_context(|| format!("failed to create store {}", path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }

    /// Apply the baseline content schema to an existing store.
    pub fn apply_baseline_schema(&self, database_name: &str) -> Result<()> {
        let path = self.database_path(database_name);
        let conn = Connection::open(&path)
            .with_context(|| format!("failed to open store {}", path.display()))?;
        conn.execute_batch(BASELINE_SCHEMA)
            .with_context(|| format!("failed to apply baseline schema to {database_name}"))?;
        Ok(())
    }

    /// Best-effort removal, used to roll back a failed provisioning attempt.
    pub fn remove_database(&self, database_name: &str) {
        let path = self.database_path(database_name);
        for suffix in ["", "-wal", "-shm"] {
            let mut p = path.clone().into_os_string();
            p.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(p));
        }
    }
}
