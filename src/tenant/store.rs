use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;

use crate::tenant::Tenant;

/// Routes data access to the activated tenant's isolated store.
///
/// Activation hands back an owned [`TenantStore`]; every content repository
/// call takes that handle explicitly, so work for tenant A can never touch
/// tenant B's store. Each activation opens a fresh connection; nothing is
/// reused from a previously activated tenant.
pub struct TenantRouter {
    data_dir: PathBuf,
}

impl TenantRouter {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Point a new store handle at `tenant`'s database. Idempotent: activating
    /// the same tenant twice yields two equivalent handles.
    pub fn activate(&self, tenant: &Tenant) -> Result<TenantStore> {
        let path = self
            .data_dir
            .join(format!("{}.db", tenant.database_name));
        if !path.exists() {
            bail!(
                "store for tenant '{}' not provisioned ({})",
                tenant.domain,
                path.display()
            );
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("failed to open store {}", path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        Ok(TenantStore {
            tenant: tenant.clone(),
            conn,
        })
    }
}

/// An open handle on one tenant's isolated content store.
pub struct TenantStore {
    tenant: Tenant,
    conn: Connection,
}

impl TenantStore {
    /// The tenant this handle is bound to.
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::provisioner::StoreProvisioner;

    fn test_tenant(domain: &str, database_name: &str) -> Tenant {
        Tenant {
            id: uuid::Uuid::new_v4().to_string(),
            domain: domain.into(),
            display_name: domain.into(),
            database_name: database_name.into(),
            is_active: true,
            logo_url: None,
            primary_color: None,
            contact_email: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_activate_unprovisioned_store_fails() {
        let dir = std::env::temp_dir().join(format!("siteforge-store-{}", uuid::Uuid::new_v4()));
        let router = TenantRouter::new(&dir);
        let tenant = test_tenant("a.example", "t_missing");

        let err = router.activate(&tenant).unwrap_err();
        assert!(err.to_string().contains("not provisioned"));
    }

    #[test]
    fn test_activation_targets_the_right_store() {
        let dir = std::env::temp_dir().join(format!("siteforge-store-{}", uuid::Uuid::new_v4()));
        let prov = StoreProvisioner::new(&dir);
        let router = TenantRouter::new(&dir);

        let a = test_tenant("a.example", "t_a");
        let b = test_tenant("b.example", "t_b");
        for t in [&a, &b] {
            prov.create_database(&t.database_name).unwrap();
            prov.apply_baseline_schema(&t.database_name).unwrap();
        }

        // Write a page through A's handle.
        let store_a = router.activate(&a).unwrap();
        store_a
            .conn()
            .execute(
                "INSERT INTO pages (slug, kind, title, body) VALUES ('home', 'landing', 'A', '')",
                [],
            )
            .unwrap();

        // B's handle must not see it.
        let store_b = router.activate(&b).unwrap();
        let count: i64 = store_b
            .conn()
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "tenant B must not see tenant A's content");

        // A fresh activation of A still sees its own data.
        let store_a2 = router.activate(&a).unwrap();
        let count: i64 = store_a2
            .conn()
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
