use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rusqlite::params;

use crate::db::pool::ControlPool;
use crate::tenant::provisioner::StoreProvisioner;
use crate::tenant::{slug, Tenant, TENANT_COLUMNS};

// ---------------------------------------------------------------------------
// Resolve cache
// ---------------------------------------------------------------------------

/// Domain → tenant cache with a bounded TTL.
///
/// Any tenant mutation that can change routing (rename, deactivate) must
/// invalidate the affected keys, otherwise stale routing survives for up to
/// the TTL.
struct ResolveCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Tenant, Instant)>>,
}

impl ResolveCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, domain: &str) -> Option<Tenant> {
        let map = self.entries.lock().expect("resolve cache lock poisoned");
        match map.get(domain) {
            Some((tenant, cached_at)) if cached_at.elapsed() < self.ttl => Some(tenant.clone()),
            _ => None,
        }
    }

    fn put(&self, domain: &str, tenant: Tenant) {
        let mut map = self.entries.lock().expect("resolve cache lock poisoned");
        map.insert(domain.to_string(), (tenant, Instant::now()));
    }

    fn invalidate(&self, domain: &str) {
        let mut map = self.entries.lock().expect("resolve cache lock poisoned");
        map.remove(domain);
    }

    /// Drop expired entries. Called from the periodic cleanup loop.
    fn cleanup(&self) {
        let mut map = self.entries.lock().expect("resolve cache lock poisoned");
        map.retain(|_, (_, cached_at)| cached_at.elapsed() < self.ttl);
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct NewTenant {
    pub domain: String,
    pub display_name: String,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub contact_email: Option<String>,
}

#[derive(Default)]
pub struct TenantUpdate {
    pub domain: Option<String>,
    pub display_name: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub contact_email: Option<String>,
}

/// Control-plane view of all tenants: lookup, onboarding, admin updates.
pub struct TenantRegistry {
    cache: ResolveCache,
    provisioner: StoreProvisioner,
}

/// Lowercase and strip a `:port` suffix. Resolution always works on this form.
pub fn normalize_domain(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    match lower.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            host.to_string()
        }
        _ => lower,
    }
}

/// A domain here is a bare lowercase hostname: no scheme, no path, no spaces.
fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty()
        && domain.len() <= 253
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}

impl TenantRegistry {
    pub fn new(provisioner: StoreProvisioner, cache_ttl: Duration) -> Self {
        Self {
            cache: ResolveCache::new(cache_ttl),
            provisioner,
        }
    }

    pub fn provisioner(&self) -> &StoreProvisioner {
        &self.provisioner
    }

    /// Resolve an active tenant by domain. Deactivated tenants resolve as
    /// `None`; that is the deactivation mechanism for all traffic.
    pub fn resolve(&self, db: &ControlPool, raw_domain: &str) -> Result<Option<Tenant>> {
        let domain = normalize_domain(raw_domain);

        if let Some(tenant) = self.cache.get(&domain) {
            return Ok(Some(tenant));
        }

        let tenant = db.read(|conn| {
            let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE domain = ?1 AND is_active = 1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query_map(params![domain], Tenant::from_row)?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })?;

        if let Some(ref t) = tenant {
            self.cache.put(&domain, t.clone());
        }
        Ok(tenant)
    }

    pub fn get(&self, db: &ControlPool, id: &str) -> Result<Option<Tenant>> {
        db.read(|conn| {
            let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query_map(params![id], Tenant::from_row)?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
    }

    pub fn list(&self, db: &ControlPool) -> Result<Vec<Tenant>> {
        db.read(|conn| {
            let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants ORDER BY created_at DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], Tenant::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_active(&self, db: &ControlPool) -> Result<Vec<Tenant>> {
        db.read(|conn| {
            let sql = format!(
                "SELECT {TENANT_COLUMNS} FROM tenants WHERE is_active = 1 ORDER BY created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], Tenant::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// `true` if any tenant (active or not) holds this domain.
    pub fn domain_registered(&self, db: &ControlPool, raw_domain: &str) -> Result<bool> {
        let domain = normalize_domain(raw_domain);
        db.read(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM tenants WHERE domain = ?1)",
                params![domain],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Onboard a tenant: insert the registry row, then physically provision
    /// its isolated store with the baseline schema.
    ///
    /// On provisioning failure the row is rolled back and the store file
    /// removed best-effort, so a retry with the same domain does not collide
    /// with a half-provisioned tenant.
    pub fn create(&self, db: &ControlPool, input: NewTenant) -> Result<Tenant> {
        let domain = normalize_domain(&input.domain);
        if !is_valid_domain(&domain) {
            bail!("invalid domain '{}'", input.domain);
        }
        if input.display_name.trim().is_empty() {
            bail!("display name must not be empty");
        }

        let database_name = slug::database_name_for_domain(&domain);
        let tenant_id = uuid::Uuid::new_v4().to_string();

        // Uniqueness checks + INSERT in a single write transaction.
        {
            let domain = domain.clone();
            let database_name = database_name.clone();
            let tenant_id = tenant_id.clone();
            db.write(move |conn| {
                let domain_taken: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM tenants WHERE domain = ?1)",
                    params![domain],
                    |row| row.get(0),
                )?;
                if domain_taken {
                    bail!("domain '{}' is already registered", domain);
                }

                let store_taken: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM tenants WHERE database_name = ?1)",
                    params![database_name],
                    |row| row.get(0),
                )?;
                if store_taken {
                    bail!("store name '{}' is already registered", database_name);
                }

                conn.execute(
                    "INSERT INTO tenants
                        (id, domain, display_name, database_name, logo_url, primary_color, contact_email)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        tenant_id,
                        domain,
                        input.display_name,
                        database_name,
                        input.logo_url,
                        input.primary_color,
                        input.contact_email,
                    ],
                )?;
                Ok(())
            })?;
        }

        // Physical provisioning. Must fully succeed or leave no tenant row.
        if let Err(e) = self
            .provisioner
            .create_database(&database_name)
            .and_then(|_| self.provisioner.apply_baseline_schema(&database_name))
        {
            tracing::error!("provisioning failed for {}: {:#}", domain, e);
            self.rollback_create(db, &tenant_id, &database_name);
            return Err(e).with_context(|| format!("provisioning failed for '{domain}'"));
        }

        self.get(db, &tenant_id)?
            .context("tenant row vanished after insert")
    }

    /// Admin update. Invalidates the old and (if renamed) new cache keys.
    pub fn update(&self, db: &ControlPool, id: &str, changes: TenantUpdate) -> Result<Tenant> {
        let current = self
            .get(db, id)?
            .with_context(|| format!("tenant {id} not found"))?;

        let new_domain = match changes.domain {
            Some(raw) => {
                let domain = normalize_domain(&raw);
                if !is_valid_domain(&domain) {
                    bail!("invalid domain '{raw}'");
                }
                if domain != current.domain && self.domain_registered(db, &domain)? {
                    bail!("domain '{}' is already registered", domain);
                }
                domain
            }
            None => current.domain.clone(),
        };
        let display_name = changes.display_name.unwrap_or_else(|| current.display_name.clone());
        let logo_url = changes.logo_url.or_else(|| current.logo_url.clone());
        let primary_color = changes.primary_color.or_else(|| current.primary_color.clone());
        let contact_email = changes.contact_email.or_else(|| current.contact_email.clone());

        db.write(|conn| {
            conn.execute(
                "UPDATE tenants
                 SET domain = ?1, display_name = ?2, logo_url = ?3, primary_color = ?4,
                     contact_email = ?5,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
                 WHERE id = ?6",
                params![new_domain, display_name, logo_url, primary_color, contact_email, id],
            )?;
            Ok(())
        })?;

        // Both keys: a rename must stop the old domain from serving stale
        // routing, and must not leave a pre-rename miss cached for the new one.
        self.cache.invalidate(&current.domain);
        self.cache.invalidate(&new_domain);

        self.get(db, id)?
            .with_context(|| format!("tenant {id} not found after update"))
    }

    /// Soft delete: the tenant stops resolving immediately.
    pub fn deactivate(&self, db: &ControlPool, id: &str) -> Result<()> {
        let current = self
            .get(db, id)?
            .with_context(|| format!("tenant {id} not found"))?;

        db.write(|conn| {
            conn.execute(
                "UPDATE tenants
                 SET is_active = 0, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })?;

        self.cache.invalidate(&current.domain);
        Ok(())
    }

    /// Drop expired resolve-cache entries.
    pub fn cleanup_cache(&self) {
        self.cache.cleanup();
    }

    fn rollback_create(&self, db: &ControlPool, tenant_id: &str, database_name: &str) {
        let res = db.write(|conn| {
            conn.execute("DELETE FROM tenants WHERE id = ?1", params![tenant_id])?;
            Ok(())
        });
        if let Err(e) = res {
            tracing::error!("rollback of tenant {} failed: {:#}", tenant_id, e);
        }
        self.provisioner.remove_database(database_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    struct Harness {
        db: ControlPool,
        registry: TenantRegistry,
        db_path: std::path::PathBuf,
        data_dir: std::path::PathBuf,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_ttl(Duration::from_secs(600))
        }

        fn with_ttl(ttl: Duration) -> Self {
            let tag = uuid::Uuid::new_v4();
            let db_path = std::env::temp_dir().join(format!("siteforge-reg-{tag}.db"));
            let data_dir = std::env::temp_dir().join(format!("siteforge-reg-{tag}-stores"));
            let pool = ControlPool::open(db_path.to_str().unwrap(), 1).unwrap();
            db::run_migrations(&pool).unwrap();
            let registry = TenantRegistry::new(StoreProvisioner::new(&data_dir), ttl);
            Self {
                db: pool,
                registry,
                db_path,
                data_dir,
            }
        }

        fn new_tenant(domain: &str) -> NewTenant {
            NewTenant {
                domain: domain.into(),
                display_name: format!("Site {domain}"),
                logo_url: None,
                primary_color: None,
                contact_email: None,
            }
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.db_path);
            let _ = std::fs::remove_dir_all(&self.data_dir);
        }
    }

    #[test]
    fn test_normalize_domain_strips_port_and_case() {
        assert_eq!(normalize_domain("A.Example:8080"), "a.example");
        assert_eq!(normalize_domain("b.example"), "b.example");
        // Not a port suffix
        assert_eq!(normalize_domain("weird:host"), "weird:host");
    }

    #[test]
    fn test_create_provisions_store() {
        let h = Harness::new();
        let t = h.registry.create(&h.db, Harness::new_tenant("a.example")).unwrap();
        assert_eq!(t.domain, "a.example");
        assert_eq!(t.database_name, "t_a-example");
        assert!(t.is_active);
        assert!(h.registry.provisioner().database_path(&t.database_name).exists());
    }

    #[test]
    fn test_create_rejects_duplicate_domain() {
        let h = Harness::new();
        h.registry.create(&h.db, Harness::new_tenant("a.example")).unwrap();
        let err = h
            .registry
            .create(&h.db, Harness::new_tenant("A.EXAMPLE:443"))
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_create_rejects_invalid_domain() {
        let h = Harness::new();
        let err = h
            .registry
            .create(&h.db, Harness::new_tenant("http://a.example/path"))
            .unwrap_err();
        assert!(err.to_string().contains("invalid domain"));
    }

    #[test]
    fn test_create_rolls_back_on_provisioning_failure() {
        let tag = uuid::Uuid::new_v4();
        let db_path = std::env::temp_dir().join(format!("siteforge-reg-{tag}.db"));
        // Use a FILE as the data dir so create_dir_all fails.
        let blocker = std::env::temp_dir().join(format!("siteforge-reg-{tag}-blocker"));
        std::fs::write(&blocker, b"").unwrap();

        let pool = ControlPool::open(db_path.to_str().unwrap(), 1).unwrap();
        db::run_migrations(&pool).unwrap();
        let registry = TenantRegistry::new(
            StoreProvisioner::new(&blocker),
            Duration::from_secs(600),
        );

        let err = registry
            .create(&pool, Harness::new_tenant("a.example"))
            .unwrap_err();
        assert!(err.to_string().contains("provisioning failed"));

        // The row must be gone so a retry with the same domain can succeed.
        assert!(!registry.domain_registered(&pool, "a.example").unwrap());

        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(&blocker);
    }

    #[test]
    fn test_resolve_requires_active() {
        let h = Harness::new();
        let t = h.registry.create(&h.db, Harness::new_tenant("a.example")).unwrap();

        assert!(h.registry.resolve(&h.db, "a.example").unwrap().is_some());
        h.registry.deactivate(&h.db, &t.id).unwrap();
        assert!(h.registry.resolve(&h.db, "a.example").unwrap().is_none());
    }

    #[test]
    fn test_resolve_serves_from_cache_within_ttl() {
        let h = Harness::new();
        let t = h.registry.create(&h.db, Harness::new_tenant("a.example")).unwrap();
        let first = h.registry.resolve(&h.db, "a.example").unwrap().unwrap();

        // Mutate the row behind the registry's back; the cache must keep
        // serving the earlier result inside the TTL.
        h.db.write(|conn| {
            conn.execute(
                "UPDATE tenants SET display_name = 'changed' WHERE id = ?1",
                params![t.id],
            )?;
            Ok(())
        })
        .unwrap();

        let second = h.registry.resolve(&h.db, "A.EXAMPLE:8443").unwrap().unwrap();
        assert_eq!(second.display_name, first.display_name);
    }

    #[test]
    fn test_cache_expires_after_ttl() {
        let h = Harness::with_ttl(Duration::from_millis(0));
        let t = h.registry.create(&h.db, Harness::new_tenant("a.example")).unwrap();
        h.registry.resolve(&h.db, "a.example").unwrap().unwrap();

        h.db.write(|conn| {
            conn.execute(
                "UPDATE tenants SET display_name = 'changed' WHERE id = ?1",
                params![t.id],
            )?;
            Ok(())
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let again = h.registry.resolve(&h.db, "a.example").unwrap().unwrap();
        assert_eq!(again.display_name, "changed");
    }

    #[test]
    fn test_deactivate_invalidates_cache_immediately() {
        let h = Harness::new();
        let t = h.registry.create(&h.db, Harness::new_tenant("a.example")).unwrap();
        // Prime the cache.
        h.registry.resolve(&h.db, "a.example").unwrap().unwrap();

        h.registry.deactivate(&h.db, &t.id).unwrap();
        // The very next resolution must reflect the change, not the cache.
        assert!(h.registry.resolve(&h.db, "a.example").unwrap().is_none());
    }

    #[test]
    fn test_rename_invalidates_old_and_new_keys() {
        let h = Harness::new();
        let t = h.registry.create(&h.db, Harness::new_tenant("old.example")).unwrap();
        h.registry.resolve(&h.db, "old.example").unwrap().unwrap();

        h.registry
            .update(
                &h.db,
                &t.id,
                TenantUpdate {
                    domain: Some("new.example".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(h.registry.resolve(&h.db, "old.example").unwrap().is_none());
        let renamed = h.registry.resolve(&h.db, "new.example").unwrap().unwrap();
        assert_eq!(renamed.id, t.id);
    }

    #[test]
    fn test_update_rejects_taken_domain() {
        let h = Harness::new();
        h.registry.create(&h.db, Harness::new_tenant("a.example")).unwrap();
        let b = h.registry.create(&h.db, Harness::new_tenant("b.example")).unwrap();

        let err = h
            .registry
            .update(
                &h.db,
                &b.id,
                TenantUpdate {
                    domain: Some("a.example".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }
}
