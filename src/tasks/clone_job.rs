//! Full-site clone pipeline.
//!
//! Steps: validate the new domain is free (before any side effect), onboard
//! and provision the target tenant, read the source's full content set, write
//! it into the target with per-tenant counters reset. The source is never
//! mutated. A mid-copy failure leaves the half-cloned target for manual
//! operator cleanup; the target row may already be serving resolution
//! traffic, so automatic deletion is not attempted.

use anyhow::{bail, Context, Result};

use crate::content::repository;
use crate::content::{NewOffer, NewPage, NewPost, NewRedirect};
use crate::db::pool::ControlPool;
use crate::tasks::{ledger, Task, TaskPayload, TaskResult};
use crate::tenant::registry::{normalize_domain, NewTenant, TenantRegistry};
use crate::tenant::store::TenantRouter;

const PROGRESS_VALIDATED: u8 = 10;
const PROGRESS_PROVISIONED: u8 = 25;
const PROGRESS_SOURCE_READ: u8 = 50;
const PROGRESS_COPIED: u8 = 90;

pub async fn run(
    db: &ControlPool,
    registry: &TenantRegistry,
    router: &TenantRouter,
    task: &Task,
) -> Result<TaskResult> {
    let TaskPayload::CloneSite { new_domain } = &task.payload else {
        bail!("task {} is not a clone task", task.id);
    };

    let source_id = task
        .source_tenant_id
        .as_deref()
        .context("clone task has no source tenant")?;
    let source = registry
        .get(db, source_id)?
        .with_context(|| format!("source tenant {source_id} not found"))?;
    if !source.is_active {
        bail!("source tenant '{}' is deactivated", source.domain);
    }

    // Domain check comes first: a collision must fail before any
    // provisioning or copying happens.
    let domain = normalize_domain(new_domain);
    if registry.domain_registered(db, &domain)? {
        bail!("domain '{domain}' is already registered");
    }
    ledger::update_progress(db, task.id, PROGRESS_VALIDATED)?;

    let target = registry.create(
        db,
        NewTenant {
            domain: domain.clone(),
            display_name: source.display_name.clone(),
            logo_url: source.logo_url.clone(),
            primary_color: source.primary_color.clone(),
            contact_email: source.contact_email.clone(),
        },
    )?;
    ledger::update_progress(db, task.id, PROGRESS_PROVISIONED)?;

    // Read the whole content set through the source handle, then drop it
    // before any target write so the source cannot be touched afterwards.
    let (pages, posts, offers, redirects) = {
        let source_store = router.activate(&source)?;
        (
            repository::list_pages(&source_store)?,
            repository::list_posts(&source_store)?,
            repository::list_offers(&source_store)?,
            repository::list_redirects(&source_store)?,
        )
    };
    ledger::update_progress(db, task.id, PROGRESS_SOURCE_READ)?;

    let target_store = router.activate(&target)?;
    for page in &pages {
        repository::insert_page(&target_store, &NewPage::from(page))?;
    }
    for post in &posts {
        repository::insert_post(&target_store, &NewPost::from(post))?;
    }
    // NewOffer / NewRedirect carry no counters: copies start back at zero.
    for offer in &offers {
        repository::insert_offer(&target_store, &NewOffer::from(offer))?;
    }
    for redirect in &redirects {
        repository::insert_redirect(&target_store, &NewRedirect::from(redirect))?;
    }
    ledger::update_progress(db, task.id, PROGRESS_COPIED)?;

    tracing::info!(
        "cloned {} -> {}: {} pages, {} posts, {} offers, {} redirects",
        source.domain,
        target.domain,
        pages.len(),
        posts.len(),
        offers.len(),
        redirects.len()
    );

    Ok(TaskResult::CloneSite {
        target_tenant_id: target.id,
        pages: pages.len() as u32,
        posts: posts.len() as u32,
        offers: offers.len() as u32,
        redirects: redirects.len() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::PageKind;
    use crate::db;
    use crate::tenant::provisioner::StoreProvisioner;
    use crate::tenant::Tenant;
    use std::time::Duration;

    struct Harness {
        db: ControlPool,
        registry: TenantRegistry,
        router: TenantRouter,
        db_path: std::path::PathBuf,
        data_dir: std::path::PathBuf,
    }

    impl Harness {
        fn new() -> Self {
            let tag = uuid::Uuid::new_v4();
            let db_path = std::env::temp_dir().join(format!("siteforge-clone-{tag}.db"));
            let data_dir = std::env::temp_dir().join(format!("siteforge-clone-{tag}-stores"));
            let pool = ControlPool::open(db_path.to_str().unwrap(), 1).unwrap();
            db::run_migrations(&pool).unwrap();
            Self {
                db: pool,
                registry: TenantRegistry::new(
                    StoreProvisioner::new(&data_dir),
                    Duration::from_secs(600),
                ),
                router: TenantRouter::new(&data_dir),
                db_path,
                data_dir,
            }
        }

        fn onboard(&self, domain: &str) -> Tenant {
            self.registry
                .create(
                    &self.db,
                    NewTenant {
                        domain: domain.into(),
                        display_name: format!("Site {domain}"),
                        logo_url: None,
                        primary_color: None,
                        contact_email: None,
                    },
                )
                .unwrap()
        }

        fn seed_content(&self, tenant: &Tenant) {
            let store = self.router.activate(tenant).unwrap();
            repository::insert_page(
                &store,
                &NewPage {
                    slug: "home".into(),
                    kind: PageKind::Landing,
                    title: "Home".into(),
                    body: "<p>hi</p>".into(),
                    meta_title: None,
                    meta_description: None,
                },
            )
            .unwrap();
            repository::insert_post(
                &store,
                &NewPost {
                    slug: "first-post".into(),
                    title: "First".into(),
                    body: "<p>post</p>".into(),
                    excerpt: None,
                    meta_title: None,
                    meta_description: None,
                    featured_image_url: None,
                    is_daily: false,
                    published_at: None,
                },
            )
            .unwrap();
            store
                .conn()
                .execute(
                    "INSERT INTO offers (slug, name, url, click_count) VALUES ('deal', 'Deal', 'https://x', 17)",
                    [],
                )
                .unwrap();
            store
                .conn()
                .execute(
                    "INSERT INTO redirects (from_path, to_url, hit_count) VALUES ('/old', 'https://y', 9)",
                    [],
                )
                .unwrap();
        }

        fn clone_task(&self, source: &Tenant, new_domain: &str) -> Task {
            let payload = TaskPayload::CloneSite {
                new_domain: new_domain.into(),
            };
            let task = ledger::create(&self.db, &payload, Some(&source.id), None, None).unwrap();
            ledger::mark_processing(&self.db, task.id, 5).unwrap();
            ledger::get(&self.db, task.id).unwrap().unwrap()
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.db_path);
            let _ = std::fs::remove_dir_all(&self.data_dir);
        }
    }

    #[tokio::test]
    async fn test_clone_copies_content_and_resets_counters() {
        let h = Harness::new();
        let source = h.onboard("a.example");
        h.seed_content(&source);

        let task = h.clone_task(&source, "c.example");
        let result = run(&h.db, &h.registry, &h.router, &task).await.unwrap();

        let TaskResult::CloneSite {
            target_tenant_id,
            pages,
            posts,
            offers,
            redirects,
        } = result
        else {
            panic!("wrong result variant");
        };
        assert_eq!((pages, posts, offers, redirects), (1, 1, 1, 1));

        let target = h.registry.get(&h.db, &target_tenant_id).unwrap().unwrap();
        assert_eq!(target.domain, "c.example");

        let store = h.router.activate(&target).unwrap();
        assert_eq!(repository::count_pages(&store).unwrap(), 1);
        let offers = repository::list_offers(&store).unwrap();
        assert_eq!(offers[0].click_count, 0, "click counters must reset");
        let redirects = repository::list_redirects(&store).unwrap();
        assert_eq!(redirects[0].hit_count, 0, "hit counters must reset");
    }

    #[tokio::test]
    async fn test_clone_does_not_mutate_source() {
        let h = Harness::new();
        let source = h.onboard("a.example");
        h.seed_content(&source);

        let task = h.clone_task(&source, "c.example");
        run(&h.db, &h.registry, &h.router, &task).await.unwrap();

        let store = h.router.activate(&source).unwrap();
        assert_eq!(repository::count_pages(&store).unwrap(), 1);
        assert_eq!(repository::list_offers(&store).unwrap()[0].click_count, 17);
    }

    #[tokio::test]
    async fn test_clone_onto_registered_domain_fails_without_side_effects() {
        let h = Harness::new();
        let source = h.onboard("a.example");
        h.seed_content(&source);
        h.onboard("c.example");

        let task = h.clone_task(&source, "c.example");
        let err = run(&h.db, &h.registry, &h.router, &task).await.unwrap_err();
        assert!(err.to_string().contains("already registered"));

        // No third tenant, no extra store file.
        assert_eq!(h.registry.list(&h.db).unwrap().len(), 2);
        let stores = std::fs::read_dir(&h.data_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".db"))
            .count();
        assert_eq!(stores, 2);
    }

    #[tokio::test]
    async fn test_clone_from_missing_source_fails() {
        let h = Harness::new();
        let payload = TaskPayload::CloneSite {
            new_domain: "c.example".into(),
        };
        let task = ledger::create(&h.db, &payload, Some("ghost"), None, None).unwrap();
        ledger::mark_processing(&h.db, task.id, 5).unwrap();
        let task = ledger::get(&h.db, task.id).unwrap().unwrap();

        let err = run(&h.db, &h.registry, &h.router, &task).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
