//! Content generation pipelines.
//!
//! Topic lists are derived deterministically from the tenant display name, so
//! repeated runs target the same identifying slugs, which is what makes the
//! skip/overwrite check duplicate prevention instead of a race-prone
//! heuristic. A single bad item never aborts the task: per-item failures are
//! recorded with a human-readable label and the pipeline moves on.

use anyhow::{bail, Context, Result};

use crate::content::repository;
use crate::content::{NewPage, NewPost, PageKind};
use crate::db::pool::ControlPool;
use crate::generate::{ContentGenerator, ContentKind, GenerationRequest, ImageGenerator};
use crate::tasks::{ledger, Task, TaskPayload, TaskResult};
use crate::tenant::registry::TenantRegistry;
use crate::tenant::store::{TenantRouter, TenantStore};
use crate::tenant::{slug, Tenant};

// Category-boundary checkpoints. Coarse operator signal, not an exact
// percentage; 100 is only ever written by the completion transition.
const PROGRESS_LANDING_DONE: u8 = 10;
const PROGRESS_LEGAL_DONE: u8 = 20;
const PROGRESS_CLUSTER_DONE: u8 = 35;
const PROGRESS_PAGES_DONE: u8 = 50;
const PROGRESS_POSTS_END: u8 = 95;

const INSTRUCTIONS: &str = "Write in the site's established voice. Plain HTML paragraphs only.";

const LEGAL_PAGES: &[(&str, &str)] = &[
    ("about-us", "About Us"),
    ("contact", "Contact"),
    ("privacy-policy", "Privacy Policy"),
    ("terms-of-service", "Terms of Service"),
];

const CLUSTER_TEMPLATES: &[&str] = &[
    "What Is {}?",
    "How {} Works",
    "{} Pricing Explained",
    "Top 10 {} Tips",
    "{} vs The Alternatives",
];

const BLOG_TEMPLATES: &[&str] = &[
    "Getting Started With {}",
    "The Complete {} Guide",
    "5 Ways To Get More From {}",
    "Common {} Mistakes To Avoid",
    "Why People Choose {}",
];

#[derive(Debug, Clone)]
pub struct TopicItem {
    pub slug: String,
    pub title: String,
}

fn from_template(template: &str, brand: &str) -> TopicItem {
    let title = template.replace("{}", brand);
    TopicItem {
        slug: slug::slugify(&title),
        title,
    }
}

pub fn cluster_topics(brand: &str) -> Vec<TopicItem> {
    CLUSTER_TEMPLATES
        .iter()
        .map(|t| from_template(t, brand))
        .collect()
}

pub fn blog_topics(brand: &str) -> Vec<TopicItem> {
    BLOG_TEMPLATES
        .iter()
        .map(|t| from_template(t, brand))
        .collect()
}

pub fn daily_topics(brand: &str, count: u32) -> Vec<TopicItem> {
    (1..=count)
        .map(|i| {
            let title = format!("{brand} Daily Update {i}");
            TopicItem {
                slug: slug::slugify(&title),
                title,
            }
        })
        .collect()
}

/// Running totals for one bulk execution.
#[derive(Default)]
struct Tally {
    created: u32,
    skipped: u32,
    errors: Vec<String>,
}

fn site_context(tenant: &Tenant) -> String {
    format!("Site: {} ({})", tenant.display_name, tenant.domain)
}

/// Generate-or-skip one page. Item failures land in the tally, not in the
/// return path.
async fn sync_page(
    store: &TenantStore,
    generator: &dyn ContentGenerator,
    kind: PageKind,
    gen_kind: ContentKind,
    item: &TopicItem,
    overwrite: bool,
    label: &str,
    tally: &mut Tally,
) {
    let exists = match repository::page_exists(store, &item.slug) {
        Ok(e) => e,
        Err(e) => {
            tally.errors.push(format!("{label} '{}': {e:#}", item.slug));
            return;
        }
    };
    if exists && !overwrite {
        tally.skipped += 1;
        return;
    }

    let outcome: Result<()> = async {
        let request = GenerationRequest {
            kind: gen_kind,
            topic: item.title.clone(),
            instructions: INSTRUCTIONS.into(),
            context: site_context(store.tenant()),
        };
        let generated = generator.generate(&request).await?;
        let page = NewPage {
            slug: item.slug.clone(),
            kind,
            title: generated.title,
            body: generated.content,
            meta_title: generated.meta_title,
            meta_description: generated.meta_description,
        };
        if exists {
            repository::replace_page(store, &page)?;
        } else {
            repository::insert_page(store, &page)?;
        }
        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => tally.created += 1,
        Err(e) => tally.errors.push(format!("{label} '{}': {e:#}", item.slug)),
    }
}

/// Generate-or-skip one post. The featured image is optional: an image
/// provider failure downgrades to "no image", never to a lost post.
async fn sync_post(
    store: &TenantStore,
    generator: &dyn ContentGenerator,
    images: &dyn ImageGenerator,
    gen_kind: ContentKind,
    item: &TopicItem,
    overwrite: bool,
    label: &str,
    tally: &mut Tally,
) {
    let exists = match repository::post_exists(store, &item.slug) {
        Ok(e) => e,
        Err(e) => {
            tally.errors.push(format!("{label} '{}': {e:#}", item.slug));
            return;
        }
    };
    if exists && !overwrite {
        tally.skipped += 1;
        return;
    }

    let tenant = store.tenant().clone();
    let outcome: Result<()> = async {
        let request = GenerationRequest {
            kind: gen_kind,
            topic: item.title.clone(),
            instructions: INSTRUCTIONS.into(),
            context: site_context(&tenant),
        };
        let generated = generator.generate(&request).await?;

        let featured_image_url = match images
            .featured_image(&item.title, &tenant.display_name, None)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("featured image for '{}' failed: {:#}", item.slug, e);
                None
            }
        };

        let post = NewPost {
            slug: item.slug.clone(),
            title: generated.title,
            body: generated.content,
            excerpt: generated.excerpt,
            meta_title: generated.meta_title,
            meta_description: generated.meta_description,
            featured_image_url,
            is_daily: gen_kind == ContentKind::DailyPost,
            published_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        if exists {
            repository::replace_post(store, &post)?;
        } else {
            repository::insert_post(store, &post)?;
        }
        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => tally.created += 1,
        Err(e) => tally.errors.push(format!("{label} '{}': {e:#}", item.slug)),
    }
}

fn resolve_target(db: &ControlPool, registry: &TenantRegistry, task: &Task) -> Result<Tenant> {
    let tenant_id = task
        .target_tenant_id
        .as_deref()
        .context("task has no target tenant")?;
    let tenant = registry
        .get(db, tenant_id)?
        .with_context(|| format!("tenant {tenant_id} not found"))?;
    if !tenant.is_active {
        bail!("tenant '{}' is deactivated", tenant.domain);
    }
    Ok(tenant)
}

/// Bulk generation across every category in scope.
pub async fn run_bulk(
    db: &ControlPool,
    registry: &TenantRegistry,
    router: &TenantRouter,
    generator: &dyn ContentGenerator,
    images: &dyn ImageGenerator,
    task: &Task,
) -> Result<TaskResult> {
    let TaskPayload::BulkContent {
        scope,
        overwrite,
        daily_count,
        ..
    } = &task.payload
    else {
        bail!("task {} is not a bulk-content task", task.id);
    };
    let (scope, overwrite) = (*scope, *overwrite);

    let tenant = resolve_target(db, registry, task)?;
    let store = router.activate(&tenant)?;
    let brand = tenant.display_name.clone();
    let mut tally = Tally::default();

    if scope.includes_pages() {
        sync_page(
            &store,
            generator,
            PageKind::Landing,
            ContentKind::LandingPage,
            &TopicItem {
                slug: "home".into(),
                title: brand.clone(),
            },
            overwrite,
            "landing page",
            &mut tally,
        )
        .await;
        ledger::update_progress(db, task.id, PROGRESS_LANDING_DONE)?;

        for (page_slug, title) in LEGAL_PAGES {
            let item = TopicItem {
                slug: (*page_slug).into(),
                title: (*title).into(),
            };
            sync_page(
                &store,
                generator,
                PageKind::Legal,
                ContentKind::LegalPage,
                &item,
                overwrite,
                "legal page",
                &mut tally,
            )
            .await;
        }
        ledger::update_progress(db, task.id, PROGRESS_LEGAL_DONE)?;

        for item in cluster_topics(&brand) {
            sync_page(
                &store,
                generator,
                PageKind::Cluster,
                ContentKind::ClusterArticle,
                &item,
                overwrite,
                "cluster article",
                &mut tally,
            )
            .await;
        }
        ledger::update_progress(db, task.id, PROGRESS_CLUSTER_DONE)?;
        ledger::update_progress(db, task.id, PROGRESS_PAGES_DONE)?;
    }

    // Post phase: blog and daily items interpolate the remaining range.
    let mut post_items: Vec<(ContentKind, &'static str, TopicItem)> = Vec::new();
    if scope.includes_posts() {
        for item in blog_topics(&brand) {
            post_items.push((ContentKind::BlogPost, "blog post", item));
        }
    }
    if scope.includes_daily() {
        for item in daily_topics(&brand, *daily_count) {
            post_items.push((ContentKind::DailyPost, "daily post", item));
        }
    }

    let total = post_items.len();
    for (done, (gen_kind, label, item)) in post_items.iter().enumerate() {
        sync_post(
            &store,
            generator,
            images,
            *gen_kind,
            item,
            overwrite,
            label,
            &mut tally,
        )
        .await;
        let span = (PROGRESS_POSTS_END - PROGRESS_PAGES_DONE) as usize;
        let progress = PROGRESS_PAGES_DONE + ((done + 1) * span / total) as u8;
        ledger::update_progress(db, task.id, progress)?;
    }

    tracing::info!(
        "bulk content for {}: {} created, {} skipped, {} errors",
        tenant.domain,
        tally.created,
        tally.skipped,
        tally.errors.len()
    );

    Ok(TaskResult::BulkContent {
        created: tally.created,
        skipped: tally.skipped,
        errors: tally.errors,
    })
}

/// Generate one item with the same skip/overwrite semantics as the bulk run.
pub async fn run_single(
    db: &ControlPool,
    registry: &TenantRegistry,
    router: &TenantRouter,
    generator: &dyn ContentGenerator,
    images: &dyn ImageGenerator,
    task: &Task,
) -> Result<TaskResult> {
    let TaskPayload::ContentGenerate {
        kind,
        topic,
        overwrite,
        ..
    } = &task.payload
    else {
        bail!("task {} is not a content-generate task", task.id);
    };

    let tenant = resolve_target(db, registry, task)?;
    let store = router.activate(&tenant)?;

    let item_slug = slug::slugify(topic);
    if item_slug.is_empty() {
        bail!("topic '{topic}' produces an empty slug");
    }
    let item = TopicItem {
        slug: item_slug.clone(),
        title: topic.clone(),
    };

    let mut tally = Tally::default();
    match kind {
        ContentKind::LandingPage => {
            sync_page(
                &store,
                generator,
                PageKind::Landing,
                *kind,
                &item,
                *overwrite,
                "landing page",
                &mut tally,
            )
            .await
        }
        ContentKind::LegalPage => {
            sync_page(
                &store,
                generator,
                PageKind::Legal,
                *kind,
                &item,
                *overwrite,
                "legal page",
                &mut tally,
            )
            .await
        }
        ContentKind::ClusterArticle => {
            sync_page(
                &store,
                generator,
                PageKind::Cluster,
                *kind,
                &item,
                *overwrite,
                "cluster article",
                &mut tally,
            )
            .await
        }
        ContentKind::BlogPost | ContentKind::DailyPost => {
            sync_post(
                &store,
                generator,
                images,
                *kind,
                &item,
                *overwrite,
                "post",
                &mut tally,
            )
            .await
        }
    }

    // A single-item task has nowhere to park a per-item error: surface it.
    if let Some(e) = tally.errors.into_iter().next() {
        bail!("{e}");
    }

    Ok(TaskResult::ContentGenerate {
        slug: item_slug,
        title: topic.clone(),
        skipped: tally.skipped > 0,
    })
}
