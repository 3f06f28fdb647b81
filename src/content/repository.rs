//! Tenant-scoped content access. Every function takes the [`TenantStore`]
//! handle it operates on; there is no other way to reach tenant content.

use anyhow::{bail, Result};
use rusqlite::params;

use crate::content::{NewOffer, NewPage, NewPost, NewRedirect, Offer, Page, PageKind, Post, Redirect};
use crate::tenant::store::TenantStore;

// ── Pages ──────────────────────────────────────────────────────────────────

pub fn page_exists(store: &TenantStore, slug: &str) -> Result<bool> {
    let exists: bool = store.conn().query_row(
        "SELECT EXISTS(SELECT 1 FROM pages WHERE slug = ?1)",
        params![slug],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn insert_page(store: &TenantStore, page: &NewPage) -> Result<i64> {
    store.conn().execute(
        "INSERT INTO pages (slug, kind, title, body, meta_title, meta_description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            page.slug,
            page.kind.as_str(),
            page.title,
            page.body,
            page.meta_title,
            page.meta_description,
        ],
    )?;
    Ok(store.conn().last_insert_rowid())
}

/// Returns `true` if a row was deleted.
pub fn delete_page(store: &TenantStore, slug: &str) -> Result<bool> {
    let changed = store
        .conn()
        .execute("DELETE FROM pages WHERE slug = ?1", params![slug])?;
    Ok(changed > 0)
}

pub fn list_pages(store: &TenantStore) -> Result<Vec<Page>> {
    let mut stmt = store.conn().prepare(
        "SELECT id, slug, kind, title, body, meta_title, meta_description
         FROM pages ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let kind_str: String = row.get(2)?;
            let kind = PageKind::from_str(&kind_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    format!("unknown page kind '{kind_str}'").into(),
                )
            })?;
            Ok(Page {
                id: row.get(0)?,
                slug: row.get(1)?,
                kind,
                title: row.get(3)?,
                body: row.get(4)?,
                meta_title: row.get(5)?,
                meta_description: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_pages(store: &TenantStore) -> Result<i64> {
    let n: i64 = store
        .conn()
        .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
    Ok(n)
}

// ── Posts ──────────────────────────────────────────────────────────────────

pub fn post_exists(store: &TenantStore, slug: &str) -> Result<bool> {
    let exists: bool = store.conn().query_row(
        "SELECT EXISTS(SELECT 1 FROM posts WHERE slug = ?1)",
        params![slug],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn insert_post(store: &TenantStore, post: &NewPost) -> Result<i64> {
    store.conn().execute(
        "INSERT INTO posts
            (slug, title, body, excerpt, meta_title, meta_description,
             featured_image_url, is_daily, published_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            post.slug,
            post.title,
            post.body,
            post.excerpt,
            post.meta_title,
            post.meta_description,
            post.featured_image_url,
            post.is_daily as i64,
            post.published_at,
        ],
    )?;
    Ok(store.conn().last_insert_rowid())
}

pub fn delete_post(store: &TenantStore, slug: &str) -> Result<bool> {
    let changed = store
        .conn()
        .execute("DELETE FROM posts WHERE slug = ?1", params![slug])?;
    Ok(changed > 0)
}

pub fn list_posts(store: &TenantStore) -> Result<Vec<Post>> {
    let mut stmt = store.conn().prepare(
        "SELECT id, slug, title, body, excerpt, meta_title, meta_description,
                featured_image_url, is_daily, published_at
         FROM posts ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Post {
                id: row.get(0)?,
                slug: row.get(1)?,
                title: row.get(2)?,
                body: row.get(3)?,
                excerpt: row.get(4)?,
                meta_title: row.get(5)?,
                meta_description: row.get(6)?,
                featured_image_url: row.get(7)?,
                is_daily: row.get::<_, i64>(8)? != 0,
                published_at: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_posts(store: &TenantStore) -> Result<i64> {
    let n: i64 = store
        .conn()
        .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
    Ok(n)
}

// ── Offers ─────────────────────────────────────────────────────────────────

pub fn insert_offer(store: &TenantStore, offer: &NewOffer) -> Result<i64> {
    store.conn().execute(
        "INSERT INTO offers (slug, name, url, description) VALUES (?1, ?2, ?3, ?4)",
        params![offer.slug, offer.name, offer.url, offer.description],
    )?;
    Ok(store.conn().last_insert_rowid())
}

pub fn list_offers(store: &TenantStore) -> Result<Vec<Offer>> {
    let mut stmt = store.conn().prepare(
        "SELECT id, slug, name, url, description, click_count FROM offers ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Offer {
                id: row.get(0)?,
                slug: row.get(1)?,
                name: row.get(2)?,
                url: row.get(3)?,
                description: row.get(4)?,
                click_count: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Redirects ──────────────────────────────────────────────────────────────

pub fn insert_redirect(store: &TenantStore, redirect: &NewRedirect) -> Result<i64> {
    store.conn().execute(
        "INSERT INTO redirects (from_path, to_url) VALUES (?1, ?2)",
        params![redirect.from_path, redirect.to_url],
    )?;
    Ok(store.conn().last_insert_rowid())
}

pub fn list_redirects(store: &TenantStore) -> Result<Vec<Redirect>> {
    let mut stmt = store
        .conn()
        .prepare("SELECT id, from_path, to_url, hit_count FROM redirects ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Redirect {
                id: row.get(0)?,
                from_path: row.get(1)?,
                to_url: row.get(2)?,
                hit_count: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Replace-or-create used by the overwrite path: the existing row must be
/// removed first so regeneration inserts exactly one fresh row.
pub fn replace_page(store: &TenantStore, page: &NewPage) -> Result<i64> {
    if !delete_page(store, &page.slug)? {
        bail!("page '{}' did not exist for replacement", page.slug);
    }
    insert_page(store, page)
}

pub fn replace_post(store: &TenantStore, post: &NewPost) -> Result<i64> {
    if !delete_post(store, &post.slug)? {
        bail!("post '{}' did not exist for replacement", post.slug);
    }
    insert_post(store, post)
}
