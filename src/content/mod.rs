pub mod repository;

use serde::{Deserialize, Serialize};

/// Page kinds the generation pipeline knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Landing,
    Legal,
    Cluster,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Landing => "landing",
            PageKind::Legal => "legal",
            PageKind::Cluster => "cluster",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "landing" => Some(PageKind::Landing),
            "legal" => Some(PageKind::Legal),
            "cluster" => Some(PageKind::Cluster),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub id: i64,
    pub slug: String,
    pub kind: PageKind,
    pub title: String,
    pub body: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

pub struct NewPage {
    pub slug: String,
    pub kind: PageKind,
    pub title: String,
    pub body: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

impl From<&Page> for NewPage {
    fn from(p: &Page) -> Self {
        Self {
            slug: p.slug.clone(),
            kind: p.kind,
            title: p.title.clone(),
            body: p.body.clone(),
            meta_title: p.meta_title.clone(),
            meta_description: p.meta_description.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub excerpt: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub featured_image_url: Option<String>,
    pub is_daily: bool,
    pub published_at: Option<String>,
}

pub struct NewPost {
    pub slug: String,
    pub title: String,
    pub body: String,
    pub excerpt: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub featured_image_url: Option<String>,
    pub is_daily: bool,
    pub published_at: Option<String>,
}

impl From<&Post> for NewPost {
    fn from(p: &Post) -> Self {
        Self {
            slug: p.slug.clone(),
            title: p.title.clone(),
            body: p.body.clone(),
            excerpt: p.excerpt.clone(),
            meta_title: p.meta_title.clone(),
            meta_description: p.meta_description.clone(),
            featured_image_url: p.featured_image_url.clone(),
            is_daily: p.is_daily,
            published_at: p.published_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Offer {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub click_count: i64,
}

/// Offer input without a click counter: copies always start back at zero.
pub struct NewOffer {
    pub slug: String,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
}

impl From<&Offer> for NewOffer {
    fn from(o: &Offer) -> Self {
        Self {
            slug: o.slug.clone(),
            name: o.name.clone(),
            url: o.url.clone(),
            description: o.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Redirect {
    pub id: i64,
    pub from_path: String,
    pub to_url: String,
    pub hit_count: i64,
}

pub struct NewRedirect {
    pub from_path: String,
    pub to_url: String,
}

impl From<&Redirect> for NewRedirect {
    fn from(r: &Redirect) -> Self {
        Self {
            from_path: r.from_path.clone(),
            to_url: r.to_url.clone(),
        }
    }
}
