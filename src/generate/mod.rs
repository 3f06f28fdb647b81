pub mod openai;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::GenerationConfig;

/// What the generation provider is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    LandingPage,
    LegalPage,
    ClusterArticle,
    BlogPost,
    DailyPost,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::LandingPage => "landing_page",
            ContentKind::LegalPage => "legal_page",
            ContentKind::ClusterArticle => "cluster_article",
            ContentKind::BlogPost => "blog_post",
            ContentKind::DailyPost => "daily_post",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: ContentKind,
    pub topic: String,
    /// Site-level instructions (tone, audience). Opaque to this layer.
    pub instructions: String,
    /// Brand/tenant context handed through to the provider.
    pub context: String,
}

/// Structured output every provider must return. A provider response that
/// cannot be parsed into this shape is an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub title: String,
    #[serde(default)]
    pub slug: String,
    pub content: String,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
}

/// Text-content collaborator. Treated as a black box: no retry logic here,
/// a failed call is a per-item error for the caller to record.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent>;
}

/// Featured-image collaborator. `Ok(None)` is a valid non-error outcome: the
/// image is omitted and the content is still saved.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn featured_image(
        &self,
        topic: &str,
        brand_name: &str,
        prompt: Option<&str>,
    ) -> Result<Option<String>>;
}

/// Provider names accepted by the task APIs.
pub const KNOWN_PROVIDERS: &[&str] = &["openai"];

/// Resolve a provider name to a generator.
/// Register new backends here, keyed by the name clients send.
pub fn create_generator(name: &str, config: &GenerationConfig) -> Result<Arc<dyn ContentGenerator>> {
    match name {
        "openai" => Ok(Arc::new(openai::OpenAiGenerator::new(config)?)),
        other => bail!("unknown generation provider '{other}'"),
    }
}

pub fn create_image_generator(config: &GenerationConfig) -> Result<Arc<dyn ImageGenerator>> {
    Ok(Arc::new(openai::OpenAiImageGenerator::new(config)?))
}

/// Cheap validation for the task-creation path: an unknown provider is a
/// resolution error surfaced to the caller, never a queued task.
pub fn validate_provider(name: &str) -> Result<()> {
    if KNOWN_PROVIDERS.contains(&name) {
        Ok(())
    } else {
        bail!("unknown generation provider '{name}'")
    }
}
