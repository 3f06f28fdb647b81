//! OpenAI-compatible chat/image backends.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::generate::{ContentGenerator, ContentKind, GeneratedContent, GenerationRequest, ImageGenerator};

pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn system_prompt(kind: ContentKind) -> &'static str {
        match kind {
            ContentKind::LandingPage => {
                "You write landing pages for branded content sites. \
                 Respond with a single JSON object: \
                 {\"title\", \"content\", \"meta_title\", \"meta_description\"}."
            }
            ContentKind::LegalPage => {
                "You write informational and legal pages (about, contact, privacy, terms). \
                 Respond with a single JSON object: \
                 {\"title\", \"content\", \"meta_title\", \"meta_description\"}."
            }
            ContentKind::ClusterArticle => {
                "You write long-form SEO cluster articles. \
                 Respond with a single JSON object: \
                 {\"title\", \"content\", \"meta_title\", \"meta_description\", \"excerpt\"}."
            }
            ContentKind::BlogPost | ContentKind::DailyPost => {
                "You write engaging blog posts. \
                 Respond with a single JSON object: \
                 {\"title\", \"content\", \"meta_title\", \"meta_description\", \"excerpt\"}."
            }
        }
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent> {
        if self.api_key.is_empty() {
            bail!("generation API key is not configured");
        }

        let user_prompt = format!(
            "Topic: {}\nContext: {}\n{}",
            request.topic, request.context, request.instructions
        );
        let body = serde_json::json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": Self::system_prompt(request.kind) },
                { "role": "user", "content": user_prompt },
            ],
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("generation request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            bail!("generation provider returned {status}: {detail}");
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .context("generation provider returned non-JSON body")?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("generation provider response has no message content"))?;

        serde_json::from_str::<GeneratedContent>(content)
            .context("generation provider returned malformed content")
    }
}

pub struct OpenAiImageGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiImageGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.image_model.clone(),
        })
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn featured_image(
        &self,
        topic: &str,
        brand_name: &str,
        prompt: Option<&str>,
    ) -> Result<Option<String>> {
        // No image backend configured: omitting the image is a valid outcome.
        if self.api_key.is_empty() || self.model.is_empty() {
            return Ok(None);
        }

        let prompt = match prompt {
            Some(p) => p.to_string(),
            None => format!("Editorial featured image for an article about \"{topic}\" on the {brand_name} site, no text"),
        };
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "n": 1,
        });

        let resp = self
            .client
            .post(format!("{}/images/generations", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("image request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            bail!("image provider returned {status}: {detail}");
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .context("image provider returned non-JSON body")?;
        Ok(json["data"][0]["url"].as_str().map(|s| s.to_string()))
    }
}
