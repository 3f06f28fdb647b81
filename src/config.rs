use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct PlatformConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Control-plane database (tenants + task ledger).
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    /// Directory holding one isolated SQLite store per tenant.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// TTL for the resolve-by-domain cache.
    #[serde(default = "default_resolve_ttl")]
    pub resolve_cache_ttl_secs: u64,
    /// Content tasks make dozens of provider calls; clones only copy rows.
    #[serde(default = "default_content_timeout")]
    pub content_task_timeout_secs: u64,
    #[serde(default = "default_clone_timeout")]
    pub clone_task_timeout_secs: u64,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            model: default_model(),
            image_model: default_image_model(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// Default functions
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/control.db")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data/tenants")
}
fn default_worker_count() -> usize {
    4
}
fn default_resolve_ttl() -> u64 {
    600
}
fn default_content_timeout() -> u64 {
    1800
}
fn default_clone_timeout() -> u64 {
    300
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_image_model() -> String {
    "dall-e-3".into()
}
fn default_request_timeout() -> u64 {
    120
}

/// Load config from TOML file with env var overrides.
pub fn load(path: &str) -> anyhow::Result<PlatformConfig> {
    let content = if std::path::Path::new(path).exists() {
        std::fs::read_to_string(path)?
    } else {
        tracing::warn!("Config file not found at {}, using defaults", path);
        String::new()
    };

    let mut config: PlatformConfig = toml::from_str(&content)?;

    // Env var overrides
    if let Ok(v) = std::env::var("SITEFORGE_HOST") {
        config.host = v;
    }
    if let Ok(v) = std::env::var("SITEFORGE_PORT") {
        config.port = v.parse()?;
    }
    if let Ok(v) = std::env::var("SITEFORGE_DB_PATH") {
        config.database_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("SITEFORGE_DATA_DIR") {
        config.data_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("SITEFORGE_GENERATION_API_KEY") {
        config.generation.api_key = v;
    }

    Ok(config)
}
