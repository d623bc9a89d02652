/// Configuration module for managing environment variables and API keys
///
/// This module loads and validates all configuration values from environment
/// variables (typically from a .env file), including the topic → channel map
/// that drives the digest.

use anyhow::{bail, Context, Result};
use chrono::Duration;
use std::env;
use std::path::PathBuf;

use crate::clustering::{DEFAULT_EPS, DEFAULT_MIN_SAMPLES};

/// Topics used when `TOPICS` is not set
pub const DEFAULT_TOPICS: &str = "Tech=@vcnews,@whackdoor,@Wylsared;\
    News=@meduzalive,@bankrollo,@lentachtrue;\
    Productivity=@donetsraw";

/// A named group of channels whose posts are summarized together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token from BotFather
    pub telegram_token: String,

    /// Destination chat: numeric id or `@channel` username
    pub telegram_chat_id: String,

    /// OpenAI API key used for embeddings and summaries
    pub openai_api_key: String,

    /// Base URL of the OpenAI-compatible API (without trailing slash)
    pub openai_api_base: String,

    /// Embedding model to use (e.g., "text-embedding-3-small")
    pub embedding_model: String,

    /// GPT model to use for summaries (e.g., "gpt-4o")
    pub gpt_model: String,

    pub summary_temperature: f32,
    pub summary_max_tokens: u32,

    /// Only the first N posts of a cluster are sent to the summarizer
    pub max_posts_per_summary: usize,

    /// Topics in digest order
    pub topics: Vec<Topic>,

    /// Directory holding the per-date cache records
    pub cache_dir: PathBuf,

    /// How long a cache record stays fresh
    pub cache_ttl_hours: i64,

    /// Most recent posts read per channel
    pub fetch_limit: usize,

    /// Public channel preview endpoint (e.g., "https://t.me/s")
    pub telegram_preview_url: String,

    /// DBSCAN neighbourhood radius (cosine distance)
    pub cluster_eps: f32,

    /// DBSCAN core point threshold, the point itself included
    pub cluster_min_samples: usize,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if any required environment variable is missing
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set", key))
        };
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());
        let parsed_usize = |key: &str| lookup(key).and_then(|v| v.trim().parse::<usize>().ok());

        let topics_value = lookup("TOPICS").unwrap_or_else(|| DEFAULT_TOPICS.to_string());

        Ok(Config {
            telegram_token: required("TELEGRAM_BOT_TOKEN")?,

            telegram_chat_id: required("TELEGRAM_CHAT_ID")?,

            openai_api_key: required("OPENAI_API_KEY")?,

            openai_api_base: lookup("OPENAI_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),

            embedding_model: lookup("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),

            gpt_model: lookup("GPT_MODEL")
                .unwrap_or_else(|| "gpt-4o".to_string()),

            summary_temperature: parsed("SUMMARY_TEMPERATURE")
                .map(|v| v as f32)
                .unwrap_or(0.4),

            summary_max_tokens: lookup("SUMMARY_MAX_TOKENS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(400),

            max_posts_per_summary: parsed_usize("MAX_POSTS_PER_SUMMARY").unwrap_or(10),

            topics: parse_topics(&topics_value).context("Invalid TOPICS value")?,

            cache_dir: lookup("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("cache")),

            cache_ttl_hours: lookup("CACHE_TTL_HOURS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(2),

            fetch_limit: parsed_usize("FETCH_LIMIT").unwrap_or(100),

            telegram_preview_url: lookup("TELEGRAM_PREVIEW_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://t.me/s".to_string()),

            cluster_eps: parsed("CLUSTER_EPS").map(|v| v as f32).unwrap_or(DEFAULT_EPS),

            cluster_min_samples: parsed_usize("CLUSTER_MIN_SAMPLES").unwrap_or(DEFAULT_MIN_SAMPLES),
        })
    }

    /// Validate values that parse fine but cannot drive a digest
    pub fn validate(&self) -> Result<()> {
        log::info!("Validating configuration...");

        if self.topics.is_empty() {
            bail!("At least one topic must be configured");
        }
        for (i, topic) in self.topics.iter().enumerate() {
            if topic.channels.is_empty() {
                bail!("Topic '{}' has no channels", topic.name);
            }
            if self.topics[..i].iter().any(|t| t.name == topic.name) {
                bail!("Topic '{}' is configured more than once", topic.name);
            }
        }
        if !(self.cluster_eps > 0.0 && self.cluster_eps <= 2.0) {
            bail!("CLUSTER_EPS must be in (0, 2], got {}", self.cluster_eps);
        }
        if self.cluster_min_samples == 0 {
            bail!("CLUSTER_MIN_SAMPLES must be at least 1");
        }
        if self.fetch_limit == 0 {
            bail!("FETCH_LIMIT must be at least 1");
        }
        if self.max_posts_per_summary == 0 {
            bail!("MAX_POSTS_PER_SUMMARY must be at least 1");
        }
        if self.cache_ttl_hours < 0 {
            bail!("CACHE_TTL_HOURS must not be negative");
        }
        self.cache_ttl()?;

        let channels: usize = self.topics.iter().map(|t| t.channels.len()).sum();
        log::info!(
            "Configuration validated: {} topics, {} channels",
            self.topics.len(),
            channels
        );
        Ok(())
    }

    /// Cache freshness window
    ///
    /// # Errors
    /// Returns an error if `cache_ttl_hours` does not fit in a duration
    pub fn cache_ttl(&self) -> Result<Duration> {
        Duration::try_hours(self.cache_ttl_hours).with_context(|| {
            format!("CACHE_TTL_HOURS is out of range: {}", self.cache_ttl_hours)
        })
    }
}

/// Parse `Name=@a,@b;Other=@c` into ordered topics
pub fn parse_topics(value: &str) -> Result<Vec<Topic>> {
    let mut topics = Vec::new();

    for entry in value.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, channels) = entry
            .split_once('=')
            .with_context(|| format!("Topic entry '{}' is missing '='", entry))?;

        let name = name.trim();
        if name.is_empty() {
            bail!("Topic entry '{}' has an empty name", entry);
        }

        let channels: Vec<String> = channels
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if channels.is_empty() {
            bail!("Topic '{}' lists no channels", name);
        }
        if topics.iter().any(|t: &Topic| t.name == name) {
            bail!("Topic '{}' is listed more than once", name);
        }

        topics.push(Topic {
            name: name.to_string(),
            channels,
        });
    }

    Ok(topics)
}
