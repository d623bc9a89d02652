/// Digest module
///
/// Runs the per-day pipeline: fetch (or reuse cached) posts, cluster them per
/// topic, summarize every cluster and deliver the combined digest.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;

use crate::bot::DigestSink;
use crate::cache::{DigestCache, MessagesByTopic};
use crate::channels::{fetch_messages_for_date, ChannelSource, TelegramPreviewSource};
use crate::clustering::{dbscan, group_by_label, Cluster};
use crate::config::{Config, Topic};
use crate::openai::{Embedder, OpenAIClient, Summarizer};

/// Tunables of a digest run
#[derive(Debug, Clone)]
pub struct DigestSettings {
    pub topics: Vec<Topic>,
    pub fetch_limit: usize,
    pub cluster_eps: f32,
    pub cluster_min_samples: usize,
    pub max_posts_per_summary: usize,
}

impl From<&Config> for DigestSettings {
    fn from(config: &Config) -> Self {
        Self {
            topics: config.topics.clone(),
            fetch_limit: config.fetch_limit,
            cluster_eps: config.cluster_eps,
            cluster_min_samples: config.cluster_min_samples,
            max_posts_per_summary: config.max_posts_per_summary,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Ignore a fresh cache record and fetch again
    pub refresh: bool,
}

/// What a run produced
#[derive(Debug, Clone)]
pub struct DigestReport {
    pub date: NaiveDate,
    pub from_cache: bool,
    pub topics: usize,
    pub posts: usize,
    pub delivered: bool,
    pub text: String,
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date_str))
}

/// Topics in digest order: configured ones first, then leftovers from an older config
fn ordered_topics<'a>(
    messages_by_topic: &'a MessagesByTopic,
    topics: &[Topic],
) -> Vec<(&'a str, &'a [String])> {
    let mut ordered: Vec<(&str, &[String])> = Vec::new();

    for topic in topics {
        if ordered.iter().any(|(name, _)| *name == topic.name) {
            continue;
        }
        if let Some((name, messages)) = messages_by_topic.get_key_value(&topic.name) {
            ordered.push((name.as_str(), messages.as_slice()));
        }
    }

    for (name, messages) in messages_by_topic {
        if !topics.iter().any(|t| &t.name == name) {
            ordered.push((name.as_str(), messages.as_slice()));
        }
    }

    ordered
}

pub struct DigestPipeline {
    settings: DigestSettings,
    cache: DigestCache,
    source: Box<dyn ChannelSource>,
    embedder: Arc<dyn Embedder>,
    summarizer: Arc<dyn Summarizer>,
    sink: Box<dyn DigestSink>,
}

impl DigestPipeline {
    pub fn new(
        settings: DigestSettings,
        cache: DigestCache,
        source: Box<dyn ChannelSource>,
        embedder: Arc<dyn Embedder>,
        summarizer: Arc<dyn Summarizer>,
        sink: Box<dyn DigestSink>,
    ) -> Self {
        Self {
            settings,
            cache,
            source,
            embedder,
            summarizer,
            sink,
        }
    }

    /// Wire the production stages from configuration
    pub fn from_config(config: &Config, sink: Box<dyn DigestSink>) -> Result<Self> {
        let openai = Arc::new(OpenAIClient::new(config)?);

        Ok(Self::new(
            DigestSettings::from(config),
            DigestCache::new(&config.cache_dir, config.cache_ttl()?),
            Box::new(TelegramPreviewSource::new(config)?),
            openai.clone(),
            openai,
            sink,
        ))
    }

    /// Cached messages for `date` when fresh, otherwise freshly fetched (and cached)
    async fn messages_for_date(
        &self,
        date: NaiveDate,
        options: RunOptions,
    ) -> (MessagesByTopic, bool) {
        if !options.refresh {
            match self.cache.load_fresh(date).await {
                Ok(Some(messages)) => return (messages, true),
                Ok(None) => {}
                Err(e) => log::warn!("Ignoring unreadable cache record: {:#}", e),
            }
        }

        log::info!("Fetching messages for {}", date);
        let messages = fetch_messages_for_date(
            self.source.as_ref(),
            &self.settings.topics,
            date,
            self.settings.fetch_limit,
        )
        .await;

        if let Err(e) = self.cache.store(date, &messages).await {
            log::warn!("Failed to cache messages for {}: {:#}", date, e);
        }

        (messages, false)
    }

    /// Cluster one topic's messages; an embedding failure yields a single noise group
    async fn cluster_topic(&self, topic: &str, messages: &[String]) -> Vec<Cluster<String>> {
        match self.embedder.embed(messages).await {
            Ok(embeddings) => {
                let labels = dbscan(
                    &embeddings,
                    self.settings.cluster_eps,
                    self.settings.cluster_min_samples,
                );
                group_by_label(messages.to_vec(), &labels)
            }
            Err(e) => {
                log::error!("Embedding failed for topic {}: {:#}", topic, e);
                vec![Cluster {
                    label: None,
                    items: messages.to_vec(),
                }]
            }
        }
    }

    async fn summarize_cluster(&self, posts: &[String]) -> String {
        let limit = posts.len().min(self.settings.max_posts_per_summary);

        match self.summarizer.summarize(&posts[..limit]).await {
            Ok(summary) => summary,
            Err(e) => {
                log::error!("Summary failed: {:#}", e);
                format!("⚠️ Error GPT: {}", e)
            }
        }
    }

    /// Render the digest text for a set of messages
    pub async fn cluster_and_summarize(&self, messages_by_topic: &MessagesByTopic) -> String {
        let mut result_text = String::new();

        for (topic, messages) in ordered_topics(messages_by_topic, &self.settings.topics) {
            if messages.is_empty() {
                log::debug!("Skipping empty topic {}", topic);
                continue;
            }

            let clusters = self.cluster_topic(topic, messages).await;
            log::info!(
                "Topic {}: {} messages in {} groups",
                topic,
                messages.len(),
                clusters.len()
            );

            result_text.push_str(&format!("\n*{}*\n", topic.to_uppercase()));
            for cluster in &clusters {
                match cluster.label {
                    None => result_text.push_str("\n_Disparate posts:_\n"),
                    Some(label) => result_text.push_str(&format!(
                        "\n_Cluster #{} ({} posts):_\n",
                        label,
                        cluster.items.len()
                    )),
                }

                let summary = self.summarize_cluster(&cluster.items).await;
                result_text.push_str(&summary);
                result_text.push('\n');
            }
        }

        result_text.trim().to_string()
    }

    /// Build and deliver the digest for one day
    pub async fn generate_digest_for_date(
        &self,
        date: NaiveDate,
        options: RunOptions,
    ) -> Result<DigestReport> {
        let (messages_by_topic, from_cache) = self.messages_for_date(date, options).await;

        let posts = messages_by_topic.values().map(Vec::len).sum();
        let topics = messages_by_topic.values().filter(|m| !m.is_empty()).count();

        let text = self.cluster_and_summarize(&messages_by_topic).await;

        let delivered = if text.is_empty() {
            log::warn!("No posts found for {}, nothing to deliver", date);
            false
        } else {
            self.sink
                .deliver(&text)
                .await
                .with_context(|| format!("Failed to deliver digest for {}", date))?;
            true
        };

        Ok(DigestReport {
            date,
            from_cache,
            topics,
            posts,
            delivered,
            text,
        })
    }
}
