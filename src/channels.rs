/// Channels module
///
/// Reads posts from public Telegram channels through their web preview
/// (`https://t.me/s/<channel>`), paging backwards until the requested day is
/// covered, and groups the day's posts by topic.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;

use crate::cache::MessagesByTopic;
use crate::config::{Config, Topic};

lazy_static::lazy_static! {
    static ref MESSAGE_SELECTOR: Selector =
        Selector::parse("div.tgme_widget_message[data-post]").expect("valid message selector");
    static ref TEXT_SELECTOR: Selector =
        Selector::parse(".tgme_widget_message_bubble > .tgme_widget_message_text")
            .expect("valid text selector");
    static ref TIME_SELECTOR: Selector =
        Selector::parse(".tgme_widget_message_date time[datetime]").expect("valid time selector");
}

/// A single channel post
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPost {
    pub id: i64,
    pub published: DateTime<Utc>,
    pub text: String,
}

/// Anything that can list a channel's posts for one day
#[async_trait]
pub trait ChannelSource: Send + Sync {
    /// Posts of `handle` published on `date` (UTC), newest first, looking at
    /// no more than `limit` of the channel's most recent posts
    async fn posts_for_date(
        &self,
        handle: &str,
        date: NaiveDate,
        limit: usize,
    ) -> Result<Vec<ChannelPost>>;
}

/// `@name` → `name`
pub fn normalize_handle(handle: &str) -> &str {
    handle.trim().trim_start_matches('@')
}

/// `channel/123` → `123`
fn parse_post_id(data_post: &str) -> Option<i64> {
    data_post.rsplit('/').next()?.parse().ok()
}

/// Collect text, turning `<br>` into newlines
fn element_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();

    for node in element.descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(e) if e.name() == "br" => text.push('\n'),
            _ => {}
        }
    }

    text
}

/// Extract posts from one preview page, in page order (oldest first)
pub fn parse_preview_page(html: &str) -> Vec<ChannelPost> {
    let document = Html::parse_document(html);
    let mut posts = Vec::new();

    for message in document.select(&MESSAGE_SELECTOR) {
        let Some(id) = message.value().attr("data-post").and_then(parse_post_id) else {
            continue;
        };

        let published = message
            .select(&TIME_SELECTOR)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));
        let Some(published) = published else {
            log::debug!("Skipping post {} without a timestamp", id);
            continue;
        };

        let text = message
            .select(&TEXT_SELECTOR)
            .next()
            .map(element_text)
            .unwrap_or_default();

        posts.push(ChannelPost {
            id,
            published,
            text,
        });
    }

    posts
}

/// Reads the public web preview of channels
pub struct TelegramPreviewSource {
    http_client: reqwest::Client,
    base_url: String,
}

impl TelegramPreviewSource {
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(15))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create preview HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.telegram_preview_url.clone(),
        })
    }

    fn page_url(&self, handle: &str, before: Option<i64>) -> String {
        match before {
            Some(id) => format!("{}/{}?before={}", self.base_url, handle, id),
            None => format!("{}/{}", self.base_url, handle),
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<ChannelPost>> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Channel preview {} returned status {}", url, status);
        }

        let html = response
            .text()
            .await
            .with_context(|| format!("Failed to read {}", url))?;

        Ok(parse_preview_page(&html))
    }
}

#[async_trait]
impl ChannelSource for TelegramPreviewSource {
    async fn posts_for_date(
        &self,
        handle: &str,
        date: NaiveDate,
        limit: usize,
    ) -> Result<Vec<ChannelPost>> {
        let handle = normalize_handle(handle);
        let mut matching = Vec::new();
        let mut seen = 0;
        let mut before: Option<i64> = None;

        while seen < limit {
            let url = self.page_url(handle, before);
            let mut page = self.fetch_page(&url).await?;

            if let Some(cursor) = before {
                page.retain(|p| p.id < cursor);
            }
            if page.is_empty() {
                break;
            }

            page.sort_by_key(|p| p.id);
            let oldest = page[0].clone();
            log::debug!("{}: {} posts on page {}", handle, page.len(), url);

            for post in page.into_iter().rev() {
                if seen >= limit {
                    break;
                }
                seen += 1;
                if post.published.date_naive() == date {
                    matching.push(post);
                }
            }

            if oldest.published.date_naive() < date {
                break;
            }
            before = Some(oldest.id);
        }

        log::info!(
            "{}: {} posts on {} out of {} read",
            handle,
            matching.len(),
            date,
            seen
        );
        Ok(matching)
    }
}

/// Collect the day's posts of every configured channel, grouped by topic
///
/// A failing channel is logged and skipped. Every topic gets an entry, even
/// when none of its channels had posts.
pub async fn fetch_messages_for_date(
    source: &dyn ChannelSource,
    topics: &[Topic],
    date: NaiveDate,
    limit: usize,
) -> MessagesByTopic {
    let mut all_messages = MessagesByTopic::new();

    for topic in topics {
        let messages = all_messages.entry(topic.name.clone()).or_default();

        for channel in &topic.channels {
            match source.posts_for_date(channel, date, limit).await {
                Ok(posts) => {
                    messages.extend(
                        posts
                            .into_iter()
                            .map(|p| p.text.trim().to_string())
                            .filter(|text| !text.is_empty()),
                    );
                }
                Err(e) => {
                    log::error!("Channel error {}: {:#}", channel, e);
                }
            }
        }

        log::info!("Topic {}: {} messages", topic.name, messages.len());
    }

    all_messages
}
