/// Telegram bot module
///
/// This module delivers the finished digest to the destination chat using the
/// teloxide framework.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use teloxide::{
    prelude::*,
    types::{Me, ParseMode, Recipient},
};
use tokio::time::sleep;

use crate::config::Config;

/// Longest digest body sent as-is; longer ones are cut and marked with "..."
pub const MAX_MESSAGE_CHARS: usize = 4090;

/// Where a finished digest goes
#[async_trait]
pub trait DigestSink: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<()>;
}

/// Cut `text` to the message limit, appending `\n...` when anything was dropped
pub fn truncate_for_telegram(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }

    let mut truncated: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
    truncated.push_str("\n...");
    truncated
}

/// Numeric ids address chats directly, anything else is a channel username
pub fn parse_recipient(chat_id: &str) -> Recipient {
    let chat_id = chat_id.trim();

    match chat_id.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) if chat_id.starts_with('@') => Recipient::ChannelUsername(chat_id.to_string()),
        Err(_) => Recipient::ChannelUsername(format!("@{}", chat_id)),
    }
}

/// Sends digests through the Bot API
pub struct TelegramDelivery {
    bot: Bot,
    recipient: Recipient,
}

impl TelegramDelivery {
    /// Create the bot and check the token before any digest work starts
    pub async fn connect(config: &Config) -> Result<Self> {
        log::info!("Creating HTTP client with extended timeouts (60s request, 30s connect)...");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        let bot = Bot::with_client(&config.telegram_token, client);

        let me = retry_get_me(&bot)
            .await
            .context("Failed to connect to Telegram API after multiple retries")?;
        log::info!("Delivering as @{}", me.username());

        Ok(Self {
            bot,
            recipient: parse_recipient(&config.telegram_chat_id),
        })
    }
}

#[async_trait]
impl DigestSink for TelegramDelivery {
    async fn deliver(&self, text: &str) -> Result<()> {
        let text = truncate_for_telegram(text);

        // Summaries are written in legacy Markdown (*bold*, _italic_)
        #[allow(deprecated)]
        let parse_mode = ParseMode::Markdown;

        self.bot
            .send_message(self.recipient.clone(), text)
            .parse_mode(parse_mode)
            .await
            .context("Error when sending to Telegram")?;

        log::info!("📬 The digest has been sent to Telegram.");
        Ok(())
    }
}

/// Prints the digest instead of sending it
pub struct StdoutSink;

#[async_trait]
impl DigestSink for StdoutSink {
    async fn deliver(&self, text: &str) -> Result<()> {
        println!("{}", text);
        Ok(())
    }
}

/// Retry getting bot info with exponential backoff
async fn retry_get_me(bot: &Bot) -> Result<Me> {
    let max_retries = 5;
    let mut delay = Duration::from_secs(2);

    log::info!("Attempting to connect to Telegram API...");

    for attempt in 1..=max_retries {
        match bot.get_me().await {
            Ok(me) => {
                log::info!("Successfully connected to Telegram API on attempt {}", attempt);
                return Ok(me);
            }
            Err(e) if attempt == max_retries => {
                log::error!(
                    "Failed to connect to Telegram API after {} attempts.",
                    max_retries
                );
                anyhow::bail!(
                    "Failed to connect to Telegram API after {} attempts: {}",
                    max_retries,
                    e
                );
            }
            Err(e) => {
                log::warn!(
                    "Failed to connect to Telegram API (attempt {}/{}): {}\n\
                    Retrying in {:?}...",
                    attempt,
                    max_retries,
                    e,
                    delay
                );

                sleep(delay).await;
                delay *= 2; // Exponential backoff
            }
        }
    }

    unreachable!()
}
