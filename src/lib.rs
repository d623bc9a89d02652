/// Telegram Digest Bot Library
/// 
/// This library provides the digest pipeline: fetching channel posts grouped
/// by topic, caching them per day, clustering similar posts, summarizing each
/// cluster with GPT and delivering the digest through a Telegram bot.

pub mod bot;
pub mod cache;
pub mod channels;
pub mod cli;
pub mod clustering;
pub mod config;
pub mod digest;
pub mod openai;

#[cfg(test)]
mod test_support;
