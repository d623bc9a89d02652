/// Telegram Digest Bot
/// 
/// Builds a daily digest of Telegram channels and posts it to a chat.
/// 
/// The bot:
/// - Collects the day's posts from each configured channel, grouped by topic
/// - Reuses a per-day cache for two hours to avoid refetching
/// - Groups similar posts with embeddings + DBSCAN
/// - Summarizes every group using GPT-4o
/// - Sends the combined digest as one Markdown message

use anyhow::Result;
use clap::Parser;
use telegram_digest_bot::{bot, cli::Cli, config, digest::DigestPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    pretty_env_logger::init();

    let args = Cli::parse();
    let date = args.date_or_today();

    log::info!("Starting Telegram digest for {}...", date);

    // Load configuration from environment
    let cfg = config::Config::from_env()?;

    // Validate configuration before touching any API
    cfg.validate()?;

    let sink: Box<dyn bot::DigestSink> = if args.dry_run {
        log::info!("Dry run: the digest will be printed, not sent");
        Box::new(bot::StdoutSink)
    } else {
        Box::new(bot::TelegramDelivery::connect(&cfg).await?)
    };

    let pipeline = DigestPipeline::from_config(&cfg, sink)?;
    let report = pipeline
        .generate_digest_for_date(date, args.run_options())
        .await?;

    log::info!(
        "Digest for {}: {} posts across {} topics ({})",
        report.date,
        report.posts,
        report.topics,
        if report.from_cache { "cached" } else { "fetched" }
    );

    if report.delivered && !args.dry_run {
        println!("✅ Digest generated and sent for {}", report.date);
    } else if !report.delivered {
        println!("No posts found for {}, nothing was sent", report.date);
    }

    Ok(())
}
