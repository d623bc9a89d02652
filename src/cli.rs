/// Command-line interface
///
/// One invocation builds and delivers the digest for one day.

use chrono::{Local, NaiveDate};
use clap::Parser;

use crate::digest::{parse_date, RunOptions};

/// Summarize a day of Telegram channel posts into a single digest message
///
/// ```sh
/// # Today's digest
/// telegram_digest_bot
///
/// # Re-run an earlier day, ignoring the cache, without sending it
/// telegram_digest_bot --date 2024-05-01 --refresh --dry-run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Day to digest (YYYY-MM-DD), defaults to today
    #[arg(short, long, value_parser = parse_date)]
    pub date: Option<NaiveDate>,

    /// Fetch again even when a fresh cache record exists
    #[arg(short, long)]
    pub refresh: bool,

    /// Print the digest instead of sending it
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    pub fn date_or_today(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            refresh: self.refresh,
        }
    }
}
