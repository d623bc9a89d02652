/// Cache module
///
/// Keeps one JSON snapshot of fetched messages per calendar date so repeated
/// runs within the freshness window do not hit the channels again.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDate};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Topic name → messages collected for one date
pub type MessagesByTopic = BTreeMap<String, Vec<String>>;

pub struct DigestCache {
    dir: PathBuf,
    ttl: Duration,
}

/// Whether a record last written at `modified` is still usable at `now`
pub fn is_fresh(modified: DateTime<Local>, now: DateTime<Local>, ttl: Duration) -> bool {
    now - modified < ttl
}

impl DigestCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    /// `<dir>/<YYYY-MM-DD>.json`
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    /// Read the record for `date` if it exists and is within the freshness window
    ///
    /// # Errors
    /// Returns an error if a fresh file exists but cannot be read or parsed
    pub async fn load_fresh(&self, date: NaiveDate) -> Result<Option<MessagesByTopic>> {
        let path = self.path_for(date);

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No cache record at {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to stat {}", path.display()))
            }
        };

        let modified: DateTime<Local> = metadata
            .modified()
            .with_context(|| format!("No modification time for {}", path.display()))?
            .into();

        if !is_fresh(modified, Local::now(), self.ttl) {
            log::info!(
                "Cache record {} is stale (written {})",
                path.display(),
                modified.to_rfc3339()
            );
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let record: MessagesByTopic = serde_json::from_str(&contents)
            .with_context(|| format!("Corrupt cache record {}", path.display()))?;

        log::info!("Using cached messages from {}", path.display());
        Ok(Some(record))
    }

    /// Write the record for `date`, replacing any previous one
    pub async fn store(&self, date: NaiveDate, record: &MessagesByTopic) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create cache dir {}", self.dir.display()))?;

        let path = self.path_for(date);
        let json = serde_json::to_string_pretty(record).context("Failed to serialize messages")?;

        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        log::info!("Cached messages for {} at {}", date, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn record() -> MessagesByTopic {
        MessagesByTopic::from([
            ("News".to_string(), vec!["Привет, мир".to_string()]),
            ("Tech".to_string(), vec!["a".to_string(), "b".to_string()]),
        ])
    }

    #[test]
    fn freshness_window_is_exclusive() {
        let now = Local::now();
        let ttl = Duration::hours(2);

        assert!(is_fresh(now - Duration::minutes(119), now, ttl));
        assert!(!is_fresh(now - Duration::hours(2), now, ttl));
        assert!(!is_fresh(now - Duration::hours(5), now, ttl));
    }

    #[test]
    fn path_is_keyed_by_date() {
        let cache = DigestCache::new("cache", Duration::hours(2));
        assert_eq!(cache.path_for(date()), PathBuf::from("cache/2024-05-01.json"));
    }

    #[tokio::test]
    async fn store_then_load_returns_record() {
        let dir = TempDir::new().unwrap();
        let cache = DigestCache::new(dir.path().join("nested"), Duration::hours(2));

        let path = cache.store(date(), &record()).await.unwrap();

        let raw = std::fs::read_to_string(path).unwrap();
        assert!(raw.contains("Привет, мир"), "non-ASCII must stay unescaped");

        let loaded = cache.load_fresh(date()).await.unwrap();
        assert_eq!(loaded, Some(record()));
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let dir = TempDir::new().unwrap();
        let cache = DigestCache::new(dir.path(), Duration::hours(2));

        assert_eq!(cache.load_fresh(date()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn zero_ttl_treats_every_record_as_stale() {
        let dir = TempDir::new().unwrap();
        let cache = DigestCache::new(dir.path(), Duration::zero());

        cache.store(date(), &record()).await.unwrap();
        assert_eq!(cache.load_fresh(date()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_record_is_an_error() {
        let dir = TempDir::new().unwrap();
        let cache = DigestCache::new(dir.path(), Duration::hours(2));

        std::fs::write(cache.path_for(date()), "{not json").unwrap();
        assert!(cache.load_fresh(date()).await.is_err());
    }
}
