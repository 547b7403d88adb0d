use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::Environment;

const WINDOW_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded; retry after {retry_after_secs}s")]
    Limited { retry_after_secs: u64 },
    #[error("Rate limit storage error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateAction {
    GenerateKey,
    Instantiate,
    Save,
    Restore,
    Delete,
    List,
}

impl RateAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RateAction::GenerateKey => "generate-key",
            RateAction::Instantiate => "instantiate",
            RateAction::Save => "save",
            RateAction::Restore => "restore",
            RateAction::Delete => "delete",
            RateAction::List => "list",
        }
    }

    /// Requests allowed per hour in production.
    pub fn base_limit(self) -> u32 {
        match self {
            RateAction::GenerateKey => 60,
            RateAction::Instantiate => 20,
            RateAction::Save => 600,
            RateAction::Restore => 600,
            RateAction::Delete => 30,
            RateAction::List => 120,
        }
    }
}

/// Sliding-window limiter keeping one flat file of timestamps per (action, client).
#[derive(Debug, Clone)]
pub struct RateLimiter {
    dir: PathBuf,
    environment: Environment,
    window_ms: i64,
}

impl RateLimiter {
    pub fn new(dir: impl Into<PathBuf>, environment: Environment) -> Self {
        Self {
            dir: dir.into(),
            environment,
            window_ms: WINDOW_MS,
        }
    }

    pub fn with_window_ms(mut self, window_ms: i64) -> Self {
        self.window_ms = window_ms.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn limit_for(&self, action: RateAction) -> u32 {
        action.base_limit() * self.environment.rate_limit_multiplier()
    }

    fn counter_path(&self, action: RateAction, client: &str) -> PathBuf {
        let digest = Sha256::digest(client.as_bytes());
        let client_id = hex::encode(&digest[..8]);
        self.dir
            .join(format!("{}-{}.json", action.as_str(), client_id))
    }

    /// Records a hit at `now_ms`, or reports how long until the window frees a slot.
    pub fn check(&self, action: RateAction, client: &str, now_ms: i64) -> Result<u32, RateLimitError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.counter_path(action, client);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        file.lock_exclusive()?;
        let result = self.check_locked(&mut file, action, now_ms);
        let _ = FileExt::unlock(&file);
        result
    }

    fn check_locked(
        &self,
        file: &mut fs::File,
        action: RateAction,
        now_ms: i64,
    ) -> Result<u32, RateLimitError> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        // An unreadable counter file starts a fresh window.
        let mut hits: Vec<i64> = serde_json::from_str(&contents).unwrap_or_default();
        let window_start = now_ms - self.window_ms;
        hits.retain(|hit| *hit > window_start);
        hits.sort_unstable();

        let limit = self.limit_for(action);
        if hits.len() >= limit as usize {
            let oldest = hits.first().copied().unwrap_or(now_ms);
            let wait_ms = (oldest + self.window_ms - now_ms).max(1000);
            return Err(RateLimitError::Limited {
                retry_after_secs: ((wait_ms + 999) / 1000) as u64,
            });
        }
        hits.push(now_ms);

        let body = serde_json::to_string(&hits).map_err(std::io::Error::from)?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(body.as_bytes())?;
        Ok(limit - hits.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn limits_scale_with_environment() {
        let temp = TempDir::new().expect("tempdir");
        let prod = RateLimiter::new(temp.path(), Environment::Production);
        let staging = RateLimiter::new(temp.path(), Environment::Staging);
        let local = RateLimiter::new(temp.path(), Environment::Local);
        assert_eq!(prod.limit_for(RateAction::Delete), 30);
        assert_eq!(staging.limit_for(RateAction::Delete), 150);
        assert_eq!(local.limit_for(RateAction::Delete), 1500);
    }

    #[test]
    fn blocks_after_limit_and_recovers_when_window_slides() {
        let temp = TempDir::new().expect("tempdir");
        let limiter = RateLimiter::new(temp.path(), Environment::Production).with_window_ms(10_000);
        let limit = limiter.limit_for(RateAction::Instantiate);
        for i in 0..limit {
            limiter
                .check(RateAction::Instantiate, "10.0.0.1", 1_000 + i as i64)
                .expect("within limit");
        }
        match limiter.check(RateAction::Instantiate, "10.0.0.1", 2_000) {
            Err(RateLimitError::Limited { retry_after_secs }) => assert_eq!(retry_after_secs, 9),
            other => panic!("expected limit, got {:?}", other),
        }
        // Other clients and actions have their own windows.
        limiter
            .check(RateAction::Instantiate, "10.0.0.2", 2_000)
            .expect("other client");
        limiter
            .check(RateAction::Save, "10.0.0.1", 2_000)
            .expect("other action");
        // Once the first hit leaves the window a slot opens.
        limiter
            .check(RateAction::Instantiate, "10.0.0.1", 11_001)
            .expect("slid window");
    }

    #[test]
    fn corrupt_counter_file_starts_fresh() {
        let temp = TempDir::new().expect("tempdir");
        let limiter = RateLimiter::new(temp.path(), Environment::Production);
        let path = limiter.counter_path(RateAction::Save, "1.2.3.4");
        fs::write(&path, "garbage").expect("write");
        let remaining = limiter
            .check(RateAction::Save, "1.2.3.4", 5)
            .expect("check");
        assert_eq!(remaining, limiter.limit_for(RateAction::Save) - 1);
    }
}
