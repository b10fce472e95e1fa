use std::error::Error;
use std::fmt::Display;
use std::ops::Bound;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::pattern::{literal_prefix, matches};
use crate::pipeline::{Command, Pipeline, Reply};
use crate::traits::{ScanPage, Store};

/// Error type for [`SledStore`] operations.
#[derive(Debug)]
pub enum SledStoreError {
    /// Sled database error
    Sled(sled::Error),
    /// Postcard encoding error
    Encoding(postcard::Error),
}

impl Display for SledStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sled(e) => write!(f, "Sled error: {e}"),
            Self::Encoding(e) => write!(f, "Encoding error: {e}"),
        }
    }
}

impl Error for SledStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sled(e) => Some(e),
            Self::Encoding(e) => Some(e),
        }
    }
}

impl From<sled::Error> for SledStoreError {
    fn from(e: sled::Error) -> Self {
        Self::Sled(e)
    }
}

impl From<postcard::Error> for SledStoreError {
    fn from(e: postcard::Error) -> Self {
        Self::Encoding(e)
    }
}

/// What is actually written under each key.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    value: Vec<u8>,
    /// Milliseconds since the Unix epoch.
    expires_at: Option<u64>,
}

impl StoredEntry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}

fn expiry_millis(expire: Option<Duration>, now: u64) -> Option<u64> {
    expire.map(|ttl| now.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)))
}

/// A sled-based store.
///
/// Values are raw bytes. Each entry is wrapped with its expiry and encoded
/// with postcard; expired entries are removed lazily when read or scanned.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Create a new temporary sled store, removed when dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn new() -> Result<Self, SledStoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Open a sled database at the specified path
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, SledStoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Create a sled database with custom configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn with_config(config: &sled::Config) -> Result<Self, SledStoreError> {
        let db = config.open()?;
        Ok(Self { db })
    }

    /// Get a reference to the underlying sled database
    #[must_use]
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    fn decode(bytes: &[u8]) -> Result<StoredEntry, SledStoreError> {
        Ok(postcard::from_bytes(bytes)?)
    }

    fn encode(value: Vec<u8>, expire: Option<Duration>) -> Result<Vec<u8>, SledStoreError> {
        let entry = StoredEntry {
            value,
            expires_at: expiry_millis(expire, now_millis()),
        };
        Ok(postcard::to_allocvec(&entry)?)
    }
}

impl Store for SledStore {
    type Value = Vec<u8>;
    type Error = SledStoreError;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        let Some(bytes) = self.db.get(key)? else {
            return Ok(None);
        };
        let entry = Self::decode(&bytes)?;
        if entry.is_live(now_millis()) {
            Ok(Some(entry.value))
        } else {
            self.db.remove(key)?;
            Ok(None)
        }
    }

    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        expire: Option<Duration>,
    ) -> Result<bool, Self::Error> {
        self.db.insert(key, Self::encode(value, expire)?)?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<u64, Self::Error> {
        match self.db.remove(key)? {
            Some(bytes) if Self::decode(&bytes)?.is_live(now_millis()) => Ok(1),
            _ => Ok(0),
        }
    }

    fn scan(
        &self,
        pattern: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<ScanPage, Self::Error> {
        let now = now_millis();
        let prefix = literal_prefix(pattern);
        let lower = match cursor {
            Some(cursor) if cursor >= prefix.as_str() => Bound::Excluded(cursor.as_bytes().to_vec()),
            _ => Bound::Included(prefix.as_bytes().to_vec()),
        };

        let mut page = ScanPage::default();
        for item in self.db.range::<Vec<u8>, _>((lower, Bound::Unbounded)) {
            let (raw_key, bytes) = item?;
            if !raw_key.starts_with(prefix.as_bytes()) {
                break;
            }
            let Ok(key) = std::str::from_utf8(&raw_key) else {
                continue;
            };
            if !matches(pattern, key) {
                continue;
            }
            if !Self::decode(&bytes)?.is_live(now) {
                self.db.remove(&raw_key)?;
                continue;
            }
            page.keys.push(key.to_owned());
            if page.keys.len() >= count {
                page.cursor = Some(key.to_owned());
                break;
            }
        }

        Ok(page)
    }

    /// Consecutive sets are applied as one sled batch; gets and deletes run
    /// in between, in queue order.
    fn execute(&self, pipeline: Pipeline<Vec<u8>>) -> Result<Vec<Reply<Vec<u8>>>, Self::Error> {
        let mut writes = PendingWrites::default();
        let mut replies = Vec::with_capacity(pipeline.len());

        for command in pipeline {
            match command {
                Command::Set { key, value, expire } => {
                    writes.batch.insert(key.as_bytes(), Self::encode(value, expire)?);
                    writes.count += 1;
                }
                Command::Get { key } => {
                    writes.flush(&self.db, &mut replies)?;
                    replies.push(Reply::Value(self.get(&key)?));
                }
                Command::Delete { key } => {
                    writes.flush(&self.db, &mut replies)?;
                    replies.push(Reply::Deleted(self.delete(&key)?));
                }
            }
        }
        writes.flush(&self.db, &mut replies)?;

        Ok(replies)
    }
}

#[derive(Default)]
struct PendingWrites {
    batch: sled::Batch,
    count: usize,
}

impl PendingWrites {
    fn flush(
        &mut self,
        db: &sled::Db,
        replies: &mut Vec<Reply<Vec<u8>>>,
    ) -> Result<(), SledStoreError> {
        if self.count == 0 {
            return Ok(());
        }
        db.apply_batch(std::mem::take(&mut self.batch))?;
        replies.extend(std::iter::repeat_n(Reply::Written(true), self.count));
        self.count = 0;
        Ok(())
    }
}
