use std::collections::BTreeMap;
use std::fmt::Display;
use std::ops::Bound;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::pattern::{literal_prefix, matches};
use crate::pipeline::{Command, Pipeline, Reply};
use crate::traits::{ScanPage, Store};

/// Error type for [`MemoryStore`] operations.
///
/// [`MemoryStore`] operations don't actually fail, so this is an empty error type.
#[derive(Debug, PartialEq, Eq)]
pub struct MemoryStoreError;

impl Display for MemoryStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Memory storage operations do not fail")
    }
}

impl std::error::Error for MemoryStoreError {}

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

type Entries<V> = BTreeMap<String, Entry<V>>;

/// An in-process store keeping every entry in a [`BTreeMap`].
///
/// Expired entries are dropped lazily, when they are next touched. Pipelines
/// run under a single lock, so they apply atomically with respect to other
/// users of the same store.
pub struct MemoryStore<V = String> {
    entries: Mutex<Entries<V>>,
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<V: Clone> MemoryStore<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry whose expiry has passed.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.lock().retain(|_, entry| entry.is_live(now));
    }

    fn get_in(entries: &mut Entries<V>, key: &str, now: Instant) -> Option<V> {
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set_in(entries: &mut Entries<V>, key: &str, value: V, expire: Option<Duration>, now: Instant) {
        // An expiry past what `Instant` can represent never fires.
        let expires_at = expire.and_then(|ttl| now.checked_add(ttl));
        entries.insert(key.to_owned(), Entry { value, expires_at });
    }

    fn delete_in(entries: &mut Entries<V>, key: &str, now: Instant) -> u64 {
        match entries.remove(key) {
            Some(entry) if entry.is_live(now) => 1,
            _ => 0,
        }
    }
}

impl<V: Clone> Store for MemoryStore<V> {
    type Value = V;
    type Error = MemoryStoreError;

    fn get(&self, key: &str) -> Result<Option<V>, Self::Error> {
        Ok(Self::get_in(&mut self.entries.lock(), key, Instant::now()))
    }

    fn set(&self, key: &str, value: V, expire: Option<Duration>) -> Result<bool, Self::Error> {
        Self::set_in(&mut self.entries.lock(), key, value, expire, Instant::now());
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<u64, Self::Error> {
        Ok(Self::delete_in(&mut self.entries.lock(), key, Instant::now()))
    }

    fn scan(
        &self,
        pattern: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<ScanPage, Self::Error> {
        let now = Instant::now();
        let prefix = literal_prefix(pattern);
        let lower = match cursor {
            Some(cursor) if cursor >= prefix.as_str() => Bound::Excluded(cursor.to_owned()),
            _ => Bound::Included(prefix.clone()),
        };

        let entries = self.entries.lock();
        let mut page = ScanPage::default();
        for (key, entry) in entries.range::<String, _>((lower, Bound::Unbounded)) {
            if !key.starts_with(&prefix) {
                break;
            }
            if !entry.is_live(now) || !matches(pattern, key) {
                continue;
            }
            page.keys.push(key.clone());
            if page.keys.len() >= count {
                page.cursor = Some(key.clone());
                break;
            }
        }

        Ok(page)
    }

    fn execute(&self, pipeline: Pipeline<V>) -> Result<Vec<Reply<V>>, Self::Error> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let replies = pipeline
            .into_iter()
            .map(|command| match command {
                Command::Get { key } => Reply::Value(Self::get_in(&mut entries, &key, now)),
                Command::Set { key, value, expire } => {
                    Self::set_in(&mut entries, &key, value, expire, now);
                    Reply::Written(true)
                }
                Command::Delete { key } => Reply::Deleted(Self::delete_in(&mut entries, &key, now)),
            })
            .collect();

        Ok(replies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_pages_through_matching_keys() {
        let store = MemoryStore::new();
        for i in 0..25 {
            store.set(&format!("rq:job:{i:02}"), i.to_string(), None).unwrap();
        }
        store.set("rq:queue:default", "x".into(), None).unwrap();

        let first = store.scan("rq:job:*", None, 10).unwrap();
        assert_eq!(first.keys.len(), 10);
        assert_eq!(first.cursor.as_deref(), Some("rq:job:09"));

        let mut keys = first.keys;
        let mut cursor = first.cursor;
        while let Some(c) = cursor {
            let page = store.scan("rq:job:*", Some(&c), 10).unwrap();
            keys.extend(page.keys);
            cursor = page.cursor;
        }
        assert_eq!(keys.len(), 25);
        assert!(keys.iter().all(|k| k.starts_with("rq:job:")));
    }

    #[test]
    fn expired_entries_are_invisible() {
        let store: MemoryStore = MemoryStore::new();
        store
            .set("k", "v".into(), Some(Duration::from_millis(0)))
            .unwrap();
        store.set("live", "v".into(), None).unwrap();

        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(store.scan("*", None, 10).unwrap().keys, ["live"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unrepresentable_expiry_never_fires() {
        let store: MemoryStore = MemoryStore::new();
        store.set("k", "v".into(), Some(Duration::MAX)).unwrap();

        let mut pipeline = Pipeline::new();
        pipeline.set("p", "v".to_string(), Some(Duration::MAX)).get("p");
        let replies = store.execute(pipeline).unwrap();

        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(replies[1], Reply::Value(Some("v".to_string())));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn pipeline_replies_follow_queue_order() {
        let store = MemoryStore::new();
        let mut pipeline = Pipeline::new();
        pipeline
            .set("a", "1".to_string(), None)
            .get("a")
            .delete("a")
            .delete("a")
            .get("a");

        let replies = store.execute(pipeline).unwrap();
        assert_eq!(
            replies,
            [
                Reply::Written(true),
                Reply::Value(Some("1".to_string())),
                Reply::Deleted(1),
                Reply::Deleted(0),
                Reply::Value(None),
            ]
        );
    }
}
