use std::time::Duration;

/// A single store command queued in a [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<V> {
    Get {
        key: String,
    },
    Set {
        key: String,
        value: V,
        expire: Option<Duration>,
    },
    Delete {
        key: String,
    },
}

impl<V> Command<V> {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Get { key } | Self::Set { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// The store's answer to one [`Command`], in the same position as the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<V> {
    Value(Option<V>),
    Written(bool),
    Deleted(u64),
}

impl<V> Reply<V> {
    /// Returns true if the command took effect: a write was acknowledged, a key
    /// was removed, or a value was found.
    #[must_use]
    pub fn is_success(&self) -> bool {
        match self {
            Self::Value(value) => value.is_some(),
            Self::Written(ok) => *ok,
            Self::Deleted(count) => *count > 0,
        }
    }

    /// Consumes the reply, returning the fetched value of a `Get`.
    #[must_use]
    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Value(value) => value,
            Self::Written(_) | Self::Deleted(_) => None,
        }
    }
}

/// A batch of commands submitted to the store in one round trip.
///
/// Commands accumulate without touching the store; they are applied by
/// [`Store::execute`](crate::Store::execute), which answers with one
/// [`Reply`] per command in queue order. A pipeline is not a transaction
/// unless the store's `execute` makes it one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline<V> {
    commands: Vec<Command<V>>,
}

impl<V> Default for Pipeline<V> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

impl<V> Pipeline<V> {
    /// Creates a new empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Get { key: key.into() });
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: V, expire: Option<Duration>) -> &mut Self {
        self.commands.push(Command::Set {
            key: key.into(),
            value,
            expire,
        });
        self
    }

    /// Queues an already built command.
    pub fn push(&mut self, command: Command<V>) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Delete { key: key.into() });
        self
    }

    /// Returns true if the pipeline has no pending commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command<V>> {
        self.commands.iter()
    }

    /// Discards all pending commands.
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl<V> IntoIterator for Pipeline<V> {
    type Item = Command<V>;
    type IntoIter = std::vec::IntoIter<Command<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use parking_lot::Mutex;

    use super::*;
    use crate::traits::{ScanPage, Store};

    /// Relies on the default, command-by-command `execute`.
    #[derive(Default)]
    struct PlainStore(Mutex<BTreeMap<String, String>>);

    impl Store for PlainStore {
        type Value = String;
        type Error = std::fmt::Error;

        fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
            Ok(self.0.lock().get(key).cloned())
        }

        fn set(&self, key: &str, value: String, _: Option<Duration>) -> Result<bool, Self::Error> {
            self.0.lock().insert(key.to_owned(), value);
            Ok(true)
        }

        fn delete(&self, key: &str) -> Result<u64, Self::Error> {
            Ok(u64::from(self.0.lock().remove(key).is_some()))
        }

        fn scan(&self, _: &str, _: Option<&str>, _: usize) -> Result<ScanPage, Self::Error> {
            Ok(ScanPage::default())
        }
    }

    #[test]
    fn default_execute_runs_in_queue_order() {
        let store = PlainStore::default();
        let mut pipeline = Pipeline::new();
        pipeline
            .get("a")
            .set("a", "1".to_string(), None)
            .get("a")
            .delete("a");
        assert_eq!(pipeline.len(), 4);
        assert_eq!(pipeline.iter().map(Command::key).collect::<Vec<_>>(), ["a"; 4]);

        let replies = store.execute(pipeline).unwrap();
        assert_eq!(
            replies,
            [
                Reply::Value(None),
                Reply::Written(true),
                Reply::Value(Some("1".to_string())),
                Reply::Deleted(1),
            ]
        );
        assert!(!replies[0].is_success());
        assert!(replies.iter().skip(1).all(Reply::is_success));
    }
}
