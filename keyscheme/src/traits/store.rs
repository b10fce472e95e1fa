use core::error::Error;
use std::time::Duration;

use crate::pipeline::{Command, Pipeline, Reply};

/// One page of a cursor-based key scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Keys matching the pattern, in the store's own order.
    pub keys: Vec<String>,
    /// Opaque position to resume from. `None` means the scan is complete.
    pub cursor: Option<String>,
}

/// A trait defining the key-value store the schemes are resolved against.
///
/// Keys are flat strings; values are whatever the store holds. All operations
/// are blocking, and errors are handed back to the caller untouched.
pub trait Store {
    /// Value type held by the store.
    type Value: Clone;
    /// Error type returned by store operations.
    type Error: Error + 'static;

    /// Should retrieve the value stored at `key`, or `None` if it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails while reading.
    fn get(&self, key: &str) -> Result<Option<Self::Value>, Self::Error>;

    /// Should store `value` at `key`, expiring it after `expire` if given.
    /// Returns the store's write acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails while writing.
    fn set(
        &self,
        key: &str,
        value: Self::Value,
        expire: Option<Duration>,
    ) -> Result<bool, Self::Error>;

    /// Should remove `key`, returning how many keys were removed.
    /// Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails while removing.
    fn delete(&self, key: &str) -> Result<u64, Self::Error>;

    /// Should return up to roughly `count` keys matching the glob `pattern`,
    /// starting after `cursor` (or from the beginning when `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails while scanning.
    fn scan(
        &self,
        pattern: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<ScanPage, Self::Error>;

    /// Execute a batch of commands, returning one reply per command in order.
    ///
    /// The default implementation runs the commands one after another and stops
    /// at the first error. Stores with a native batching primitive should
    /// override it.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the commands fail.
    fn execute(
        &self,
        pipeline: Pipeline<Self::Value>,
    ) -> Result<Vec<Reply<Self::Value>>, Self::Error> {
        let mut replies = Vec::with_capacity(pipeline.len());
        for command in pipeline {
            let reply = match command {
                Command::Get { key } => Reply::Value(self.get(&key)?),
                Command::Set { key, value, expire } => {
                    Reply::Written(self.set(&key, value, expire)?)
                }
                Command::Delete { key } => Reply::Deleted(self.delete(&key)?),
            };
            replies.push(reply);
        }

        Ok(replies)
    }
}
