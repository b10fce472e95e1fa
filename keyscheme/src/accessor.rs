use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::trace;

use crate::errors::{Error, KeyError};
use crate::scheme::{KeyArgs, KeyScheme};
use crate::traits::Store;

pub(crate) type StoreResult<T, S> = Result<T, Error<<S as Store>::Error>>;

/// Number of keys requested per scan page unless configured otherwise.
pub const DEFAULT_SCAN_COUNT: usize = 10;

/// A shared, replaceable handle to the default store of a record type.
///
/// Every accessor built from the same declaration holds a clone of the slot,
/// so replacing the store is seen by all of them on their next call.
pub struct StoreSlot<S>(Arc<RwLock<Option<Arc<S>>>>);

impl<S> StoreSlot<S> {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(None)))
    }

    #[must_use]
    pub fn with_store(store: Arc<S>) -> Self {
        Self(Arc::new(RwLock::new(Some(store))))
    }

    pub fn set(&self, store: Arc<S>) {
        *self.0.write() = Some(store);
    }

    pub fn clear(&self) {
        *self.0.write() = None;
    }

    #[must_use]
    pub fn get(&self) -> Option<Arc<S>> {
        self.0.read().clone()
    }
}

impl<S> Default for StoreSlot<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for StoreSlot<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// One key scheme bound to a key prefix and a store.
///
/// The store is resolved on every call: an override installed with
/// [`connect`](Self::connect) wins over the declaration's default slot.
/// Overrides are shared by everything holding this accessor and are not
/// scoped to a caller, so swapping them while other code is mid-operation
/// changes the store under its feet.
pub struct KeyedAccessor<S> {
    scheme: KeyScheme,
    prefix: String,
    default: StoreSlot<S>,
    manual: RwLock<Option<Arc<S>>>,
    scan_count: usize,
}

impl<S: Store> KeyedAccessor<S> {
    /// Creates an accessor with its own, initially empty, default slot.
    #[must_use]
    pub fn new(prefix: impl Into<String>, scheme: KeyScheme) -> Self {
        Self::with_slot(prefix, scheme, StoreSlot::new())
    }

    pub(crate) fn with_slot(
        prefix: impl Into<String>,
        scheme: KeyScheme,
        default: StoreSlot<S>,
    ) -> Self {
        Self {
            scheme,
            prefix: prefix.into(),
            default,
            manual: RwLock::new(None),
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    /// Sets how many keys each scan step asks the store for.
    #[must_use]
    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count.max(1);
        self
    }

    #[must_use]
    pub fn scheme(&self) -> &KeyScheme {
        &self.scheme
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Overrides the default store for this accessor only.
    pub fn connect(&self, store: Arc<S>) {
        *self.manual.write() = Some(store);
    }

    /// Drops the override, falling back to the default store.
    pub fn disconnect(&self) {
        *self.manual.write() = None;
    }

    /// Resolves the store this accessor currently talks to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if neither an override nor a default is set.
    pub fn store(&self) -> StoreResult<Arc<S>, S> {
        if let Some(store) = self.manual.read().as_ref() {
            return Ok(Arc::clone(store));
        }
        self.default.get().ok_or(Error::NotConnected)
    }

    /// Builds the full key: the prefix followed by the scheme's key.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] if the scheme can not resolve `args`.
    pub fn key(&self, wildcard_ok: bool, args: &KeyArgs) -> Result<String, KeyError> {
        let key = format!("{}{}", self.prefix, self.scheme.get_key(wildcard_ok, args)?);
        trace!(%key, wildcard_ok, "resolved key");
        Ok(key)
    }

    /// # Errors
    ///
    /// Returns an [`Error`] if the key can not be resolved or the store fails.
    pub fn get(&self, args: &KeyArgs) -> StoreResult<Option<S::Value>, S> {
        self.get_in(&*self.store()?, args)
    }

    /// # Errors
    ///
    /// Returns an [`Error`] if the key can not be resolved or the store fails.
    pub fn set(
        &self,
        value: S::Value,
        expire: Option<Duration>,
        args: &KeyArgs,
    ) -> StoreResult<bool, S> {
        self.set_in(&*self.store()?, value, expire, args)
    }

    /// # Errors
    ///
    /// Returns an [`Error`] if the key can not be resolved or the store fails.
    pub fn delete(&self, args: &KeyArgs) -> StoreResult<u64, S> {
        let key = self.key(false, args)?;
        self.store()?.delete(&key).map_err(Error::store)
    }

    /// Lazily iterates over the keys matching `args`, with unsupplied fields
    /// filled by the wildcard.
    ///
    /// Every call starts a new scan. Keys come in whatever order the store
    /// yields them.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the pattern can not be built or no store is connected.
    pub fn scan_keys(&self, args: &KeyArgs) -> StoreResult<ScanKeys<S>, S> {
        let pattern = self.key(true, args)?;
        Ok(ScanKeys::new(self.store()?, pattern, self.scan_count))
    }

    /// Like [`scan_keys`](Self::scan_keys), fetching each key's value with a
    /// separate `get`.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the pattern can not be built or no store is connected.
    pub fn scan_values(
        &self,
        args: &KeyArgs,
    ) -> StoreResult<impl Iterator<Item = StoreResult<Option<S::Value>, S>> + use<S>, S> {
        Ok(self
            .scan_items(args)?
            .map(|item| item.map(|(_, value)| value)))
    }

    /// Like [`scan_keys`](Self::scan_keys), pairing each key with its value.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the pattern can not be built or no store is connected.
    pub fn scan_items(
        &self,
        args: &KeyArgs,
    ) -> StoreResult<impl Iterator<Item = StoreResult<(String, Option<S::Value>), S>> + use<S>, S>
    {
        let keys = self.scan_keys(args)?;
        let store = Arc::clone(keys.store());
        Ok(keys.map(move |key| -> StoreResult<(String, Option<S::Value>), S> {
            let key = key?;
            let value = store.get(&key).map_err(Error::store)?;
            Ok((key, value))
        }))
    }

    pub(crate) fn get_in(&self, store: &S, args: &KeyArgs) -> StoreResult<Option<S::Value>, S> {
        let key = self.key(false, args)?;
        store.get(&key).map_err(Error::store)
    }

    pub(crate) fn set_in(
        &self,
        store: &S,
        value: S::Value,
        expire: Option<Duration>,
        args: &KeyArgs,
    ) -> StoreResult<bool, S> {
        let key = self.key(false, args)?;
        store.set(&key, value, expire).map_err(Error::store)
    }
}

/// A pull-based scan over the keys matching a pattern.
///
/// Each time the buffered page runs dry, one more `scan` call is issued.
pub struct ScanKeys<S: Store> {
    store: Arc<S>,
    pattern: String,
    count: usize,
    cursor: Option<String>,
    buffer: VecDeque<String>,
    finished: bool,
}

impl<S: Store> ScanKeys<S> {
    pub(crate) fn new(store: Arc<S>, pattern: String, count: usize) -> Self {
        Self {
            store,
            pattern,
            count,
            cursor: None,
            buffer: VecDeque::new(),
            finished: false,
        }
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: Store> Iterator for ScanKeys<S> {
    type Item = StoreResult<String, S>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(key) = self.buffer.pop_front() {
                return Some(Ok(key));
            }
            if self.finished {
                return None;
            }

            let page = match self
                .store
                .scan(&self.pattern, self.cursor.as_deref(), self.count)
            {
                Ok(page) => page,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(Error::store(e)));
                }
            };
            trace!(pattern = %self.pattern, keys = page.keys.len(), "scanned page");

            self.buffer.extend(page.keys);
            match page.cursor {
                Some(cursor) => self.cursor = Some(cursor),
                None => self.finished = true,
            }
        }
    }
}
