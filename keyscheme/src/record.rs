use core::fmt::{self, Display};
use core::ops::Index;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::accessor::{KeyedAccessor, ScanKeys, StoreResult, StoreSlot};
use crate::errors::{Error, SchemaError};
use crate::part::KeyPart;
use crate::pipeline::{Command, Pipeline, Reply};
use crate::scheme::{KeyArgs, KeyScheme};
use crate::traits::Store;

/// How the members of a record declaration are addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationMode {
    /// Named key schemes; key arguments are given per scheme or shared.
    Structured,
    /// Bare key parts, each its own unnamed scheme addressed by the part name.
    Flat,
}

impl DeclarationMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Flat => "flat",
        }
    }
}

/// Builder for a [`RecordType`].
///
/// The first declaration error is kept and reported by [`build`](Self::build).
pub struct RecordDeclaration<S> {
    prefix: String,
    mode: DeclarationMode,
    members: Vec<(String, KeyScheme)>,
    store: Option<Arc<S>>,
    error: Option<SchemaError>,
}

impl<S: Store> RecordDeclaration<S> {
    fn new(prefix: impl Into<String>, mode: DeclarationMode) -> Self {
        Self {
            prefix: prefix.into(),
            mode,
            members: Vec::new(),
            store: None,
            error: None,
        }
    }

    /// Adds a named scheme. Only valid for [`DeclarationMode::Structured`].
    #[must_use]
    pub fn scheme(mut self, name: impl Into<String>, scheme: KeyScheme) -> Self {
        let name = name.into();
        let mode = self.mode;
        if mode != DeclarationMode::Structured {
            return self.fail(SchemaError::MixedDeclaration {
                mode: mode.as_str(),
                found: "a key scheme",
            });
        }
        if name.is_empty() {
            return self.fail(SchemaError::UnnamedScheme);
        }
        let scheme = scheme.named(name.clone());
        self.members.push((name, scheme));
        self
    }

    /// Adds a bare part as its own scheme. Only valid for [`DeclarationMode::Flat`].
    #[must_use]
    pub fn part(mut self, part: KeyPart) -> Self {
        let mode = self.mode;
        if mode != DeclarationMode::Flat {
            return self.fail(SchemaError::MixedDeclaration {
                mode: mode.as_str(),
                found: "a bare key part",
            });
        }
        if part.name().is_empty() {
            return self.fail(SchemaError::UnnamedFlatPart);
        }
        let name = part.name().to_owned();
        match KeyScheme::new([part]) {
            Ok(scheme) => self.members.push((name, scheme)),
            Err(e) => return self.fail(e),
        }
        self
    }

    /// Sets the default store shared by every accessor of the record type.
    #[must_use]
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    fn fail(mut self, error: SchemaError) -> Self {
        self.error.get_or_insert(error);
        self
    }

    /// # Errors
    ///
    /// Returns the first [`SchemaError`] hit while declaring, or
    /// [`SchemaError::NoSchemes`] / [`SchemaError::DuplicateScheme`].
    pub fn build(self) -> Result<RecordType<S>, SchemaError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.members.is_empty() {
            return Err(SchemaError::NoSchemes);
        }
        for (i, (name, _)) in self.members.iter().enumerate() {
            if self.members[..i].iter().any(|(n, _)| n == name) {
                return Err(SchemaError::DuplicateScheme(name.clone()));
            }
        }

        let default = match self.store {
            Some(store) => StoreSlot::with_store(store),
            None => StoreSlot::new(),
        };
        let accessors = self
            .members
            .into_iter()
            .map(|(name, scheme)| {
                let accessor = KeyedAccessor::with_slot(self.prefix.clone(), scheme, default.clone());
                (name, accessor)
            })
            .collect();

        Ok(RecordType {
            prefix: self.prefix,
            mode: self.mode,
            accessors,
            default,
        })
    }
}

/// A declared logical entity: one or more key schemes under a common prefix.
///
/// Built once at startup with [`RecordType::structured`] or
/// [`RecordType::flat`]; instances are created with [`RecordType::record`].
pub struct RecordType<S> {
    prefix: String,
    mode: DeclarationMode,
    accessors: Vec<(String, KeyedAccessor<S>)>,
    default: StoreSlot<S>,
}

impl<S: Store> RecordType<S> {
    #[must_use]
    pub fn builder(prefix: impl Into<String>, mode: DeclarationMode) -> RecordDeclaration<S> {
        RecordDeclaration::new(prefix, mode)
    }

    /// Starts a declaration made of named schemes.
    #[must_use]
    pub fn structured(prefix: impl Into<String>) -> RecordDeclaration<S> {
        Self::builder(prefix, DeclarationMode::Structured)
    }

    /// Starts a declaration made of bare parts in a flat namespace.
    #[must_use]
    pub fn flat(prefix: impl Into<String>) -> RecordDeclaration<S> {
        Self::builder(prefix, DeclarationMode::Flat)
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn mode(&self) -> DeclarationMode {
        self.mode
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.mode == DeclarationMode::Flat
    }

    /// Scheme names in declaration order.
    pub fn scheme_names(&self) -> impl Iterator<Item = &str> {
        self.accessors.iter().map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn accessor(&self, name: &str) -> Option<&KeyedAccessor<S>> {
        self.accessors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, accessor)| accessor)
    }

    pub fn accessors(&self) -> impl Iterator<Item = (&str, &KeyedAccessor<S>)> {
        self.accessors
            .iter()
            .map(|(name, accessor)| (name.as_str(), accessor))
    }

    /// Replaces the default store seen by every accessor without an override.
    pub fn connect_default(&self, store: Arc<S>) {
        self.default.set(store);
    }

    #[must_use]
    pub fn default_store(&self) -> Option<Arc<S>> {
        self.default.get()
    }

    /// Installs `store` as the override of every accessor.
    pub fn connect(&self, store: &Arc<S>) {
        for (_, accessor) in &self.accessors {
            accessor.connect(Arc::clone(store));
        }
    }

    /// Drops the overrides of every accessor.
    pub fn disconnect(&self) {
        for (_, accessor) in &self.accessors {
            accessor.disconnect();
        }
    }

    /// Starts building an instance.
    #[must_use]
    pub fn record(&self) -> RecordInit<'_, S> {
        RecordInit {
            kind: self,
            keys: RecordKeys::default(),
            value: None,
            expire: None,
            database: None,
        }
    }

    /// Reads the record stored under `keys`.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if a key can not be resolved or the store fails.
    pub fn load(&self, keys: impl Into<RecordKeys>) -> StoreResult<Record<'_, S>, S> {
        self.record().keys(keys).execute()
    }

    /// Writes `value` under `keys`.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if a key or value component is missing or the store fails.
    pub fn save(
        &self,
        value: Payload<S::Value>,
        keys: impl Into<RecordKeys>,
    ) -> StoreResult<Record<'_, S>, S> {
        self.record().keys(keys).payload(value).execute()
    }

    /// Lazily yields every key of every scheme, scheme by scheme in
    /// declaration order.
    pub fn iter_keys(&self) -> RecordKeyIter<'_, S> {
        RecordKeyIter {
            accessors: self.accessors.iter(),
            current: None,
        }
    }

    /// Deletes every key matched by any scheme's full-wildcard scan.
    ///
    /// There is no confirmation or dry run. Returns the number of keys removed.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if no store is connected or the store fails.
    pub fn empty(&self) -> StoreResult<u64, S> {
        let mut deleted = 0;
        for (_, accessor) in &self.accessors {
            let scan = accessor.scan_keys(&KeyArgs::new())?;
            let store = Arc::clone(scan.store());
            for key in scan {
                deleted += store.delete(&key?).map_err(Error::store)?;
            }
        }
        debug!(prefix = %self.prefix, deleted, "emptied record keyspace");
        Ok(deleted)
    }

    fn patterns(&self) -> Vec<String> {
        self.accessors
            .iter()
            .map(|(_, accessor)| accessor.key(true, &KeyArgs::new()).unwrap_or_default())
            .collect()
    }
}

impl<S: Store> Index<&str> for RecordType<S> {
    type Output = KeyedAccessor<S>;

    fn index(&self, name: &str) -> &Self::Output {
        match self.accessor(name) {
            Some(accessor) => accessor,
            None => panic!("no scheme named `{name}` in record `{}`", self.prefix),
        }
    }
}

/// Iterator returned by [`RecordType::iter_keys`].
pub struct RecordKeyIter<'t, S: Store> {
    accessors: core::slice::Iter<'t, (String, KeyedAccessor<S>)>,
    current: Option<ScanKeys<S>>,
}

impl<S: Store> Iterator for RecordKeyIter<'_, S> {
    type Item = StoreResult<String, S>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(scan) = &mut self.current {
                if let Some(item) = scan.next() {
                    return Some(item);
                }
                self.current = None;
            }

            let (_, accessor) = self.accessors.next()?;
            match accessor.scan_keys(&KeyArgs::new()) {
                Ok(scan) => self.current = Some(scan),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Key arguments for a record instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKeys {
    /// One set of named values. Flat records pick each scheme's value by the
    /// scheme name; structured records give each scheme the names it declares.
    Fields(KeyArgs),
    /// A separate set of arguments per scheme name.
    Schemes(BTreeMap<String, KeyArgs>),
}

impl RecordKeys {
    /// Builds per-scheme arguments from `(scheme name, arguments)` pairs.
    pub fn schemes<N: Into<String>>(groups: impl IntoIterator<Item = (N, KeyArgs)>) -> Self {
        Self::Schemes(
            groups
                .into_iter()
                .map(|(name, args)| (name.into(), args))
                .collect(),
        )
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Fields(args) => args.is_empty(),
            Self::Schemes(groups) => groups.is_empty(),
        }
    }

    fn for_scheme(&self, name: &str, scheme: &KeyScheme, mode: DeclarationMode) -> Option<KeyArgs> {
        match (self, mode) {
            (Self::Fields(args), DeclarationMode::Flat) => {
                args.contains(name).then(|| args.restricted_to([name]))
            }
            (Self::Fields(args), DeclarationMode::Structured) => {
                Some(args.restricted_to(scheme.field_names()))
            }
            (Self::Schemes(groups), _) => groups.get(name).cloned(),
        }
    }
}

impl Default for RecordKeys {
    fn default() -> Self {
        Self::Fields(KeyArgs::new())
    }
}

impl From<KeyArgs> for RecordKeys {
    fn from(args: KeyArgs) -> Self {
        Self::Fields(args)
    }
}

/// The value written by a record instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<V> {
    /// The value of a single-scheme record.
    Single(V),
    /// One value per scheme name.
    Fields(BTreeMap<String, V>),
}

impl<V> Payload<V> {
    /// Builds a per-scheme payload from `(scheme name, value)` pairs.
    pub fn fields<N: Into<String>>(values: impl IntoIterator<Item = (N, V)>) -> Self {
        Self::Fields(
            values
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }
}

/// The result of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<V> {
    Single(Option<V>),
    Fields(BTreeMap<String, Option<V>>),
}

impl<V> Fetched<V> {
    /// The value of a single-scheme read.
    #[must_use]
    pub fn single(&self) -> Option<&V> {
        match self {
            Self::Single(value) => value.as_ref(),
            Self::Fields(_) => None,
        }
    }

    /// The value read for scheme `name` in a multi-scheme read.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&V> {
        match self {
            Self::Fields(values) => values.get(name).and_then(Option::as_ref),
            Self::Single(_) => None,
        }
    }
}

/// Builder for a [`Record`] instance. Nothing touches the store until
/// [`execute`](Self::execute).
pub struct RecordInit<'t, S: Store> {
    kind: &'t RecordType<S>,
    keys: RecordKeys,
    value: Option<Payload<S::Value>>,
    expire: Option<Duration>,
    database: Option<Arc<S>>,
}

impl<'t, S: Store> RecordInit<'t, S> {
    #[must_use]
    pub fn keys(mut self, keys: impl Into<RecordKeys>) -> Self {
        self.keys = keys.into();
        self
    }

    /// Sets the value of a single-scheme record.
    #[must_use]
    pub fn value(self, value: S::Value) -> Self {
        self.payload(Payload::Single(value))
    }

    /// Sets one value per scheme name.
    #[must_use]
    pub fn values<N: Into<String>>(self, values: impl IntoIterator<Item = (N, S::Value)>) -> Self {
        self.payload(Payload::fields(values))
    }

    #[must_use]
    pub fn payload(mut self, value: Payload<S::Value>) -> Self {
        self.value = Some(value);
        self
    }

    /// Expires written keys after `expire`.
    #[must_use]
    pub fn expire(mut self, expire: Duration) -> Self {
        self.expire = Some(expire);
        self
    }

    /// Uses `store` for this instance only, leaving the accessors untouched.
    #[must_use]
    pub fn database(mut self, store: Arc<S>) -> Self {
        self.database = Some(store);
        self
    }

    /// Builds the instance, writing if a value was given and reading otherwise.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if a key or value component is missing or the store fails.
    pub fn execute(self) -> StoreResult<Record<'t, S>, S> {
        let mut record = Record {
            kind: self.kind,
            keys: self.keys,
            database: self.database,
            written: false,
            fetched: None,
        };
        record.run(self.value, self.expire)?;
        Ok(record)
    }
}

/// An instance of a [`RecordType`], bound to its key arguments.
///
/// The store is queried once, while the instance is built. A later
/// [`call`](Self::call) replays the cached read, or reads for the first time
/// if the instance was built by a write.
pub struct Record<'t, S: Store> {
    kind: &'t RecordType<S>,
    keys: RecordKeys,
    database: Option<Arc<S>>,
    written: bool,
    /// `None` until the first read.
    fetched: Option<Fetched<S::Value>>,
}

impl<'t, S: Store> Record<'t, S> {
    #[must_use]
    pub fn kind(&self) -> &'t RecordType<S> {
        self.kind
    }

    #[must_use]
    pub fn keys(&self) -> &RecordKeys {
        &self.keys
    }

    /// Returns true if the write issued at construction was acknowledged.
    #[must_use]
    pub fn written(&self) -> bool {
        self.written
    }

    /// The cached read, if one has been made.
    #[must_use]
    pub fn fetched(&self) -> Option<&Fetched<S::Value>> {
        self.fetched.as_ref()
    }

    /// Returns the cached read, reading with the original key arguments first
    /// if nothing has been read yet.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if a key can not be resolved or the store fails.
    pub fn call(&mut self) -> StoreResult<&Fetched<S::Value>, S> {
        let fetched = match self.fetched.take() {
            Some(fetched) => fetched,
            None => self.read()?,
        };
        Ok(self.fetched.insert(fetched))
    }

    fn run(&mut self, value: Option<Payload<S::Value>>, expire: Option<Duration>) -> StoreResult<(), S> {
        if self.kind.accessors.len() > 1 && self.keys.is_empty() {
            return Ok(());
        }
        match value {
            Some(value) => self.written = self.write(value, expire)?,
            None => self.fetched = Some(self.read()?),
        }
        Ok(())
    }

    fn store_for(&self, accessor: &KeyedAccessor<S>) -> StoreResult<Arc<S>, S> {
        match &self.database {
            Some(store) => Ok(Arc::clone(store)),
            None => accessor.store(),
        }
    }

    /// Resolves every scheme's key and store before anything is queued.
    fn resolve_targets(&self) -> StoreResult<Vec<Target<'t, S>>, S> {
        let kind = self.kind;
        kind.accessors
            .iter()
            .map(|(name, accessor)| -> StoreResult<Target<'t, S>, S> {
                let args = self
                    .keys
                    .for_scheme(name, accessor.scheme(), kind.mode)
                    .ok_or_else(|| Error::MissingComponent(name.clone()))?;
                Ok(Target {
                    name: name.as_str(),
                    key: accessor.key(false, &args)?,
                    store: self.store_for(accessor)?,
                })
            })
            .collect()
    }

    fn single_args(&self, name: &str) -> StoreResult<KeyArgs, S> {
        match &self.keys {
            RecordKeys::Fields(args) => Ok(args.clone()),
            RecordKeys::Schemes(groups) => groups
                .get(name)
                .cloned()
                .ok_or_else(|| Error::MissingComponent(name.to_owned())),
        }
    }

    fn write(&self, value: Payload<S::Value>, expire: Option<Duration>) -> StoreResult<bool, S> {
        if let [(name, accessor)] = self.kind.accessors.as_slice() {
            let value = match value {
                Payload::Single(value) => value,
                Payload::Fields(mut values) => values
                    .remove(name)
                    .ok_or_else(|| Error::MissingComponent(name.clone()))?,
            };
            let store = self.store_for(accessor)?;
            return accessor.set_in(&store, value, expire, &self.single_args(name)?);
        }

        let targets = self.resolve_targets()?;
        let mut values = match value {
            Payload::Fields(values) => values,
            Payload::Single(_) => {
                return Err(Error::MissingComponent(targets[0].name.to_owned()));
            }
        };
        let commands = targets
            .into_iter()
            .map(|target| match values.remove(target.name) {
                Some(value) => Ok((
                    target.store,
                    Command::Set {
                        key: target.key,
                        value,
                        expire,
                    },
                )),
                None => Err(Error::MissingComponent(target.name.to_owned())),
            })
            .collect::<StoreResult<Vec<_>, S>>()?;

        let expected = commands.len();
        let replies = self.submit(commands)?;
        Ok(replies.len() == expected && replies.iter().all(Reply::is_success))
    }

    fn read(&self) -> StoreResult<Fetched<S::Value>, S> {
        if let [(name, accessor)] = self.kind.accessors.as_slice() {
            let store = self.store_for(accessor)?;
            let value = accessor.get_in(&store, &self.single_args(name)?)?;
            return Ok(Fetched::Single(value));
        }

        let targets = self.resolve_targets()?;
        let names: Vec<&str> = targets.iter().map(|target| target.name).collect();
        let commands = targets
            .into_iter()
            .map(|target| (target.store, Command::Get { key: target.key }))
            .collect();
        let mut replies = self.submit(commands)?.into_iter();
        let values = names
            .into_iter()
            .map(|name| {
                let value = replies.next().and_then(Reply::into_value);
                (name.to_owned(), value)
            })
            .collect();
        Ok(Fetched::Fields(values))
    }

    /// Sends one pipeline to each distinct store and returns the replies in
    /// the order the commands were given.
    fn submit(
        &self,
        commands: Vec<(Arc<S>, Command<S::Value>)>,
    ) -> StoreResult<Vec<Reply<S::Value>>, S> {
        let mut groups: Vec<(Arc<S>, Pipeline<S::Value>, Vec<usize>)> = Vec::new();
        for (position, (store, command)) in commands.into_iter().enumerate() {
            let index = match groups.iter().position(|(s, ..)| Arc::ptr_eq(s, &store)) {
                Some(index) => index,
                None => {
                    groups.push((store, Pipeline::new(), Vec::new()));
                    groups.len() - 1
                }
            };
            let (_, pipeline, positions) = &mut groups[index];
            pipeline.push(command);
            positions.push(position);
        }

        let mut replies = Vec::new();
        for (store, pipeline, positions) in groups {
            debug!(prefix = %self.kind.prefix, commands = pipeline.len(), "executing pipeline");
            let answered = store.execute(pipeline).map_err(Error::store)?;
            replies.extend(positions.into_iter().zip(answered));
        }
        replies.sort_by_key(|(position, _)| *position);
        Ok(replies.into_iter().map(|(_, reply)| reply).collect())
    }
}

/// One scheme's resolved key and the store it is sent to.
struct Target<'t, S> {
    name: &'t str,
    key: String,
    store: Arc<S>,
}

impl<S: Store> Display for Record<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Record({}) set: {} get: {}>",
            self.kind.patterns().join(", "),
            self.written,
            self.fetched.is_some()
        )
    }
}

#[cfg(all(test, feature = "memory-storage"))]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn scheme(name: &str) -> KeyScheme {
        KeyScheme::new([KeyPart::string(name)]).unwrap()
    }

    #[test]
    fn declarations_are_validated() {
        let empty = RecordType::<MemoryStore>::structured("x:").build();
        assert!(matches!(empty, Err(SchemaError::NoSchemes)));

        let mixed = RecordType::<MemoryStore>::structured("x:")
            .scheme("a", scheme("id"))
            .part(KeyPart::string("job"))
            .build();
        assert!(matches!(
            mixed,
            Err(SchemaError::MixedDeclaration { mode: "structured", .. })
        ));

        let duplicate = RecordType::<MemoryStore>::structured("x:")
            .scheme("a", scheme("id"))
            .scheme("a", scheme("other"))
            .build();
        assert!(matches!(duplicate, Err(SchemaError::DuplicateScheme(ref n)) if n == "a"));

        let unnamed = RecordType::<MemoryStore>::flat("x:")
            .part(KeyPart::int(""))
            .build();
        assert!(matches!(unnamed, Err(SchemaError::UnnamedFlatPart)));

        let unnamed = RecordType::<MemoryStore>::structured("x:")
            .scheme("", scheme("id"))
            .build();
        assert!(matches!(unnamed, Err(SchemaError::UnnamedScheme)));
    }

    #[test]
    fn flat_parts_become_unnamed_schemes() {
        let rq = RecordType::<MemoryStore>::flat("rq:")
            .part(KeyPart::string("job"))
            .part(KeyPart::string("queue"))
            .build()
            .unwrap();

        assert!(rq.is_flat());
        assert_eq!(rq.scheme_names().collect::<Vec<_>>(), ["job", "queue"]);
        assert_eq!(rq["queue"].scheme().name(), None);
        assert_eq!(rq["job"].key(true, &KeyArgs::new()).unwrap(), "rq:job:*");
        assert!(rq.accessor("missing").is_none());
    }

    #[test]
    fn shared_fields_are_split_by_mode() {
        let args = crate::key_args!(user = 1, job = 2);
        let keys = RecordKeys::from(args);

        let both = KeyScheme::new([KeyPart::int("user"), KeyPart::int("job")]).unwrap();
        assert_eq!(
            keys.for_scheme("percentage", &both, DeclarationMode::Structured),
            Some(crate::key_args!(user = 1, job = 2))
        );
        assert_eq!(
            keys.for_scheme("job", &scheme("job"), DeclarationMode::Flat),
            Some(crate::key_args!(job = 2))
        );
        assert_eq!(keys.for_scheme("queue", &scheme("queue"), DeclarationMode::Flat), None);
    }
}
