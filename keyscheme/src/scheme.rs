use std::collections::{BTreeMap, btree_map};

use serde::{Deserialize, Serialize};

use crate::config::SchemeDef;
use crate::errors::{KeyError, MissingFieldError, SchemaError};
use crate::part::{KeyPart, PartValue};

/// Delimiter placed between the tokens of a composite key.
pub const DELIMITER: char = ':';

/// Named part values used to resolve a key.
///
/// Usually built with the [`key_args!`](crate::key_args) macro.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyArgs(BTreeMap<String, PartValue>);

impl KeyArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value and returns the arguments, for chaining.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PartValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PartValue>,
    ) -> Option<PartValue> {
        self.0.insert(name.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PartValue> {
        self.0.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, PartValue> {
        self.0.iter()
    }

    /// Keeps only the arguments whose names are in `names`.
    #[must_use]
    pub fn restricted_to<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut args = Self::new();
        for name in names {
            if let Some(value) = self.0.get(name) {
                args.0.insert(name.to_owned(), value.clone());
            }
        }
        args
    }
}

impl<K: Into<String>, V: Into<PartValue>> FromIterator<(K, V)> for KeyArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a KeyArgs {
    type Item = (&'a String, &'a PartValue);
    type IntoIter = btree_map::Iter<'a, String, PartValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// An ordered composition of key parts defining one addressable keyspace.
///
/// Keys are the formatted parts joined with `:` in declaration order, followed
/// by `:<name>` when the scheme is named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemeDef", into = "SchemeDef")]
pub struct KeyScheme {
    name: Option<String>,
    parts: Vec<KeyPart>,
}

impl KeyScheme {
    /// Declares an unnamed scheme over `parts`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NoParts`] for an empty part list and
    /// [`SchemaError::DuplicatePart`] when two named parts collide.
    pub fn new(parts: impl IntoIterator<Item = KeyPart>) -> Result<Self, SchemaError> {
        let parts: Vec<KeyPart> = parts.into_iter().collect();
        if parts.is_empty() {
            return Err(SchemaError::NoParts);
        }
        for (i, part) in parts.iter().enumerate() {
            if !part.name().is_empty() && parts[..i].iter().any(|p| p.name() == part.name()) {
                return Err(SchemaError::DuplicatePart(part.name().to_owned()));
            }
        }
        Ok(Self { name: None, parts })
    }

    /// Sets the name appended as the key suffix.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = (!name.is_empty()).then_some(name);
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(KeyPart::name)
    }

    /// Builds the key for `args`.
    ///
    /// Without `wildcard_ok` every declared field must be supplied, and nothing
    /// else. With it, missing fields are filled with the wildcard and unknown
    /// names are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::MissingField`] listing every absent field,
    /// [`KeyError::UnexpectedField`] for names the scheme does not declare, and
    /// [`KeyError::Format`] if a value can not be rendered.
    pub fn get_key(&self, wildcard_ok: bool, args: &KeyArgs) -> Result<String, KeyError> {
        if !wildcard_ok {
            let missing: Vec<String> = self
                .field_names()
                .filter(|name| !args.contains(name))
                .map(str::to_owned)
                .collect();
            if !missing.is_empty() {
                return Err(MissingFieldError {
                    scheme: self.name.clone(),
                    missing,
                }
                .into());
            }
            if args.len() != self.parts.len() {
                let fields = args
                    .iter()
                    .map(|(name, _)| name)
                    .filter(|name| !self.field_names().any(|n| n == name.as_str()))
                    .cloned()
                    .collect();
                return Err(KeyError::UnexpectedField { fields });
            }
        }

        let mut key = String::new();
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                key.push(DELIMITER);
            }
            let token = match args.get(part.name()) {
                Some(value) => part.format(value)?,
                None => part.wildcard_token().to_owned(),
            };
            key.push_str(&token);
        }
        if let Some(name) = &self.name {
            key.push(DELIMITER);
            key.push_str(name);
        }
        Ok(key)
    }

    /// Builds a scan pattern, filling unsupplied fields with the wildcard.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Format`] if a supplied value can not be rendered.
    pub fn pattern(&self, args: &KeyArgs) -> Result<String, KeyError> {
        self.get_key(true, args)
    }
}

impl TryFrom<SchemeDef> for KeyScheme {
    type Error = SchemaError;

    fn try_from(def: SchemeDef) -> Result<Self, Self::Error> {
        let scheme = KeyScheme::new(def.parts)?;
        Ok(match def.name {
            Some(name) => scheme.named(name),
            None => scheme,
        })
    }
}

impl From<KeyScheme> for SchemeDef {
    fn from(scheme: KeyScheme) -> Self {
        SchemeDef {
            name: scheme.name,
            parts: scheme.parts,
        }
    }
}
