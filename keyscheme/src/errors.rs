use core::error::Error as StdError;

use thiserror::Error;

use crate::PartKind;

/// Errors raised while declaring parts, schemes and records.
///
/// These are fatal: a declaration that fails here can never produce valid keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A scheme was declared without any key parts.
    #[error("scheme must contain at least one key part")]
    NoParts,
    /// A record was declared without any schemes or parts.
    #[error("no key parts specified")]
    NoSchemes,
    /// Two parts of one scheme share a name.
    #[error("key part `{0}` is declared more than once")]
    DuplicatePart(String),
    /// Two schemes of one record share a name.
    #[error("scheme `{0}` is declared more than once")]
    DuplicateScheme(String),
    /// Structured records address their schemes by name.
    #[error("structured record schemes must be named")]
    UnnamedScheme,
    /// A bare part was added to a structured record, or a scheme to a flat one.
    #[error("cannot add {found} to a {mode} record declaration")]
    MixedDeclaration {
        mode: &'static str,
        found: &'static str,
    },
    /// Flat records address their parts by name, so every part needs one.
    #[error("flat record parts must be named")]
    UnnamedFlatPart,
    /// A fixed width of zero can not hold any value.
    #[error("key part `{0}` declares a zero width")]
    ZeroWidth(String),
}

/// A value that the part's template can not render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("could not format key '{field}' value '{value}'. expected {expected} value")]
    Type {
        field: String,
        value: String,
        expected: PartKind,
    },
    /// Values never get truncated to fit a fixed width.
    #[error("could not format key '{field}' value '{value}'. it does not fit in {width} characters")]
    Overflow {
        field: String,
        value: String,
        width: usize,
    },
}

/// A non-wildcard key was requested without all of its fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("all {} key parts must be supplied: missing {}", scheme_label(.scheme), comma_list(.missing))]
pub struct MissingFieldError {
    pub scheme: Option<String>,
    pub missing: Vec<String>,
}

/// Errors produced while resolving a key from its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    MissingField(#[from] MissingFieldError),
    #[error("unexpected key parts supplied: {}", comma_list(.fields))]
    UnexpectedField { fields: Vec<String> },
}

/// Errors that can occur while reading or writing through accessors and records.
///
/// Store errors are passed through untouched; nothing here is retried.
#[derive(Debug, Error)]
pub enum Error<E: StdError + 'static> {
    /// The key could not be built from the supplied arguments.
    #[error(transparent)]
    Key(#[from] KeyError),
    /// The underlying store reported an error.
    #[error("store error: {0}")]
    Store(#[source] E),
    /// Neither an override nor a default store is available.
    #[error("no store connected")]
    NotConnected,
    /// A multi-scheme operation is missing the keys or value for a scheme.
    #[error("missing component for scheme `{0}`")]
    MissingComponent(String),
}

impl<E: StdError + 'static> Error<E> {
    pub(crate) fn store(e: E) -> Self {
        Error::Store(e)
    }
}

fn scheme_label(scheme: &Option<String>) -> &str {
    scheme.as_deref().unwrap_or("scheme")
}

fn comma_list(names: &[String]) -> String {
    names.join(", ")
}
