use core::fmt::{self, Display};
use core::num::TryFromIntError;

use serde::{Deserialize, Serialize};

use crate::config::PartDef;
use crate::errors::{FormatError, SchemaError};

/// The sentinel accepted in place of any part value when building scan patterns.
pub const WILDCARD: &str = "*";

/// The type a key part renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartKind {
    Int,
    Str,
}

impl Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "an integer"),
            Self::Str => write!(f, "a string"),
        }
    }
}

/// A value supplied for one key part.
///
/// A [`PartValue::Str`] holding exactly `"*"` is treated the same as
/// [`PartValue::Wildcard`]. Integers are held as `i64`: narrower types convert
/// with `From`, wider ones (`u64`, `usize`, `i128`, ...) with `TryFrom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartValue {
    Int(i64),
    Str(String),
    Wildcard,
}

impl PartValue {
    /// Returns true if this value stands for "any value" in a scan pattern.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Str(s) => s == WILDCARD,
            Self::Int(_) => false,
        }
    }
}

impl Display for PartValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Wildcard => f.write_str(WILDCARD),
        }
    }
}

macro_rules! part_value_from_int {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for PartValue {
                fn from(value: $ty) -> Self {
                    PartValue::Int(i64::from(value))
                }
            }
        )+
    };
}

part_value_from_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! part_value_try_from_int {
    ($($ty:ty),+) => {
        $(
            impl TryFrom<$ty> for PartValue {
                type Error = TryFromIntError;

                fn try_from(value: $ty) -> Result<Self, Self::Error> {
                    i64::try_from(value).map(PartValue::Int)
                }
            }
        )+
    };
}

// Wider integers convert only when they fit in an `i64`:
// `key_args!(id = PartValue::try_from(len)?)`.
part_value_try_from_int!(u64, usize, isize, i128, u128);

impl From<&str> for PartValue {
    fn from(value: &str) -> Self {
        PartValue::Str(value.to_owned())
    }
}

impl From<String> for PartValue {
    fn from(value: String) -> Self {
        PartValue::Str(value)
    }
}

impl From<&String> for PartValue {
    fn from(value: &String) -> Self {
        PartValue::Str(value.clone())
    }
}

/// One typed, formattable segment of a composite key.
///
/// The rendered token is `name:value` when the name is embedded, or the bare
/// value otherwise. Integers are zero-padded and strings left-justified when a
/// fixed width is declared. Both the name head and the wildcard token are
/// computed once, when the part is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PartDef", into = "PartDef")]
pub struct KeyPart {
    name: String,
    kind: PartKind,
    width: Option<usize>,
    include_name: bool,
    head: String,
    wildcard: String,
}

impl KeyPart {
    /// Declares an integer part.
    #[must_use]
    pub fn int(name: impl Into<String>) -> Self {
        Self::build(name.into(), PartKind::Int, None, true)
    }

    /// Declares a string part.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::build(name.into(), PartKind::Str, None, true)
    }

    /// Declares a part from its raw attributes.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::ZeroWidth`] if `width` is `Some(0)`.
    pub fn try_new(
        name: impl Into<String>,
        kind: PartKind,
        width: Option<usize>,
        include_name: bool,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if width == Some(0) {
            return Err(SchemaError::ZeroWidth(name));
        }
        Ok(Self::build(name, kind, width, include_name))
    }

    /// Fixes the rendered width of the value segment.
    ///
    /// A width of zero leaves the part variable-width.
    #[must_use]
    pub fn width(self, width: usize) -> Self {
        let width = (width > 0).then_some(width);
        Self::build(self.name, self.kind, width, self.include_name)
    }

    /// Renders the bare value without the `name:` head.
    #[must_use]
    pub fn without_name(self) -> Self {
        Self::build(self.name, self.kind, self.width, false)
    }

    fn build(name: String, kind: PartKind, width: Option<usize>, include_name: bool) -> Self {
        let head = if include_name && !name.is_empty() {
            format!("{name}:")
        } else {
            String::new()
        };
        let wildcard = format!("{head}{WILDCARD}");
        Self {
            name,
            kind,
            width,
            include_name,
            head,
            wildcard,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> PartKind {
        self.kind
    }

    #[must_use]
    pub fn fixed_width(&self) -> Option<usize> {
        self.width
    }

    #[must_use]
    pub fn includes_name(&self) -> bool {
        self.include_name
    }

    /// The token this part contributes to a scan pattern.
    #[must_use]
    pub fn wildcard_token(&self) -> &str {
        &self.wildcard
    }

    /// Renders `value` as this part's token.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Type`] if the value kind does not match the part,
    /// and [`FormatError::Overflow`] if the rendered value is wider than the
    /// declared width.
    pub fn format(&self, value: &PartValue) -> Result<String, FormatError> {
        if value.is_wildcard() {
            return Ok(self.wildcard.clone());
        }

        let rendered = match (self.kind, value) {
            (PartKind::Int, PartValue::Int(v)) => match self.width {
                Some(width) => format!("{v:0width$}"),
                None => v.to_string(),
            },
            (PartKind::Str, PartValue::Str(s)) => match self.width {
                Some(width) => format!("{s:<width$}"),
                None => s.clone(),
            },
            _ => {
                return Err(FormatError::Type {
                    field: self.name.clone(),
                    value: value.to_string(),
                    expected: self.kind,
                });
            }
        };

        if let Some(width) = self.width
            && rendered.chars().count() > width
        {
            return Err(FormatError::Overflow {
                field: self.name.clone(),
                value: value.to_string(),
                width,
            });
        }

        Ok(format!("{}{rendered}", self.head))
    }
}

impl TryFrom<PartDef> for KeyPart {
    type Error = SchemaError;

    fn try_from(def: PartDef) -> Result<Self, Self::Error> {
        KeyPart::try_new(def.name, def.kind, def.width, def.include_name)
    }
}

impl From<KeyPart> for PartDef {
    fn from(part: KeyPart) -> Self {
        PartDef {
            name: part.name,
            kind: part.kind,
            width: part.width,
            include_name: part.include_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_part_is_zero_padded() {
        let part = KeyPart::int("user").width(5);
        assert_eq!(part.format(&42.into()).unwrap(), "user:00042");
        assert_eq!(part.format(&(-42).into()).unwrap(), "user:-0042");
    }

    #[test]
    fn int_part_rejects_values_wider_than_width() {
        let part = KeyPart::int("user").width(5);
        let err = part.format(&123_456.into()).unwrap_err();
        assert_eq!(
            err,
            FormatError::Overflow {
                field: "user".into(),
                value: "123456".into(),
                width: 5,
            }
        );
    }

    #[test]
    fn string_part_is_left_justified() {
        let part = KeyPart::string("code").width(4);
        assert_eq!(part.format(&"ab".into()).unwrap(), "code:ab  ");
        assert!(matches!(
            part.format(&"abcde".into()),
            Err(FormatError::Overflow { width: 4, .. })
        ));
    }

    #[test]
    fn wildcard_keeps_name_head() {
        let named = KeyPart::string("job");
        let bare = KeyPart::int("job").width(3).without_name();
        assert_eq!(named.format(&PartValue::Wildcard).unwrap(), "job:*");
        assert_eq!(named.format(&"*".into()).unwrap(), "job:*");
        assert_eq!(bare.format(&PartValue::Wildcard).unwrap(), "*");
        assert_eq!(bare.format(&7.into()).unwrap(), "007");
    }

    #[test]
    fn unnamed_part_has_no_head() {
        let part = KeyPart::string("");
        assert_eq!(part.format(&"x".into()).unwrap(), "x");
        assert_eq!(part.wildcard_token(), "*");
    }

    #[test]
    fn mismatched_kind_names_field_and_value() {
        let err = KeyPart::int("job").format(&"abc".into()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "could not format key 'job' value 'abc'. expected an integer value"
        );
        assert!(KeyPart::string("queue").format(&123.into()).is_err());
    }

    #[test]
    fn wide_integers_convert_when_they_fit() {
        assert_eq!(PartValue::try_from(42usize), Ok(PartValue::Int(42)));
        assert_eq!(PartValue::try_from(-7i128), Ok(PartValue::Int(-7)));
        assert!(PartValue::try_from(u64::MAX).is_err());

        let part = KeyPart::int("user").width(5);
        let value = PartValue::try_from(123u64).unwrap();
        assert_eq!(part.format(&value).unwrap(), "user:00123");
    }

    #[test]
    fn zero_width_is_a_schema_error() {
        assert_eq!(
            KeyPart::try_new("n", PartKind::Int, Some(0), true),
            Err(SchemaError::ZeroWidth("n".into()))
        );
    }
}
