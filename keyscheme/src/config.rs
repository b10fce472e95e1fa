//! Serializable record declarations.
//!
//! Lets record types be described in configuration (JSON, TOML, ...) instead
//! of code. [`KeyPart`] and [`KeyScheme`] serialize through [`PartDef`] and
//! [`SchemeDef`], and are validated while deserializing.
//!
//! ```
//! use keyscheme::config::RecordDef;
//! use keyscheme::{DeclarationMode, KeyPart};
//!
//! let def: RecordDef = serde_json::from_str(r#"{
//!     "prefix": "rq:",
//!     "mode": "flat",
//!     "parts": [
//!         { "name": "job", "kind": "str" },
//!         { "name": "queue", "kind": "str" }
//!     ]
//! }"#).unwrap();
//! assert_eq!(def.mode, DeclarationMode::Flat);
//! assert_eq!(def.parts, [KeyPart::string("job"), KeyPart::string("queue")]);
//! ```

use serde::{Deserialize, Serialize};

use crate::part::{KeyPart, PartKind};
use crate::record::{DeclarationMode, RecordDeclaration, RecordType};
use crate::scheme::KeyScheme;
use crate::traits::Store;

fn default_include_name() -> bool {
    true
}

/// Raw attributes of a [`KeyPart`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDef {
    pub name: String,
    pub kind: PartKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<usize>,
    #[serde(default = "default_include_name")]
    pub include_name: bool,
}

/// Raw attributes of a [`KeyScheme`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub parts: Vec<KeyPart>,
}

/// A whole record declaration.
///
/// Structured records list named `schemes`; flat records list bare `parts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDef {
    #[serde(default)]
    pub prefix: String,
    pub mode: DeclarationMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schemes: Vec<KeyScheme>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<KeyPart>,
}

impl RecordDef {
    /// Replays the definition onto a [`RecordDeclaration`].
    ///
    /// Declaration errors surface from [`RecordDeclaration::build`].
    #[must_use]
    pub fn declare<S: Store>(self) -> RecordDeclaration<S> {
        let mut declaration = RecordType::builder(self.prefix, self.mode);
        for scheme in self.schemes {
            let name = scheme.name().unwrap_or_default().to_owned();
            declaration = declaration.scheme(name, scheme);
        }
        for part in self.parts {
            declaration = declaration.part(part);
        }
        declaration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(feature = "memory-storage")]
    use crate::{MemoryStore, SchemaError};

    #[cfg(feature = "memory-storage")]
    #[test]
    fn structured_definition_builds_named_schemes() {
        let def: RecordDef = serde_json::from_str(
            r#"{
                "prefix": "progress:",
                "mode": "structured",
                "schemes": [
                    { "name": "percentage", "parts": [
                        { "name": "user", "kind": "int", "width": 5 },
                        { "name": "job", "kind": "int", "width": 5 }
                    ]},
                    { "name": "njobs", "parts": [
                        { "name": "user", "kind": "int", "width": 5 }
                    ]}
                ]
            }"#,
        )
        .unwrap();

        let progress: RecordType<MemoryStore> = def.declare().build().unwrap();
        let names: Vec<_> = progress.scheme_names().collect();
        assert_eq!(names, ["percentage", "njobs"]);
        assert_eq!(
            progress["njobs"].key(true, &Default::default()).unwrap(),
            "progress:user:*:njobs"
        );
    }

    #[test]
    fn part_defaults_embed_the_name() {
        let part: KeyPart = serde_json::from_str(r#"{ "name": "job", "kind": "str" }"#).unwrap();
        assert_eq!(part, KeyPart::string("job"));

        let json = serde_json::to_value(KeyPart::int("user").width(5).without_name()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "name": "user", "kind": "int", "width": 5, "include_name": false })
        );
    }

    #[cfg(feature = "memory-storage")]
    #[test]
    fn invalid_definitions_are_rejected() {
        let zero_width =
            serde_json::from_str::<KeyPart>(r#"{ "name": "n", "kind": "int", "width": 0 }"#);
        assert!(zero_width.is_err());

        let empty = serde_json::from_str::<KeyScheme>(r#"{ "parts": [] }"#);
        assert!(empty.is_err());

        let def = RecordDef {
            prefix: "rq:".into(),
            mode: DeclarationMode::Flat,
            schemes: vec![KeyScheme::new([KeyPart::string("job")]).unwrap()],
            parts: vec![],
        };
        assert!(matches!(
            def.declare::<MemoryStore>().build(),
            Err(SchemaError::MixedDeclaration { mode: "flat", .. })
        ));
    }
}
