//! # keyscheme
//!
//! Declarative key construction and access for flat key-value stores.
//!
//! A record type is declared once from typed key parts. Every key the record
//! reads, writes or scans is then derived from that declaration, so code never
//! assembles key strings by hand.
//!
//! ## Features
//!
//! - Typed key parts with optional zero padding
//! - Wildcard patterns with lazy, cursor-based scans
//! - Multi-scheme records read and written in one pipeline
//! - Late binding of stores, per accessor or per record type
//!
//! ```
//! # #[cfg(feature = "memory-storage")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use keyscheme::{key_args, KeyPart, KeyScheme, MemoryStore, RecordType};
//!
//! let progress: RecordType<MemoryStore> = RecordType::structured("progress:")
//!     .scheme(
//!         "percentage",
//!         KeyScheme::new([KeyPart::int("user").width(5), KeyPart::int("job").width(5)])?,
//!     )
//!     .scheme("njobs", KeyScheme::new([KeyPart::int("user").width(5)])?)
//!     .store(Arc::new(MemoryStore::new()))
//!     .build()?;
//!
//! let key = progress["percentage"].key(false, &key_args!(user = 123, job = 456))?;
//! assert_eq!(key, "progress:user:00123:job:00456:percentage");
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "memory-storage"))]
//! # fn main() {}
//! ```

mod accessor;
pub mod config;
mod errors;
mod macros;
#[cfg(feature = "memory-storage")]
mod memory;
mod part;
pub mod pattern;
mod pipeline;
mod record;
mod scheme;
mod traits;

#[cfg(feature = "sled")]
mod integrations {
    pub mod sled;
}

pub use accessor::{DEFAULT_SCAN_COUNT, KeyedAccessor, ScanKeys, StoreSlot};
pub use errors::{Error, FormatError, KeyError, MissingFieldError, SchemaError};
#[cfg(feature = "memory-storage")]
pub use memory::{MemoryStore, MemoryStoreError};
pub use part::{KeyPart, PartKind, PartValue, WILDCARD};
pub use pipeline::{Command, Pipeline, Reply};
pub use record::{
    DeclarationMode, Fetched, Payload, Record, RecordDeclaration, RecordInit, RecordKeyIter,
    RecordKeys, RecordType,
};
pub use scheme::{DELIMITER, KeyArgs, KeyScheme};
pub use traits::*;

#[cfg(feature = "sled")]
pub use integrations::sled::{SledStore, SledStoreError};
