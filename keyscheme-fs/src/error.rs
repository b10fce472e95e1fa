use std::fmt::Display;

/// Errors that can occur during file store operations.
#[derive(Debug)]
pub enum FileStoreError {
    /// An I/O error occurred while reading or writing files.
    Io(std::io::Error),
    /// A CSV serialization or deserialization error occurred.
    Serialization(csv::Error),
    /// A data file held no entry row.
    EmptyEntry(String),
    /// The percent-encoded key does not fit in a filename.
    KeyTooLong { key: String, encoded_len: usize },
}

impl Display for FileStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Serialization(e) => write!(f, "Serialization error: {e}"),
            Self::EmptyEntry(key) => write!(f, "No entry stored in the file for key {key}"),
            Self::KeyTooLong { key, encoded_len } => write!(
                f,
                "Key {key} encodes to a {encoded_len} byte filename, which is too long"
            ),
        }
    }
}

impl std::error::Error for FileStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Serialization(e) => Some(e),
            Self::EmptyEntry(_) | Self::KeyTooLong { .. } => None,
        }
    }
}

impl From<csv::Error> for FileStoreError {
    fn from(e: csv::Error) -> Self {
        Self::Serialization(e)
    }
}

impl From<std::io::Error> for FileStoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
