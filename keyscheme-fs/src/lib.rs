//! File-based store for keyscheme records.
//!
//! Each key is stored as a separate file, named after the percent-encoded key
//! with a `.dat` extension. The file holds one headerless CSV row with the
//! expiry and the value, so entries stay readable with any text editor.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keyscheme::{KeyedAccessor, KeyPart, KeyScheme, key_args};
//! use keyscheme_fs::FileStore;
//!
//! let store = FileStore::new("./data").expect("Failed to create storage");
//! let jobs = KeyedAccessor::new("rq:", KeyScheme::new([KeyPart::string("job")]).unwrap());
//! jobs.connect(Arc::new(store));
//! jobs.set("queued".into(), None, &key_args!(job = "AABBCC")).unwrap();
//! ```

mod error;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use keyscheme::pattern::{literal_prefix, matches};
use keyscheme::{ScanPage, Store};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use error::FileStoreError;

/// The row written to every data file.
#[derive(Debug, Serialize, Deserialize)]
struct Row {
    /// Milliseconds since the Unix epoch; empty for entries that never expire.
    expires_at: Option<u64>,
    value: String,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}

/// A file-based store.
///
/// Every key lives in its own file inside `data_dir`. Expired entries are
/// deleted lazily, when they are next read or scanned.
///
/// Percent-encoding can triple the length of a key (each `:` becomes `%3A`).
/// Keys whose encoded filename exceeds [`MAX_FILENAME_LEN`](Self::MAX_FILENAME_LEN)
/// bytes are rejected with [`FileStoreError::KeyTooLong`].
///
/// # Example
///
/// ```no_run
/// use keyscheme_fs::FileStore;
///
/// let store = FileStore::new("./my-data").expect("Failed to create storage");
/// ```
#[derive(Debug)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    /// The file extension used for all data files.
    const FILE_EXTENSION: &'static str = ".dat";

    /// Longest filename most filesystems accept, in bytes.
    pub const MAX_FILENAME_LEN: usize = 255;

    /// Creates a new `FileStore` at the specified directory, creating the
    /// directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, FileStoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Percent-encodes a key so it is safe to use as a filename.
    ///
    /// Alphanumeric characters, hyphens, underscores and dots are kept; every
    /// other byte of the UTF-8 encoding becomes `%XX`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use keyscheme_fs::FileStore;
    /// assert_eq!(FileStore::encode_for_filename("rq:job:AABBCC"), "rq%3Ajob%3AAABBCC");
    /// assert_eq!(FileStore::encode_for_filename("user-1.a_b"), "user-1.a_b");
    /// ```
    #[must_use]
    pub fn encode_for_filename(key: &str) -> String {
        let mut encoded = String::with_capacity(key.len());
        for byte in key.bytes() {
            match byte {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => {
                    encoded.push(char::from(byte));
                }
                _ => encoded.push_str(&format!("%{byte:02X}")),
            }
        }
        encoded
    }

    /// Decodes a filename stem produced by [`encode_for_filename`](Self::encode_for_filename).
    ///
    /// Returns `None` if the encoding is malformed or not valid UTF-8.
    ///
    /// # Examples
    ///
    /// ```
    /// # use keyscheme_fs::FileStore;
    /// assert_eq!(
    ///     FileStore::decode_from_filename("rq%3Ajob%3A%2A"),
    ///     Some("rq:job:*".to_string())
    /// );
    /// assert_eq!(FileStore::decode_from_filename("invalid%"), None);
    /// ```
    #[must_use]
    pub fn decode_from_filename(encoded: &str) -> Option<String> {
        let mut bytes = Vec::with_capacity(encoded.len());
        let mut rest = encoded.as_bytes();

        while let Some((&byte, tail)) = rest.split_first() {
            if byte == b'%' {
                let hex = tail.get(..2)?;
                let hex = std::str::from_utf8(hex).ok()?;
                bytes.push(u8::from_str_radix(hex, 16).ok()?);
                rest = &tail[2..];
            } else {
                bytes.push(byte);
                rest = tail;
            }
        }
        String::from_utf8(bytes).ok()
    }

    fn key_to_path(&self, key: &str) -> Result<PathBuf, FileStoreError> {
        let filename = format!("{}{}", Self::encode_for_filename(key), Self::FILE_EXTENSION);
        if filename.len() > Self::MAX_FILENAME_LEN {
            return Err(FileStoreError::KeyTooLong {
                key: key.to_owned(),
                encoded_len: filename.len(),
            });
        }
        Ok(self.data_dir.join(filename))
    }

    fn filename_to_key(filename: &str) -> Option<String> {
        filename
            .strip_suffix(Self::FILE_EXTENSION)
            .and_then(Self::decode_from_filename)
    }

    fn read_row(&self, key: &str) -> Result<Option<Row>, FileStoreError> {
        let data = match fs::read(self.key_to_path(key)?) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(data.as_slice());
        match reader.deserialize::<Row>().next() {
            Some(row) => Ok(Some(row?)),
            None => Err(FileStoreError::EmptyEntry(key.to_owned())),
        }
    }

    /// Reads the live row stored at `key`, deleting it if it has expired.
    fn read_live(&self, key: &str, now: u64) -> Result<Option<Row>, FileStoreError> {
        match self.read_row(key)? {
            Some(row) if row.expires_at.is_some_and(|at| at <= now) => {
                self.remove_file(key)?;
                Ok(None)
            }
            row => Ok(row),
        }
    }

    fn write_row(&self, key: &str, row: &Row) -> Result<(), FileStoreError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Necessary)
            .from_path(self.key_to_path(key)?)?;
        writer.serialize(row)?;
        writer.flush()?;
        Ok(())
    }

    /// Removes the file for `key`, returning whether it existed.
    fn remove_file(&self, key: &str) -> Result<bool, FileStoreError> {
        match fs::remove_file(self.key_to_path(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Every key currently on disk, sorted.
    fn stored_keys(&self) -> Result<Vec<String>, FileStoreError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.data_dir)?.flatten() {
            if let Some(filename) = entry.file_name().to_str()
                && let Some(key) = Self::filename_to_key(filename)
            {
                keys.push(key);
            } else {
                warn!(path = ?entry.path(), "skipping file that is not a store entry");
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }
}

impl Store for FileStore {
    type Value = String;
    type Error = FileStoreError;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.read_live(key, now_millis())?.map(|row| row.value))
    }

    fn set(&self, key: &str, value: String, expire: Option<Duration>) -> Result<bool, Self::Error> {
        let expires_at = expire.map(|ttl| {
            now_millis().saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
        });
        self.write_row(key, &Row { expires_at, value })?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<u64, Self::Error> {
        if self.read_live(key, now_millis())?.is_none() {
            return Ok(0);
        }
        Ok(u64::from(self.remove_file(key)?))
    }

    fn scan(
        &self,
        pattern: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<ScanPage, Self::Error> {
        let now = now_millis();
        let prefix = literal_prefix(pattern);
        let mut page = ScanPage::default();

        for key in self.stored_keys()? {
            if !key.starts_with(&prefix) || cursor.is_some_and(|c| key.as_str() <= c) {
                continue;
            }
            if !matches(pattern, &key) || self.read_live(&key, now)?.is_none() {
                continue;
            }
            page.keys.push(key);
            if page.keys.len() >= count {
                page.cursor = page.keys.last().cloned();
                break;
            }
        }

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn safe_keys_are_kept_verbatim(key in "[a-zA-Z0-9_.\\-]+") {
            prop_assert_eq!(FileStore::encode_for_filename(&key), key);
        }

        #[test]
        fn any_key_decodes_back(key in "\\PC*") {
            let encoded = FileStore::encode_for_filename(&key);
            prop_assert_eq!(FileStore::decode_from_filename(&encoded), Some(key));
        }
    }

    #[test]
    fn filenames_round_trip_through_encoding() {
        for key in ["rq:job:AABBCC", "progress:user:00123:njobs", "naïve key/with,commas"] {
            let encoded = FileStore::encode_for_filename(key);
            assert!(encoded.bytes().all(|b| b.is_ascii_alphanumeric() || b"-_.%".contains(&b)));
            assert_eq!(FileStore::decode_from_filename(&encoded).as_deref(), Some(key));
        }
    }

    #[test]
    fn overlong_keys_are_rejected_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let key = format!("rq:job:{}", ":".repeat(90));

        let err = store.set(&key, "v".into(), None).unwrap_err();
        assert!(matches!(
            err,
            FileStoreError::KeyTooLong { encoded_len, .. } if encoded_len > FileStore::MAX_FILENAME_LEN
        ));
        assert!(matches!(store.get(&key), Err(FileStoreError::KeyTooLong { .. })));

        let fits = "k".repeat(FileStore::MAX_FILENAME_LEN - FileStore::FILE_EXTENSION.len());
        assert!(store.set(&fits, "v".into(), None).unwrap());
        assert_eq!(store.get(&fits).unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn malformed_filenames_are_rejected() {
        assert_eq!(FileStore::decode_from_filename("abc%4"), None);
        assert_eq!(FileStore::decode_from_filename("abc%zz"), None);
        assert_eq!(FileStore::decode_from_filename("%FF"), None);
        assert_eq!(FileStore::filename_to_key("notes.txt"), None);
    }
}
