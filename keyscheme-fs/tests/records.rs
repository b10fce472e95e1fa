use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use keyscheme::{KeyPart, KeyScheme, KeyedAccessor, RecordType, Store, key_args};
use keyscheme_fs::FileStore;
use proptest::prelude::*;
use tempfile::tempdir;

#[test]
fn test_flat_record_flow() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = Arc::new(FileStore::new(temp_dir.path())?);

    let rq: RecordType<FileStore> = RecordType::flat("rq:")
        .part(KeyPart::string("job"))
        .part(KeyPart::string("queue"))
        .store(Arc::clone(&store))
        .build()?;

    let record = rq
        .record()
        .keys(key_args!(job = "AABBCC", queue = "default"))
        .values([("job", "payload".to_string()), ("queue", "AABBCC".to_string())])
        .execute()?;
    assert!(record.written());

    // Keys survive as files and can be read back with a fresh store.
    let reopened = FileStore::new(temp_dir.path())?;
    assert_eq!(reopened.get("rq:job:AABBCC")?.as_deref(), Some("payload"));
    assert_eq!(reopened.get("rq:queue:default")?.as_deref(), Some("AABBCC"));

    let mut loaded = rq.load(key_args!(job = "AABBCC", queue = "default"))?;
    let fetched = loaded.call()?;
    assert_eq!(fetched.field("job").map(String::as_str), Some("payload"));

    let keys = rq["job"].scan_keys(&key_args!())?.collect::<Result<Vec<_>, _>>()?;
    assert_eq!(keys, ["rq:job:AABBCC"]);

    assert_eq!(rq.empty()?, 2);
    assert_eq!(store.scan("*", None, 10)?.keys, Vec::<String>::new());
    Ok(())
}

#[test]
fn test_values_with_separators_are_preserved() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let notes = KeyedAccessor::new("notes:", KeyScheme::new([KeyPart::int("id").width(3)])?);
    notes.connect(Arc::new(FileStore::new(temp_dir.path())?));

    let text = "line one, with a comma\n\"quoted\" line two";
    notes.set(text.to_string(), None, &key_args!(id = 7))?;
    assert_eq!(notes.get(&key_args!(id = 7))?.as_deref(), Some(text));
    assert_eq!(notes.get(&key_args!(id = 8))?, None);
    Ok(())
}

#[test]
fn test_expired_entries_are_removed() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = FileStore::new(temp_dir.path())?;

    store.set("session:a", "1".into(), Some(Duration::from_millis(20)))?;
    store.set("session:b", "2".into(), None)?;
    sleep(Duration::from_millis(50));

    assert_eq!(store.get("session:a")?, None);
    assert_eq!(store.scan("session:*", None, 10)?.keys, ["session:b"]);
    assert_eq!(store.delete("session:a")?, 0);
    assert_eq!(store.delete("session:b")?, 1);
    assert_eq!(std::fs::read_dir(temp_dir.path())?.count(), 0);
    Ok(())
}

#[test]
fn test_scan_pages_resume_after_cursor() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = FileStore::new(temp_dir.path())?;
    for i in 0..7 {
        store.set(&format!("k:{i}"), i.to_string(), None)?;
    }
    store.set("other", "x".into(), None)?;

    let first = store.scan("k:*", None, 3)?;
    assert_eq!(first.keys, ["k:0", "k:1", "k:2"]);
    let second = store.scan("k:*", first.cursor.as_deref(), 3)?;
    assert_eq!(second.keys, ["k:3", "k:4", "k:5"]);
    let last = store.scan("k:*", second.cursor.as_deref(), 3)?;
    assert_eq!(last.keys, ["k:6"]);
    assert_eq!(last.cursor, None);
    Ok(())
}

proptest! {
    #[test]
    fn test_arbitrary_keys_round_trip(key in "\\PC{1,16}", value in "\\PC{0,40}") {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path()).unwrap();
        store.set(&key, value.clone(), None).unwrap();
        prop_assert_eq!(store.get(&key).unwrap(), Some(value));
    }
}
