#![cfg(feature = "memory-storage")]

use std::sync::Arc;

use keyscheme::{
    Error, KeyError, KeyPart, KeyScheme, KeyedAccessor, MemoryStore, PartValue, Store, key_args,
};

fn jobs() -> anyhow::Result<KeyedAccessor<MemoryStore>> {
    let scheme = KeyScheme::new([KeyPart::int("user").width(5), KeyPart::int("job").width(5)])?
        .named("percentage");
    Ok(KeyedAccessor::new("progress:", scheme))
}

#[test]
fn test_get_set_delete() -> anyhow::Result<()> {
    let accessor = jobs()?;
    let store = Arc::new(MemoryStore::new());
    accessor.connect(Arc::clone(&store));

    let args = key_args!(user = 123, job = 456);
    assert!(accessor.set("50".into(), None, &args)?);
    assert_eq!(
        store.get("progress:user:00123:job:00456:percentage")?.as_deref(),
        Some("50")
    );
    assert_eq!(accessor.get(&args)?.as_deref(), Some("50"));

    assert_eq!(accessor.delete(&args)?, 1);
    assert_eq!(accessor.delete(&args)?, 0);
    assert_eq!(accessor.get(&args)?, None);
    Ok(())
}

#[test]
fn test_missing_fields_are_all_reported() -> anyhow::Result<()> {
    let accessor = jobs()?;
    accessor.connect(Arc::new(MemoryStore::new()));

    let err = accessor.get(&key_args!()).unwrap_err();
    let Error::Key(KeyError::MissingField(missing)) = &err else {
        panic!("expected a missing field error, got {err:?}");
    };
    assert_eq!(missing.missing, ["user", "job"]);
    assert_eq!(
        missing.to_string(),
        "all percentage key parts must be supplied: missing user, job"
    );
    Ok(())
}

#[test]
fn test_unconnected_accessor_fails() -> anyhow::Result<()> {
    let accessor = jobs()?;
    assert!(matches!(
        accessor.get(&key_args!(user = 1, job = 2)),
        Err(Error::NotConnected)
    ));

    accessor.connect(Arc::new(MemoryStore::new()));
    assert_eq!(accessor.get(&key_args!(user = 1, job = 2))?, None);

    accessor.disconnect();
    assert!(matches!(accessor.scan_keys(&key_args!()), Err(Error::NotConnected)));
    Ok(())
}

#[test]
fn test_scans_are_lazy_and_restartable() -> anyhow::Result<()> {
    let accessor = jobs()?.with_scan_count(3);
    let store = Arc::new(MemoryStore::new());
    accessor.connect(Arc::clone(&store));

    for job in 0..8 {
        accessor.set(job.to_string(), None, &key_args!(user = 1, job = job))?;
    }
    accessor.set("other".into(), None, &key_args!(user = 2, job = 0))?;
    store.set("progress:unrelated", "x".into(), None)?;

    let scan = accessor.scan_keys(&key_args!(user = 1))?;
    assert_eq!(scan.pattern(), "progress:user:00001:job:*:percentage");
    let keys = scan.collect::<Result<Vec<_>, _>>()?;
    assert_eq!(keys.len(), 8);
    assert_eq!(keys[0], "progress:user:00001:job:00000:percentage");

    // A new scan starts over, and can be abandoned part way.
    let first_two: Vec<_> = accessor
        .scan_keys(&key_args!(user = 1))?
        .take(2)
        .collect::<Result<_, _>>()?;
    assert_eq!(first_two, keys[..2]);

    let all = accessor.scan_keys(&key_args!())?.count();
    assert_eq!(all, 9);
    Ok(())
}

#[test]
fn test_scan_values_and_items() -> anyhow::Result<()> {
    let accessor = jobs()?;
    accessor.connect(Arc::new(MemoryStore::new()));
    accessor.set("10".into(), None, &key_args!(user = 7, job = 1))?;
    accessor.set("20".into(), None, &key_args!(user = 7, job = 2))?;

    let values = accessor
        .scan_values(&key_args!(user = 7))?
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(values, [Some("10".to_string()), Some("20".to_string())]);

    let items = accessor
        .scan_items(&key_args!(user = 7, job = PartValue::Wildcard))?
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(
        items,
        [
            (
                "progress:user:00007:job:00001:percentage".to_string(),
                Some("10".to_string())
            ),
            (
                "progress:user:00007:job:00002:percentage".to_string(),
                Some("20".to_string())
            ),
        ]
    );
    Ok(())
}

#[test]
fn test_string_wildcard_and_bare_parts() -> anyhow::Result<()> {
    let scheme = KeyScheme::new([KeyPart::string("queue").without_name(), KeyPart::int("n")])?;
    let accessor: KeyedAccessor<MemoryStore> = KeyedAccessor::new("q:", scheme);

    assert_eq!(accessor.key(false, &key_args!(queue = "high", n = 3))?, "q:high:n:3");
    assert_eq!(accessor.key(true, &key_args!(queue = "*"))?, "q:*:n:*");
    assert!(matches!(
        accessor.key(false, &key_args!(queue = 1, n = 3)),
        Err(KeyError::Format(_))
    ));
    Ok(())
}
