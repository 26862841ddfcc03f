use std::path::PathBuf;

use kiln_cache::{CacheError, TargetCache};

fn cache_root(tmp: &tempfile::TempDir) -> PathBuf {
    tmp.path().join("cache")
}

#[test]
fn save_artifact_records_every_contributing_source() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cache = TargetCache::open(cache_root(&tmp)).unwrap();

    let foo = PathBuf::from("/src/Foo.kt");
    let util = PathBuf::from("/src/Util.kt");

    cache
        .save_artifact(&[foo.clone(), util.clone()], &PathBuf::from("/out/Foo.class"))
        .unwrap();

    assert_eq!(cache.artifacts_for(&foo), vec![PathBuf::from("/out/Foo.class")]);
    assert_eq!(cache.artifacts_for(&util), vec![PathBuf::from("/out/Foo.class")]);
}

#[test]
fn artifacts_accumulate_in_call_order_including_duplicates() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cache = TargetCache::open(cache_root(&tmp)).unwrap();

    let foo = PathBuf::from("/src/Foo.kt");
    cache
        .save_artifact(&[foo.clone()], &PathBuf::from("/out/Foo.class"))
        .unwrap();
    cache
        .save_artifact(&[foo.clone()], &PathBuf::from("/out/Foo$Inner.class"))
        .unwrap();
    // A rebuild re-reporting the same artifact accumulates; the cache does
    // not deduplicate.
    cache
        .save_artifact(&[foo.clone()], &PathBuf::from("/out/Foo.class"))
        .unwrap();

    assert_eq!(
        cache.artifacts_for(&foo),
        vec![
            PathBuf::from("/out/Foo.class"),
            PathBuf::from("/out/Foo$Inner.class"),
            PathBuf::from("/out/Foo.class"),
        ]
    );
}

#[test]
fn unknown_source_has_no_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = TargetCache::open(cache_root(&tmp)).unwrap();

    assert!(cache.artifacts_for(&PathBuf::from("/src/Unknown.kt")).is_empty());
}

#[test]
fn remove_deletes_artifact_files_and_clears_the_entry() {
    let tmp = tempfile::tempdir().unwrap();
    let out_dir = tmp.path().join("out");
    std::fs::create_dir_all(&out_dir).unwrap();

    let class_file = out_dir.join("Foo.class");
    let inner_class_file = out_dir.join("Foo$Inner.class");
    std::fs::write(&class_file, b"cafebabe").unwrap();
    std::fs::write(&inner_class_file, b"cafebabe").unwrap();

    let mut cache = TargetCache::open(cache_root(&tmp)).unwrap();
    let source = PathBuf::from("/src/Foo.kt");
    cache.save_artifact(&[source.clone()], &class_file).unwrap();
    cache
        .save_artifact(&[source.clone()], &inner_class_file)
        .unwrap();

    cache
        .remove_artifacts_by_sources([source.clone()])
        .unwrap();

    assert!(!class_file.exists());
    assert!(!inner_class_file.exists());
    assert!(cache.artifacts_for(&source).is_empty());
}

#[test]
fn remove_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cache = TargetCache::open(cache_root(&tmp)).unwrap();

    let source = PathBuf::from("/src/Foo.kt");
    cache
        .save_artifact(&[source.clone()], &PathBuf::from("/out/Foo.class"))
        .unwrap();

    cache
        .remove_artifacts_by_sources([source.clone()])
        .unwrap();
    cache
        .remove_artifacts_by_sources([source.clone()])
        .unwrap();

    assert!(cache.artifacts_for(&source).is_empty());
}

#[test]
fn remove_survives_artifact_deletion_failure() {
    let tmp = tempfile::tempdir().unwrap();

    // An artifact path that cannot be deleted with `remove_file`: a
    // non-empty directory.
    let stubborn = tmp.path().join("out").join("Foo.class");
    std::fs::create_dir_all(stubborn.join("nested")).unwrap();

    let mut cache = TargetCache::open(cache_root(&tmp)).unwrap();
    let source = PathBuf::from("/src/Foo.kt");
    cache.save_artifact(&[source.clone()], &stubborn).unwrap();

    // Deletion fails, removal of the map entry proceeds regardless.
    cache
        .remove_artifacts_by_sources([source.clone()])
        .unwrap();

    assert!(stubborn.exists());
    assert!(cache.artifacts_for(&source).is_empty());
}

#[test]
fn remove_tolerates_already_deleted_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cache = TargetCache::open(cache_root(&tmp)).unwrap();

    let source = PathBuf::from("/src/Foo.kt");
    let missing_artifact = tmp.path().join("out").join("Foo.class");
    cache
        .save_artifact(&[source.clone()], &missing_artifact)
        .unwrap();

    cache
        .remove_artifacts_by_sources([source.clone()])
        .unwrap();
    assert!(cache.artifacts_for(&source).is_empty());
}

#[test]
fn reopened_cache_reflects_prior_state() {
    let tmp = tempfile::tempdir().unwrap();
    let root = cache_root(&tmp);
    let source = PathBuf::from("/src/Foo.kt");

    let mut cache = TargetCache::open(&root).unwrap();
    cache
        .save_artifact(&[source.clone()], &PathBuf::from("/out/Foo.class"))
        .unwrap();
    cache.close().unwrap();

    let cache = TargetCache::open(&root).unwrap();
    assert_eq!(
        cache.artifacts_for(&source),
        vec![PathBuf::from("/out/Foo.class")]
    );
}

#[test]
fn reopen_after_drop_without_close_loses_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let root = cache_root(&tmp);
    let source = PathBuf::from("/src/Foo.kt");

    // No explicit close: every mutation is flushed when it happens.
    let mut cache = TargetCache::open(&root).unwrap();
    cache
        .save_artifact(&[source.clone()], &PathBuf::from("/out/Foo.class"))
        .unwrap();
    cache
        .save_artifact(&[source.clone()], &PathBuf::from("/out/Foo$Inner.class"))
        .unwrap();
    drop(cache);

    let cache = TargetCache::open(&root).unwrap();
    assert_eq!(
        cache.artifacts_for(&source),
        vec![
            PathBuf::from("/out/Foo.class"),
            PathBuf::from("/out/Foo$Inner.class"),
        ]
    );
}

#[test]
fn cache_root_is_single_owner() {
    let tmp = tempfile::tempdir().unwrap();
    let root = cache_root(&tmp);

    let cache = TargetCache::open(&root).unwrap();
    let err = TargetCache::open(&root).unwrap_err();
    assert!(matches!(err, CacheError::CacheRootBusy { .. }));

    drop(cache);
    TargetCache::open(&root).unwrap();
}

#[test]
fn close_materializes_storage_files() {
    let tmp = tempfile::tempdir().unwrap();
    let root = cache_root(&tmp);

    let cache = TargetCache::open(&root).unwrap();
    let canonical_root = cache.root().to_path_buf();
    cache.close().unwrap();

    assert!(canonical_root.join("sources-to-classfiles.bin").exists());
    assert!(canonical_root.join("classpath.bin").exists());
}

#[cfg(unix)]
#[test]
fn storage_write_failure_surfaces_to_the_caller() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::tempdir().unwrap();
    let root = cache_root(&tmp);

    let mut cache = TargetCache::open(&root).unwrap();
    let canonical_root = cache.root().to_path_buf();

    std::fs::set_permissions(&canonical_root, std::fs::Permissions::from_mode(0o555)).unwrap();
    let err = cache
        .save_artifact(&[PathBuf::from("/src/Foo.kt")], &PathBuf::from("/out/Foo.class"))
        .unwrap_err();
    assert!(matches!(err, CacheError::Storage(_)));
    std::fs::set_permissions(&canonical_root, std::fs::Permissions::from_mode(0o755)).unwrap();
}
