// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn get_writes_seeded_object() {
    let store = FakeStore::new();
    store.seed("code", "k.zip", b"bundle-bytes");
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("k.zip");
    let n = store.get("code", "k.zip", &dest, 1024).await.unwrap();
    assert_eq!(n, 12);
    assert_eq!(std::fs::read(dest).unwrap(), b"bundle-bytes");
}

#[tokio::test]
async fn get_missing_object_is_not_found() {
    let store = FakeStore::new();
    let dir = tempfile::tempdir().unwrap();
    let err = store.get("code", "absent", &dir.path().join("x"), 1024).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn get_enforces_size_cap() {
    let store = FakeStore::new();
    store.seed("code", "big", &vec![0u8; 100]);
    let dir = tempfile::tempdir().unwrap();
    let err = store.get("code", "big", &dir.path().join("x"), 99).await.unwrap_err();
    assert!(matches!(err, StoreError::TooLarge { size: 100, cap: 99, .. }));
}

#[tokio::test]
async fn put_roundtrips_and_records() {
    let store = FakeStore::new();
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("out.txt");
    std::fs::write(&src, b"artifact").unwrap();
    store.put("user-data", "results/r1/out.txt", &src).await.unwrap();
    assert_eq!(store.object("user-data", "results/r1/out.txt").unwrap(), b"artifact");
    assert_eq!(store.puts(), vec![("user-data".to_string(), "results/r1/out.txt".to_string())]);
}

#[tokio::test]
async fn scripted_put_failure() {
    let store = FakeStore::new();
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("out.txt");
    std::fs::write(&src, b"artifact").unwrap();
    store.fail_put_key("out.txt");
    let err = store.put("user-data", "results/r1/out.txt", &src).await.unwrap_err();
    assert!(matches!(err, StoreError::Transport(_)));
}
