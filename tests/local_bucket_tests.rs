//! Tests for ObjectStore over the filesystem bucket
//!
//! These tests verify:
//! - Objects survive reopening the bucket
//! - On-disk layout (one file per chunk, JSON record)
//! - Chunk corruption is reported as an IO error
//! - Delete removes record and chunks
//! - Concurrent writers and readers stay independent

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use gridstore::utils::crc::encode_chunk;
use gridstore::{
    ByteStream, ErrorKind, Filter, FindOptions, LocalBucket, ObjectId, ObjectStore, StoreConfig,
    StoreError, WriteOptions,
};

// =============================================================================
// Helper Functions
// =============================================================================

async fn setup_local_store(chunk_size: u32) -> (TempDir, ObjectStore) {
    let temp_dir = TempDir::new().unwrap();
    let bucket = LocalBucket::open(temp_dir.path(), "fs", chunk_size).await.unwrap();
    let store = ObjectStore::new(Arc::new(bucket)).unwrap();
    (temp_dir, store)
}

fn chunk_files(temp_dir: &TempDir, id: ObjectId) -> Vec<String> {
    let dir = temp_dir.path().join("fs.chunks").join(id.to_hex());
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn lock_files(temp_dir: &TempDir) -> Vec<String> {
    std::fs::read_dir(temp_dir.path().join("fs.files"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".lock"))
        .collect()
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[tokio::test]
async fn test_write_then_read_ten_bytes() {
    let (_temp_dir, store) = setup_local_store(4).await;

    let source = ByteStream::once(&b"abcdefghij"[..]);
    let id = store.write(source, &WriteOptions::named("tester")).await.unwrap();

    let by_name = store.read(&Filter::by_filename("tester")).await.unwrap();
    assert_eq!(&by_name[..], b"abcdefghij");

    let by_id = store.read(&Filter::by_id(id)).await.unwrap();
    assert_eq!(by_id, by_name);
}

#[tokio::test]
async fn test_objects_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();

    let id = {
        let bucket = LocalBucket::open(temp_dir.path(), "media", 1024).await.unwrap();
        let store = ObjectStore::new(Arc::new(bucket)).unwrap();
        store
            .write_buffer(payload.clone(), &WriteOptions::named("blob.bin"))
            .await
            .unwrap()
    };

    let bucket = LocalBucket::open(temp_dir.path(), "media", 1024).await.unwrap();
    let store = ObjectStore::new(Arc::new(bucket)).unwrap();

    let data = store.read(&Filter::by_id(id)).await.unwrap();
    assert_eq!(&data[..], &payload[..]);

    let record = store.find_one(&Filter::by_id(id), &FindOptions::new()).await.unwrap().unwrap();
    assert_eq!(record.length, 5000);
    assert_eq!(record.chunk_count(), 5);
    assert_eq!(record.sha256, hex::encode(Sha256::digest(&payload)));
}

#[tokio::test]
async fn test_from_config_uses_configured_layout() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig {
        data_directory: temp_dir.path().to_path_buf(),
        bucket_name: "docs".into(),
        chunk_size_bytes: 3,
        ..Default::default()
    };

    let bucket = LocalBucket::from_config(&config).await.unwrap();
    let store = ObjectStore::new(Arc::new(bucket)).unwrap();
    assert_eq!(store.chunk_size_bytes(), 3);

    let id = store.write_buffer(&b"1234567"[..], &WriteOptions::named("n")).await.unwrap();
    assert!(temp_dir.path().join("docs.files").join(format!("{}.json", id)).exists());
    assert_eq!(
        std::fs::read_dir(temp_dir.path().join("docs.chunks").join(id.to_hex())).unwrap().count(),
        3
    );
}

// =============================================================================
// On-Disk Layout Tests
// =============================================================================

#[tokio::test]
async fn test_one_file_per_chunk() {
    let (temp_dir, store) = setup_local_store(4).await;

    let id = store.write_buffer(vec![9u8; 10], &WriteOptions::named("x")).await.unwrap();

    assert_eq!(chunk_files(&temp_dir, id), ["0.chunk", "1.chunk", "2.chunk"]);
    let record: serde_json::Value = serde_json::from_slice(
        &std::fs::read(temp_dir.path().join("fs.files").join(format!("{}.json", id))).unwrap(),
    )
    .unwrap();
    assert_eq!(record["filename"], "x");
    assert_eq!(record["length"], 10);
    assert_eq!(record["chunk_size"], 4);
}

#[tokio::test]
async fn test_empty_object_has_no_chunks() {
    let (temp_dir, store) = setup_local_store(4).await;

    let id = store.write_buffer(Vec::new(), &WriteOptions::named("empty")).await.unwrap();

    assert!(chunk_files(&temp_dir, id).is_empty());
    assert!(store.read(&Filter::by_id(id)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_upload_leaves_nothing_behind() {
    let (temp_dir, store) = setup_local_store(2).await;

    let source = ByteStream::new(stream::iter(vec![
        Ok(Bytes::from_static(b"abcdef")),
        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated upload")),
    ]));
    let err = store.write(source, &WriteOptions::named("broken")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);

    let staging = temp_dir.path().join("fs.chunks").join(".staging");
    assert_eq!(std::fs::read_dir(staging).unwrap().count(), 0);
    let records = store.find(&Filter::new(), &FindOptions::new()).await.unwrap();
    assert!(records.is_empty());
    assert!(lock_files(&temp_dir).is_empty());
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[tokio::test]
async fn test_corrupted_chunk_is_io_error() {
    let (temp_dir, store) = setup_local_store(4).await;
    let id = store.write_buffer(&b"abcdefgh"[..], &WriteOptions::named("c")).await.unwrap();

    let chunk = temp_dir.path().join("fs.chunks").join(id.to_hex()).join("1.chunk");
    let mut raw = std::fs::read(&chunk).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0xff;
    std::fs::write(&chunk, raw).unwrap();

    match store.read(&Filter::by_id(id)).await.unwrap_err() {
        StoreError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::InvalidData),
        other => panic!("expected Io error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rewritten_chunk_with_valid_crc_fails_digest() {
    let (temp_dir, store) = setup_local_store(4).await;
    let id = store.write_buffer(&b"abcdefgh"[..], &WriteOptions::named("d")).await.unwrap();

    let chunk = temp_dir.path().join("fs.chunks").join(id.to_hex()).join("0.chunk");
    std::fs::write(&chunk, encode_chunk(b"ABCD")).unwrap();

    match store.read(&Filter::by_id(id)).await.unwrap_err() {
        StoreError::Io(e) => {
            assert_eq!(e.kind(), io::ErrorKind::InvalidData);
            assert!(e.to_string().contains("digest"));
        }
        other => panic!("expected Io error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_chunk_is_io_error() {
    let (temp_dir, store) = setup_local_store(4).await;
    let id = store.write_buffer(&b"abcdefgh"[..], &WriteOptions::named("m")).await.unwrap();

    std::fs::remove_file(temp_dir.path().join("fs.chunks").join(id.to_hex()).join("0.chunk"))
        .unwrap();

    let err = store.read(&Filter::by_id(id)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[tokio::test]
async fn test_missing_files_directory_is_not_found() {
    let (temp_dir, store) = setup_local_store(4).await;
    std::fs::remove_dir_all(temp_dir.path().join("fs.files")).unwrap();

    let err = store.find(&Filter::new(), &FindOptions::new()).await.unwrap_err();
    assert!(err.is_not_found());
}

// =============================================================================
// Delete Tests
// =============================================================================

#[tokio::test]
async fn test_delete_removes_record_and_chunks() {
    let (temp_dir, store) = setup_local_store(4).await;
    let id = store.write_buffer(vec![1u8; 9], &WriteOptions::named("gone")).await.unwrap();

    assert_eq!(store.delete(&Filter::by_id(id)).await.unwrap(), id);

    assert!(!temp_dir.path().join("fs.chunks").join(id.to_hex()).exists());
    assert!(store
        .find_one(&Filter::by_filename("gone"), &FindOptions::new())
        .await
        .unwrap()
        .is_none());

    let err = store.delete(&Filter::by_id(id)).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_duplicate_id_conflicts() {
    let (_temp_dir, store) = setup_local_store(4).await;
    let id = ObjectId::new();

    store.write_buffer(&b"one"[..], &WriteOptions::named("a").id(id)).await.unwrap();
    let err = store
        .write_buffer(&b"two"[..], &WriteOptions::named("b").id(id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(&store.read(&Filter::by_id(id)).await.unwrap()[..], b"one");
}

#[tokio::test]
async fn test_removed_root_is_not_connected() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("store");
    let bucket = LocalBucket::open(&root, "fs", 4).await.unwrap();
    std::fs::remove_dir_all(&root).unwrap();

    let err = ObjectStore::new(Arc::new(bucket)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_claim_released_after_commit_and_conflict() {
    let (temp_dir, store) = setup_local_store(4).await;
    let id = ObjectId::new();

    store.write_buffer(&b"one"[..], &WriteOptions::named("a").id(id)).await.unwrap();
    assert!(lock_files(&temp_dir).is_empty());

    let err = store
        .write_buffer(&b"two"[..], &WriteOptions::named("a").id(id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(lock_files(&temp_dir).is_empty());

    // Once deleted, the id can be reused.
    store.delete(&Filter::by_id(id)).await.unwrap();
    store.write_buffer(&b"three"[..], &WriteOptions::named("a").id(id)).await.unwrap();
    assert_eq!(&store.read(&Filter::by_id(id)).await.unwrap()[..], b"three");
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_under_same_id_admit_one() {
    let (temp_dir, store) = setup_local_store(4).await;

    for round in 0..20u8 {
        let id = ObjectId::new();
        let handles: Vec<_> = (0..4u8)
            .map(|writer| {
                let store = store.clone();
                tokio::spawn(async move {
                    let payload = vec![round.wrapping_mul(4).wrapping_add(writer); 10];
                    let result = store
                        .write_buffer(payload.clone(), &WriteOptions::named("t").id(id))
                        .await;
                    (payload, result)
                })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            let (payload, result) = handle.await.unwrap();
            match result {
                Ok(stored) => {
                    assert_eq!(stored, id);
                    winners.push(payload);
                }
                Err(err) => assert_eq!(err.kind(), ErrorKind::Conflict),
            }
        }

        assert_eq!(winners.len(), 1, "round {} admitted {} writers", round, winners.len());
        let data = store.read(&Filter::by_id(id)).await.unwrap();
        assert_eq!(&data[..], &winners[0][..]);
    }

    assert!(lock_files(&temp_dir).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_find_during_deletes_skips_removed_records() {
    let (_temp_dir, store) = setup_local_store(4).await;

    let mut ids = Vec::new();
    for i in 0..100 {
        let id = store
            .write_buffer(vec![1u8; 5], &WriteOptions::named(format!("obj-{}", i)))
            .await
            .unwrap();
        ids.push(id);
    }

    let deleter = {
        let store = store.clone();
        tokio::spawn(async move {
            for id in ids {
                store.delete(&Filter::by_id(id)).await.unwrap();
            }
        })
    };

    while !deleter.is_finished() {
        let records = store.find(&Filter::new(), &FindOptions::new()).await.unwrap();
        assert!(records.len() <= 100);
    }
    deleter.await.unwrap();

    let records = store.find(&Filter::new(), &FindOptions::new()).await.unwrap();
    assert!(records.is_empty());
}
