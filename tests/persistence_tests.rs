//! Persistence integration tests
//!
//! Saving collections to disk and restoring them against a live API.
//! Run with: cargo test --test persistence_tests

mod common;

use common::{completion, fixture, ids, video};
use itemdeck::{
    CollectionConfig, CollectionError, ConnectionPolicy, Item, ItemCollection, Params,
    SourceDescriptor,
};
use std::fs;
use tempfile::TempDir;

#[tokio::test]
async fn test_local_collection_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("history.itdk");
    let fx = fixture(CollectionConfig::default());

    let history = ItemCollection::local(&fx.api, "video", 3);
    for id in ["a", "b", "c", "d"] {
        let (done, rx) = completion();
        history.add_item(&video(id), done);
        rx.await.unwrap().unwrap();
    }
    history.save_to_file(&path).unwrap();

    let restored = ItemCollection::from_file(&path, &fx.api).unwrap();
    assert_eq!(restored.item_type(), "video");
    assert_eq!(restored.source(), &SourceDescriptor::LocalEmpty);
    assert_eq!(restored.count_limit(), 3);
    assert_eq!(restored.window(), vec!["d", "c", "b"]);
    assert_eq!(restored.current_estimated_total_items_count(), 3);

    // Still bounded after loading.
    let (done, rx) = completion();
    restored.add_item(&video("e"), done);
    rx.await.unwrap().unwrap();
    assert_eq!(restored.window(), vec!["e", "d", "c"]);
}

#[tokio::test]
async fn test_remote_collection_resumes_paging() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("videos.itdk");
    let fx = fixture(CollectionConfig::new().page_size(5));
    fx.source
        .register_query("video", Params::new(), ids("v", 10))
        .await;

    let videos = ItemCollection::query(&fx.api, "video", Params::new());
    videos.resolve(2).await.unwrap();
    videos.save_to_file(&path).unwrap();

    let restored = ItemCollection::from_file(&path, &fx.api).unwrap();
    assert_eq!(restored.len(), 5);
    assert_eq!(restored.current_estimated_total_items_count(), 10);
    assert!(!restored.is_exhausted());
    assert!(!restored.can_edit());

    assert_eq!(restored.resolve(8).await.unwrap(), "v8");
    let offsets: Vec<usize> = fx
        .source
        .fetch_log()
        .await
        .iter()
        .map(|cursor| cursor.offset)
        .collect();
    assert_eq!(offsets, vec![0, 5]);
}

#[tokio::test]
async fn test_connection_keeps_capabilities() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested/favorites.itdk");
    let owner = Item::new("user", "u1");
    let fx = fixture(
        CollectionConfig::new().connection_policy(ConnectionPolicy::new().editable("favorites")),
    );
    fx.source
        .register_connection(&owner, "favorites", ["a", "b"])
        .await;

    let favorites =
        ItemCollection::connection(&fx.api, &owner, "favorites", "video", Params::new());
    favorites.resolve(0).await.unwrap();
    favorites.save_to_file(&path).unwrap();

    // A different policy on the restoring side does not change saved capabilities.
    let other = fixture(CollectionConfig::default());
    let restored = ItemCollection::from_file(&path, &other.api).unwrap();
    assert!(restored.can_edit());
    assert!(!restored.can_reorder());
    assert!(restored.source().is_connection());
    assert_eq!(restored.window(), vec!["a", "b"]);
    assert!(restored.is_exhausted());
}

#[tokio::test]
async fn test_archive_in_memory_round_trip() {
    let fx = fixture(CollectionConfig::default());
    let favorites = ItemCollection::local_with_ids(&fx.api, "video", ["x", "y"], 0);

    let archive = favorites.to_archive();
    assert_eq!(archive.metadata.window_len, 2);

    let restored = ItemCollection::from_archive(archive, &fx.api).unwrap();
    assert_eq!(restored.window(), vec!["x", "y"]);
    assert_eq!(restored.source(), &SourceDescriptor::LocalWithIds);
}

#[tokio::test]
async fn test_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let fx = fixture(CollectionConfig::default());

    let err = ItemCollection::from_file(temp_dir.path().join("absent.itdk"), &fx.api).unwrap_err();
    assert!(matches!(err, CollectionError::PersistenceFailure(_)));
}

#[tokio::test]
async fn test_corrupt_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("corrupt.itdk");
    let fx = fixture(CollectionConfig::default());

    fs::write(&path, b"definitely not an archive").unwrap();
    let err = ItemCollection::from_file(&path, &fx.api).unwrap_err();
    assert!(matches!(err, CollectionError::PersistenceFailure(_)));

    // Valid header, truncated body.
    let favorites = ItemCollection::local_with_ids(&fx.api, "video", ["x", "y"], 0);
    favorites.save_to_file(&path).unwrap();
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    let err = ItemCollection::from_file(&path, &fx.api).unwrap_err();
    assert!(matches!(err, CollectionError::PersistenceFailure(_)));
}

#[tokio::test]
async fn test_save_overwrites_previous_archive() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("history.itdk");
    let fx = fixture(CollectionConfig::default());

    let history = ItemCollection::local(&fx.api, "video", 0);
    history.save_to_file(&path).unwrap();

    let (done, rx) = completion();
    history.add_item(&video("a"), done);
    rx.await.unwrap().unwrap();
    history.save_to_file(&path).unwrap();

    let restored = ItemCollection::from_file(&path, &fx.api).unwrap();
    assert_eq!(restored.window(), vec!["a"]);
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
}
