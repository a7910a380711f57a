#![allow(dead_code)]

use itemdeck::{
    Api, CollectionConfig, FieldData, FieldsUpdate, InMemoryFieldLoader, InMemoryItemSource,
    Item, ItemId, Result,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub struct Fixture {
    pub api: Arc<Api>,
    pub source: InMemoryItemSource,
    pub loader: InMemoryFieldLoader,
}

/// Builds an API over fresh in-memory collaborators. Call from a tokio runtime.
pub fn fixture(config: CollectionConfig) -> Fixture {
    let source = InMemoryItemSource::new();
    let loader = InMemoryFieldLoader::new();
    let api = Api::with_config(
        Arc::new(source.clone()),
        Arc::new(loader.clone()),
        config,
    )
    .unwrap();
    Fixture {
        api,
        source,
        loader,
    }
}

/// `count` ids named `{prefix}0`, `{prefix}1`, ...
pub fn ids(prefix: &str, count: usize) -> Vec<ItemId> {
    (0..count).map(|i| format!("{}{}", prefix, i)).collect()
}

pub fn video(id: &str) -> Item {
    Item::new("video", id)
}

/// Registers a `title` field for every id.
pub async fn register_titles(loader: &InMemoryFieldLoader, item_type: &str, ids: &[ItemId]) {
    for id in ids {
        let mut fields = FieldData::new();
        fields.insert("title".into(), json!(format!("Title of {}", id)));
        fields.insert("views".into(), json!(id.len()));
        loader.insert(Item::new(item_type, id.clone()), fields).await;
    }
}

/// Completion callback for edits plus the receiver of its single result.
pub fn completion() -> (
    impl FnOnce(Result<()>) + Send + 'static,
    oneshot::Receiver<Result<()>>,
) {
    let (tx, rx) = oneshot::channel();
    let callback = move |result: Result<()>| {
        let _ = tx.send(result);
    };
    (callback, rx)
}

/// Field callback forwarding every delivery into a channel.
pub fn field_updates() -> (
    impl FnMut(Result<FieldsUpdate>) + Send + 'static,
    mpsc::UnboundedReceiver<Result<FieldsUpdate>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback = move |update: Result<FieldsUpdate>| {
        let _ = tx.send(update);
    };
    (callback, rx)
}

/// Receives the next delivery or fails the test after a generous timeout.
pub async fn next_update(
    rx: &mut mpsc::UnboundedReceiver<Result<FieldsUpdate>>,
) -> Result<FieldsUpdate> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a field update")
        .expect("callback dropped without a final update")
}
