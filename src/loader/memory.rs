use super::ItemFieldLoader;
use crate::core::{CollectionError, FieldData, Item, ItemId, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Default)]
struct LoaderState {
    items: HashMap<Item, FieldData>,
    latency: Option<Duration>,
    load_count: usize,
}

/// An in-memory implementation of `ItemFieldLoader`.
///
/// Returns the requested subset of the fields registered for an item;
/// fields the item does not have are left out of the result.
#[derive(Clone, Default)]
pub struct InMemoryFieldLoader {
    state: Arc<Mutex<LoaderState>>,
}

impl InMemoryFieldLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the fields of one item.
    pub async fn insert(&self, item: Item, fields: FieldData) {
        self.state.lock().await.items.insert(item, fields);
    }

    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    pub async fn load_count(&self) -> usize {
        self.state.lock().await.load_count
    }
}

#[async_trait]
impl ItemFieldLoader for InMemoryFieldLoader {
    async fn load_fields(
        &self,
        item_type: &str,
        id: &ItemId,
        fields: &[String],
    ) -> Result<FieldData> {
        let latency = self.state.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        state.load_count += 1;

        let item = Item::new(item_type, id.clone());
        let stored = state
            .items
            .get(&item)
            .ok_or_else(|| CollectionError::NotFound(format!("no field data for {}", item)))?;

        Ok(fields
            .iter()
            .filter_map(|name| stored.get(name).map(|value| (name.clone(), value.clone())))
            .collect())
    }
}
