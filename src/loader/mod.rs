//! Per-item field hydration.
//!
//! Collections only map indices to identifiers; everything about an item's
//! fields, including caching them, belongs to the loader.

pub mod memory;

use crate::core::{FieldData, ItemId, Result};
use async_trait::async_trait;

pub use memory::InMemoryFieldLoader;

/// Resolves field data for one item.
///
/// Cancellation is cooperative: the collection drops the returned future
/// when the owning operation is canceled.
#[async_trait]
pub trait ItemFieldLoader: Send + Sync {
    async fn load_fields(
        &self,
        item_type: &str,
        id: &ItemId,
        fields: &[String],
    ) -> Result<FieldData>;
}
