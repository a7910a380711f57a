//! Remote side of a collection: where pages of identifiers come from and
//! where edits are mirrored to.

pub mod memory;

use crate::core::{CollectionError, Item, ItemId, Params, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::InMemoryItemSource;

/// What a collection is backed by. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceDescriptor {
    /// Local collection created empty.
    LocalEmpty,
    /// Local collection seeded with identifiers.
    LocalWithIds,
    /// Remote query over every item of the collection type.
    Query { params: Params },
    /// Remote connection of an owning item (e.g. a user's playlists).
    Connection {
        connection: String,
        owner: Item,
        params: Params,
    },
}

impl SourceDescriptor {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::LocalEmpty | Self::LocalWithIds)
    }

    pub fn is_remote(&self) -> bool {
        !self.is_local()
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Position of a page request: up to `limit` identifiers starting at
/// `offset` in the remote list.
///
/// Offsets are not always multiples of `limit`; edits applied to the fetched
/// prefix move the start of the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub offset: usize,
    pub limit: usize,
}

impl PageCursor {
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }
}

/// One page of identifiers as returned by the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Page {
    pub ids: Vec<ItemId>,
    pub total_estimate: usize,
    pub has_more: bool,
}

/// Remote collaborator resolving collection pages and mirroring edits.
///
/// Implementations wrap the API transport. Errors should be reported as
/// [`CollectionError::RemoteFailure`].
#[async_trait]
pub trait RemoteItemSource: Send + Sync {
    /// Fetches one page of identifiers of `item_type` for `source`.
    async fn fetch_page(
        &self,
        item_type: &str,
        source: &SourceDescriptor,
        cursor: PageCursor,
    ) -> Result<Page>;

    /// Inserts `id` at the head of the remote connection.
    async fn mirror_add(&self, source: &SourceDescriptor, _id: &ItemId) -> Result<()> {
        Err(unsupported("add", source))
    }

    /// Removes `id` from the remote connection.
    async fn mirror_remove(&self, source: &SourceDescriptor, _id: &ItemId) -> Result<()> {
        Err(unsupported("remove", source))
    }

    /// Moves `id` from `from` to `to` in the remote connection.
    async fn mirror_move(
        &self,
        source: &SourceDescriptor,
        _id: &ItemId,
        _from: usize,
        _to: usize,
    ) -> Result<()> {
        Err(unsupported("move", source))
    }
}

fn unsupported(what: &str, source: &SourceDescriptor) -> CollectionError {
    CollectionError::RemoteFailure(format!(
        "remote source does not support {} on {:?}",
        what, source
    ))
}
