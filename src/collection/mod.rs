//! The item collection: an ordered window of identifiers over a local list or
//! a paginated remote source.

mod edits;
mod paging;
pub(crate) mod state;

use crate::api::Api;
use crate::core::{Capabilities, Item, ItemId, Params, Result};
use crate::delivery::CallbackDelivery;
use crate::source::SourceDescriptor;
use crate::storage::{ArchiveFile, CollectionArchive};
use log::debug;
use state::CollectionState;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

pub(crate) struct CollectionInner {
    pub item_type: String,
    pub source: SourceDescriptor,
    pub count_limit: usize,
    pub capabilities: Capabilities,
    pub page_size: usize,
    pub api: Arc<Api>,
    pub state: Mutex<CollectionState>,
    estimate_tx: watch::Sender<usize>,
}

impl CollectionInner {
    /// Locks the state, recovering from poisoning. Mutations are applied in
    /// one step, so a poisoned lock still guards a consistent window.
    fn lock_state(&self) -> MutexGuard<'_, CollectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `mutate` under the lock and publishes the new estimate.
    pub fn mutate<T>(&self, mutate: impl FnOnce(&mut CollectionState) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock()?;
        let outcome = mutate(&mut state)?;
        self.publish(&state);
        Ok(outcome)
    }

    pub fn publish(&self, state: &CollectionState) {
        let estimate = state.estimate();
        self.estimate_tx.send_if_modified(|current| {
            if *current == estimate {
                false
            } else {
                *current = estimate;
                true
            }
        });
    }
}

/// An ordered collection of items of one type.
///
/// The collection owns the mapping from index to item identifier. Field data
/// is delegated to the API's [`ItemFieldLoader`](crate::loader::ItemFieldLoader).
/// Cloning yields another handle to the same collection.
///
/// # Examples
///
/// ```
/// # use std::sync::Arc;
/// # use itemdeck::{Api, InMemoryFieldLoader, InMemoryItemSource, Item, ItemCollection};
/// # #[tokio::main]
/// # async fn main() -> itemdeck::Result<()> {
/// let api = Api::new(
///     Arc::new(InMemoryItemSource::new()),
///     Arc::new(InMemoryFieldLoader::new()),
/// )?;
///
/// let history = ItemCollection::local(&api, "video", 50);
/// history.add_item(&Item::new("video", "x1"), |result| assert!(result.is_ok()));
/// assert_eq!(history.current_estimated_total_items_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ItemCollection {
    inner: Arc<CollectionInner>,
}

impl ItemCollection {
    fn build(
        api: &Arc<Api>,
        item_type: &str,
        source: SourceDescriptor,
        count_limit: usize,
        capabilities: Capabilities,
        page_size: usize,
        state: CollectionState,
    ) -> Self {
        let (estimate_tx, _) = watch::channel(state.estimate());
        debug!(
            "Created {} collection over {:?} (limit {})",
            item_type, source, count_limit
        );
        Self {
            inner: Arc::new(CollectionInner {
                item_type: item_type.to_string(),
                source,
                count_limit,
                capabilities: capabilities.normalized(),
                page_size,
                api: Arc::clone(api),
                state: Mutex::new(state),
                estimate_tx,
            }),
        }
    }

    /// Empty local collection holding at most `count_limit` items (0 = unbounded).
    pub fn local(api: &Arc<Api>, item_type: &str, count_limit: usize) -> Self {
        Self::build(
            api,
            item_type,
            SourceDescriptor::LocalEmpty,
            count_limit,
            Capabilities::REORDERABLE,
            api.config().page_size,
            CollectionState::local(Vec::new(), count_limit),
        )
    }

    /// Local collection seeded with `ids`; duplicates are ignored and the
    /// list is truncated to `count_limit`.
    pub fn local_with_ids<I, S>(api: &Arc<Api>, item_type: &str, ids: I, count_limit: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        Self::build(
            api,
            item_type,
            SourceDescriptor::LocalWithIds,
            count_limit,
            Capabilities::REORDERABLE,
            api.config().page_size,
            CollectionState::local(ids.into_iter().map(Into::into), count_limit),
        )
    }

    /// Read-only view over a remote query of `item_type` filtered/sorted by `params`.
    pub fn query(api: &Arc<Api>, item_type: &str, params: Params) -> Self {
        Self::build(
            api,
            item_type,
            SourceDescriptor::Query { params },
            0,
            Capabilities::READ_ONLY,
            api.config().page_size,
            CollectionState::remote(0),
        )
    }

    /// Collection over `owner`'s `connection`, whose members are of `item_type`.
    ///
    /// Capabilities come from the configured connection policy.
    pub fn connection(
        api: &Arc<Api>,
        owner: &Item,
        connection: &str,
        item_type: &str,
        params: Params,
    ) -> Self {
        let capabilities = api.config().connection_policy.capabilities_for(connection);
        Self::connection_with_capabilities(api, owner, connection, item_type, params, capabilities)
    }

    /// Same as [`ItemCollection::connection`] with explicit capabilities.
    pub fn connection_with_capabilities(
        api: &Arc<Api>,
        owner: &Item,
        connection: &str,
        item_type: &str,
        params: Params,
        capabilities: Capabilities,
    ) -> Self {
        Self::build(
            api,
            item_type,
            SourceDescriptor::Connection {
                connection: connection.to_string(),
                owner: owner.clone(),
                params,
            },
            0,
            capabilities,
            api.config().page_size,
            CollectionState::remote(0),
        )
    }

    pub fn item_type(&self) -> &str {
        &self.inner.item_type
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.inner.source
    }

    pub fn count_limit(&self) -> usize {
        self.inner.count_limit
    }

    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    pub fn api(&self) -> &Arc<Api> {
        &self.inner.api
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities
    }

    /// Whether items can be added or removed.
    pub fn can_edit(&self) -> bool {
        self.inner.capabilities.editable
    }

    /// Whether items can be moved with [`ItemCollection::move_item_at_index`].
    pub fn can_reorder(&self) -> bool {
        self.inner.capabilities.reorderable
    }

    /// Best current estimate of the number of items in the collection.
    ///
    /// Reported as the window length until a remote collection fetched its
    /// first page.
    pub fn current_estimated_total_items_count(&self) -> usize {
        *self.inner.estimate_tx.borrow()
    }

    /// Subscribes to changes of the estimated item count.
    pub fn subscribe_estimated_total(&self) -> watch::Receiver<usize> {
        self.inner.estimate_tx.subscribe()
    }

    /// Number of identifiers currently materialized.
    pub fn len(&self) -> usize {
        self.inner.lock_state().window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the materialized identifiers, in display order.
    pub fn window(&self) -> Vec<ItemId> {
        self.inner.lock_state().window.clone()
    }

    /// Identifier at `index` if it is already materialized.
    pub fn identifier_at(&self, index: usize) -> Option<ItemId> {
        self.inner.lock_state().window.get(index).cloned()
    }

    /// Whether the remote source reported that no further pages exist.
    pub fn is_exhausted(&self) -> bool {
        self.inner.lock_state().exhausted
    }

    /// Drops every identifier obtained by paging so the next access pages
    /// again. Identifiers of local collections are not cache and stay.
    /// Field data cached by the loader is not affected.
    pub fn flush_cache(&self) {
        if !self.inner.source.is_remote() {
            return;
        }

        let mut state = self.inner.lock_state();
        state.reset_paging();
        self.inner.publish(&state);
        debug!(
            "Flushed {} collection cache (generation {})",
            self.inner.item_type, state.generation
        );
    }

    /// Captures the persistent part of the collection.
    pub fn to_archive(&self) -> CollectionArchive {
        let state = self.inner.lock_state();
        CollectionArchive::new(
            self.inner.item_type.clone(),
            self.inner.source.clone(),
            self.inner.capabilities,
            self.inner.count_limit,
            self.inner.page_size,
            state.window.clone(),
            state.estimated_total,
            state.next_offset,
            state.exhausted,
        )
    }

    /// Rebuilds a collection from an archive, bound to `api`.
    pub fn from_archive(archive: CollectionArchive, api: &Arc<Api>) -> Result<Self> {
        archive.validate()?;

        let state = if archive.source.is_local() {
            CollectionState::local(archive.window, archive.count_limit)
        } else {
            let mut state = CollectionState::remote(archive.count_limit);
            state.window = archive.window;
            state.estimated_total = archive.estimated_total;
            state.next_offset = archive.next_offset;
            state.exhausted = archive.exhausted;
            state
        };

        Ok(Self::build(
            api,
            &archive.item_type,
            archive.source,
            archive.count_limit,
            archive.capabilities,
            archive.page_size,
            state,
        ))
    }

    /// Persists the collection and its cached window to `path`.
    ///
    /// NOTE: blocks on file I/O; do not call from a latency-sensitive thread.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        ArchiveFile::new(path).save(&self.to_archive())
    }

    /// Loads a collection previously written by [`ItemCollection::save_to_file`].
    ///
    /// NOTE: blocks on file I/O; do not call from a latency-sensitive thread.
    pub fn from_file(path: impl AsRef<Path>, api: &Arc<Api>) -> Result<Self> {
        let archive = ArchiveFile::new(path).load()?;
        Self::from_archive(archive, api)
    }

    fn delivery(&self) -> CallbackDelivery {
        self.inner.api.config().callback_delivery.clone()
    }
}

impl std::fmt::Debug for ItemCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("ItemCollection")
            .field("item_type", &self.inner.item_type)
            .field("source", &self.inner.source)
            .field("count_limit", &self.inner.count_limit)
            .field("window_len", &state.window.len())
            .field("estimate", &state.estimate())
            .finish()
    }
}
