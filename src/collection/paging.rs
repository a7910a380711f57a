use super::state::{CollectionState, PendingPage};
use super::{CollectionInner, ItemCollection};
use crate::core::{CollectionError, FieldsUpdate, ItemId, Result};
use crate::operation::{ItemOperation, Responder};
use crate::source::PageCursor;
use futures::FutureExt;
use log::{debug, warn};
use std::sync::Arc;

enum Lookup {
    Ready(ItemId),
    Pending(PendingPage),
}

impl CollectionInner {
    /// Looks `index` up in the window, joining or starting a page fetch when
    /// it is not materialized yet.
    fn poll_index(self: &Arc<Self>, index: usize) -> Result<Lookup> {
        let mut state = self.state.lock()?;
        if let Some(id) = state.window.get(index) {
            return Ok(Lookup::Ready(id.clone()));
        }
        if state.local || state.exhausted {
            return Err(CollectionError::OutOfRange {
                index,
                extent: state.window.len(),
            });
        }

        let pending = match state.in_flight.clone() {
            Some(pending) => {
                debug!("Index {} waits on in-flight page at offset {}", index, pending.offset);
                pending
            }
            None => self.start_fetch(&mut state),
        };
        Ok(Lookup::Pending(pending))
    }

    /// Spawns the fetch of the next page and records it as in flight.
    ///
    /// The fetch runs as its own task so that canceling one waiter never
    /// cancels the page for the others.
    fn start_fetch(self: &Arc<Self>, state: &mut CollectionState) -> PendingPage {
        let cursor = PageCursor {
            offset: state.next_offset,
            limit: self.page_size,
        };
        let task = self
            .api
            .spawn(Arc::clone(self).fetch_page(cursor, state.generation));

        let done = async move {
            task.await.unwrap_or_else(|err| {
                if err.is_cancelled() {
                    Err(CollectionError::Canceled)
                } else {
                    Err(CollectionError::RemoteFailure(format!(
                        "page fetch task failed: {}",
                        err
                    )))
                }
            })
        }
        .boxed()
        .shared();

        let pending = PendingPage {
            offset: cursor.offset,
            done,
        };
        state.in_flight = Some(pending.clone());
        pending
    }

    async fn fetch_page(self: Arc<Self>, cursor: PageCursor, generation: u64) -> Result<()> {
        debug!(
            "Fetching page at offset {} (limit {}) of {} collection",
            cursor.offset, cursor.limit, self.item_type
        );
        let fetched = self
            .api
            .bounded(
                "page fetch",
                self.api
                    .source()
                    .fetch_page(&self.item_type, &self.source, cursor),
            )
            .await;

        let mut state = self.state.lock()?;
        if state.generation != generation {
            debug!("Discarding page at offset {} fetched before a cache flush", cursor.offset);
            return Ok(());
        }
        state.in_flight = None;

        let page = match fetched {
            Ok(page) => page,
            Err(err) => {
                warn!(
                    "Page at offset {} of {} collection failed: {}",
                    cursor.offset, self.item_type, err
                );
                return Err(err);
            }
        };

        let appended = state.append_page(page);
        self.publish(&state);
        debug!(
            "Page at offset {} appended {} ids (window {}, estimate {}, exhausted {})",
            cursor.offset,
            appended,
            state.window.len(),
            state.estimate(),
            state.exhausted
        );
        Ok(())
    }
}

impl ItemCollection {
    /// Resolves `index` to an item identifier, paging from the remote source
    /// as needed.
    ///
    /// Fails with [`CollectionError::OutOfRange`] when the collection is local
    /// and `index` lies past its end, or when the remote source runs out of
    /// pages before reaching `index`.
    pub async fn resolve(&self, index: usize) -> Result<ItemId> {
        self.resolve_with(index, || {}).await
    }

    /// Like [`ItemCollection::resolve`], calling `on_stall` once if the
    /// resolution has to wait for a page.
    pub(crate) async fn resolve_with(
        &self,
        index: usize,
        mut on_stall: impl FnMut() + Send,
    ) -> Result<ItemId> {
        let mut stalled = false;
        loop {
            let pending = match self.inner.poll_index(index)? {
                Lookup::Ready(id) => return Ok(id),
                Lookup::Pending(pending) => pending,
            };

            if !stalled {
                stalled = true;
                on_stall();
            }
            pending.done.await?;
        }
    }

    /// Loads `fields` of the item at `index` and hands them to `callback`.
    ///
    /// When the index is not materialized yet, `callback` first receives a
    /// stalled, empty update while the page is fetched, then the final one.
    /// A failure is reported once and ends the operation. Canceling the
    /// returned operation suppresses every further invocation.
    pub fn with_item_fields<F>(&self, fields: &[&str], index: usize, callback: F) -> ItemOperation
    where
        F: FnMut(Result<FieldsUpdate>) + Send + 'static,
    {
        let operation = ItemOperation::new("with_item_fields");
        let responder = Responder::new(operation.clone(), self.delivery(), callback);
        let fields: Vec<String> = fields.iter().map(|field| field.to_string()).collect();
        let collection = self.clone();

        let task = self.inner.api.spawn(async move {
            let stall = responder.clone();
            let resolved = collection
                .resolve_with(index, move || stall.provisional(Ok(FieldsUpdate::stalled())))
                .await;
            let id = match resolved {
                Ok(id) => id,
                Err(err) => {
                    debug!(
                        "Operation {} could not resolve index {}: {}",
                        responder.operation().id(),
                        index,
                        err
                    );
                    responder.finish(Err(err));
                    return;
                }
            };

            let inner = &collection.inner;
            let loaded = inner
                .api
                .bounded(
                    "field load",
                    inner.api.loader().load_fields(&inner.item_type, &id, &fields),
                )
                .await;
            responder.finish(loaded.map(|data| FieldsUpdate::resolved(id, data)));
        });

        operation.attach_task(task.abort_handle());
        operation
    }
}
