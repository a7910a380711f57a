use super::state::EditRecord;
use super::{CollectionInner, ItemCollection};
use crate::core::{CollectionError, Item, ItemId, Result};
use crate::operation::{ItemOperation, Responder};
use log::{debug, warn};
use std::sync::{Arc, Mutex, PoisonError};

/// Remote counterpart of a local edit.
#[derive(Debug, Clone)]
enum Mirror {
    Add(ItemId),
    Remove(ItemId),
    Move { id: ItemId, from: usize, to: usize },
}

type RecordSlot = Arc<Mutex<Option<EditRecord>>>;

impl CollectionInner {
    fn require_editable(&self) -> Result<()> {
        if self.capabilities.editable {
            Ok(())
        } else {
            Err(CollectionError::NotPermitted(format!(
                "{} collection over {:?} cannot be edited",
                self.item_type, self.source
            )))
        }
    }

    fn require_reorderable(&self) -> Result<()> {
        if self.capabilities.reorderable {
            Ok(())
        } else {
            Err(CollectionError::NotPermitted(format!(
                "{} collection over {:?} cannot be reordered",
                self.item_type, self.source
            )))
        }
    }

    fn require_member_type(&self, item: &Item) -> Result<()> {
        if item.item_type == self.item_type {
            Ok(())
        } else {
            Err(CollectionError::NotPermitted(format!(
                "item {} does not belong in a {} collection",
                item, self.item_type
            )))
        }
    }

    /// Reverses the optimistic edit held in `slot`, at most once.
    fn compensate(&self, slot: &RecordSlot, reason: &str) {
        let record = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(record) = record else {
            return;
        };

        debug!("Rolling back {:?} ({})", record, reason);
        if let Err(err) = self.mutate(|state| {
            state.rollback(&record);
            Ok(())
        }) {
            warn!("Rollback of {:?} failed: {}", record, err);
        }
    }

    async fn mirror(&self, mirror: &Mirror) -> Result<()> {
        let source = self.api.source();
        match mirror {
            Mirror::Add(id) => {
                self.api
                    .bounded("mirror add", source.mirror_add(&self.source, id))
                    .await
            }
            Mirror::Remove(id) => {
                self.api
                    .bounded("mirror remove", source.mirror_remove(&self.source, id))
                    .await
            }
            Mirror::Move { id, from, to } => {
                self.api
                    .bounded(
                        "mirror move",
                        source.mirror_move(&self.source, id, *from, *to),
                    )
                    .await
            }
        }
    }
}

impl ItemCollection {
    /// Inserts `item` at the head of the collection unless already present.
    ///
    /// When the collection is at its count limit, the last item is removed.
    /// The window reflects the insertion immediately; for connection-backed
    /// collections it is reverted if the remote call fails or the operation
    /// is canceled before `done` runs.
    pub fn add_item<F>(&self, item: &Item, done: F) -> ItemOperation
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let (operation, responder) = self.edit_operation("add_item", done);

        let applied = self
            .inner
            .require_editable()
            .and_then(|_| self.inner.require_member_type(item))
            .and_then(|_| self.inner.mutate(|state| Ok(state.apply_add(&item.id))));

        match applied {
            Err(err) => self.reject(responder, err),
            Ok(None) => responder.finish(Ok(())),
            Ok(Some(record)) => self.settle(responder, record, Mirror::Add(item.id.clone())),
        }
        operation
    }

    /// Removes `item` from the collection.
    ///
    /// Fails with [`CollectionError::NotFound`] if the item is not in the
    /// materialized window.
    pub fn remove_item<F>(&self, item: &Item, done: F) -> ItemOperation
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let (operation, responder) = self.edit_operation("remove_item", done);

        let applied = self.inner.require_editable().and_then(|_| {
            self.inner.mutate(|state| {
                let index = state
                    .position(&item.id)
                    .ok_or_else(|| CollectionError::NotFound(item.to_string()))?;
                state.apply_remove_at(index)
            })
        });

        match applied {
            Err(err) => self.reject(responder, err),
            Ok(record) => self.settle(responder, record, Mirror::Remove(item.id.clone())),
        }
        operation
    }

    /// Removes the item at `index`.
    pub fn remove_item_at_index<F>(&self, index: usize, done: F) -> ItemOperation
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let (operation, responder) = self.edit_operation("remove_item_at_index", done);

        let applied = self
            .inner
            .require_editable()
            .and_then(|_| self.inner.mutate(|state| state.apply_remove_at(index)));

        match applied {
            Err(err) => self.reject(responder, err),
            Ok(record) => {
                let mirror = Mirror::Remove(record.id().clone());
                self.settle(responder, record, mirror);
            }
        }
        operation
    }

    /// Moves the item at `from` to `to`, shifting the items in between.
    pub fn move_item_at_index<F>(&self, from: usize, to: usize, done: F) -> ItemOperation
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let (operation, responder) = self.edit_operation("move_item_at_index", done);

        let applied = self
            .inner
            .require_reorderable()
            .and_then(|_| {
                self.inner.mutate(|state| {
                    if from == to {
                        let extent = state.window.len();
                        return if from < extent {
                            Ok(None)
                        } else {
                            Err(CollectionError::OutOfRange {
                                index: from,
                                extent,
                            })
                        };
                    }
                    state.apply_move(from, to).map(Some)
                })
            });

        match applied {
            Err(err) => self.reject(responder, err),
            Ok(None) => responder.finish(Ok(())),
            Ok(Some(record)) => {
                let mirror = Mirror::Move {
                    id: record.id().clone(),
                    from,
                    to,
                };
                self.settle(responder, record, mirror);
            }
        }
        operation
    }

    fn edit_operation<F>(
        &self,
        label: &'static str,
        done: F,
    ) -> (ItemOperation, Responder<Result<()>>)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let operation = ItemOperation::new(label);
        let responder = Responder::once(operation.clone(), self.delivery(), done);
        (operation, responder)
    }

    fn reject(&self, responder: Responder<Result<()>>, err: CollectionError) {
        let operation = responder.operation();
        if err.is_precondition() {
            debug!("Operation {} ({}) rejected: {}", operation.id(), operation.label(), err);
        } else {
            warn!("Operation {} ({}) failed: {}", operation.id(), operation.label(), err);
        }
        responder.finish(Err(err));
    }

    /// Completes an optimistically applied edit: mirrors it to the remote
    /// connection if there is one, and arms the rollback for failure and
    /// cancellation.
    fn settle(&self, responder: Responder<Result<()>>, record: EditRecord, mirror: Mirror) {
        let slot: RecordSlot = Arc::new(Mutex::new(Some(record)));
        let operation = responder.operation().clone();

        {
            let inner = Arc::clone(&self.inner);
            let slot = Arc::clone(&slot);
            operation.on_cancel(move || inner.compensate(&slot, "canceled"));
        }

        if !self.inner.source.is_connection() {
            responder.finish(Ok(()));
            return;
        }

        let inner = Arc::clone(&self.inner);
        let operation_id = operation.id();
        let task = self.inner.api.spawn(async move {
            debug!("Operation {} mirroring {:?}", operation_id, mirror);
            let mirrored = inner.mirror(&mirror).await;
            if let Err(err) = &mirrored {
                warn!("Mirroring {:?} failed: {}", mirror, err);
                inner.compensate(&slot, "remote failure");
            }
            responder.finish(mirrored);
        });
        operation.attach_task(task.abort_handle());
    }
}
