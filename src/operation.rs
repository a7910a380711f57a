//! Cancelable handles for in-flight collection requests.
//!
//! Every asynchronous collection call returns an [`ItemOperation`]. The
//! operation moves from pending to either finished or canceled exactly once.
//! The transition to finished happens when the final callback is *delivered*,
//! so a cancel that wins the race suppresses the callback even when the
//! result was already computed.

use crate::delivery::CallbackDelivery;
use log::debug;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::AbortHandle;
use uuid::Uuid;

const PENDING: u8 = 0;
const FINISHED: u8 = 1;
const CANCELED: u8 = 2;

type CancelHook = Box<dyn FnOnce() + Send + 'static>;

struct OperationState {
    id: Uuid,
    label: &'static str,
    status: AtomicU8,
    on_cancel: Mutex<Option<CancelHook>>,
    task: Mutex<Option<AbortHandle>>,
}

/// Handle to one in-flight request.
///
/// Cloning the handle shares the same underlying operation.
#[derive(Clone)]
pub struct ItemOperation {
    state: Arc<OperationState>,
}

impl ItemOperation {
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            state: Arc::new(OperationState {
                id: Uuid::new_v4(),
                label,
                status: AtomicU8::new(PENDING),
                on_cancel: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn label(&self) -> &'static str {
        self.state.label
    }

    pub fn is_pending(&self) -> bool {
        self.state.status.load(Ordering::Acquire) == PENDING
    }

    pub fn is_finished(&self) -> bool {
        self.state.status.load(Ordering::Acquire) == FINISHED
    }

    pub fn is_canceled(&self) -> bool {
        self.state.status.load(Ordering::Acquire) == CANCELED
    }

    /// Cancels the operation.
    ///
    /// Returns `false` when the operation already finished or was canceled
    /// before. After a successful cancel the callback is never invoked again.
    pub fn cancel(&self) -> bool {
        if self
            .state
            .status
            .compare_exchange(PENDING, CANCELED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        debug!("Operation {} ({}) canceled", self.state.id, self.state.label);

        let task = self
            .state
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }

        let hook = self
            .state
            .on_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook();
        }
        true
    }

    /// Registers the background task doing the work so cancel can abort it.
    pub(crate) fn attach_task(&self, task: AbortHandle) {
        if self.is_canceled() {
            task.abort();
            return;
        }
        *self
            .state
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Registers the compensation to run if the operation is canceled.
    pub(crate) fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        *self
            .state
            .on_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    fn try_finish(&self) -> bool {
        if self
            .state
            .status
            .compare_exchange(PENDING, FINISHED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.state
            .on_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.state
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        true
    }
}

impl fmt::Debug for ItemOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.state.status.load(Ordering::Acquire) {
            PENDING => "pending",
            FINISHED => "finished",
            _ => "canceled",
        };
        f.debug_struct("ItemOperation")
            .field("id", &self.state.id)
            .field("label", &self.state.label)
            .field("status", &status)
            .finish()
    }
}

type Callback<A> = Arc<Mutex<Box<dyn FnMut(A) + Send + 'static>>>;

/// Delivers results of one operation to its callback through the configured
/// delivery context.
pub(crate) struct Responder<A> {
    operation: ItemOperation,
    callback: Callback<A>,
    delivery: CallbackDelivery,
}

impl<A> Clone for Responder<A> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            callback: self.callback.clone(),
            delivery: self.delivery.clone(),
        }
    }
}

impl<A: Send + 'static> Responder<A> {
    pub(crate) fn new(
        operation: ItemOperation,
        delivery: CallbackDelivery,
        callback: impl FnMut(A) + Send + 'static,
    ) -> Self {
        Self {
            operation,
            callback: Arc::new(Mutex::new(Box::new(callback))),
            delivery,
        }
    }

    /// Wraps a callback that may only run once.
    pub(crate) fn once(
        operation: ItemOperation,
        delivery: CallbackDelivery,
        callback: impl FnOnce(A) + Send + 'static,
    ) -> Self {
        let mut callback = Some(callback);
        Self::new(operation, delivery, move |value| {
            if let Some(callback) = callback.take() {
                callback(value);
            }
        })
    }

    pub(crate) fn operation(&self) -> &ItemOperation {
        &self.operation
    }

    /// Delivers a provisional value; dropped if the operation is no longer
    /// pending by the time it runs.
    pub(crate) fn provisional(&self, value: A) {
        let operation = self.operation.clone();
        let callback = self.callback.clone();
        self.delivery.dispatch(Box::new(move || {
            if operation.is_pending() {
                let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
                (*callback)(value);
            }
        }));
    }

    /// Delivers the final value and settles the operation.
    pub(crate) fn finish(&self, value: A) {
        let operation = self.operation.clone();
        let callback = self.callback.clone();
        self.delivery.dispatch(Box::new(move || {
            if operation.try_finish() {
                let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
                (*callback)(value);
            } else {
                debug!(
                    "Suppressing callback of canceled operation {} ({})",
                    operation.id(),
                    operation.label()
                );
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::CallbackQueue;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_finish_settles_once() {
        let op = ItemOperation::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let responder = Responder::new(op.clone(), CallbackDelivery::Inline, move |_: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        responder.finish(1);
        responder.finish(2);

        assert!(op.is_finished());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!op.cancel());
    }

    #[test]
    fn test_cancel_before_delivery_suppresses_callback() {
        let (queue, mut pump) = CallbackQueue::new();
        let op = ItemOperation::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let responder = Responder::new(op.clone(), CallbackDelivery::Queue(queue), move |_: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        responder.provisional(0);
        responder.finish(1);
        assert!(op.cancel());
        pump.run_pending();

        assert!(op.is_canceled());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_runs_hook_once() {
        let op = ItemOperation::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        op.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(op.cancel());
        assert!(!op.cancel());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_finish_discards_cancel_hook() {
        let op = ItemOperation::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        op.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let responder = Responder::once(op.clone(), CallbackDelivery::Inline, |_: ()| {});

        responder.finish(());
        assert!(!op.cancel());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
