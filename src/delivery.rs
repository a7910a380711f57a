//! Delivery context for operation callbacks.
//!
//! Callbacks either run inline on the task that completed the work, or are
//! posted to a [`CallbackQueue`] that the owning thread drains through its
//! [`CallbackPump`]. The queue keeps UI-style owners single threaded.

use tokio::sync::mpsc;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where completion callbacks are executed.
#[derive(Debug, Clone, Default)]
pub enum CallbackDelivery {
    /// Run on the background task that produced the result.
    #[default]
    Inline,
    /// Post to a queue drained by the owner.
    Queue(CallbackQueue),
}

impl CallbackDelivery {
    pub(crate) fn dispatch(&self, job: Job) {
        match self {
            Self::Inline => job(),
            Self::Queue(queue) => queue.post(job),
        }
    }
}

/// Sending half of a callback queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CallbackQueue {
    tx: mpsc::UnboundedSender<Job>,
}

/// Receiving half of a callback queue, owned by the thread that should run
/// the callbacks.
pub struct CallbackPump {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl CallbackQueue {
    pub fn new() -> (Self, CallbackPump) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, CallbackPump { rx })
    }

    fn post(&self, job: Job) {
        if self.tx.send(job).is_err() {
            log::warn!("Callback queue closed, dropping completion callback");
        }
    }
}

impl CallbackPump {
    /// Runs every callback queued so far and returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Waits for the next callback and runs it. Returns `false` once every
    /// queue handle has been dropped.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }
}
