//! Cross-thread deferred work.
//!
//! Any thread may enqueue a job; the frame thread drains the queue to empty
//! once per frame, in enqueue order.

use tokio::sync::mpsc;

pub type DeferredJob = Box<dyn FnOnce() + Send + 'static>;

/// Sending half of the deferred-work queue. Cheap to clone, safe to move across threads.
#[derive(Clone)]
pub struct DeferredSender {
    tx: mpsc::UnboundedSender<DeferredJob>,
}

impl DeferredSender {
    /// Queue `job` for the next frame. Returns `false` if the runtime is gone.
    pub fn defer(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }
}

impl std::fmt::Debug for DeferredSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredSender")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

pub(crate) struct DeferredQueue {
    tx: mpsc::UnboundedSender<DeferredJob>,
    rx: mpsc::UnboundedReceiver<DeferredJob>,
}

impl DeferredQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub(crate) fn sender(&self) -> DeferredSender {
        DeferredSender {
            tx: self.tx.clone(),
        }
    }

    /// Pop the next job without blocking.
    pub(crate) fn next_job(&mut self) -> Option<DeferredJob> {
        self.rx.try_recv().ok()
    }
}
