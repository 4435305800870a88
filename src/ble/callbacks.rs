//! User callbacks and the deferred callback queue.
//!
//! The report callback runs inline in the event-delivery context. The scan
//! timeout callback is handed to a bounded queue and run later by a
//! [`CallbackQueue`], keeping callback work out of the radio event path.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ble::advertising::AdvertisingReport;

/// Callback invoked for every advertising report.
pub type ReportCallback = Arc<dyn Fn(&AdvertisingReport<'_>) + Send + Sync>;

/// Callback invoked after a scan timeout.
pub type TimeoutCallback = Arc<dyn Fn() + Send + Sync>;

/// Work items for the deferred queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeferredCallback {
    ScanTimeout,
}

/// Registered user callbacks. Last registration wins.
#[derive(Default)]
pub(crate) struct Callbacks {
    on_report: RwLock<Option<ReportCallback>>,
    on_timeout: RwLock<Option<TimeoutCallback>>,
}

impl Callbacks {
    pub(crate) fn set_report(&self, callback: Option<ReportCallback>) {
        *self.on_report.write() = callback;
    }

    pub(crate) fn set_timeout(&self, callback: Option<TimeoutCallback>) {
        *self.on_timeout.write() = callback;
    }

    pub(crate) fn has_timeout(&self) -> bool {
        self.on_timeout.read().is_some()
    }

    /// Invoke the report callback if one is registered.
    ///
    /// The lock is released before the call so the callback may re-register.
    pub(crate) fn notify_report(&self, report: &AdvertisingReport<'_>) {
        let callback = self.on_report.read().clone();
        if let Some(callback) = callback {
            callback(report);
        }
    }

    pub(crate) fn notify_timeout(&self) {
        let callback = self.on_timeout.read().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Producer half of the deferred queue, owned by the scanner.
pub(crate) struct Deferrer {
    tx: mpsc::Sender<DeferredCallback>,
}

impl Deferrer {
    /// Queue a callback without blocking. Drops it if the queue is full.
    pub(crate) fn defer(&self, job: DeferredCallback) {
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!("Deferred callback queue full, dropping {:?}", job);
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                debug!("Deferred callback queue closed, dropping {:?}", job);
            }
        }
    }
}

/// Consumer of deferred callbacks.
///
/// Obtain it with [`Scanner::take_callback_queue`](crate::ble::Scanner::take_callback_queue)
/// and either drive [`run`](Self::run) on a lower-priority task or call
/// [`dispatch_pending`](Self::dispatch_pending) from your own loop.
pub struct CallbackQueue {
    rx: mpsc::Receiver<DeferredCallback>,
    callbacks: Arc<Callbacks>,
}

impl CallbackQueue {
    /// Process queued callbacks until the scanner is dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            self.dispatch(job);
        }
        debug!("Callback queue closed");
    }

    /// Run every callback queued so far, returning how many ran.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.rx.try_recv() {
            self.dispatch(job);
            count += 1;
        }
        count
    }

    fn dispatch(&self, job: DeferredCallback) {
        match job {
            DeferredCallback::ScanTimeout => self.callbacks.notify_timeout(),
        }
    }
}

/// Create a bounded deferred queue of `depth` slots.
///
/// `depth` must be non-zero.
pub(crate) fn deferred_queue(depth: usize, callbacks: Arc<Callbacks>) -> (Deferrer, CallbackQueue) {
    let (tx, rx) = mpsc::channel(depth);
    (Deferrer { tx }, CallbackQueue { rx, callbacks })
}
