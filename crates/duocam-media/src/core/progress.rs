//! Progress reporting for pipeline steps.
//!
//! Stages receive a `&dyn ProgressReporter` and never learn where updates go
//! (a channel to a task-status view, a log line, nothing at all). Reporting
//! is advisory: a failing or full sink never fails the stage.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use duocam_models::{scale_percent, ProgressUpdate, TaskStatus};

/// Destination for progress updates.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);

    fn started(&self, step: &str, percent: u8) {
        self.report(ProgressUpdate::new(step, TaskStatus::Started, percent));
    }

    fn running(&self, step: &str, percent: u8) {
        self.report(ProgressUpdate::new(step, TaskStatus::Running, percent));
    }

    fn finished(&self, step: &str, percent: u8) {
        self.report(ProgressUpdate::new(step, TaskStatus::Finished, percent));
    }

    fn failed(&self, step: &str, error: &str) {
        self.report(ProgressUpdate::failed(step, error));
    }
}

impl<R: ProgressReporter + ?Sized> ProgressReporter for Arc<R> {
    fn report(&self, update: ProgressUpdate) {
        (**self).report(update)
    }
}

impl<R: ProgressReporter + ?Sized> ProgressReporter for &R {
    fn report(&self, update: ProgressUpdate) {
        (**self).report(update)
    }
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _update: ProgressUpdate) {}
}

/// Logs updates at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, update: ProgressUpdate) {
        debug!(
            step = %update.step,
            status = %update.status,
            percent = update.percent,
            error = ?update.error,
            "Progress"
        );
    }
}

/// Callback type accepted by [`CallbackReporter`].
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Forwards updates to a closure. A panicking callback is logged and ignored.
#[derive(Clone)]
pub struct CallbackReporter {
    callback: ProgressCallback,
}

impl CallbackReporter {
    pub fn new(callback: impl Fn(ProgressUpdate) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }
}

impl ProgressReporter for CallbackReporter {
    fn report(&self, update: ProgressUpdate) {
        let step = update.step.clone();
        if panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(update))).is_err() {
            warn!(step = %step, "Progress callback panicked, update dropped");
        }
    }
}

/// Sends updates over a bounded channel without blocking.
///
/// Updates are dropped when the channel is full or the receiver is gone.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressUpdate>,
}

impl ProgressSender {
    pub fn new(tx: mpsc::Sender<ProgressUpdate>) -> Self {
        Self { tx }
    }
}

impl ProgressReporter for ProgressSender {
    fn report(&self, update: ProgressUpdate) {
        let _ = self.tx.try_send(update);
    }
}

/// Receiving end of [`channel`].
pub struct ProgressReceiver {
    rx: mpsc::Receiver<ProgressUpdate>,
}

impl ProgressReceiver {
    pub async fn recv(&mut self) -> Option<ProgressUpdate> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProgressUpdate> {
        self.rx.try_recv().ok()
    }

    /// Everything currently queued.
    pub fn drain(&mut self) -> Vec<ProgressUpdate> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Create a progress channel holding up to `capacity` pending updates.
pub fn channel(capacity: usize) -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ProgressSender::new(tx), ProgressReceiver { rx })
}

/// Maps a stage's own 0-100 progress into a band of the overall job.
pub struct BandReporter<R> {
    inner: R,
    start: u8,
    end: u8,
}

impl<R: ProgressReporter> BandReporter<R> {
    pub fn new(inner: R, start: u8, end: u8) -> Self {
        Self { inner, start, end }
    }
}

impl<R: ProgressReporter> ProgressReporter for BandReporter<R> {
    fn report(&self, mut update: ProgressUpdate) {
        update.percent = scale_percent(self.start, self.end, update.percent);
        self.inner.report(update);
    }
}
