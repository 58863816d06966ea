//! Deferred work queued on the arbiter's owning context.
//!
//! The arbiter coalesces each kind of task behind a pending flag, so the
//! queue holds at most one of each. Everything queued belongs to one
//! cancellation scope: cancelling drops the backlog and stops the driver.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Work the arbiter defers to its owning context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeferredTask {
    /// Recompute the audio-session category.
    UpdateSessionState,
    /// Re-activate the audio session if required, then update state.
    ReevaluateAudioActivation,
    /// Recompute now-playing info and notify observers on change.
    UpdateNowPlayingInfo,
    /// Log every session's description.
    DumpSessionStates,
}

impl DeferredTask {
    pub(crate) const COUNT: usize = 4;

    pub(crate) fn index(self) -> usize {
        match self {
            DeferredTask::UpdateSessionState => 0,
            DeferredTask::ReevaluateAudioActivation => 1,
            DeferredTask::UpdateNowPlayingInfo => 2,
            DeferredTask::DumpSessionStates => 3,
        }
    }
}

pub struct TaskQueue {
    tx: mpsc::UnboundedSender<DeferredTask>,
    rx: Mutex<mpsc::UnboundedReceiver<DeferredTask>>,
    queued: AtomicUsize,
    cancel: CancellationToken,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            queued: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Queue a task. Returns false once the queue has been cancelled.
    pub fn enqueue(&self, task: DeferredTask) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self.tx.send(task).is_err() {
            return false;
        }
        self.queued.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Pop the next task without waiting.
    ///
    /// Returns None when the queue is empty, cancelled, or an async driver
    /// currently owns the receiver.
    pub fn try_next(&self) -> Option<DeferredTask> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let mut rx = self.rx.try_lock().ok()?;
        let task = rx.try_recv().ok()?;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        Some(task)
    }

    /// Wait for the next task. Returns None once cancelled.
    pub async fn next(&self) -> Option<DeferredTask> {
        let mut rx = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            rx = self.rx.lock() => rx,
        };

        let task = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            task = rx.recv() => task,
        }?;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        Some(task)
    }

    /// Cancel the scope. Queued tasks never run.
    pub fn cancel(&self) {
        self.cancel.cancel();
        if let Ok(mut rx) = self.rx.try_lock() {
            rx.close();
            while rx.try_recv().is_ok() {}
        }
        self.queued.store(0, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token for work the host wants cancelled together with this queue.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
