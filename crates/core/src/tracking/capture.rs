use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;

use crate::shared::TrackId;
use crate::tracking::candidate::TrackingStatus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// The request was replaced, or the pipeline shut down before the
    /// track appeared again.
    #[error("capture request was cancelled")]
    Cancelled,
    #[error("capture request timed out")]
    TimedOut,
}

/// Caller-side half of a capture request: a one-shot completion that
/// resolves with the track's status once the identity stage consumes
/// the request, potentially several frames later.
pub struct CaptureTicket {
    rx: crossbeam_channel::Receiver<TrackingStatus>,
}

impl CaptureTicket {
    /// Blocks until the capture resolves.
    pub fn wait(self) -> Result<TrackingStatus, CaptureError> {
        self.rx.recv().map_err(|_| CaptureError::Cancelled)
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<TrackingStatus, CaptureError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => CaptureError::TimedOut,
            crossbeam_channel::RecvTimeoutError::Disconnected => CaptureError::Cancelled,
        })
    }
}

/// Consumed capture request: resolving it delivers the status to the
/// waiting ticket exactly once.
pub struct PendingCapture {
    track_id: TrackId,
    tx: crossbeam_channel::Sender<TrackingStatus>,
}

impl PendingCapture {
    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    /// The waiter may have given up; a dead receiver is not an error.
    pub fn resolve(self, status: TrackingStatus) {
        let _ = self.tx.send(status);
    }
}

/// Pending capture requests by tracking id.
///
/// Requests originate outside the pipeline (operator interaction) while
/// consumption happens on the identity stage, so registration and
/// removal are an atomic check-and-remove on an internally locked map.
#[derive(Default)]
pub struct CaptureRegistry {
    pending: Mutex<HashMap<TrackId, crossbeam_channel::Sender<TrackingStatus>>>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a capture for `id`. A request already pending for the
    /// same id is replaced; its ticket observes `Cancelled`.
    pub fn register(&self, id: TrackId) -> CaptureTicket {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.lock().insert(id, tx);
        CaptureTicket { rx }
    }

    /// Atomically removes and returns the pending request for `id`.
    pub fn take(&self, id: TrackId) -> Option<PendingCapture> {
        self.lock()
            .remove(&id)
            .map(|tx| PendingCapture { track_id: id, tx })
    }

    pub fn has_pending(&self, id: TrackId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<TrackId, crossbeam_channel::Sender<TrackingStatus>>>
    {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
