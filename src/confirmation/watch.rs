//! Routing task outcomes to single-use result channels

use crate::error::{AnchorError, AnchorResult};
use crate::events::LedgerEvent;
use crate::queue::TaskHandle;

use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Outcome of a watched ledger write
#[derive(Debug)]
pub struct WatchResult<T> {
    pub payload: T,
    pub error: Option<AnchorError>,
}

impl<T> WatchResult<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            payload,
            error: None,
        }
    }

    pub fn failed(payload: T, error: AnchorError) -> Self {
        Self {
            payload,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> AnchorResult<T> {
        match self.error {
            None => Ok(self.payload),
            Some(e) => Err(e),
        }
    }
}

/// Receives exactly one `WatchResult`
pub type WatchReceiver<T> = oneshot::Receiver<WatchResult<T>>;

/// Wait on a confirmation task in the background and send its outcome once.
///
/// `on_event` folds the confirmed event into the payload. On failure the
/// payload is sent unchanged alongside the error.
pub fn watch<T, F>(handle: TaskHandle, timeout: Duration, payload: T, on_event: F) -> WatchReceiver<T>
where
    T: Send + 'static,
    F: FnOnce(T, LedgerEvent) -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let task_id = handle.id;
        let result = match handle.get_as::<LedgerEvent>(timeout).await {
            Ok(event) => WatchResult::ok(on_event(payload, event)),
            Err(e) => {
                if e.is_confirmation_failure() {
                    warn!("Confirmation of task {} failed: {}", task_id, e);
                }
                WatchResult::failed(payload, e)
            }
        };

        if tx.send(result).is_err() {
            debug!("Watch result of task {} dropped, nobody listening", task_id);
        }
    });

    rx
}
