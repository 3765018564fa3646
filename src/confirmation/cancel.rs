//! Cancellation sources for confirmation waits

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a wait ended without a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    DeadlineExceeded,
    Cancelled,
}

/// Fires a manual cancellation
#[derive(Debug)]
pub struct CancelHandle {
    signal: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }
}

/// Deadline and/or manual signal bound to one wait
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    deadline: Option<Instant>,
    signal: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    /// Cancel once `timeout` has elapsed from now
    pub fn after(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            signal: None,
        }
    }

    /// Manually cancellable, with no deadline
    pub fn manual() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle { signal: tx },
            Self {
                deadline: None,
                signal: Some(rx),
            },
        )
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Reason, if the cancellation already fired
    pub fn fired(&self) -> Option<CancelReason> {
        if self.signal.as_ref().map(|rx| *rx.borrow()).unwrap_or(false) {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.fired().is_some()
    }

    /// Resolves when the cancellation fires. Pending forever if it never can.
    pub async fn cancelled(&self) -> CancelReason {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        let signal = async {
            match self.signal.clone() {
                Some(mut rx) => {
                    // A dropped handle can no longer cancel
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = signal => CancelReason::Cancelled,
            _ = deadline => CancelReason::DeadlineExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_fires() {
        let cancellation = Cancellation::after(Duration::from_millis(5));
        assert!(!cancellation.is_cancelled());
        assert_eq!(cancellation.cancelled().await, CancelReason::DeadlineExceeded);
        assert_eq!(cancellation.fired(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_manual_cancel_wins() {
        let (handle, cancellation) = Cancellation::manual();
        let cancellation = cancellation.with_deadline(Instant::now() + Duration::from_secs(60));

        handle.cancel();
        assert_eq!(cancellation.fired(), Some(CancelReason::Cancelled));
        assert_eq!(cancellation.cancelled().await, CancelReason::Cancelled);
    }

    #[tokio::test]
    async fn test_dropped_handle_never_cancels() {
        let (handle, cancellation) = Cancellation::manual();
        drop(handle);

        let waited = tokio::time::timeout(Duration::from_millis(20), cancellation.cancelled()).await;
        assert!(waited.is_err());
        assert!(!cancellation.is_cancelled());
    }
}
