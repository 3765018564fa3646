//! Confirmation module - waits for the ledger event proving a write landed
//!
//! A confirmation task polls point-in-time log filters from a start block
//! until a matching event shows up, the filter fails, or its cancellation
//! fires. Restarting a task with the same start block resumes the wait.

mod cancel;
mod watch;

pub use cancel::{CancelHandle, CancelReason, Cancellation};
pub use watch::{watch, WatchReceiver, WatchResult};

use crate::config::LedgerConfig;
use crate::error::{AnchorError, AnchorResult};
use crate::events::{self, LedgerEvent};
use crate::ledger::LedgerGateway;
use crate::queue::{Task, TaskParams, TaskQueue};

use async_trait::async_trait;
use ethers::types::Filter;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Parameter holding the block to start filtering from
pub const BLOCK_HEIGHT_PARAM: &str = "block_height";

/// Describes the event a confirmation task waits for
pub trait EventWatcher: Send + Sync + 'static {
    /// Name the task type is registered under
    fn task_name(&self) -> &'static str;

    fn event_name(&self) -> &'static str;

    /// Contract address and topics to filter on. The start block is set by the task.
    fn filter(&self) -> Filter;

    /// Whether a decoded event is the one being waited for
    fn matches(&self, event: &LedgerEvent) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    Created,
    ContextBound,
    Filtering,
    Found,
    SubscriptionError,
    Cancelled,
}

/// Polling cadence and default wait bound
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationTiming {
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
}

impl ConfirmationTiming {
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            wait_timeout: config.wait_timeout(),
        }
    }
}

/// Single-use wait for one ledger event
pub struct ConfirmationTask<W: EventWatcher> {
    watcher: W,
    gateway: Arc<dyn LedgerGateway>,
    start_block: u64,
    timing: ConfirmationTiming,
    cancellation: Option<Cancellation>,
    state: ConfirmationState,
}

impl<W: EventWatcher> ConfirmationTask<W> {
    pub fn new(
        watcher: W,
        gateway: Arc<dyn LedgerGateway>,
        start_block: u64,
        timing: ConfirmationTiming,
    ) -> Self {
        Self {
            watcher,
            gateway,
            start_block,
            timing,
            cancellation: None,
            state: ConfirmationState::Created,
        }
    }

    /// Bind an explicit cancellation instead of the default wait timeout
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub fn state(&self) -> ConfirmationState {
        self.state
    }

    /// Poll until the watched event is found or the wait ends
    pub async fn wait(&mut self) -> AnchorResult<LedgerEvent> {
        let started = Instant::now();
        let event_name = self.watcher.event_name();

        let cancellation = self
            .cancellation
            .take()
            .unwrap_or_else(|| Cancellation::after(self.timing.wait_timeout));
        self.state = ConfirmationState::ContextBound;

        let result = self.poll(&cancellation).await;

        let outcome = match &result {
            Ok(_) => "found",
            Err(AnchorError::ConfirmationTimeout { .. }) => "timeout",
            Err(AnchorError::ConfirmationCancelled { .. }) => "cancelled",
            Err(_) => "subscription_error",
        };
        crate::metrics::record_confirmation(event_name, outcome);
        crate::metrics::record_confirmation_latency(event_name, started.elapsed().as_secs_f64());

        result
    }

    async fn poll(&mut self, cancellation: &Cancellation) -> AnchorResult<LedgerEvent> {
        let filter = self.watcher.filter().from_block(self.start_block);
        let gateway = self.gateway.clone();
        let event_name = self.watcher.event_name();

        debug!("Waiting for {} from block {}", event_name, self.start_block);

        loop {
            if let Some(reason) = cancellation.fired() {
                return Err(self.cancelled(reason));
            }
            self.state = ConfirmationState::Filtering;

            let filtered = tokio::select! {
                biased;
                reason = cancellation.cancelled() => Err(reason),
                logs = gateway.filter_logs(&filter) => Ok(logs),
            };

            let logs = match filtered {
                Ok(Ok(logs)) => logs,
                Ok(Err(e)) => {
                    self.state = ConfirmationState::SubscriptionError;
                    warn!("Failed to filter {} logs: {}", event_name, e);
                    return Err(AnchorError::ConfirmationSubscription {
                        event: event_name.to_string(),
                        message: e.to_string(),
                    });
                }
                Err(reason) => return Err(self.cancelled(reason)),
            };

            for log in &logs {
                match events::parse_log(log) {
                    Ok(event) if self.watcher.matches(&event) => {
                        self.state = ConfirmationState::Found;
                        info!(
                            "Received filtered event {} in block {} (tx {:?})",
                            event_name,
                            event.block_number(),
                            event.tx_hash()
                        );
                        return Ok(event);
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Skipping undecodable log while waiting for {}: {}", event_name, e),
                }
            }

            debug!("{} not found yet, {} logs inspected", event_name, logs.len());

            tokio::select! {
                biased;
                reason = cancellation.cancelled() => return Err(self.cancelled(reason)),
                _ = tokio::time::sleep(self.timing.poll_interval) => {}
            }
        }
    }

    fn cancelled(&mut self, reason: CancelReason) -> AnchorError {
        self.state = ConfirmationState::Cancelled;
        let event = self.watcher.event_name().to_string();
        warn!("Stopped waiting for {}: {:?}", event, reason);

        match reason {
            CancelReason::DeadlineExceeded => AnchorError::ConfirmationTimeout {
                operation: format!("{} event", event),
            },
            CancelReason::Cancelled => AnchorError::ConfirmationCancelled { event },
        }
    }
}

#[async_trait]
impl<W: EventWatcher> Task for ConfirmationTask<W> {
    fn name(&self) -> &'static str {
        self.watcher.task_name()
    }

    async fn run(self: Box<Self>) -> AnchorResult<Value> {
        let mut task = *self;
        let event = task.wait().await?;
        serde_json::to_value(&event).map_err(|e| AnchorError::Internal(e.to_string()))
    }
}

/// Register a confirmation task type whose watcher is built from dispatch parameters.
///
/// Every confirmation task accepts an optional `block_height` parameter to
/// start filtering from, defaulting to the genesis block. The wait deadline
/// runs from dispatch, so time spent queued for a worker counts against it.
pub fn register_watcher<W, P>(
    queue: &TaskQueue,
    task_name: &str,
    gateway: Arc<dyn LedgerGateway>,
    timing: ConfirmationTiming,
    parse: P,
) where
    W: EventWatcher,
    P: Fn(&TaskParams) -> AnchorResult<W> + Send + Sync + 'static,
{
    queue.register(task_name, move |params| {
        let watcher = parse(params)?;
        let start_block = params.optional_u64(BLOCK_HEIGHT_PARAM, 0)?;
        let task = ConfirmationTask::new(watcher, gateway.clone(), start_block, timing)
            .with_cancellation(Cancellation::after(timing.wait_timeout));
        Ok(Box::new(task) as Box<dyn Task>)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::topics;
    use crate::testing::{logs, FakeLedger};
    use ethers::types::Address;
    use std::sync::atomic::Ordering;

    struct KeyWatcher {
        identity: Address,
        key: [u8; 32],
    }

    impl EventWatcher for KeyWatcher {
        fn task_name(&self) -> &'static str {
            "test_key_confirmation"
        }

        fn event_name(&self) -> &'static str {
            "key_added"
        }

        fn filter(&self) -> Filter {
            Filter::new()
                .address(self.identity)
                .topic0(*topics::KEY_ADDED)
        }

        fn matches(&self, event: &LedgerEvent) -> bool {
            matches!(event, LedgerEvent::KeyAdded { key, .. } if *key == self.key)
        }
    }

    fn timing() -> ConfirmationTiming {
        ConfirmationTiming {
            poll_interval: Duration::from_millis(5),
            wait_timeout: Duration::from_secs(2),
        }
    }

    fn task(ledger: Arc<FakeLedger>, start_block: u64) -> ConfirmationTask<KeyWatcher> {
        let watcher = KeyWatcher {
            identity: Address::repeat_byte(0x33),
            key: [5u8; 32],
        };
        ConfirmationTask::new(watcher, ledger, start_block, timing())
    }

    #[tokio::test]
    async fn test_found_after_polling() {
        let ledger = Arc::new(FakeLedger::new());
        let mut task = task(ledger.clone(), 0);
        assert_eq!(task.state(), ConfirmationState::Created);

        let fake = ledger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            fake.push_log(logs::key_added(Address::repeat_byte(0x33), [9u8; 32], 1, 3));
            fake.push_log(logs::key_added(Address::repeat_byte(0x33), [5u8; 32], 1, 4));
        });

        let event = task.wait().await.unwrap();
        assert_eq!(event.block_number(), 4);
        assert_eq!(task.state(), ConfirmationState::Found);
        assert!(ledger.filters.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_start_block_respected() {
        let ledger = Arc::new(FakeLedger::new());
        ledger.push_log(logs::key_added(Address::repeat_byte(0x33), [5u8; 32], 1, 4));

        let mut task = task(ledger.clone(), 10)
            .with_cancellation(Cancellation::after(Duration::from_millis(30)));

        let err = task.wait().await.unwrap_err();
        assert!(matches!(err, AnchorError::ConfirmationTimeout { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_match() {
        let ledger = Arc::new(FakeLedger::new());
        let (handle, cancellation) = Cancellation::manual();
        let mut task = task(ledger, 0).with_cancellation(cancellation);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            handle.cancel();
        });

        let err = task.wait().await.unwrap_err();
        assert!(matches!(err, AnchorError::ConfirmationCancelled { ref event } if event == "key_added"));
        assert_eq!(task.state(), ConfirmationState::Cancelled);
    }

    #[tokio::test]
    async fn test_filter_error_is_not_retried() {
        let ledger = Arc::new(FakeLedger::new());
        ledger.fail_next_filter("connection reset");
        let mut task = task(ledger.clone(), 0);

        let err = task.wait().await.unwrap_err();
        match err {
            AnchorError::ConfirmationSubscription { event, message } => {
                assert_eq!(event, "key_added");
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ledger.filters.load(Ordering::SeqCst), 1);
        assert_eq!(task.state(), ConfirmationState::SubscriptionError);
    }

    #[tokio::test]
    async fn test_registered_watcher_runs_through_queue() {
        let ledger = Arc::new(FakeLedger::new());
        ledger.push_log(logs::key_added(Address::repeat_byte(0x33), [5u8; 32], 2, 8));

        let queue = TaskQueue::with_workers(2);
        register_watcher(&queue, "test_key_confirmation", ledger.clone(), timing(), |params| {
            Ok(KeyWatcher {
                identity: params.address("identity")?,
                key: params.bytes::<32>("key")?,
            })
        });

        let params = TaskParams::new()
            .with_address("identity", Address::repeat_byte(0x33))
            .with_bytes("key", &[5u8; 32])
            .with_u64(BLOCK_HEIGHT_PARAM, 8);
        let event: LedgerEvent = queue
            .dispatch("test_key_confirmation", params)
            .unwrap()
            .get_as(Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(event.name(), "key_added");

        let err = queue
            .dispatch("test_key_confirmation", TaskParams::new().with_bytes("key", &[5u8; 32]))
            .unwrap_err();
        assert!(matches!(err, AnchorError::Parameter { ref key, .. } if key == "identity"));
    }

    #[tokio::test]
    async fn test_queued_waits_stop_with_their_result() {
        let ledger = Arc::new(FakeLedger::new());
        let queue = TaskQueue::with_workers(1);
        let short = ConfirmationTiming {
            poll_interval: Duration::from_millis(5),
            wait_timeout: Duration::from_millis(100),
        };
        register_watcher(&queue, "test_key_confirmation", ledger.clone(), short, |_| {
            Ok(KeyWatcher {
                identity: Address::repeat_byte(0x33),
                key: [5u8; 32],
            })
        });

        let first = queue.dispatch("test_key_confirmation", TaskParams::new()).unwrap();
        let second = queue.dispatch("test_key_confirmation", TaskParams::new()).unwrap();
        let (first, second) = tokio::join!(
            first.get(short.wait_timeout),
            second.get(short.wait_timeout)
        );
        assert!(matches!(first, Err(AnchorError::ConfirmationTimeout { .. })));
        assert!(matches!(second, Err(AnchorError::ConfirmationTimeout { .. })));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let filtered = ledger.filters.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ledger.filters.load(Ordering::SeqCst), filtered);
    }
}
