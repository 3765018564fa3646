//! Transaction status task - waits for a receipt of a broadcast transaction

use crate::confirmation::{CancelReason, Cancellation, ConfirmationTiming};
use crate::error::{AnchorError, AnchorResult};
use crate::ledger::LedgerGateway;
use crate::queue::{Task, TaskParams, TaskQueue};

use async_trait::async_trait;
use ethers::types::H256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub const TRANSACTION_STATUS_TASK: &str = "transaction_status";
pub const TX_HASH_PARAM: &str = "tx_hash";

/// A mined, successful transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub tx_hash: H256,
    pub block_number: u64,
}

pub struct TransactionStatusTask {
    gateway: Arc<dyn LedgerGateway>,
    tx_hash: H256,
    timing: ConfirmationTiming,
    deadline: Cancellation,
}

impl TransactionStatusTask {
    /// The wait timeout starts counting when the task is built
    pub fn new(gateway: Arc<dyn LedgerGateway>, tx_hash: H256, timing: ConfirmationTiming) -> Self {
        Self {
            gateway,
            tx_hash,
            timing,
            deadline: Cancellation::after(timing.wait_timeout),
        }
    }

    pub async fn wait(&self, cancellation: Cancellation) -> AnchorResult<TransactionStatus> {
        loop {
            if let Some(reason) = cancellation.fired() {
                return Err(self.cancelled(reason));
            }

            let lookup = tokio::select! {
                biased;
                reason = cancellation.cancelled() => return Err(self.cancelled(reason)),
                receipt = self.gateway.transaction_receipt(self.tx_hash) => receipt,
            };

            match lookup? {
                Some(receipt) if receipt.status.map(|s| s.as_u64()) == Some(1) => {
                    let block_number = receipt.block_number.map(|b| b.as_u64()).unwrap_or(0);
                    info!("Transaction {:?} mined in block {}", self.tx_hash, block_number);
                    return Ok(TransactionStatus {
                        tx_hash: self.tx_hash,
                        block_number,
                    });
                }
                Some(_) => {
                    return Err(AnchorError::Submission(format!(
                        "transaction {:?} reverted",
                        self.tx_hash
                    )))
                }
                None => debug!("Transaction {:?} not mined yet", self.tx_hash),
            }

            tokio::select! {
                biased;
                reason = cancellation.cancelled() => return Err(self.cancelled(reason)),
                _ = tokio::time::sleep(self.timing.poll_interval) => {}
            }
        }
    }

    fn cancelled(&self, reason: CancelReason) -> AnchorError {
        match reason {
            CancelReason::DeadlineExceeded => AnchorError::ConfirmationTimeout {
                operation: format!("receipt of {:?}", self.tx_hash),
            },
            CancelReason::Cancelled => AnchorError::ConfirmationCancelled {
                event: format!("receipt of {:?}", self.tx_hash),
            },
        }
    }
}

#[async_trait]
impl Task for TransactionStatusTask {
    fn name(&self) -> &'static str {
        TRANSACTION_STATUS_TASK
    }

    async fn run(self: Box<Self>) -> AnchorResult<Value> {
        let status = self.wait(self.deadline.clone()).await?;
        serde_json::to_value(status).map_err(|e| AnchorError::Internal(e.to_string()))
    }
}

pub fn register(queue: &TaskQueue, gateway: Arc<dyn LedgerGateway>, timing: ConfirmationTiming) {
    queue.register(TRANSACTION_STATUS_TASK, move |params: &TaskParams| {
        let tx_hash = params.h256(TX_HASH_PARAM)?;
        Ok(Box::new(TransactionStatusTask::new(gateway.clone(), tx_hash, timing)) as Box<dyn Task>)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{receipt, FakeLedger};
    use ethers::types::U64;
    use std::time::Duration;

    fn timing() -> ConfirmationTiming {
        ConfirmationTiming {
            poll_interval: Duration::from_millis(5),
            wait_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_waits_for_receipt() {
        let ledger = Arc::new(FakeLedger::new());
        let queue = TaskQueue::with_workers(1);
        register(&queue, ledger.clone(), timing());

        let hash = H256::repeat_byte(0x77);
        let handle = queue
            .dispatch(
                TRANSACTION_STATUS_TASK,
                TaskParams::new().with_bytes(TX_HASH_PARAM, hash.as_bytes()),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        ledger.insert_receipt(receipt(hash, 12));

        let status: TransactionStatus = handle.get_as(Duration::from_secs(2)).await.unwrap();
        assert_eq!(status, TransactionStatus { tx_hash: hash, block_number: 12 });
    }

    #[tokio::test]
    async fn test_reverted_transaction() {
        let ledger = Arc::new(FakeLedger::new());
        let hash = H256::repeat_byte(0x78);
        let mut failed = receipt(hash, 3);
        failed.status = Some(U64::zero());
        ledger.insert_receipt(failed);

        let task = TransactionStatusTask::new(ledger, hash, timing());
        let err = task.wait(Cancellation::after(Duration::from_secs(1))).await.unwrap_err();
        assert!(matches!(err, AnchorError::Submission(_)));
    }

    #[tokio::test]
    async fn test_never_mined_times_out() {
        let ledger = Arc::new(FakeLedger::new());
        let task = TransactionStatusTask::new(ledger, H256::repeat_byte(1), timing());

        let err = task.wait(Cancellation::after(Duration::from_millis(20))).await.unwrap_err();
        assert!(matches!(err, AnchorError::ConfirmationTimeout { .. }));
    }

    #[tokio::test]
    async fn test_queued_wait_counts_from_dispatch() {
        let ledger = Arc::new(FakeLedger::new());
        let queue = TaskQueue::with_workers(1);
        let short = ConfirmationTiming {
            poll_interval: Duration::from_millis(5),
            wait_timeout: Duration::from_millis(100),
        };
        register(&queue, ledger, short);

        let started = std::time::Instant::now();
        let params = TaskParams::new().with_bytes(TX_HASH_PARAM, H256::repeat_byte(2).as_bytes());
        let first = queue.dispatch(TRANSACTION_STATUS_TASK, params.clone()).unwrap();
        let second = queue.dispatch(TRANSACTION_STATUS_TASK, params).unwrap();
        let (first, second) = tokio::join!(
            first.get(Duration::from_secs(1)),
            second.get(Duration::from_secs(1))
        );

        for result in [first, second] {
            match result {
                Err(AnchorError::ConfirmationTimeout { operation }) => {
                    assert!(operation.starts_with("receipt of"), "{}", operation)
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        // The second wait does not restart its clock once it gets the worker
        assert!(started.elapsed() < Duration::from_millis(180));
    }
}
