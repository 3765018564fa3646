//! Transaction submitter with nonce-race retries

use super::nonce::NonceCalculator;
use crate::config::LedgerConfig;
use crate::error::{AnchorError, AnchorResult};
use crate::ledger::{LedgerGateway, SubmittedTransaction, TxOptions};

use ethers::types::{Address, Bytes};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Submits transactions, retrying when another transaction raced for the nonce.
///
/// There is no lock around nonce selection. Concurrent callers each derive
/// their own nonce and rely on the retry to resolve collisions.
pub struct TransactionSubmitter {
    gateway: Arc<dyn LedgerGateway>,
    nonces: NonceCalculator,
    /// Total number of attempts, first one included
    max_retries: u32,
    /// Pause between attempts after a nonce race
    interval_retry: Duration,
}

impl TransactionSubmitter {
    /// Create a new transaction submitter
    pub fn new(gateway: Arc<dyn LedgerGateway>, config: &LedgerConfig) -> Self {
        Self::with_retry_policy(gateway, config.max_retries, config.interval_retry())
    }

    pub fn with_retry_policy(
        gateway: Arc<dyn LedgerGateway>,
        max_retries: u32,
        interval_retry: Duration,
    ) -> Self {
        Self {
            nonces: NonceCalculator::new(gateway.clone()),
            gateway,
            max_retries: max_retries.max(1),
            interval_retry,
        }
    }

    /// Gateway transactions are sent through
    pub fn gateway(&self) -> &Arc<dyn LedgerGateway> {
        &self.gateway
    }

    /// Options for a transaction from the gateway's account
    pub fn tx_options(&self, gas_limit: u64) -> TxOptions {
        TxOptions::new(self.gateway.account(), gas_limit)
    }

    /// Submit a transaction built by `tx_fn`.
    ///
    /// `tx_fn` is invoked with `opts` pinned to a freshly computed nonce, once
    /// per attempt. Nonce races are retried up to the configured maximum and
    /// the last race error is returned on exhaustion. Any other failure is
    /// returned immediately.
    pub async fn submit<F, Fut>(&self, opts: TxOptions, mut tx_fn: F) -> AnchorResult<SubmittedTransaction>
    where
        F: FnMut(TxOptions) -> Fut + Send,
        Fut: Future<Output = AnchorResult<SubmittedTransaction>> + Send,
    {
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.max_retries {
            attempts += 1;

            let nonce = self.nonces.next_nonce(opts.from).await?;
            debug!("Submitting transaction with nonce {} (attempt {}/{})", nonce, attempts, self.max_retries);

            match tx_fn(opts.with_nonce(nonce)).await {
                Ok(tx) => {
                    info!(
                        "Transaction sent: {:?} with nonce {} (attempt {}/{})",
                        tx.hash, tx.nonce, attempts, self.max_retries
                    );
                    crate::metrics::record_tx_submitted();
                    return Ok(tx);
                }
                Err(e) if e.is_nonce_race() => {
                    warn!(
                        "Concurrent transaction identified, trying again [{}/{}]: {}",
                        attempts, self.max_retries, e
                    );
                    crate::metrics::record_nonce_race();
                    last_error = Some(e);

                    if attempts < self.max_retries {
                        tokio::time::sleep(self.interval_retry).await;
                    }
                }
                Err(e) => {
                    warn!("Transaction rejected with nonce {}: {}", nonce, e);
                    crate::metrics::record_tx_failed();
                    return Err(into_submission_error(e));
                }
            }
        }

        crate::metrics::record_tx_failed();
        Err(last_error
            .map(into_submission_error)
            .unwrap_or_else(|| AnchorError::Submission("no attempt was made".to_string())))
    }

    /// Submit a plain contract call with the gateway's account
    pub async fn submit_call(
        &self,
        to: Address,
        data: Bytes,
        gas_limit: u64,
    ) -> AnchorResult<SubmittedTransaction> {
        let gateway = self.gateway.clone();
        self.submit(self.tx_options(gas_limit), move |opts| {
            let gateway = gateway.clone();
            let data = data.clone();
            async move { gateway.transact(&opts, to, data).await }
        })
        .await
    }
}

fn into_submission_error(err: AnchorError) -> AnchorError {
    match err {
        AnchorError::Ledger(message) => AnchorError::Submission(message),
        other => other,
    }
}
