//! Nonce selection for transaction submission
//!
//! The next nonce is derived from two views of the account:
//! - the chain nonce (transaction count including the pending block)
//! - the node's transaction pool, when it is exposed
//!
//! The next nonce is one past the greater of the chain nonce and the highest
//! pooled nonce. Without a pool view it is one past the chain nonce. When the
//! pool lags the chain the increment can skip a nonce and leave the
//! transaction stuck behind the gap; that case is left as-is.

use crate::error::{AnchorError, AnchorResult};
use crate::ledger::LedgerGateway;

use ethers::types::Address;
use std::sync::Arc;
use tracing::{debug, warn};

/// Next nonce from the chain nonce and the nonces pending in the pool
pub fn calculate_increment(chain_nonce: u64, pool_nonces: Option<&[u64]>) -> u64 {
    match pool_nonces.and_then(|nonces| nonces.iter().copied().max()) {
        Some(highest) if highest >= chain_nonce => highest + 1,
        _ => chain_nonce + 1,
    }
}

/// Looks up both nonce views through the ledger gateway
pub struct NonceCalculator {
    gateway: Arc<dyn LedgerGateway>,
}

impl NonceCalculator {
    pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
        Self { gateway }
    }

    /// Compute the nonce for the next transaction of `account`
    pub async fn next_nonce(&self, account: Address) -> AnchorResult<u64> {
        let chain_nonce = self.gateway.chain_nonce(account).await.map_err(|e| {
            AnchorError::Submission(format!("failed to get chain nonce for {:?}: {}", account, e))
        })?;

        let pool = match self.gateway.pending_pool_nonces(account).await {
            Ok(Some(pool)) => Some(pool),
            Ok(None) => {
                warn!("Ledger client doesn't expose its txpool, may cause concurrency issues");
                None
            }
            Err(e) => {
                warn!("Failed to get txpool data, using chain nonce only: {}", e);
                None
            }
        };

        let nonce = calculate_increment(chain_nonce, pool.as_deref());
        debug!(
            "Nonce for {:?}: chain {}, pool {:?}, using {}",
            account, chain_nonce, pool, nonce
        );
        Ok(nonce)
    }
}
