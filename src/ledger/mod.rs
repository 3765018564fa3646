//! Ledger module - the capability every other component talks to the chain through
//!
//! This module provides:
//! - The `LedgerGateway` trait (view calls, signed transactions, log filters, nonces)
//! - An ethers-backed gateway with multi-RPC failover
//! - Gas price policy
//! - ABI helpers for selectors, event topics and argument encoding

pub mod abi;
pub mod gas;
pub mod provider;

pub use gas::GasPolicy;
pub use provider::EthersGateway;

use crate::error::AnchorResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Filter, Log, TransactionReceipt, H256};
use serde::{Deserialize, Serialize};

/// Options attached to a state-changing ledger call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOptions {
    /// Submitting account
    pub from: Address,
    /// Nonce to sign with. Filled in by the transaction submitter.
    pub nonce: Option<u64>,
    pub gas_limit: u64,
}

impl TxOptions {
    pub fn new(from: Address, gas_limit: u64) -> Self {
        Self {
            from,
            nonce: None,
            gas_limit,
        }
    }

    /// Copy of these options pinned to a nonce
    pub fn with_nonce(&self, nonce: u64) -> Self {
        Self {
            nonce: Some(nonce),
            ..self.clone()
        }
    }
}

/// A transaction accepted by the node for broadcast. Not yet mined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedTransaction {
    pub hash: H256,
    pub nonce: u64,
}

/// Opaque ledger capability
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Account transactions are signed with
    fn account(&self) -> Address;

    /// Read-only contract call evaluated against pending state
    async fn call(&self, to: Address, data: Bytes) -> AnchorResult<Bytes>;

    /// Sign and broadcast a contract call using the nonce in `opts`
    async fn transact(
        &self,
        opts: &TxOptions,
        to: Address,
        data: Bytes,
    ) -> AnchorResult<SubmittedTransaction>;

    /// Point-in-time log query
    async fn filter_logs(&self, filter: &Filter) -> AnchorResult<Vec<Log>>;

    async fn transaction_receipt(&self, hash: H256) -> AnchorResult<Option<TransactionReceipt>>;

    async fn block_number(&self) -> AnchorResult<u64>;

    /// Next nonce for `account` as reported by the node, pending block included
    async fn chain_nonce(&self, account: Address) -> AnchorResult<u64>;

    /// Nonces of `account` currently sitting in the node's transaction pool.
    /// `None` when the node does not expose its pool.
    async fn pending_pool_nonces(&self, account: Address) -> AnchorResult<Option<Vec<u64>>>;
}
