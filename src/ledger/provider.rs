//! Ethers-backed ledger gateway with multi-RPC support and automatic failover

use super::gas::GasPolicy;
use super::{LedgerGateway, SubmittedTransaction, TxOptions};
use crate::config::LedgerConfig;
use crate::error::{AnchorError, AnchorResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Multi-provider gateway signing with a single local wallet
pub struct EthersGateway {
    /// Ledger configuration
    config: LedgerConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Wallet for signing
    wallet: LocalWallet,
    /// Gas price policy
    gas_policy: GasPolicy,
}

impl EthersGateway {
    /// Create a new gateway
    pub fn new(config: LedgerConfig) -> AnchorResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(AnchorError::Ledger(format!(
                "No valid RPC providers for chain {}",
                config.chain_id
            )));
        }

        let wallet = Self::load_wallet(&config)?.with_chain_id(config.chain_id);
        info!(
            "Ledger gateway for chain {} initialized with account {:?}",
            config.chain_id,
            wallet.address()
        );

        Ok(Self {
            gas_policy: GasPolicy::from_config(&config),
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
            wallet,
        })
    }

    /// Load wallet from the configured environment variable
    fn load_wallet(config: &LedgerConfig) -> AnchorResult<LocalWallet> {
        let key = std::env::var(&config.private_key_env).map_err(|_| {
            AnchorError::Wallet(format!(
                "No wallet configured. Set {} to the account's private key",
                config.private_key_env
            ))
        })?;

        key.trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| AnchorError::Wallet(format!("Invalid private key: {}", e)))
    }

    /// Get the active HTTP provider
    fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    /// Run a read against the active provider, failing over on error
    async fn read_with_failover<'a, T, F, Fut>(&'a self, what: &str, op: F) -> AnchorResult<T>
    where
        F: Fn(&'a Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = String::from("no provider attempted");
        for _ in 0..self.http_providers.len() {
            match timeout(self.config.read_timeout(), op(self.http())).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    warn!("Failed to {} on chain {}: {}", what, self.config.chain_id, e);
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!("Timed out trying to {} on chain {}", what, self.config.chain_id);
                    last_error = format!("timed out trying to {}", what);
                }
            }
            self.failover();
        }

        Err(AnchorError::Ledger(format!(
            "All providers failed to {}: {}",
            what, last_error
        )))
    }

    async fn gas_price(&self) -> AnchorResult<U256> {
        if let Some(price) = self.gas_policy.fixed_price() {
            return Ok(price);
        }
        let node_price = self
            .read_with_failover("get gas price", |p| p.get_gas_price())
            .await?;
        Ok(self.gas_policy.buffered(node_price))
    }
}

#[async_trait]
impl LedgerGateway for EthersGateway {
    fn account(&self) -> Address {
        self.wallet.address()
    }

    async fn call(&self, to: Address, data: Bytes) -> AnchorResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.account())
            .to(to)
            .data(data)
            .into();

        self.read_with_failover("call contract", |p| {
            let tx = tx.clone();
            async move { p.call(&tx, Some(BlockNumber::Pending.into())).await }
        })
        .await
    }

    async fn transact(
        &self,
        opts: &TxOptions,
        to: Address,
        data: Bytes,
    ) -> AnchorResult<SubmittedTransaction> {
        let nonce = opts
            .nonce
            .ok_or_else(|| AnchorError::Internal("transaction submitted without nonce".into()))?;
        let gas_price = self.gas_price().await?;

        let tx: TypedTransaction = TransactionRequest::new()
            .from(opts.from)
            .to(to)
            .data(data)
            .nonce(nonce)
            .gas(opts.gas_limit)
            .gas_price(gas_price)
            .chain_id(self.config.chain_id)
            .into();

        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| AnchorError::Wallet(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);

        // Single attempt, no failover. Retries belong to the submitter.
        let result = timeout(
            self.config.read_timeout(),
            self.http().send_raw_transaction(raw),
        )
        .await;

        match result {
            Ok(Ok(pending)) => Ok(SubmittedTransaction {
                hash: pending.tx_hash(),
                nonce,
            }),
            Ok(Err(e)) => Err(AnchorError::Ledger(e.to_string())),
            Err(_) => Err(AnchorError::Ledger(format!(
                "timed out sending transaction with nonce {}",
                nonce
            ))),
        }
    }

    async fn filter_logs(&self, filter: &Filter) -> AnchorResult<Vec<Log>> {
        self.read_with_failover("get logs", |p| p.get_logs(filter)).await
    }

    async fn transaction_receipt(&self, hash: H256) -> AnchorResult<Option<TransactionReceipt>> {
        self.read_with_failover("get transaction receipt", |p| {
            p.get_transaction_receipt(hash)
        })
        .await
    }

    async fn block_number(&self) -> AnchorResult<u64> {
        let block = self
            .read_with_failover("get block number", |p| p.get_block_number())
            .await?;
        Ok(block.as_u64())
    }

    async fn chain_nonce(&self, account: Address) -> AnchorResult<u64> {
        let nonce = self
            .read_with_failover("get transaction count", |p| {
                p.get_transaction_count(account, Some(BlockNumber::Pending.into()))
            })
            .await?;
        Ok(nonce.as_u64())
    }

    async fn pending_pool_nonces(&self, account: Address) -> AnchorResult<Option<Vec<u64>>> {
        if !self.config.txpool_access_enabled {
            return Ok(None);
        }

        let inspect = self
            .read_with_failover("inspect txpool", |p| p.txpool_inspect())
            .await?;

        let Some(pending) = inspect.pending.get(&account) else {
            return Ok(Some(Vec::new()));
        };

        let nonces = pending
            .keys()
            .map(|k| {
                k.parse::<u64>()
                    .map_err(|e| AnchorError::Ledger(format!("failed to convert nonce {}: {}", k, e)))
            })
            .collect::<AnchorResult<Vec<_>>>()?;

        Ok(Some(nonces))
    }
}
