//! In-memory ledger used by unit tests

use crate::error::{AnchorError, AnchorResult};
use crate::ledger::{abi, LedgerGateway, SubmittedTransaction, TxOptions};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Filter, Log, TransactionReceipt, H256, U64};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted ledger. Every trait method bumps `calls`.
pub struct FakeLedger {
    account: Address,
    block_number: AtomicU64,
    chain_nonce: AtomicU64,
    pool_nonces: Mutex<Option<Vec<u64>>>,
    logs: Mutex<Vec<Log>>,
    call_responses: Mutex<HashMap<[u8; 4], Bytes>>,
    transact_errors: Mutex<VecDeque<String>>,
    filter_errors: Mutex<VecDeque<String>>,
    receipts: Mutex<HashMap<H256, TransactionReceipt>>,
    submitted: Mutex<Vec<(TxOptions, Address, Bytes)>>,
    pub calls: AtomicUsize,
    pub transacts: AtomicUsize,
    pub filters: AtomicUsize,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self {
            account: Address::repeat_byte(0xac),
            block_number: AtomicU64::new(100),
            chain_nonce: AtomicU64::new(0),
            pool_nonces: Mutex::new(None),
            logs: Mutex::new(Vec::new()),
            call_responses: Mutex::new(HashMap::new()),
            transact_errors: Mutex::new(VecDeque::new()),
            filter_errors: Mutex::new(VecDeque::new()),
            receipts: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            transacts: AtomicUsize::new(0),
            filters: AtomicUsize::new(0),
        }
    }

    pub fn set_block_number(&self, block: u64) {
        self.block_number.store(block, Ordering::SeqCst);
    }

    pub fn set_chain_nonce(&self, nonce: u64) {
        self.chain_nonce.store(nonce, Ordering::SeqCst);
    }

    pub fn set_pool_nonces(&self, nonces: Option<Vec<u64>>) {
        *self.pool_nonces.lock().unwrap() = nonces;
    }

    pub fn push_log(&self, log: Log) {
        self.logs.lock().unwrap().push(log);
    }

    /// Return `output` for every view call whose selector matches `signature`
    pub fn respond_to(&self, signature: &str, output: Vec<u8>) {
        self.call_responses
            .lock()
            .unwrap()
            .insert(abi::selector(signature), Bytes::from(output));
    }

    /// The next `transact` calls fail with these messages, in order
    pub fn fail_transacts(&self, messages: &[&str]) {
        let mut errors = self.transact_errors.lock().unwrap();
        errors.extend(messages.iter().map(|m| m.to_string()));
    }

    /// The next `filter_logs` call fails with this message
    pub fn fail_next_filter(&self, message: &str) {
        self.filter_errors.lock().unwrap().push_back(message.to_string());
    }

    pub fn insert_receipt(&self, receipt: TransactionReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.transaction_hash, receipt);
    }

    pub fn submitted(&self) -> Vec<(TxOptions, Address, Bytes)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerGateway for FakeLedger {
    fn account(&self) -> Address {
        self.account
    }

    async fn call(&self, _to: Address, data: Bytes) -> AnchorResult<Bytes> {
        self.touch();
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[..4]);
        self.call_responses
            .lock()
            .unwrap()
            .get(&selector)
            .cloned()
            .ok_or_else(|| AnchorError::Ledger("execution reverted".to_string()))
    }

    async fn transact(
        &self,
        opts: &TxOptions,
        to: Address,
        data: Bytes,
    ) -> AnchorResult<SubmittedTransaction> {
        self.touch();
        let attempt = self.transacts.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.transact_errors.lock().unwrap().pop_front() {
            return Err(AnchorError::Ledger(message));
        }

        self.submitted
            .lock()
            .unwrap()
            .push((opts.clone(), to, data));

        Ok(SubmittedTransaction {
            hash: H256::from_low_u64_be(attempt as u64 + 1),
            nonce: opts.nonce.unwrap_or_default(),
        })
    }

    async fn filter_logs(&self, filter: &Filter) -> AnchorResult<Vec<Log>> {
        self.touch();
        self.filters.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.filter_errors.lock().unwrap().pop_front() {
            return Err(AnchorError::Ledger(message));
        }

        let from_block = filter.get_from_block().map(|b| b.as_u64()).unwrap_or(0);
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| log.block_number.map(|b| b.as_u64()).unwrap_or(0) >= from_block)
            .cloned()
            .collect())
    }

    async fn transaction_receipt(&self, hash: H256) -> AnchorResult<Option<TransactionReceipt>> {
        self.touch();
        Ok(self.receipts.lock().unwrap().get(&hash).cloned())
    }

    async fn block_number(&self) -> AnchorResult<u64> {
        self.touch();
        Ok(self.block_number.load(Ordering::SeqCst))
    }

    async fn chain_nonce(&self, _account: Address) -> AnchorResult<u64> {
        self.touch();
        Ok(self.chain_nonce.load(Ordering::SeqCst))
    }

    async fn pending_pool_nonces(&self, _account: Address) -> AnchorResult<Option<Vec<u64>>> {
        self.touch();
        Ok(self.pool_nonces.lock().unwrap().clone())
    }
}

/// Builders for synthetic contract logs
pub mod logs {
    use crate::events::topics;
    use crate::ledger::abi;

    use ethers::abi::Token;
    use ethers::types::{Address, Bytes, Log, H256, U256, U64};

    fn log(contract: Address, topics: Vec<H256>, data: Vec<u8>, block: u64) -> Log {
        Log {
            address: contract,
            topics,
            data: Bytes::from(data),
            block_number: Some(U64::from(block)),
            transaction_hash: Some(H256::from_low_u64_be(0xbeef + block)),
            ..Default::default()
        }
    }

    pub fn anchor_pre_committed(
        contract: Address,
        from: Address,
        anchor_id: [u8; 32],
        block: u64,
    ) -> Log {
        log(
            contract,
            vec![
                *topics::ANCHOR_PRE_COMMITTED,
                abi::address_topic(from),
                H256::from(anchor_id),
            ],
            ethers::abi::encode(&[Token::Uint(U256::from(block))]),
            block,
        )
    }

    pub fn anchor_committed(
        contract: Address,
        from: Address,
        anchor_id: [u8; 32],
        cent_id: [u8; 6],
        document_root: [u8; 32],
        block: u64,
    ) -> Log {
        log(
            contract,
            vec![
                *topics::ANCHOR_COMMITTED,
                abi::address_topic(from),
                H256::from(anchor_id),
                abi::uint_topic(&cent_id),
            ],
            ethers::abi::encode(&[
                Token::FixedBytes(document_root.to_vec()),
                Token::Uint(U256::from(block)),
            ]),
            block,
        )
    }

    pub fn identity_created(
        factory: Address,
        cent_id: [u8; 6],
        identity: Address,
        block: u64,
    ) -> Log {
        log(
            factory,
            vec![*topics::IDENTITY_CREATED, abi::uint_topic(&cent_id)],
            ethers::abi::encode(&[Token::Address(identity)]),
            block,
        )
    }

    pub fn key_added(identity: Address, key: [u8; 32], purpose: u64, block: u64) -> Log {
        log(
            identity,
            vec![
                *topics::KEY_ADDED,
                H256::from(key),
                abi::uint_topic(&purpose.to_be_bytes()),
            ],
            Vec::new(),
            block,
        )
    }
}

pub fn receipt(hash: H256, block: u64) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: hash,
        block_number: Some(U64::from(block)),
        status: Some(U64::from(1)),
        ..Default::default()
    }
}
