//! Identity repository on top of the identity factory and registry contracts

use super::confirmation::{identity_created_params, key_added_params};
use super::{
    contract, CentId, IdentityRecord, KeyPurpose, KeyRecord, OwnerResolver,
    IDENTITY_CREATED_CONFIRMATION, KEY_ADDED_CONFIRMATION,
};
use crate::config::{ContractAddresses, GasLimits, LedgerConfig};
use crate::confirmation::{watch, WatchReceiver};
use crate::error::{AnchorError, AnchorResult};
use crate::events::LedgerEvent;
use crate::ledger::LedgerGateway;
use crate::queue::TaskQueue;
use crate::tx::TransactionSubmitter;

use async_trait::async_trait;
use ethers::types::Address;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct IdentityRepository {
    submitter: Arc<TransactionSubmitter>,
    queue: Arc<TaskQueue>,
    factory: Address,
    registry: Address,
    gas_limits: GasLimits,
    wait_timeout: Duration,
}

impl IdentityRepository {
    pub fn new(
        submitter: Arc<TransactionSubmitter>,
        queue: Arc<TaskQueue>,
        addresses: &ContractAddresses,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            submitter,
            queue,
            factory: addresses.identity_factory,
            registry: addresses.identity_registry,
            gas_limits: config.gas_limits.clone(),
            wait_timeout: config.wait_timeout(),
        }
    }

    fn gateway(&self) -> &Arc<dyn LedgerGateway> {
        self.submitter.gateway()
    }

    /// Registry entry for `cent_id`, zero when none is registered
    async fn lookup(&self, cent_id: &CentId) -> AnchorResult<Address> {
        let output = self
            .gateway()
            .call(self.registry, contract::get_identity(cent_id))
            .await?;
        contract::decode_address(&output)
    }

    pub async fn exists(&self, cent_id: &CentId) -> AnchorResult<bool> {
        Ok(!self.lookup(cent_id).await?.is_zero())
    }

    /// Deploy an identity contract for `cent_id` through the factory
    pub async fn create_identity(&self, cent_id: CentId) -> AnchorResult<WatchReceiver<IdentityRecord>> {
        if cent_id.is_zero() {
            return Err(AnchorError::Validation("cent id is zero".to_string()));
        }
        if self.exists(&cent_id).await? {
            return Err(AnchorError::Validation(format!(
                "identity for {} already exists",
                cent_id
            )));
        }

        let block_height = self.gateway().block_number().await?;
        let tx = self
            .submitter
            .submit_call(
                self.factory,
                contract::create_identity(&cent_id),
                self.gas_limits.identity_create,
            )
            .await?;
        info!(
            "Sent off identity creation for {} [txHash: {:?}]",
            cent_id, tx.hash
        );

        let handle = self.queue.dispatch(
            IDENTITY_CREATED_CONFIRMATION,
            identity_created_params(&cent_id, block_height),
        )?;

        let record = IdentityRecord {
            cent_id,
            address: Address::zero(),
        };
        Ok(watch(handle, self.wait_timeout, record, |mut record, event| {
            if let LedgerEvent::IdentityCreated { identity, .. } = event {
                record.address = identity;
            }
            record
        }))
    }

    /// Add `key` for `purpose` to the identity contract of `cent_id`
    pub async fn add_key(
        &self,
        cent_id: CentId,
        key: [u8; 32],
        purpose: KeyPurpose,
    ) -> AnchorResult<WatchReceiver<KeyRecord>> {
        let identity = self.resolve(&cent_id).await?;

        let block_height = self.gateway().block_number().await?;
        let tx = self
            .submitter
            .submit_call(
                identity,
                contract::add_key(&key, purpose),
                self.gas_limits.identity_add_key,
            )
            .await?;
        info!(
            "Sent off key {:?} for {} [txHash: {:?}]",
            purpose, cent_id, tx.hash
        );

        let handle = self.queue.dispatch(
            KEY_ADDED_CONFIRMATION,
            key_added_params(identity, &key, purpose, block_height),
        )?;

        let record = KeyRecord {
            cent_id,
            key,
            purpose,
        };
        Ok(watch(handle, self.wait_timeout, record, |record, _| record))
    }

    pub async fn keys_by_purpose(
        &self,
        cent_id: &CentId,
        purpose: KeyPurpose,
    ) -> AnchorResult<Vec<[u8; 32]>> {
        let identity = self.resolve(cent_id).await?;
        let output = self
            .gateway()
            .call(identity, contract::get_keys_by_purpose(purpose))
            .await?;
        contract::decode_keys(&output)
    }

    /// Most recently added key for `purpose`
    pub async fn last_key_for_purpose(
        &self,
        cent_id: &CentId,
        purpose: KeyPurpose,
    ) -> AnchorResult<[u8; 32]> {
        self.keys_by_purpose(cent_id, purpose)
            .await?
            .pop()
            .ok_or_else(|| {
                AnchorError::Validation(format!("no {:?} key found for {}", purpose, cent_id))
            })
    }
}

#[async_trait]
impl OwnerResolver for IdentityRepository {
    async fn resolve(&self, owner: &CentId) -> AnchorResult<Address> {
        let address = self.lookup(owner).await?;
        if address.is_zero() {
            return Err(AnchorError::IdentityNotFound {
                cent_id: owner.to_string(),
            });
        }
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_settings;
    use crate::confirmation::ConfirmationTiming;
    use crate::identity::{contract::*, register};
    use crate::testing::{logs, FakeLedger};
    use ethers::abi::Token;
    use std::sync::atomic::Ordering;

    struct Fixture {
        ledger: Arc<FakeLedger>,
        repository: IdentityRepository,
        addresses: ContractAddresses,
    }

    fn fixture() -> Fixture {
        let settings = sample_settings();
        let addresses = settings.contracts.addresses().unwrap();
        let ledger = Arc::new(FakeLedger::new());
        let queue = Arc::new(TaskQueue::with_workers(4));
        register(
            &queue,
            ledger.clone(),
            addresses.identity_factory,
            ConfirmationTiming::from_config(&settings.ledger),
        );

        let submitter = Arc::new(TransactionSubmitter::new(ledger.clone(), &settings.ledger));
        let repository = IdentityRepository::new(submitter, queue, &addresses, &settings.ledger);
        Fixture {
            ledger,
            repository,
            addresses,
        }
    }

    fn registered(ledger: &FakeLedger, identity: Address) {
        ledger.respond_to(GET_IDENTITY_SIG, ethers::abi::encode(&[Token::Address(identity)]));
    }

    #[tokio::test]
    async fn test_resolve_unknown_owner() {
        let f = fixture();
        registered(&f.ledger, Address::zero());

        let err = f.repository.resolve(&CentId::new([1; 6])).await.unwrap_err();
        assert!(matches!(err, AnchorError::IdentityNotFound { .. }));
        assert!(!f.repository.exists(&CentId::new([1; 6])).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_identity_reports_contract_address() {
        let f = fixture();
        registered(&f.ledger, Address::zero());
        let cent_id = CentId::random();
        let identity = Address::repeat_byte(0x1d);
        f.ledger
            .push_log(logs::identity_created(f.addresses.identity_factory, *cent_id.as_bytes(), identity, 100));

        let result = f.repository.create_identity(cent_id).await.unwrap().await.unwrap();
        let record = result.into_result().unwrap();
        assert_eq!(record, IdentityRecord { cent_id, address: identity });

        let submitted = f.ledger.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].1, f.addresses.identity_factory);
        assert_eq!(submitted[0].0.gas_limit, 3_500_000);
    }

    #[tokio::test]
    async fn test_create_existing_identity_is_rejected() {
        let f = fixture();
        registered(&f.ledger, Address::repeat_byte(0x1d));

        let err = f.repository.create_identity(CentId::random()).await.unwrap_err();
        assert!(matches!(err, AnchorError::Validation(_)));
        assert_eq!(f.ledger.transacts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_identity_rejects_zero_id() {
        let f = fixture();

        let err = f.repository.create_identity(CentId::new([0; 6])).await.unwrap_err();
        assert!(matches!(err, AnchorError::Validation(_)));
        assert_eq!(f.ledger.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_add_key_targets_identity_contract() {
        let f = fixture();
        let identity = Address::repeat_byte(0x1d);
        registered(&f.ledger, identity);
        let cent_id = CentId::random();
        f.ledger.push_log(logs::key_added(identity, [8; 32], 2, 100));

        let record = f
            .repository
            .add_key(cent_id, [8; 32], KeyPurpose::Signing)
            .await
            .unwrap()
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(record.purpose, KeyPurpose::Signing);
        assert_eq!(f.ledger.submitted()[0].1, identity);
    }

    #[tokio::test]
    async fn test_last_key_for_purpose() {
        let f = fixture();
        registered(&f.ledger, Address::repeat_byte(0x1d));
        f.ledger.respond_to(
            GET_KEYS_BY_PURPOSE_SIG,
            ethers::abi::encode(&[Token::Array(vec![
                Token::FixedBytes(vec![1; 32]),
                Token::FixedBytes(vec![2; 32]),
            ])]),
        );

        let cent_id = CentId::random();
        let keys = f.repository.keys_by_purpose(&cent_id, KeyPurpose::P2p).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(
            f.repository.last_key_for_purpose(&cent_id, KeyPurpose::P2p).await.unwrap(),
            [2; 32]
        );
    }
}
