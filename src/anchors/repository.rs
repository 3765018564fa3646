//! Anchor repository - submits pre-commits and commits and routes their confirmations

use super::confirmation::{commit_params, pre_commit_params};
use super::{
    contract, AnchorId, CommitData, DocumentRoot, PreCommitData, ANCHOR_COMMIT_CONFIRMATION,
    ANCHOR_PRE_COMMIT_CONFIRMATION, SCHEMA_VERSION,
};
use crate::config::{GasLimits, LedgerConfig};
use crate::confirmation::{watch, WatchReceiver};
use crate::error::{AnchorError, AnchorResult};
use crate::events::LedgerEvent;
use crate::identity::{CentId, OwnerResolver};
use crate::queue::TaskQueue;
use crate::tx::TransactionSubmitter;

use ethers::types::Address;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Writes anchors to the anchor repository contract.
///
/// Every write returns as soon as the transaction is broadcast and its
/// confirmation task is dispatched. The outcome arrives on the returned
/// receiver exactly once.
pub struct AnchorRepository {
    submitter: Arc<TransactionSubmitter>,
    queue: Arc<TaskQueue>,
    owners: Arc<dyn OwnerResolver>,
    contract: Address,
    gas_limits: GasLimits,
    wait_timeout: Duration,
}

impl AnchorRepository {
    pub fn new(
        submitter: Arc<TransactionSubmitter>,
        queue: Arc<TaskQueue>,
        owners: Arc<dyn OwnerResolver>,
        contract: Address,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            submitter,
            queue,
            owners,
            contract,
            gas_limits: config.gas_limits.clone(),
            wait_timeout: config.wait_timeout(),
        }
    }

    /// Reserve `anchor_id` for `signing_root` until `expiration_block`
    pub async fn pre_commit(
        &self,
        anchor_id: AnchorId,
        signing_root: DocumentRoot,
        owner: CentId,
        signature: Vec<u8>,
        expiration_block: u64,
    ) -> AnchorResult<WatchReceiver<PreCommitData>> {
        if anchor_id.is_zero() {
            return Err(AnchorError::Validation("anchor id is zero".to_string()));
        }
        if signing_root.is_zero() {
            return Err(AnchorError::Validation("signing root is zero".to_string()));
        }
        if owner.is_zero() {
            return Err(AnchorError::Validation("owner id is zero".to_string()));
        }

        let identity = self.owners.resolve(&owner).await?;
        let gateway = self.submitter.gateway();
        let block_height = gateway.block_number().await?;

        let data = PreCommitData {
            anchor_id,
            signing_root,
            owner,
            signature,
            expiration_block,
            schema_version: SCHEMA_VERSION,
        };

        let tx = self
            .submitter
            .submit_call(
                self.contract,
                contract::pre_commit(
                    &data.anchor_id,
                    &data.signing_root,
                    &data.owner,
                    &data.signature,
                    data.expiration_block,
                    data.schema_version,
                ),
                self.gas_limits.anchor_pre_commit,
            )
            .await?;
        info!(
            "Sent off the anchor pre-commit [id: {}, owner: {} ({:?}), txHash: {:?}]",
            anchor_id, owner, identity, tx.hash
        );

        let handle = self.queue.dispatch(
            ANCHOR_PRE_COMMIT_CONFIRMATION,
            pre_commit_params(gateway.account(), &anchor_id, block_height),
        )?;

        Ok(watch(handle, self.wait_timeout, data, |data, _| data))
    }

    /// Commit `document_root` under a pre-committed `anchor_id`
    pub async fn commit(
        &self,
        anchor_id: AnchorId,
        document_root: DocumentRoot,
        owner: CentId,
        document_proofs: Vec<[u8; 32]>,
        signature: Vec<u8>,
    ) -> AnchorResult<WatchReceiver<CommitData>> {
        if anchor_id.is_zero() {
            return Err(AnchorError::Validation("anchor id is zero".to_string()));
        }
        if document_root.is_zero() {
            return Err(AnchorError::Validation("document root is zero".to_string()));
        }
        if owner.is_zero() {
            return Err(AnchorError::Validation("owner id is zero".to_string()));
        }

        let identity = self.owners.resolve(&owner).await?;
        let gateway = self.submitter.gateway();
        let block_height = gateway.block_number().await?;

        let data = CommitData {
            anchor_id,
            document_root,
            owner,
            document_proofs,
            signature,
            schema_version: SCHEMA_VERSION,
            block_height,
        };

        let tx = self
            .submitter
            .submit_call(
                self.contract,
                contract::commit(
                    &data.anchor_id,
                    &data.document_root,
                    &data.owner,
                    &data.document_proofs,
                    &data.signature,
                ),
                self.gas_limits.anchor_commit,
            )
            .await?;
        info!(
            "Sent off the anchor commit [id: {}, root: {}, owner: {} ({:?}), txHash: {:?}]",
            anchor_id, document_root, owner, identity, tx.hash
        );

        let handle = self.queue.dispatch(
            ANCHOR_COMMIT_CONFIRMATION,
            commit_params(gateway.account(), &anchor_id, &owner, block_height),
        )?;

        Ok(watch(handle, self.wait_timeout, data, |mut data, event| {
            if let LedgerEvent::AnchorCommitted { block_height, .. } = event {
                data.block_height = u64::from(block_height);
            }
            data
        }))
    }

    /// Document root committed under `anchor_id`, zero when none is
    pub async fn get_document_root_of(&self, anchor_id: &AnchorId) -> AnchorResult<DocumentRoot> {
        let output = self
            .submitter
            .gateway()
            .call(self.contract, contract::commits(anchor_id))
            .await?;
        contract::decode_document_root(&output)
    }

    pub async fn has_valid_pre_commit(&self, anchor_id: &AnchorId) -> AnchorResult<bool> {
        let output = self
            .submitter
            .gateway()
            .call(self.contract, contract::has_valid_pre_commit(anchor_id))
            .await?;
        contract::decode_bool(&output)
    }
}
