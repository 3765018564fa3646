//! Confirmation task types for identity creation and key registration

use super::{CentId, KeyPurpose};
use crate::confirmation::{register_watcher, ConfirmationTiming, EventWatcher, BLOCK_HEIGHT_PARAM};
use crate::events::{topics, LedgerEvent};
use crate::ledger::{abi, LedgerGateway};
use crate::queue::{TaskParams, TaskQueue};

use ethers::types::{Address, Filter, H256};
use std::sync::Arc;

pub const IDENTITY_CREATED_CONFIRMATION: &str = "identity_created_confirmation";
pub const KEY_ADDED_CONFIRMATION: &str = "key_added_confirmation";

const CENT_ID_PARAM: &str = "cent_id";
const IDENTITY_PARAM: &str = "identity";
const KEY_PARAM: &str = "key";
const PURPOSE_PARAM: &str = "purpose";

#[derive(Debug, Clone)]
pub struct IdentityCreatedWatcher {
    pub factory: Address,
    pub cent_id: CentId,
}

impl EventWatcher for IdentityCreatedWatcher {
    fn task_name(&self) -> &'static str {
        IDENTITY_CREATED_CONFIRMATION
    }

    fn event_name(&self) -> &'static str {
        "identity_created"
    }

    fn filter(&self) -> Filter {
        Filter::new()
            .address(self.factory)
            .topic0(*topics::IDENTITY_CREATED)
            .topic1(abi::uint_topic(self.cent_id.as_bytes()))
    }

    fn matches(&self, event: &LedgerEvent) -> bool {
        matches!(event, LedgerEvent::IdentityCreated { cent_id, .. } if cent_id == self.cent_id.as_bytes())
    }
}

#[derive(Debug, Clone)]
pub struct KeyAddedWatcher {
    pub identity: Address,
    pub key: [u8; 32],
    pub purpose: KeyPurpose,
}

impl EventWatcher for KeyAddedWatcher {
    fn task_name(&self) -> &'static str {
        KEY_ADDED_CONFIRMATION
    }

    fn event_name(&self) -> &'static str {
        "key_added"
    }

    fn filter(&self) -> Filter {
        Filter::new()
            .address(self.identity)
            .topic0(*topics::KEY_ADDED)
            .topic1(H256::from(self.key))
            .topic2(abi::uint_topic(&self.purpose.as_u64().to_be_bytes()))
    }

    fn matches(&self, event: &LedgerEvent) -> bool {
        matches!(
            event,
            LedgerEvent::KeyAdded { contract, key, purpose, .. }
                if *contract == self.identity
                    && *key == self.key
                    && *purpose == self.purpose.as_u64()
        )
    }
}

pub(crate) fn identity_created_params(cent_id: &CentId, block_height: u64) -> TaskParams {
    TaskParams::new()
        .with_bytes(CENT_ID_PARAM, cent_id.as_bytes())
        .with_u64(BLOCK_HEIGHT_PARAM, block_height)
}

pub(crate) fn key_added_params(
    identity: Address,
    key: &[u8; 32],
    purpose: KeyPurpose,
    block_height: u64,
) -> TaskParams {
    TaskParams::new()
        .with_address(IDENTITY_PARAM, identity)
        .with_bytes(KEY_PARAM, key)
        .with_u64(PURPOSE_PARAM, purpose.as_u64())
        .with_u64(BLOCK_HEIGHT_PARAM, block_height)
}

/// Register the identity confirmation task types
pub fn register(
    queue: &TaskQueue,
    gateway: Arc<dyn LedgerGateway>,
    factory: Address,
    timing: ConfirmationTiming,
) {
    register_watcher(
        queue,
        IDENTITY_CREATED_CONFIRMATION,
        gateway.clone(),
        timing,
        move |params| {
            Ok(IdentityCreatedWatcher {
                factory,
                cent_id: CentId::new(params.bytes(CENT_ID_PARAM)?),
            })
        },
    );

    register_watcher(queue, KEY_ADDED_CONFIRMATION, gateway, timing, |params| {
        let purpose = KeyPurpose::try_from(params.u64(PURPOSE_PARAM)?)
            .map_err(|e| crate::error::AnchorError::parameter(PURPOSE_PARAM, e.to_string()))?;
        Ok(KeyAddedWatcher {
            identity: params.address(IDENTITY_PARAM)?,
            key: params.bytes(KEY_PARAM)?,
            purpose,
        })
    });
}
