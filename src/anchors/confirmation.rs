//! Confirmation task types for anchor writes

use super::AnchorId;
use crate::confirmation::{register_watcher, ConfirmationTiming, EventWatcher, BLOCK_HEIGHT_PARAM};
use crate::error::AnchorResult;
use crate::events::{topics, LedgerEvent};
use crate::identity::CentId;
use crate::ledger::{abi, LedgerGateway};
use crate::queue::{TaskParams, TaskQueue};

use ethers::types::{Address, Filter, H256};
use std::sync::Arc;

pub const ANCHOR_PRE_COMMIT_CONFIRMATION: &str = "anchor_pre_commit_confirmation";
pub const ANCHOR_COMMIT_CONFIRMATION: &str = "anchor_commit_confirmation";

const FROM_PARAM: &str = "from";
const ANCHOR_ID_PARAM: &str = "anchor_id";
const CENT_ID_PARAM: &str = "cent_id";

/// Waits for `AnchorPreCommitted(from, anchor_id)`
#[derive(Debug, Clone)]
pub struct AnchorPreCommitWatcher {
    pub contract: Address,
    pub from: Address,
    pub anchor_id: AnchorId,
}

impl EventWatcher for AnchorPreCommitWatcher {
    fn task_name(&self) -> &'static str {
        ANCHOR_PRE_COMMIT_CONFIRMATION
    }

    fn event_name(&self) -> &'static str {
        "anchor_pre_committed"
    }

    fn filter(&self) -> Filter {
        Filter::new()
            .address(self.contract)
            .topic0(*topics::ANCHOR_PRE_COMMITTED)
            .topic1(abi::address_topic(self.from))
            .topic2(H256::from(*self.anchor_id.as_bytes()))
    }

    fn matches(&self, event: &LedgerEvent) -> bool {
        matches!(
            event,
            LedgerEvent::AnchorPreCommitted { from, anchor_id, .. }
                if *from == self.from && anchor_id == self.anchor_id.as_bytes()
        )
    }
}

/// Waits for `AnchorCommitted(from, anchor_id, cent_id)`
#[derive(Debug, Clone)]
pub struct AnchorCommitWatcher {
    pub contract: Address,
    pub from: Address,
    pub anchor_id: AnchorId,
    pub owner: CentId,
}

impl EventWatcher for AnchorCommitWatcher {
    fn task_name(&self) -> &'static str {
        ANCHOR_COMMIT_CONFIRMATION
    }

    fn event_name(&self) -> &'static str {
        "anchor_committed"
    }

    fn filter(&self) -> Filter {
        Filter::new()
            .address(self.contract)
            .topic0(*topics::ANCHOR_COMMITTED)
            .topic1(abi::address_topic(self.from))
            .topic2(H256::from(*self.anchor_id.as_bytes()))
            .topic3(abi::uint_topic(self.owner.as_bytes()))
    }

    fn matches(&self, event: &LedgerEvent) -> bool {
        matches!(
            event,
            LedgerEvent::AnchorCommitted { from, anchor_id, cent_id, .. }
                if *from == self.from
                    && anchor_id == self.anchor_id.as_bytes()
                    && cent_id == self.owner.as_bytes()
        )
    }
}

pub(crate) fn pre_commit_params(from: Address, anchor_id: &AnchorId, block_height: u64) -> TaskParams {
    TaskParams::new()
        .with_address(FROM_PARAM, from)
        .with_bytes(ANCHOR_ID_PARAM, anchor_id.as_bytes())
        .with_u64(BLOCK_HEIGHT_PARAM, block_height)
}

pub(crate) fn commit_params(
    from: Address,
    anchor_id: &AnchorId,
    owner: &CentId,
    block_height: u64,
) -> TaskParams {
    pre_commit_params(from, anchor_id, block_height).with_bytes(CENT_ID_PARAM, owner.as_bytes())
}

fn anchor_id(params: &TaskParams) -> AnchorResult<AnchorId> {
    params.bytes::<32>(ANCHOR_ID_PARAM).map(AnchorId::new)
}

/// Register both anchor confirmation task types against `contract`
pub fn register(
    queue: &TaskQueue,
    gateway: Arc<dyn LedgerGateway>,
    contract: Address,
    timing: ConfirmationTiming,
) {
    register_watcher(
        queue,
        ANCHOR_PRE_COMMIT_CONFIRMATION,
        gateway.clone(),
        timing,
        move |params| {
            Ok(AnchorPreCommitWatcher {
                contract,
                from: params.address(FROM_PARAM)?,
                anchor_id: anchor_id(params)?,
            })
        },
    );

    register_watcher(queue, ANCHOR_COMMIT_CONFIRMATION, gateway, timing, move |params| {
        Ok(AnchorCommitWatcher {
            contract,
            from: params.address(FROM_PARAM)?,
            anchor_id: anchor_id(params)?,
            owner: CentId::new(params.bytes::<6>(CENT_ID_PARAM)?),
        })
    });
}
