//! Contract event types and parsing
//!
//! Defines the events emitted by the anchor repository, identity factory and
//! identity contracts that confirmation tasks wait for.

use crate::error::{AnchorError, AnchorResult};
use crate::ledger::abi;

use ethers::abi::{ParamType, Token};
use ethers::types::{Address, Log, H256};
use serde::{Deserialize, Serialize};

/// Length in bytes of a participant identifier as carried in event topics
pub const CENT_ID_LENGTH: usize = 6;

/// Events the relayer waits for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Anchor reserved against a signing root
    AnchorPreCommitted {
        from: Address,
        anchor_id: [u8; 32],
        block_height: u32,
        block_number: u64,
        tx_hash: H256,
    },

    /// Anchor committed with its document root
    AnchorCommitted {
        from: Address,
        anchor_id: [u8; 32],
        cent_id: [u8; CENT_ID_LENGTH],
        document_root: [u8; 32],
        block_height: u32,
        block_number: u64,
        tx_hash: H256,
    },

    /// Identity contract deployed for a participant
    IdentityCreated {
        cent_id: [u8; CENT_ID_LENGTH],
        identity: Address,
        block_number: u64,
        tx_hash: H256,
    },

    /// Key added to an identity contract
    KeyAdded {
        contract: Address,
        key: [u8; 32],
        purpose: u64,
        block_number: u64,
        tx_hash: H256,
    },
}

impl LedgerEvent {
    /// Get event name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::AnchorPreCommitted { .. } => "anchor_pre_committed",
            LedgerEvent::AnchorCommitted { .. } => "anchor_committed",
            LedgerEvent::IdentityCreated { .. } => "identity_created",
            LedgerEvent::KeyAdded { .. } => "key_added",
        }
    }

    /// Block the event was mined in
    pub fn block_number(&self) -> u64 {
        match self {
            LedgerEvent::AnchorPreCommitted { block_number, .. }
            | LedgerEvent::AnchorCommitted { block_number, .. }
            | LedgerEvent::IdentityCreated { block_number, .. }
            | LedgerEvent::KeyAdded { block_number, .. } => *block_number,
        }
    }

    /// Transaction that emitted the event
    pub fn tx_hash(&self) -> H256 {
        match self {
            LedgerEvent::AnchorPreCommitted { tx_hash, .. }
            | LedgerEvent::AnchorCommitted { tx_hash, .. }
            | LedgerEvent::IdentityCreated { tx_hash, .. }
            | LedgerEvent::KeyAdded { tx_hash, .. } => *tx_hash,
        }
    }
}

/// Event signatures and their topic hashes
pub mod topics {
    use crate::ledger::abi::event_topic;
    use ethers::types::H256;
    use lazy_static::lazy_static;

    pub const ANCHOR_PRE_COMMITTED_SIG: &str = "AnchorPreCommitted(address,uint256,uint32)";
    pub const ANCHOR_COMMITTED_SIG: &str =
        "AnchorCommitted(address,uint256,uint256,bytes32,uint32)";
    pub const IDENTITY_CREATED_SIG: &str = "IdentityCreated(uint256,address)";
    pub const KEY_ADDED_SIG: &str = "KeyAdded(bytes32,uint256)";

    lazy_static! {
        pub static ref ANCHOR_PRE_COMMITTED: H256 = event_topic(ANCHOR_PRE_COMMITTED_SIG);
        pub static ref ANCHOR_COMMITTED: H256 = event_topic(ANCHOR_COMMITTED_SIG);
        pub static ref IDENTITY_CREATED: H256 = event_topic(IDENTITY_CREATED_SIG);
        pub static ref KEY_ADDED: H256 = event_topic(KEY_ADDED_SIG);
    }
}

/// Parse a log entry into a LedgerEvent
pub fn parse_log(log: &Log) -> AnchorResult<LedgerEvent> {
    let block_number = log.block_number.map(|b| b.as_u64()).unwrap_or(0);
    let tx_hash = log.transaction_hash.unwrap_or_default();

    let topic0 = log
        .topics
        .first()
        .copied()
        .ok_or_else(|| AnchorError::Abi("log without topics".to_string()))?;

    if topic0 == *topics::ANCHOR_PRE_COMMITTED {
        let tokens = abi::decode_output(&[ParamType::Uint(32)], &log.data)?;
        Ok(LedgerEvent::AnchorPreCommitted {
            from: abi::topic_address(indexed(log, 1)?),
            anchor_id: indexed(log, 2)?.0,
            block_height: uint32(&tokens[0])?,
            block_number,
            tx_hash,
        })
    } else if topic0 == *topics::ANCHOR_COMMITTED {
        let mut tokens =
            abi::decode_output(&[ParamType::FixedBytes(32), ParamType::Uint(32)], &log.data)?;
        let block_height = uint32(&tokens[1])?;
        let document_root = abi::expect_fixed_bytes32(tokens.swap_remove(0))?;
        Ok(LedgerEvent::AnchorCommitted {
            from: abi::topic_address(indexed(log, 1)?),
            anchor_id: indexed(log, 2)?.0,
            cent_id: abi::topic_tail::<CENT_ID_LENGTH>(indexed(log, 3)?),
            document_root,
            block_height,
            block_number,
            tx_hash,
        })
    } else if topic0 == *topics::IDENTITY_CREATED {
        let tokens = abi::decode_output(&[ParamType::Address], &log.data)?;
        let identity = match &tokens[0] {
            Token::Address(address) => *address,
            other => return Err(AnchorError::Abi(format!("expected address, got {:?}", other))),
        };
        Ok(LedgerEvent::IdentityCreated {
            cent_id: abi::topic_tail::<CENT_ID_LENGTH>(indexed(log, 1)?),
            identity,
            block_number,
            tx_hash,
        })
    } else if topic0 == *topics::KEY_ADDED {
        let purpose = ethers::types::U256::from_big_endian(indexed(log, 2)?.as_bytes());
        if purpose > ethers::types::U256::from(u64::MAX) {
            return Err(AnchorError::Abi(format!("key purpose {} out of range", purpose)));
        }
        Ok(LedgerEvent::KeyAdded {
            contract: log.address,
            key: indexed(log, 1)?.0,
            purpose: purpose.as_u64(),
            block_number,
            tx_hash,
        })
    } else {
        Err(AnchorError::Abi(format!("unknown event topic {:?}", topic0)))
    }
}

fn indexed(log: &Log, position: usize) -> AnchorResult<&H256> {
    log.topics
        .get(position)
        .ok_or_else(|| AnchorError::Abi(format!("missing indexed topic {}", position)))
}

fn uint32(token: &Token) -> AnchorResult<u32> {
    match token {
        Token::Uint(value) if *value <= ethers::types::U256::from(u32::MAX) => Ok(value.as_u32()),
        other => Err(AnchorError::Abi(format!("expected uint32, got {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::logs;

    #[test]
    fn test_parse_anchor_committed() {
        let contract = Address::repeat_byte(0x0a);
        let from = Address::repeat_byte(0x11);
        let log = logs::anchor_committed(contract, from, [3u8; 32], [1, 2, 3, 4, 5, 6], [9u8; 32], 42);

        match parse_log(&log).unwrap() {
            LedgerEvent::AnchorCommitted {
                from: parsed_from,
                anchor_id,
                cent_id,
                document_root,
                block_height,
                block_number,
                ..
            } => {
                assert_eq!(parsed_from, from);
                assert_eq!(anchor_id, [3u8; 32]);
                assert_eq!(cent_id, [1, 2, 3, 4, 5, 6]);
                assert_eq!(document_root, [9u8; 32]);
                assert_eq!(block_height, 42);
                assert_eq!(block_number, 42);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_key_added_uses_log_address() {
        let identity = Address::repeat_byte(0x33);
        let log = logs::key_added(identity, [5u8; 32], 2, 7);

        let event = parse_log(&log).unwrap();
        assert_eq!(event.name(), "key_added");
        assert_eq!(
            event,
            LedgerEvent::KeyAdded {
                contract: identity,
                key: [5u8; 32],
                purpose: 2,
                block_number: 7,
                tx_hash: log.transaction_hash.unwrap(),
            }
        );
    }

    #[test]
    fn test_unknown_topic_is_rejected() {
        let mut log = logs::key_added(Address::zero(), [5u8; 32], 2, 7);
        log.topics[0] = H256::repeat_byte(0xff);
        assert!(matches!(parse_log(&log), Err(AnchorError::Abi(_))));
    }

    #[test]
    fn test_event_survives_json_round_trip() {
        let log = logs::identity_created(Address::repeat_byte(1), [6u8; 6], Address::repeat_byte(2), 3);
        let event = parse_log(&log).unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "identity_created");
        let back: LedgerEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
