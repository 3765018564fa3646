//! Identity module - maps participant ids to identity contracts and keys
//!
//! Each participant (`CentId`) owns an identity contract deployed through the
//! identity factory and looked up through the identity registry. Keys are
//! attached to the identity contract per purpose.

mod confirmation;
mod contract;
mod repository;

pub use confirmation::{
    register, IdentityCreatedWatcher, KeyAddedWatcher, IDENTITY_CREATED_CONFIRMATION,
    KEY_ADDED_CONFIRMATION,
};
pub use repository::IdentityRepository;

use crate::error::{AnchorError, AnchorResult};
use crate::events::CENT_ID_LENGTH;

use async_trait::async_trait;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Participant identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CentId([u8; CENT_ID_LENGTH]);

impl CentId {
    pub fn new(bytes: [u8; CENT_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; CENT_ID_LENGTH]
    }

    pub fn as_bytes(&self) -> &[u8; CENT_ID_LENGTH] {
        &self.0
    }
}

impl TryFrom<&[u8]> for CentId {
    type Error = AnchorError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.is_empty() {
            return Err(AnchorError::Validation("empty cent id".to_string()));
        }
        <[u8; CENT_ID_LENGTH]>::try_from(bytes)
            .map(Self)
            .map_err(|_| {
                AnchorError::Validation(format!(
                    "invalid length for cent id: expected {} bytes, got {}",
                    CENT_ID_LENGTH,
                    bytes.len()
                ))
            })
    }
}

impl FromStr for CentId {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| AnchorError::Validation(format!("invalid cent id hex: {}", e)))?;
        Self::try_from(bytes.as_slice())
    }
}

impl fmt::Display for CentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// What an identity key may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPurpose {
    P2p = 1,
    Signing = 2,
    EthMsgAuth = 3,
}

impl KeyPurpose {
    pub fn as_u64(self) -> u64 {
        self as u64
    }
}

impl TryFrom<u64> for KeyPurpose {
    type Error = AnchorError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(KeyPurpose::P2p),
            2 => Ok(KeyPurpose::Signing),
            3 => Ok(KeyPurpose::EthMsgAuth),
            other => Err(AnchorError::Validation(format!("unknown key purpose {}", other))),
        }
    }
}

impl FromStr for KeyPurpose {
    type Err = AnchorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p2p" => Ok(KeyPurpose::P2p),
            "signing" | "sign" => Ok(KeyPurpose::Signing),
            "ethauth" | "eth_msg_auth" => Ok(KeyPurpose::EthMsgAuth),
            other => other
                .parse::<u64>()
                .map_err(|_| AnchorError::Validation(format!("unknown key purpose {}", other)))
                .and_then(KeyPurpose::try_from),
        }
    }
}

/// Identity contract of a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub cent_id: CentId,
    pub address: Address,
}

/// Key registered on an identity contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub cent_id: CentId,
    pub key: [u8; 32],
    pub purpose: KeyPurpose,
}

/// Resolves a participant to the ledger account acting for it
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OwnerResolver: Send + Sync {
    async fn resolve(&self, owner: &CentId) -> AnchorResult<Address>;
}
