//! Anchors module - two-phase anchoring of document roots
//!
//! An anchor is first pre-committed against a signing root, then committed
//! with the document root and the proofs tying it to the signing root.

mod confirmation;
mod contract;
mod repository;

pub use confirmation::{
    register, AnchorCommitWatcher, AnchorPreCommitWatcher, ANCHOR_COMMIT_CONFIRMATION,
    ANCHOR_PRE_COMMIT_CONFIRMATION,
};
pub use repository::AnchorRepository;

use crate::error::AnchorError;
use crate::identity::CentId;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version of the anchor data layout written to the ledger
pub const SCHEMA_VERSION: u32 = 1;

macro_rules! bytes32_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            pub const LENGTH: usize = 32;

            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn random() -> Self {
                Self(rand::random())
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = AnchorError;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                <[u8; 32]>::try_from(bytes).map(Self).map_err(|_| {
                    AnchorError::Validation(format!(
                        "invalid length for {}: expected {} bytes, got {}",
                        $label,
                        Self::LENGTH,
                        bytes.len()
                    ))
                })
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl FromStr for $name {
            type Err = AnchorError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s.trim_start_matches("0x"))
                    .map_err(|e| AnchorError::Validation(format!("invalid {} hex: {}", $label, e)))?;
                Self::try_from(bytes.as_slice())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }
    };
}

bytes32_id!(
    /// Identifier of an anchor on the ledger
    AnchorId,
    "anchor id"
);

bytes32_id!(
    /// Merkle root of a document, or the signing root of a pre-commit
    DocumentRoot,
    "document root"
);

/// Data of a pre-commit write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreCommitData {
    pub anchor_id: AnchorId,
    pub signing_root: DocumentRoot,
    pub owner: CentId,
    pub signature: Vec<u8>,
    pub expiration_block: u64,
    pub schema_version: u32,
}

/// Data of a commit write. `block_height` is filled in from the confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitData {
    pub anchor_id: AnchorId,
    pub document_root: DocumentRoot,
    pub owner: CentId,
    pub document_proofs: Vec<[u8; 32]>,
    pub signature: Vec<u8>,
    pub schema_version: u32,
    pub block_height: u64,
}
