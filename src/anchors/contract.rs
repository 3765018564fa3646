//! Anchor repository contract calls

use super::{AnchorId, DocumentRoot};
use crate::error::{AnchorError, AnchorResult};
use crate::identity::CentId;
use crate::ledger::abi;

use ethers::abi::{ParamType, Token};
use ethers::types::{Bytes, U256};

pub const PRE_COMMIT_SIG: &str = "preCommit(uint256,bytes32,uint256,bytes,uint256,uint256)";
pub const COMMIT_SIG: &str = "commit(uint256,bytes32,uint256,bytes32[],bytes)";
pub const COMMITS_SIG: &str = "commits(uint256)";
pub const HAS_VALID_PRE_COMMIT_SIG: &str = "hasValidPreCommit(uint256)";

pub fn pre_commit(
    anchor_id: &AnchorId,
    signing_root: &DocumentRoot,
    owner: &CentId,
    signature: &[u8],
    expiration_block: u64,
    schema_version: u32,
) -> Bytes {
    abi::encode_call(
        PRE_COMMIT_SIG,
        &[
            abi::uint_token(anchor_id.as_bytes()),
            Token::FixedBytes(signing_root.as_bytes().to_vec()),
            abi::uint_token(owner.as_bytes()),
            Token::Bytes(signature.to_vec()),
            Token::Uint(U256::from(expiration_block)),
            Token::Uint(U256::from(schema_version)),
        ],
    )
}

pub fn commit(
    anchor_id: &AnchorId,
    document_root: &DocumentRoot,
    owner: &CentId,
    document_proofs: &[[u8; 32]],
    signature: &[u8],
) -> Bytes {
    let proofs = document_proofs
        .iter()
        .map(|proof| Token::FixedBytes(proof.to_vec()))
        .collect();

    abi::encode_call(
        COMMIT_SIG,
        &[
            abi::uint_token(anchor_id.as_bytes()),
            Token::FixedBytes(document_root.as_bytes().to_vec()),
            abi::uint_token(owner.as_bytes()),
            Token::Array(proofs),
            Token::Bytes(signature.to_vec()),
        ],
    )
}

pub fn commits(anchor_id: &AnchorId) -> Bytes {
    abi::encode_call(COMMITS_SIG, &[abi::uint_token(anchor_id.as_bytes())])
}

pub fn has_valid_pre_commit(anchor_id: &AnchorId) -> Bytes {
    abi::encode_call(HAS_VALID_PRE_COMMIT_SIG, &[abi::uint_token(anchor_id.as_bytes())])
}

pub fn decode_document_root(output: &[u8]) -> AnchorResult<DocumentRoot> {
    let mut tokens = abi::decode_output(&[ParamType::FixedBytes(32)], output)?;
    abi::expect_fixed_bytes32(tokens.swap_remove(0)).map(DocumentRoot::new)
}

pub fn decode_bool(output: &[u8]) -> AnchorResult<bool> {
    match abi::decode_output(&[ParamType::Bool], output)?.pop() {
        Some(Token::Bool(value)) => Ok(value),
        other => Err(AnchorError::Abi(format!("expected bool, got {:?}", other))),
    }
}
