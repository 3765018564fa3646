//! Identity factory, registry and identity contract calls

use super::{CentId, KeyPurpose};
use crate::error::{AnchorError, AnchorResult};
use crate::ledger::abi;

use ethers::abi::{ParamType, Token};
use ethers::types::{Address, Bytes, U256};

pub const CREATE_IDENTITY_SIG: &str = "createIdentity(uint256)";
pub const GET_IDENTITY_SIG: &str = "getIdentityByCentrifugeId(uint256)";
pub const ADD_KEY_SIG: &str = "addKey(bytes32,uint256)";
pub const GET_KEYS_BY_PURPOSE_SIG: &str = "getKeysByPurpose(uint256)";

pub fn create_identity(cent_id: &CentId) -> Bytes {
    abi::encode_call(CREATE_IDENTITY_SIG, &[abi::uint_token(cent_id.as_bytes())])
}

pub fn get_identity(cent_id: &CentId) -> Bytes {
    abi::encode_call(GET_IDENTITY_SIG, &[abi::uint_token(cent_id.as_bytes())])
}

pub fn add_key(key: &[u8; 32], purpose: KeyPurpose) -> Bytes {
    abi::encode_call(
        ADD_KEY_SIG,
        &[
            Token::FixedBytes(key.to_vec()),
            Token::Uint(U256::from(purpose.as_u64())),
        ],
    )
}

pub fn get_keys_by_purpose(purpose: KeyPurpose) -> Bytes {
    abi::encode_call(
        GET_KEYS_BY_PURPOSE_SIG,
        &[Token::Uint(U256::from(purpose.as_u64()))],
    )
}

pub fn decode_address(output: &[u8]) -> AnchorResult<Address> {
    match abi::decode_output(&[ParamType::Address], output)?.pop() {
        Some(Token::Address(address)) => Ok(address),
        other => Err(AnchorError::Abi(format!("expected address, got {:?}", other))),
    }
}

pub fn decode_keys(output: &[u8]) -> AnchorResult<Vec<[u8; 32]>> {
    let tokens = abi::decode_output(
        &[ParamType::Array(Box::new(ParamType::FixedBytes(32)))],
        output,
    )?;

    match tokens.into_iter().next() {
        Some(Token::Array(keys)) => keys.into_iter().map(abi::expect_fixed_bytes32).collect(),
        other => Err(AnchorError::Abi(format!("expected bytes32[], got {:?}", other))),
    }
}
