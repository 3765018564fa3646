//! ABI helpers: selectors, event topics and argument encoding

use crate::error::{AnchorError, AnchorResult};

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, H256};
use sha3::{Digest, Keccak256};

/// keccak256 of arbitrary bytes
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Four byte function selector for a canonical signature such as `commits(uint256)`
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic 0 of an event with the given canonical signature
pub fn event_topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

/// Selector followed by the ABI encoded arguments
pub fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&abi::encode(args));
    Bytes::from(data)
}

/// Decode the return data of a view call
pub fn decode_output(types: &[ParamType], data: &[u8]) -> AnchorResult<Vec<Token>> {
    abi::decode(types, data).map_err(|e| AnchorError::Abi(e.to_string()))
}

/// Big-endian unsigned integer argument from raw bytes (at most 32)
pub fn uint_token(bytes: &[u8]) -> Token {
    Token::Uint(ethers::types::U256::from_big_endian(bytes))
}

/// Indexed `uint256` topic built from raw big-endian bytes, left padded
pub fn uint_topic(bytes: &[u8]) -> H256 {
    let mut topic = [0u8; 32];
    let start = 32 - bytes.len().min(32);
    topic[start..].copy_from_slice(&bytes[bytes.len().saturating_sub(32)..]);
    H256::from(topic)
}

/// Indexed `address` topic
pub fn address_topic(address: Address) -> H256 {
    H256::from(address)
}

/// Address stored in the low 20 bytes of a topic
pub fn topic_address(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

/// Low `N` bytes of a topic
pub fn topic_tail<const N: usize>(topic: &H256) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&topic.as_bytes()[32 - N..]);
    out
}

pub(crate) fn expect_fixed_bytes32(token: Token) -> AnchorResult<[u8; 32]> {
    match token {
        Token::FixedBytes(bytes) if bytes.len() == 32 => {
            let mut out = [0u8; 32];
            out.copy_from_slice(&bytes);
            Ok(out)
        }
        other => Err(AnchorError::Abi(format!("expected bytes32, got {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_selector() {
        // transfer(address,uint256)
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_uint_topic_left_pads() {
        let topic = uint_topic(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(&topic.as_bytes()[..26], &[0u8; 26]);
        assert_eq!(topic_tail::<6>(&topic), [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_address_topic() {
        let address = Address::repeat_byte(0x42);
        assert_eq!(topic_address(&address_topic(address)), address);
    }

    #[test]
    fn test_encode_call_prefixes_selector() {
        let data = encode_call("commits(uint256)", &[uint_token(&[7u8; 32])]);
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], &selector("commits(uint256)"));
        assert_eq!(&data[4..], &[7u8; 32]);
    }
}
