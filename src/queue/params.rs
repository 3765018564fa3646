//! Loosely typed task parameters
//!
//! Parameters travel as a string-keyed JSON map. Numbers may arrive as floats
//! after a transport round trip, so every accessor re-validates the shape of
//! the value it reads.

use crate::error::{AnchorError, AnchorResult};

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// String-keyed parameter map handed to task factories
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskParams(Map<String, Value>);

impl TaskParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Bytes encoded as a JSON array of integers
    pub fn with_bytes(self, key: &str, bytes: &[u8]) -> Self {
        let values: Vec<Value> = bytes.iter().map(|b| Value::from(*b)).collect();
        self.with(key, Value::Array(values))
    }

    pub fn with_u64(self, key: &str, value: u64) -> Self {
        self.with(key, value)
    }

    pub fn with_address(self, key: &str, address: Address) -> Self {
        self.with(key, format!("{:?}", address))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    fn required(&self, key: &str) -> AnchorResult<&Value> {
        self.0
            .get(key)
            .ok_or_else(|| AnchorError::parameter(key, "missing"))
    }

    /// Fixed-length byte array, from an integer array or a `0x` hex string
    pub fn bytes<const N: usize>(&self, key: &str) -> AnchorResult<[u8; N]> {
        let decoded = match self.required(key)? {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    let n = integral(item)
                        .ok_or_else(|| AnchorError::parameter(key, format!("{} is not a byte", item)))?;
                    u8::try_from(n)
                        .map_err(|_| AnchorError::parameter(key, format!("{} is not a byte", n)))
                })
                .collect::<AnchorResult<Vec<u8>>>()?,
            Value::String(s) => {
                let hex_str = s
                    .strip_prefix("0x")
                    .ok_or_else(|| AnchorError::parameter(key, "hex string without 0x prefix"))?;
                hex::decode(hex_str).map_err(|e| AnchorError::parameter(key, e.to_string()))?
            }
            other => {
                return Err(AnchorError::parameter(
                    key,
                    format!("expected byte array, got {}", other),
                ))
            }
        };

        <[u8; N]>::try_from(decoded.as_slice()).map_err(|_| {
            AnchorError::parameter(key, format!("expected {} bytes, got {}", N, decoded.len()))
        })
    }

    pub fn h256(&self, key: &str) -> AnchorResult<H256> {
        self.bytes::<32>(key).map(H256::from)
    }

    /// Non-negative integer, float encodings with no fractional part included
    pub fn u64(&self, key: &str) -> AnchorResult<u64> {
        let value = self.required(key)?;
        integral(value).ok_or_else(|| {
            AnchorError::parameter(key, format!("expected unsigned integer, got {}", value))
        })
    }

    pub fn optional_u64(&self, key: &str, default: u64) -> AnchorResult<u64> {
        if self.contains(key) {
            self.u64(key)
        } else {
            Ok(default)
        }
    }

    pub fn address(&self, key: &str) -> AnchorResult<Address> {
        match self.required(key)? {
            Value::String(s) => s
                .parse::<Address>()
                .map_err(|e| AnchorError::parameter(key, format!("invalid address {}: {}", s, e))),
            other => Err(AnchorError::parameter(
                key,
                format!("expected address string, got {}", other),
            )),
        }
    }

    /// Serialize through JSON text and back, as a remote queue would
    pub fn through_transport(&self) -> AnchorResult<Self> {
        let text = serde_json::to_string(self).map_err(|e| AnchorError::Internal(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| AnchorError::Internal(e.to_string()))
    }
}

fn integral(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    // u64::MAX rounds up to 2^64 as a float, which no u64 can hold
    if f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}
