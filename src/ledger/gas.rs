//! Gas price policy
//!
//! A configured price is used as-is. Otherwise the node's price plus a buffer,
//! capped at the configured maximum.

use crate::config::LedgerConfig;

use ethers::types::U256;
use tracing::debug;

const GWEI: u64 = 1_000_000_000;

/// Gas price policy for transactions
#[derive(Debug, Clone)]
pub struct GasPolicy {
    /// Configured price, used verbatim when present
    fixed_price: Option<U256>,
    /// Hard cap for node-suggested prices
    max_price: U256,
    /// Buffer percentage added to node-suggested prices
    buffer_percent: u64,
}

impl GasPolicy {
    pub fn new(fixed_price: Option<U256>, max_price: U256) -> Self {
        Self {
            fixed_price,
            max_price,
            buffer_percent: 10,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(
            config.gas_price_gwei.map(|p| U256::from(p) * U256::from(GWEI)),
            U256::from(config.max_gas_price_gwei) * U256::from(GWEI),
        )
    }

    /// The configured price, if any
    pub fn fixed_price(&self) -> Option<U256> {
        self.fixed_price
    }

    /// Buffered and capped price derived from the node's suggestion
    pub fn buffered(&self, node_price: U256) -> U256 {
        let buffered = node_price + node_price * self.buffer_percent / 100;
        let price = std::cmp::min(buffered, self.max_price);
        debug!("Gas price: node suggested {}, using {}", node_price, price);
        price
    }
}
