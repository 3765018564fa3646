//! Configuration management for the anchor relayer
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub ledger: LedgerConfig,
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
    /// Name of the environment variable holding the hex private key of the
    /// submitting account
    pub private_key_env: String,
    /// Fixed gas price in gwei. When absent the node's price is used.
    pub gas_price_gwei: Option<u64>,
    pub max_gas_price_gwei: u64,
    #[serde(default)]
    pub gas_limits: GasLimits,
    /// Whether the node exposes `txpool_inspect`
    pub txpool_access_enabled: bool,
    pub max_retries: u32,
    pub interval_retry_ms: u64,
    /// Upper bound for read-only calls
    pub read_timeout_secs: u64,
    /// How long to wait for a transaction to be mined and confirmed
    pub wait_timeout_secs: u64,
    /// Delay between two event filter queries of a confirmation task
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GasLimits {
    pub anchor_pre_commit: u64,
    pub anchor_commit: u64,
    pub identity_create: u64,
    pub identity_add_key: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            anchor_pre_commit: 200_000,
            anchor_commit: 800_000,
            identity_create: 3_500_000,
            identity_add_key: 300_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    pub anchor_repository: String,
    pub identity_factory: String,
    pub identity_registry: String,
}

/// Parsed contract addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub anchor_repository: Address,
    pub identity_factory: Address,
    pub identity_registry: Address,
}

impl ContractsConfig {
    pub fn addresses(&self) -> Result<ContractAddresses> {
        Ok(ContractAddresses {
            anchor_repository: parse_address("anchor_repository", &self.anchor_repository)?,
            identity_factory: parse_address("identity_factory", &self.identity_factory)?,
            identity_registry: parse_address("identity_registry", &self.identity_registry)?,
        })
    }
}

fn parse_address(name: &str, value: &str) -> Result<Address> {
    if value.is_empty() {
        anyhow::bail!("Contract address {} is not configured", name);
    }
    value
        .parse::<Address>()
        .with_context(|| format!("Invalid contract address for {}: {}", name, value))
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of tasks running at the same time
    pub num_workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { num_workers: 32 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl LedgerConfig {
    pub fn interval_retry(&self) -> Duration {
        Duration::from_millis(self.interval_retry_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Settings {
    /// Load settings from the file named by `ANCHOR_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("ANCHOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.ledger.rpc_urls.is_empty() {
            anyhow::bail!("No RPC URLs configured for chain {}", self.ledger.chain_id);
        }

        if self.ledger.max_retries == 0 {
            anyhow::bail!("ledger.max_retries must be at least 1");
        }

        if self.queue.num_workers == 0 {
            anyhow::bail!("queue.num_workers must be at least 1");
        }

        if let Some(price) = self.ledger.gas_price_gwei {
            if price > self.ledger.max_gas_price_gwei {
                anyhow::bail!(
                    "ledger.gas_price_gwei ({}) exceeds ledger.max_gas_price_gwei ({})",
                    price,
                    self.ledger.max_gas_price_gwei
                );
            }
        }

        self.contracts.addresses()?;

        if !self.ledger.txpool_access_enabled {
            tracing::warn!("txpool access disabled - nonces are taken from the chain only");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex is valid");

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
