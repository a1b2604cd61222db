//! Platform configuration
//!
//! Policy constants are preserved as configuration with their documented
//! defaults. Configurations load from JSON and are validated before use.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum wallet fee in USD cents
pub const MAX_FEE_CENTS: u64 = 1000;

/// Maximum age of a price feed answer, in seconds
pub const STALENESS_WINDOW_SECS: u64 = 3600;

/// Fee assigned to freshly initialized wallets, in USD cents
pub const DEFAULT_FEE_CENTS: u64 = 50;

/// Exchange pool fee tier (hundredths of a basis point, 3000 = 0.3%)
pub const DEFAULT_SWAP_FEE_TIER: u32 = 3000;

/// Swap deadline offset from the current block time, in seconds
pub const DEFAULT_SWAP_DEADLINE_SECS: u64 = 300;

/// Default chain ID bound into operation hashes
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// Wallet policy applied to every wallet a factory deploys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletPolicy {
    /// Fee ceiling accepted by `updateFee`
    pub max_fee_cents: u64,
    /// Price freshness window
    pub staleness_window_secs: u64,
    /// Fee at initialization
    pub default_fee_cents: u64,
    /// Pool fee tier passed to the exchange router
    pub swap_fee_tier: u32,
    /// Deadline offset passed to the exchange router
    pub swap_deadline_secs: u64,
}

impl Default for WalletPolicy {
    fn default() -> Self {
        Self {
            max_fee_cents: MAX_FEE_CENTS,
            staleness_window_secs: STALENESS_WINDOW_SECS,
            default_fee_cents: DEFAULT_FEE_CENTS,
            swap_fee_tier: DEFAULT_SWAP_FEE_TIER,
            swap_deadline_secs: DEFAULT_SWAP_DEADLINE_SECS,
        }
    }
}

impl WalletPolicy {
    /// Set the fee ceiling
    pub fn with_max_fee_cents(mut self, max_fee_cents: u64) -> Self {
        self.max_fee_cents = max_fee_cents;
        self
    }

    /// Set the staleness window
    pub fn with_staleness_window(mut self, secs: u64) -> Self {
        self.staleness_window_secs = secs;
        self
    }

    /// Set the initial fee
    pub fn with_default_fee_cents(mut self, fee: u64) -> Self {
        self.default_fee_cents = fee;
        self
    }

    /// Set the swap fee tier
    pub fn with_swap_fee_tier(mut self, tier: u32) -> Self {
        self.swap_fee_tier = tier;
        self
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.default_fee_cents > self.max_fee_cents {
            return Err(Error::InvalidConfig(format!(
                "default fee {} exceeds max fee {}",
                self.default_fee_cents, self.max_fee_cents
            )));
        }
        if self.staleness_window_secs == 0 {
            return Err(Error::InvalidConfig(
                "staleness window must be non-zero".into(),
            ));
        }
        if self.swap_fee_tier >= 1_000_000 {
            return Err(Error::InvalidConfig(format!(
                "swap fee tier {} must be below 1000000",
                self.swap_fee_tier
            )));
        }
        Ok(())
    }
}

/// Gas metering used by the reference entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasPolicy {
    /// Gas charged for account validation (capped by the operation's limit)
    pub validation_gas: u64,
    /// Base gas charged for execution (capped by the operation's limit)
    pub execution_base_gas: u64,
    /// Additional execution gas per call data byte
    pub gas_per_call_data_byte: u64,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            validation_gas: 45_000,
            execution_base_gas: 30_000,
            gas_per_call_data_byte: 16,
        }
    }
}

/// Complete platform configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Chain ID bound into operation hashes
    pub chain_id: u64,
    /// Initial block timestamp (0 = current wall clock)
    pub genesis_timestamp: u64,
    /// Wallet policy
    pub wallet: WalletPolicy,
    /// Entry point gas metering
    pub gas: GasPolicy,
}

impl PlatformConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            ..Default::default()
        }
    }

    /// Parse from a JSON string; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: PlatformConfig = serde_json::from_str(json)?;
        if config.chain_id == 0 {
            config.chain_id = DEFAULT_CHAIN_ID;
        }
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Set the chain ID
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Set the genesis timestamp
    pub fn with_genesis_timestamp(mut self, timestamp: u64) -> Self {
        self.genesis_timestamp = timestamp;
        self
    }

    /// Set the wallet policy
    pub fn with_wallet_policy(mut self, policy: WalletPolicy) -> Self {
        self.wallet = policy;
        self
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(Error::InvalidConfig("chain id must be non-zero".into()));
        }
        self.wallet.validate()
    }
}
