//! Error types for smart wallet operations
//!
//! Every variant aborts the whole operation it was raised in: the ledger
//! restores its checkpoint before the error reaches the caller.

use alloy_primitives::{Address, U256};
use thiserror::Error;

/// Result type alias for smart wallet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while validating or executing wallet operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ============ Authorization Errors ============
    /// Recovered signer is not the wallet owner
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Operation nonce does not match the wallet's current nonce
    #[error("Invalid nonce: expected {expected}, got {actual}")]
    InvalidNonce { expected: U256, actual: U256 },

    /// Caller lacks the role required by the operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // ============ Policy Errors ============
    /// Token is not whitelisted (or has no enabled price feed binding)
    #[error("Token not whitelisted: {0}")]
    NotWhitelisted(Address),

    /// Amount must be non-zero
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    /// Fee above the configured ceiling
    #[error("Fee too high: {fee} cents (max {max} cents)")]
    FeeTooHigh { fee: u64, max: u64 },

    /// Computed fee is above the caller-supplied fee ceiling
    #[error("Fee quote exceeded: required {required}, caller allowed {allowed}")]
    FeeQuoteExceeded { required: U256, allowed: U256 },

    /// Swap output below the caller's minimum
    #[error("Slippage exceeded: minimum {minimum}, available {available}")]
    SlippageExceeded { minimum: U256, available: U256 },

    /// Price feed answer is older than the staleness window
    #[error("Stale price from feed {feed}: updated at {updated_at}, now {now}")]
    StalePrice {
        feed: Address,
        updated_at: u64,
        now: u64,
    },

    /// Price feed answer is zero or negative
    #[error("Invalid price from feed {feed}: {answer}")]
    InvalidPrice { feed: Address, answer: i128 },

    /// No price feed deployed at the address
    #[error("Price feed not found: {0}")]
    PriceFeedNotFound(Address),

    // ============ Resource Errors ============
    /// Paymaster deposit cannot cover the operation's maximum cost
    #[error("Insufficient deposit: available {available}, required {required}")]
    InsufficientDeposit { available: U256, required: U256 },

    /// Balance too low for a transfer or withdrawal
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: U256, required: U256 },

    /// Spender allowance too low for transferFrom
    #[error("Insufficient allowance: available {available}, required {required}")]
    InsufficientAllowance { available: U256, required: U256 },

    // ============ Execution Errors ============
    /// Downstream call reverted
    #[error("Execution reverted: {0}")]
    ExecutionReverted(String),

    /// Checked arithmetic overflowed
    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    // ============ Protocol Errors ============
    /// Paymaster asked to settle a context it never issued
    #[error("Unknown sponsorship context: {0}")]
    UnknownContext(String),

    /// Settlement cost is above the validated maximum
    #[error("Actual cost {actual} exceeds validated maximum {max}")]
    CostExceedsPrefund { actual: U256, max: U256 },

    /// Upgrade target is not a registered wallet implementation
    #[error("Invalid implementation: {0}")]
    InvalidImplementation(Address),

    /// No wallet deployed at the address
    #[error("Wallet not found: {0}")]
    WalletNotFound(Address),

    /// No factory deployed at the address
    #[error("Factory not found: {0}")]
    FactoryNotFound(Address),

    /// No paymaster deployed at the address
    #[error("Paymaster not found: {0}")]
    PaymasterNotFound(Address),

    /// initCode deployed a wallet at a different address than the operation sender
    #[error("Sender address mismatch: operation sender {sender}, deployed {deployed}")]
    SenderAddressMismatch { sender: Address, deployed: Address },

    /// Call data could not be decoded
    #[error("Invalid call data: {0}")]
    InvalidCallData(String),

    /// Zero or otherwise unusable address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // ============ Configuration Errors ============
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ============ Serialization Errors ============
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// Short, stable name of the error variant, used as the revert reason
    /// recorded in receipts
    pub fn name(&self) -> &'static str {
        match self {
            Error::InvalidSignature(_) => "InvalidSignature",
            Error::InvalidNonce { .. } => "InvalidNonce",
            Error::Unauthorized(_) => "Unauthorized",
            Error::NotWhitelisted(_) => "NotWhitelisted",
            Error::ZeroAmount => "ZeroAmount",
            Error::FeeTooHigh { .. } => "FeeTooHigh",
            Error::FeeQuoteExceeded { .. } => "FeeQuoteExceeded",
            Error::SlippageExceeded { .. } => "SlippageExceeded",
            Error::StalePrice { .. } => "StalePrice",
            Error::InvalidPrice { .. } => "InvalidPrice",
            Error::PriceFeedNotFound(_) => "PriceFeedNotFound",
            Error::InsufficientDeposit { .. } => "InsufficientDeposit",
            Error::InsufficientBalance { .. } => "InsufficientBalance",
            Error::InsufficientAllowance { .. } => "InsufficientAllowance",
            Error::ExecutionReverted(_) => "ExecutionReverted",
            Error::ArithmeticOverflow(_) => "ArithmeticOverflow",
            Error::UnknownContext(_) => "UnknownContext",
            Error::CostExceedsPrefund { .. } => "CostExceedsPrefund",
            Error::InvalidImplementation(_) => "InvalidImplementation",
            Error::WalletNotFound(_) => "WalletNotFound",
            Error::FactoryNotFound(_) => "FactoryNotFound",
            Error::PaymasterNotFound(_) => "PaymasterNotFound",
            Error::SenderAddressMismatch { .. } => "SenderAddressMismatch",
            Error::InvalidCallData(_) => "InvalidCallData",
            Error::InvalidAddress(_) => "InvalidAddress",
            Error::InvalidConfig(_) => "InvalidConfig",
            Error::Serialization(_) => "Serialization",
            Error::Io(_) => "Io",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::InvalidCallData(e.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
