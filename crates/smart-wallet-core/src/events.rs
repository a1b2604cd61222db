//! Events emitted by the core and the host environment
//!
//! Events are the audit surface: names and fields are stable. They are
//! appended to the ledger's log and roll back with the operation that
//! emitted them.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// An event with the address that emitted it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Emitting contract
    pub emitter: Address,
    /// Event payload
    pub event: Event,
}

/// All observable events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    // ============ Wallet ============
    TokenApproved {
        token: Address,
        spender: Address,
        amount: U256,
    },
    SwapExecuted {
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out: U256,
        recipient: Address,
    },
    FeeUpdated {
        old_fee: u64,
        new_fee: u64,
    },
    TokenWhitelisted {
        token: Address,
        status: bool,
    },
    PriceFeedUpdated {
        token: Address,
        feed: Address,
    },
    FeeAdminUpdated {
        old_admin: Address,
        new_admin: Address,
    },
    FeeCollected {
        token: Address,
        amount: U256,
        fee_admin: Address,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },

    // ============ Factory ============
    WalletCreated {
        owner: Address,
        wallet: Address,
    },
    ImplementationUpgraded {
        old_implementation: Address,
        new_implementation: Address,
    },

    // ============ Paymaster / Entry point ============
    Deposited {
        account: Address,
        amount: U256,
        total: U256,
    },
    Withdrawn {
        account: Address,
        to: Address,
        amount: U256,
    },
    UserOperationEvent {
        user_op_hash: B256,
        sender: Address,
        paymaster: Address,
        nonce: U256,
        success: bool,
        actual_gas_cost: U256,
        actual_gas_used: u64,
    },

    // ============ Tokens ============
    Transfer {
        from: Address,
        to: Address,
        value: U256,
    },
    Approval {
        owner: Address,
        spender: Address,
        value: U256,
    },
}

impl Event {
    /// Event name as it appears in the audit log
    pub fn name(&self) -> &'static str {
        match self {
            Event::TokenApproved { .. } => "TokenApproved",
            Event::SwapExecuted { .. } => "SwapExecuted",
            Event::FeeUpdated { .. } => "FeeUpdated",
            Event::TokenWhitelisted { .. } => "TokenWhitelisted",
            Event::PriceFeedUpdated { .. } => "PriceFeedUpdated",
            Event::FeeAdminUpdated { .. } => "FeeAdminUpdated",
            Event::FeeCollected { .. } => "FeeCollected",
            Event::OwnershipTransferred { .. } => "OwnershipTransferred",
            Event::WalletCreated { .. } => "WalletCreated",
            Event::ImplementationUpgraded { .. } => "ImplementationUpgraded",
            Event::Deposited { .. } => "Deposited",
            Event::Withdrawn { .. } => "Withdrawn",
            Event::UserOperationEvent { .. } => "UserOperationEvent",
            Event::Transfer { .. } => "Transfer",
            Event::Approval { .. } => "Approval",
        }
    }
}
