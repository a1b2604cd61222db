//! # Smart wallet
//!
//! Per-wallet state lives in [`WalletState`]; behavior lives in a
//! [`WalletLogic`] implementation registered on the ledger under an
//! implementation address. A wallet never binds to its logic directly: the
//! ledger resolves the deploying factory's implementation pointer on every
//! call, so one pointer update moves the whole fleet.
//!
//! ## Roles
//!
//! - **Entry point**: the only caller of validation; executes on the
//!   owner's behalf afterwards
//! - **Owner**: may execute directly and manage the whitelist
//! - **Fee admin**: sets the fee and hands the role over; may also
//!   manage the whitelist

mod admin;
mod auth;
pub mod call;
mod logic;

pub use call::WalletCall;
pub use logic::StandardWallet;

use crate::config::WalletPolicy;
use crate::entry_point::UserOperation;
use crate::events::Event;
use crate::host::Host;
use crate::{Error, Result};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Price feed binding of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBinding {
    pub token: Address,
    /// Kept after removal for audit
    pub feed: Address,
    pub enabled: bool,
}

/// Initialization payload written by the factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInit {
    pub owner: Address,
    pub entry_point: Address,
    pub factory: Address,
    pub fee_admin: Address,
    /// Exchange router used by the swap gateway
    pub swap_gateway: Address,
    pub policy: WalletPolicy,
}

/// Persistent state of one wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    pub(crate) owner: Address,
    pub(crate) entry_point: Address,
    pub(crate) factory: Address,
    pub(crate) fee_admin: Address,
    pub(crate) swap_gateway: Address,
    pub(crate) fee_in_cents: u64,
    pub(crate) nonce: U256,
    pub(crate) bindings: BTreeMap<Address, TokenBinding>,
    pub(crate) policy: WalletPolicy,
}

impl WalletState {
    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    /// Factory that deployed the wallet
    pub fn factory(&self) -> Address {
        self.factory
    }

    pub fn fee_admin(&self) -> Address {
        self.fee_admin
    }

    pub fn swap_gateway(&self) -> Address {
        self.swap_gateway
    }

    pub fn fee_in_cents(&self) -> u64 {
        self.fee_in_cents
    }

    /// Next expected operation nonce
    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    pub fn policy(&self) -> &WalletPolicy {
        &self.policy
    }

    /// Whether `token` has an enabled binding
    pub fn is_whitelisted(&self, token: &Address) -> bool {
        self.bindings.get(token).is_some_and(|b| b.enabled)
    }

    /// Feed bound to `token`, including disabled bindings
    pub fn price_feed(&self, token: &Address) -> Option<Address> {
        self.bindings.get(token).map(|b| b.feed)
    }

    pub fn binding(&self, token: &Address) -> Option<&TokenBinding> {
        self.bindings.get(token)
    }

    /// Currently whitelisted tokens
    pub fn whitelisted_tokens(&self) -> Vec<Address> {
        self.bindings
            .values()
            .filter(|b| b.enabled)
            .map(|b| b.token)
            .collect()
    }

    /// Enabled binding of `token`
    pub(crate) fn enabled_binding(&self, token: &Address) -> Result<TokenBinding> {
        match self.bindings.get(token) {
            Some(binding) if binding.enabled => Ok(*binding),
            _ => Err(Error::NotWhitelisted(*token)),
        }
    }
}

/// Everything a wallet call can touch
#[derive(Debug)]
pub struct WalletContext<'a> {
    pub host: &'a mut Host,
    pub state: &'a mut WalletState,
    /// The wallet's own address
    pub address: Address,
    /// Immediate caller
    pub caller: Address,
}

impl WalletContext<'_> {
    pub(crate) fn emit(&mut self, event: Event) {
        self.host.emit(self.address, event);
    }

    /// Entry point or owner
    pub(crate) fn require_executor(&self) -> Result<()> {
        if self.caller == self.state.entry_point || self.caller == self.state.owner {
            return Ok(());
        }
        Err(Error::Unauthorized(format!(
            "{} is not the owner or entry point",
            self.caller
        )))
    }

    /// Owner, entry point (acting for the owner) or fee admin
    pub(crate) fn require_whitelist_manager(&self) -> Result<()> {
        if self.caller == self.state.fee_admin {
            return Ok(());
        }
        self.require_executor()
    }

    /// Fee admin, or the entry point when the owner holds the role
    pub(crate) fn require_fee_admin(&self) -> Result<()> {
        let via_entry_point =
            self.caller == self.state.entry_point && self.state.owner == self.state.fee_admin;
        if self.caller == self.state.fee_admin || via_entry_point {
            return Ok(());
        }
        Err(Error::Unauthorized(format!(
            "{} is not the fee admin",
            self.caller
        )))
    }

    pub(crate) fn require_owner(&self) -> Result<()> {
        if self.caller == self.state.owner || self.caller == self.state.entry_point {
            return Ok(());
        }
        Err(Error::Unauthorized(format!("{} is not the owner", self.caller)))
    }

    pub(crate) fn require_entry_point(&self) -> Result<()> {
        if self.caller == self.state.entry_point {
            return Ok(());
        }
        Err(Error::Unauthorized(format!(
            "{} is not the entry point",
            self.caller
        )))
    }
}

/// Wallet behavior shared by every proxy pointing at it
pub trait WalletLogic: fmt::Debug + Send + Sync {
    /// Implementation version string
    fn version(&self) -> &'static str;

    /// Build the state of a freshly deployed wallet
    fn initialize(&self, init: WalletInit) -> Result<WalletState>;

    /// Validation phase: signature, nonce and prefund. Never runs payload
    /// effects.
    fn validate_user_op(
        &self,
        ctx: &mut WalletContext<'_>,
        op: &UserOperation,
        user_op_hash: B256,
        missing_account_funds: U256,
    ) -> Result<()>;

    /// Execution phase
    fn dispatch(&self, ctx: &mut WalletContext<'_>, call: WalletCall) -> Result<Vec<u8>>;
}
