//! # Host environment
//!
//! In-memory model of the chain the core runs on: native balances,
//! fungible tokens, price feeds, exchange routers, external contracts,
//! contract storage, a block clock and the event log.
//!
//! The host has no notion of transactions itself; the `Ledger` clones it
//! as a checkpoint and restores it when an operation fails.

pub mod contract;
pub mod feed;
pub mod token;

pub use contract::{Contract, CounterContract, RevertingContract};
pub use feed::{FeedState, RoundData};
pub use token::{TokenCall, TokenState};

use crate::events::{Event, Log};
use crate::oracle::PriceFeedSource;
use crate::swap::SwapRouter;
use crate::types::keccak256_hash;
use crate::{Error, Result};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A call forwarded by a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Callee
    pub target: Address,
    /// Native value sent with the call
    pub value: U256,
    /// Call data
    pub data: Vec<u8>,
}

impl Call {
    /// Create a new call
    pub fn new(target: Address, value: U256, data: Vec<u8>) -> Self {
        Self {
            target,
            value,
            data,
        }
    }

    /// Plain native value transfer
    pub fn transfer_native(to: Address, value: U256) -> Self {
        Self::new(to, value, vec![])
    }

    /// ABI-encoded token call
    pub fn token(token: Address, call: TokenCall) -> Self {
        Self::new(token, U256::ZERO, call.encode())
    }
}

/// In-memory chain environment
#[derive(Debug, Clone)]
pub struct Host {
    chain_id: u64,
    timestamp: u64,
    deploy_nonce: u64,
    native: BTreeMap<Address, U256>,
    tokens: BTreeMap<Address, TokenState>,
    feeds: BTreeMap<Address, FeedState>,
    routers: BTreeMap<Address, Arc<dyn SwapRouter>>,
    contracts: BTreeMap<Address, Arc<dyn Contract>>,
    storage: BTreeMap<(Address, B256), U256>,
    logs: Vec<Log>,
}

impl Host {
    /// Create an empty host
    pub fn new(chain_id: u64, timestamp: u64) -> Self {
        Self {
            chain_id,
            timestamp,
            deploy_nonce: 0,
            native: BTreeMap::new(),
            tokens: BTreeMap::new(),
            feeds: BTreeMap::new(),
            routers: BTreeMap::new(),
            contracts: BTreeMap::new(),
            storage: BTreeMap::new(),
            logs: Vec::new(),
        }
    }

    // ============ Clock ============

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Current block timestamp
    pub fn now(&self) -> u64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    pub fn advance_time(&mut self, secs: u64) {
        self.timestamp = self.timestamp.saturating_add(secs);
    }

    // ============ Deployment ============

    /// Allocate a fresh contract address (CREATE-style, per-host nonce)
    pub fn allocate_address(&mut self, deployer: Address) -> Address {
        self.deploy_nonce += 1;
        let mut preimage = Vec::with_capacity(28);
        preimage.extend_from_slice(deployer.as_slice());
        preimage.extend_from_slice(&self.deploy_nonce.to_be_bytes());
        let hash = keccak256_hash(&preimage);
        Address::from_slice(&hash[12..])
    }

    /// Whether host-level code lives at the address
    pub fn has_code(&self, address: &Address) -> bool {
        self.tokens.contains_key(address)
            || self.feeds.contains_key(address)
            || self.routers.contains_key(address)
            || self.contracts.contains_key(address)
    }

    pub fn deploy_token(
        &mut self,
        deployer: Address,
        name: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
    ) -> Address {
        let address = self.allocate_address(deployer);
        self.tokens
            .insert(address, TokenState::new(name, symbol, decimals));
        address
    }

    pub fn deploy_feed(
        &mut self,
        deployer: Address,
        description: impl Into<String>,
        decimals: u8,
        answer: i128,
    ) -> Address {
        let address = self.allocate_address(deployer);
        let now = self.timestamp;
        self.feeds
            .insert(address, FeedState::new(description, decimals, answer, now));
        address
    }

    pub fn deploy_router(&mut self, deployer: Address, router: Arc<dyn SwapRouter>) -> Address {
        let address = self.allocate_address(deployer);
        self.routers.insert(address, router);
        address
    }

    pub fn deploy_contract(&mut self, deployer: Address, contract: Arc<dyn Contract>) -> Address {
        let address = self.allocate_address(deployer);
        self.contracts.insert(address, contract);
        address
    }

    // ============ Events ============

    pub fn emit(&mut self, emitter: Address, event: Event) {
        debug!(emitter = %emitter, event = event.name(), "Event emitted");
        self.logs.push(Log { emitter, event });
    }

    /// Full event log
    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    // ============ Native balances ============

    pub fn native_balance(&self, account: &Address) -> U256 {
        self.native.get(account).copied().unwrap_or(U256::ZERO)
    }

    /// Credit native balance out of thin air (genesis allocation)
    pub fn fund_native(&mut self, account: Address, amount: U256) -> Result<()> {
        let balance = self.native_balance(&account);
        let updated = balance
            .checked_add(amount)
            .ok_or(Error::ArithmeticOverflow("native funding"))?;
        self.native.insert(account, updated);
        Ok(())
    }

    pub fn transfer_native(&mut self, from: Address, to: Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }

        let available = self.native_balance(&from);
        if available < amount {
            return Err(Error::InsufficientBalance {
                available,
                required: amount,
            });
        }

        self.native.insert(from, available - amount);
        let balance = self.native.entry(to).or_insert(U256::ZERO);
        *balance += amount;
        Ok(())
    }

    // ============ Tokens ============

    pub fn token(&self, token: &Address) -> Result<&TokenState> {
        self.tokens
            .get(token)
            .ok_or_else(|| Error::ExecutionReverted(format!("no token at {}", token)))
    }

    fn token_mut(&mut self, token: &Address) -> Result<&mut TokenState> {
        self.tokens
            .get_mut(token)
            .ok_or_else(|| Error::ExecutionReverted(format!("no token at {}", token)))
    }

    pub fn is_token(&self, address: &Address) -> bool {
        self.tokens.contains_key(address)
    }

    pub fn token_decimals(&self, token: &Address) -> Result<u8> {
        Ok(self.token(token)?.decimals)
    }

    pub fn balance_of(&self, token: &Address, account: &Address) -> U256 {
        self.tokens
            .get(token)
            .map(|t| t.balance_of(account))
            .unwrap_or(U256::ZERO)
    }

    pub fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> U256 {
        self.tokens
            .get(token)
            .map(|t| t.allowance(owner, spender))
            .unwrap_or(U256::ZERO)
    }

    pub fn mint_token(&mut self, token: Address, to: Address, amount: U256) -> Result<()> {
        self.token_mut(&token)?.mint(to, amount)?;
        self.emit(
            token,
            Event::Transfer {
                from: Address::ZERO,
                to,
                value: amount,
            },
        );
        Ok(())
    }

    pub fn token_transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        self.token_mut(&token)?.transfer(from, to, amount)?;
        self.emit(
            token,
            Event::Transfer {
                from,
                to,
                value: amount,
            },
        );
        Ok(())
    }

    pub fn token_approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<()> {
        self.token_mut(&token)?.approve(owner, spender, amount)?;
        self.emit(
            token,
            Event::Approval {
                owner,
                spender,
                value: amount,
            },
        );
        Ok(())
    }

    pub fn token_transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        let state = self.token_mut(&token)?;
        state.spend_allowance(from, spender, amount)?;
        state.transfer(from, to, amount)?;
        self.emit(
            token,
            Event::Transfer {
                from,
                to,
                value: amount,
            },
        );
        Ok(())
    }

    // ============ Feeds ============

    pub fn feed(&self, feed: &Address) -> Option<&FeedState> {
        self.feeds.get(feed)
    }

    /// Publish a new answer stamped with the current block time
    pub fn update_feed(&mut self, feed: Address, answer: i128) -> Result<()> {
        let now = self.timestamp;
        self.update_feed_at(feed, answer, now)
    }

    /// Publish a new answer with an explicit update time
    pub fn update_feed_at(&mut self, feed: Address, answer: i128, updated_at: u64) -> Result<()> {
        let state = self
            .feeds
            .get_mut(&feed)
            .ok_or(Error::PriceFeedNotFound(feed))?;
        state.push_answer(answer, updated_at);
        Ok(())
    }

    /// Overwrite the latest round verbatim
    pub fn set_round_data(&mut self, feed: Address, round: RoundData) -> Result<()> {
        let state = self
            .feeds
            .get_mut(&feed)
            .ok_or(Error::PriceFeedNotFound(feed))?;
        state.latest = round;
        Ok(())
    }

    // ============ Routers and contracts ============

    pub fn router(&self, router: &Address) -> Result<Arc<dyn SwapRouter>> {
        self.routers
            .get(router)
            .cloned()
            .ok_or_else(|| Error::ExecutionReverted(format!("no swap router at {}", router)))
    }

    pub fn sload(&self, contract: Address, slot: B256) -> U256 {
        self.storage
            .get(&(contract, slot))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn sstore(&mut self, contract: Address, slot: B256, value: U256) {
        self.storage.insert((contract, slot), value);
    }

    /// Execute a call from `from`
    ///
    /// Tokens decode ABI call data, registered contracts run their code, and
    /// any other address receives the native value as a plain transfer.
    pub fn call(&mut self, from: Address, call: &Call) -> Result<Vec<u8>> {
        if self.tokens.contains_key(&call.target) {
            if !call.value.is_zero() {
                return Err(Error::ExecutionReverted(
                    "token contracts do not accept value".into(),
                ));
            }
            return self.call_token(from, call.target, &call.data);
        }

        if let Some(contract) = self.contracts.get(&call.target).cloned() {
            self.transfer_native(from, call.target, call.value)?;
            return contract.call(self, call.target, from, call.value, &call.data);
        }

        if self.feeds.contains_key(&call.target) || self.routers.contains_key(&call.target) {
            return Err(Error::ExecutionReverted(format!(
                "{} does not accept direct calls",
                call.target
            )));
        }

        self.transfer_native(from, call.target, call.value)?;
        Ok(vec![])
    }

    fn call_token(&mut self, from: Address, token: Address, data: &[u8]) -> Result<Vec<u8>> {
        match TokenCall::decode(data)? {
            TokenCall::Transfer { to, amount } => {
                self.token_transfer(token, from, to, amount)?;
                Ok(U256::from(1).to_be_bytes::<32>().to_vec())
            }
            TokenCall::Approve { spender, amount } => {
                self.token_approve(token, from, spender, amount)?;
                Ok(U256::from(1).to_be_bytes::<32>().to_vec())
            }
            TokenCall::TransferFrom {
                from: owner,
                to,
                amount,
            } => {
                self.token_transfer_from(token, from, owner, to, amount)?;
                Ok(U256::from(1).to_be_bytes::<32>().to_vec())
            }
            TokenCall::BalanceOf { account } => Ok(self
                .balance_of(&token, &account)
                .to_be_bytes::<32>()
                .to_vec()),
        }
    }
}

impl PriceFeedSource for Host {
    fn decimals(&self, feed: &Address) -> Result<u8> {
        self.feeds
            .get(feed)
            .map(|f| f.decimals)
            .ok_or(Error::PriceFeedNotFound(*feed))
    }

    fn latest_round_data(&self, feed: &Address) -> Result<RoundData> {
        self.feeds
            .get(feed)
            .map(|f| f.latest)
            .ok_or(Error::PriceFeedNotFound(*feed))
    }

    fn now(&self) -> u64 {
        self.timestamp
    }
}
