//! External contracts reachable through generic call forwarding

use super::Host;
use crate::{Error, Result};
use alloy_primitives::{Address, B256, U256};
use std::fmt;

/// Code of an external contract
///
/// Contracts are stateless code; persistent values live in host storage
/// under the contract's address, so they roll back with the ledger.
pub trait Contract: fmt::Debug + Send + Sync {
    /// Handle a call. `this` is the contract's own address.
    fn call(
        &self,
        host: &mut Host,
        this: Address,
        caller: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Vec<u8>>;
}

/// Counts calls and remembers the last caller and payload length
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterContract;

impl CounterContract {
    pub const COUNT_SLOT: B256 = B256::ZERO;
    pub const LAST_CALLER_SLOT: B256 = B256::repeat_byte(0x01);
}

impl Contract for CounterContract {
    fn call(
        &self,
        host: &mut Host,
        this: Address,
        caller: Address,
        _value: U256,
        _data: &[u8],
    ) -> Result<Vec<u8>> {
        let count = host.sload(this, Self::COUNT_SLOT) + U256::from(1);
        host.sstore(this, Self::COUNT_SLOT, count);
        host.sstore(
            this,
            Self::LAST_CALLER_SLOT,
            U256::from_be_slice(caller.as_slice()),
        );
        Ok(count.to_be_bytes::<32>().to_vec())
    }
}

/// Always reverts with a fixed reason
#[derive(Debug, Clone)]
pub struct RevertingContract {
    reason: String,
}

impl RevertingContract {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Contract for RevertingContract {
    fn call(
        &self,
        _host: &mut Host,
        _this: Address,
        _caller: Address,
        _value: U256,
        _data: &[u8],
    ) -> Result<Vec<u8>> {
        Err(Error::ExecutionReverted(self.reason.clone()))
    }
}
