//! Fungible token ledger (ERC-20 semantics)
//!
//! Amounts are unsigned integers in the token's smallest unit. Tokens are
//! also reachable through ABI-encoded calls so wallets can move them with a
//! generic `execute`.

use crate::types::address_word;
use crate::{Error, Result};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// transfer(address,uint256)
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
/// approve(address,uint256)
pub const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];
/// transferFrom(address,address,uint256)
pub const TRANSFER_FROM_SELECTOR: [u8; 4] = [0x23, 0xb8, 0x72, 0xdd];
/// balanceOf(address)
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// State of one deployed token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenState {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
    balances: BTreeMap<Address, U256>,
    allowances: BTreeMap<(Address, Address), U256>,
}

impl TokenState {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            decimals,
            ..Default::default()
        }
    }

    pub fn balance_of(&self, account: &Address) -> U256 {
        self.balances.get(account).copied().unwrap_or(U256::ZERO)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> U256 {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub(crate) fn mint(&mut self, to: Address, amount: U256) -> Result<()> {
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(Error::ArithmeticOverflow("token mint"))?;
        let balance = self.balances.entry(to).or_insert(U256::ZERO);
        *balance += amount;
        Ok(())
    }

    pub(crate) fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<()> {
        if to == Address::ZERO {
            return Err(Error::InvalidAddress("transfer to the zero address".into()));
        }

        let available = self.balance_of(&from);
        if available < amount {
            return Err(Error::InsufficientBalance {
                available,
                required: amount,
            });
        }

        self.balances.insert(from, available - amount);
        let balance = self.balances.entry(to).or_insert(U256::ZERO);
        *balance += amount;
        Ok(())
    }

    pub(crate) fn approve(&mut self, owner: Address, spender: Address, amount: U256) -> Result<()> {
        if spender == Address::ZERO {
            return Err(Error::InvalidAddress("approve to the zero address".into()));
        }
        self.allowances.insert((owner, spender), amount);
        Ok(())
    }

    pub(crate) fn spend_allowance(
        &mut self,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<()> {
        let available = self.allowance(&owner, &spender);
        if available == U256::MAX {
            return Ok(());
        }
        if available < amount {
            return Err(Error::InsufficientAllowance {
                available,
                required: amount,
            });
        }
        self.allowances.insert((owner, spender), available - amount);
        Ok(())
    }
}

/// ABI-level token call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCall {
    Transfer { to: Address, amount: U256 },
    Approve { spender: Address, amount: U256 },
    TransferFrom { from: Address, to: Address, amount: U256 },
    BalanceOf { account: Address },
}

impl TokenCall {
    /// ABI-encode the call (selector + 32-byte words)
    pub fn encode(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(4 + 3 * 32);
        match self {
            TokenCall::Transfer { to, amount } => {
                encoded.extend_from_slice(&TRANSFER_SELECTOR);
                encoded.extend_from_slice(&address_word(to));
                encoded.extend_from_slice(&amount.to_be_bytes::<32>());
            }
            TokenCall::Approve { spender, amount } => {
                encoded.extend_from_slice(&APPROVE_SELECTOR);
                encoded.extend_from_slice(&address_word(spender));
                encoded.extend_from_slice(&amount.to_be_bytes::<32>());
            }
            TokenCall::TransferFrom { from, to, amount } => {
                encoded.extend_from_slice(&TRANSFER_FROM_SELECTOR);
                encoded.extend_from_slice(&address_word(from));
                encoded.extend_from_slice(&address_word(to));
                encoded.extend_from_slice(&amount.to_be_bytes::<32>());
            }
            TokenCall::BalanceOf { account } => {
                encoded.extend_from_slice(&BALANCE_OF_SELECTOR);
                encoded.extend_from_slice(&address_word(account));
            }
        }
        encoded
    }

    /// Decode ABI call data
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::InvalidCallData("missing function selector".into()));
        }

        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[..4]);
        let args = &data[4..];

        match selector {
            TRANSFER_SELECTOR => Ok(TokenCall::Transfer {
                to: read_address(args, 0)?,
                amount: read_u256(args, 1)?,
            }),
            APPROVE_SELECTOR => Ok(TokenCall::Approve {
                spender: read_address(args, 0)?,
                amount: read_u256(args, 1)?,
            }),
            TRANSFER_FROM_SELECTOR => Ok(TokenCall::TransferFrom {
                from: read_address(args, 0)?,
                to: read_address(args, 1)?,
                amount: read_u256(args, 2)?,
            }),
            BALANCE_OF_SELECTOR => Ok(TokenCall::BalanceOf {
                account: read_address(args, 0)?,
            }),
            other => Err(Error::InvalidCallData(format!(
                "unknown token selector 0x{}",
                hex::encode(other)
            ))),
        }
    }
}

fn read_word(args: &[u8], index: usize) -> Result<&[u8]> {
    let start = index * 32;
    args.get(start..start + 32)
        .ok_or_else(|| Error::InvalidCallData(format!("missing argument {}", index)))
}

fn read_address(args: &[u8], index: usize) -> Result<Address> {
    let word = read_word(args, index)?;
    if word[..12].iter().any(|b| *b != 0) {
        return Err(Error::InvalidCallData(format!(
            "argument {} is not an address",
            index
        )));
    }
    Ok(Address::from_slice(&word[12..]))
}

fn read_u256(args: &[u8], index: usize) -> Result<U256> {
    Ok(U256::from_be_slice(read_word(args, index)?))
}
