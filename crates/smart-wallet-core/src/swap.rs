//! Swap gateway
//!
//! Thin adapter over an external exchange's single-hop exact-input swap.
//! The exchange itself is a `SwapRouter` deployed on the host; the gateway
//! supplies the configured fee tier and deadline and maps router failures
//! into the core's error taxonomy.

use crate::host::Host;
use crate::oracle::{PriceOracleGateway, convert_amount};
use crate::{Error, Result};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error as ThisError;
use tracing::{debug, instrument};

/// Parameters of `exactInputSingle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactInputSingleParams {
    pub token_in: Address,
    pub token_out: Address,
    /// Pool fee tier in hundredths of a basis point
    pub fee: u32,
    pub recipient: Address,
    pub deadline: u64,
    pub amount_in: U256,
    pub amount_out_minimum: U256,
    /// 0 = no price limit
    pub sqrt_price_limit_x96: U256,
}

/// Router-level failures
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum RouterError {
    /// Output below `amount_out_minimum`
    #[error("Too little received: {amount_out} < {minimum}")]
    InsufficientOutput { amount_out: U256, minimum: U256 },

    /// Deadline passed
    #[error("Transaction too old")]
    Expired,

    /// Any other revert
    #[error("{0}")]
    Reverted(String),
}

impl From<Error> for RouterError {
    fn from(e: Error) -> Self {
        RouterError::Reverted(e.to_string())
    }
}

/// External exchange interface
pub trait SwapRouter: fmt::Debug + Send + Sync {
    /// Swap exactly `amount_in` of `token_in`, pulling it from `caller`
    /// with `transferFrom`, and send the output to `recipient`
    fn exact_input_single(
        &self,
        host: &mut Host,
        this: Address,
        caller: Address,
        params: ExactInputSingleParams,
    ) -> std::result::Result<U256, RouterError>;
}

/// Gateway configuration applied to every swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapGateway {
    fee_tier: u32,
    deadline_secs: u64,
}

impl SwapGateway {
    pub fn new(fee_tier: u32, deadline_secs: u64) -> Self {
        Self {
            fee_tier,
            deadline_secs,
        }
    }

    /// Swap through `router` on behalf of `wallet`, delivering to `wallet`
    ///
    /// The wallet must already have approved the router for `amount_in`.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, host))]
    pub fn swap_exact_input(
        &self,
        host: &mut Host,
        router: Address,
        wallet: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out_minimum: U256,
    ) -> Result<U256> {
        let implementation = host.router(&router)?;
        let params = ExactInputSingleParams {
            token_in,
            token_out,
            fee: self.fee_tier,
            recipient: wallet,
            deadline: host.now().saturating_add(self.deadline_secs),
            amount_in,
            amount_out_minimum,
            sqrt_price_limit_x96: U256::ZERO,
        };

        let amount_out = implementation
            .exact_input_single(host, router, wallet, params)
            .map_err(|e| match e {
                RouterError::InsufficientOutput {
                    amount_out,
                    minimum,
                } => Error::SlippageExceeded {
                    minimum,
                    available: amount_out,
                },
                other => Error::ExecutionReverted(other.to_string()),
            })?;

        debug!(amount_out = %amount_out, "Router swap completed");
        Ok(amount_out)
    }
}

/// Reference exchange pricing swaps from its own feeds
///
/// Output = oracle-equivalent amount minus the pool fee tier and an optional
/// haircut (in basis points). Pays out of the router's own token reserves.
#[derive(Debug, Clone)]
pub struct OracleSwapRouter {
    feeds: BTreeMap<Address, Address>,
    oracle: PriceOracleGateway,
    haircut_bps: u32,
}

impl OracleSwapRouter {
    pub fn new(staleness_window: u64) -> Self {
        Self {
            feeds: BTreeMap::new(),
            oracle: PriceOracleGateway::new(staleness_window),
            haircut_bps: 0,
        }
    }

    /// Price `token` with `feed`
    pub fn with_feed(mut self, token: Address, feed: Address) -> Self {
        self.feeds.insert(token, feed);
        self
    }

    /// Deliver `bps` less than the fair output (models price impact)
    pub fn with_haircut_bps(mut self, bps: u32) -> Self {
        self.haircut_bps = bps;
        self
    }

    fn quote_output(
        &self,
        host: &Host,
        params: &ExactInputSingleParams,
    ) -> std::result::Result<U256, RouterError> {
        let feed_in = self
            .feeds
            .get(&params.token_in)
            .ok_or_else(|| RouterError::Reverted("unsupported input token".into()))?;
        let feed_out = self
            .feeds
            .get(&params.token_out)
            .ok_or_else(|| RouterError::Reverted("unsupported output token".into()))?;

        let quote_in = self.oracle.quote(host, *feed_in)?;
        let quote_out = self.oracle.quote(host, *feed_out)?;
        let fair = convert_amount(
            params.amount_in,
            &quote_in,
            host.token_decimals(&params.token_in)?,
            &quote_out,
            host.token_decimals(&params.token_out)?,
        )?;

        let after_fee = fair * U256::from(1_000_000u64 - params.fee as u64) / U256::from(1_000_000u64);
        let haircut = 10_000u64.saturating_sub(self.haircut_bps as u64);
        Ok(after_fee * U256::from(haircut) / U256::from(10_000u64))
    }
}

impl SwapRouter for OracleSwapRouter {
    fn exact_input_single(
        &self,
        host: &mut Host,
        this: Address,
        caller: Address,
        params: ExactInputSingleParams,
    ) -> std::result::Result<U256, RouterError> {
        if host.now() > params.deadline {
            return Err(RouterError::Expired);
        }
        if params.fee >= 1_000_000 {
            return Err(RouterError::Reverted("invalid fee tier".into()));
        }

        let amount_out = self.quote_output(host, &params)?;
        if amount_out < params.amount_out_minimum {
            return Err(RouterError::InsufficientOutput {
                amount_out,
                minimum: params.amount_out_minimum,
            });
        }

        host.token_transfer_from(params.token_in, this, caller, this, params.amount_in)?;
        host.token_transfer(params.token_out, this, params.recipient, amount_out)?;
        Ok(amount_out)
    }
}
