//! Standard wallet logic: validation and the fund-moving operations

use super::auth;
use super::{WalletCall, WalletContext, WalletInit, WalletLogic, WalletState};
use crate::entry_point::UserOperation;
use crate::events::Event;
use crate::host::Call;
use crate::oracle::{PriceOracleGateway, convert_amount, usd_cents_to_token_units};
use crate::swap::SwapGateway;
use crate::{Error, Result};
use alloy_primitives::{Address, B256, U256};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Wallet logic shipped with the platform
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardWallet;

impl StandardWallet {
    pub const VERSION: &'static str = "1.0.0";

    pub fn new() -> Self {
        Self
    }

    fn oracle(state: &WalletState) -> PriceOracleGateway {
        PriceOracleGateway::new(state.policy.staleness_window_secs)
    }

    /// Forward a call, surfacing any callee failure as a revert
    fn forward(ctx: &mut WalletContext<'_>, call: &Call) -> Result<Vec<u8>> {
        ctx.host.call(ctx.address, call).map_err(|e| match e {
            Error::ExecutionReverted(reason) => Error::ExecutionReverted(reason),
            other => Error::ExecutionReverted(other.to_string()),
        })
    }

    fn approve_token(ctx: &mut WalletContext<'_>, token: Address, amount: U256) -> Result<Vec<u8>> {
        ctx.require_executor()?;
        ctx.state.enabled_binding(&token)?;
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }

        let spender = ctx.state.swap_gateway;
        ctx.host.token_approve(token, ctx.address, spender, amount)?;
        ctx.emit(Event::TokenApproved {
            token,
            spender,
            amount,
        });

        info!(wallet = %ctx.address, token = %token, amount = %amount, "Token approved for swaps");
        Ok(vec![])
    }

    #[instrument(skip(ctx), fields(wallet = %ctx.address))]
    fn execute_swap(
        ctx: &mut WalletContext<'_>,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out_min: U256,
        recipient: Address,
    ) -> Result<Vec<u8>> {
        ctx.require_executor()?;
        let binding_in = ctx.state.enabled_binding(&token_in)?;
        let binding_out = ctx.state.enabled_binding(&token_out)?;

        if amount_in.is_zero() {
            return Err(Error::ZeroAmount);
        }
        if recipient.is_zero() {
            return Err(Error::InvalidAddress("swap recipient is zero".into()));
        }
        if token_in == token_out {
            return Err(Error::InvalidCallData("swap tokens are identical".into()));
        }

        // One read per feed for the whole operation
        let oracle = Self::oracle(ctx.state);
        let quote_in = oracle.quote(&*ctx.host, binding_in.feed)?;
        let quote_out = oracle.quote(&*ctx.host, binding_out.feed)?;
        let expected = convert_amount(
            amount_in,
            &quote_in,
            ctx.host.token_decimals(&token_in)?,
            &quote_out,
            ctx.host.token_decimals(&token_out)?,
        )?;

        if amount_out_min > expected {
            warn!(expected = %expected, minimum = %amount_out_min, "Minimum above oracle expectation");
            return Err(Error::SlippageExceeded {
                minimum: amount_out_min,
                available: expected,
            });
        }

        let router = ctx.state.swap_gateway;
        ctx.host.token_approve(token_in, ctx.address, router, amount_in)?;

        let policy = ctx.state.policy;
        let gateway = SwapGateway::new(policy.swap_fee_tier, policy.swap_deadline_secs);
        let amount_out = gateway.swap_exact_input(
            ctx.host,
            router,
            ctx.address,
            token_in,
            token_out,
            amount_in,
            amount_out_min,
        )?;

        if amount_out < amount_out_min {
            return Err(Error::SlippageExceeded {
                minimum: amount_out_min,
                available: amount_out,
            });
        }

        if recipient != ctx.address {
            ctx.host
                .token_transfer(token_out, ctx.address, recipient, amount_out)?;
        }

        ctx.emit(Event::SwapExecuted {
            token_in,
            token_out,
            amount_in,
            amount_out,
            recipient,
        });

        info!(
            token_in = %token_in,
            token_out = %token_out,
            amount_in = %amount_in,
            amount_out = %amount_out,
            expected = %expected,
            "Swap executed"
        );
        Ok(amount_out.to_be_bytes::<32>().to_vec())
    }

    #[instrument(skip(ctx, payload), fields(wallet = %ctx.address))]
    fn execute_token_transfer(
        ctx: &mut WalletContext<'_>,
        token: Address,
        fee_in_token_units: U256,
        payload: Call,
    ) -> Result<Vec<u8>> {
        ctx.require_executor()?;
        let binding = ctx.state.enabled_binding(&token)?;

        let quote = Self::oracle(ctx.state).quote(&*ctx.host, binding.feed)?;
        let fee = usd_cents_to_token_units(
            ctx.state.fee_in_cents,
            &quote,
            ctx.host.token_decimals(&token)?,
        )?;

        if fee > fee_in_token_units {
            warn!(fee = %fee, ceiling = %fee_in_token_units, "Fee above caller ceiling");
            return Err(Error::FeeQuoteExceeded {
                required: fee,
                allowed: fee_in_token_units,
            });
        }

        if !fee.is_zero() {
            let fee_admin = ctx.state.fee_admin;
            ctx.host.token_transfer(token, ctx.address, fee_admin, fee)?;
            ctx.emit(Event::FeeCollected {
                token,
                amount: fee,
                fee_admin,
            });
            debug!(fee = %fee, fee_admin = %fee_admin, "Fee collected");
        }

        let output = Self::forward(ctx, &payload)?;
        info!(token = %token, fee = %fee, target = %payload.target, "Token transfer executed");
        Ok(output)
    }

    fn execute(ctx: &mut WalletContext<'_>, call: Call) -> Result<Vec<u8>> {
        ctx.require_executor()?;
        let output = Self::forward(ctx, &call)?;
        debug!(wallet = %ctx.address, target = %call.target, value = %call.value, "Call forwarded");
        Ok(output)
    }

    fn execute_batch(ctx: &mut WalletContext<'_>, calls: Vec<Call>) -> Result<Vec<u8>> {
        ctx.require_executor()?;
        let count = calls.len();
        for (index, call) in calls.iter().enumerate() {
            Self::forward(ctx, call).map_err(|e| match e {
                Error::ExecutionReverted(reason) => {
                    Error::ExecutionReverted(format!("call {}: {}", index, reason))
                }
                other => other,
            })?;
        }
        debug!(wallet = %ctx.address, count, "Batch forwarded");
        Ok(vec![])
    }
}

impl WalletLogic for StandardWallet {
    fn version(&self) -> &'static str {
        Self::VERSION
    }

    fn initialize(&self, init: WalletInit) -> Result<WalletState> {
        if init.owner.is_zero() {
            return Err(Error::InvalidAddress("owner is zero".into()));
        }
        if init.fee_admin.is_zero() {
            return Err(Error::InvalidAddress("fee admin is zero".into()));
        }
        init.policy.validate()?;

        Ok(WalletState {
            owner: init.owner,
            entry_point: init.entry_point,
            factory: init.factory,
            fee_admin: init.fee_admin,
            swap_gateway: init.swap_gateway,
            fee_in_cents: init.policy.default_fee_cents,
            nonce: U256::ZERO,
            bindings: BTreeMap::new(),
            policy: init.policy,
        })
    }

    #[instrument(skip(self, ctx, op), fields(wallet = %ctx.address, nonce = %op.nonce))]
    fn validate_user_op(
        &self,
        ctx: &mut WalletContext<'_>,
        op: &UserOperation,
        user_op_hash: B256,
        missing_account_funds: U256,
    ) -> Result<()> {
        ctx.require_entry_point()?;
        if op.sender != ctx.address {
            return Err(Error::InvalidCallData(format!(
                "operation is for {}, not {}",
                op.sender, ctx.address
            )));
        }

        auth::verify_owner_signature(ctx.state, &user_op_hash, &op.signature)?;
        auth::consume_nonce(ctx.state, op.nonce)?;
        auth::pay_prefund(ctx, missing_account_funds)?;

        debug!("User operation validated");
        Ok(())
    }

    fn dispatch(&self, ctx: &mut WalletContext<'_>, call: WalletCall) -> Result<Vec<u8>> {
        debug!(wallet = %ctx.address, caller = %ctx.caller, op = call.name(), "Dispatching wallet call");

        match call {
            WalletCall::Execute(call) => Self::execute(ctx, call),
            WalletCall::ExecuteBatch(calls) => Self::execute_batch(ctx, calls),
            WalletCall::ApproveToken { token, amount } => Self::approve_token(ctx, token, amount),
            WalletCall::ExecuteSwap {
                token_in,
                token_out,
                amount_in,
                amount_out_min,
                recipient,
            } => Self::execute_swap(ctx, token_in, token_out, amount_in, amount_out_min, recipient),
            WalletCall::ExecuteTokenTransfer {
                token,
                fee_in_token_units,
                payload,
            } => Self::execute_token_transfer(ctx, token, fee_in_token_units, payload),
            WalletCall::SetTokenWhitelistAndPriceFeed {
                token,
                enabled,
                feed,
            } => Self::set_token_whitelist_and_price_feed(ctx, token, enabled, feed),
            WalletCall::RemoveTokenFromWhitelist { token } => {
                Self::remove_token_from_whitelist(ctx, token)
            }
            WalletCall::UpdateFee { new_fee_in_cents } => Self::update_fee(ctx, new_fee_in_cents),
            WalletCall::UpdateFeeAdmin { new_admin } => Self::update_fee_admin(ctx, new_admin),
            WalletCall::TransferOwnership { new_owner } => {
                Self::transfer_ownership(ctx, new_owner)
            }
        }
    }
}
