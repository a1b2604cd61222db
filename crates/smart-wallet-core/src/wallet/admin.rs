//! Configuration operations: whitelist, fee, fee admin and ownership

use super::logic::StandardWallet;
use super::{TokenBinding, WalletContext};
use crate::events::Event;
use crate::oracle::PriceOracleGateway;
use crate::{Error, Result};
use alloy_primitives::Address;
use tracing::{info, warn};

impl StandardWallet {
    pub(super) fn set_token_whitelist_and_price_feed(
        ctx: &mut WalletContext<'_>,
        token: Address,
        enabled: bool,
        feed: Address,
    ) -> Result<Vec<u8>> {
        ctx.require_whitelist_manager()?;
        if token.is_zero() {
            return Err(Error::InvalidAddress("token is zero".into()));
        }
        if !ctx.host.is_token(&token) {
            return Err(Error::InvalidAddress(format!("{} is not a token", token)));
        }

        // The feed must answer sanely before it gates anything
        PriceOracleGateway::new(ctx.state.policy.staleness_window_secs).quote(&*ctx.host, feed)?;

        ctx.state.bindings.insert(
            token,
            TokenBinding {
                token,
                feed,
                enabled,
            },
        );
        ctx.emit(Event::TokenWhitelisted {
            token,
            status: enabled,
        });
        ctx.emit(Event::PriceFeedUpdated { token, feed });

        info!(wallet = %ctx.address, token = %token, feed = %feed, enabled, "Token binding set");
        Ok(vec![])
    }

    pub(super) fn remove_token_from_whitelist(
        ctx: &mut WalletContext<'_>,
        token: Address,
    ) -> Result<Vec<u8>> {
        ctx.require_whitelist_manager()?;

        let binding = ctx
            .state
            .bindings
            .get_mut(&token)
            .ok_or(Error::NotWhitelisted(token))?;
        binding.enabled = false;

        ctx.emit(Event::TokenWhitelisted {
            token,
            status: false,
        });

        info!(wallet = %ctx.address, token = %token, "Token removed from whitelist");
        Ok(vec![])
    }

    pub(super) fn update_fee(ctx: &mut WalletContext<'_>, new_fee_in_cents: u64) -> Result<Vec<u8>> {
        ctx.require_fee_admin()?;

        let max = ctx.state.policy.max_fee_cents;
        if new_fee_in_cents > max {
            warn!(fee = new_fee_in_cents, max, "Fee above ceiling");
            return Err(Error::FeeTooHigh {
                fee: new_fee_in_cents,
                max,
            });
        }

        let old_fee = ctx.state.fee_in_cents;
        ctx.state.fee_in_cents = new_fee_in_cents;
        ctx.emit(Event::FeeUpdated {
            old_fee,
            new_fee: new_fee_in_cents,
        });

        info!(wallet = %ctx.address, old_fee, new_fee = new_fee_in_cents, "Fee updated");
        Ok(vec![])
    }

    pub(super) fn update_fee_admin(
        ctx: &mut WalletContext<'_>,
        new_admin: Address,
    ) -> Result<Vec<u8>> {
        ctx.require_fee_admin()?;
        if new_admin.is_zero() {
            return Err(Error::InvalidAddress("fee admin is zero".into()));
        }

        let old_admin = ctx.state.fee_admin;
        ctx.state.fee_admin = new_admin;
        ctx.emit(Event::FeeAdminUpdated {
            old_admin,
            new_admin,
        });

        info!(wallet = %ctx.address, old_admin = %old_admin, new_admin = %new_admin, "Fee admin updated");
        Ok(vec![])
    }

    pub(super) fn transfer_ownership(
        ctx: &mut WalletContext<'_>,
        new_owner: Address,
    ) -> Result<Vec<u8>> {
        ctx.require_owner()?;
        if new_owner.is_zero() {
            return Err(Error::InvalidAddress("owner is zero".into()));
        }

        let previous_owner = ctx.state.owner;
        ctx.state.owner = new_owner;
        ctx.emit(Event::OwnershipTransferred {
            previous_owner,
            new_owner,
        });

        info!(wallet = %ctx.address, previous_owner = %previous_owner, new_owner = %new_owner, "Ownership transferred");
        Ok(vec![])
    }
}
