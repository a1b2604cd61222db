//! Validation phase checks

use super::{WalletContext, WalletState};
use crate::types::{Signature, eth_signed_message_hash};
use crate::{Error, Result};
use alloy_primitives::{B256, U256};
use tracing::{debug, warn};

/// Require `signature` over `personal_sign(user_op_hash)` by the owner
pub(super) fn verify_owner_signature(
    state: &WalletState,
    user_op_hash: &B256,
    signature: &[u8],
) -> Result<()> {
    let signature = Signature::from_slice(signature)?;
    let signer = signature.recover(&eth_signed_message_hash(user_op_hash))?;

    if signer != state.owner {
        warn!(signer = %signer, owner = %state.owner, "Signature not from owner");
        return Err(Error::InvalidSignature(format!(
            "recovered {} instead of the owner",
            signer
        )));
    }

    debug!(signer = %signer, "Owner signature verified");
    Ok(())
}

/// Compare-and-increment of the operation nonce
pub(super) fn consume_nonce(state: &mut WalletState, nonce: U256) -> Result<()> {
    if nonce != state.nonce {
        warn!(expected = %state.nonce, actual = %nonce, "Nonce mismatch");
        return Err(Error::InvalidNonce {
            expected: state.nonce,
            actual: nonce,
        });
    }

    state.nonce = state
        .nonce
        .checked_add(U256::from(1))
        .ok_or(Error::ArithmeticOverflow("nonce"))?;
    Ok(())
}

/// Pay what the entry point is missing for this operation
pub(super) fn pay_prefund(ctx: &mut WalletContext<'_>, missing_account_funds: U256) -> Result<()> {
    if missing_account_funds.is_zero() {
        return Ok(());
    }

    ctx.host
        .transfer_native(ctx.address, ctx.caller, missing_account_funds)?;
    debug!(amount = %missing_account_funds, "Prefund paid to entry point");
    Ok(())
}
