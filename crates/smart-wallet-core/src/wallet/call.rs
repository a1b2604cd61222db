//! Wallet operations as carried in `UserOperation::call_data`

use crate::{Error, Result};
use crate::host::Call;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// One wallet operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletCall {
    /// Generic call forwarding
    Execute(Call),
    /// Several calls, all-or-nothing
    ExecuteBatch(Vec<Call>),
    /// Allow the swap gateway to spend `amount` of `token`
    ApproveToken { token: Address, amount: U256 },
    /// Swap through the gateway and forward the proceeds
    ExecuteSwap {
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out_min: U256,
        recipient: Address,
    },
    /// Pay the USD fee in `token`, then forward `payload`
    ExecuteTokenTransfer {
        token: Address,
        /// Highest fee, in token units, the caller accepts
        fee_in_token_units: U256,
        payload: Call,
    },
    SetTokenWhitelistAndPriceFeed {
        token: Address,
        enabled: bool,
        feed: Address,
    },
    RemoveTokenFromWhitelist { token: Address },
    UpdateFee { new_fee_in_cents: u64 },
    UpdateFeeAdmin { new_admin: Address },
    TransferOwnership { new_owner: Address },
}

impl WalletCall {
    /// Encode as call data
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode call data
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }

    /// Operation name for logs
    pub fn name(&self) -> &'static str {
        match self {
            WalletCall::Execute(_) => "execute",
            WalletCall::ExecuteBatch(_) => "executeBatch",
            WalletCall::ApproveToken { .. } => "approveToken",
            WalletCall::ExecuteSwap { .. } => "executeSwap",
            WalletCall::ExecuteTokenTransfer { .. } => "executeTokenTransfer",
            WalletCall::SetTokenWhitelistAndPriceFeed { .. } => "setTokenWhitelistAndPriceFeed",
            WalletCall::RemoveTokenFromWhitelist { .. } => "removeTokenFromWhitelist",
            WalletCall::UpdateFee { .. } => "updateFee",
            WalletCall::UpdateFeeAdmin { .. } => "updateFeeAdmin",
            WalletCall::TransferOwnership { .. } => "transferOwnership",
        }
    }

    /// Whether the operation changes wallet configuration rather than moving funds
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            WalletCall::SetTokenWhitelistAndPriceFeed { .. }
                | WalletCall::RemoveTokenFromWhitelist { .. }
                | WalletCall::UpdateFee { .. }
                | WalletCall::UpdateFeeAdmin { .. }
                | WalletCall::TransferOwnership { .. }
        )
    }
}
