//! # ERC-4337 entry point
//!
//! Reference dispatcher sequencing the three phases of a user operation:
//!
//! 1. **Validation**: deploy through `initCode` if needed, reserve gas with
//!    the paymaster or collect the wallet's prefund, then let the wallet
//!    check signature and nonce
//! 2. **Execution**: decode `callData` and dispatch it to the wallet
//! 3. **Settlement**: meter the actual cost, settle with the paymaster or
//!    refund the unused prefund, pay the beneficiary
//!
//! Each phase is its own ledger transaction. A failed execution does not
//! undo validation, so the nonce stays consumed and gas is still charged.

use crate::config::GasPolicy;
use crate::events::Event;
use crate::ledger::Ledger;
use crate::paymaster::{PostOpMode, SponsorshipContext};
use crate::types::{OwnerKey, address_word, keccak256, keccak256_hash};
use crate::wallet::WalletCall;
use crate::{Error, Result};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tiny_keccak::{Hasher, Keccak};
use tracing::{debug, info, instrument, warn};

// ============================================================================
// UserOperation
// ============================================================================

/// ERC-4337 UserOperation (v0.6 layout)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// Wallet address
    pub sender: Address,
    /// Anti-replay nonce
    pub nonce: U256,
    /// `factory || owner` when the wallet is not deployed yet
    #[serde(with = "bytes_hex")]
    pub init_code: Vec<u8>,
    /// Encoded `WalletCall`
    #[serde(with = "bytes_hex")]
    pub call_data: Vec<u8>,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    /// `paymaster || data`, empty if self-paying
    #[serde(with = "bytes_hex")]
    pub paymaster_and_data: Vec<u8>,
    /// Owner signature over the `personal_sign` form of the hash
    #[serde(with = "bytes_hex")]
    pub signature: Vec<u8>,
}

mod bytes_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

impl UserOperation {
    /// Create a new UserOperation
    pub fn new(sender: Address, nonce: U256, call_data: Vec<u8>) -> Self {
        Self {
            sender,
            nonce,
            init_code: vec![],
            call_data,
            call_gas_limit: U256::from(100000),
            verification_gas_limit: U256::from(100000),
            pre_verification_gas: U256::from(21000),
            max_fee_per_gas: U256::ZERO,
            max_priority_fee_per_gas: U256::ZERO,
            paymaster_and_data: vec![],
            signature: vec![],
        }
    }

    /// Operation carrying one wallet call
    pub fn for_call(sender: Address, nonce: U256, call: &WalletCall) -> Result<Self> {
        Ok(Self::new(sender, nonce, call.encode()?))
    }

    /// Deploy `owner`'s wallet through `factory` before validation
    pub fn with_init_code(mut self, factory: Address, owner: Address) -> Self {
        let mut init_code = factory.to_vec();
        init_code.extend_from_slice(owner.as_slice());
        self.init_code = init_code;
        self
    }

    /// Set gas limits
    pub fn with_gas_limits(
        mut self,
        call_gas: u64,
        verification_gas: u64,
        pre_verification_gas: u64,
    ) -> Self {
        self.call_gas_limit = U256::from(call_gas);
        self.verification_gas_limit = U256::from(verification_gas);
        self.pre_verification_gas = U256::from(pre_verification_gas);
        self
    }

    /// Set gas prices
    pub fn with_gas_prices(mut self, max_fee: u128, max_priority_fee: u128) -> Self {
        self.max_fee_per_gas = U256::from(max_fee);
        self.max_priority_fee_per_gas = U256::from(max_priority_fee);
        self
    }

    /// Set paymaster
    pub fn with_paymaster(mut self, paymaster: Address, data: Vec<u8>) -> Self {
        let mut paymaster_and_data = paymaster.to_vec();
        paymaster_and_data.extend(data);
        self.paymaster_and_data = paymaster_and_data;
        self
    }

    /// Set signature
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = signature;
        self
    }

    /// Sign with the owner key for `entry_point` on `chain_id`
    pub fn signed(self, key: &OwnerKey, entry_point: Address, chain_id: u64) -> Result<Self> {
        let hash = self.hash(entry_point, chain_id);
        let signature = key.sign_message_hash(&hash)?;
        Ok(self.with_signature(signature.to_vec()))
    }

    /// Operation hash: `keccak256(keccak256(pack(op)) || entryPoint || chainId)`
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let inner_hash = keccak256_hash(&self.pack_for_hash());

        let mut hasher = Keccak::v256();
        hasher.update(&inner_hash);
        hasher.update(&address_word(&entry_point));

        let mut chain_id_bytes = [0u8; 32];
        chain_id_bytes[24..].copy_from_slice(&chain_id.to_be_bytes());
        hasher.update(&chain_id_bytes);

        let mut hash = [0u8; 32];
        hasher.finalize(&mut hash);
        B256::from(hash)
    }

    /// Pack everything but the signature, hashing the dynamic fields
    fn pack_for_hash(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity(32 * 10);

        packed.extend_from_slice(&address_word(&self.sender));
        packed.extend_from_slice(&self.nonce.to_be_bytes::<32>());
        packed.extend_from_slice(keccak256(&self.init_code).as_slice());
        packed.extend_from_slice(keccak256(&self.call_data).as_slice());
        packed.extend_from_slice(&self.call_gas_limit.to_be_bytes::<32>());
        packed.extend_from_slice(&self.verification_gas_limit.to_be_bytes::<32>());
        packed.extend_from_slice(&self.pre_verification_gas.to_be_bytes::<32>());
        packed.extend_from_slice(&self.max_fee_per_gas.to_be_bytes::<32>());
        packed.extend_from_slice(&self.max_priority_fee_per_gas.to_be_bytes::<32>());
        packed.extend_from_slice(keccak256(&self.paymaster_and_data).as_slice());

        packed
    }

    /// Paymaster named by `paymaster_and_data`
    pub fn paymaster(&self) -> Result<Option<Address>> {
        match self.paymaster_and_data.len() {
            0 => Ok(None),
            n if n < 20 => Err(Error::InvalidCallData(format!(
                "paymasterAndData too short: {} bytes",
                n
            ))),
            _ => Ok(Some(Address::from_slice(&self.paymaster_and_data[..20]))),
        }
    }

    /// `(factory, owner)` encoded in `init_code`
    pub fn init_target(&self) -> Result<Option<(Address, Address)>> {
        match self.init_code.len() {
            0 => Ok(None),
            40 => Ok(Some((
                Address::from_slice(&self.init_code[..20]),
                Address::from_slice(&self.init_code[20..]),
            ))),
            n => Err(Error::InvalidCallData(format!(
                "initCode must be factory || owner, got {} bytes",
                n
            ))),
        }
    }

    /// Factory named by `init_code`, if well formed
    pub fn init_factory(&self) -> Option<Address> {
        self.init_target().ok().flatten().map(|(factory, _)| factory)
    }

    /// Sum of the three gas limits
    pub fn max_gas(&self) -> Result<U256> {
        self.call_gas_limit
            .checked_add(self.verification_gas_limit)
            .and_then(|g| g.checked_add(self.pre_verification_gas))
            .ok_or(Error::ArithmeticOverflow("gas limits"))
    }

    /// Most the operation can cost: `max_gas * max_fee_per_gas`
    pub fn max_cost(&self) -> Result<U256> {
        self.max_gas()?
            .checked_mul(self.max_fee_per_gas)
            .ok_or(Error::ArithmeticOverflow("max cost"))
    }

    /// Effective gas price with a zero base fee
    pub fn gas_price(&self) -> U256 {
        self.max_fee_per_gas.min(self.max_priority_fee_per_gas)
    }

    /// Convert to JSON-RPC format
    pub fn to_rpc_format(&self) -> serde_json::Value {
        serde_json::json!({
            "sender": format!("{}", self.sender),
            "nonce": format!("0x{:x}", self.nonce),
            "initCode": format!("0x{}", hex::encode(&self.init_code)),
            "callData": format!("0x{}", hex::encode(&self.call_data)),
            "callGasLimit": format!("0x{:x}", self.call_gas_limit),
            "verificationGasLimit": format!("0x{:x}", self.verification_gas_limit),
            "preVerificationGas": format!("0x{:x}", self.pre_verification_gas),
            "maxFeePerGas": format!("0x{:x}", self.max_fee_per_gas),
            "maxPriorityFeePerGas": format!("0x{:x}", self.max_priority_fee_per_gas),
            "paymasterAndData": format!("0x{}", hex::encode(&self.paymaster_and_data)),
            "signature": format!("0x{}", hex::encode(&self.signature)),
        })
    }
}

/// Gas charged for `op` under `policy`; each phase is capped by its limit
pub fn actual_gas_used(op: &UserOperation, policy: &GasPolicy) -> u64 {
    let limit = |value: U256| u64::try_from(value).unwrap_or(u64::MAX);

    let validation = policy
        .validation_gas
        .min(limit(op.verification_gas_limit));
    let execution = policy
        .gas_per_call_data_byte
        .saturating_mul(op.call_data.len() as u64)
        .saturating_add(policy.execution_base_gas)
        .min(limit(op.call_gas_limit));

    limit(op.pre_verification_gas)
        .saturating_add(validation)
        .saturating_add(execution)
}

// ============================================================================
// Entry point state
// ============================================================================

/// Outcome of `handle_op`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOperationReceipt {
    pub user_op_hash: B256,
    pub sender: Address,
    pub nonce: U256,
    pub paymaster: Option<Address>,
    /// Whether execution succeeded
    pub success: bool,
    pub revert_reason: Option<String>,
    #[serde(with = "bytes_hex")]
    pub output: Vec<u8>,
    pub actual_gas_used: u64,
    pub actual_gas_cost: U256,
}

/// Entry point deposits, held as native balance at its address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    address: Address,
    deposits: BTreeMap<Address, U256>,
}

impl EntryPoint {
    pub(crate) fn new(address: Address) -> Self {
        Self {
            address,
            deposits: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Deposit of `account`
    pub fn balance_of(&self, account: &Address) -> U256 {
        self.deposits.get(account).copied().unwrap_or(U256::ZERO)
    }

    /// Sum of all deposits
    pub fn total_deposits(&self) -> U256 {
        self.deposits
            .values()
            .fold(U256::ZERO, |acc, v| acc.saturating_add(*v))
    }

    pub(crate) fn credit(&mut self, account: Address, amount: U256) -> Result<U256> {
        let total = self
            .balance_of(&account)
            .checked_add(amount)
            .ok_or(Error::ArithmeticOverflow("entry point deposit"))?;
        self.deposits.insert(account, total);
        Ok(total)
    }

    pub(crate) fn debit(&mut self, account: Address, amount: U256) -> Result<U256> {
        let available = self.balance_of(&account);
        let total = available
            .checked_sub(amount)
            .ok_or(Error::InsufficientDeposit {
                available,
                required: amount,
            })?;
        self.deposits.insert(account, total);
        Ok(total)
    }
}

impl Ledger {
    /// Fund `account`'s entry point deposit from `from`
    pub fn deposit_to(&mut self, from: Address, account: Address, amount: U256) -> Result<()> {
        self.transact(|ledger| {
            let entry_point = ledger.entry_point.address();
            ledger.host.transfer_native(from, entry_point, amount)?;
            let total = ledger.entry_point.credit(account, amount)?;
            ledger.host.emit(
                entry_point,
                Event::Deposited {
                    account,
                    amount,
                    total,
                },
            );
            debug!(account = %account, amount = %amount, total = %total, "Entry point deposit");
            Ok(())
        })
    }

    /// Withdraw from the caller's own deposit
    pub fn withdraw_deposit(&mut self, caller: Address, to: Address, amount: U256) -> Result<()> {
        self.transact(|ledger| {
            let entry_point = ledger.entry_point.address();
            ledger.entry_point.debit(caller, amount)?;
            ledger.host.transfer_native(entry_point, to, amount)?;
            ledger.host.emit(
                entry_point,
                Event::Withdrawn {
                    account: caller,
                    to,
                    amount,
                },
            );
            Ok(())
        })
    }

    /// Hash `op` is signed over on this ledger
    pub fn user_op_hash(&self, op: &UserOperation) -> B256 {
        op.hash(self.entry_point.address(), self.host.chain_id())
    }

    /// Run one user operation through all three phases
    ///
    /// Fails only when validation or settlement fails; an execution revert
    /// is reported in the receipt.
    #[instrument(skip(self, op), fields(sender = %op.sender, nonce = %op.nonce))]
    pub fn handle_op(
        &mut self,
        op: &UserOperation,
        beneficiary: Address,
    ) -> Result<UserOperationReceipt> {
        if beneficiary.is_zero() {
            return Err(Error::InvalidAddress("beneficiary is zero".into()));
        }

        let user_op_hash = self.user_op_hash(op);
        let max_cost = op.max_cost()?;
        let paymaster = op.paymaster()?;

        let sponsorship =
            self.transact(|ledger| ledger.validation_phase(op, user_op_hash, max_cost, paymaster))?;

        let (success, output, revert_reason) =
            match self.transact(|ledger| ledger.execution_phase(op)) {
                Ok(output) => (true, output, None),
                Err(e) => {
                    warn!(error = %e, "User operation execution reverted");
                    (false, vec![], Some(e.to_string()))
                }
            };

        let (actual_gas_used, actual_gas_cost) = self.transact(|ledger| {
            ledger.settlement_phase(op, user_op_hash, max_cost, sponsorship, success, beneficiary)
        })?;

        info!(
            hash = %user_op_hash,
            success,
            gas_used = actual_gas_used,
            cost = %actual_gas_cost,
            "User operation handled"
        );

        Ok(UserOperationReceipt {
            user_op_hash,
            sender: op.sender,
            nonce: op.nonce,
            paymaster,
            success,
            revert_reason,
            output,
            actual_gas_used,
            actual_gas_cost,
        })
    }

    fn validation_phase(
        &mut self,
        op: &UserOperation,
        user_op_hash: B256,
        max_cost: U256,
        paymaster: Option<Address>,
    ) -> Result<Option<SponsorshipContext>> {
        let entry_point = self.entry_point.address();
        self.ensure_sender(op)?;

        if let Some(paymaster) = paymaster {
            let context = self.sponsor(entry_point, paymaster, op, user_op_hash, max_cost)?;
            self.run_wallet(op.sender, entry_point, |logic, ctx| {
                logic.validate_user_op(ctx, op, user_op_hash, U256::ZERO)
            })?;
            return Ok(Some(context));
        }

        let deposit = self.entry_point.balance_of(&op.sender);
        let missing = max_cost.saturating_sub(deposit);
        let before = self.host.native_balance(&entry_point);

        self.run_wallet(op.sender, entry_point, |logic, ctx| {
            logic.validate_user_op(ctx, op, user_op_hash, missing)
        })?;

        let received = self.host.native_balance(&entry_point).saturating_sub(before);
        if received < missing {
            return Err(Error::InsufficientDeposit {
                available: deposit.saturating_add(received),
                required: max_cost,
            });
        }

        self.entry_point.credit(op.sender, received)?;
        self.entry_point.debit(op.sender, max_cost)?;
        debug!(prefund = %max_cost, paid = %received, "Prefund collected");
        Ok(None)
    }

    /// Deploy the sender through `init_code` if it has no code yet
    fn ensure_sender(&mut self, op: &UserOperation) -> Result<()> {
        let target = op.init_target()?;

        if self.wallets.contains_key(&op.sender) {
            if target.is_some() {
                return Err(Error::InvalidCallData(
                    "initCode supplied for a deployed wallet".into(),
                ));
            }
            return Ok(());
        }

        let (factory, owner) = target.ok_or(Error::WalletNotFound(op.sender))?;
        let deployed = self.deploy_wallet(factory, owner)?;
        if deployed != op.sender {
            return Err(Error::SenderAddressMismatch {
                sender: op.sender,
                deployed,
            });
        }
        Ok(())
    }

    fn execution_phase(&mut self, op: &UserOperation) -> Result<Vec<u8>> {
        if op.call_data.is_empty() {
            return Ok(vec![]);
        }

        let call = WalletCall::decode(&op.call_data)?;
        let entry_point = self.entry_point.address();
        self.run_wallet(op.sender, entry_point, |logic, ctx| logic.dispatch(ctx, call))
    }

    fn settlement_phase(
        &mut self,
        op: &UserOperation,
        user_op_hash: B256,
        max_cost: U256,
        sponsorship: Option<SponsorshipContext>,
        success: bool,
        beneficiary: Address,
    ) -> Result<(u64, U256)> {
        let entry_point = self.entry_point.address();
        let gas_used = actual_gas_used(op, &self.config.gas);
        let cost = U256::from(gas_used)
            .checked_mul(op.gas_price())
            .ok_or(Error::ArithmeticOverflow("gas cost"))?;

        let paymaster = match sponsorship {
            Some(context) => {
                let Ledger {
                    host, paymasters, ..
                } = &mut *self;
                paymasters
                    .get_mut(&context.paymaster())
                    .ok_or(Error::PaymasterNotFound(context.paymaster()))?
                    .post_op(
                        host,
                        entry_point,
                        &context,
                        cost,
                        PostOpMode::from_success(success),
                    )?;
                context.paymaster()
            }
            None => {
                let refund = max_cost
                    .checked_sub(cost)
                    .ok_or(Error::CostExceedsPrefund {
                        actual: cost,
                        max: max_cost,
                    })?;
                self.entry_point.credit(op.sender, refund)?;
                Address::ZERO
            }
        };

        self.host.transfer_native(entry_point, beneficiary, cost)?;
        self.host.emit(
            entry_point,
            Event::UserOperationEvent {
                user_op_hash,
                sender: op.sender,
                paymaster,
                nonce: op.nonce,
                success,
                actual_gas_cost: cost,
                actual_gas_used: gas_used,
            },
        );

        Ok((gas_used, cost))
    }
}
