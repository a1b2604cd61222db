//! # Paymaster
//!
//! Sponsors gas for operations that pass its policy, out of a native
//! deposit. Validation reserves the operation's maximum cost and hands the
//! entry point a [`SponsorshipContext`]; settlement redeems that context for
//! the actual cost and releases the reservation.
//!
//! Each sponsorship moves through
//! `Idle -> Validating -> Sponsoring -> Settling -> Idle`.

use crate::entry_point::UserOperation;
use crate::events::Event;
use crate::host::Host;
use crate::ledger::Ledger;
use crate::{Error, Result};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Phase of a sponsorship ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SponsorshipPhase {
    Idle,
    Validating,
    Sponsoring,
    Settling,
}

/// Outcome of the sponsored operation's execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostOpMode {
    OpSucceeded,
    OpReverted,
}

impl PostOpMode {
    pub fn from_success(success: bool) -> Self {
        if success {
            PostOpMode::OpSucceeded
        } else {
            PostOpMode::OpReverted
        }
    }
}

/// Ticket returned by validation and redeemed by settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorshipContext {
    ticket: u64,
    paymaster: Address,
    sender: Address,
    user_op_hash: B256,
    max_cost: U256,
}

impl SponsorshipContext {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn paymaster(&self) -> Address {
        self.paymaster
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn user_op_hash(&self) -> B256 {
        self.user_op_hash
    }

    pub fn max_cost(&self) -> U256 {
        self.max_cost
    }

    /// Opaque byte form, as passed through the entry point
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| Error::UnknownContext(format!("undecodable context: {}", e)))
    }
}

/// What a policy sees when deciding to sponsor
#[derive(Debug, Clone, Copy)]
pub struct SponsorshipRequest<'a> {
    pub op: &'a UserOperation,
    pub user_op_hash: B256,
    pub max_cost: U256,
    /// Factory that deployed `op.sender`, if it is a known wallet
    pub sender_factory: Option<Address>,
    /// Factory named by `op.init_code`, if any
    pub init_factory: Option<Address>,
}

/// Sponsorship decision
pub trait SponsorshipPolicy: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok` to sponsor. Must not have side effects.
    fn approve(&self, request: &SponsorshipRequest<'_>) -> Result<()>;
}

/// Sponsors every operation the deposit can cover
#[derive(Debug, Clone, Copy, Default)]
pub struct SponsorAll;

impl SponsorshipPolicy for SponsorAll {
    fn name(&self) -> &'static str {
        "sponsor-all"
    }

    fn approve(&self, _request: &SponsorshipRequest<'_>) -> Result<()> {
        Ok(())
    }
}

/// Sponsors only wallets of one factory, deployed or being deployed
#[derive(Debug, Clone, Copy)]
pub struct FactoryWalletsOnly {
    factory: Address,
}

impl FactoryWalletsOnly {
    pub fn new(factory: Address) -> Self {
        Self { factory }
    }
}

impl SponsorshipPolicy for FactoryWalletsOnly {
    fn name(&self) -> &'static str {
        "factory-wallets-only"
    }

    fn approve(&self, request: &SponsorshipRequest<'_>) -> Result<()> {
        let ours = request.sender_factory == Some(self.factory)
            || request.init_factory == Some(self.factory);
        if !ours {
            return Err(Error::Unauthorized(format!(
                "{} is not a wallet of factory {}",
                request.op.sender, self.factory
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Ticket {
    context: SponsorshipContext,
    phase: SponsorshipPhase,
}

/// Paymaster state
#[derive(Debug, Clone)]
pub struct Paymaster {
    address: Address,
    owner: Address,
    entry_point: Address,
    deposit: U256,
    /// Sum of `max_cost` over outstanding tickets
    exposure: U256,
    next_ticket: u64,
    tickets: BTreeMap<u64, Ticket>,
    policy: Arc<dyn SponsorshipPolicy>,
}

impl Paymaster {
    pub(crate) fn new(
        address: Address,
        owner: Address,
        entry_point: Address,
        policy: Arc<dyn SponsorshipPolicy>,
    ) -> Self {
        Self {
            address,
            owner,
            entry_point,
            deposit: U256::ZERO,
            exposure: U256::ZERO,
            next_ticket: 0,
            tickets: BTreeMap::new(),
            policy,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn deposit(&self) -> U256 {
        self.deposit
    }

    /// Deposit reserved by outstanding tickets
    pub fn exposure(&self) -> U256 {
        self.exposure
    }

    /// Deposit not yet reserved
    pub fn available(&self) -> U256 {
        self.deposit.saturating_sub(self.exposure)
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Phase of `ticket`; settled and unknown tickets are idle
    pub fn phase(&self, ticket: u64) -> SponsorshipPhase {
        self.tickets
            .get(&ticket)
            .map(|t| t.phase)
            .unwrap_or(SponsorshipPhase::Idle)
    }

    pub fn outstanding_tickets(&self) -> usize {
        self.tickets.len()
    }

    fn require_entry_point(&self, caller: Address) -> Result<()> {
        if caller != self.entry_point {
            return Err(Error::Unauthorized(format!(
                "{} is not the entry point",
                caller
            )));
        }
        Ok(())
    }

    /// Validation phase: decide, then reserve `max_cost`
    #[instrument(skip(self, request), fields(paymaster = %self.address, sender = %request.op.sender))]
    pub fn validate(
        &mut self,
        caller: Address,
        request: &SponsorshipRequest<'_>,
    ) -> Result<SponsorshipContext> {
        self.require_entry_point(caller)?;
        let exposure = self.check(request).inspect_err(|e| {
            warn!(error = %e, "Sponsorship refused");
        })?;

        let ticket = self.next_ticket;
        let context = SponsorshipContext {
            ticket,
            paymaster: self.address,
            sender: request.op.sender,
            user_op_hash: request.user_op_hash,
            max_cost: request.max_cost,
        };
        self.tickets.insert(
            ticket,
            Ticket {
                context,
                phase: SponsorshipPhase::Validating,
            },
        );

        self.exposure = exposure;
        self.next_ticket += 1;
        if let Some(t) = self.tickets.get_mut(&ticket) {
            t.phase = SponsorshipPhase::Sponsoring;
        }

        debug!(ticket, max_cost = %request.max_cost, exposure = %self.exposure, "Sponsorship reserved");
        Ok(context)
    }

    /// Read-only checks; returns the exposure after reserving
    fn check(&self, request: &SponsorshipRequest<'_>) -> Result<U256> {
        self.policy.approve(request)?;

        let available = self.available();
        if available < request.max_cost {
            return Err(Error::InsufficientDeposit {
                available,
                required: request.max_cost,
            });
        }

        self.exposure
            .checked_add(request.max_cost)
            .ok_or(Error::ArithmeticOverflow("paymaster exposure"))
    }

    /// Settlement phase: charge the actual cost and release the reservation
    #[instrument(skip(self, host, context), fields(paymaster = %self.address, ticket = context.ticket))]
    pub fn post_op(
        &mut self,
        host: &mut Host,
        caller: Address,
        context: &SponsorshipContext,
        actual_cost: U256,
        mode: PostOpMode,
    ) -> Result<()> {
        self.require_entry_point(caller)?;

        let ticket = self
            .tickets
            .get_mut(&context.ticket)
            .filter(|t| t.context == *context && t.phase == SponsorshipPhase::Sponsoring)
            .ok_or_else(|| {
                Error::UnknownContext(format!("no outstanding ticket {}", context.ticket))
            })?;

        if actual_cost > context.max_cost {
            return Err(Error::CostExceedsPrefund {
                actual: actual_cost,
                max: context.max_cost,
            });
        }
        ticket.phase = SponsorshipPhase::Settling;

        self.exposure = self.exposure.saturating_sub(context.max_cost);
        self.deposit = self
            .deposit
            .checked_sub(actual_cost)
            .ok_or(Error::InsufficientDeposit {
                available: self.deposit,
                required: actual_cost,
            })?;
        host.transfer_native(self.address, self.entry_point, actual_cost)?;
        self.tickets.remove(&context.ticket);

        info!(actual_cost = %actual_cost, ?mode, deposit = %self.deposit, "Sponsorship settled");
        Ok(())
    }

    /// Fund the deposit from `from`
    pub fn add_deposit(&mut self, host: &mut Host, from: Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }

        host.transfer_native(from, self.address, amount)?;
        self.deposit = self
            .deposit
            .checked_add(amount)
            .ok_or(Error::ArithmeticOverflow("paymaster deposit"))?;
        host.emit(
            self.address,
            Event::Deposited {
                account: self.address,
                amount,
                total: self.deposit,
            },
        );

        info!(paymaster = %self.address, from = %from, amount = %amount, "Deposit added");
        Ok(())
    }

    /// Withdraw unreserved deposit to `to`. Owner only.
    pub fn withdraw_to(
        &mut self,
        host: &mut Host,
        caller: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        if caller != self.owner {
            return Err(Error::Unauthorized(format!(
                "{} is not the paymaster owner",
                caller
            )));
        }
        if to.is_zero() {
            return Err(Error::InvalidAddress("withdrawal target is zero".into()));
        }

        let available = self.available();
        if amount > available {
            return Err(Error::InsufficientBalance {
                available,
                required: amount,
            });
        }

        self.deposit -= amount;
        host.transfer_native(self.address, to, amount)?;
        host.emit(
            self.address,
            Event::Withdrawn {
                account: self.address,
                to,
                amount,
            },
        );

        info!(paymaster = %self.address, to = %to, amount = %amount, "Deposit withdrawn");
        Ok(())
    }
}

impl Ledger {
    /// Deploy a paymaster owned by `owner`
    pub fn deploy_paymaster(
        &mut self,
        owner: Address,
        policy: Arc<dyn SponsorshipPolicy>,
    ) -> Address {
        let address = self.host.allocate_address(owner);
        let entry_point = self.entry_point.address();
        info!(paymaster = %address, owner = %owner, policy = policy.name(), "Paymaster deployed");
        self.paymasters
            .insert(address, Paymaster::new(address, owner, entry_point, policy));
        address
    }

    pub fn add_paymaster_deposit(
        &mut self,
        from: Address,
        paymaster: Address,
        amount: U256,
    ) -> Result<()> {
        self.transact(|ledger| {
            let Ledger {
                host, paymasters, ..
            } = ledger;
            paymasters
                .get_mut(&paymaster)
                .ok_or(Error::PaymasterNotFound(paymaster))?
                .add_deposit(host, from, amount)
        })
    }

    pub fn withdraw_paymaster_deposit(
        &mut self,
        caller: Address,
        paymaster: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        self.transact(|ledger| {
            let Ledger {
                host, paymasters, ..
            } = ledger;
            paymasters
                .get_mut(&paymaster)
                .ok_or(Error::PaymasterNotFound(paymaster))?
                .withdraw_to(host, caller, to, amount)
        })
    }

    /// `validatePaymasterUserOp` as called by `caller`
    pub fn validate_paymaster_user_op(
        &mut self,
        caller: Address,
        paymaster: Address,
        op: &UserOperation,
        user_op_hash: B256,
        max_cost: U256,
    ) -> Result<SponsorshipContext> {
        self.transact(|ledger| {
            ledger.sponsor(caller, paymaster, op, user_op_hash, max_cost)
        })
    }

    /// `postOp` as called by `caller`
    pub fn paymaster_post_op(
        &mut self,
        caller: Address,
        context: &SponsorshipContext,
        actual_cost: U256,
        mode: PostOpMode,
    ) -> Result<()> {
        self.transact(|ledger| {
            let Ledger {
                host, paymasters, ..
            } = ledger;
            paymasters
                .get_mut(&context.paymaster())
                .ok_or_else(|| {
                    Error::UnknownContext(format!("no paymaster at {}", context.paymaster()))
                })?
                .post_op(host, caller, context, actual_cost, mode)
        })
    }

    pub(crate) fn sponsor(
        &mut self,
        caller: Address,
        paymaster: Address,
        op: &UserOperation,
        user_op_hash: B256,
        max_cost: U256,
    ) -> Result<SponsorshipContext> {
        let request = SponsorshipRequest {
            op,
            user_op_hash,
            max_cost,
            sender_factory: self.wallets.get(&op.sender).map(|w| w.factory()),
            init_factory: op.init_factory(),
        };
        self.paymasters
            .get_mut(&paymaster)
            .ok_or(Error::PaymasterNotFound(paymaster))?
            .validate(caller, &request)
    }
}
