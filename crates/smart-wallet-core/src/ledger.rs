//! # Ledger
//!
//! Single owner of all platform state: the host environment, registered
//! wallet logic, factories, wallets, paymasters and the entry point.
//!
//! Every public operation runs inside [`Ledger::transact`], which
//! checkpoints the whole ledger and restores it if the operation fails, so
//! an error leaves balances, allowances, nonces and the event log exactly
//! as they were.

use crate::config::PlatformConfig;
use crate::entry_point::{EntryPoint, UserOperation};
use crate::events::Log;
use crate::factory::{FactoryConfig, WalletFactory};
use crate::host::Host;
use crate::paymaster::Paymaster;
use crate::wallet::{WalletCall, WalletContext, WalletLogic, WalletState};
use crate::{Error, Result};
use alloy_primitives::{Address, B256, U256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Deployer of the entry point
const ENTRY_POINT_DEPLOYER: Address = Address::repeat_byte(0x43);

/// Platform state
#[derive(Debug, Clone)]
pub struct Ledger {
    pub(crate) config: PlatformConfig,
    pub(crate) host: Host,
    pub(crate) entry_point: EntryPoint,
    /// implementation address -> logic
    pub(crate) implementations: BTreeMap<Address, Arc<dyn WalletLogic>>,
    pub(crate) factories: BTreeMap<Address, WalletFactory>,
    pub(crate) wallets: BTreeMap<Address, WalletState>,
    pub(crate) paymasters: BTreeMap<Address, Paymaster>,
}

impl Ledger {
    /// Create an empty ledger
    ///
    /// A zero genesis timestamp starts the clock at the current wall time.
    pub fn new(config: PlatformConfig) -> Result<Self> {
        config.validate()?;

        let timestamp = match config.genesis_timestamp {
            0 => chrono::Utc::now().timestamp().max(0) as u64,
            t => t,
        };
        let mut host = Host::new(config.chain_id, timestamp);
        let entry_point = EntryPoint::new(host.allocate_address(ENTRY_POINT_DEPLOYER));

        info!(
            chain_id = config.chain_id,
            timestamp,
            entry_point = %entry_point.address(),
            "Ledger created"
        );

        Ok(Self {
            config,
            host,
            entry_point,
            implementations: BTreeMap::new(),
            factories: BTreeMap::new(),
            wallets: BTreeMap::new(),
            paymasters: BTreeMap::new(),
        })
    }

    /// Run `f` all-or-nothing
    pub fn transact<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let checkpoint = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                debug!(error = %e, "Rolling back");
                *self = checkpoint;
                Err(e)
            }
        }
    }

    // ============ Accessors ============

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Direct access to the environment (funding, price updates, time)
    pub fn host_mut(&mut self) -> &mut Host {
        &mut self.host
    }

    pub fn entry_point(&self) -> &EntryPoint {
        &self.entry_point
    }

    pub fn entry_point_address(&self) -> Address {
        self.entry_point.address()
    }

    pub fn logs(&self) -> &[Log] {
        self.host.logs()
    }

    pub fn factory(&self, factory: Address) -> Result<&WalletFactory> {
        self.factories.get(&factory).ok_or(Error::FactoryNotFound(factory))
    }

    pub fn wallet(&self, wallet: Address) -> Result<&WalletState> {
        self.wallets.get(&wallet).ok_or(Error::WalletNotFound(wallet))
    }

    pub fn is_wallet(&self, address: &Address) -> bool {
        self.wallets.contains_key(address)
    }

    pub fn paymaster(&self, paymaster: Address) -> Result<&Paymaster> {
        self.paymasters
            .get(&paymaster)
            .ok_or(Error::PaymasterNotFound(paymaster))
    }

    // ============ Wallet logic ============

    /// Register wallet logic under a fresh implementation address
    pub fn register_implementation(
        &mut self,
        deployer: Address,
        logic: Arc<dyn WalletLogic>,
    ) -> Address {
        let address = self.host.allocate_address(deployer);
        info!(implementation = %address, version = logic.version(), "Wallet logic registered");
        self.implementations.insert(address, logic);
        address
    }

    pub fn is_implementation(&self, address: &Address) -> bool {
        self.implementations.contains_key(address)
    }

    pub(crate) fn logic_at(&self, implementation: Address) -> Result<Arc<dyn WalletLogic>> {
        self.implementations
            .get(&implementation)
            .cloned()
            .ok_or(Error::InvalidImplementation(implementation))
    }

    /// Logic `wallet` runs right now, through its factory's pointer
    pub(crate) fn logic_for(&self, wallet: &Address) -> Result<Arc<dyn WalletLogic>> {
        let state = self.wallets.get(wallet).ok_or(Error::WalletNotFound(*wallet))?;
        let factory = self.factory(state.factory())?;
        self.logic_at(factory.implementation())
    }

    /// Version of the logic `wallet` currently runs
    pub fn wallet_version(&self, wallet: Address) -> Result<&'static str> {
        Ok(self.logic_for(&wallet)?.version())
    }

    // ============ Factories ============

    /// Deploy a factory administered by `admin`
    pub fn deploy_factory(
        &mut self,
        admin: Address,
        implementation: Address,
        config: FactoryConfig,
    ) -> Result<Address> {
        self.transact(|ledger| {
            ledger.logic_at(implementation)?;
            config.policy.validate()?;
            if config.fee_admin.is_zero() {
                return Err(Error::InvalidAddress("fee admin is zero".into()));
            }

            let address = ledger.host.allocate_address(admin);
            ledger.factories.insert(
                address,
                WalletFactory::new(address, admin, implementation, config),
            );

            info!(factory = %address, admin = %admin, implementation = %implementation, "Factory deployed");
            Ok(address)
        })
    }

    // ============ Wallet calls ============

    /// Run `f` against `wallet` with its current logic
    pub(crate) fn run_wallet<T>(
        &mut self,
        wallet: Address,
        caller: Address,
        f: impl FnOnce(&dyn WalletLogic, &mut WalletContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let logic = self.logic_for(&wallet)?;
        let state = self.wallets.get_mut(&wallet).ok_or(Error::WalletNotFound(wallet))?;
        let mut ctx = WalletContext {
            host: &mut self.host,
            state,
            address: wallet,
            caller,
        };
        f(logic.as_ref(), &mut ctx)
    }

    /// Call a wallet operation directly as `caller`
    #[instrument(skip(self, call), fields(op = call.name()))]
    pub fn call_wallet(
        &mut self,
        caller: Address,
        wallet: Address,
        call: WalletCall,
    ) -> Result<Vec<u8>> {
        self.transact(|ledger| {
            ledger.run_wallet(wallet, caller, |logic, ctx| logic.dispatch(ctx, call))
        })
    }

    /// `validateUserOp` as called by `caller`
    pub fn validate_user_op(
        &mut self,
        caller: Address,
        op: &UserOperation,
        user_op_hash: B256,
        missing_account_funds: U256,
    ) -> Result<()> {
        self.transact(|ledger| {
            ledger.run_wallet(op.sender, caller, |logic, ctx| {
                logic.validate_user_op(ctx, op, user_op_hash, missing_account_funds)
            })
        })
    }
}
