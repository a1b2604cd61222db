//! # Wallet factory
//!
//! Deterministic, idempotent wallet deployment.
//!
//! Wallet addresses follow CREATE2:
//! `keccak256(0xff || factory || keccak256(owner) || keccak256(proxyCode))[12:]`.
//! The proxy code embeds only the factory (the proxies read the factory's
//! implementation pointer like a beacon), so upgrading the implementation
//! never moves an address.

use crate::config::WalletPolicy;
use crate::events::Event;
use crate::ledger::Ledger;
use crate::types::{address_word, keccak256, keccak256_hash};
use crate::wallet::WalletInit;
use crate::{Error, Result};
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// EIP-1167 minimal proxy creation code, before the embedded address
const PROXY_CODE_PREFIX: [u8; 20] = [
    0x3d, 0x60, 0x2d, 0x80, 0x60, 0x0a, 0x3d, 0x39, 0x81, 0xf3, 0x36, 0x3d, 0x3d, 0x37, 0x3d, 0x3d,
    0x3d, 0x36, 0x3d, 0x73,
];

/// EIP-1167 minimal proxy creation code, after the embedded address
const PROXY_CODE_SUFFIX: [u8; 15] = [
    0x5a, 0xf4, 0x3d, 0x82, 0x80, 0x3e, 0x90, 0x3d, 0x91, 0x60, 0x2b, 0x57, 0xfd, 0x5b, 0xf3,
];

/// Deployment-time settings handed to every wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryConfig {
    /// Initial fee admin of deployed wallets
    pub fee_admin: Address,
    /// Exchange router wallets swap through
    pub swap_gateway: Address,
    pub policy: WalletPolicy,
}

impl FactoryConfig {
    pub fn new(fee_admin: Address, swap_gateway: Address) -> Self {
        Self {
            fee_admin,
            swap_gateway,
            policy: WalletPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: WalletPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Deployment status of one owner's wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub owner: Address,
    pub computed_address: Address,
    pub deployed: bool,
}

/// Factory state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletFactory {
    address: Address,
    admin: Address,
    implementation: Address,
    config: FactoryConfig,
    /// owner -> wallet
    deployments: BTreeMap<Address, Address>,
}

impl WalletFactory {
    pub(crate) fn new(
        address: Address,
        admin: Address,
        implementation: Address,
        config: FactoryConfig,
    ) -> Self {
        Self {
            address,
            admin,
            implementation,
            config,
            deployments: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    /// Current implementation pointer
    pub fn implementation(&self) -> Address {
        self.implementation
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Hash of the proxy creation code
    pub fn proxy_code_hash(&self) -> B256 {
        let mut code = Vec::with_capacity(55);
        code.extend_from_slice(&PROXY_CODE_PREFIX);
        code.extend_from_slice(self.address.as_slice());
        code.extend_from_slice(&PROXY_CODE_SUFFIX);
        keccak256(&code)
    }

    /// Address `create_proxy(owner)` deploys to. Pure.
    pub fn compute_proxy_address(&self, owner: Address) -> Address {
        let salt = keccak256_hash(&address_word(&owner));

        let mut preimage = Vec::with_capacity(85);
        preimage.push(0xff);
        preimage.extend_from_slice(self.address.as_slice());
        preimage.extend_from_slice(&salt);
        preimage.extend_from_slice(self.proxy_code_hash().as_slice());

        let hash = keccak256_hash(&preimage);
        Address::from_slice(&hash[12..])
    }

    pub fn deployment(&self, owner: Address) -> DeploymentRecord {
        DeploymentRecord {
            owner,
            computed_address: self.compute_proxy_address(owner),
            deployed: self.deployments.contains_key(&owner),
        }
    }

    /// Whether `wallet` was deployed by this factory
    pub fn is_wallet(&self, wallet: &Address) -> bool {
        self.deployments.values().any(|w| w == wallet)
    }

    /// Deployed wallets, ordered by owner
    pub fn wallets(&self) -> Vec<Address> {
        self.deployments.values().copied().collect()
    }

    pub(crate) fn wallet_init(&self, owner: Address, entry_point: Address) -> WalletInit {
        WalletInit {
            owner,
            entry_point,
            factory: self.address,
            fee_admin: self.config.fee_admin,
            swap_gateway: self.config.swap_gateway,
            policy: self.config.policy,
        }
    }

    pub(crate) fn record_deployment(&mut self, owner: Address, wallet: Address) {
        self.deployments.insert(owner, wallet);
    }

    pub(crate) fn require_admin(&self, caller: Address) -> Result<()> {
        if caller != self.admin {
            return Err(Error::Unauthorized(format!(
                "{} is not the factory admin",
                caller
            )));
        }
        Ok(())
    }

    pub(crate) fn point_to(&mut self, implementation: Address) -> Address {
        std::mem::replace(&mut self.implementation, implementation)
    }
}

impl Ledger {
    /// Predicted wallet address of `owner` under `factory`
    pub fn compute_proxy_address(&self, factory: Address, owner: Address) -> Result<Address> {
        Ok(self.factory(factory)?.compute_proxy_address(owner))
    }

    /// Deploy the wallet of `owner`, or return it if it already exists
    pub fn create_proxy(&mut self, factory: Address, owner: Address) -> Result<Address> {
        self.transact(|ledger| ledger.deploy_wallet(factory, owner))
    }

    #[instrument(skip(self))]
    pub(crate) fn deploy_wallet(&mut self, factory: Address, owner: Address) -> Result<Address> {
        if owner.is_zero() {
            return Err(Error::InvalidAddress("owner is zero".into()));
        }

        let entry_point = self.entry_point.address();
        let deployer = self
            .factories
            .get(&factory)
            .ok_or(Error::FactoryNotFound(factory))?;
        let wallet = deployer.compute_proxy_address(owner);

        if self.wallets.contains_key(&wallet) {
            debug!(wallet = %wallet, "Wallet already deployed");
            return Ok(wallet);
        }

        let logic = self.logic_at(deployer.implementation())?;
        let state = logic.initialize(deployer.wallet_init(owner, entry_point))?;
        self.wallets.insert(wallet, state);

        if let Some(deployer) = self.factories.get_mut(&factory) {
            deployer.record_deployment(owner, wallet);
        }
        self.host.emit(factory, Event::WalletCreated { owner, wallet });

        info!(wallet = %wallet, version = logic.version(), "Wallet created");
        Ok(wallet)
    }

    /// Repoint `factory` at another registered implementation
    ///
    /// Affects every wallet the factory ever deployed, starting with the
    /// next call.
    pub fn set_implementation_address(
        &mut self,
        caller: Address,
        factory: Address,
        new_implementation: Address,
    ) -> Result<()> {
        self.transact(|ledger| {
            ledger.factory(factory)?.require_admin(caller)?;
            if !ledger.implementations.contains_key(&new_implementation) {
                return Err(Error::InvalidImplementation(new_implementation));
            }

            let deployer = ledger
                .factories
                .get_mut(&factory)
                .ok_or(Error::FactoryNotFound(factory))?;
            let old_implementation = deployer.point_to(new_implementation);
            let fleet = deployer.wallets().len();

            ledger.host.emit(
                factory,
                Event::ImplementationUpgraded {
                    old_implementation,
                    new_implementation,
                },
            );

            warn!(
                factory = %factory,
                old = %old_implementation,
                new = %new_implementation,
                wallets = fleet,
                "Implementation upgraded for every deployed wallet"
            );
            Ok(())
        })
    }
}
