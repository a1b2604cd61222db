//! Unit tests for deterministic wallet deployment and implementation upgrades

use crate::common::*;
use alloy_primitives::{Address, B256, U256};
use smart_wallet_core::wallet::WalletInit;
use smart_wallet_core::{
    Error, Event, FactoryConfig, Result, StandardWallet, UserOperation, WalletCall,
    WalletContext, WalletLogic, WalletState,
};
use std::sync::Arc;

/// Same behavior as the standard wallet under a different version
#[derive(Debug)]
struct WalletV2;

impl WalletLogic for WalletV2 {
    fn version(&self) -> &'static str {
        "2.0.0"
    }

    fn initialize(&self, init: WalletInit) -> Result<WalletState> {
        StandardWallet.initialize(init)
    }

    fn validate_user_op(
        &self,
        ctx: &mut WalletContext<'_>,
        op: &UserOperation,
        user_op_hash: B256,
        missing_account_funds: U256,
    ) -> Result<()> {
        StandardWallet.validate_user_op(ctx, op, user_op_hash, missing_account_funds)
    }

    fn dispatch(&self, ctx: &mut WalletContext<'_>, call: WalletCall) -> Result<Vec<u8>> {
        StandardWallet.dispatch(ctx, call)
    }
}

#[test]
fn test_create_proxy_lands_on_computed_address() {
    let mut env = Env::new();
    let owner = owner_key(1);

    let predicted = env.address_of(&owner);
    assert!(!env.ledger.factory(env.factory).unwrap().deployment(owner.address()).deployed);

    let wallet = env
        .ledger
        .create_proxy(env.factory, owner.address())
        .unwrap();
    assert_eq!(wallet, predicted);
    assert!(env.ledger.is_wallet(&wallet));

    let factory = env.ledger.factory(env.factory).unwrap();
    assert!(factory.deployment(owner.address()).deployed);
    assert!(factory.is_wallet(&wallet));
    assert_eq!(
        env.ledger.logs().last().unwrap().event,
        Event::WalletCreated {
            owner: owner.address(),
            wallet,
        }
    );
}

#[test]
fn test_create_proxy_is_idempotent() {
    let mut env = Env::new();
    let owner = owner_key(1);

    let first = env
        .ledger
        .create_proxy(env.factory, owner.address())
        .unwrap();
    env.ledger
        .call_wallet(
            FEE_ADMIN,
            first,
            WalletCall::UpdateFee {
                new_fee_in_cents: 75,
            },
        )
        .unwrap();
    let logs = env.ledger.logs().len();

    let second = env
        .ledger
        .create_proxy(env.factory, owner.address())
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(env.ledger.logs().len(), logs);
    // State is untouched by the repeat call
    assert_eq!(env.ledger.wallet(first).unwrap().fee_in_cents(), 75);
    assert_eq!(env.ledger.factory(env.factory).unwrap().wallets().len(), 1);
}

#[test]
fn test_distinct_owners_and_factories_get_distinct_addresses() {
    let mut env = Env::new();
    let a = owner_key(1);
    let b = owner_key(2);
    assert_ne!(env.address_of(&a), env.address_of(&b));

    let other = env
        .ledger
        .deploy_factory(
            ADMIN,
            env.implementation,
            FactoryConfig::new(FEE_ADMIN, env.router),
        )
        .unwrap();
    assert_ne!(
        env.ledger.compute_proxy_address(other, a.address()).unwrap(),
        env.address_of(&a)
    );
}

#[test]
fn test_zero_owner_rejected() {
    let mut env = Env::new();
    let err = env
        .ledger
        .create_proxy(env.factory, Address::ZERO)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAddress(_)));
}

#[test]
fn test_unknown_factory() {
    let mut env = Env::new();
    let missing = Address::repeat_byte(0x7a);
    let err = env
        .ledger
        .create_proxy(missing, owner_key(1).address())
        .unwrap_err();
    assert_eq!(err, Error::FactoryNotFound(missing));
}

#[test]
fn test_upgrade_switches_every_wallet() {
    let mut env = Env::new();
    let a = env.wallet(&owner_key(1));
    let b = env.wallet(&owner_key(2));
    assert_eq!(env.ledger.wallet_version(a).unwrap(), "1.0.0");

    let v2 = env.ledger.register_implementation(ADMIN, Arc::new(WalletV2));
    env.ledger
        .set_implementation_address(ADMIN, env.factory, v2)
        .unwrap();

    assert_eq!(env.ledger.wallet_version(a).unwrap(), "2.0.0");
    assert_eq!(env.ledger.wallet_version(b).unwrap(), "2.0.0");
    assert_eq!(env.ledger.factory(env.factory).unwrap().implementation(), v2);

    // Addresses do not move, and new wallets run the new logic
    let owner = owner_key(3);
    let predicted = env.address_of(&owner);
    let c = env.wallet(&owner);
    assert_eq!(c, predicted);
    assert_eq!(env.ledger.wallet_version(c).unwrap(), "2.0.0");

    // State survives the upgrade
    assert_eq!(env.ledger.wallet(a).unwrap().owner(), owner_key(1).address());
}

#[test]
fn test_upgrade_requires_admin_and_registered_logic() {
    let mut env = Env::new();

    let err = env
        .ledger
        .set_implementation_address(STRANGER, env.factory, env.implementation)
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));

    let unknown = Address::repeat_byte(0x31);
    let err = env
        .ledger
        .set_implementation_address(ADMIN, env.factory, unknown)
        .unwrap_err();
    assert_eq!(err, Error::InvalidImplementation(unknown));
    assert_eq!(
        env.ledger.factory(env.factory).unwrap().implementation(),
        env.implementation
    );
}
