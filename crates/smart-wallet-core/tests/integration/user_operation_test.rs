//! Integration tests for the validate / execute / settle flow

use crate::common::*;
use alloy_primitives::{Address, U256};
use smart_wallet_core::entry_point::actual_gas_used;
use smart_wallet_core::{
    Call, Error, Event, SponsorAll, TokenCall, UserOperation, WalletCall,
};
use std::sync::Arc;

fn whitelist_usdc(env: &Env) -> WalletCall {
    WalletCall::SetTokenWhitelistAndPriceFeed {
        token: env.usdc,
        enabled: true,
        feed: env.usdc_feed,
    }
}

fn transfer_usdc(env: &Env, amount: U256) -> WalletCall {
    WalletCall::ExecuteTokenTransfer {
        token: env.usdc,
        fee_in_token_units: usdc(1),
        payload: Call::token(env.usdc, TokenCall::Transfer { to: RECIPIENT, amount }),
    }
}

/// First operation of a counterfactual wallet, deploying it via initCode
fn deploying_op(env: &Env, owner: &smart_wallet_core::OwnerKey, call: &WalletCall) -> UserOperation {
    let wallet = env.address_of(owner);
    UserOperation::for_call(wallet, U256::ZERO, call).unwrap()
        .with_gas_prices(2 * GWEI, GWEI)
        .with_init_code(env.factory, owner.address())
        .signed(
            owner,
            env.ledger.entry_point_address(),
            env.ledger.host().chain_id(),
        )
        .unwrap()
}

// ============================================================================
// Deployment and settlement
// ============================================================================

#[test]
fn test_first_operation_deploys_wallet() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.address_of(&owner);
    env.fund(wallet);

    let op = deploying_op(&env, &owner, &whitelist_usdc(&env));
    let max_cost = op.max_cost().unwrap();
    let receipt = env.ledger.handle_op(&op, BUNDLER).unwrap();

    assert!(receipt.success, "{:?}", receipt.revert_reason);
    assert_eq!(receipt.sender, wallet);
    assert_eq!(receipt.paymaster, None);
    assert_eq!(receipt.user_op_hash, env.ledger.user_op_hash(&op));

    let state = env.ledger.wallet(wallet).unwrap();
    assert_eq!(state.owner(), owner.address());
    assert_eq!(state.nonce(), U256::from(1));
    assert!(state.is_whitelisted(&env.usdc));

    // Gas: priced at min(maxFee, maxPriority), wallet prefunded the maximum
    let gas_used = actual_gas_used(&op, &env.ledger.config().gas);
    assert_eq!(receipt.actual_gas_used, gas_used);
    assert_eq!(receipt.actual_gas_cost, U256::from(gas_used) * U256::from(GWEI));
    assert_eq!(env.ledger.host().native_balance(&BUNDLER), receipt.actual_gas_cost);
    assert_eq!(env.ledger.host().native_balance(&wallet), ether(1) - max_cost);
    assert_eq!(
        env.ledger.entry_point().balance_of(&wallet),
        max_cost - receipt.actual_gas_cost
    );
    env.assert_deposits_backed();

    let names: Vec<_> = env.ledger.logs().iter().map(|l| l.event.name()).collect();
    assert!(names.contains(&"WalletCreated"));
    assert_eq!(names.last(), Some(&"UserOperationEvent"));
}

#[test]
fn test_follow_up_operation_uses_remaining_deposit() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.address_of(&owner);
    env.fund(wallet);

    let op = deploying_op(&env, &owner, &whitelist_usdc(&env));
    env.ledger.handle_op(&op, BUNDLER).unwrap();
    let deposit = env.ledger.entry_point().balance_of(&wallet);
    let native = env.ledger.host().native_balance(&wallet);

    let call = transfer_usdc(&env, usdc(5));
    let op = env.op(&owner, wallet, 1, &call);
    let max_cost = op.max_cost().unwrap();
    let receipt = env.ledger.handle_op(&op, BUNDLER).unwrap();
    assert!(receipt.success, "{:?}", receipt.revert_reason);

    // Only the shortfall was pulled from the wallet
    assert_eq!(
        env.ledger.host().native_balance(&wallet),
        native - (max_cost - deposit)
    );
    assert_eq!(env.balance(env.usdc, RECIPIENT), usdc(5));
    assert_eq!(env.balance(env.usdc, FEE_ADMIN), U256::from(500_000u64));
    env.assert_deposits_backed();
}

#[test]
fn test_zero_beneficiary_rejected() {
    let mut env = Env::new();
    let owner = owner_key(1);
    env.fund(env.address_of(&owner));
    let op = deploying_op(&env, &owner, &whitelist_usdc(&env));

    let err = env.ledger.handle_op(&op, Address::ZERO).unwrap_err();
    assert!(matches!(err, Error::InvalidAddress(_)));
}

// ============================================================================
// Validation failures
// ============================================================================

#[test]
fn test_nonce_replay_rejected() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.ready_wallet(&owner);

    let op = env.op(&owner, wallet, 0, &transfer_usdc(&env, usdc(1)));
    env.ledger.handle_op(&op, BUNDLER).unwrap();
    let logs = env.ledger.logs().len();
    let bundler = env.ledger.host().native_balance(&BUNDLER);

    let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();
    assert_eq!(
        err,
        Error::InvalidNonce {
            expected: U256::from(1),
            actual: U256::ZERO,
        }
    );
    assert_eq!(env.ledger.logs().len(), logs);
    assert_eq!(env.ledger.host().native_balance(&BUNDLER), bundler);
    assert_eq!(env.balance(env.usdc, RECIPIENT), usdc(1));
}

#[test]
fn test_future_nonce_rejected() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.ready_wallet(&owner);

    let op = env.op(&owner, wallet, 5, &transfer_usdc(&env, usdc(1)));
    let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();
    assert!(matches!(err, Error::InvalidNonce { .. }));
}

#[test]
fn test_wrong_signer_leaves_no_trace() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.address_of(&owner);
    env.fund(wallet);
    let logs = env.ledger.logs().len();

    // Signed by someone else, with initCode for the real owner
    let op = UserOperation::for_call(wallet, U256::ZERO, &whitelist_usdc(&env)).unwrap()
        .with_gas_prices(2 * GWEI, GWEI)
        .with_init_code(env.factory, owner.address())
        .signed(
            &owner_key(2),
            env.ledger.entry_point_address(),
            env.ledger.host().chain_id(),
        )
        .unwrap();

    let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();
    assert!(matches!(err, Error::InvalidSignature(_)));

    // Even the deployment rolled back
    assert!(!env.ledger.is_wallet(&wallet));
    assert_eq!(env.ledger.logs().len(), logs);
    assert_eq!(env.ledger.host().native_balance(&wallet), ether(1));
}

#[test]
fn test_malformed_signature_rejected() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.ready_wallet(&owner);

    let op = env
        .op(&owner, wallet, 0, &transfer_usdc(&env, usdc(1)))
        .with_signature(vec![0u8; 12]);
    let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();
    assert!(matches!(err, Error::InvalidSignature(_)));
}

#[test]
fn test_signature_bound_to_chain() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.ready_wallet(&owner);

    let op = UserOperation::for_call(wallet, U256::ZERO, &transfer_usdc(&env, usdc(1))).unwrap()
        .signed(&owner, env.ledger.entry_point_address(), 999)
        .unwrap();
    let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();
    assert!(matches!(err, Error::InvalidSignature(_)));
}

#[test]
fn test_init_code_for_other_owner() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let other = owner_key(2);
    let sender = env.address_of(&owner);
    env.fund(sender);

    let op = UserOperation::for_call(sender, U256::ZERO, &whitelist_usdc(&env)).unwrap()
        .with_init_code(env.factory, other.address())
        .signed(
            &owner,
            env.ledger.entry_point_address(),
            env.ledger.host().chain_id(),
        )
        .unwrap();

    let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();
    assert_eq!(
        err,
        Error::SenderAddressMismatch {
            sender,
            deployed: env.address_of(&other),
        }
    );
    assert!(!env.ledger.is_wallet(&env.address_of(&other)));
}

#[test]
fn test_init_code_for_deployed_wallet() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.wallet(&owner);

    let op = UserOperation::for_call(wallet, U256::ZERO, &whitelist_usdc(&env)).unwrap()
        .with_init_code(env.factory, owner.address())
        .signed(
            &owner,
            env.ledger.entry_point_address(),
            env.ledger.host().chain_id(),
        )
        .unwrap();
    let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();
    assert!(matches!(err, Error::InvalidCallData(_)));
}

#[test]
fn test_undeployed_sender_without_init_code() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.address_of(&owner);

    let op = env.op(&owner, wallet, 0, &whitelist_usdc(&env));
    let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();
    assert_eq!(err, Error::WalletNotFound(wallet));
}

#[test]
fn test_unfunded_wallet_cannot_prefund() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let op = deploying_op(&env, &owner, &whitelist_usdc(&env));

    let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();
    assert!(matches!(err, Error::InsufficientBalance { .. }));
    assert!(!env.ledger.is_wallet(&env.address_of(&owner)));
}

#[test]
fn test_validate_user_op_only_from_entry_point() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.wallet(&owner);
    let op = env.op(&owner, wallet, 0, &whitelist_usdc(&env));
    let hash = env.ledger.user_op_hash(&op);

    let err = env
        .ledger
        .validate_user_op(owner.address(), &op, hash, U256::ZERO)
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));

    let entry_point = env.ledger.entry_point_address();
    env.ledger
        .validate_user_op(entry_point, &op, hash, U256::ZERO)
        .unwrap();
    assert_eq!(env.ledger.wallet(wallet).unwrap().nonce(), U256::from(1));
}

// ============================================================================
// Execution failures
// ============================================================================

#[test]
fn test_execution_revert_still_consumes_nonce_and_pays_gas() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.wallet(&owner);

    // USDC is not whitelisted yet
    let op = env.op(&owner, wallet, 0, &transfer_usdc(&env, usdc(1)));
    let receipt = env.ledger.handle_op(&op, BUNDLER).unwrap();

    assert!(!receipt.success);
    let reason = receipt.revert_reason.unwrap();
    assert!(reason.contains("not whitelisted"), "{}", reason);
    assert_eq!(env.ledger.wallet(wallet).unwrap().nonce(), U256::from(1));
    assert_eq!(env.ledger.host().native_balance(&BUNDLER), receipt.actual_gas_cost);
    assert_eq!(env.balance(env.usdc, RECIPIENT), U256::ZERO);
    assert_eq!(env.balance(env.usdc, FEE_ADMIN), U256::ZERO);

    let last = env.ledger.logs().last().unwrap();
    assert!(matches!(
        last.event,
        Event::UserOperationEvent { success: false, .. }
    ));
    env.assert_deposits_backed();
}

#[test]
fn test_entry_point_cannot_update_fee_for_owner() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.wallet(&owner);

    let call = WalletCall::UpdateFee {
        new_fee_in_cents: 10,
    };
    let receipt = env.submit(&owner, wallet, &call).unwrap();
    assert!(!receipt.success);
    assert_eq!(env.ledger.wallet(wallet).unwrap().fee_in_cents(), 50);
}

#[test]
fn test_entry_point_updates_fee_when_owner_is_fee_admin() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.wallet(&owner);
    env.ledger
        .call_wallet(
            FEE_ADMIN,
            wallet,
            WalletCall::UpdateFeeAdmin {
                new_admin: owner.address(),
            },
        )
        .unwrap();

    let receipt = env
        .submit(
            &owner,
            wallet,
            &WalletCall::UpdateFee {
                new_fee_in_cents: 10,
            },
        )
        .unwrap();
    assert!(receipt.success, "{:?}", receipt.revert_reason);
    assert_eq!(env.ledger.wallet(wallet).unwrap().fee_in_cents(), 10);
}

#[test]
fn test_ownership_transfer_rotates_signer() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let next = owner_key(2);
    let wallet = env.ready_wallet(&owner);

    let receipt = env
        .submit(
            &owner,
            wallet,
            &WalletCall::TransferOwnership {
                new_owner: next.address(),
            },
        )
        .unwrap();
    assert!(receipt.success);

    let err = env
        .submit(&owner, wallet, &transfer_usdc(&env, usdc(1)))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSignature(_)));

    let receipt = env
        .submit(&next, wallet, &transfer_usdc(&env, usdc(1)))
        .unwrap();
    assert!(receipt.success);
}

#[test]
fn test_empty_call_data_is_a_no_op() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.wallet(&owner);

    let op = UserOperation::new(wallet, U256::ZERO, vec![])
        .with_gas_prices(GWEI, GWEI)
        .signed(
            &owner,
            env.ledger.entry_point_address(),
            env.ledger.host().chain_id(),
        )
        .unwrap();
    let receipt = env.ledger.handle_op(&op, BUNDLER).unwrap();
    assert!(receipt.success);
    assert!(receipt.output.is_empty());
    assert_eq!(env.ledger.wallet(wallet).unwrap().nonce(), U256::from(1));
}

#[test]
fn test_undecodable_call_data_reverts_execution() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.wallet(&owner);

    let op = UserOperation::new(wallet, U256::ZERO, vec![0xff; 3])
        .with_gas_prices(GWEI, GWEI)
        .signed(
            &owner,
            env.ledger.entry_point_address(),
            env.ledger.host().chain_id(),
        )
        .unwrap();
    let receipt = env.ledger.handle_op(&op, BUNDLER).unwrap();
    assert!(!receipt.success);
    assert_eq!(env.ledger.wallet(wallet).unwrap().nonce(), U256::from(1));
}

// ============================================================================
// Sponsorship
// ============================================================================

#[test]
fn test_sponsored_operation() {
    let mut env = Env::new();
    let sponsor = Address::repeat_byte(0x5b);
    let paymaster = env.ledger.deploy_paymaster(sponsor, Arc::new(SponsorAll));
    env.ledger.host_mut().fund_native(sponsor, ether(1)).unwrap();
    env.ledger
        .add_paymaster_deposit(sponsor, paymaster, ether(1))
        .unwrap();

    let owner = owner_key(1);
    let wallet = env.address_of(&owner);
    let op = UserOperation::for_call(wallet, U256::ZERO, &whitelist_usdc(&env)).unwrap()
        .with_gas_prices(2 * GWEI, GWEI)
        .with_init_code(env.factory, owner.address())
        .with_paymaster(paymaster, vec![])
        .signed(
            &owner,
            env.ledger.entry_point_address(),
            env.ledger.host().chain_id(),
        )
        .unwrap();

    // The wallet holds no native balance at all
    let receipt = env.ledger.handle_op(&op, BUNDLER).unwrap();
    assert!(receipt.success, "{:?}", receipt.revert_reason);
    assert_eq!(receipt.paymaster, Some(paymaster));

    let state = env.ledger.paymaster(paymaster).unwrap();
    assert_eq!(state.deposit(), ether(1) - receipt.actual_gas_cost);
    assert_eq!(state.exposure(), U256::ZERO);
    assert_eq!(state.outstanding_tickets(), 0);
    assert_eq!(env.ledger.host().native_balance(&wallet), U256::ZERO);
    assert_eq!(env.ledger.host().native_balance(&BUNDLER), receipt.actual_gas_cost);
    env.assert_deposits_backed();
}

#[test]
fn test_sponsorship_refused_when_deposit_too_small() {
    let mut env = Env::new();
    let sponsor = Address::repeat_byte(0x5b);
    let paymaster = env.ledger.deploy_paymaster(sponsor, Arc::new(SponsorAll));
    env.ledger.host_mut().fund_native(sponsor, U256::from(1)).unwrap();
    env.ledger
        .add_paymaster_deposit(sponsor, paymaster, U256::from(1))
        .unwrap();

    let owner = owner_key(1);
    let wallet = env.wallet(&owner);
    let op = UserOperation::for_call(wallet, U256::ZERO, &whitelist_usdc(&env)).unwrap()
        .with_gas_prices(GWEI, GWEI)
        .with_paymaster(paymaster, vec![])
        .signed(
            &owner,
            env.ledger.entry_point_address(),
            env.ledger.host().chain_id(),
        )
        .unwrap();

    let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();
    assert!(matches!(err, Error::InsufficientDeposit { .. }));
    assert_eq!(env.ledger.wallet(wallet).unwrap().nonce(), U256::ZERO);
}

#[test]
fn test_unknown_paymaster() {
    let mut env = Env::new();
    let owner = owner_key(1);
    let wallet = env.wallet(&owner);
    let missing = Address::repeat_byte(0x7e);

    let op = UserOperation::for_call(wallet, U256::ZERO, &whitelist_usdc(&env)).unwrap()
        .with_paymaster(missing, vec![])
        .signed(
            &owner,
            env.ledger.entry_point_address(),
            env.ledger.host().chain_id(),
        )
        .unwrap();
    let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();
    assert_eq!(err, Error::PaymasterNotFound(missing));
}
