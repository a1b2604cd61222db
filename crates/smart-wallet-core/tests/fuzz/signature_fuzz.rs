//! Fuzz tests for operation authentication

use crate::common::*;
use alloy_primitives::{Address, U256};
use smart_wallet_core::{Error, UserOperation, WalletCall};
use proptest::prelude::*;

// ============================================================================
// Strategies for generating test data
// ============================================================================

/// Seeds for keys other than the owner's (seed 1)
fn other_seed_strategy() -> impl Strategy<Value = u8> {
    2u8..=255
}

fn signature_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..100)
}

fn noop() -> WalletCall {
    WalletCall::UpdateFeeAdmin {
        new_admin: Address::repeat_byte(0xf1),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Only the owner's key validates
    #[test]
    fn foreign_key_never_validates(seed in other_seed_strategy()) {
        let mut env = Env::new();
        let owner = owner_key(1);
        let wallet = env.wallet(&owner);

        let op = env.op(&owner_key(seed), wallet, 0, &noop());
        let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();

        prop_assert!(matches!(err, Error::InvalidSignature(_)));
        prop_assert_eq!(env.ledger.wallet(wallet).unwrap().nonce(), U256::ZERO);
    }

    /// Arbitrary signature bytes are rejected without panicking
    #[test]
    fn garbage_signature_rejected(signature in signature_strategy()) {
        let mut env = Env::new();
        let owner = owner_key(1);
        let wallet = env.wallet(&owner);

        let op = env.op(&owner, wallet, 0, &noop()).with_signature(signature);
        let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();
        prop_assert!(matches!(err, Error::InvalidSignature(_)));
    }

    /// Any nonce other than the current one is rejected
    #[test]
    fn wrong_nonce_rejected(nonce in 1u64..u64::MAX) {
        let mut env = Env::new();
        let owner = owner_key(1);
        let wallet = env.wallet(&owner);

        let op = env.op(&owner, wallet, nonce, &noop());
        let err = env.ledger.handle_op(&op, BUNDLER).unwrap_err();
        prop_assert_eq!(
            err,
            Error::InvalidNonce { expected: U256::ZERO, actual: U256::from(nonce) }
        );
    }

    /// The operation hash commits to the nonce and the call data
    #[test]
    fn hash_binds_nonce_and_call_data(
        a in any::<u64>(),
        b in any::<u64>(),
        data in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        prop_assume!(a != b);
        let entry_point = Address::repeat_byte(0xe0);
        let sender = Address::repeat_byte(0x5e);

        let op_a = UserOperation::new(sender, U256::from(a), data.clone());
        let op_b = UserOperation::new(sender, U256::from(b), data.clone());
        prop_assert_ne!(op_a.hash(entry_point, 1), op_b.hash(entry_point, 1));

        let mut other = data;
        other.push(0);
        let op_c = UserOperation::new(sender, U256::from(a), other);
        prop_assert_ne!(op_a.hash(entry_point, 1), op_c.hash(entry_point, 1));
    }
}
