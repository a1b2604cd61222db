//! # Smart Wallet Core
//!
//! Authorization and execution core of an account-abstraction smart wallet
//! platform.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Smart wallet**: owner-signed operation validation with replay
//!   protection, token whitelist and price-feed gating, USD-denominated
//!   fees, oracle-checked swaps and generic call forwarding
//! - **Wallet factory**: deterministic (CREATE2-style) wallet addresses and
//!   idempotent deployment, with a fleet-wide implementation pointer
//! - **Paymaster**: gas sponsorship from a deposit, with a typed ticket
//!   between validation and settlement
//! - **Entry point**: reference dispatcher running validation, execution
//!   and settlement as separate transactions
//! - **Host**: in-memory chain environment (tokens, price feeds, exchange
//!   routers, contracts, clock, event log) with transactional rollback
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use smart_wallet_core::{FactoryConfig, Ledger, OwnerKey, PlatformConfig, StandardWallet};
//! use smart_wallet_core::{UserOperation, WalletCall};
//! use std::sync::Arc;
//!
//! let mut ledger = Ledger::new(PlatformConfig::new())?;
//! let implementation = ledger.register_implementation(admin, Arc::new(StandardWallet));
//! let factory = ledger.deploy_factory(admin, implementation, FactoryConfig::new(fee_admin, router))?;
//!
//! // Counterfactual address, deployed on the first operation
//! let owner = OwnerKey::random();
//! let wallet = ledger.compute_proxy_address(factory, owner.address())?;
//!
//! let op = UserOperation::for_call(wallet, U256::ZERO, &WalletCall::UpdateFee { new_fee_in_cents: 75 })?
//!     .with_init_code(factory, owner.address())
//!     .signed(&owner, ledger.entry_point_address(), ledger.host().chain_id())?;
//!
//! let receipt = ledger.handle_op(&op, bundler)?;
//! ```
//!
//! ## Failure Model
//!
//! Every operation fails closed: on any error the ledger is restored to its
//! state before the operation, events included.

pub mod config;
pub mod entry_point;
pub mod error;
pub mod events;
pub mod factory;
pub mod host;
pub mod ledger;
pub mod oracle;
pub mod paymaster;
pub mod swap;
pub mod types;
pub mod wallet;

pub use config::{GasPolicy, PlatformConfig, WalletPolicy};
pub use entry_point::{EntryPoint, UserOperation, UserOperationReceipt};
pub use error::{Error, Result};
pub use events::{Event, Log};
pub use factory::{DeploymentRecord, FactoryConfig, WalletFactory};
pub use host::{Call, Host, TokenCall};
pub use ledger::Ledger;
pub use oracle::{PriceOracleGateway, PriceQuote};
pub use paymaster::{
    FactoryWalletsOnly, Paymaster, PostOpMode, SponsorAll, SponsorshipContext, SponsorshipPhase,
    SponsorshipPolicy,
};
pub use swap::{OracleSwapRouter, SwapGateway, SwapRouter};
pub use types::{OwnerKey, Signature, keccak256_hash};
pub use wallet::{
    StandardWallet, TokenBinding, WalletCall, WalletContext, WalletInit, WalletLogic, WalletState,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
