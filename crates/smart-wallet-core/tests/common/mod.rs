//! Shared test environment: two priced tokens, a router with reserves, a
//! registered implementation and a factory.

#![allow(dead_code)]

use alloy_primitives::{Address, U256};
use smart_wallet_core::{
    FactoryConfig, Ledger, OracleSwapRouter, OwnerKey, PlatformConfig, Result, StandardWallet,
    UserOperation, UserOperationReceipt, WalletCall,
};
use std::sync::Arc;

pub const GENESIS: u64 = 1_700_000_000;

pub const ADMIN: Address = Address::repeat_byte(0xad);
pub const FEE_ADMIN: Address = Address::repeat_byte(0xfe);
pub const BUNDLER: Address = Address::repeat_byte(0xb0);
pub const RECIPIENT: Address = Address::repeat_byte(0xcc);
pub const STRANGER: Address = Address::repeat_byte(0x99);

/// 1 USDC (6 decimals)
pub const USDC: u64 = 1_000_000;
pub const GWEI: u128 = 1_000_000_000;

pub fn ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(18))
}

pub fn usdc(amount: u64) -> U256 {
    U256::from(amount * USDC)
}

pub fn owner_key(seed: u8) -> OwnerKey {
    OwnerKey::from_slice(&[seed; 32]).unwrap()
}

pub struct Env {
    pub ledger: Ledger,
    pub implementation: Address,
    pub factory: Address,
    pub router: Address,
    pub usdc: Address,
    pub weth: Address,
    pub usdc_feed: Address,
    pub weth_feed: Address,
}

impl Env {
    pub fn new() -> Self {
        let config = PlatformConfig::new().with_genesis_timestamp(GENESIS);
        let window = config.wallet.staleness_window_secs;
        let mut ledger = Ledger::new(config).unwrap();

        let host = ledger.host_mut();
        let usdc_token = host.deploy_token(ADMIN, "USD Coin", "USDC", 6);
        let weth = host.deploy_token(ADMIN, "Wrapped Ether", "WETH", 18);
        let usdc_feed = host.deploy_feed(ADMIN, "USDC / USD", 8, 1_00000000);
        let weth_feed = host.deploy_feed(ADMIN, "ETH / USD", 8, 2_000_00000000);

        let router = OracleSwapRouter::new(window)
            .with_feed(usdc_token, usdc_feed)
            .with_feed(weth, weth_feed);
        let router = host.deploy_router(ADMIN, Arc::new(router));
        host.mint_token(usdc_token, router, usdc(1_000_000)).unwrap();
        host.mint_token(weth, router, ether(1_000)).unwrap();

        let implementation = ledger.register_implementation(ADMIN, Arc::new(StandardWallet));
        let factory = ledger
            .deploy_factory(ADMIN, implementation, FactoryConfig::new(FEE_ADMIN, router))
            .unwrap();

        Self {
            ledger,
            implementation,
            factory,
            router,
            usdc: usdc_token,
            weth,
            usdc_feed,
            weth_feed,
        }
    }

    /// Counterfactual wallet address of `owner`
    pub fn address_of(&self, owner: &OwnerKey) -> Address {
        self.ledger
            .compute_proxy_address(self.factory, owner.address())
            .unwrap()
    }

    /// Fund the counterfactual wallet with 1 ETH and 1000 USDC
    pub fn fund(&mut self, wallet: Address) {
        let usdc_token = self.usdc;
        let host = self.ledger.host_mut();
        host.fund_native(wallet, ether(1)).unwrap();
        host.mint_token(usdc_token, wallet, usdc(1_000)).unwrap();
    }

    /// Deploy and fund the wallet of `owner`
    pub fn wallet(&mut self, owner: &OwnerKey) -> Address {
        let wallet = self
            .ledger
            .create_proxy(self.factory, owner.address())
            .unwrap();
        self.fund(wallet);
        wallet
    }

    /// Deployed, funded wallet with both tokens whitelisted
    pub fn ready_wallet(&mut self, owner: &OwnerKey) -> Address {
        let wallet = self.wallet(owner);
        self.whitelist(wallet, self.usdc, self.usdc_feed);
        self.whitelist(wallet, self.weth, self.weth_feed);
        wallet
    }

    pub fn whitelist(&mut self, wallet: Address, token: Address, feed: Address) {
        self.ledger
            .call_wallet(
                FEE_ADMIN,
                wallet,
                WalletCall::SetTokenWhitelistAndPriceFeed {
                    token,
                    enabled: true,
                    feed,
                },
            )
            .unwrap();
    }

    /// Signed operation carrying `call` at `nonce`
    pub fn op(&self, owner: &OwnerKey, wallet: Address, nonce: u64, call: &WalletCall) -> UserOperation {
        UserOperation::for_call(wallet, U256::from(nonce), call).unwrap()
            .with_gas_prices(2 * GWEI, GWEI)
            .signed(
                owner,
                self.ledger.entry_point_address(),
                self.ledger.host().chain_id(),
            )
            .unwrap()
    }

    /// Submit `call` at the wallet's current nonce
    pub fn submit(
        &mut self,
        owner: &OwnerKey,
        wallet: Address,
        call: &WalletCall,
    ) -> Result<UserOperationReceipt> {
        let nonce: u64 = self.ledger.wallet(wallet)?.nonce().to();
        let op = self.op(owner, wallet, nonce, call);
        self.ledger.handle_op(&op, BUNDLER)
    }

    pub fn balance(&self, token: Address, account: Address) -> U256 {
        self.ledger.host().balance_of(&token, &account)
    }

    /// Entry point native balance equals the sum of its deposits
    pub fn assert_deposits_backed(&self) {
        let entry_point = self.ledger.entry_point();
        assert_eq!(
            self.ledger.host().native_balance(&entry_point.address()),
            entry_point.total_deposits()
        );
    }
}
