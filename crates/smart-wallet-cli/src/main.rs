//! Smart Wallet CLI
//!
//! Command-line driver for exercising the smart wallet core locally.

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use smart_wallet_core::{
    Call, FactoryConfig, Ledger, OracleSwapRouter, OwnerKey, PlatformConfig, SponsorAll,
    StandardWallet, TokenCall, UserOperation, UserOperationReceipt, WalletCall,
    config::{MAX_FEE_CENTS, STALENESS_WINDOW_SECS},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "smart-wallet")]
#[command(about = "Smart Wallet CLI", version)]
struct Cli {
    /// Platform configuration (JSON)
    #[arg(short, long, env = "SMART_WALLET_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version, constants and the active configuration
    Info,

    /// Compute the deterministic wallet address of an owner
    Address {
        /// Owner address
        #[arg(short, long, conflicts_with = "owner_key")]
        owner: Option<String>,

        /// Owner private key (hex); the address is derived from it
        #[arg(long)]
        owner_key: Option<String>,
    },

    /// Deploy a demo environment and run user operations through it
    Simulate {
        /// Owner private key (hex); random if omitted
        #[arg(long)]
        owner_key: Option<String>,

        /// USDC to transfer from the wallet, in whole tokens
        #[arg(short, long, default_value_t = 25)]
        amount: u64,

        /// USDC to swap into WETH, in whole tokens
        #[arg(long, default_value_t = 100)]
        swap: u64,

        /// Wallet fee in USD cents
        #[arg(long, default_value_t = 50)]
        fee_cents: u64,

        /// Sponsor gas with a paymaster
        #[arg(long)]
        sponsored: bool,

        /// Print receipts as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => PlatformConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PlatformConfig::new(),
    };

    match cli.command {
        Commands::Info => show_info(&config)?,
        Commands::Address { owner, owner_key } => {
            let owner = match (owner, owner_key) {
                (Some(owner), _) => owner.parse::<Address>().context("invalid owner address")?,
                (None, Some(key)) => OwnerKey::from_hex(&key)?.address(),
                (None, None) => bail!("pass --owner or --owner-key"),
            };
            show_address(config, owner)?;
        }
        Commands::Simulate {
            owner_key,
            amount,
            swap,
            fee_cents,
            sponsored,
            json,
        } => {
            let owner = match owner_key {
                Some(key) => OwnerKey::from_hex(&key)?,
                None => OwnerKey::random(),
            };
            let options = SimulateOptions {
                amount,
                swap,
                fee_cents,
                sponsored,
                json,
            };
            simulate(config, owner, options)?;
        }
    }

    Ok(())
}

fn show_info(config: &PlatformConfig) -> Result<()> {
    println!("Smart Wallet Core v{}", smart_wallet_core::VERSION);
    println!();
    println!("Defaults:");
    println!("  Max fee: {} cents", MAX_FEE_CENTS);
    println!("  Staleness window: {} s", STALENESS_WINDOW_SECS);
    println!();
    println!("Active configuration:");
    println!("{}", serde_json::to_string_pretty(config)?);
    println!();
    println!("Wallet operations:");
    println!("  - approveToken / executeSwap (oracle-checked slippage)");
    println!("  - executeTokenTransfer (USD fee in the transferred token)");
    println!("  - execute / executeBatch (generic forwarding)");
    println!("  - whitelist, fee, fee admin and ownership management");
    Ok(())
}

// ============ Demo environment ============

const ADMIN: Address = Address::repeat_byte(0xad);
const FEE_ADMIN: Address = Address::repeat_byte(0xfe);
const BUNDLER: Address = Address::repeat_byte(0xb0);
const RECIPIENT: Address = Address::repeat_byte(0xcc);

const USDC_UNIT: u64 = 1_000_000;
const GWEI: u128 = 1_000_000_000;

struct Demo {
    ledger: Ledger,
    factory: Address,
    usdc: Address,
    weth: Address,
    usdc_feed: Address,
    weth_feed: Address,
}

fn deploy_demo(config: PlatformConfig) -> Result<Demo> {
    let policy = config.wallet;
    let mut ledger = Ledger::new(config)?;

    let host = ledger.host_mut();
    let usdc = host.deploy_token(ADMIN, "USD Coin", "USDC", 6);
    let weth = host.deploy_token(ADMIN, "Wrapped Ether", "WETH", 18);
    let usdc_feed = host.deploy_feed(ADMIN, "USDC / USD", 8, 1_00000000);
    let weth_feed = host.deploy_feed(ADMIN, "ETH / USD", 8, 2_000_00000000);

    let router = OracleSwapRouter::new(policy.staleness_window_secs)
        .with_feed(usdc, usdc_feed)
        .with_feed(weth, weth_feed);
    let router = host.deploy_router(ADMIN, Arc::new(router));
    host.mint_token(weth, router, U256::from(1_000u64) * U256::from(10u64).pow(U256::from(18)))?;
    host.mint_token(usdc, router, U256::from(1_000_000 * USDC_UNIT))?;

    let implementation = ledger.register_implementation(ADMIN, Arc::new(StandardWallet));
    let factory = ledger.deploy_factory(
        ADMIN,
        implementation,
        FactoryConfig::new(FEE_ADMIN, router).with_policy(policy),
    )?;

    Ok(Demo {
        ledger,
        factory,
        usdc,
        weth,
        usdc_feed,
        weth_feed,
    })
}

fn show_address(config: PlatformConfig, owner: Address) -> Result<()> {
    let demo = deploy_demo(config)?;
    let factory = demo.ledger.factory(demo.factory)?;

    let output = serde_json::json!({
        "owner": owner.to_string(),
        "factory": factory.address().to_string(),
        "proxy_code_hash": factory.proxy_code_hash().to_string(),
        "wallet": factory.compute_proxy_address(owner).to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

struct SimulateOptions {
    amount: u64,
    swap: u64,
    fee_cents: u64,
    sponsored: bool,
    json: bool,
}

fn simulate(config: PlatformConfig, owner: OwnerKey, options: SimulateOptions) -> Result<()> {
    let Demo {
        mut ledger,
        factory,
        usdc,
        weth,
        usdc_feed,
        weth_feed,
    } = deploy_demo(config)?;

    let wallet = ledger.compute_proxy_address(factory, owner.address())?;
    info!(owner = %owner.address(), wallet = %wallet, "Simulating wallet");

    let host = ledger.host_mut();
    host.fund_native(wallet, U256::from(GWEI) * U256::from(GWEI))?;
    host.mint_token(usdc, wallet, U256::from(1_000 * USDC_UNIT))?;

    let paymaster = if options.sponsored {
        let paymaster = ledger.deploy_paymaster(ADMIN, Arc::new(SponsorAll));
        let deposit = U256::from(GWEI) * U256::from(GWEI);
        ledger.host_mut().fund_native(ADMIN, deposit)?;
        ledger.add_paymaster_deposit(ADMIN, paymaster, deposit)?;
        Some(paymaster)
    } else {
        None
    };

    let weth_unit = U256::from(10u64).pow(U256::from(18));
    let swap_in = U256::from(options.swap * USDC_UNIT);
    // $1 in, $2000 out, keep 1% headroom below the oracle rate
    let swap_min = swap_in * weth_unit * U256::from(99) / U256::from(2_000u64 * USDC_UNIT * 100);

    let calls = vec![
        WalletCall::SetTokenWhitelistAndPriceFeed {
            token: usdc,
            enabled: true,
            feed: usdc_feed,
        },
        WalletCall::SetTokenWhitelistAndPriceFeed {
            token: weth,
            enabled: true,
            feed: weth_feed,
        },
        WalletCall::ExecuteTokenTransfer {
            token: usdc,
            fee_in_token_units: U256::from(USDC_UNIT * 10),
            payload: Call::token(
                usdc,
                TokenCall::Transfer {
                    to: RECIPIENT,
                    amount: U256::from(options.amount * USDC_UNIT),
                },
            ),
        },
        WalletCall::ExecuteSwap {
            token_in: usdc,
            token_out: weth,
            amount_in: swap_in,
            amount_out_min: swap_min,
            recipient: wallet,
        },
    ];

    for (index, call) in calls.iter().enumerate() {
        let mut op = UserOperation::for_call(wallet, U256::from(index), call)?
            .with_gas_prices(2 * GWEI, GWEI);
        if index == 0 {
            op = op.with_init_code(factory, owner.address());
        }
        if let Some(paymaster) = paymaster {
            op = op.with_paymaster(paymaster, vec![]);
        }
        let op = op.signed(&owner, ledger.entry_point_address(), ledger.host().chain_id())?;

        let receipt = ledger.handle_op(&op, BUNDLER)?;
        print_receipt(call, &receipt, options.json)?;

        // The first operation deployed the wallet; the fee admin reprices it
        if index == 0 && options.fee_cents != ledger.wallet(wallet)?.fee_in_cents() {
            let update = WalletCall::UpdateFee {
                new_fee_in_cents: options.fee_cents,
            };
            ledger
                .call_wallet(FEE_ADMIN, wallet, update)
                .context("fee admin could not update the fee")?;
            info!(fee_cents = options.fee_cents, "Fee updated");
        }
    }

    let state = ledger.wallet(wallet)?;
    let host = ledger.host();
    println!();
    println!("Wallet {}", wallet);
    println!("  Nonce: {}", state.nonce());
    println!("  Fee: {} cents", state.fee_in_cents());
    println!("  USDC: {}", host.balance_of(&usdc, &wallet));
    println!("  WETH: {}", host.balance_of(&weth, &wallet));
    println!("  Native: {}", host.native_balance(&wallet));
    println!("  Entry point deposit: {}", ledger.entry_point().balance_of(&wallet));
    println!("Fee admin USDC: {}", host.balance_of(&usdc, &FEE_ADMIN));
    println!("Recipient USDC: {}", host.balance_of(&usdc, &RECIPIENT));
    println!("Bundler native: {}", host.native_balance(&BUNDLER));
    println!("Events: {}", ledger.logs().len());

    Ok(())
}

fn print_receipt(call: &WalletCall, receipt: &UserOperationReceipt, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(receipt)?);
        return Ok(());
    }

    let status = if receipt.success { "OK" } else { "REVERTED" };
    println!(
        "[{}] {} nonce={} gas={} cost={}",
        status,
        call.name(),
        receipt.nonce,
        receipt.actual_gas_used,
        receipt.actual_gas_cost
    );
    if let Some(reason) = &receipt.revert_reason {
        warn!(op = call.name(), reason = %reason, "Operation reverted");
        println!("   Reason: {}", reason);
    }
    Ok(())
}
