//! Grant the Ezpay contract an ERC-20 allowance from the payer's wallet, the
//! one-time step a gasless token payment needs.

use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use ezpay::erc20;
use ezpay::relay::parse_private_key;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let payer_key = std::env::var("PAYER_PRIVATE_KEY")
        .map_err(|_| "PAYER_PRIVATE_KEY environment variable is required")?;

    let contract: Address = match std::env::var("EZPAY_CONTRACT") {
        Ok(s) => s.parse()?,
        Err(_) => ezpay::EZPAY_SEPOLIA_CONTRACT,
    };

    let token: Address = match std::env::var("TOKEN") {
        Ok(s) => s.parse()?,
        Err(_) => ezpay::SEPOLIA_USDC,
    };
    if token == ezpay::NATIVE_TOKEN {
        return Err("the native asset needs no approval; pay it directly".into());
    }

    let rpc_url =
        std::env::var("RPC_URL").unwrap_or_else(|_| ezpay::MANTLE_SEPOLIA_RPC_URL.to_string());

    let approve_amount = match std::env::var("APPROVE_AMOUNT").as_deref() {
        Ok("MAX") => {
            tracing::warn!(
                "APPROVE_AMOUNT=MAX: granting unlimited spend authority to the Ezpay contract"
            );
            U256::MAX
        }
        Ok(val) => val
            .parse::<U256>()
            .map_err(|_| "invalid APPROVE_AMOUNT, must be an integer in the token's smallest unit")?,
        Err(_) => {
            return Err("APPROVE_AMOUNT is required (e.g. 50000000 for 50 USDC at 6 decimals, \
                        or MAX for unlimited)"
                .into())
        }
    };

    let signer = parse_private_key(&payer_key)?;
    let payer = signer.address();

    println!("Approving Ezpay for ERC-20 spending...");
    println!("  Payer:    {payer}");
    println!("  Contract: {contract}");
    println!("  Token:    {token}");
    println!("  Amount:   {approve_amount}");

    let provider = ProviderBuilder::new()
        .wallet(alloy::network::EthereumWallet::from(signer))
        .connect_http(rpc_url.parse()?);

    let balance = erc20::balance_of(&provider, token, payer).await?;
    let current = erc20::allowance(&provider, token, payer, contract).await?;
    println!("\nBalance:           {balance}");
    println!("Current allowance: {current}");
    if approve_amount != U256::MAX && balance < approve_amount {
        tracing::warn!(
            balance = %balance,
            amount = %approve_amount,
            "approving more than the payer holds; payments above the balance will still fail"
        );
    }

    if current >= approve_amount {
        println!("Contract already has sufficient allowance -- nothing to do.");
        return Ok(());
    }

    println!("Sending approval transaction...");
    let timeout = Duration::from_secs(ezpay::DEFAULT_RECEIPT_TIMEOUT_SECS);
    let tx_hash = erc20::approve(&provider, token, contract, approve_amount, timeout).await?;

    println!("  tx: {tx_hash}");
    println!("Approval confirmed.");
    Ok(())
}
