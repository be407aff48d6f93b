//! Pay an `enterl2://pay` request against a running node
//!
//! Run with: cargo run --example send_payment -- "enterl2://pay?to=0x...&amount=1000"
//!
//! Reads endpoints from ENTERL2_* env vars (or .env) and the key from
//! ENTERL2_PRIVATE_KEY. Without a request argument it prints the network and
//! balance, then exits without sending anything.

use enterl2_sdk::config::env_vars;
use enterl2_sdk::{parse_payment_request, SdkConfig, SdkEvent, Session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("===========================================");
    println!("  Enter L2 - Send Payment");
    println!("===========================================\n");

    let config = SdkConfig::from_env()?;
    println!("Network: {} (chain ID: {})", config.network, config.chain_id);
    println!("L2 RPC:  {}\n", config.l2_rpc_url);

    let private_key = std::env::var(env_vars::PRIVATE_KEY)
        .map_err(|_| format!("{} not set", env_vars::PRIVATE_KEY))?;
    let session = Session::connect_with_private_key(config, &private_key).await?;
    println!("Connected as {:?}", session.address());
    let network = session.network_info().await?;
    println!("Head block: {}", network.block_number);
    println!("Gas price:  {} wei", network.gas_price);
    println!("Balance:    {} wei\n", session.get_balance(None).await?);

    let Some(url) = std::env::args().nth(1) else {
        println!("No payment request given, nothing to send.");
        return Ok(());
    };

    let request = parse_payment_request(&url)?;
    println!("Payment Request:");
    println!("  To:     {}", request.to);
    println!("  Amount: {}", request.amount);
    if let Some(token) = &request.token_address {
        println!("  Token:  {}", token);
    }
    if let Some(description) = &request.description {
        println!("  Memo:   {}", description);
    }

    let intent = request.to_intent(format!("{:?}", session.address()));
    let fee = session.payments().estimate_fees(&intent).await?;
    println!("\nFee: {} (paid by {:?})", fee.total_fee, fee.fee_payer);

    let mut events = session.subscribe();
    let record = session.payments().send_payment(&intent).await?;
    println!("\nTransaction {:?} is {}", record.hash, record.status);

    if let Some(SdkEvent::PaymentSent { record }) = events.try_recv() {
        println!("paymentSent event: block {:?}", record.block_number);
    }

    session.disconnect();
    Ok(())
}
