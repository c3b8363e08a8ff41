//! Synthetic transfer generator.
//!
//! Periodically sends a small random token transfer from the owner wallet
//! to one of a fixed pool of random recipient addresses and appends the
//! resulting transaction hash to the shared hash-log file, feeding the
//! tracker's pull-mode ingestion.

use alloy::primitives::{Address, U256};
use ethflow::{
    chain::EthChainClient,
    config::{read_address_file, Config},
    hashlog::HashLog,
};
use rand::Rng;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

const RECIPIENT_POOL_SIZE: usize = 10;
const MAX_TRANSFER_AMOUNT: u64 = 100;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(e) = run().await {
        log::error!("❌ Fatal: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let key = config.require_deployer_key()?;
    let contract = read_address_file(&config.contract_address_file)?;

    let client = EthChainClient::connect_with_signer(&config.rpc_url, contract, key).await?;
    let hash_log = HashLog::new(&config.hash_log_path);

    let recipients = random_recipients(RECIPIENT_POOL_SIZE);
    log::info!("🚀 Starting txgen with {} recipients", recipients.len());
    log::info!(
        "   Writing hashes to {} every {}s",
        config.hash_log_path.display(),
        config.txgen_interval.as_secs()
    );

    let mut timer = tokio::time::interval(config.txgen_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sent = 0u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutdown signal received, {sent} transfers sent");
                break;
            }
            _ = timer.tick() => {
                let (recipient, amount) = {
                    let mut rng = rand::thread_rng();
                    (
                        recipients[rng.gen_range(0..recipients.len())],
                        U256::from(rng.gen_range(1..MAX_TRANSFER_AMOUNT)),
                    )
                };

                match send_one(&client, &hash_log, recipient, amount).await {
                    Ok(()) => sent += 1,
                    Err(e) => log::warn!("⚠️ transfer to {recipient} failed: {e}"),
                }
            }
        }
    }

    println!("Recipient pool:");
    for addr in &recipients {
        println!("  {addr}");
    }
    Ok(())
}

async fn send_one(
    client: &EthChainClient,
    hash_log: &HashLog,
    recipient: Address,
    amount: U256,
) -> Result<(), Box<dyn std::error::Error>> {
    let tx_hash = client.transfer(recipient, amount).await?;
    log::info!("Transfer of {amount} to {recipient} mined: {tx_hash}");

    // Retried once: the tracker may hold the lock while draining
    if let Err(first) = hash_log.append(tx_hash) {
        log::warn!("hash log append contended ({first}), retrying");
        tokio::time::sleep(Duration::from_millis(100)).await;
        hash_log.append(tx_hash)?;
    }
    Ok(())
}

fn random_recipients(n: usize) -> Vec<Address> {
    (0..n)
        .map(|_| Address::from(rand::random::<[u8; 20]>()))
        .collect()
}
