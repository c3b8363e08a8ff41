use ethflow::{
    chain::{ChainReader, EthChainClient},
    config::{read_address_file, Config, EventMode},
    hashlog::HashLog,
    ingest,
    persistence::{self, PersistenceConfig},
    reconcile::ReconciliationEngine,
    store::AggregationStore,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

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

    let contract = read_address_file(&config.contract_address_file)?;
    let owner = read_address_file(&config.owner_address_file)?;

    log::info!("🚀 Starting ethflow...");
    log::info!("📊 Configuration:");
    log::info!("   RPC_URL: {}", config.rpc_url);
    log::info!("   Contract: {contract}");
    log::info!("   Owner: {owner}");
    log::info!("   Event mode: {:?}", config.event_mode);
    log::info!("   Decode strategy: {:?}", config.decode_strategy);

    let store = Arc::new(AggregationStore::new(owner, config.max_log_len));

    // Resume from the persisted transfer log, if one exists. Replaying the
    // events rebuilds the cumulative totals without counting the history as
    // the first interval window's activity.
    match persistence::load_snapshot(&config.snapshot_path) {
        Ok(previous) => store.resume_from(previous),
        Err(e) => log::warn!("could not load transfer snapshot: {e}"),
    }

    let client = Arc::new(EthChainClient::connect(&config.rpc_url, contract).await?);
    let chain: Arc<dyn ChainReader> = client.clone();
    let decoder: Arc<dyn ethflow::decoder::TransferDecoder> =
        Arc::from(config.decode_strategy.decoder());

    let cancel = CancellationToken::new();
    let mut workers = Vec::new();

    // Reconciliation ticker
    let engine = ReconciliationEngine::new(chain.clone(), store.clone(), config.reconcile_interval);
    workers.push(tokio::spawn(engine.run(cancel.clone())));

    // Autosave task
    workers.push(tokio::spawn(persistence::persistence_task(
        store.clone(),
        PersistenceConfig {
            file_path: config.snapshot_path.clone(),
            autosave_interval: Duration::from_secs(60),
        },
        cancel.clone(),
    )));

    // Pull-mode ingestion
    if matches!(config.event_mode, EventMode::Pull | EventMode::Both) {
        workers.push(tokio::spawn(ingest::run_pull_ingestion(
            chain.clone(),
            HashLog::new(&config.hash_log_path),
            decoder.clone(),
            store.clone(),
            config.poll_interval,
            cancel.clone(),
        )));
    }

    // Push-mode ingestion. Subscription death is fatal: the whole process
    // shuts down cleanly and the operator restarts it.
    let mut push_handle = if matches!(config.event_mode, EventMode::Push | EventMode::Both) {
        Some(tokio::spawn(ingest::run_push_ingestion(
            client.clone(),
            decoder.clone(),
            store.clone(),
            cancel.clone(),
        )))
    } else {
        None
    };

    log::info!("✅ All workers started");

    let mut fatal: Option<Box<dyn std::error::Error>> = None;
    let mut push_done = false;
    match push_handle.as_mut() {
        Some(handle) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Shutdown signal received");
                }
                result = handle => {
                    push_done = true;
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            log::error!("❌ Push ingestion died: {e}");
                            fatal = Some(Box::new(e));
                        }
                        Err(e) => {
                            log::error!("❌ Push ingestion panicked: {e}");
                            fatal = Some(Box::new(e));
                        }
                    }
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            log::info!("Shutdown signal received");
        }
    }

    log::info!("Shutting down gracefully...");
    cancel.cancel();

    if let Some(handle) = push_handle {
        if !push_done {
            let _ = handle.await;
        }
    }
    for worker in workers {
        let _ = worker.await;
    }

    match fatal {
        Some(e) => Err(e),
        None => {
            log::info!("Shutdown complete");
            Ok(())
        }
    }
}
