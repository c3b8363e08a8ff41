//! Event ingestion: push subscription and pull-based hash-file polling.
//!
//! Both modes feed the same [`AggregationStore`] and can run side by side.
//! Per-record decode failures are contained here (skipped, counted, logged);
//! transient RPC failures abandon only the affected hash, which is held in
//! an in-memory pending queue and retried on the next tick. Only
//! subscription death escapes the push loop, as
//! [`IngestError::SubscriptionTerminated`].
//!
//! Pull mode is at-least-once: the hash file is drained read-then-truncate
//! under an exclusive lock, and a crash in between replays the batch on the
//! next run. Replays are made idempotent by a bounded set of recently
//! processed hashes.

use alloy::{primitives::B256, rpc::types::Log};
use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::broadcast::error::RecvError, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::chain::{ChainReader, EthChainClient};
use crate::decoder::TransferDecoder;
use crate::error::{HashLogError, IngestError};
use crate::hashlog::HashLog;
use crate::store::AggregationStore;

/// Replay-dedupe capacity. Old entries are evicted FIFO; a hash replayed
/// after eviction is re-recorded, which the reconciliation drift check
/// surfaces.
pub const PROCESSED_SET_CAP: usize = 4096;

/// Bounded FIFO set of transaction hashes that pull mode has already
/// resolved. Makes read-then-truncate replays idempotent.
pub struct ProcessedSet {
    order: VecDeque<B256>,
    seen: HashSet<B256>,
    cap: usize,
}

impl ProcessedSet {
    pub fn new(cap: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(cap.min(1024)),
            seen: HashSet::with_capacity(cap.min(1024)),
            cap,
        }
    }

    /// Returns false if the hash was already present.
    pub fn insert(&mut self, hash: B256) -> bool {
        if !self.seen.insert(hash) {
            return false;
        }
        self.order.push_back(hash);
        if self.order.len() > self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }

    /// Forget a hash so a retry is not treated as a replay.
    pub fn remove(&mut self, hash: &B256) {
        if self.seen.remove(hash) {
            self.order.retain(|h| h != hash);
        }
    }

    pub fn contains(&self, hash: &B256) -> bool {
        self.seen.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Decode one raw log and record it, containing decode failures locally.
fn record_log(log: &Log, decoder: &dyn TransferDecoder, store: &AggregationStore) {
    match decoder.decode(log) {
        Ok(event) => {
            log::debug!(
                "Transfer: from={} to={} amount={} tx={}",
                event.from,
                event.to,
                event.amount,
                event.tx_hash
            );
            store.record_transfer(event);
        }
        Err(e) => {
            store.note_decode_failure();
            log::warn!(
                "skipping undecodable log (tx {:?}): {e}",
                log.transaction_hash
            );
        }
    }
}

/// Push-mode ingestion: drain a live Transfer-log subscription until it dies
/// or the token is cancelled. Subscription death is fatal for this loop; the
/// caller decides whether to restart the process.
pub async fn run_push_ingestion(
    client: Arc<EthChainClient>,
    decoder: Arc<dyn TransferDecoder>,
    store: Arc<AggregationStore>,
    cancel: CancellationToken,
) -> Result<(), IngestError> {
    let mut sub = client.subscribe_transfer_logs().await.map_err(IngestError::Rpc)?;
    log::info!(
        "📡 Push ingestion subscribed to Transfer logs at {}",
        client.contract_address()
    );

    let mut received = 0u64;
    let mut last_log_time = std::time::Instant::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("Push ingestion stopping ({} logs received)", received);
                return Ok(());
            }
            result = sub.recv() => {
                match result {
                    Ok(log) => {
                        record_log(&log, decoder.as_ref(), &store);
                        received += 1;
                        if last_log_time.elapsed().as_secs() >= 10 {
                            log::info!("📊 Push ingestion: {} logs so far", received);
                            last_log_time = std::time::Instant::now();
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        log::warn!("⚠️ subscription lagged, {missed} logs dropped by the client");
                    }
                    Err(RecvError::Closed) => {
                        return Err(IngestError::SubscriptionTerminated(
                            "log subscription closed by the chain client".to_string(),
                        ));
                    }
                }
            }
        }
    }
}

/// Pull-mode ingestion: on each tick, drain the shared hash file and resolve
/// every hash to its receipt logs. Runs until cancelled.
pub async fn run_pull_ingestion(
    chain: Arc<dyn ChainReader>,
    hash_log: HashLog,
    decoder: Arc<dyn TransferDecoder>,
    store: Arc<AggregationStore>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    log::info!(
        "⏰ Pull ingestion polling {} every {}s",
        hash_log.path().display(),
        poll_interval.as_secs()
    );

    let mut processed = ProcessedSet::new(PROCESSED_SET_CAP);
    let mut pending = VecDeque::new();
    let mut timer = tokio::time::interval(poll_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("Pull ingestion stopping");
                return;
            }
            _ = timer.tick() => {
                process_batch(chain.as_ref(), &hash_log, decoder.as_ref(), &store, &mut processed, &mut pending).await;
            }
        }
    }
}

/// One pull tick: drain, resolve, record. Hashes drained from the file but
/// not yet resolvable (no receipt, transient RPC failure) are parked in
/// `pending` and retried on every subsequent tick; they never go back
/// through the file, so a contended or failing append cannot lose them.
/// Lock contention on the drain forfeits only the fresh batch.
async fn process_batch(
    chain: &dyn ChainReader,
    hash_log: &HashLog,
    decoder: &dyn TransferDecoder,
    store: &AggregationStore,
    processed: &mut ProcessedSet,
    pending: &mut VecDeque<B256>,
) {
    let drained = match hash_log.drain() {
        Ok(hashes) => hashes,
        Err(HashLogError::Contention) => {
            log::warn!("hash log locked, deferring the fresh batch to the next tick");
            Vec::new()
        }
        Err(e) => {
            log::error!("failed to drain hash log: {e}");
            Vec::new()
        }
    };

    let hashes: Vec<B256> = pending.drain(..).chain(drained).collect();
    if hashes.is_empty() {
        return;
    }
    log::debug!("processing {} transaction hashes", hashes.len());

    for tx_hash in hashes {
        if !processed.insert(tx_hash) {
            log::debug!("replayed hash {tx_hash}, already processed");
            continue;
        }

        match chain.receipt_logs(tx_hash).await {
            Ok(Some(logs)) => {
                for log in &logs {
                    record_log(log, decoder, store);
                }
            }
            Ok(None) => {
                log::debug!("no receipt for {tx_hash} yet, retrying next tick");
                park(processed, pending, tx_hash);
            }
            Err(e) => {
                log::warn!("⚠️ receipt fetch for {tx_hash} failed: {e}; retrying next tick");
                park(processed, pending, tx_hash);
            }
        }
    }
}

/// Hold an unresolved hash for the next tick, forgetting it in the dedupe
/// set so the retry is not treated as a replay.
fn park(processed: &mut ProcessedSet, pending: &mut VecDeque<B256>, tx_hash: B256) {
    processed.remove(&tx_hash);
    pending.push_back(tx_hash);
}
