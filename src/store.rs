//! In-memory aggregation store for observed transfers.
//!
//! One mutex covers the ordered event log and both totals maps, so an
//! interval snapshot is always consistent with some serialization of the
//! concurrent `record_transfer` calls: a given transfer lands either in the
//! returned snapshot or in the next window, never both, never neither.
//!
//! The store never talks to the network. Owner-outbound transfers are the
//! only ones that mutate the totals maps; everything else is just appended
//! to the log.

use alloy::primitives::{Address, U256};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use crate::decoder::TransferEvent;

/// Default retention cap for the event log. Oldest events are evicted past
/// this point; cumulative totals are unaffected by eviction.
pub const DEFAULT_MAX_LOG_LEN: usize = 10_000;

struct StoreInner {
    /// Observed transfers in arrival order. `seq` of the newest entry is
    /// `next_seq - 1`.
    log: VecDeque<TransferEvent>,
    /// Amounts received from the owner since the last interval snapshot.
    interval: HashMap<Address, U256>,
    /// Amounts received from the owner since tracking began.
    cumulative: HashMap<Address, U256>,
    next_seq: u64,
}

/// Concurrent-safe transfer log plus per-address running totals.
pub struct AggregationStore {
    inner: Mutex<StoreInner>,
    owner: Address,
    max_log_len: usize,
    recorded: AtomicU64,
    decode_failures: AtomicU64,
}

impl AggregationStore {
    pub fn new(owner: Address, max_log_len: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                log: VecDeque::with_capacity(max_log_len.min(1024)),
                interval: HashMap::new(),
                cumulative: HashMap::new(),
                next_seq: 0,
            }),
            owner,
            max_log_len,
            recorded: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Append an event to the log and, when it leaves the owner address,
    /// credit the recipient's interval and cumulative totals.
    pub fn record_transfer(&self, mut event: TransferEvent) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");

        event.seq = inner.next_seq;
        inner.next_seq += 1;

        if event.from == self.owner {
            credit(&mut inner.interval, event.to, event.amount);
            credit(&mut inner.cumulative, event.to, event.amount);
        }

        inner.log.push_back(event);
        if inner.log.len() > self.max_log_len {
            inner.log.pop_front();
        }
        drop(inner);

        self.recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Replay persisted history into the store. Cumulative totals and the
    /// event log are rebuilt; the interval window stays empty, replayed
    /// history is not new activity.
    pub fn resume_from(&self, events: Vec<TransferEvent>) {
        let replayed = events.len();
        for event in events {
            self.record_transfer(event);
        }
        if replayed > 0 {
            self.snapshot_and_reset_interval();
            log::info!("Resumed {replayed} transfers from the persisted log");
        }
    }

    /// Return the current interval totals and reset them to empty, ready for
    /// the next measurement window.
    pub fn snapshot_and_reset_interval(&self) -> HashMap<Address, U256> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        std::mem::take(&mut inner.interval)
    }

    /// Most-recent-first transfers sent by `from`, capped at `limit`.
    pub fn recent_transfers_from(&self, from: Address, limit: usize) -> Vec<TransferEvent> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .log
            .iter()
            .rev()
            .filter(|e| e.from == from)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Clone of the cumulative totals map, for reporting.
    pub fn cumulative_totals(&self) -> HashMap<Address, U256> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.cumulative.clone()
    }

    /// Sum of all cumulative totals: the locally aggregated owner outflow.
    pub fn cumulative_outflow(&self) -> U256 {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .cumulative
            .values()
            .fold(U256::ZERO, |acc, v| acc.saturating_add(*v))
    }

    /// Full copy of the event log, oldest first. Used by the persistence
    /// snapshot task.
    pub fn log_snapshot(&self) -> Vec<TransferEvent> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.log.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn recorded_count(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    /// Shared decode-failure counter, incremented by every ingestion mode so
    /// the reconciliation report sees one figure.
    pub fn note_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failure_count(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }
}

/// Checked map increment. Amounts are unsigned in-domain so overflow cannot
/// happen with real token supplies; if it ever does, drop the increment
/// loudly instead of wrapping.
fn credit(map: &mut HashMap<Address, U256>, to: Address, amount: U256) {
    let slot = map.entry(to).or_insert(U256::ZERO);
    match slot.checked_add(amount) {
        Some(next) => *slot = next,
        None => log::error!("totals overflow for {to}, increment of {amount} dropped"),
    }
}
