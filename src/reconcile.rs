//! Periodic reconciliation against authoritative contract state.
//!
//! Each tick fetches `balanceOf(owner)` and `totalSupply()` and derives the
//! canonical owner outflow as `totalSupply - ownerBalance`. That figure is
//! ground truth; the locally aggregated cumulative sum should converge to it
//! in the absence of dropped events, and a mismatch is logged as drift.
//!
//! The loop is single-flight: the tick body runs inline in the ticker task
//! and a fetch that overruns the interval causes the next tick to be skipped
//! rather than overlapped. A transiently failing fetch abandons only that
//! tick; the previous snapshot stays visible, stale.

use alloy::primitives::{Address, U256};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::chain::ChainReader;
use crate::decoder::TransferEvent;
use crate::error::RpcError;
use crate::report;
use crate::store::AggregationStore;

/// How many recent owner transfers each report displays.
pub const RECENT_DISPLAY_LIMIT: usize = 5;

/// One fully computed reconciliation result.
#[derive(Debug, Clone)]
pub struct ReconciliationSnapshot {
    pub owner: Address,
    pub owner_balance: U256,
    pub total_supply: U256,
    /// `total_supply - owner_balance`, clamped at zero.
    pub total_transferred_out: U256,
    /// Owner outflow per recipient since the previous tick.
    pub interval_totals: HashMap<Address, U256>,
    /// Owner outflow per recipient since tracking began.
    pub cumulative_totals: HashMap<Address, U256>,
    /// Most-recent-first, at most [`RECENT_DISPLAY_LIMIT`] entries.
    pub recent_owner_transfers: Vec<TransferEvent>,
    /// Sum of the cumulative totals at the time this snapshot was taken.
    pub local_outflow: U256,
    pub decode_failures: u64,
    pub computed_at: i64,
}

pub struct ReconciliationEngine {
    chain: Arc<dyn ChainReader>,
    store: Arc<AggregationStore>,
    interval: Duration,
    last_snapshot: Option<ReconciliationSnapshot>,
}

impl ReconciliationEngine {
    pub fn new(chain: Arc<dyn ChainReader>, store: Arc<AggregationStore>, interval: Duration) -> Self {
        Self {
            chain,
            store,
            interval,
            last_snapshot: None,
        }
    }

    /// The last successfully computed snapshot, possibly stale.
    pub fn last_snapshot(&self) -> Option<&ReconciliationSnapshot> {
        self.last_snapshot.as_ref()
    }

    /// Run one reconciliation cycle: fetch, compute, snapshot-and-reset the
    /// interval totals. On a fetch failure the interval totals are left
    /// untouched so the amounts roll into the next successful tick.
    pub async fn tick(&mut self) -> Result<&ReconciliationSnapshot, RpcError> {
        let owner = self.store.owner();

        let owner_balance = self.chain.balance_of(owner).await?;
        let total_supply = self.chain.total_supply().await?;

        if owner_balance > total_supply {
            // Possible under mint/burn, which the invariant does not cover
            log::warn!(
                "owner balance {owner_balance} exceeds total supply {total_supply}; clamping outflow to zero"
            );
        }
        let total_transferred_out = total_supply.saturating_sub(owner_balance);

        let local_outflow = self.store.cumulative_outflow();
        let snapshot = ReconciliationSnapshot {
            owner,
            owner_balance,
            total_supply,
            total_transferred_out,
            interval_totals: self.store.snapshot_and_reset_interval(),
            cumulative_totals: self.store.cumulative_totals(),
            recent_owner_transfers: self.store.recent_transfers_from(owner, RECENT_DISPLAY_LIMIT),
            local_outflow,
            decode_failures: self.store.decode_failure_count(),
            computed_at: chrono::Utc::now().timestamp(),
        };

        if local_outflow != total_transferred_out {
            log::warn!(
                "⚠️ outflow drift: chain reports {total_transferred_out}, local aggregation has {local_outflow}"
            );
        } else {
            log::debug!("outflow consistent at {total_transferred_out}");
        }

        Ok(self.last_snapshot.insert(snapshot))
    }

    /// Ticker loop. Emits a rendered report on every successful tick and
    /// terminates within one tick of cancellation.
    pub async fn run(mut self, cancel: CancellationToken) {
        log::info!(
            "⏰ Starting reconciliation engine (interval: {}s)",
            self.interval.as_secs()
        );

        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("Reconciliation engine stopping");
                    break;
                }
                _ = timer.tick() => {
                    match self.tick().await {
                        Ok(snapshot) => {
                            println!("{}", report::render_snapshot(snapshot));
                        }
                        Err(e) => {
                            log::warn!("⚠️ reconciliation tick abandoned: {e}; last snapshot kept");
                        }
                    }
                }
            }
        }
    }
}
