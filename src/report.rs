//! Human-readable rendering of reconciliation snapshots.
//!
//! The sink is plain line-oriented text, one report per tick; there is no
//! machine-readable export.

use alloy::primitives::{Address, U256};
use std::collections::HashMap;
use std::fmt::Write;

use crate::reconcile::ReconciliationSnapshot;

/// Render one snapshot. All figures come from the snapshot itself so the
/// report is internally consistent even while the store keeps moving.
pub fn render_snapshot(snapshot: &ReconciliationSnapshot) -> String {
    let mut out = String::new();

    let when = chrono::DateTime::from_timestamp(snapshot.computed_at, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| snapshot.computed_at.to_string());

    writeln!(out, "\n=== Reconciliation Report ({when}) ===").ok();
    writeln!(out, "Owner:                 {}", snapshot.owner).ok();
    writeln!(out, "Owner Balance:         {}", snapshot.owner_balance).ok();
    writeln!(out, "Total Supply:          {}", snapshot.total_supply).ok();
    writeln!(out, "Total Transferred Out: {}", snapshot.total_transferred_out).ok();
    writeln!(out, "Local Aggregated Out:  {}", snapshot.local_outflow).ok();
    writeln!(out, "Decode Failures:       {}", snapshot.decode_failures).ok();

    writeln!(out, "\nInterval Totals (since last tick):").ok();
    render_totals(&mut out, &snapshot.interval_totals);

    writeln!(out, "\nCumulative Totals:").ok();
    render_totals(&mut out, &snapshot.cumulative_totals);

    writeln!(out, "\nRecent Transfers from Owner:").ok();
    if snapshot.recent_owner_transfers.is_empty() {
        writeln!(out, "  (no recent transfers from owner)").ok();
    } else {
        for event in &snapshot.recent_owner_transfers {
            writeln!(
                out,
                "  To: {}  Amount: {:>12}  TxHash: {}",
                event.to, event.amount, event.tx_hash
            )
            .ok();
        }
    }

    out
}

fn render_totals(out: &mut String, totals: &HashMap<Address, U256>) {
    if totals.is_empty() {
        writeln!(out, "  (empty)").ok();
        return;
    }

    // Largest recipients first; address as tiebreak for stable output
    let mut rows: Vec<(&Address, &U256)> = totals.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

    writeln!(out, "  {:<42}  {:>16}", "ADDRESS", "AMOUNT").ok();
    for (addr, amount) in rows {
        writeln!(out, "  {addr:<42}  {amount:>16}").ok();
    }
}
