//! ethflow: an ERC20 transfer tracker for local development chains.
//!
//! The pipeline ingests Transfer events, either from a live log
//! subscription (push) or by polling a shared transaction-hash file (pull),
//! aggregates them into per-address interval and cumulative totals, and
//! periodically reconciles the locally observed owner outflow against
//! authoritative contract state (`totalSupply - balanceOf(owner)`).

pub mod chain;
pub mod config;
pub mod decoder;
pub mod error;
pub mod hashlog;
pub mod ingest;
pub mod persistence;
pub mod reconcile;
pub mod report;
pub mod store;
