//! Ezpay relay: an HTTP server that sponsors gas for bill payments.
//!
//! Payers and merchants sign EIP-712 authorizations off-chain; the relay
//! checks them against the ledger and submits the matching contract call from
//! its own identity. Validation and submission live in [`ezpay::relay`]; this
//! crate provides the HTTP surface, configuration and metrics.
//!
//! # Modules
//!
//! - [`routes`]: health, supported chains, the four `/api/gasless-*` endpoints, metrics
//! - [`config`]: [`RelayConfig`](config::RelayConfig) from environment variables
//! - [`state`]: shared [`AppState`](state::AppState)
//! - [`error`]: JSON error responses
//! - [`metrics`]: Prometheus counters and latency histograms

pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
