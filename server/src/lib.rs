//! Flowscope — protocol-neutral flow telemetry collector and analyzer.
//!
//! UDP collectors decode sFlow v5, NetFlow v5/v9, IPFIX, jFlow, and a
//! JSON test channel into normalized flow records; a bounded in-memory
//! store retains recent history; a latency monitor and a rolling-baseline
//! anomaly detector read that history through the HTTP orchestration API.

pub mod api;
pub mod baseline;
pub mod collector;
pub mod config;
pub mod decode;
pub mod dedupe;
pub mod flow;
pub mod monitor;
pub mod registry;
pub mod store;
