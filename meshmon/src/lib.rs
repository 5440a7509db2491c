//! meshmon: reconstructs point-in-time views of an ad-hoc network from
//! asynchronous, out-of-order node reports.
//!
//! The core is [`store::MultiSourceStore`] (bounded per-source history with
//! point and range lookups) and [`graph::GraphSynthesizer`] (node/edge view
//! model). The remaining modules are the I/O adapters around them.

pub mod buffer;
pub mod config;
pub mod error;
pub mod graph;
pub mod receiver;
pub mod report;
pub mod sample;
pub mod state;
pub mod store;
pub mod sync;
pub mod ws;
