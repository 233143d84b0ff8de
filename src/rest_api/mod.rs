//! HTTP surface of the agent
//!
//! Serves health probes, Prometheus metrics and a read-only view of the
//! realm routes currently installed on the node.

mod dto;
mod handlers;
mod server;

pub use server::{build_router, run_server};
