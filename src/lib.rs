//! Static routing agent: node-local reconciler for SDNInternalNodeRoutingTable
//!
//! This crate keeps the Linux routing tables of one Kubernetes node in sync
//! with the NodeRoutingTable objects bound to that node. Routes it installs
//! carry a fixed realm so that routes owned by other software are never
//! touched.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod telemetry;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
