//! Port to the kernel routing tables
//!
//! The reconciler only ever sees routes through [`RouteTable`]. Implementations
//! must scope every operation to the agent's realm tag so that routes owned by
//! other software stay invisible.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use ipnet::Ipv4Net;
use tracing::info;

use super::route_entry::{RouteEntry, RouteEntryMap};
use crate::crd::MAX_ROUTING_TABLE_ID;
use crate::error::{Error, Result};

#[async_trait]
pub trait RouteTable: Send + Sync {
    /// All IPv4 routes on the node that carry the agent's realm
    async fn list(&self) -> Result<RouteEntryMap>;

    /// Install `entry`; an already existing identical route counts as success
    async fn add(&self, entry: &RouteEntry) -> Result<()>;

    /// Remove the route matching realm, table, destination and gateway
    async fn delete(&self, entry: &RouteEntry) -> Result<()>;
}

/// A route entry validated for the kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedRoute {
    pub destination: Ipv4Net,
    pub gateway: Ipv4Addr,
    pub table: u32,
}

/// Validate the destination, gateway and table of an entry
///
/// The destination must be a network address: `10.0.0.1/24` is rejected and
/// the error suggests `10.0.0.0/24`.
pub fn parse_route(entry: &RouteEntry) -> Result<ParsedRoute> {
    let destination: Ipv4Net = entry.destination.parse().map_err(|e| {
        Error::ParseError(format!(
            "unable to parse destination in route {}: {}",
            entry, e
        ))
    })?;
    if destination.addr() != destination.network() {
        return Err(Error::ParseError(format!(
            "route {} is incorrect, destination is not a valid network address. perhaps {} was meant",
            entry,
            destination.trunc()
        )));
    }

    let gateway = match entry.gateway.parse::<IpAddr>() {
        Ok(IpAddr::V4(gw)) => gw,
        Ok(IpAddr::V6(_)) => {
            return Err(Error::ParseError(format!(
                "route {} has an IPv6 gateway, only IPv4 is supported",
                entry
            )))
        }
        Err(e) => {
            return Err(Error::ParseError(format!(
                "unable to parse gateway in route {}: {}",
                entry, e
            )))
        }
    };

    if entry.table < 1 || entry.table > MAX_ROUTING_TABLE_ID {
        return Err(Error::ParseError(format!(
            "route {} has table id out of range 1..={}",
            entry, MAX_ROUTING_TABLE_ID
        )));
    }

    Ok(ParsedRoute {
        destination,
        gateway,
        // Range checked above
        table: entry.table as u32,
    })
}

/// Route table that reads from `inner` but never mutates the kernel
///
/// Adds and deletes are validated and logged, then reported as successful.
pub struct DryRunRouteTable<T> {
    inner: T,
}

impl<T> DryRunRouteTable<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: RouteTable> RouteTable for DryRunRouteTable<T> {
    async fn list(&self) -> Result<RouteEntryMap> {
        self.inner.list().await
    }

    async fn add(&self, entry: &RouteEntry) -> Result<()> {
        parse_route(entry)?;
        info!("[dry-run] would add route {}", entry);
        Ok(())
    }

    async fn delete(&self, entry: &RouteEntry) -> Result<()> {
        parse_route(entry)?;
        info!("[dry-run] would delete route {}", entry);
        Ok(())
    }
}
