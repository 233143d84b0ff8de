//! Netlink-backed [`RouteTable`] for Linux
//!
//! Talks NETLINK_ROUTE directly: an IPv4 RTM_GETROUTE dump filtered by realm
//! (RTA_FLOW), RTM_NEWROUTE with `CREATE | EXCL` and RTM_DELROUTE. Each call
//! opens a short-lived blocking socket on the blocking thread pool.

#[cfg(target_os = "linux")]
mod linux {
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use netlink_packet_core::{
        NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP,
        NLM_F_EXCL, NLM_F_REQUEST,
    };
    use netlink_packet_route::route::{
        RouteAddress, RouteAttribute, RouteMessage, RouteProtocol, RouteRealm, RouteScope,
        RouteType,
    };
    use netlink_packet_route::{AddressFamily, RouteNetlinkMessage};
    use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
    use tracing::{debug, instrument, trace};

    use crate::controller::route_entry::{RouteEntry, RouteEntryMap};
    use crate::controller::route_table::{parse_route, ParsedRoute, RouteTable};
    use crate::error::{Error, Result};

    /// Receive buffer for one recv() call
    const RECV_BUFFER_SIZE: usize = 64 * 1024;

    /// Header table value when the id only fits in RTA_TABLE
    const RT_TABLE_UNSPEC: u8 = 0;

    static SEQUENCE: AtomicU32 = AtomicU32::new(1);

    /// Kernel route table scoped to one realm
    #[derive(Clone, Debug)]
    pub struct NetlinkRouteTable {
        realm: u32,
    }

    impl NetlinkRouteTable {
        pub fn new(realm: u32) -> Result<Self> {
            // Fail fast when the process lacks a usable NETLINK_ROUTE socket
            open_socket()?;
            Ok(Self { realm })
        }
    }

    #[async_trait]
    impl RouteTable for NetlinkRouteTable {
        #[instrument(skip(self), fields(realm = self.realm))]
        async fn list(&self) -> Result<RouteEntryMap> {
            let realm = self.realm;
            tokio::task::spawn_blocking(move || dump_routes(realm))
                .await
                .map_err(|e| Error::IoError(format!("route dump task failed: {}", e)))?
        }

        #[instrument(skip(self), fields(route = %entry))]
        async fn add(&self, entry: &RouteEntry) -> Result<()> {
            let parsed = parse_route(entry)?;
            let realm = self.realm;
            let outcome = tokio::task::spawn_blocking(move || {
                let mut message = route_message(&parsed, realm);
                message.header.protocol = RouteProtocol::Boot;
                request_ack(
                    RouteNetlinkMessage::NewRoute(message),
                    NLM_F_CREATE | NLM_F_EXCL,
                )
            })
            .await
            .map_err(|e| Error::IoError(format!("route add task failed: {}", e)))?;

            mutation_result("add", entry, outcome)
        }

        #[instrument(skip(self), fields(route = %entry))]
        async fn delete(&self, entry: &RouteEntry) -> Result<()> {
            let parsed = parse_route(entry)?;
            let realm = self.realm;
            let outcome = tokio::task::spawn_blocking(move || {
                request_ack(
                    RouteNetlinkMessage::DelRoute(route_message(&parsed, realm)),
                    0,
                )
            })
            .await
            .map_err(|e| Error::IoError(format!("route delete task failed: {}", e)))?;

            mutation_result("delete", entry, outcome)
        }
    }

    /// Fold a request outcome into the error reported for `entry`
    ///
    /// An existing route counts as a successful add. Socket failures keep
    /// their own message so the NRT condition names the real cause.
    fn mutation_result(
        op: &'static str,
        entry: &RouteEntry,
        outcome: Result<std::result::Result<(), i32>>,
    ) -> Result<()> {
        let message = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(errno)) if op == "add" && errno == libc::EEXIST => {
                debug!("Route {} already exists", entry);
                return Ok(());
            }
            Ok(Err(errno)) => std::io::Error::from_raw_os_error(errno).to_string(),
            Err(Error::IoError(message)) => message,
            Err(e) => e.to_string(),
        };
        Err(Error::KernelMutation {
            op,
            route: entry.to_string(),
            message,
        })
    }

    fn open_socket() -> Result<Socket> {
        let mut socket = Socket::new(NETLINK_ROUTE)
            .map_err(|e| Error::IoError(format!("Failed to create netlink socket: {}", e)))?;
        socket
            .bind_auto()
            .map_err(|e| Error::IoError(format!("Failed to bind netlink socket: {}", e)))?;
        socket
            .connect(&SocketAddr::new(0, 0))
            .map_err(|e| Error::IoError(format!("Failed to connect netlink socket: {}", e)))?;
        Ok(socket)
    }

    fn send(socket: &Socket, payload: RouteNetlinkMessage, flags: u16) -> Result<u32> {
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let mut header = NetlinkHeader::default();
        header.flags = NLM_F_REQUEST | flags;
        header.sequence_number = sequence;

        let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(payload));
        packet.finalize();
        let mut buf = vec![0u8; packet.buffer_len()];
        packet.serialize(&mut buf);

        socket
            .send(&buf, 0)
            .map_err(|e| Error::IoError(format!("Failed to send netlink request: {}", e)))?;
        Ok(sequence)
    }

    /// Receive messages until `on_message` returns `Some`
    fn receive<T>(
        socket: &Socket,
        sequence: u32,
        mut on_message: impl FnMut(NetlinkMessage<RouteNetlinkMessage>) -> Result<Option<T>>,
    ) -> Result<T> {
        let mut buf = Vec::with_capacity(RECV_BUFFER_SIZE);
        loop {
            buf.clear();
            let len = socket
                .recv(&mut buf, 0)
                .map_err(|e| Error::IoError(format!("Failed to receive from netlink: {}", e)))?;

            let mut offset = 0;
            while offset < len {
                let msg = NetlinkMessage::<RouteNetlinkMessage>::deserialize(&buf[offset..len])
                    .map_err(|e| {
                        Error::IoError(format!("Failed to parse netlink message: {}", e))
                    })?;
                let msg_len = msg.header.length as usize;
                if msg_len == 0 {
                    return Err(Error::IoError("zero-length netlink message".to_string()));
                }
                offset += msg_len;
                // Netlink messages are 4-byte aligned
                offset = (offset + 3) & !3;

                if msg.header.sequence_number != sequence {
                    trace!(
                        seq = msg.header.sequence_number,
                        "Skipping unrelated netlink message"
                    );
                    continue;
                }
                if let Some(done) = on_message(msg)? {
                    return Ok(done);
                }
            }
        }
    }

    /// Send a request that expects an ACK
    ///
    /// The outer error is a socket failure, the inner one the positive errno
    /// the kernel answered with.
    fn request_ack(
        payload: RouteNetlinkMessage,
        flags: u16,
    ) -> Result<std::result::Result<(), i32>> {
        let socket = open_socket()?;
        let sequence = send(&socket, payload, NLM_F_ACK | flags)?;
        receive(&socket, sequence, |msg| match msg.payload {
            NetlinkPayload::Error(err) => Ok(Some(match err.code {
                None => Ok(()),
                Some(code) => Err(-code.get()),
            })),
            _ => Ok(None),
        })
    }

    fn dump_routes(realm: u32) -> Result<RouteEntryMap> {
        let socket = open_socket()?;
        let mut request = RouteMessage::default();
        request.header.address_family = AddressFamily::Inet;
        let sequence = send(&socket, RouteNetlinkMessage::GetRoute(request), NLM_F_DUMP)?;

        let mut routes = RouteEntryMap::new();
        receive(&socket, sequence, |msg| match msg.payload {
            NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewRoute(route)) => {
                if let Some(entry) = entry_from_message(&route, realm) {
                    routes.append_entry(entry);
                }
                Ok(None)
            }
            NetlinkPayload::Done(_) => Ok(Some(())),
            NetlinkPayload::Error(err) => match err.code {
                None => Ok(Some(())),
                Some(code) => Err(Error::IoError(format!(
                    "route dump failed: {}",
                    std::io::Error::from_raw_os_error(-code.get())
                ))),
            },
            _ => Ok(None),
        })?;

        debug!(count = routes.len(), realm, "Listed realm routes");
        Ok(routes)
    }

    fn route_message(parsed: &ParsedRoute, realm: u32) -> RouteMessage {
        let mut message = RouteMessage::default();
        message.header.address_family = AddressFamily::Inet;
        message.header.destination_prefix_length = parsed.destination.prefix_len();
        message.header.scope = RouteScope::Universe;
        message.header.kind = RouteType::Unicast;

        if parsed.destination.prefix_len() > 0 {
            message
                .attributes
                .push(RouteAttribute::Destination(RouteAddress::Inet(
                    parsed.destination.network(),
                )));
        }
        message
            .attributes
            .push(RouteAttribute::Gateway(RouteAddress::Inet(parsed.gateway)));
        message.attributes.push(RouteAttribute::Realm(RouteRealm {
            source: (realm >> 16) as u16,
            destination: (realm & 0xFFFF) as u16,
        }));

        if let Ok(table) = u8::try_from(parsed.table) {
            message.header.table = table;
        } else {
            message.header.table = RT_TABLE_UNSPEC;
            message.attributes.push(RouteAttribute::Table(parsed.table));
        }
        message
    }

    /// Convert a dumped route; `None` for foreign or non-IPv4 routes
    fn entry_from_message(route: &RouteMessage, realm: u32) -> Option<RouteEntry> {
        if route.header.address_family != AddressFamily::Inet {
            return None;
        }

        let mut table = u32::from(route.header.table);
        let mut destination = Ipv4Addr::UNSPECIFIED;
        let mut gateway = None;
        let mut route_realm = None;

        for attr in &route.attributes {
            match attr {
                RouteAttribute::Table(t) => table = *t,
                RouteAttribute::Destination(RouteAddress::Inet(addr)) => destination = *addr,
                RouteAttribute::Gateway(RouteAddress::Inet(addr)) => gateway = Some(*addr),
                RouteAttribute::Realm(r) => {
                    route_realm = Some((u32::from(r.source) << 16) | u32::from(r.destination))
                }
                _ => {}
            }
        }

        if route_realm != Some(realm) {
            return None;
        }
        let gateway = gateway?;

        Some(RouteEntry::new(
            format!("{}/{}", destination, route.header.destination_prefix_length),
            gateway.to_string(),
            i64::from(table),
        ))
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use ipnet::Ipv4Net;

        fn parsed(dst: &str, gw: Ipv4Addr, table: u32) -> ParsedRoute {
            ParsedRoute {
                destination: dst.parse::<Ipv4Net>().unwrap(),
                gateway: gw,
                table,
            }
        }

        #[test]
        fn test_existing_route_counts_as_added() {
            let entry = RouteEntry::new("10.0.0.0/24", "192.168.1.1", 100);
            assert!(mutation_result("add", &entry, Ok(Err(libc::EEXIST))).is_ok());
            assert!(mutation_result("delete", &entry, Ok(Err(libc::EEXIST))).is_err());
        }

        #[test]
        fn test_socket_failure_keeps_its_cause() {
            let entry = RouteEntry::new("10.0.0.0/24", "192.168.1.1", 100);
            let outcome = Err(Error::IoError(
                "Failed to create netlink socket: Permission denied".to_string(),
            ));

            let err = mutation_result("add", &entry, outcome).unwrap_err();
            assert!(err.is_retriable());
            assert_eq!(
                err.to_string(),
                "unable to add route 10.0.0.0/24 via 192.168.1.1 table 100: \
                 Failed to create netlink socket: Permission denied"
            );
        }

        #[test]
        fn test_errno_is_described() {
            let entry = RouteEntry::new("10.0.0.0/24", "192.168.1.1", 100);
            let err = mutation_result("delete", &entry, Ok(Err(libc::ESRCH))).unwrap_err();
            assert!(matches!(err, Error::KernelMutation { op: "delete", .. }));
            assert!(err.to_string().contains("No such process"));
        }

        #[test]
        fn test_message_round_trips_into_entry() {
            let route = parsed("10.0.0.0/24", Ipv4Addr::new(192, 168, 1, 1), 100);
            let message = route_message(&route, 216);
            assert_eq!(message.header.table, 100);

            let entry = entry_from_message(&message, 216).expect("realm route");
            assert_eq!(entry.fingerprint(), "100#10.0.0.0/24#192.168.1.1");
        }

        #[test]
        fn test_large_table_uses_table_attribute() {
            let route = parsed("10.0.0.0/24", Ipv4Addr::new(192, 168, 1, 1), 10_000);
            let message = route_message(&route, 216);
            assert_eq!(message.header.table, RT_TABLE_UNSPEC);
            assert!(message
                .attributes
                .iter()
                .any(|a| matches!(a, RouteAttribute::Table(10_000))));

            let entry = entry_from_message(&message, 216).unwrap();
            assert_eq!(entry.table, 10_000);
        }

        #[test]
        fn test_default_route_has_no_destination_attribute() {
            let route = parsed("0.0.0.0/0", Ipv4Addr::new(1, 2, 3, 4), 500);
            let message = route_message(&route, 216);
            assert!(!message
                .attributes
                .iter()
                .any(|a| matches!(a, RouteAttribute::Destination(_))));
            assert_eq!(
                entry_from_message(&message, 216).unwrap().fingerprint(),
                "500#0.0.0.0/0#1.2.3.4"
            );
        }

        #[test]
        fn test_foreign_realm_is_invisible() {
            let route = parsed("10.0.0.0/24", Ipv4Addr::new(192, 168, 1, 1), 100);
            let message = route_message(&route, 42);
            assert!(entry_from_message(&message, 216).is_none());
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux::*;

/// Stand-in for platforms without NETLINK_ROUTE
#[cfg(not(target_os = "linux"))]
mod unsupported {
    use async_trait::async_trait;

    use crate::controller::route_entry::{RouteEntry, RouteEntryMap};
    use crate::controller::route_table::RouteTable;
    use crate::error::{Error, Result};

    #[derive(Clone, Debug)]
    pub struct NetlinkRouteTable;

    fn unsupported() -> Error {
        Error::IoError("kernel routing tables are only supported on Linux".to_string())
    }

    impl NetlinkRouteTable {
        pub fn new(_realm: u32) -> Result<Self> {
            Err(unsupported())
        }
    }

    #[async_trait]
    impl RouteTable for NetlinkRouteTable {
        async fn list(&self) -> Result<RouteEntryMap> {
            Err(unsupported())
        }

        async fn add(&self, _entry: &RouteEntry) -> Result<()> {
            Err(unsupported())
        }

        async fn delete(&self, _entry: &RouteEntry) -> Result<()> {
            Err(unsupported())
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub use unsupported::*;
