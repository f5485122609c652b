//! Troubleshooting probes. None of these touch session state and none of
//! them fail: problems are reported on the log stream only.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use socket2::{Domain, Protocol, Socket, Type};
use shared::protocol::{HTTP_SERVICE_TYPE, MANUAL_QUERY_SPACING, MDNS_GROUP_V4, MDNS_PORT, META_QUERY};
use shared::types::RecordType;
use crate::error::Result;
use crate::events::EventSink;
use crate::mdns::fire_query;
use crate::mdns::transport::Transport;
use crate::naming::service_query_name;

/// Log every IPv4 address of every interface
pub fn log_network_interfaces(events: &EventSink) {
    events.info("Network interfaces:");
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            for iface in interfaces.iter().filter(|i| i.ip().is_ipv4()) {
                let note = if iface.is_loopback() { " (loopback)" } else { "" };
                events.info(format!("   {}: {}{}", iface.name, iface.ip(), note));
            }
        }
        Err(e) => events.warn(format!("Network interface error: {}", e)),
    }
}

/// Check that we may bind the mDNS port and join the multicast group
pub fn test_multicast_socket(events: &EventSink) {
    events.info("Testing multicast socket...");
    match bind_mdns_socket() {
        Ok(()) => events.info("Multicast socket test successful"),
        Err(e) => events.warn(format!("Multicast socket test failed: {}", e)),
    }
}

fn bind_mdns_socket() -> Result<()> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), MDNS_PORT);
    socket.bind(&local.into())?;
    socket.join_multicast_v4(&MDNS_GROUP_V4, &Ipv4Addr::UNSPECIFIED)?;
    Ok(())
}

/// Fire the probe host A query, an HTTP browse and the DNS-SD meta query
pub async fn send_manual_queries(transport: &dyn Transport, events: &EventSink, probe_hostname: &str) {
    events.info("Sending manual queries...");

    fire_query(transport, events, probe_hostname, RecordType::A);
    tokio::time::sleep(MANUAL_QUERY_SPACING).await;

    fire_query(transport, events, &service_query_name(HTTP_SERVICE_TYPE), RecordType::Ptr);
    tokio::time::sleep(MANUAL_QUERY_SPACING).await;

    fire_query(transport, events, META_QUERY, RecordType::Ptr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DiscoveryEvent;
    use crate::mdns::transport::mock::MemoryTransport;

    fn log_lines(rx: &flume::Receiver<DiscoveryEvent>) -> Vec<String> {
        rx.try_iter()
            .filter_map(|e| match e {
                DiscoveryEvent::Log(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_interface_listing_logs_header() {
        let (events, rx) = EventSink::channel();
        log_network_interfaces(&events);
        let lines = log_lines(&rx);
        assert!(lines[0].ends_with("Network interfaces:"));
    }

    #[test]
    fn test_multicast_probe_never_panics() {
        let (events, rx) = EventSink::channel();
        test_multicast_socket(&events);

        // Either outcome is reported, never raised
        let lines = log_lines(&rx);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("Multicast socket test"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_query_failures_are_logged() {
        let (events, rx) = EventSink::channel();
        let transport = MemoryTransport::failing_queries();

        send_manual_queries(transport.as_ref(), &events, "tasmota-B774E0-5344.local").await;

        let failures = log_lines(&rx)
            .into_iter()
            .filter(|l| l.contains("Query failed"))
            .count();
        assert_eq!(failures, 3);
    }
}
