//! Folds SRV, TXT and A answers into pending devices.
//!
//! A batch is applied in one pass: SRV records first, then TXT, then A, so an
//! address arriving in the same response as the port still sees the port.
//! Address records are the only way a pending entry gets promoted.

use std::net::IpAddr;
use shared::protocol::DIRECT_MATCH_PORT;
use shared::types::{DiscoveredDevice, RecordType, ResourceRecord};
use crate::events::EventSink;
use crate::naming::{has_device_prefix, is_relevant_service, is_version_key, local_host, normalize, strip_local};
use crate::registry::Registry;
use super::fire_query;
use super::transport::Transport;

pub fn on_answers(
    registry: &mut Registry,
    transport: &dyn Transport,
    events: &EventSink,
    records: &[ResourceRecord],
) {
    for record in records {
        if let ResourceRecord::Srv { name, target, port } = record {
            apply_srv(registry, transport, events, name, target, *port);
        }
    }

    for record in records {
        if let ResourceRecord::Txt { name, strings } = record {
            apply_txt(registry, name, strings);
        }
    }

    for record in records {
        if let ResourceRecord::A { name, address } = record {
            apply_a(registry, events, name, IpAddr::V4(*address));
        }
    }
}

fn apply_srv(
    registry: &mut Registry,
    transport: &dyn Transport,
    events: &EventSink,
    name: &str,
    target: &str,
    port: u16,
) {
    if !is_relevant_service(name) {
        return;
    }
    let Some(device) = registry.pending_mut(name) else {
        tracing::trace!("SRV for unknown instance {}", name);
        return;
    };

    device.port = port;
    device.touch();

    // The advertised host may differ from the one derived from the instance label
    let target = target.trim_end_matches('.');
    if !target.eq_ignore_ascii_case(&local_host(&device.device_id)) {
        tracing::debug!("SRV target {} differs from {}, asking for its address", target, device.device_id);
        fire_query(transport, events, target, RecordType::A);
    }
}

fn apply_txt(registry: &mut Registry, name: &str, strings: &[String]) {
    if !is_relevant_service(name) {
        return;
    }
    let Some(device) = registry.pending_mut(name) else {
        return;
    };

    for pair in strings {
        match pair.split_once('=') {
            Some((key, value)) if is_version_key(key.trim()) => {
                device.firmware_version = value.trim().to_string();
                device.touch();
            }
            Some(_) => {}
            None => tracing::trace!("Skipping malformed TXT string {:?} for {}", pair, name),
        }
    }
}

fn apply_a(registry: &mut Registry, events: &EventSink, name: &str, address: IpAddr) {
    let host = normalize(name);

    if let Some(key) = registry.pending_key_for_host(&host) {
        if let Some(device) = registry.pending_mut(&key) {
            device.ip_address = Some(address);
            device.touch();
        }
        registry.promote(&key, events);
        return;
    }

    // Address seen before any announcement: trust the product prefix alone
    if has_device_prefix(&host) {
        let mut device = DiscoveredDevice::new(strip_local(&host), host.clone());
        device.ip_address = Some(address);
        device.port = DIRECT_MATCH_PORT;
        registry.upsert_confirmed(device, events);
    } else {
        tracing::trace!("Dropping A record for {}", host);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use crate::events::DiscoveryEvent;
    use crate::mdns::announce::on_service_announced;
    use crate::mdns::transport::mock::MemoryTransport;

    const INSTANCE: &str = "tasmota-AB12.local._http._tcp";

    struct Harness {
        registry: Registry,
        transport: std::sync::Arc<MemoryTransport>,
        events: EventSink,
        rx: flume::Receiver<DiscoveryEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let (events, rx) = EventSink::channel();
            Self {
                registry: Registry::new(),
                transport: MemoryTransport::new(),
                events,
                rx,
            }
        }

        fn announce(&mut self, instance: &str) {
            on_service_announced(&mut self.registry, self.transport.as_ref(), &self.events, instance);
        }

        fn answer(&mut self, records: Vec<ResourceRecord>) {
            on_answers(&mut self.registry, self.transport.as_ref(), &self.events, &records);
        }

        fn discovered(&self) -> Vec<DiscoveredDevice> {
            self.rx
                .try_iter()
                .filter_map(|e| match e {
                    DiscoveryEvent::DeviceDiscovered(d) => Some(d),
                    _ => None,
                })
                .collect()
        }
    }

    fn srv(name: &str, target: &str, port: u16) -> ResourceRecord {
        ResourceRecord::Srv {
            name: name.to_string(),
            target: target.to_string(),
            port,
        }
    }

    fn txt(name: &str, strings: &[&str]) -> ResourceRecord {
        ResourceRecord::Txt {
            name: name.to_string(),
            strings: strings.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn a(name: &str, address: [u8; 4]) -> ResourceRecord {
        ResourceRecord::A {
            name: name.to_string(),
            address: Ipv4Addr::from(address),
        }
    }

    #[test]
    fn test_full_resolution_sequence() {
        let mut h = Harness::new();
        h.announce(INSTANCE);
        h.answer(vec![srv(INSTANCE, "tasmota-ab12.local", 80)]);
        h.answer(vec![txt(INSTANCE, &["version=12.1.1"])]);
        h.answer(vec![a("tasmota-ab12.local", [10, 0, 0, 5])]);

        let discovered = h.discovered();
        assert_eq!(discovered.len(), 1);
        let device = &discovered[0];
        assert_eq!(device.device_id, "tasmota-ab12");
        assert_eq!(device.port, 80);
        assert_eq!(device.firmware_version, "12.1.1");
        assert_eq!(device.ip_address, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))));
        assert_eq!(h.registry.pending_len(), 0);
        assert_eq!(h.registry.snapshot(), discovered);
    }

    #[test]
    fn test_txt_before_srv_gives_same_result() {
        let mut h = Harness::new();
        h.announce(INSTANCE);
        h.answer(vec![txt(INSTANCE, &["fw_ver = 13.2.0 "])]);
        h.answer(vec![srv(INSTANCE, "tasmota-ab12.local.", 8080)]);
        h.answer(vec![a("tasmota-ab12.local.", [10, 0, 0, 6])]);

        let device = h.registry.lookup_by_id("tasmota-ab12").unwrap();
        assert_eq!(device.port, 8080);
        assert_eq!(device.firmware_version, "13.2.0");
    }

    #[test]
    fn test_single_batch_applies_srv_before_a() {
        let mut h = Harness::new();
        h.announce(INSTANCE);
        h.answer(vec![
            a("tasmota-ab12.local", [10, 0, 0, 5]),
            txt(INSTANCE, &["version=12.1.1"]),
            srv(INSTANCE, "tasmota-ab12.local", 80),
        ]);

        let device = h.registry.lookup_by_id("tasmota-ab12").unwrap();
        assert_eq!(device.port, 80);
        assert_eq!(device.firmware_version, "12.1.1");
    }

    #[test]
    fn test_nothing_surfaces_without_address() {
        let mut h = Harness::new();
        h.announce(INSTANCE);
        h.answer(vec![srv(INSTANCE, "tasmota-ab12.local", 80), txt(INSTANCE, &["version=1"])]);

        assert!(h.discovered().is_empty());
        assert!(h.registry.snapshot().is_empty());
        assert_eq!(h.registry.pending_len(), 1);
    }

    #[test]
    fn test_zero_port_blocks_promotion() {
        let mut h = Harness::new();
        h.announce(INSTANCE);
        h.answer(vec![srv(INSTANCE, "tasmota-ab12.local", 0)]);
        h.answer(vec![a("tasmota-ab12.local", [10, 0, 0, 5])]);

        assert!(h.discovered().is_empty());
        assert_eq!(h.registry.pending_len(), 1);
    }

    #[test]
    fn test_address_without_srv_uses_default_port() {
        let mut h = Harness::new();
        h.announce(INSTANCE);
        h.answer(vec![a("tasmota-ab12.local", [10, 0, 0, 5])]);

        let device = h.registry.lookup_by_id("tasmota-ab12").unwrap();
        assert_eq!(device.port, shared::protocol::DEFAULT_DEVICE_PORT);
    }

    #[test]
    fn test_srv_target_mismatch_queries_target() {
        let mut h = Harness::new();
        h.announce(INSTANCE);
        h.transport.clear_queries();

        h.answer(vec![srv(INSTANCE, "living-room-plug.local.", 80)]);
        assert_eq!(
            h.transport.queries(),
            vec![("living-room-plug.local".to_string(), RecordType::A)]
        );

        h.transport.clear_queries();
        h.answer(vec![srv(INSTANCE, "Tasmota-AB12.local", 80)]);
        assert!(h.transport.queries().is_empty());
    }

    #[test]
    fn test_direct_address_match_synthesizes_device() {
        let mut h = Harness::new();
        h.answer(vec![a("Tasmota-XY.local", [10, 0, 0, 9])]);

        let discovered = h.discovered();
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].device_id, "tasmota-xy");
        assert_eq!(discovered[0].hostname, "tasmota-xy.local");
        assert_eq!(discovered[0].port, 80);
    }

    #[test]
    fn test_unrelated_records_are_dropped() {
        let mut h = Harness::new();
        h.answer(vec![
            srv("printer._ipp._tcp.local", "printer.local", 631),
            txt("nas._http._tcp.local", &["version=7"]),
            a("printer.local", [10, 0, 0, 20]),
        ]);

        assert!(h.discovered().is_empty());
        assert!(h.registry.snapshot().is_empty());
    }

    #[test]
    fn test_malformed_txt_is_skipped() {
        let mut h = Harness::new();
        h.announce(INSTANCE);
        h.answer(vec![txt(INSTANCE, &["garbage", "model=basic", "version=9.5.0"])]);
        h.answer(vec![a("tasmota-ab12.local", [10, 0, 0, 5])]);

        let device = h.registry.lookup_by_id("tasmota-ab12").unwrap();
        assert_eq!(device.firmware_version, "9.5.0");
    }

    #[test]
    fn test_reannouncement_refreshes_without_duplicate_event() {
        let mut h = Harness::new();
        h.announce(INSTANCE);
        h.answer(vec![a("tasmota-ab12.local", [10, 0, 0, 5])]);
        let first_seen = h.registry.lookup_by_id("tasmota-ab12").unwrap().last_seen;

        h.announce(INSTANCE);
        h.answer(vec![srv(INSTANCE, "tasmota-ab12.local", 80)]);
        h.answer(vec![a("tasmota-ab12.local", [10, 0, 0, 7])]);

        assert_eq!(h.discovered().len(), 1);
        let device = h.registry.lookup_by_id("tasmota-ab12").unwrap();
        assert_eq!(device.ip_address, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))));
        assert_eq!(device.port, 80);
        assert!(device.last_seen >= first_seen);
        assert_eq!(h.registry.snapshot().len(), 1);
    }
}
