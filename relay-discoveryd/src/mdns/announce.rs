//! Service instance discovered/shutdown notifications.

use shared::types::{DiscoveredDevice, RecordType};
use crate::events::EventSink;
use crate::naming::{is_device_family, is_relevant_service, leading_label, local_host, normalize};
use crate::registry::Registry;
use super::fire_query;
use super::transport::Transport;

/// Seed a pending entry for a relay board and ask for its SRV, TXT and A records.
/// Anything that is not one of our service types or device families is ignored.
pub fn on_service_announced(
    registry: &mut Registry,
    transport: &dyn Transport,
    events: &EventSink,
    instance_name: &str,
) {
    if !is_relevant_service(instance_name) {
        tracing::trace!("Ignoring unrelated service {}", instance_name);
        return;
    }

    let device_id = leading_label(instance_name).to_ascii_lowercase();
    if !is_device_family(&device_id) {
        tracing::trace!("Ignoring non-relay instance {}", instance_name);
        return;
    }

    events.info(format!("Found relay device: {}", device_id));

    let device = DiscoveredDevice::new(device_id.clone(), normalize(instance_name));
    registry.insert_pending(instance_name, device);

    fire_query(transport, events, instance_name, RecordType::Srv);
    fire_query(transport, events, instance_name, RecordType::Txt);
    fire_query(transport, events, &local_host(&device_id), RecordType::A);
}

/// Drop the pending entry and, if the instance was confirmed, report it lost.
pub fn on_service_shutdown(registry: &mut Registry, events: &EventSink, instance_name: &str) {
    if registry.remove_pending(instance_name).is_some() {
        tracing::debug!("Dropped pending entry for {}", instance_name);
    }

    if let Some(device_id) = registry.confirmed_id_for_hostname(instance_name) {
        registry.remove_confirmed(&device_id, events);
    }
}
