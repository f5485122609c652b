//! Pending and confirmed device tables.
//!
//! The registry itself is not synchronised: it lives inside the session's
//! engine state and is only reachable through that single lock, so every
//! method here runs under it. Callers get clones, never references that
//! outlive the guard.

use std::collections::HashMap;
use std::net::IpAddr;
use shared::types::DiscoveredDevice;
use crate::events::EventSink;
use crate::naming::{leading_label, local_host, normalize};

#[derive(Debug, Default)]
pub struct Registry {
    /// In-flight devices keyed by normalised service instance name
    pending: HashMap<String, DiscoveredDevice>,
    /// Complete devices; device ids are unique ignoring case
    confirmed: Vec<DiscoveredDevice>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite the pending entry for a service instance
    pub fn insert_pending(&mut self, instance_name: &str, device: DiscoveredDevice) {
        self.pending.insert(normalize(instance_name), device);
    }

    pub fn pending_mut(&mut self, instance_name: &str) -> Option<&mut DiscoveredDevice> {
        self.pending.get_mut(&normalize(instance_name))
    }

    pub fn remove_pending(&mut self, instance_name: &str) -> Option<DiscoveredDevice> {
        self.pending.remove(&normalize(instance_name))
    }

    /// Key of the pending entry whose host label + ".local" equals `host`
    pub fn pending_key_for_host(&self, host: &str) -> Option<String> {
        let host = normalize(host);
        self.pending
            .iter()
            .find(|(_, device)| local_host(&leading_label(&device.hostname).to_ascii_lowercase()) == host)
            .map(|(key, _)| key.clone())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Move a pending entry to the confirmed table if it is complete.
    /// Returns the promoted device.
    pub fn promote(&mut self, instance_name: &str, events: &EventSink) -> Option<DiscoveredDevice> {
        let key = normalize(instance_name);
        if !self.pending.get(&key)?.is_complete() {
            return None;
        }
        let device = self.pending.remove(&key)?;
        events.info(format!(
            "Complete: {} -> {}",
            device.device_id,
            display_ip(&device)
        ));
        self.upsert_confirmed(device.clone(), events);
        Some(device)
    }

    /// Insert a confirmed device, or refresh the existing one with the same id.
    /// Only an insert emits `DeviceDiscovered`. Returns true for an insert.
    pub fn upsert_confirmed(&mut self, device: DiscoveredDevice, events: &EventSink) -> bool {
        if !device.is_complete() {
            tracing::debug!("Refusing to confirm incomplete device {}", device.device_id);
            return false;
        }

        if let Some(existing) = self.confirmed_mut(&device.device_id) {
            existing.ip_address = device.ip_address;
            existing.firmware_version = device.firmware_version;
            existing.hostname = device.hostname;
            existing.port = device.port;
            existing.last_seen = device.last_seen;
            tracing::debug!("Refreshed device {}", existing.device_id);
            return false;
        }

        events.info(format!(
            "New device: {} -> {}:{}",
            device.device_id,
            display_ip(&device),
            device.port
        ));
        self.confirmed.push(device.clone());
        events.discovered(device);
        true
    }

    /// Remove a confirmed device and emit `DeviceLost`; no-op if absent
    pub fn remove_confirmed(&mut self, device_id: &str, events: &EventSink) -> Option<DiscoveredDevice> {
        let idx = self
            .confirmed
            .iter()
            .position(|d| d.device_id.eq_ignore_ascii_case(device_id))?;
        let device = self.confirmed.remove(idx);
        events.info(format!("Device lost: {}", device.device_id));
        events.lost(device.clone());
        Some(device)
    }

    pub fn confirmed_id_for_hostname(&self, hostname: &str) -> Option<String> {
        let hostname = normalize(hostname);
        self.confirmed
            .iter()
            .find(|d| normalize(&d.hostname) == hostname)
            .map(|d| d.device_id.clone())
    }

    pub fn snapshot(&self) -> Vec<DiscoveredDevice> {
        self.confirmed.clone()
    }

    pub fn lookup_by_id(&self, device_id: &str) -> Option<DiscoveredDevice> {
        self.confirmed
            .iter()
            .find(|d| d.device_id.eq_ignore_ascii_case(device_id))
            .cloned()
    }

    pub fn lookup_by_address(&self, address: IpAddr) -> Option<DiscoveredDevice> {
        self.confirmed
            .iter()
            .find(|d| d.ip_address == Some(address))
            .cloned()
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    pub fn clear_confirmed(&mut self) {
        self.confirmed.clear();
    }

    /// Empty both tables without emitting loss events
    pub fn clear(&mut self) {
        self.clear_pending();
        self.clear_confirmed();
    }

    fn confirmed_mut(&mut self, device_id: &str) -> Option<&mut DiscoveredDevice> {
        self.confirmed
            .iter_mut()
            .find(|d| d.device_id.eq_ignore_ascii_case(device_id))
    }
}

fn display_ip(device: &DiscoveredDevice) -> String {
    device
        .ip_address
        .map(|ip| ip.to_string())
        .unwrap_or_default()
}
