use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::protocol::DEFAULT_DEVICE_PORT;

/// A relay controller found on the local network.
/// This is the canonical data model shared by the discovery daemon and its consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Lowercased leading label of the service instance, e.g. "tasmota-ab12".
    /// De-duplication key, compared case-insensitively.
    pub device_id: String,

    /// Host or instance name used to correlate address records
    pub hostname: String,

    /// Resolved address; `None` until an A record arrives
    pub ip_address: Option<IpAddr>,

    /// Service port
    pub port: u16,

    /// Firmware version from the TXT record, empty if never advertised
    pub firmware_version: String,

    /// Refreshed on every create/update
    pub last_seen: DateTime<Utc>,
}

impl DiscoveredDevice {
    pub fn new(device_id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            hostname: hostname.into(),
            ip_address: None,
            port: DEFAULT_DEVICE_PORT,
            firmware_version: String::new(),
            last_seen: Utc::now(),
        }
    }

    /// A device may only be surfaced once it has an id, a usable address and a port.
    pub fn is_complete(&self) -> bool {
        !self.device_id.is_empty()
            && self.ip_address.is_some_and(|ip| !is_null_address(ip))
            && self.port > 0
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    pub fn time_since_last_seen(&self) -> chrono::Duration {
        Utc::now() - self.last_seen
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ip = self
            .ip_address
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "?".to_string());
        write!(
            f,
            "RelayController[{}] v{} at {}:{} ({})",
            self.device_id, self.firmware_version, ip, self.port, self.hostname
        )
    }
}

/// Unspecified and limited-broadcast addresses never identify a device.
fn is_null_address(ip: IpAddr) -> bool {
    ip.is_unspecified() || ip == IpAddr::V4(Ipv4Addr::BROADCAST)
}

/// DNS record types the discovery engine asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    Ptr,
    Srv,
    Txt,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordType::A => "A",
            RecordType::Ptr => "PTR",
            RecordType::Srv => "SRV",
            RecordType::Txt => "TXT",
        })
    }
}

/// An already-parsed answer record delivered by the mDNS transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceRecord {
    /// Service instance -> target host and port
    Srv { name: String, target: String, port: u16 },

    /// Service instance -> `key=value` attribute strings
    Txt { name: String, strings: Vec<String> },

    /// Host -> IPv4 address
    A { name: String, address: Ipv4Addr },
}

impl ResourceRecord {
    /// Owner name of the record
    pub fn name(&self) -> &str {
        match self {
            ResourceRecord::Srv { name, .. }
            | ResourceRecord::Txt { name, .. }
            | ResourceRecord::A { name, .. } => name,
        }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            ResourceRecord::Srv { .. } => RecordType::Srv,
            ResourceRecord::Txt { .. } => RecordType::Txt,
            ResourceRecord::A { .. } => RecordType::A,
        }
    }
}
