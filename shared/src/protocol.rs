use std::net::Ipv4Addr;
use std::time::Duration;

/// DNS-SD service type for the HTTP control API of relay boards
pub const HTTP_SERVICE_TYPE: &str = "_http._tcp";

/// DNS-SD service type for boards that also speak MQTT
pub const MQTT_SERVICE_TYPE: &str = "_mqtt._tcp";

/// Service types browsed on every session start
pub const SERVICE_TYPES: [&str; 2] = [HTTP_SERVICE_TYPE, MQTT_SERVICE_TYPE];

/// Link-local domain appended to host labels
pub const LOCAL_DOMAIN: &str = ".local";

/// Product prefix of the firmware family we control. Also the only prefix
/// accepted for address records that arrive without an announcement.
pub const DEVICE_PREFIX: &str = "tasmota";

/// Generic substrings that mark an instance label as an IoT relay board
pub const DEVICE_SUBSTRINGS: [&str; 2] = ["esp", "relay"];

/// TXT record keys that carry the firmware version
pub const TXT_VERSION: &str = "version";
pub const TXT_FW_VER: &str = "fw_ver";

/// Port assumed for devices built outside of the record correlator
pub const DEFAULT_DEVICE_PORT: u16 = 8888;

/// Port assumed for devices synthesized straight from an address record
pub const DIRECT_MATCH_PORT: u16 = 80;

/// Pause between stopping a running session and starting the next one
pub const RESTART_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Pause between starting the transport and issuing the first browse queries
pub const BIND_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Pause between individual manual diagnostic queries
pub const MANUAL_QUERY_SPACING: Duration = Duration::from_millis(200);

/// mDNS multicast group and port
pub const MDNS_GROUP_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
pub const MDNS_PORT: u16 = 5353;

/// DNS-SD meta query enumerating every advertised service type
pub const META_QUERY: &str = "_services._dns-sd._udp.local";

/// Host probed by the manual diagnostic queries unless configured otherwise
pub const DEFAULT_PROBE_HOSTNAME: &str = "tasmota-B774E0-5344.local";
