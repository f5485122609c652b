//! DNS name helpers and the device-family heuristics.
//! All comparisons are ASCII case-insensitive and ignore a trailing root dot.

use shared::protocol::{
    DEVICE_PREFIX, DEVICE_SUBSTRINGS, LOCAL_DOMAIN, SERVICE_TYPES, TXT_FW_VER, TXT_VERSION,
};

/// Canonical form used for map keys and comparisons
pub fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// First DNS label, e.g. "tasmota-AB12" for "tasmota-AB12._http._tcp.local"
pub fn leading_label(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// `label` + ".local"
pub fn local_host(label: &str) -> String {
    format!("{}{}", label, LOCAL_DOMAIN)
}

/// Strips ".local" (and the root dot) from a host name
pub fn strip_local(host: &str) -> &str {
    let host = host.trim_end_matches('.');
    host.strip_suffix(LOCAL_DOMAIN).unwrap_or(host)
}

/// Whether the name belongs to one of the browsed service types
pub fn is_relevant_service(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    SERVICE_TYPES.iter().any(|t| name.contains(t))
}

/// Whether an instance label looks like one of our relay boards
pub fn is_device_family(label: &str) -> bool {
    let label = label.to_ascii_lowercase();
    has_device_prefix(&label) || DEVICE_SUBSTRINGS.iter().any(|s| label.contains(s))
}

pub fn has_device_prefix(name: &str) -> bool {
    name.to_ascii_lowercase().starts_with(DEVICE_PREFIX)
}

pub fn is_version_key(key: &str) -> bool {
    key.eq_ignore_ascii_case(TXT_VERSION) || key.eq_ignore_ascii_case(TXT_FW_VER)
}

/// Fully qualified browse name for a service type, e.g. "_http._tcp.local"
pub fn service_query_name(service_type: &str) -> String {
    let service_type = service_type.trim_end_matches('.');
    if service_type.ends_with(LOCAL_DOMAIN) {
        service_type.to_string()
    } else {
        format!("{}{}", service_type, LOCAL_DOMAIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Tasmota-AB12._http._tcp.local."), "tasmota-ab12._http._tcp.local");
        assert_eq!(normalize("host.local"), "host.local");
    }

    #[test]
    fn test_leading_label() {
        assert_eq!(leading_label("tasmota-AB12.local._http._tcp"), "tasmota-AB12");
        assert_eq!(leading_label("plain"), "plain");
    }

    #[test]
    fn test_strip_local() {
        assert_eq!(strip_local("tasmota-xy.local"), "tasmota-xy");
        assert_eq!(strip_local("tasmota-xy.local."), "tasmota-xy");
        assert_eq!(strip_local("tasmota-xy"), "tasmota-xy");
    }

    #[test]
    fn test_relevant_service_types() {
        assert!(is_relevant_service("tasmota-AB12._HTTP._tcp.local"));
        assert!(is_relevant_service("board._mqtt._tcp.local."));
        assert!(!is_relevant_service("printer._ipp._tcp.local"));
    }

    #[test]
    fn test_device_family() {
        assert!(is_device_family("Tasmota-AB12"));
        assert!(is_device_family("kitchen-esp32"));
        assert!(is_device_family("garage-RELAY"));
        assert!(!is_device_family("printer"));
    }

    #[test]
    fn test_version_keys() {
        assert!(is_version_key("version"));
        assert!(is_version_key("FW_VER"));
        assert!(!is_version_key("ver"));
    }

    #[test]
    fn test_service_query_name() {
        assert_eq!(service_query_name("_http._tcp"), "_http._tcp.local");
        assert_eq!(service_query_name("_http._tcp.local."), "_http._tcp.local");
    }
}
