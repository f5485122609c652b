use std::path::Path;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::DEFAULT_PROBE_HOSTNAME;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/relay-discovery/discoveryd.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Restrict the mDNS daemon to one interface, e.g. "wlan0"
    #[serde(default)]
    pub interface: Option<String>,
    /// How long a hostname (A) query keeps listening for an answer
    #[serde(default = "default_hostname_timeout")]
    pub hostname_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticsConfig {
    /// Run the interface, socket and manual-query probes right after start
    #[serde(default)]
    pub on_start: bool,
    #[serde(default = "default_probe_hostname")]
    pub probe_hostname: String,
}

fn default_hostname_timeout() -> u64 {
    3000
}

fn default_probe_hostname() -> String {
    DEFAULT_PROBE_HOSTNAME.to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interface: None,
            hostname_timeout_ms: default_hostname_timeout(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            on_start: false,
            probe_hostname: default_probe_hostname(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load an explicitly given file, or the default path if it exists, or built-in defaults
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}
