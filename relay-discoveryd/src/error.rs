//! Error types for the discovery engine

use shared::types::RecordType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The multicast transport could not be created or started
    #[error("Failed to start mDNS transport: {0}")]
    TransportStart(String),

    /// A single query could not be handed to the transport
    #[error("Failed to send {record_type} query for '{name}': {reason}")]
    Query {
        name: String,
        record_type: RecordType,
        reason: String,
    },

    /// `start` was cancelled before the session came up
    #[error("Discovery start was cancelled")]
    Cancelled,

    /// The operation needs a running transport
    #[error("Discovery is not running")]
    NotRunning,

    #[error("mDNS daemon error: {0}")]
    Mdns(#[from] mdns_sd::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn restrict(daemon_result: std::result::Result<(), mdns_sd::Error>) -> Result<()> {
        daemon_result?;
        Ok(())
    }

    #[test]
    fn test_daemon_errors_convert() {
        let err = restrict(Err(mdns_sd::Error::Msg("no such interface".to_string()))).unwrap_err();
        assert!(matches!(err, DiscoveryError::Mdns(_)));
        assert!(err.to_string().contains("no such interface"));
    }
}
