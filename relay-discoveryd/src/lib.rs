//! mDNS discovery of relay-control boards.
//!
//! The transport delivers service announcements and parsed SRV/TXT/A
//! answers; the engine correlates them per service instance and surfaces a
//! device only once it has an address and a port.
//!
//! ```no_run
//! use relay_discoveryd::{DiscoveryConfig, DiscoveryEvent, DiscoverySession};
//!
//! # async fn run() -> relay_discoveryd::Result<()> {
//! let session = DiscoverySession::with_mdns(DiscoveryConfig::default());
//! let events = session.events();
//! session.start(None).await?;
//!
//! while let Ok(event) = events.recv_async().await {
//!     if let DiscoveryEvent::DeviceDiscovered(device) = event {
//!         println!("{}", device);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod mdns;
pub mod naming;
pub mod registry;
pub mod session;

pub use config::{Config, DiscoveryConfig};
pub use error::{DiscoveryError, Result};
pub use events::DiscoveryEvent;
pub use mdns::transport::{Transport, TransportEvent, TransportFactory};
pub use session::{DiscoverySession, SessionState};
pub use shared::types::{DiscoveredDevice, RecordType, ResourceRecord};
