pub mod announce;
pub mod correlator;
pub mod daemon;
pub(crate) mod resolution;
pub mod transport;

use shared::types::RecordType;
use crate::events::EventSink;
use transport::Transport;

/// Send a follow-up query; failures are logged and discovery carries on,
/// relying on the device to re-announce itself.
pub(crate) fn fire_query(transport: &dyn Transport, events: &EventSink, name: &str, record_type: RecordType) {
    match transport.send_query(name, record_type) {
        Ok(()) => tracing::trace!("Sent {} query for {}", record_type, name),
        Err(e) => events.warn(format!("Query failed: {}", e)),
    }
}
