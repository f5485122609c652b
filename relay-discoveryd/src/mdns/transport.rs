//! Boundary between the discovery engine and the multicast DNS layer.
//!
//! A transport owns the sockets and wire parsing. It hands the engine
//! already-parsed notifications over a channel, and accepts fire-and-forget
//! queries. `send_query` must never wait for an answer; the engine calls it
//! while holding its lock.

use std::sync::Arc;
use shared::types::{RecordType, ResourceRecord};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A service instance appeared (PTR answer for a browsed type)
    ServiceInstanceDiscovered(String),
    /// A service instance said goodbye or expired
    ServiceInstanceShutdown(String),
    /// A batch of answer records from one response
    AnswersReceived(Vec<ResourceRecord>),
}

pub trait Transport: Send + Sync {
    /// Bind and start listening. Every call returns a fresh event receiver.
    fn start(&self) -> Result<flume::Receiver<TransportEvent>>;

    /// Stop listening and release sockets. Safe to call twice.
    fn stop(&self) -> Result<()>;

    fn send_query(&self, name: &str, record_type: RecordType) -> Result<()>;

    /// Browse for instances of a DNS-SD service type, e.g. "_http._tcp"
    fn query_service_instances(&self, service_type: &str) -> Result<()>;
}

/// Builds a fresh transport for every session start
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn Transport>>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Result<Arc<dyn Transport>> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn Transport>> {
        self()
    }
}
