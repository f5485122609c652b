//! Discovery session lifecycle and the public API used by the UI side.
//!
//! Locking: one `parking_lot::Mutex` (the engine) guards the registry, the
//! session state and the current transport. Transport notifications are
//! handled on a reader task that takes the engine lock for each event.
//! Start/stop are serialised by a separate async lock that owns the reader
//! task, because they sleep and await the reader.
//!
//! Each listener receives events through its own channel and never runs
//! under the engine lock, so it is free to call back into the session.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use shared::protocol::{BIND_SETTLE_DELAY, RESTART_SETTLE_DELAY, SERVICE_TYPES};
use shared::types::DiscoveredDevice;
use crate::config::DiscoveryConfig;
use crate::diagnostics;
use crate::error::{DiscoveryError, Result};
use crate::events::{DiscoveryEvent, EventSink};
use crate::mdns::daemon::MdnsSdTransport;
use crate::mdns::transport::{Transport, TransportEvent, TransportFactory};
use crate::mdns::{announce, correlator};
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
}

struct Engine {
    registry: Registry,
    state: SessionState,
    transport: Option<Arc<dyn Transport>>,
}

struct Shared {
    engine: Mutex<Engine>,
    events: EventSink,
}

impl Shared {
    fn handle(&self, transport: &dyn Transport, event: TransportEvent) {
        let mut engine = self.engine.lock();
        match event {
            TransportEvent::ServiceInstanceDiscovered(name) => {
                announce::on_service_announced(&mut engine.registry, transport, &self.events, &name);
            }
            TransportEvent::ServiceInstanceShutdown(name) => {
                announce::on_service_shutdown(&mut engine.registry, &self.events, &name);
            }
            TransportEvent::AnswersReceived(records) => {
                correlator::on_answers(&mut engine.registry, transport, &self.events, &records);
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        self.engine.lock().state = state;
    }
}

/// Everything that exists only while a session is up
struct ActiveSession {
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

impl ActiveSession {
    async fn shutdown(self, events: &EventSink) {
        // Unsubscribe first so no handler runs against a stopping transport
        self.cancel.cancel();
        if let Err(e) = self.reader.await {
            tracing::warn!("Transport reader ended abnormally: {}", e);
        }
        if let Err(e) = self.transport.stop() {
            events.warn(format!("Stop discovery error: {}", e));
        }
    }
}

pub struct DiscoverySession {
    shared: Arc<Shared>,
    factory: Box<dyn TransportFactory>,
    active: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl DiscoverySession {
    pub fn new(factory: impl TransportFactory + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine: Mutex::new(Engine {
                    registry: Registry::new(),
                    state: SessionState::Idle,
                    transport: None,
                }),
                events: EventSink::new(),
            }),
            factory: Box::new(factory),
            active: tokio::sync::Mutex::new(None),
        }
    }

    /// Session backed by the system mDNS daemon
    pub fn with_mdns(config: DiscoveryConfig) -> Self {
        Self::new(move || -> Result<Arc<dyn Transport>> {
            Ok(Arc::new(MdnsSdTransport::new(&config)))
        })
    }

    /// Start discovery, restarting if a session is already running.
    ///
    /// If `cancel` fires before the session is up, the transport is stopped
    /// and `DiscoveryError::Cancelled` is returned.
    pub async fn start(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        let mut active = self.active.lock().await;
        let events = &self.shared.events;

        if active.is_some() {
            events.info("Discovery already running, restarting...");
            self.stop_locked(&mut active).await;
            if let Err(e) = settle(RESTART_SETTLE_DELAY, cancel).await {
                events.warn(format!("Discovery start failed: {}", e));
                return Err(e);
            }
        }

        events.info("Starting relay mDNS discovery...");
        {
            let mut engine = self.shared.engine.lock();
            engine.registry.clear();
            engine.state = SessionState::Starting;
        }

        match self.bring_up(cancel).await {
            Ok(session) => {
                {
                    let mut engine = self.shared.engine.lock();
                    engine.transport = Some(Arc::clone(&session.transport));
                    engine.state = SessionState::Running;
                }
                *active = Some(session);
                events.info("Relay mDNS discovery active");
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(SessionState::Idle);
                events.warn(format!("Discovery start failed: {}", e));
                Err(e)
            }
        }
    }

    async fn bring_up(&self, cancel: Option<&CancellationToken>) -> Result<ActiveSession> {
        let transport = self.factory.create()?;
        let rx = transport.start()?;

        let reader_cancel = CancellationToken::new();
        let reader = tokio::spawn(run_reader(
            Arc::clone(&self.shared),
            Arc::clone(&transport),
            rx,
            reader_cancel.clone(),
        ));
        let session = ActiveSession {
            transport,
            cancel: reader_cancel,
            reader,
        };

        // Give the sockets a moment to bind before the first queries go out
        if let Err(e) = settle(BIND_SETTLE_DELAY, cancel).await {
            session.shutdown(&self.shared.events).await;
            return Err(e);
        }

        for service_type in SERVICE_TYPES {
            if let Err(e) = session.transport.query_service_instances(service_type) {
                session.shutdown(&self.shared.events).await;
                return Err(e);
            }
        }

        Ok(session)
    }

    /// Stop discovery. Confirmed devices stay visible; pending ones are dropped.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        self.stop_locked(&mut active).await;
    }

    async fn stop_locked(&self, active: &mut Option<ActiveSession>) {
        let Some(session) = active.take() else {
            return;
        };

        let events = &self.shared.events;
        events.info("Stopping discovery...");
        {
            let mut engine = self.shared.engine.lock();
            engine.state = SessionState::Stopping;
            engine.transport = None;
        }

        session.shutdown(events).await;

        {
            let mut engine = self.shared.engine.lock();
            engine.registry.clear_pending();
            engine.state = SessionState::Idle;
        }
        events.info("Discovery stopped");
    }

    /// Forget every confirmed device without touching the running session
    pub fn clear_discovered(&self) {
        self.shared.engine.lock().registry.clear_confirmed();
        self.shared.events.info("Cleared discovered devices");
    }

    /// Snapshot of the confirmed devices
    pub fn discovered_devices(&self) -> Vec<DiscoveredDevice> {
        self.shared.engine.lock().registry.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn state(&self) -> SessionState {
        self.shared.engine.lock().state
    }

    pub fn device_by_id(&self, device_id: &str) -> Option<DiscoveredDevice> {
        self.shared.engine.lock().registry.lookup_by_id(device_id)
    }

    pub fn device_by_address(&self, address: IpAddr) -> Option<DiscoveredDevice> {
        self.shared.engine.lock().registry.lookup_by_address(address)
    }

    /// Subscribe to device and log notifications emitted from now on.
    /// Every call returns an independent receiver that sees the whole stream.
    pub fn events(&self) -> flume::Receiver<DiscoveryEvent> {
        self.shared.events.subscribe()
    }

    /// Ask the running transport for the probe host, the HTTP services and
    /// every advertised service type. Does nothing when stopped.
    pub async fn send_manual_queries(&self, probe_hostname: &str) {
        let transport = self.shared.engine.lock().transport.clone();
        match transport {
            Some(transport) => {
                diagnostics::send_manual_queries(transport.as_ref(), &self.shared.events, probe_hostname).await
            }
            None => tracing::debug!("Manual queries skipped, discovery is not running"),
        }
    }

    pub fn log_network_interfaces(&self) {
        diagnostics::log_network_interfaces(&self.shared.events);
    }

    pub fn test_multicast_socket(&self) {
        diagnostics::test_multicast_socket(&self.shared.events);
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        let Ok(mut active) = self.active.try_lock() else {
            return;
        };
        if let Some(session) = active.take() {
            tracing::warn!("Discovery session dropped while still running");
            session.cancel.cancel();
            session.reader.abort();
            let _ = session.transport.stop();
        }
    }
}

async fn settle(delay: Duration, cancel: Option<&CancellationToken>) -> Result<()> {
    match cancel {
        Some(token) => tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = token.cancelled() => Err(DiscoveryError::Cancelled),
        },
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}

async fn run_reader(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    rx: flume::Receiver<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            event = rx.recv_async() => match event {
                Ok(event) => shared.handle(transport.as_ref(), event),
                Err(_) => {
                    tracing::debug!("Transport event channel closed");
                    break;
                }
            },
            _ = cancel.cancelled() => break,
        }
    }
}
