//! `Transport` backed by the mdns-sd daemon.
//!
//! mdns-sd does the wire work and resolves SRV/TXT itself once an instance is
//! found, so resolved instances are flattened back into the SRV/TXT/A batch
//! the correlator expects. Each browse and hostname lookup gets its own pump
//! task feeding one shared event channel. Both kinds of pump go through one
//! `ResolutionLedger`, so a host address reaches the engine once.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use mdns_sd::{HostnameResolutionEvent, ServiceDaemon, ServiceEvent, ServiceInfo};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use shared::types::{RecordType, ResourceRecord};
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::naming::service_query_name;
use super::resolution::ResolutionLedger;
use super::transport::{Transport, TransportEvent};

pub struct MdnsSdTransport {
    interface: Option<String>,
    hostname_timeout_ms: u64,
    active: Mutex<Option<Active>>,
}

struct Active {
    daemon: ServiceDaemon,
    tx: flume::Sender<TransportEvent>,
    browsed: HashSet<String>,
    ledger: Arc<Mutex<ResolutionLedger>>,
    cancel: CancellationToken,
}

impl MdnsSdTransport {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            interface: config.interface.clone(),
            hostname_timeout_ms: config.hostname_timeout_ms,
            active: Mutex::new(None),
        }
    }

    fn browse(&self, service_type: &str, record_type: RecordType) -> Result<()> {
        let mut guard = self.active.lock();
        let active = guard.as_mut().ok_or(DiscoveryError::NotRunning)?;

        // mdns-sd wants the fully qualified form, e.g. "_http._tcp.local."
        let ty_domain = format!("{}.", service_query_name(service_type));
        if active.browsed.contains(&ty_domain) {
            tracing::trace!("Already browsing {}", ty_domain);
            return Ok(());
        }

        let receiver = active.daemon.browse(&ty_domain).map_err(|e| DiscoveryError::Query {
            name: ty_domain.clone(),
            record_type,
            reason: e.to_string(),
        })?;

        tracing::debug!("Browsing {}", ty_domain);
        active.browsed.insert(ty_domain);
        tokio::spawn(pump_browse(
            receiver,
            active.tx.clone(),
            Arc::clone(&active.ledger),
            active.cancel.clone(),
        ));
        Ok(())
    }

    fn resolve_host(&self, host: &str) -> Result<()> {
        let guard = self.active.lock();
        let active = guard.as_ref().ok_or(DiscoveryError::NotRunning)?;

        let hostname = format!("{}.", host.trim_end_matches('.'));
        let receiver = active
            .daemon
            .resolve_hostname(&hostname, Some(self.hostname_timeout_ms))
            .map_err(|e| DiscoveryError::Query {
                name: hostname.clone(),
                record_type: RecordType::A,
                reason: e.to_string(),
            })?;

        tokio::spawn(pump_hostname(
            receiver,
            active.tx.clone(),
            Arc::clone(&active.ledger),
            active.cancel.clone(),
        ));
        Ok(())
    }
}

impl Transport for MdnsSdTransport {
    fn start(&self) -> Result<flume::Receiver<TransportEvent>> {
        self.stop()?;

        let daemon = ServiceDaemon::new()
            .map_err(|e| DiscoveryError::TransportStart(format!("Failed to create mDNS daemon: {}", e)))?;

        if let Some(interface) = &self.interface {
            daemon.disable_interface(mdns_sd::IfKind::All)?;
            daemon.enable_interface(interface.as_str())?;
            tracing::info!("mDNS restricted to interface {}", interface);
        }

        let (tx, rx) = flume::unbounded();
        *self.active.lock() = Some(Active {
            daemon,
            tx,
            browsed: HashSet::new(),
            ledger: Arc::new(Mutex::new(ResolutionLedger::new())),
            cancel: CancellationToken::new(),
        });

        tracing::info!("mDNS daemon started");
        Ok(rx)
    }

    fn stop(&self) -> Result<()> {
        let Some(active) = self.active.lock().take() else {
            return Ok(());
        };

        active.cancel.cancel();
        for ty_domain in &active.browsed {
            if let Err(e) = active.daemon.stop_browse(ty_domain) {
                tracing::debug!("Failed to stop browsing {}: {}", ty_domain, e);
            }
        }
        if let Err(e) = active.daemon.shutdown() {
            tracing::error!("Failed to shutdown mDNS daemon: {}", e);
        }

        tracing::info!("mDNS daemon stopped");
        Ok(())
    }

    fn send_query(&self, name: &str, record_type: RecordType) -> Result<()> {
        match record_type {
            RecordType::A => self.resolve_host(name),
            RecordType::Ptr => self.browse(name, record_type),
            RecordType::Srv | RecordType::Txt => {
                // Issued by the daemon itself after ServiceFound
                tracing::trace!("{} query for {} left to the mDNS daemon", record_type, name);
                Ok(())
            }
        }
    }

    fn query_service_instances(&self, service_type: &str) -> Result<()> {
        self.browse(service_type, RecordType::Ptr)
    }
}

impl Drop for MdnsSdTransport {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

async fn pump_browse(
    receiver: flume::Receiver<ServiceEvent>,
    tx: flume::Sender<TransportEvent>,
    ledger: Arc<Mutex<ResolutionLedger>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            event = receiver.recv_async() => {
                let events = match event {
                    Ok(ServiceEvent::ServiceFound(_ty, fullname)) => {
                        vec![ledger.lock().found(&trim_root(&fullname))]
                    }
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        tracing::trace!("Resolved {}", info.get_fullname());
                        let fullname = trim_root(info.get_fullname());
                        ledger.lock().resolved(&fullname, records_from_info(&info))
                    }
                    Ok(ServiceEvent::ServiceRemoved(_ty, fullname)) => {
                        vec![ledger.lock().removed(&trim_root(&fullname))]
                    }
                    Ok(_) => Vec::new(),
                    Err(e) => {
                        tracing::debug!("Browse channel closed: {}", e);
                        break;
                    }
                };
                if events.into_iter().any(|event| tx.send(event).is_err()) {
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

async fn pump_hostname(
    receiver: flume::Receiver<HostnameResolutionEvent>,
    tx: flume::Sender<TransportEvent>,
    ledger: Arc<Mutex<ResolutionLedger>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            event = receiver.recv_async() => match event {
                Ok(HostnameResolutionEvent::AddressesFound(host, addresses)) => {
                    let host = trim_root(&host);
                    let records = a_records(&host, addresses.iter());
                    if records.is_empty() {
                        continue;
                    }
                    let event = ledger.lock().addresses(&host, records);
                    if let Some(event) = event {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                }
                Ok(HostnameResolutionEvent::SearchTimeout(host)) => {
                    tracing::debug!("No address for {}", host);
                    break;
                }
                Ok(HostnameResolutionEvent::SearchStopped(_)) => break,
                Ok(_) => {}
                Err(_) => break,
            },
            _ = cancel.cancelled() => break,
        }
    }
}

/// Flatten a resolved instance into the SRV, TXT and A records it came from
fn records_from_info(info: &ServiceInfo) -> Vec<ResourceRecord> {
    let fullname = trim_root(info.get_fullname());
    let host = trim_root(info.get_hostname());

    let mut records = vec![
        ResourceRecord::Srv {
            name: fullname.clone(),
            target: host.clone(),
            port: info.get_port(),
        },
        ResourceRecord::Txt {
            name: fullname,
            strings: info
                .get_properties()
                .iter()
                .map(|prop| format!("{}={}", prop.key(), prop.val_str()))
                .collect(),
        },
    ];
    records.extend(a_records(&host, info.get_addresses().iter()));
    records
}

fn a_records<'a>(host: &str, addresses: impl Iterator<Item = &'a IpAddr>) -> Vec<ResourceRecord> {
    addresses
        .filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(ResourceRecord::A {
                name: host.to_string(),
                address: *v4,
            }),
            IpAddr::V6(_) => None,
        })
        .collect()
}

fn trim_root(name: &str) -> String {
    name.trim_end_matches('.').to_string()
}
