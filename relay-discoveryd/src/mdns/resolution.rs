//! Reconciles the two routes mdns-sd reports host addresses on.
//!
//! A resolved instance carries the addresses of its host, and the hostname
//! lookup started for the same instance reports them a second time. Each
//! (host, address) pair is forwarded once per instance lifetime. Lookup
//! answers for an instance that was found but not yet resolved are held back
//! until its SRV and TXT have gone out, so the port and version are in place
//! when the address promotes the device.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use shared::types::{RecordType, ResourceRecord};
use crate::naming::{leading_label, normalize};
use super::transport::TransportEvent;

#[derive(Debug, Default)]
pub(crate) struct ResolutionLedger {
    /// Instance labels found by a browse and not resolved yet
    awaiting: HashSet<String>,
    /// Instance label -> SRV target, once resolved
    resolved: HashMap<String, String>,
    /// Lookup answers parked for an awaiting instance
    held: HashMap<String, Vec<ResourceRecord>>,
    delivered: HashSet<(String, Ipv4Addr)>,
}

impl ResolutionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ServiceFound`: starts a new resolution cycle for the instance
    pub fn found(&mut self, fullname: &str) -> TransportEvent {
        let label = instance_label(fullname);
        self.forget(&label);
        self.awaiting.insert(label);
        TransportEvent::ServiceInstanceDiscovered(fullname.to_string())
    }

    /// `ServiceResolved`: the SRV/TXT/A batch, followed by any parked lookup
    /// answers when the batch itself had no address.
    pub fn resolved(&mut self, fullname: &str, records: Vec<ResourceRecord>) -> Vec<TransportEvent> {
        let label = instance_label(fullname);
        self.awaiting.remove(&label);

        let target = records.iter().find_map(|record| match record {
            ResourceRecord::Srv { target, .. } => Some(normalize(target)),
            _ => None,
        });
        self.resolved.insert(label.clone(), target.unwrap_or_default());

        let has_address = records.iter().any(|r| r.record_type() == RecordType::A);
        let held = self.held.remove(&label).unwrap_or_default();

        let mut batches = vec![self.fresh(records)];
        if !has_address {
            batches.push(self.fresh(held));
        }
        batches
            .into_iter()
            .filter(|batch| !batch.is_empty())
            .map(TransportEvent::AnswersReceived)
            .collect()
    }

    /// `AddressesFound` from a hostname lookup
    pub fn addresses(&mut self, host: &str, records: Vec<ResourceRecord>) -> Option<TransportEvent> {
        let label = normalize(leading_label(host));

        if self.resolved.contains_key(&label) {
            // The browse already reported this host with its instance
            tracing::trace!("Address of {} already known from its instance", host);
            return None;
        }
        if self.awaiting.contains(&label) {
            tracing::trace!("Holding address of {} until its instance resolves", host);
            self.held.entry(label).or_default().extend(records);
            return None;
        }

        let records = self.fresh(records);
        (!records.is_empty()).then_some(TransportEvent::AnswersReceived(records))
    }

    /// `ServiceRemoved`: the next announcement starts from scratch
    pub fn removed(&mut self, fullname: &str) -> TransportEvent {
        self.forget(&instance_label(fullname));
        TransportEvent::ServiceInstanceShutdown(fullname.to_string())
    }

    fn forget(&mut self, label: &str) {
        self.awaiting.remove(label);
        self.held.remove(label);
        let target = self.resolved.remove(label).unwrap_or_default();
        self.delivered
            .retain(|(host, _)| leading_label(host) != label && *host != target);
    }

    /// Drops address records that were already forwarded
    fn fresh(&mut self, records: Vec<ResourceRecord>) -> Vec<ResourceRecord> {
        records
            .into_iter()
            .filter(|record| match record {
                ResourceRecord::A { name, address } => self.delivered.insert((normalize(name), *address)),
                _ => true,
            })
            .collect()
    }
}

fn instance_label(fullname: &str) -> String {
    normalize(leading_label(fullname))
}
