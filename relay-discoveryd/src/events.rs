//! Outbound notifications for the UI / board-matching side.
//!
//! Every subscriber gets its own unbounded channel, so no listener code runs
//! while the engine lock is held and each listener sees the whole stream.
//! Each queue is FIFO, so a `DeviceLost` for a device is always observed after
//! the `DeviceDiscovered` that preceded it. Events emitted while nobody is
//! subscribed are dropped, and a subscriber is forgotten once its receiver
//! is gone.

use std::sync::Arc;
use chrono::Local;
use parking_lot::Mutex;
use shared::types::DiscoveredDevice;

#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    DeviceDiscovered(DiscoveredDevice),
    DeviceLost(DiscoveredDevice),
    /// Human-readable progress line, prefixed with local `[HH:MM:SS]`
    Log(String),
}

#[derive(Clone, Default)]
pub struct EventSink {
    subscribers: Arc<Mutex<Vec<flume::Sender<DiscoveryEvent>>>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink with one subscriber already attached
    pub fn channel() -> (Self, flume::Receiver<DiscoveryEvent>) {
        let sink = Self::new();
        let rx = sink.subscribe();
        (sink, rx)
    }

    /// New receiver that sees every event emitted from now on
    pub fn subscribe(&self) -> flume::Receiver<DiscoveryEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn discovered(&self, device: DiscoveredDevice) {
        self.emit(DiscoveryEvent::DeviceDiscovered(device));
    }

    pub fn lost(&self, device: DiscoveredDevice) {
        self.emit(DiscoveryEvent::DeviceLost(device));
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{}", message);
        self.emit(DiscoveryEvent::Log(stamp(message)));
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!("{}", message);
        self.emit(DiscoveryEvent::Log(stamp(message)));
    }

    fn emit(&self, event: DiscoveryEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn stamp(message: &str) -> String {
    format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_lines_are_timestamped() {
        let (sink, rx) = EventSink::channel();
        sink.info("Discovery stopped");

        match rx.try_recv().unwrap() {
            DiscoveryEvent::Log(line) => {
                // "[HH:MM:SS] " prefix
                assert_eq!(&line[0..1], "[");
                assert_eq!(&line[9..11], "] ");
                assert!(line.ends_with("Discovery stopped"));
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_events_keep_emission_order() {
        let (sink, rx) = EventSink::channel();
        let device = DiscoveredDevice::new("tasmota-ab12", "tasmota-ab12.local");

        sink.discovered(device.clone());
        sink.lost(device.clone());
        sink.discovered(device.clone());

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                DiscoveryEvent::DeviceDiscovered(device.clone()),
                DiscoveryEvent::DeviceLost(device.clone()),
                DiscoveryEvent::DeviceDiscovered(device),
            ]
        );
    }

    #[test]
    fn test_every_subscriber_sees_every_event() {
        let (sink, ui) = EventSink::channel();
        let matcher = sink.subscribe();
        let device = DiscoveredDevice::new("tasmota-ab12", "tasmota-ab12.local");

        sink.discovered(device.clone());

        let expected = vec![DiscoveryEvent::DeviceDiscovered(device)];
        assert_eq!(ui.try_iter().collect::<Vec<_>>(), expected);
        assert_eq!(matcher.try_iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_dropped_subscriber_is_forgotten() {
        let (sink, rx) = EventSink::channel();
        let other = sink.subscribe();
        assert_eq!(sink.subscriber_count(), 2);

        drop(rx);
        sink.info("Discovery stopped");

        assert_eq!(sink.subscriber_count(), 1);
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn test_no_subscribers_retains_nothing() {
        let sink = EventSink::new();
        for _ in 0..100 {
            sink.info("Found relay device: tasmota-ab12");
        }

        let late = sink.subscribe();
        assert!(late.is_empty());
    }
}
