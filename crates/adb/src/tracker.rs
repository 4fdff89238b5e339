//! Device connect/disconnect tracking.
//!
//! Polls `adb devices` on an interval and emits the difference against
//! the previous snapshot as events, so the explorer can react to cables
//! being plugged and unplugged without re-listing itself.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::AdbClient;
use crate::devices::{Device, DeviceState};

/// A change in the set of connected devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected(Device),
    Disconnected(Device),
    StateChanged {
        device: Device,
        previous: DeviceState,
    },
}

/// Polls the adb server and reports device comings and goings.
pub struct DeviceTracker {
    client: Arc<AdbClient>,
    events_tx: mpsc::Sender<DeviceEvent>,
    events_rx: Option<mpsc::Receiver<DeviceEvent>>,
    interval: Duration,
}

impl DeviceTracker {
    pub fn new(client: Arc<AdbClient>, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(16);
        Self {
            client,
            events_tx: tx,
            events_rx: Some(rx),
            interval,
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<DeviceEvent>> {
        self.events_rx.take()
    }

    /// Polls until `cancel` fires. Listing failures are logged and the
    /// previous snapshot kept; a dead adb server is not a stream of
    /// disconnects.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut known: HashMap<String, Device> = HashMap::new();
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.client.list_devices().await {
                        Ok(devices) => {
                            for event in diff_devices(&mut known, devices) {
                                match &event {
                                    DeviceEvent::Connected(d) => {
                                        info!(serial = %d.serial, "device connected");
                                    }
                                    DeviceEvent::Disconnected(d) => {
                                        info!(serial = %d.serial, "device disconnected");
                                    }
                                    DeviceEvent::StateChanged { device, .. } => {
                                        debug!(serial = %device.serial, state = ?device.state, "device state changed");
                                    }
                                }
                                let _ = self.events_tx.send(event).await;
                            }
                        }
                        Err(e) => {
                            debug!(error = %e, "device listing failed");
                        }
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    }
}

/// Updates `known` to the new listing and returns the events describing
/// the change.
fn diff_devices(known: &mut HashMap<String, Device>, current: Vec<Device>) -> Vec<DeviceEvent> {
    let mut events = Vec::new();

    for device in &current {
        match known.get(&device.serial) {
            None => events.push(DeviceEvent::Connected(device.clone())),
            Some(previous) if previous.state != device.state => {
                events.push(DeviceEvent::StateChanged {
                    device: device.clone(),
                    previous: previous.state.clone(),
                });
            }
            Some(_) => {}
        }
    }

    let current_serials: HashSet<&str> = current.iter().map(|d| d.serial.as_str()).collect();
    for (serial, device) in known.iter() {
        if !current_serials.contains(serial.as_str()) {
            events.push(DeviceEvent::Disconnected(device.clone()));
        }
    }

    known.clear();
    for device in current {
        known.insert(device.serial.clone(), device);
    }
    events
}
