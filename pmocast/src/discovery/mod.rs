//! Receiver discovery.
//!
//! A [`DiscoveryBackend`] finds receivers on the network and reports them to a
//! [`DiscoverySink`]. The sink keeps the [`DeviceRegistry`] and the
//! [`DiscoveryEvent`] bus consistent with each other: every mutation is
//! broadcast while the registry write lock is still held, so a snapshot taken
//! by a subscriber never runs ahead of or behind the events it has received.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::errors::CastError;
use crate::events::EventBus;
use crate::model::{Device, DeviceId, DiscoveryEvent, DiscoveryFilter, ScanMode};
use crate::registry::{DeviceRegistry, DeviceUpdate};

pub mod chromecast_discovery;

pub use chromecast_discovery::MdnsDiscoveryBackend;

/// Source of device announcements.
///
/// Implementations run their own thread(s) and report through the sink
/// they were started with.
pub trait DiscoveryBackend: Send {
    fn start(
        &mut self,
        filter: &DiscoveryFilter,
        mode: ScanMode,
        sink: DiscoverySink,
    ) -> Result<(), CastError>;

    fn set_mode(&mut self, mode: ScanMode);

    fn stop(&mut self);
}

/// Write side of the registry handed to discovery backends.
#[derive(Clone)]
pub struct DiscoverySink {
    registry: Arc<RwLock<DeviceRegistry>>,
    events: EventBus<DiscoveryEvent>,
}

impl DiscoverySink {
    fn apply(&self, update: DeviceUpdate) {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(event) = registry.apply_update(update, Instant::now()) {
            match &event {
                DiscoveryEvent::DeviceAppeared(device) => {
                    info!(device = %device.id, name = %device.friendly_name, "Cast receiver detected");
                }
                DiscoveryEvent::DeviceDisappeared(device) => {
                    info!(device = %device.id, name = %device.friendly_name, "Cast receiver has gone offline");
                }
            }
            self.events.broadcast(event);
        }
    }

    pub fn device_online(&self, device: Device, max_age: Duration) {
        self.apply(DeviceUpdate::Online { device, max_age });
    }

    pub fn device_offline(&self, id: &DeviceId) {
        self.apply(DeviceUpdate::Offline(id.clone()));
    }

    pub fn expire_stale(&self, now: Instant) {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for device in registry.expire_stale(now) {
            info!(device = %device.id, name = %device.friendly_name, "Cast receiver announcement expired");
            self.events.broadcast(DiscoveryEvent::DeviceDisappeared(device));
        }
    }

    fn clear(&self) {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for device in registry.drain() {
            self.events.broadcast(DiscoveryEvent::DeviceDisappeared(device));
        }
    }
}

/// Owns the registry, its event bus and the discovery backend.
pub struct DeviceScanner {
    registry: Arc<RwLock<DeviceRegistry>>,
    events: EventBus<DiscoveryEvent>,
    backend: Box<dyn DiscoveryBackend>,
    mode: ScanMode,
    filter: Option<DiscoveryFilter>,
}

impl DeviceScanner {
    pub fn new(backend: Box<dyn DiscoveryBackend>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(DeviceRegistry::new())),
            events: EventBus::new(),
            backend,
            mode: ScanMode::Passive,
            filter: None,
        }
    }

    pub fn subscribe(&self) -> Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    /// A sink feeding this scanner's registry, for backends driven from outside.
    pub fn sink(&self) -> DiscoverySink {
        DiscoverySink {
            registry: Arc::clone(&self.registry),
            events: self.events.clone(),
        }
    }

    pub fn registry(&self) -> Arc<RwLock<DeviceRegistry>> {
        Arc::clone(&self.registry)
    }

    pub fn is_scanning(&self) -> bool {
        self.filter.is_some()
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Starts scanning in the current mode. Restarts the backend when a scan
    /// is already running with a different filter.
    pub fn start_discovery(&mut self, filter: DiscoveryFilter) -> Result<(), CastError> {
        if self.filter.as_ref() == Some(&filter) {
            debug!(app_id = %filter.receiver_app_id, "Discovery already running");
            return Ok(());
        }
        if self.filter.is_some() {
            self.backend.stop();
        }

        info!(app_id = %filter.receiver_app_id, mode = ?self.mode, "Starting receiver discovery");
        self.backend.start(&filter, self.mode, self.sink())?;
        self.filter = Some(filter);
        Ok(())
    }

    /// Stops scanning; every known device disappears.
    pub fn stop_discovery(&mut self) {
        if self.filter.take().is_none() {
            return;
        }
        info!("Stopping receiver discovery");
        self.backend.stop();
        self.sink().clear();
    }

    /// Switches between passive and active scanning. Known devices stay.
    pub fn set_mode(&mut self, mode: ScanMode) {
        if self.mode == mode {
            return;
        }
        debug!(from = ?self.mode, to = ?mode, "Switching scan mode");
        self.mode = mode;
        if self.filter.is_some() {
            self.backend.set_mode(mode);
        }
    }

    pub fn devices(&self) -> Vec<Device> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .list_devices()
    }
}

impl Drop for DeviceScanner {
    fn drop(&mut self) {
        if self.filter.is_some() {
            self.backend.stop();
        }
    }
}
