use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::model::{Device, DeviceId, DiscoveryEvent};
use crate::online::DevicePresence;

#[derive(Debug, Clone)]
struct DeviceEntry {
    device: Device,
    presence: DevicePresence,
}

/// Set of receivers currently reachable.
///
/// Pure bookkeeping: callers (see `DiscoverySink`) decide when to broadcast
/// the `DiscoveryEvent`s returned by the mutating methods.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, DeviceEntry>,
}

#[derive(Debug, Clone)]
pub enum DeviceUpdate {
    Online { device: Device, max_age: Duration },
    Offline(DeviceId),
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub fn get(&self, id: &DeviceId) -> Option<Device> {
        self.devices.get(id).map(|entry| entry.device.clone())
    }

    /// Devices sorted by friendly name, the order a picker shows them in.
    pub fn list_devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self
            .devices
            .values()
            .map(|entry| entry.device.clone())
            .collect();
        devices.sort_by(|a, b| {
            a.friendly_name
                .to_lowercase()
                .cmp(&b.friendly_name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        devices
    }

    /// Records an announcement. Returns `true` when the device is new.
    ///
    /// A known device only gets its presence refreshed and its description
    /// updated (a receiver can be renamed or change address).
    pub fn push_device(&mut self, device: Device, max_age: Duration, now: Instant) -> bool {
        if let Some(existing) = self.devices.get_mut(&device.id) {
            existing.presence.has_been_seen(now, max_age);
            existing.device = device;
            false
        } else {
            self.devices.insert(
                device.id.clone(),
                DeviceEntry {
                    device,
                    presence: DevicePresence::seen_at(now, max_age),
                },
            );
            true
        }
    }

    pub fn remove_device(&mut self, id: &DeviceId) -> Option<Device> {
        self.devices.remove(id).map(|entry| entry.device)
    }

    pub fn apply_update(&mut self, update: DeviceUpdate, now: Instant) -> Option<DiscoveryEvent> {
        match update {
            DeviceUpdate::Online { device, max_age } => {
                let appeared = device.clone();
                self.push_device(device, max_age, now)
                    .then_some(DiscoveryEvent::DeviceAppeared(appeared))
            }
            DeviceUpdate::Offline(id) => self
                .remove_device(&id)
                .map(DiscoveryEvent::DeviceDisappeared),
        }
    }

    /// Removes every device whose announcement outlived its max age.
    pub fn expire_stale(&mut self, now: Instant) -> Vec<Device> {
        let expired: Vec<DeviceId> = self
            .devices
            .iter()
            .filter(|(_, entry)| entry.presence.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                debug!(device = %id, "Device announcement expired");
                self.remove_device(&id)
            })
            .collect()
    }

    /// Empties the registry, returning what it held.
    pub fn drain(&mut self) -> Vec<Device> {
        self.devices.drain().map(|(_, entry)| entry.device).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGE: Duration = Duration::from_secs(60);

    fn device(id: &str, name: &str) -> Device {
        Device::new(id, name, "10.0.0.2", 8009)
    }

    #[test]
    fn test_push_reports_new_devices_once() {
        let mut registry = DeviceRegistry::new();
        let now = Instant::now();

        assert!(registry.push_device(device("a", "Salon"), AGE, now));
        assert!(!registry.push_device(device("a", "Salon TV"), AGE, now));

        assert_eq!(registry.len(), 1);
        let stored = registry.get(&DeviceId("a".into())).unwrap();
        assert_eq!(stored.friendly_name, "Salon TV");
    }

    #[test]
    fn test_online_then_offline_updates() {
        let mut registry = DeviceRegistry::new();
        let now = Instant::now();
        let d = device("d", "Bureau");

        let appeared = registry.apply_update(
            DeviceUpdate::Online {
                device: d.clone(),
                max_age: AGE,
            },
            now,
        );
        assert_eq!(appeared, Some(DiscoveryEvent::DeviceAppeared(d.clone())));
        assert!(registry.list_devices().contains(&d));

        let gone = registry.apply_update(DeviceUpdate::Offline(d.id.clone()), now);
        assert_eq!(gone, Some(DiscoveryEvent::DeviceDisappeared(d.clone())));
        assert!(!registry.list_devices().contains(&d));

        // Offline for an unknown device is ignored.
        assert_eq!(
            registry.apply_update(DeviceUpdate::Offline(d.id.clone()), now),
            None
        );
    }

    #[test]
    fn test_list_is_sorted_by_name() {
        let mut registry = DeviceRegistry::new();
        let now = Instant::now();
        registry.push_device(device("1", "salon"), AGE, now);
        registry.push_device(device("2", "Bureau"), AGE, now);
        registry.push_device(device("3", "cuisine"), AGE, now);

        let names: Vec<String> = registry
            .list_devices()
            .into_iter()
            .map(|d| d.friendly_name)
            .collect();
        assert_eq!(names, vec!["Bureau", "cuisine", "salon"]);
    }

    #[test]
    fn test_expire_stale_only_removes_old_entries() {
        let mut registry = DeviceRegistry::new();
        let start = Instant::now();
        registry.push_device(device("old", "Old"), Duration::from_secs(5), start);
        registry.push_device(device("fresh", "Fresh"), Duration::from_secs(50), start);

        let expired = registry.expire_stale(start + Duration::from_secs(10));

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, DeviceId("old".into()));
        assert!(registry.contains(&DeviceId("fresh".into())));
    }

    #[test]
    fn test_drain_empties_registry() {
        let mut registry = DeviceRegistry::new();
        let now = Instant::now();
        registry.push_device(device("a", "A"), AGE, now);
        registry.push_device(device("b", "B"), AGE, now);

        assert_eq!(registry.drain().len(), 2);
        assert!(registry.is_empty());
    }
}
