// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide registry of discovered devices, merged in by UUID from
//! every registered [`Discovery`] and filtered for staleness on read.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::device::discovery::{Discovery, DiscoveryKind};
use crate::device::spec::DeviceProperties;

#[derive(Debug, Clone)]
struct Entry {
    properties: DeviceProperties,
    discovery: DiscoveryKind,
}

#[derive(Debug, Default)]
struct Registry {
    by_uuid: BTreeMap<u64, Entry>,
}

/// Wakes [`DeviceFacade::wait_for_devices`] callers whenever any discovery
/// worker finishes merging a scan; carries the name of that discovery so a
/// waiting caller can tell which transport just refreshed.
#[derive(Debug, Default)]
struct MergeSignal {
    last_merged: Mutex<Option<&'static str>>,
    condvar: Condvar,
}

/// Process-wide singleton gathering devices from every registered
/// [`Discovery`] into one UUID-keyed registry.
///
/// Construct once via [`DeviceFacade::new`] and share behind an `Arc`; the
/// reference implementation models this as a lazily-initialized global, but
/// the Rust port leaves ownership to the caller (typically stashed once in
/// the server supervisor or client runtime) rather than hiding a `OnceLock`
/// behind the API.
#[derive(Debug, Default)]
pub struct DeviceFacade {
    registry: Mutex<Registry>,
    discoveries: Mutex<Vec<Arc<Discovery>>>,
    signal: MergeSignal,
}

impl DeviceFacade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register known discovery kinds (local SDR enumeration, multicast
    /// announcements). Each caller is expected to spawn one worker thread
    /// per returned handle that periodically calls `scan`/`accept` and then
    /// [`DeviceFacade::merge`].
    pub fn register_discovery(&self, kind: DiscoveryKind) -> Arc<Discovery> {
        let discovery = Arc::new(Discovery::new(kind));
        self.discoveries.lock().push(discovery.clone());
        discovery
    }

    pub fn discoveries(&self) -> Vec<Arc<Discovery>> {
        self.discoveries.lock().clone()
    }

    /// Merge one discovery's freshly-accepted device list into the
    /// registry. Existing UUIDs have their properties swapped in place
    /// (preserving the entry's position for anything holding a UUID
    /// reference); unseen UUIDs are inserted.
    pub fn merge(&self, discovery: &Discovery, devices: impl IntoIterator<Item = (u64, DeviceProperties)>) {
        {
            let mut registry = self.registry.lock();
            for (uuid, properties) in devices {
                registry
                    .by_uuid
                    .entry(uuid)
                    .and_modify(|entry| entry.properties = properties.clone())
                    .or_insert(Entry {
                        properties,
                        discovery: discovery.kind(),
                    });
            }
        }
        *self.signal.last_merged.lock() = Some(discovery.kind().name());
        self.signal.condvar.notify_all();
    }

    /// All devices considered current: `device.epoch + 1 == discovery.epoch`.
    /// A device not re-seen in the discovery's latest scan is excluded.
    pub fn current_devices(&self) -> Vec<DeviceProperties> {
        let registry = self.registry.lock();
        let discoveries = self.discoveries.lock();
        registry
            .by_uuid
            .values()
            .filter(|entry| {
                discoveries
                    .iter()
                    .find(|d| d.kind() == entry.discovery)
                    .is_some_and(|d| entry.properties.epoch + 1 == d.epoch())
            })
            .map(|entry| entry.properties.clone())
            .collect()
    }

    pub fn get(&self, uuid: u64) -> Option<DeviceProperties> {
        self.registry.lock().by_uuid.get(&uuid).map(|e| e.properties.clone())
    }

    /// Block until any discovery merges, or `timeout` elapses. Returns the
    /// name of the discovery that just merged, or `None` on timeout.
    pub fn wait_for_devices(&self, timeout: Duration) -> Option<&'static str> {
        let mut last = self.signal.last_merged.lock();
        *last = None;
        let result = self.signal.condvar.wait_for(&mut last, timeout);
        if result.timed_out() {
            None
        } else {
            *last
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_inserts_new_and_updates_existing_by_uuid() {
        let facade = DeviceFacade::new();
        let discovery = facade.register_discovery(DiscoveryKind::Local);
        discovery.scan(vec![DeviceProperties::new("rtl0")]);
        let accepted = discovery.accept();
        facade.merge(&discovery, vec![(1, accepted[0].clone())]);
        assert_eq!(facade.get(1).unwrap().label, "rtl0");

        discovery.scan(vec![DeviceProperties::new("rtl0-renamed")]);
        let accepted = discovery.accept();
        facade.merge(&discovery, vec![(1, accepted[0].clone())]);
        assert_eq!(facade.get(1).unwrap().label, "rtl0-renamed");
    }

    #[test]
    fn current_devices_excludes_stale_entries() {
        let facade = DeviceFacade::new();
        let discovery = facade.register_discovery(DiscoveryKind::Local);
        discovery.scan(vec![DeviceProperties::new("a")]);
        let accepted = discovery.accept();
        facade.merge(&discovery, vec![(1, accepted[0].clone())]);
        assert_eq!(facade.current_devices().len(), 1);

        // Another scan cycle runs without re-reporting device 1: its epoch
        // now lags discovery.epoch() by more than one.
        discovery.scan(vec![]);
        discovery.accept();
        assert!(facade.current_devices().is_empty());
    }

    #[test]
    fn wait_for_devices_times_out_with_no_activity() {
        let facade = DeviceFacade::new();
        assert_eq!(facade.wait_for_devices(Duration::from_millis(10)), None);
    }

    #[test]
    fn wait_for_devices_does_not_remember_a_merge_that_happened_before_the_wait() {
        let facade = DeviceFacade::new();
        let discovery = facade.register_discovery(DiscoveryKind::Multicast);
        discovery.scan(vec![]);
        discovery.accept();
        facade.merge(&discovery, std::iter::empty());
        // The condvar only wakes waiters that were already blocked; a merge
        // completed before `wait_for_devices` is called still times out.
        assert_eq!(facade.wait_for_devices(Duration::from_millis(10)), None);
    }
}
