// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One discovery transport: a `current`/`next` pair of device-property
//! lists behind a mutex, advancing its own epoch on every accepted scan.

use parking_lot::Mutex;

use crate::device::spec::DeviceProperties;

/// String tag naming a discovery kind, matching the closed set the reference
/// registers (`"local"`, `"multicast"`). Kept as a newtype rather than a
/// bare `&'static str` so callers can't accidentally compare against an
/// unregistered literal without going through [`Discovery::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryKind {
    Local,
    Multicast,
}

impl DiscoveryKind {
    pub fn name(self) -> &'static str {
        match self {
            DiscoveryKind::Local => "local",
            DiscoveryKind::Multicast => "multicast",
        }
    }
}

#[derive(Debug, Default)]
struct DiscoveryState {
    current: Vec<DeviceProperties>,
    next: Vec<DeviceProperties>,
    epoch: u64,
}

/// One registered discovery transport.
///
/// `scan` stages into `next`; `accept` atomically swaps `next` into
/// `current` and bumps the epoch; `discard` abandons an in-progress scan;
/// `clear` empties `current` (e.g. on transport shutdown). A new scan must
/// not start while `next` is still non-empty from a prior one.
#[derive(Debug)]
pub struct Discovery {
    kind: DiscoveryKind,
    state: Mutex<DiscoveryState>,
}

impl Discovery {
    pub fn new(kind: DiscoveryKind) -> Self {
        Self {
            kind,
            state: Mutex::new(DiscoveryState::default()),
        }
    }

    pub fn kind(&self) -> DiscoveryKind {
        self.kind
    }

    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Stage `devices` into the `next` list. Returns `false` without
    /// staging anything if a scan is already in progress.
    pub fn scan(&self, devices: Vec<DeviceProperties>) -> bool {
        let mut state = self.state.lock();
        if !state.next.is_empty() {
            log::debug!("discovery[{}]: scan already in progress, ignoring", self.kind.name());
            return false;
        }
        state.next = devices;
        true
    }

    /// Swap `next` into `current`, bump the epoch, and return the new
    /// current list. Each accepted property is stamped with the
    /// pre-increment epoch, so a device merged right after this call
    /// trails the discovery's own epoch by exactly one and the facade's
    /// staleness check (`entry.epoch + 1 == discovery.epoch()`) holds.
    pub fn accept(&self) -> Vec<DeviceProperties> {
        let mut state = self.state.lock();
        let epoch = state.epoch;
        state.epoch += 1;
        let mut accepted = std::mem::take(&mut state.next);
        for props in &mut accepted {
            props.epoch = epoch;
        }
        state.current = accepted.clone();
        accepted
    }

    /// Abandon a staged scan without advancing the epoch.
    pub fn discard(&self) {
        self.state.lock().next.clear();
    }

    /// Drop the current list, e.g. the transport going offline.
    pub fn clear(&self) {
        self.state.lock().current.clear();
    }

    pub fn current(&self) -> Vec<DeviceProperties> {
        self.state.lock().current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_swaps_next_into_current_and_bumps_epoch() {
        let discovery = Discovery::new(DiscoveryKind::Local);
        assert_eq!(discovery.epoch(), 0);
        discovery.scan(vec![DeviceProperties::new("rtl0")]);
        let accepted = discovery.accept();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].epoch, 0);
        assert_eq!(discovery.epoch(), 1);
        assert_eq!(discovery.current().len(), 1);
    }

    #[test]
    fn scan_refuses_to_overwrite_a_pending_scan() {
        let discovery = Discovery::new(DiscoveryKind::Local);
        assert!(discovery.scan(vec![DeviceProperties::new("a")]));
        assert!(!discovery.scan(vec![DeviceProperties::new("b")]));
        let accepted = discovery.accept();
        assert_eq!(accepted[0].label, "a");
    }

    #[test]
    fn discard_abandons_a_staged_scan() {
        let discovery = Discovery::new(DiscoveryKind::Local);
        discovery.scan(vec![DeviceProperties::new("a")]);
        discovery.discard();
        assert!(discovery.scan(vec![DeviceProperties::new("b")]));
    }

    #[test]
    fn clear_empties_current_without_touching_epoch() {
        let discovery = Discovery::new(DiscoveryKind::Local);
        discovery.scan(vec![DeviceProperties::new("a")]);
        discovery.accept();
        discovery.clear();
        assert!(discovery.current().is_empty());
        assert_eq!(discovery.epoch(), 1);
    }
}
