// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server-wide inspector translation table: maps a global `itl_index`
//! cookie to `{owning_client, client_local_inspector_id, server_private_handle}`.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::auth;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItlEntry {
    pub owning_client: usize,
    pub client_local_inspector_id: u32,
    pub server_private_handle: u32,
}

/// Every live client-visible inspector has exactly one entry here and
/// exactly one matching entry in the owning client's handle map.
#[derive(Debug, Default)]
pub struct InspectorTable {
    slots: Mutex<HashMap<u32, ItlEntry>>,
}

impl InspectorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh slot for a just-opened inspector.
    pub fn allocate(&self, owning_client: usize, server_private_handle: u32) -> Result<u32> {
        let mut slots = self.slots.lock();
        loop {
            let candidate = auth::generate_handle()?;
            if let std::collections::hash_map::Entry::Vacant(entry) = slots.entry(candidate) {
                entry.insert(ItlEntry {
                    owning_client,
                    client_local_inspector_id: 0,
                    server_private_handle,
                });
                return Ok(candidate);
            }
        }
    }

    /// Record the analyzer-assigned numeric id for a slot (the `SetId`
    /// interception step).
    pub fn set_id(&self, itl_index: u32, client_local_inspector_id: u32) {
        if let Some(entry) = self.slots.lock().get_mut(&itl_index) {
            entry.client_local_inspector_id = client_local_inspector_id;
        }
    }

    pub fn get(&self, itl_index: u32) -> Option<ItlEntry> {
        self.slots.lock().get(&itl_index).copied()
    }

    pub fn free(&self, itl_index: u32) -> Option<ItlEntry> {
        self.slots.lock().remove(&itl_index)
    }

    /// Every slot owned by `client`, used when kicking it to synthesize
    /// `Close` requests for each live handle.
    pub fn slots_for_client(&self, client: usize) -> Vec<(u32, ItlEntry)> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, entry)| entry.owning_client == client)
            .map(|(itl_index, entry)| (*itl_index, *entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_set_id_then_free_round_trips() {
        let table = InspectorTable::new();
        let itl_index = table.allocate(7, 100).unwrap();
        table.set_id(itl_index, 42);
        let entry = table.get(itl_index).unwrap();
        assert_eq!(entry.owning_client, 7);
        assert_eq!(entry.client_local_inspector_id, 42);
        assert_eq!(table.free(itl_index), Some(entry));
        assert!(table.get(itl_index).is_none());
    }

    #[test]
    fn slots_for_client_only_returns_that_clients_entries() {
        let table = InspectorTable::new();
        let a = table.allocate(1, 10).unwrap();
        let _b = table.allocate(2, 20).unwrap();
        let slots = table.slots_for_client(1);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].0, a);
    }
}
