// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! [`DeviceSpec`]: identifies a logical device independently of whether it
//! is currently reachable, plus [`GainDescriptor`]/[`DeviceProperties`]
//! describing one that is.

use std::collections::BTreeMap;

use crate::device::uuid::device_uuid;

/// Identifies a logical device. Its [`DeviceSpec::uuid`] is a pure function
/// of `(analyzer, source, traits)` — changing a trait changes identity;
/// changing a parameter does not.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSpec {
    pub analyzer: String,
    pub source: String,
    pub traits: BTreeMap<String, String>,
    pub parameters: BTreeMap<String, String>,
    uuid: u64,
}

impl DeviceSpec {
    pub fn new(analyzer: impl Into<String>, source: impl Into<String>, traits: BTreeMap<String, String>) -> Self {
        let analyzer = analyzer.into();
        let source = source.into();
        let uuid = device_uuid(&analyzer, &source, &traits);
        Self {
            analyzer,
            source,
            traits,
            parameters: BTreeMap::new(),
            uuid,
        }
    }

    pub fn uuid(&self) -> u64 {
        self.uuid
    }

    /// Recompute the UUID after mutating `traits` directly.
    pub fn refresh_uuid(&mut self) {
        self.uuid = device_uuid(&self.analyzer, &self.source, &self.traits);
    }
}

/// One tunable gain stage: name plus its admissible range and default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainDescriptor {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

impl GainDescriptor {
    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }
}

/// Current operational description of a discovered device.
///
/// `epoch` is assigned by the [`crate::device::discovery::Discovery`] that
/// produced this snapshot; [`crate::device::facade::DeviceFacade`] compares
/// it against the owning discovery's current epoch to decide staleness.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProperties {
    pub label: String,
    pub antennas: Vec<String>,
    pub gains: BTreeMap<String, GainDescriptor>,
    pub sample_rates: Vec<f64>,
    pub freq_range: (f64, f64),
    pub channel_count: u32,
    pub epoch: u64,
}

impl DeviceProperties {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            antennas: Vec::new(),
            gains: BTreeMap::new(),
            sample_rates: Vec::new(),
            freq_range: (0.0, 0.0),
            channel_count: 1,
            epoch: 0,
        }
    }
}
