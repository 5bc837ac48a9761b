// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Discovered device bookkeeping.

use bluer::Address;
use chrono::{DateTime, Local};

/// A remote device seen during discovery or listed as paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub address: Address,
    pub name: Option<String>,
    pub discovered_at: DateTime<Local>,
}

impl DeviceRecord {
    pub fn new(address: Address, name: Option<String>) -> Self {
        Self {
            address,
            name,
            discovered_at: Local::now(),
        }
    }

    /// Name for display, falling back to the address.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.address.to_string())
    }
}

/// Devices found since discovery started, in order of first sighting.
#[derive(Debug, Default)]
pub struct DiscoveredSet {
    devices: Vec<DeviceRecord>,
}

impl DiscoveredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device. Returns `true` when the address was not known yet.
    ///
    /// A later sighting of a known address only fills in a missing name.
    pub fn insert(&mut self, device: DeviceRecord) -> bool {
        match self.devices.iter_mut().find(|d| d.address == device.address) {
            Some(known) => {
                if known.name.is_none() && device.name.is_some() {
                    known.name = device.name;
                }
                false
            }
            None => {
                self.devices.push(device);
                true
            }
        }
    }

    pub fn get(&self, address: Address) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.address == address)
    }

    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.devices.clone()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }
}
