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

//! Application state management.

use parking_lot::RwLock;
use std::sync::Arc;

use bluer::Address;

use crate::bluetooth::{DeviceRecord, DiscoveryStatus, Sample};
use crate::color::Rgb;

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Error => "Error",
        }
    }
}

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Current connection status.
    pub connection_status: RwLock<ConnectionStatus>,

    /// Last discovery request outcome.
    pub discovery_status: RwLock<DiscoveryStatus>,

    /// Connected device.
    pub connected_device: RwLock<Option<DeviceRecord>>,

    /// Last text exchanged with the device.
    pub last_text: RwLock<Option<String>>,

    /// Most recently decoded sample.
    pub last_sample: RwLock<Option<Sample>>,

    /// Color chosen by the user, sent on request.
    pub selected_color: RwLock<Option<Rgb>>,

    /// Samples seen in this run.
    pub sample_count: RwLock<u64>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            connection_status: RwLock::new(ConnectionStatus::Disconnected),
            discovery_status: RwLock::new(DiscoveryStatus::Idle),
            connected_device: RwLock::new(None),
            last_text: RwLock::new(None),
            last_sample: RwLock::new(None),
            selected_color: RwLock::new(None),
            sample_count: RwLock::new(0),
        }
    }
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_connecting(&self) {
        *self.connection_status.write() = ConnectionStatus::Connecting;
    }

    pub fn set_connected(&self, device: DeviceRecord) {
        *self.connection_status.write() = ConnectionStatus::Connected;
        *self.connected_device.write() = Some(device);
    }

    pub fn set_disconnected(&self) {
        *self.connection_status.write() = ConnectionStatus::Disconnected;
        *self.connected_device.write() = None;
    }

    pub fn set_error(&self) {
        *self.connection_status.write() = ConnectionStatus::Error;
    }

    pub fn get_status(&self) -> ConnectionStatus {
        *self.connection_status.read()
    }

    pub fn get_device_name(&self) -> Option<String> {
        self.connected_device.read().as_ref().map(|d| d.display_name())
    }

    pub fn get_device_address(&self) -> Option<Address> {
        self.connected_device.read().as_ref().map(|d| d.address)
    }

    pub fn set_discovery_status(&self, status: DiscoveryStatus) {
        *self.discovery_status.write() = status;
    }

    pub fn get_discovery_status(&self) -> DiscoveryStatus {
        *self.discovery_status.read()
    }

    pub fn set_last_text(&self, text: String) {
        *self.last_text.write() = Some(text);
    }

    pub fn get_last_text(&self) -> Option<String> {
        self.last_text.read().clone()
    }

    pub fn set_last_sample(&self, sample: Sample) {
        *self.last_sample.write() = Some(sample);
        *self.sample_count.write() += 1;
    }

    pub fn get_last_sample(&self) -> Option<Sample> {
        *self.last_sample.read()
    }

    pub fn get_sample_count(&self) -> u64 {
        *self.sample_count.read()
    }

    pub fn set_selected_color(&self, color: Rgb) {
        *self.selected_color.write() = Some(color);
    }

    pub fn get_selected_color(&self) -> Option<Rgb> {
        *self.selected_color.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_lifecycle() {
        let state = AppState::new();
        assert_eq!(state.get_status(), ConnectionStatus::Disconnected);

        state.set_connecting();
        assert_eq!(state.get_status().as_str(), "Connecting...");

        let address = Address::new([1, 2, 3, 4, 5, 6]);
        state.set_connected(DeviceRecord::new(address, Some("Obol".to_string())));
        assert_eq!(state.get_device_name().as_deref(), Some("Obol"));
        assert_eq!(state.get_device_address(), Some(address));

        state.set_disconnected();
        assert_eq!(state.get_status(), ConnectionStatus::Disconnected);
        assert!(state.get_device_name().is_none());
    }

    #[test]
    fn test_sample_and_color() {
        let state = AppState::new();
        state.set_last_sample(Sample::new([1; 8]));
        state.set_last_sample(Sample::new([2; 8]));
        assert_eq!(state.get_sample_count(), 2);
        assert_eq!(state.get_last_sample(), Some(Sample::new([2; 8])));

        state.set_selected_color(Rgb::new(1, 2, 3));
        assert_eq!(state.get_selected_color(), Some(Rgb::new(1, 2, 3)));
    }
}
