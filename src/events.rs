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

//! Event processing and state updates.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::bluetooth::{ConnectionEvent, Sample};
use crate::state::AppState;

/// Applies connection events and samples to the application state.
pub struct EventProcessor {
    state: Arc<AppState>,
}

impl EventProcessor {
    /// Create a new event processor.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Process a single event.
    pub fn process_event(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::DeviceFound(device) => {
                debug!("Discovered {} ({})", device.display_name(), device.address);
            }
            ConnectionEvent::Connecting { device } => {
                info!("Connecting to {}", device.display_name());
                self.state.set_connecting();
            }
            ConnectionEvent::Connected { device } => {
                info!("Device connected: {}", device.display_name());
                self.state.set_connected(device.clone());
            }
            ConnectionEvent::ConnectFailed { device, reason } => {
                warn!("Connection to {} failed: {}", device.display_name(), reason);
                self.state.set_error();
            }
            ConnectionEvent::TextReceived(text) | ConnectionEvent::TextSent(text) => {
                self.state.set_last_text(text.clone());
            }
            ConnectionEvent::Disconnected { address } => {
                info!("Device disconnected: {}", address);
                // A newer session may already be up; only clear our own.
                if self.state.get_device_address() == Some(*address) {
                    self.state.set_disconnected();
                }
            }
            ConnectionEvent::Error(e) => {
                error!("Connection error: {}", e);
            }
        }
    }

    /// Record a decoded sample.
    pub fn process_sample(&self, sample: Sample) {
        debug!("Sample: {}", sample);
        self.state.set_last_sample(sample);
    }
}
