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

//! Discovery and session lifecycle.

use anyhow::Result;
use bluer::Address;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::connector::connect_with_fallback;
use super::discovery::{DeviceRecord, DiscoveredSet};
use super::framer::{RecordedFrameRequest, SampleFramer, SamplePublisher};
use super::protocol::Sample;
use super::radio::{BoxedStream, Capability, Radio};
use super::session::{ConnectionEvent, Session};
use crate::color::Rgb;
use crate::config::Config;

/// Result of a discovery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStatus {
    /// No Bluetooth support on this host.
    Unsupported,
    /// Bluetooth is present but switched off.
    Disabled,
    /// Discovery is running.
    Discovering,
    /// Discovery is not running.
    Idle,
}

impl DiscoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryStatus::Unsupported => "BLUETOOTH NOT SUPPORTED",
            DiscoveryStatus::Disabled => "BLUETOOTH DISABLED",
            DiscoveryStatus::Discovering => "DISCOVERING IN PROCESS",
            DiscoveryStatus::Idle => "IDLE",
        }
    }
}

/// In-flight connection attempt.
struct Attempt {
    id: u64,
    handle: JoinHandle<()>,
}

/// Attempt and session slots. Guarded by one lock so only one
/// connect-or-install runs at a time.
#[derive(Default)]
struct Slots {
    next_attempt: u64,
    attempt: Option<Attempt>,
    session: Option<Session>,
}

impl Slots {
    /// Abort the pending attempt, if any. Dropping its future closes any
    /// socket it had opened.
    fn cancel_attempt(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            debug!("Cancelling connection attempt {}", attempt.id);
            attempt.handle.abort();
        }
    }

    async fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }
}

/// Owns the radio, the discovered-device set and the single session.
#[derive(Clone)]
pub struct SessionManager {
    radio: Arc<dyn Radio>,
    config: Arc<Config>,
    discovered: Arc<parking_lot::Mutex<DiscoveredSet>>,
    discovery: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
    slots: Arc<Mutex<Slots>>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    publisher: SamplePublisher,
}

impl SessionManager {
    /// Create a manager.
    ///
    /// Connection events go to `event_tx`; accepted raw frames go to
    /// `frame_tx` when given.
    pub fn new(
        radio: Arc<dyn Radio>,
        config: Arc<Config>,
        event_tx: mpsc::Sender<ConnectionEvent>,
        frame_tx: Option<mpsc::Sender<RecordedFrameRequest>>,
    ) -> Self {
        let (sample_tx, _) = broadcast::channel(256);
        Self {
            radio,
            config,
            discovered: Arc::new(parking_lot::Mutex::new(DiscoveredSet::new())),
            discovery: Arc::new(parking_lot::Mutex::new(None)),
            slots: Arc::new(Mutex::new(Slots::default())),
            event_tx,
            publisher: SamplePublisher::new(sample_tx, frame_tx),
        }
    }

    /// Accepted frames the recorder had no room for.
    pub fn dropped_frames(&self) -> u64 {
        self.publisher.dropped_frames()
    }

    /// Subscribe to decoded samples from any session.
    pub fn subscribe_samples(&self) -> broadcast::Receiver<Sample> {
        self.publisher.subscribe()
    }

    /// Start device discovery.
    ///
    /// Unsupported or disabled Bluetooth is reported through the returned
    /// status and the platform discovery is not started.
    pub async fn start_discovery(&self) -> Result<DiscoveryStatus> {
        match self.radio.capability().await {
            Capability::Unsupported => {
                warn!("Bluetooth not supported, discovery not started");
                return Ok(DiscoveryStatus::Unsupported);
            }
            Capability::Disabled => {
                warn!("Bluetooth disabled, discovery not started");
                return Ok(DiscoveryStatus::Disabled);
            }
            Capability::Ready => {}
        }

        self.stop_discovery();
        let mut devices = self.radio.discover().await?;

        let discovered = self.discovered.clone();
        let event_tx = self.event_tx.clone();
        let task = tokio::spawn(async move {
            while let Some(device) = devices.next().await {
                let is_new = discovered.lock().insert(device.clone());
                if is_new {
                    info!("Device found: {} ({})", device.display_name(), device.address);
                    let _ = event_tx.send(ConnectionEvent::DeviceFound(device)).await;
                }
            }
            debug!("Discovery stream ended");
        });
        *self.discovery.lock() = Some(task);

        Ok(DiscoveryStatus::Discovering)
    }

    /// Stop device discovery. Safe to call when not discovering.
    pub fn stop_discovery(&self) {
        if let Some(task) = self.discovery.lock().take() {
            task.abort();
            info!("Discovery stopped");
        }
    }

    /// Whether a discovery task is running.
    pub fn is_discovering(&self) -> bool {
        self.discovery
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Devices found so far, in order of first sighting.
    pub fn discovered_devices(&self) -> Vec<DeviceRecord> {
        self.discovered.lock().snapshot()
    }

    /// Look up a discovered device.
    pub fn discovered_device(&self, address: Address) -> Option<DeviceRecord> {
        self.discovered.lock().get(address).cloned()
    }

    /// Devices bonded with the local adapter.
    pub async fn paired_devices(&self) -> Result<Vec<DeviceRecord>> {
        self.radio.paired_devices().await
    }

    /// Connect to a device, replacing any pending attempt and any session.
    pub async fn connect(&self, device: DeviceRecord) {
        info!("Connect to: {}", device.display_name());
        let mut slots = self.slots.lock().await;

        slots.cancel_attempt();
        slots.close_session().await;

        slots.next_attempt += 1;
        let id = slots.next_attempt;

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            manager.run_attempt(id, device).await;
        });
        slots.attempt = Some(Attempt { id, handle });
    }

    async fn run_attempt(&self, id: u64, device: DeviceRecord) {
        let _ = self
            .event_tx
            .send(ConnectionEvent::Connecting {
                device: device.clone(),
            })
            .await;

        match connect_with_fallback(self.radio.as_ref(), &device, &self.config.bluetooth).await {
            Ok(stream) => self.install(stream, device, Some(id)).await,
            Err(e) => {
                error!("Couldn't establish Bluetooth connection: {}", e);
                {
                    let mut slots = self.slots.lock().await;
                    if slots.attempt.as_ref().is_some_and(|a| a.id == id) {
                        slots.attempt = None;
                    }
                }
                let _ = self
                    .event_tx
                    .send(ConnectionEvent::ConnectFailed {
                        device,
                        reason: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Install an already connected stream as the active session.
    ///
    /// Any pending attempt is cancelled and any previous session closed.
    pub async fn on_connected(&self, stream: BoxedStream, device: DeviceRecord) {
        self.install(stream, device, None).await;
    }

    async fn install(&self, stream: BoxedStream, device: DeviceRecord, attempt: Option<u64>) {
        let mut slots = self.slots.lock().await;

        match attempt {
            Some(id) => match slots.attempt.as_ref() {
                // The attempt is finishing on its own task; just release the slot.
                Some(current) if current.id == id => slots.attempt = None,
                _ => {
                    info!("Attempt {} was superseded, dropping its stream", id);
                    return;
                }
            },
            None => slots.cancel_attempt(),
        }

        slots.close_session().await;

        let framer = SampleFramer::with_config(&self.config.framer);
        let session = Session::start(
            stream,
            device.clone(),
            framer,
            self.publisher.clone(),
            self.event_tx.clone(),
        );
        slots.session = Some(session);
        drop(slots);
        info!("Session started with {}", device.display_name());

        let _ = self
            .event_tx
            .send(ConnectionEvent::Connected { device })
            .await;
    }

    /// Queue text on the active session's writer.
    ///
    /// Never waits on the socket. Returns `false` when there is no session or
    /// its queue is full; the text is dropped.
    pub async fn send(&self, text: &str) -> bool {
        let slots = self.slots.lock().await;
        match slots.session {
            Some(ref session) => session.write(text),
            None => {
                debug!("No session, dropping outbound text");
                false
            }
        }
    }

    /// Send a color to the active session.
    pub async fn send_color(&self, color: Rgb) -> bool {
        self.send(&color.to_payload()).await
    }

    /// Close the active session. Safe to call without one.
    pub async fn teardown(&self) {
        let mut slots = self.slots.lock().await;
        slots.close_session().await;
    }

    /// Cancel any attempt, close any session and stop discovery.
    pub async fn shutdown(&self) {
        self.stop_discovery();
        let mut slots = self.slots.lock().await;
        slots.cancel_attempt();
        slots.close_session().await;
    }

    /// Whether a session is installed and its reader still running.
    pub async fn is_connected(&self) -> bool {
        let slots = self.slots.lock().await;
        slots.session.as_ref().is_some_and(|s| s.is_alive())
    }

    /// Whether a connection attempt is in flight.
    pub async fn is_connecting(&self) -> bool {
        let slots = self.slots.lock().await;
        slots.attempt.as_ref().is_some_and(|a| !a.handle.is_finished())
    }

    /// The device of the installed session.
    pub async fn active_device(&self) -> Option<DeviceRecord> {
        let slots = self.slots.lock().await;
        slots.session.as_ref().map(|s| s.device().clone())
    }
}
