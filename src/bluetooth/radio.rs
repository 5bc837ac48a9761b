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

//! Platform radio abstraction.

use anyhow::Result;
use async_trait::async_trait;
use bluer::Address;
use futures::stream::BoxStream;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use super::discovery::DeviceRecord;

/// A connected duplex byte stream.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> DuplexStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Boxed session stream handed from the radio to the session.
pub type BoxedStream = Box<dyn DuplexStream>;

/// What the local radio can do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// No Bluetooth adapter (or no Bluetooth daemon).
    Unsupported,
    /// Adapter present but powered off.
    Disabled,
    /// Adapter present and powered.
    Ready,
}

/// How to open the RFCOMM link to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStrategy {
    /// Resolve the channel through the device's service record for this UUID,
    /// without authentication or encryption.
    Service(Uuid),
    /// Connect straight to a numbered RFCOMM channel.
    LegacyChannel(u8),
}

impl std::fmt::Display for ConnectStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectStrategy::Service(uuid) => write!(f, "service {}", uuid),
            ConnectStrategy::LegacyChannel(channel) => write!(f, "channel {}", channel),
        }
    }
}

/// Platform Bluetooth operations used by the session manager.
#[async_trait]
pub trait Radio: Send + Sync + 'static {
    /// Report whether discovery and connections are possible.
    async fn capability(&self) -> Capability;

    /// Start discovery. The returned stream yields each found device; dropping
    /// it stops discovery.
    async fn discover(&self) -> Result<BoxStream<'static, DeviceRecord>>;

    /// Devices bonded with the local adapter.
    async fn paired_devices(&self) -> Result<Vec<DeviceRecord>>;

    /// Service class UUIDs advertised by a device, in the order reported.
    async fn service_uuids(&self, address: Address) -> Result<Vec<Uuid>>;

    /// Open an RFCOMM stream to a device. Blocks until connected or failed.
    async fn open(&self, address: Address, strategy: ConnectStrategy) -> Result<BoxedStream>;
}
