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

//! BlueZ implementation of the radio.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::rfcomm::{Profile, ReqError, Role, SocketAddr, Stream};
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::discovery::DeviceRecord;
use super::protocol::SPP_UUID;
use super::radio::{BoxedStream, Capability, ConnectStrategy, Radio};

/// Radio backed by the system BlueZ daemon.
pub struct BluezRadio {
    session: Option<Session>,
    adapter: Option<Adapter>,
}

impl BluezRadio {
    /// Connect to BlueZ and pick the default adapter.
    ///
    /// A missing daemon or adapter is not an error here; the radio then
    /// reports [`Capability::Unsupported`].
    pub async fn new() -> Self {
        info!("Initializing Bluetooth radio...");

        let session = match Session::new().await {
            Ok(session) => session,
            Err(e) => {
                warn!("BlueZ session unavailable: {}", e);
                return Self {
                    session: None,
                    adapter: None,
                };
            }
        };
        info!("BlueZ session created");

        let adapter = match session.default_adapter().await {
            Ok(adapter) => {
                info!("Using Bluetooth adapter: {}", adapter.name());
                Some(adapter)
            }
            Err(e) => {
                warn!("No Bluetooth adapter: {}", e);
                None
            }
        };

        Self {
            session: Some(session),
            adapter,
        }
    }

    fn adapter(&self) -> Result<&Adapter> {
        self.adapter
            .as_ref()
            .ok_or_else(|| anyhow!("No Bluetooth adapter available"))
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| anyhow!("BlueZ session not available"))
    }

    /// Connect through a client profile registered for `uuid`.
    ///
    /// BlueZ looks the channel up in the device's service record and hands
    /// the connected socket to the profile.
    async fn open_service(&self, address: Address, uuid: Uuid) -> Result<Stream> {
        let session = self.session()?;
        let device = self.adapter()?.device(address)?;

        let profile = Profile {
            uuid,
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let mut handle = session.register_profile(profile).await?;
        debug!("Client profile registered for {}", uuid);

        let connect = device.connect_profile(&uuid);
        tokio::pin!(connect);
        let mut requested = false;

        loop {
            tokio::select! {
                res = &mut connect, if !requested => {
                    res?;
                    requested = true;
                }
                req = handle.next() => {
                    let req = req.ok_or_else(|| anyhow!("Profile handle closed"))?;
                    if req.device() == address {
                        return Ok(req.accept()?);
                    }
                    debug!("Rejecting profile connection from {}", req.device());
                    req.reject(ReqError::Rejected);
                }
            }
        }
    }

    async fn open_channel(&self, address: Address, channel: u8) -> Result<Stream> {
        Ok(Stream::connect(SocketAddr::new(address, channel)).await?)
    }
}

#[async_trait]
impl Radio for BluezRadio {
    async fn capability(&self) -> Capability {
        let Some(adapter) = self.adapter.as_ref() else {
            return Capability::Unsupported;
        };
        match adapter.is_powered().await {
            Ok(true) => Capability::Ready,
            Ok(false) => Capability::Disabled,
            Err(e) => {
                warn!("Could not read adapter power state: {}", e);
                Capability::Unsupported
            }
        }
    }

    async fn discover(&self) -> Result<BoxStream<'static, DeviceRecord>> {
        let adapter = self.adapter()?.clone();

        adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::BrEdr,
                ..Default::default()
            })
            .await?;

        let events = adapter.discover_devices().await?;
        info!("Discovery started on {}", adapter.name());

        let devices = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                match event {
                    AdapterEvent::DeviceAdded(address) => {
                        let name = match adapter.device(address) {
                            Ok(device) => device.name().await.ok().flatten(),
                            Err(_) => None,
                        };
                        Some(DeviceRecord::new(address, name))
                    }
                    _ => None,
                }
            }
        });

        Ok(devices.boxed())
    }

    async fn paired_devices(&self) -> Result<Vec<DeviceRecord>> {
        let adapter = self.adapter()?;
        let mut devices = Vec::new();

        for address in adapter.device_addresses().await? {
            let device = adapter.device(address)?;
            if device.is_paired().await? {
                let name = device.alias().await.ok();
                devices.push(DeviceRecord::new(address, name));
            }
        }

        Ok(devices)
    }

    async fn service_uuids(&self, address: Address) -> Result<Vec<Uuid>> {
        let device = self.adapter()?.device(address)?;
        let mut uuids: Vec<Uuid> = device
            .uuids()
            .await?
            .unwrap_or_default()
            .into_iter()
            .collect();

        // BlueZ reports a set; SPP goes first when present.
        uuids.sort();
        if let Some(pos) = uuids.iter().position(|u| *u == SPP_UUID) {
            let spp = uuids.remove(pos);
            uuids.insert(0, spp);
        }

        Ok(uuids)
    }

    async fn open(&self, address: Address, strategy: ConnectStrategy) -> Result<BoxedStream> {
        let stream = match strategy {
            ConnectStrategy::Service(uuid) => self.open_service(address, uuid).await?,
            ConnectStrategy::LegacyChannel(channel) => self.open_channel(address, channel).await?,
        };
        Ok(Box::new(stream))
    }
}
