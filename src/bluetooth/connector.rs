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

//! Outbound connection attempts.

use anyhow::{anyhow, Result};
use tracing::{info, warn};
use uuid::Uuid;

use super::discovery::DeviceRecord;
use super::radio::{BoxedStream, ConnectStrategy, Radio};
use crate::config::BluetoothConfig;

/// Order the connection strategies for a device.
///
/// The primary path uses the first service UUID the device advertises, or
/// the configured default when it advertises none. The legacy numbered
/// channel is always the fallback.
pub fn plan_strategies(advertised: &[Uuid], config: &BluetoothConfig) -> Vec<ConnectStrategy> {
    let service = advertised.first().copied().unwrap_or(config.service_uuid);
    vec![
        ConnectStrategy::Service(service),
        ConnectStrategy::LegacyChannel(config.legacy_channel),
    ]
}

/// Try each strategy in turn and return the first stream that connects.
///
/// Every failure is logged; when all strategies fail the last error is
/// returned. There is no retry.
pub async fn connect_with_fallback<R: Radio + ?Sized>(
    radio: &R,
    device: &DeviceRecord,
    config: &BluetoothConfig,
) -> Result<BoxedStream> {
    let advertised = match radio.service_uuids(device.address).await {
        Ok(uuids) => uuids,
        Err(e) => {
            warn!(
                "Could not read service UUIDs of {}: {}",
                device.display_name(),
                e
            );
            Vec::new()
        }
    };

    let mut last_error = None;
    for strategy in plan_strategies(&advertised, config) {
        info!("Connecting to {} via {}...", device.display_name(), strategy);
        match radio.open(device.address, strategy).await {
            Ok(stream) => {
                info!("Connected to {} via {}", device.display_name(), strategy);
                return Ok(stream);
            }
            Err(e) => {
                warn!("Connection via {} failed: {}", strategy, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow!("No connection strategy available")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::protocol::SPP_UUID;

    #[test]
    fn test_plan_uses_first_advertised_uuid() {
        let custom = Uuid::from_u128(0x1234);
        let config = BluetoothConfig::default();

        let plan = plan_strategies(&[custom, SPP_UUID], &config);
        assert_eq!(
            plan,
            vec![
                ConnectStrategy::Service(custom),
                ConnectStrategy::LegacyChannel(1)
            ]
        );
    }

    #[test]
    fn test_plan_falls_back_to_configured_uuid() {
        let config = BluetoothConfig {
            legacy_channel: 3,
            ..BluetoothConfig::default()
        };

        let plan = plan_strategies(&[], &config);
        assert_eq!(
            plan,
            vec![
                ConnectStrategy::Service(SPP_UUID),
                ConnectStrategy::LegacyChannel(3)
            ]
        );
    }
}
