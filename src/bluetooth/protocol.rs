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

//! Sample wire format.
//!
//! The device sends a flat ASCII stream. Each frame ends with `&` and is at
//! least 32 bytes long (sentinel included). The first 32 bytes hold eight
//! 4-byte groups; a channel value is the first 3 hex digits of its group.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// RFCOMM channel used by the legacy connection path.
pub const LEGACY_RFCOMM_CHANNEL: u8 = 1;

/// End-of-frame marker.
pub const FRAME_SENTINEL: u8 = b'&';

/// Minimum frame length, sentinel included. Shorter frames are battery
/// status lines or noise.
pub const MIN_FRAME_LEN: usize = 32;

/// Number of channels in one sample.
pub const CHANNEL_COUNT: usize = 8;

/// Width of a channel group in the frame.
const GROUP_WIDTH: usize = 4;

/// Hex digits per channel inside a group.
const DIGITS_PER_CHANNEL: usize = 3;

/// One decoded sample: eight channel values, each in `0..=0xFFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    channels: [u16; CHANNEL_COUNT],
}

impl Sample {
    /// Create a sample from raw channel values.
    pub fn new(channels: [u16; CHANNEL_COUNT]) -> Self {
        Self { channels }
    }

    /// Channel values in wire order.
    pub fn channels(&self) -> &[u16; CHANNEL_COUNT] {
        &self.channels
    }

    /// Value of a single channel.
    pub fn channel(&self, index: usize) -> Option<u16> {
        self.channels.get(index).copied()
    }
}

impl std::fmt::Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values: Vec<String> = self.channels.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", values.join(", "))
    }
}

/// A frame that passed validation, with its decoded sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub sample: Sample,
    /// Frame text as received, sentinel included.
    pub raw: String,
}

/// Decode the channel block at the start of a frame.
///
/// `frame` must hold at least [`MIN_FRAME_LEN`] bytes. Only the first 32
/// bytes are read, so the decode is the same no matter what follows them.
pub fn decode_frame(frame: &[u8]) -> Result<Sample> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(anyhow!(
            "Frame too short: {} bytes, need {}",
            frame.len(),
            MIN_FRAME_LEN
        ));
    }

    let mut channels = [0u16; CHANNEL_COUNT];
    for (index, group) in frame[..MIN_FRAME_LEN].chunks(GROUP_WIDTH).enumerate() {
        let digits = std::str::from_utf8(&group[..DIGITS_PER_CHANNEL])
            .map_err(|_| anyhow!("Channel {} is not ASCII", index))?;
        channels[index] = u16::from_str_radix(digits, 16)
            .map_err(|e| anyhow!("Channel {} has invalid hex {:?}: {}", index, digits, e))?;
    }

    Ok(Sample::new(channels))
}
