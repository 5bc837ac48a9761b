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

//! RGB color sent to the device.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// An 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Split a packed `0xAARRGGBB` color. Alpha is ignored.
    pub const fn from_argb(argb: u32) -> Self {
        Self {
            red: ((argb >> 16) & 0xFF) as u8,
            green: ((argb >> 8) & 0xFF) as u8,
            blue: (argb & 0xFF) as u8,
        }
    }

    /// Pack as an opaque `0xFFRRGGBB` color.
    pub const fn to_argb(self) -> u32 {
        0xFF00_0000 | (self.red as u32) << 16 | (self.green as u32) << 8 | self.blue as u32
    }

    /// Parse `#RRGGBB`, `RRGGBB`, `0xAARRGGBB` or a decimal packed color.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if let Some(hex) = s.strip_prefix('#') {
            return Self::parse_hex6(hex);
        }
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            let argb = u32::from_str_radix(hex, 16)
                .map_err(|e| anyhow!("Invalid color {:?}: {}", s, e))?;
            return Ok(Self::from_argb(argb));
        }
        if s.len() == 6 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Self::parse_hex6(s);
        }

        let value: i64 = s
            .parse()
            .map_err(|_| anyhow!("Invalid color {:?}", s))?;
        // Packed colors are often stored as signed 32-bit values.
        let argb = if value < 0 {
            i32::try_from(value).map(|v| v as u32)
        } else {
            u32::try_from(value)
        }
        .map_err(|_| anyhow!("Color {} does not fit in 32 bits", value))?;
        Ok(Self::from_argb(argb))
    }

    fn parse_hex6(hex: &str) -> Result<Self> {
        if hex.len() != 6 {
            return Err(anyhow!("Expected 6 hex digits, got {:?}", hex));
        }
        let rgb = u32::from_str_radix(hex, 16).map_err(|e| anyhow!("Invalid color {:?}: {}", hex, e))?;
        Ok(Self::from_argb(rgb))
    }

    /// Text sent to the device for this color.
    pub fn to_payload(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }
}
