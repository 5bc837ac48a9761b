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

//! Line-based operator console.
//!
//! Maps typed commands to session manager actions and renders events.

use anyhow::{anyhow, Result};
use bluer::Address;
use std::path::PathBuf;

use crate::bluetooth::{ConnectionEvent, DeviceRecord};
use crate::color::Rgb;
use crate::state::AppState;
use crate::storage::RecordedFrame;

/// Frames listed by `frames` without a count.
const DEFAULT_FRAME_LIST: u32 = 10;

pub const HELP: &str = "\
Commands:
  scan              start discovery
  stop              stop discovery
  devices           list discovered devices
  paired            list paired devices
  connect <n|addr>  connect to a listed device or an address
  send <text>       send text to the device
  color <value>     select a color (#RRGGBB, RRGGBB or packed integer)
  push              send the selected color
  disconnect        close the session
  frames [n]        list the n most recent recorded frames
  export <path>     write all recorded frames to a text file
  clear             delete all recorded frames
  status            show connection status
  help              show this help
  quit              exit";

/// Target of a connect command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRef {
    /// 1-based position in the discovered list.
    Index(usize),
    Address(Address),
}

/// Operator commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Scan,
    StopScan,
    Devices,
    Paired,
    Connect(DeviceRef),
    Send(String),
    Color(Rgb),
    PushColor,
    Disconnect,
    Frames(u32),
    Export(PathBuf),
    ClearFrames,
    Status,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line. Empty lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_lowercase().as_str() {
            "scan" | "discover" => Self::Scan,
            "stop" => Self::StopScan,
            "devices" | "ls" => Self::Devices,
            "paired" => Self::Paired,
            "connect" => Self::Connect(Self::parse_device_ref(rest)?),
            // Text is sent verbatim; nothing to send is not an error.
            "send" => {
                if rest.is_empty() {
                    return Ok(None);
                }
                Self::Send(rest.to_string())
            }
            "color" => Self::Color(Rgb::parse(rest)?),
            "push" => Self::PushColor,
            "disconnect" => Self::Disconnect,
            "frames" => Self::Frames(if rest.is_empty() {
                DEFAULT_FRAME_LIST
            } else {
                rest.parse()
                    .map_err(|_| anyhow!("Invalid frame count: {}", rest))?
            }),
            "export" => {
                if rest.is_empty() {
                    return Err(anyhow!("export needs a file path"));
                }
                Self::Export(PathBuf::from(rest))
            }
            "clear" => Self::ClearFrames,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(anyhow!("Unknown command: {} (try 'help')", other)),
        };

        Ok(Some(command))
    }

    fn parse_device_ref(s: &str) -> Result<DeviceRef> {
        if s.is_empty() {
            return Err(anyhow!("connect needs a device number or address"));
        }
        if let Ok(index) = s.parse::<usize>() {
            if index == 0 {
                return Err(anyhow!("Device numbers start at 1"));
            }
            return Ok(DeviceRef::Index(index));
        }
        s.parse::<Address>()
            .map(DeviceRef::Address)
            .map_err(|e| anyhow!("Invalid device address {:?}: {}", s, e))
    }
}

/// Resolve a device reference against the discovered list.
pub fn resolve_device(reference: DeviceRef, discovered: &[DeviceRecord]) -> Result<DeviceRecord> {
    match reference {
        DeviceRef::Index(index) => discovered
            .get(index - 1)
            .cloned()
            .ok_or_else(|| anyhow!("No device #{} ({} discovered)", index, discovered.len())),
        DeviceRef::Address(address) => Ok(discovered
            .iter()
            .find(|d| d.address == address)
            .cloned()
            .unwrap_or_else(|| DeviceRecord::new(address, None))),
    }
}

/// Numbered device list, one per line.
pub fn format_devices(devices: &[DeviceRecord]) -> String {
    if devices.is_empty() {
        return "(none)".to_string();
    }
    devices
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{:>2}. {} [{}]", i + 1, d.display_name(), d.address))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Recorded frames, one per line, newest first.
pub fn format_frames(frames: &[RecordedFrame]) -> String {
    if frames.is_empty() {
        return "(none)".to_string();
    }
    frames
        .iter()
        .map(|f| {
            format!(
                "[{}] {}: {}",
                f.timestamp.format("%H:%M:%S%.3f"),
                f.device,
                f.sample
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Status summary.
pub fn format_status(state: &AppState) -> String {
    let mut out = format!(
        "Connection: {}\nDiscovery:  {}",
        state.get_status().as_str(),
        state.get_discovery_status().as_str()
    );
    if let Some(name) = state.get_device_name() {
        out.push_str(&format!("\nDevice:     {}", name));
    }
    if let Some(color) = state.get_selected_color() {
        out.push_str(&format!("\nColor:      {}", color));
    }
    out.push_str(&format!("\nSamples:    {}", state.get_sample_count()));
    if let Some(sample) = state.get_last_sample() {
        out.push_str(&format!("\nLast:       {}", sample));
    }
    out
}

/// Console line for an event, if it should be shown.
pub fn describe_event(event: &ConnectionEvent) -> Option<String> {
    match event {
        ConnectionEvent::DeviceFound(device) => Some(format!(
            "found: {} [{}]",
            device.display_name(),
            device.address
        )),
        ConnectionEvent::Connecting { device } => {
            Some(format!("connecting to {}...", device.display_name()))
        }
        ConnectionEvent::Connected { device } => {
            Some(format!("connected to {}", device.display_name()))
        }
        ConnectionEvent::ConnectFailed { device, reason } => Some(format!(
            "could not connect to {}: {}",
            device.display_name(),
            reason
        )),
        ConnectionEvent::TextReceived(_) => None,
        ConnectionEvent::TextSent(text) => Some(format!("sent: {}", text)),
        ConnectionEvent::Disconnected { address } => Some(format!("disconnected from {}", address)),
        ConnectionEvent::Error(e) => Some(format!("error: {}", e)),
    }
}
