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

//! Bluetooth communication module.
//!
//! Discovers devices, connects to one over RFCOMM and turns its byte stream
//! into decoded samples.

mod bluez;
mod connector;
mod discovery;
mod framer;
mod manager;
pub mod protocol;
mod radio;
mod session;

pub use bluez::BluezRadio;
pub use connector::{connect_with_fallback, plan_strategies};
pub use discovery::{DeviceRecord, DiscoveredSet};
pub use framer::{FramerStats, RecordedFrameRequest, SampleFramer, SamplePublisher};
pub use manager::{DiscoveryStatus, SessionManager};
pub use protocol::{decode_frame, DecodedFrame, Sample};
pub use radio::{BoxedStream, Capability, ConnectStrategy, DuplexStream, Radio};
pub use session::{ConnectionEvent, Session};
