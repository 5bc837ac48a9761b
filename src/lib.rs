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

//! Obol Bridge library.
//!
//! Bluetooth session management and sample decoding for the Obol sensor,
//! plus the state, storage and console pieces used by the binary.

pub mod bluetooth;
pub mod color;
pub mod config;
pub mod console;
pub mod events;
pub mod state;
pub mod storage;
