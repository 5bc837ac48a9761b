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

//! Obol Bridge: stream sensor samples from an Obol device over Bluetooth.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use obol_bridge::bluetooth::{
    BluezRadio, ConnectionEvent, DeviceRecord, DiscoveryStatus, Radio, SessionManager,
};
use obol_bridge::config::Config;
use obol_bridge::console::{self, ConsoleCommand};
use obol_bridge::events::EventProcessor;
use obol_bridge::state::AppState;
use obol_bridge::storage::{spawn_recorder, FrameStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("obol_bridge=info".parse()?),
        )
        .init();

    info!("Starting Obol Bridge v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!("Configuration loaded");

    // Frame recording
    let (store, frame_tx, recorder) = if config.recording.enabled {
        let mut store = FrameStore::new(&config.data_dir)?;
        store.set_max_entries(config.recording.max_entries);
        let (frame_tx, frame_rx) = mpsc::channel(config.recording.queue_len.max(1));
        info!("Frame recording enabled");
        let recorder = spawn_recorder(store.clone(), frame_rx);
        (Some(store), Some(frame_tx), Some(recorder))
    } else {
        (None, None, None)
    };

    // Create application state
    let state = AppState::new();
    let processor = EventProcessor::new(state.clone());

    let radio: Arc<dyn Radio> = Arc::new(BluezRadio::new().await);
    let (event_tx, mut event_rx) = mpsc::channel::<ConnectionEvent>(32);
    let manager = SessionManager::new(radio, config.clone(), event_tx, frame_tx);
    let mut sample_rx = manager.subscribe_samples();

    if let Some(ref address) = config.bluetooth.auto_connect {
        let address = address.parse()?;
        let device = DeviceRecord::new(address, None);
        info!("Auto-connecting to {}", address);
        let manager = manager.clone();
        tokio::spawn(async move { manager.connect(device).await });
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", console::HELP);
    info!("Ready.");

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                processor.process_event(&event);
                if let Some(line) = console::describe_event(&event) {
                    println!("{}", line);
                }
            }
            sample = sample_rx.recv() => match sample {
                Ok(sample) => processor.process_sample(sample),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Sample consumer lagged, skipped {} samples", n);
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    match ConsoleCommand::parse(&line) {
                        Ok(Some(command)) => {
                            let store = store.as_ref();
                            if !handle_command(command, &manager, &state, store).await {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => println!("{}", e),
                    }
                }
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Session tasks may be blocked on a full event queue.
    drop(event_rx);
    manager.shutdown().await;
    let dropped = manager.dropped_frames();
    if dropped > 0 {
        warn!("{} frames were not recorded", dropped);
    }
    // Closing the last frame sender lets the recorder finish.
    drop(manager);
    if let Some(recorder) = recorder {
        if tokio::time::timeout(Duration::from_secs(2), recorder)
            .await
            .is_err()
        {
            warn!("Frame recorder did not finish in time");
        }
    }

    info!("Obol Bridge stopped");
    Ok(())
}

/// Run one console command. Returns `false` when the user asked to quit.
///
/// Connect and disconnect wait on sessions, so they run on their own task
/// and events keep draining meanwhile. Sends run inline to keep their order.
async fn handle_command(
    command: ConsoleCommand,
    manager: &SessionManager,
    state: &AppState,
    store: Option<&FrameStore>,
) -> bool {
    match command {
        ConsoleCommand::Scan => match manager.start_discovery().await {
            Ok(status) => {
                state.set_discovery_status(status);
                println!("{}", status.as_str());
            }
            Err(e) => println!("discovery failed: {}", e),
        },
        ConsoleCommand::StopScan => {
            manager.stop_discovery();
            state.set_discovery_status(DiscoveryStatus::Idle);
        }
        ConsoleCommand::Devices => {
            println!("{}", console::format_devices(&manager.discovered_devices()));
        }
        ConsoleCommand::Paired => match manager.paired_devices().await {
            Ok(devices) => println!("{}", console::format_devices(&devices)),
            Err(e) => println!("could not list paired devices: {}", e),
        },
        ConsoleCommand::Connect(reference) => {
            match console::resolve_device(reference, &manager.discovered_devices()) {
                Ok(device) => {
                    let manager = manager.clone();
                    tokio::spawn(async move { manager.connect(device).await });
                }
                Err(e) => println!("{}", e),
            }
        }
        ConsoleCommand::Send(text) => {
            if !manager.send(&text).await {
                println!("not sent: no session or write queue full");
            }
        }
        ConsoleCommand::Color(color) => {
            state.set_selected_color(color);
            println!("selected {}", color);
        }
        ConsoleCommand::PushColor => match state.get_selected_color() {
            Some(color) => {
                if !manager.send_color(color).await {
                    println!("not sent: no session or write queue full");
                }
            }
            None => println!("no color selected"),
        },
        ConsoleCommand::Disconnect => {
            let manager = manager.clone();
            tokio::spawn(async move { manager.teardown().await });
        }
        ConsoleCommand::Frames(limit) => {
            match frame_query(store, move |store| store.get_recent(limit)).await {
                Ok(frames) => println!("{}", console::format_frames(&frames)),
                Err(e) => println!("could not list frames: {}", e),
            }
        }
        ConsoleCommand::Export(path) => {
            let shown = path.display().to_string();
            match frame_query(store, move |store| store.export(&path)).await {
                Ok(()) => println!("frames written to {}", shown),
                Err(e) => println!("export failed: {}", e),
            }
        }
        ConsoleCommand::ClearFrames => match frame_query(store, |store| store.clear()).await {
            Ok(()) => println!("recorded frames cleared"),
            Err(e) => println!("clear failed: {}", e),
        },
        ConsoleCommand::Status => println!("{}", console::format_status(state)),
        ConsoleCommand::Help => println!("{}", console::HELP),
        ConsoleCommand::Quit => return false,
    }
    true
}

/// Run a frame database operation on the blocking pool.
async fn frame_query<T, F>(store: Option<&FrameStore>, query: F) -> Result<T>
where
    F: FnOnce(FrameStore) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store
        .cloned()
        .ok_or_else(|| anyhow!("frame recording is disabled"))?;
    tokio::task::spawn_blocking(move || query(store)).await?
}
