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

//! Live connection to one remote device.

use bluer::Address;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::discovery::DeviceRecord;
use super::framer::{SampleFramer, SamplePublisher};
use super::radio::BoxedStream;

/// Read buffer size for one socket read.
const READ_CHUNK: usize = 1024;

/// Queued outbound writes per session.
const WRITE_QUEUE: usize = 32;

/// Events emitted by the session manager and its sessions.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A device was seen for the first time during discovery.
    DeviceFound(DeviceRecord),
    /// A connection attempt started.
    Connecting { device: DeviceRecord },
    /// A session was installed.
    Connected { device: DeviceRecord },
    /// Every connection strategy failed.
    ConnectFailed { device: DeviceRecord, reason: String },
    /// Raw text read from the device.
    TextReceived(String),
    /// Text written to the device.
    TextSent(String),
    /// The session's reader stopped.
    Disconnected { address: Address },
    /// Error occurred.
    Error(String),
}

/// Handle to a running session: a reader task feeding the framer and a
/// writer task draining the outbound queue.
///
/// Both tasks watch the cancel signal at every await point, so [`close`]
/// returns even when the peer has stopped reading or the event queue is full.
///
/// [`close`]: Session::close
pub struct Session {
    device: DeviceRecord,
    write_tx: Option<mpsc::Sender<String>>,
    cancel_tx: watch::Sender<bool>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Session {
    /// Start the reader and writer tasks on an open stream.
    pub fn start(
        stream: BoxedStream,
        device: DeviceRecord,
        framer: SampleFramer,
        publisher: SamplePublisher,
        event_tx: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let reader = tokio::spawn(read_loop(
            reader,
            device.address,
            framer,
            publisher,
            event_tx.clone(),
            cancel_rx.clone(),
        ));
        let writer = tokio::spawn(write_loop(writer, write_rx, event_tx, cancel_rx));

        Self {
            device,
            write_tx: Some(write_tx),
            cancel_tx,
            reader: Some(reader),
            writer: Some(writer),
        }
    }

    /// The remote device.
    pub fn device(&self) -> &DeviceRecord {
        &self.device
    }

    /// Whether the reader is still running.
    pub fn is_alive(&self) -> bool {
        self.reader.as_ref().is_some_and(|r| !r.is_finished())
    }

    /// Queue text for the writer without waiting.
    ///
    /// Returns `false` when the session is closed or the queue is full.
    pub fn write(&self, text: &str) -> bool {
        let Some(ref tx) = self.write_tx else {
            return false;
        };
        match tx.try_send(text.to_string()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Write queue full, dropping {} bytes", text.len());
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Stop both tasks and release the stream. Safe to call repeatedly.
    pub async fn close(&mut self) {
        let _ = self.cancel_tx.send(true);
        self.write_tx = None;

        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
        info!("Session with {} closed", self.device.display_name());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(ref reader) = self.reader {
            reader.abort();
        }
        if let Some(ref writer) = self.writer {
            writer.abort();
        }
    }
}

/// Resolves once the session has been cancelled or its handle dropped.
async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    let _ = cancel_rx.wait_for(|cancelled| *cancelled).await;
}

/// Deliver an event unless the session is cancelled first.
///
/// Returns `false` on cancellation.
async fn emit(
    event_tx: &mpsc::Sender<ConnectionEvent>,
    cancel_rx: &mut watch::Receiver<bool>,
    event: ConnectionEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = cancelled(cancel_rx) => false,
        _ = event_tx.send(event) => true,
    }
}

async fn read_loop(
    mut reader: ReadHalf<BoxedStream>,
    address: Address,
    mut framer: SampleFramer,
    publisher: SamplePublisher,
    event_tx: mpsc::Sender<ConnectionEvent>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    info!("Session reader started");
    let device = address.to_string();
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let res = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => {
                debug!("Session reader cancelled");
                break;
            }
            res = reader.read(&mut buf) => res,
        };

        match res {
            Ok(0) => {
                info!("Connection closed by remote");
                break;
            }
            Ok(n) => {
                let chunk = &buf[..n];
                debug!("Received {} bytes", n);
                for frame in framer.push(chunk) {
                    publisher.publish(&device, frame);
                }

                let text = String::from_utf8_lossy(chunk).into_owned();
                if !emit(&event_tx, &mut cancel_rx, ConnectionEvent::TextReceived(text)).await {
                    break;
                }
            }
            Err(e) => {
                error!("Read error: {}", e);
                emit(&event_tx, &mut cancel_rx, ConnectionEvent::Error(e.to_string())).await;
                break;
            }
        }
    }

    let stats = framer.stats();
    info!(
        "Session reader stopped: {} samples, {} short, {} malformed, {} overflows",
        stats.accepted, stats.rejected_short, stats.rejected_malformed, stats.overflows
    );

    let event = ConnectionEvent::Disconnected { address };
    if *cancel_rx.borrow() {
        let _ = event_tx.try_send(event);
    } else {
        emit(&event_tx, &mut cancel_rx, event).await;
    }
}

async fn write_loop(
    mut writer: WriteHalf<BoxedStream>,
    mut write_rx: mpsc::Receiver<String>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    loop {
        let text = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => return,
            text = write_rx.recv() => match text {
                Some(text) => text,
                None => break,
            },
        };

        let res = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => {
                debug!("Write of {} bytes cancelled", text.len());
                return;
            }
            res = async {
                writer.write_all(text.as_bytes()).await?;
                writer.flush().await
            } => res,
        };

        let event = match res {
            Ok(()) => {
                debug!("Sent: {}", text);
                ConnectionEvent::TextSent(text)
            }
            Err(e) => {
                error!("Exception during write: {}", e);
                ConnectionEvent::Error(e.to_string())
            }
        };
        if !emit(&event_tx, &mut cancel_rx, event).await {
            return;
        }
    }

    tokio::select! {
        biased;
        _ = cancelled(&mut cancel_rx) => {}
        _ = writer.shutdown() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::sync::broadcast;

    fn device() -> DeviceRecord {
        DeviceRecord::new(Address::new([1, 2, 3, 4, 5, 6]), Some("Obol".into()))
    }

    fn publisher() -> (SamplePublisher, broadcast::Receiver<crate::bluetooth::Sample>) {
        let (tx, rx) = broadcast::channel(16);
        (SamplePublisher::new(tx, None), rx)
    }

    #[tokio::test]
    async fn test_reader_publishes_samples_and_text() {
        let (local, mut remote) = duplex(256);
        let (event_tx, mut event_rx) = mpsc::channel(32);
        let (publisher, mut samples) = publisher();

        let mut session = Session::start(
            Box::new(local),
            device(),
            SampleFramer::new(),
            publisher,
            event_tx,
        );

        remote
            .write_all(b"1234561234561234561234561234567&")
            .await
            .unwrap();

        let sample = samples.recv().await.unwrap();
        assert_eq!(sample.channel(0), Some(0x123));

        match event_rx.recv().await.unwrap() {
            ConnectionEvent::TextReceived(text) => assert!(text.starts_with("123456")),
            other => panic!("unexpected event: {:?}", other),
        }

        session.close().await;
        assert!(!session.is_alive());
    }

    #[tokio::test]
    async fn test_write_is_echoed() {
        let (local, mut remote) = duplex(256);
        let (event_tx, mut event_rx) = mpsc::channel(32);
        let (publisher, _samples) = publisher();

        let mut session = Session::start(
            Box::new(local),
            device(),
            SampleFramer::new(),
            publisher,
            event_tx,
        );

        assert!(session.write("FF8000"));

        let mut buf = [0u8; 6];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"FF8000");

        match event_rx.recv().await.unwrap() {
            ConnectionEvent::TextSent(text) => assert_eq!(text, "FF8000"),
            other => panic!("unexpected event: {:?}", other),
        }

        session.close().await;
        assert!(!session.write("late"));
    }

    #[tokio::test]
    async fn test_close_with_stalled_peer() {
        // The remote never reads, so the writer blocks once 8 bytes are in flight.
        let (local, _remote) = duplex(8);
        let (event_tx, _event_rx) = mpsc::channel(1);
        let (publisher, _samples) = publisher();

        let mut session = Session::start(
            Box::new(local),
            device(),
            SampleFramer::new(),
            publisher,
            event_tx,
        );

        assert!(session.write("ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
        for _ in 0..(WRITE_QUEUE * 2) {
            session.write("more text than the socket can take");
        }
        tokio::task::yield_now().await;

        tokio::time::timeout(std::time::Duration::from_secs(3), session.close())
            .await
            .expect("close blocked on a stalled writer");
        assert!(!session.is_alive());
    }

    #[tokio::test]
    async fn test_remote_close_reports_disconnect() {
        let (local, remote) = duplex(64);
        let (event_tx, mut event_rx) = mpsc::channel(32);
        let (publisher, _samples) = publisher();

        let _session = Session::start(
            Box::new(local),
            device(),
            SampleFramer::new(),
            publisher,
            event_tx,
        );
        drop(remote);

        match event_rx.recv().await.unwrap() {
            ConnectionEvent::Disconnected { address } => {
                assert_eq!(address, device().address)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
