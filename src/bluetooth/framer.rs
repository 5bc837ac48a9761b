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

//! Sample frame extraction from the raw session stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::protocol::{decode_frame, DecodedFrame, Sample, MIN_FRAME_LEN};
use crate::config::FramerConfig;

/// Counters describing what the framer did with its input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    pub accepted: u64,
    pub rejected_short: u64,
    pub rejected_malformed: u64,
    pub overflows: u64,
}

/// Accumulates stream bytes and cuts them into sample frames.
pub struct SampleFramer {
    buffer: Vec<u8>,
    sentinel: u8,
    min_frame_len: usize,
    max_buffer_len: usize,
    stats: FramerStats,
}

impl SampleFramer {
    /// Create a framer with the default wire settings.
    pub fn new() -> Self {
        Self::with_config(&FramerConfig::default())
    }

    /// Create a framer from configuration.
    pub fn with_config(config: &FramerConfig) -> Self {
        Self {
            buffer: Vec::with_capacity(1024),
            sentinel: config.sentinel as u8,
            min_frame_len: config.min_frame_len.max(MIN_FRAME_LEN),
            max_buffer_len: config.max_buffer_len,
            stats: FramerStats::default(),
        }
    }

    /// Append a chunk and drain every complete frame it completes.
    ///
    /// Accepted frames are returned in arrival order. Candidates that are too
    /// short or do not decode are dropped and counted. The buffer bound is
    /// checked per byte: as soon as more than `max_buffer_len` bytes are held
    /// without a sentinel they are discarded, so the output never depends on
    /// how the stream was chunked.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DecodedFrame> {
        let mut frames = Vec::new();
        let mut rest = chunk;

        while !rest.is_empty() {
            match rest.iter().position(|&b| b == self.sentinel) {
                Some(end) => {
                    self.append(&rest[..end]);
                    self.buffer.push(self.sentinel);
                    if let Some(frame) = self.take_frame() {
                        frames.push(frame);
                    }
                    rest = &rest[end + 1..];
                }
                None => {
                    self.append(rest);
                    rest = &[];
                }
            }
        }

        frames
    }

    /// Append sentinel-free bytes, resetting whenever the bound is passed.
    fn append(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let room = self.max_buffer_len + 1 - self.buffer.len();
            let take = room.min(bytes.len());
            self.buffer.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];

            if self.buffer.len() > self.max_buffer_len {
                warn!(
                    "No frame sentinel in {} buffered bytes, resetting buffer",
                    self.buffer.len()
                );
                self.stats.overflows += 1;
                self.buffer.clear();
            }
        }
    }

    /// Validate and decode the sentinel-terminated buffer, then clear it.
    fn take_frame(&mut self) -> Option<DecodedFrame> {
        let candidate = &self.buffer;
        let frame = if candidate.len() < self.min_frame_len {
            debug!("Discarding short frame: {} bytes", candidate.len());
            self.stats.rejected_short += 1;
            None
        } else {
            match decode_frame(candidate) {
                Ok(sample) => {
                    self.stats.accepted += 1;
                    Some(DecodedFrame {
                        sample,
                        raw: String::from_utf8_lossy(candidate).into_owned(),
                    })
                }
                Err(e) => {
                    debug!("Discarding malformed frame: {}", e);
                    self.stats.rejected_malformed += 1;
                    None
                }
            }
        };
        self.buffer.clear();
        frame
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes waiting for a sentinel.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Framing counters since creation.
    pub fn stats(&self) -> FramerStats {
        self.stats
    }
}

impl Default for SampleFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Fans accepted frames out to sample subscribers and the frame recorder.
///
/// The recorder queue is bounded; frames that do not fit are dropped and
/// counted rather than stalling the reader.
#[derive(Clone)]
pub struct SamplePublisher {
    samples: broadcast::Sender<Sample>,
    frames: Option<mpsc::Sender<RecordedFrameRequest>>,
    dropped: Arc<AtomicU64>,
}

/// A raw frame queued for recording.
#[derive(Debug, Clone)]
pub struct RecordedFrameRequest {
    pub device: String,
    pub frame: DecodedFrame,
}

impl SamplePublisher {
    pub fn new(
        samples: broadcast::Sender<Sample>,
        frames: Option<mpsc::Sender<RecordedFrameRequest>>,
    ) -> Self {
        Self {
            samples,
            frames,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to decoded samples.
    pub fn subscribe(&self) -> broadcast::Receiver<Sample> {
        self.samples.subscribe()
    }

    /// Publish one accepted frame.
    pub fn publish(&self, device: &str, frame: DecodedFrame) {
        // No subscribers is fine; samples are only interesting while watched.
        let _ = self.samples.send(frame.sample);

        let Some(ref frames) = self.frames else {
            return;
        };
        let request = RecordedFrameRequest {
            device: device.to_string(),
            frame,
        };
        match frames.try_send(request) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 1000 == 0 {
                    warn!("Frame recorder is behind, {} frames not recorded", dropped);
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Frame recorder is gone, frame not recorded");
            }
        }
    }

    /// Frames dropped because the recorder queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_A: &[u8] = b"1234561234561234561234561234567&";
    const FRAME_B: &[u8] = b"000100020003000400050006000700080009&";

    fn samples(frames: &[DecodedFrame]) -> Vec<Sample> {
        frames.iter().map(|f| f.sample).collect()
    }

    #[test]
    fn test_single_frame() {
        let mut framer = SampleFramer::new();
        let frames = framer.push(FRAME_A);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].raw.as_bytes(), FRAME_A);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_partial_frame_is_kept() {
        let mut framer = SampleFramer::new();
        assert!(framer.push(&FRAME_A[..10]).is_empty());
        assert_eq!(framer.buffered(), 10);

        let frames = framer.push(&FRAME_A[10..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_short_frame_is_discarded() {
        let mut framer = SampleFramer::new();
        let frames = framer.push(b"BAT:87&");

        assert!(frames.is_empty());
        assert_eq!(framer.buffered(), 0);
        assert_eq!(framer.stats().rejected_short, 1);
    }

    #[test]
    fn test_frame_of_31_bytes_is_discarded() {
        let mut framer = SampleFramer::new();
        let frames = framer.push(&FRAME_A[1..]);

        assert!(frames.is_empty());
        assert_eq!(framer.stats().rejected_short, 1);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut framer = SampleFramer::new();
        let mut input = Vec::new();
        input.extend_from_slice(FRAME_A);
        input.extend_from_slice(b"noise&");
        input.extend_from_slice(FRAME_B);
        input.extend_from_slice(b"0001");

        let frames = framer.push(&input);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].raw.as_bytes(), FRAME_A);
        assert_eq!(frames[1].raw.as_bytes(), FRAME_B);
        assert_eq!(frames[1].sample.channels(), &[0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(framer.buffered(), 4);
    }

    #[test]
    fn test_malformed_frame_is_discarded() {
        let mut framer = SampleFramer::new();
        let frames = framer.push(b"zzzz0000000000000000000000000000&");

        assert!(frames.is_empty());
        assert_eq!(framer.stats().rejected_malformed, 1);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_chunking_does_not_change_output() {
        let mut stream = Vec::new();
        for _ in 0..5 {
            stream.extend_from_slice(FRAME_A);
            stream.extend_from_slice(b"BAT&");
            stream.extend_from_slice(FRAME_B);
        }

        let mut whole = SampleFramer::new();
        let expected = samples(&whole.push(&stream));
        assert_eq!(expected.len(), 10);

        for size in [1, 2, 3, 7, 31, 32, 33, 64] {
            let mut framer = SampleFramer::new();
            let mut got = Vec::new();
            for chunk in stream.chunks(size) {
                got.extend(samples(&framer.push(chunk)));
            }
            assert_eq!(got, expected, "chunk size {}", size);
        }
    }

    #[test]
    fn test_overflow_resets_buffer() {
        let config = FramerConfig {
            max_buffer_len: 64,
            ..FramerConfig::default()
        };
        let mut framer = SampleFramer::with_config(&config);

        framer.push(&[b'0'; 65]);
        assert_eq!(framer.buffered(), 0);
        assert_eq!(framer.stats().overflows, 1);

        // Framing resumes after the reset.
        assert_eq!(framer.push(FRAME_A).len(), 1);
    }

    #[test]
    fn test_overflow_does_not_depend_on_chunking() {
        let config = FramerConfig {
            max_buffer_len: 40,
            ..FramerConfig::default()
        };

        // 50 sentinel-free bytes, then a frame that straddles the reset point.
        let mut stream = vec![b'0'; 50];
        stream.extend_from_slice(FRAME_A);
        stream.extend_from_slice(&[b'1'; 90]);
        stream.extend_from_slice(FRAME_B);

        let mut whole = SampleFramer::with_config(&config);
        let expected = samples(&whole.push(&stream));
        let expected_stats = whole.stats();
        assert!(expected_stats.overflows > 0);

        for size in [1, 5, 17, 41, 64, 100] {
            let mut framer = SampleFramer::with_config(&config);
            let mut got = Vec::new();
            for chunk in stream.chunks(size) {
                got.extend(samples(&framer.push(chunk)));
            }
            assert_eq!(got, expected, "chunk size {}", size);
            assert_eq!(framer.stats(), expected_stats, "chunk size {}", size);
            assert_eq!(framer.buffered(), whole.buffered(), "chunk size {}", size);
        }
    }

    #[test]
    fn test_buffer_never_exceeds_bound() {
        let config = FramerConfig {
            max_buffer_len: 64,
            ..FramerConfig::default()
        };
        let mut framer = SampleFramer::with_config(&config);

        framer.push(&[b'0'; 1000]);
        assert!(framer.buffered() <= 64);
        assert_eq!(framer.stats().overflows, 1000 / 65);
    }

    #[test]
    fn test_full_recorder_queue_drops_and_counts() {
        let (sample_tx, mut sample_rx) = broadcast::channel(8);
        let (frame_tx, mut frame_rx) = mpsc::channel(1);
        let publisher = SamplePublisher::new(sample_tx, Some(frame_tx));

        let mut framer = SampleFramer::new();
        let mut input = Vec::new();
        for _ in 0..3 {
            input.extend_from_slice(FRAME_A);
        }
        for frame in framer.push(&input) {
            publisher.publish("AA:BB", frame);
        }

        // Subscribers still see every sample.
        for _ in 0..3 {
            assert!(sample_rx.try_recv().is_ok());
        }
        assert!(frame_rx.try_recv().is_ok());
        assert!(frame_rx.try_recv().is_err());
        assert_eq!(publisher.dropped_frames(), 2);
    }

    #[tokio::test]
    async fn test_publisher_fans_out() {
        let (sample_tx, mut sample_rx) = broadcast::channel(8);
        let (frame_tx, mut frame_rx) = mpsc::channel(8);
        let publisher = SamplePublisher::new(sample_tx, Some(frame_tx));
        let mut second = publisher.subscribe();

        let mut framer = SampleFramer::new();
        for frame in framer.push(FRAME_A) {
            publisher.publish("00:11:22:33:44:55", frame);
        }

        let expected = decode_frame(FRAME_A).unwrap();
        assert_eq!(sample_rx.recv().await.unwrap(), expected);
        assert_eq!(second.recv().await.unwrap(), expected);

        let recorded = frame_rx.recv().await.unwrap();
        assert_eq!(recorded.device, "00:11:22:33:44:55");
        assert_eq!(recorded.frame.raw.as_bytes(), FRAME_A);
    }
}
