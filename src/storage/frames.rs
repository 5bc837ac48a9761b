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

//! Recorded sample frames, stored in SQLite.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bluetooth::{RecordedFrameRequest, Sample};

/// A single recorded frame.
#[derive(Debug, Clone)]
pub struct RecordedFrame {
    pub id: i64,
    pub timestamp: DateTime<Local>,
    pub device: String,
    pub raw: String,
    pub sample: Sample,
}

/// Frame database manager.
#[derive(Clone)]
pub struct FrameStore {
    conn: Arc<Mutex<Connection>>,
    max_entries: u32,
}

impl FrameStore {
    /// Create or open the frame database.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("frames.db");
        info!("Opening frame database: {:?}", db_path);

        let conn = Connection::open(&db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS frames (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                device TEXT NOT NULL,
                raw TEXT NOT NULL,
                channels TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_frames_timestamp ON frames(timestamp DESC)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_entries: 100_000,
        })
    }

    /// Set maximum number of frames to keep.
    pub fn set_max_entries(&mut self, max: u32) {
        self.max_entries = max;
    }

    /// Store one accepted frame.
    pub fn add_frame(&self, device: &str, raw: &str, sample: &Sample) -> Result<()> {
        let conn = self.conn.lock();
        let timestamp = Local::now().timestamp_millis();
        let channels = serde_json::to_string(sample)?;

        conn.execute(
            "INSERT INTO frames (timestamp, device, raw, channels) VALUES (?1, ?2, ?3, ?4)",
            params![timestamp, device, raw, channels],
        )?;

        let newest = conn.last_insert_rowid();
        self.cleanup_old_entries(&conn, newest)?;

        Ok(())
    }

    /// Most recent frames, newest first.
    pub fn get_recent(&self, limit: u32) -> Result<Vec<RecordedFrame>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, device, raw, channels
             FROM frames
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt
            .query_map([limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, millis, device, raw, channels)| {
                let timestamp = Local
                    .timestamp_millis_opt(millis)
                    .single()
                    .ok_or_else(|| anyhow!("Invalid timestamp {} in frame {}", millis, id))?;
                Ok(RecordedFrame {
                    id,
                    timestamp,
                    device,
                    raw,
                    sample: serde_json::from_str(&channels)?,
                })
            })
            .collect()
    }

    /// Export frames to a text file, oldest first.
    pub fn export(&self, path: &Path) -> Result<()> {
        let frames = self.get_recent(self.max_entries)?;
        let mut content = String::new();

        for frame in frames.iter().rev() {
            content.push_str(&format!(
                "[{}] {}: {}\n",
                frame.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                frame.device,
                frame.raw
            ));
        }

        std::fs::write(path, content)?;
        info!("Exported {} frames to {:?}", frames.len(), path);
        Ok(())
    }

    /// Delete all frames.
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM frames", [])?;
        info!("Frame history cleared");
        Ok(())
    }

    /// Get total frame count.
    pub fn count(&self) -> Result<u32> {
        let conn = self.conn.lock();
        let count: u32 = conn.query_row("SELECT COUNT(*) FROM frames", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Remove frames older than the newest `max_entries`.
    ///
    /// Ids only grow (AUTOINCREMENT), so the cut is a range delete on the
    /// primary key.
    fn cleanup_old_entries(&self, conn: &Connection, newest: i64) -> Result<()> {
        let cutoff = newest - i64::from(self.max_entries);
        if cutoff > 0 {
            conn.execute("DELETE FROM frames WHERE id <= ?1", [cutoff])?;
        }
        Ok(())
    }
}

/// Run the recorder on the blocking pool until the frame queue closes.
pub fn spawn_recorder(
    store: FrameStore,
    mut frame_rx: mpsc::Receiver<RecordedFrameRequest>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        debug!("Frame recorder started");
        while let Some(request) = frame_rx.blocking_recv() {
            if let Err(e) =
                store.add_frame(&request.device, &request.frame.raw, &request.frame.sample)
            {
                error!("Failed to record frame: {}", e);
            }
        }
        debug!("Frame recorder stopped");
    })
}
