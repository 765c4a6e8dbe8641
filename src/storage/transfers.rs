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

//! Transfer history storage using SQLite.

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// One received capture.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub id: i64,
    pub timestamp: DateTime<Local>,
    pub file_name: String,
    pub size_bytes: i64,
    pub peer: Option<String>,
}

/// Transfer history database manager.
#[derive(Clone)]
pub struct TransferLog {
    conn: Arc<Mutex<Connection>>,
    max_entries: u32,
}

impl TransferLog {
    /// Create or open the transfer database.
    pub fn new(data_dir: &Path, max_entries: u32) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("transfers.db");
        info!("Opening transfer database: {:?}", db_path);

        let conn = Connection::open(&db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS transfers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                file_name TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                peer TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transfers_timestamp ON transfers(timestamp DESC)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_entries,
        })
    }

    /// Record a received capture.
    pub fn record(&self, file_name: &str, size_bytes: usize, peer: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let timestamp = Local::now().timestamp();

        conn.execute(
            "INSERT INTO transfers (timestamp, file_name, size_bytes, peer) VALUES (?1, ?2, ?3, ?4)",
            params![timestamp, file_name, size_bytes as i64, peer],
        )?;

        self.cleanup_old_entries(&conn)?;

        Ok(())
    }

    /// Get the most recent transfers.
    pub fn recent(&self, limit: u32) -> Result<Vec<TransferRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, file_name, size_bytes, peer
             FROM transfers
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;

        let records = stmt
            .query_map([limit], |row| {
                let timestamp_secs: i64 = row.get(1)?;

                Ok(TransferRecord {
                    id: row.get(0)?,
                    timestamp: Local.timestamp_opt(timestamp_secs, 0).unwrap(),
                    file_name: row.get(2)?,
                    size_bytes: row.get(3)?,
                    peer: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Get total transfer count.
    pub fn count(&self) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let count: u32 = conn.query_row("SELECT COUNT(*) FROM transfers", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Remove old entries beyond max_entries.
    fn cleanup_old_entries(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "DELETE FROM transfers WHERE id NOT IN (
                SELECT id FROM transfers ORDER BY timestamp DESC, id DESC LIMIT ?1
            )",
            [self.max_entries],
        )?;
        Ok(())
    }
}
