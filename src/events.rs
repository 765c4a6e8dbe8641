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

//! Event processing for the session event stream.

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::bluetooth::{SessionEvent, SessionManager};
use crate::storage::{ImageStore, TransferLog};

/// Processes events from the Bluetooth session.
pub struct EventProcessor {
    store: ImageStore,
    transfers: TransferLog,
    manager: SessionManager,
}

impl EventProcessor {
    /// Create a new event processor.
    pub fn new(store: ImageStore, transfers: TransferLog, manager: SessionManager) -> Self {
        Self {
            store,
            transfers,
            manager,
        }
    }

    /// Process a single event.
    pub async fn process_event(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::StateChanged(state) => {
                info!("Session state changed: {}", state);
            }
            SessionEvent::FrameObserved(frame) => {
                debug!(
                    "Frame from peer: {:?} category {:#04x} packet {} ({} bytes)",
                    frame.kind,
                    frame.category,
                    frame.sequence,
                    frame.payload.len()
                );
            }
            SessionEvent::ImageComplete { file_name, bytes } => {
                self.handle_image(&file_name, &bytes)?;
            }
            SessionEvent::ConnectionLost { peer } => {
                warn!("Connection to {} lost", peer);
            }
            SessionEvent::Error(e) => {
                error!("Session error: {}", e);
            }
        }
        Ok(())
    }

    /// Persist a completed capture and record it in the transfer history.
    fn handle_image(&self, file_name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.store.save(file_name, bytes)?;

        let peer = self.manager.connected_peer().map(|p| p.to_string());
        if let Err(e) = self.transfers.record(file_name, bytes.len(), peer.as_deref()) {
            error!("Failed to record transfer: {}", e);
        }

        info!("Capture stored at {:?}", path);
        Ok(())
    }
}
