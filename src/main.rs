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

//! SenseLink Desktop daemon.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use senselink_desktop::bluetooth::{PeerId, RfcommTransport, SessionManager};
use senselink_desktop::config::Config;
use senselink_desktop::events::EventProcessor;
use senselink_desktop::storage::{ImageStore, TransferLog};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("senselink_desktop=info".parse().unwrap()),
        )
        .init();

    info!("Starting SenseLink Desktop v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    // Initialize storage
    let store = ImageStore::new(config.pictures_dir())?;
    let transfers = TransferLog::new(&config.data_dir, config.storage.max_history_entries)?;
    info!("Capture storage initialized");

    // Bring up the RFCOMM transport
    let transport = Arc::new(RfcommTransport::new(config.bluetooth.channel).await?);
    transport.set_name(&config.bluetooth.device_name).await?;
    info!("Adapter address: {}", transport.address().await?);

    // Start the session state machine
    let (manager, mut events) = SessionManager::new(transport, config.session.reconnect_policy());

    match config.bluetooth.camera_address.as_deref() {
        Some(address) if !address.is_empty() => {
            info!("Dialing configured camera {}", address);
            manager.connect_to(PeerId::new(address)).await;
        }
        _ => {
            info!("Waiting for the camera to connect");
            manager.start_server().await;
        }
    }

    // Process session events
    let mut processor = EventProcessor::new(store, transfers, manager.clone());
    let event_loop = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Err(e) = processor.process_event(event).await {
                error!("Error processing event: {}", e);
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    manager.stop().await;
    event_loop.abort();

    Ok(())
}
