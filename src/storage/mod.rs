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

//! Persistence for completed captures and the transfer history.

mod transfers;

pub use transfers::{TransferLog, TransferRecord};

use anyhow::Result;
use std::path::PathBuf;
use tracing::{debug, info};

/// Writes completed captures to the pictures directory.
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Write a capture. An existing file with the same name is replaced.
    ///
    /// The name comes off the wire, so only its final path component is
    /// used.
    pub fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(sanitize_file_name(file_name));

        if path.exists() {
            debug!("Replacing existing capture: {:?}", path);
            std::fs::remove_file(&path)?;
        }

        std::fs::write(&path, bytes)?;
        info!("Saved capture {:?} ({} bytes)", path, bytes.len());
        Ok(path)
    }
}

/// Reduce a wire-supplied name to a safe file name.
fn sanitize_file_name(name: &str) -> String {
    let base = name
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    if base.is_empty() || base == "." || base == ".." {
        "capture.bin".to_string()
    } else {
        base.to_string()
    }
}
