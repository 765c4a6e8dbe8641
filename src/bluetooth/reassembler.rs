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

//! Image chunk reassembly.

use tracing::{debug, warn};

use crate::error::ProtocolError;

/// Fixed reassembly capacity: 1 MiB, sized for the camera's largest capture.
pub const IMAGE_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Accumulates image chunks into a single buffer between an "image incoming"
/// announcement and the matching "image sent" completion.
///
/// Chunks are appended in arrival order. The packet number of each chunk is
/// recorded but not enforced; the camera retries at the transport level and
/// reordering has not been observed on RFCOMM.
pub struct ImageReassembler {
    buffer: Vec<u8>,
    active: bool,
    last_sequence: u16,
}

impl ImageReassembler {
    /// Create an inactive reassembler.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            active: false,
            last_sequence: 0,
        }
    }

    /// Start a new image. Any partial data from an aborted transfer is
    /// discarded.
    pub fn begin(&mut self) {
        if self.active && !self.buffer.is_empty() {
            warn!(
                "Discarding {} bytes of incomplete image data",
                self.buffer.len()
            );
        }
        self.buffer.clear();
        self.active = true;
        self.last_sequence = 0;
    }

    /// Append one chunk.
    ///
    /// Returns the number of bytes written, or `BufferOverflow` when the
    /// chunk would exceed the fixed capacity.
    pub fn append(&mut self, sequence: u16, chunk: &[u8]) -> Result<usize, ProtocolError> {
        let needed = self.buffer.len() + chunk.len();
        if needed > IMAGE_BUFFER_CAPACITY {
            return Err(ProtocolError::BufferOverflow {
                needed,
                capacity: IMAGE_BUFFER_CAPACITY,
            });
        }

        if sequence != self.last_sequence.wrapping_add(1) {
            debug!(
                "Chunk packet number {} after {} (appending anyway)",
                sequence, self.last_sequence
            );
        }

        self.buffer.extend_from_slice(chunk);
        self.last_sequence = sequence;
        Ok(chunk.len())
    }

    /// Complete the image: deactivate and drain the buffer.
    pub fn finish(&mut self) -> Vec<u8> {
        self.active = false;
        self.last_sequence = 0;
        std::mem::take(&mut self.buffer)
    }

    /// Whether an image transfer is in progress.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Bytes accumulated so far.
    pub fn bytes_written(&self) -> usize {
        self.buffer.len()
    }

    /// Packet number of the most recently appended chunk.
    pub fn last_sequence(&self) -> u16 {
        self.last_sequence
    }
}

impl Default for ImageReassembler {
    fn default() -> Self {
        Self::new()
    }
}
