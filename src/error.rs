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

//! Error types for the Bluetooth link.

use thiserror::Error;

/// Transport-level failures. All of these are recoverable: the session drops
/// back to `Idle` and, in the server role, listening resumes.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error on the RFCOMM socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// BlueZ error during adapter or socket operations.
    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] bluer::Error),

    /// Peer address could not be parsed.
    #[error("invalid peer address: {0}")]
    InvalidPeer(String),

    /// A send was requested while no session is connected.
    #[error("not connected")]
    NotConnected,
}

/// Protocol-level failures while parsing or handling frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame shorter than the 6-byte preamble. Dropped without a response.
    #[error("frame truncated: {len} bytes")]
    Truncated { len: usize },

    /// Unrecognized frame kind byte. Logged and ignored.
    #[error("unknown frame kind: {0:#04x}")]
    UnknownKind(u8),

    /// Unrecognized category for an otherwise valid kind. Logged and ignored.
    #[error("unknown category {category:#04x} for kind {kind:#04x}")]
    UnknownCategory { kind: u8, category: u8 },

    /// Image chunk would overrun the reassembly buffer. Session-fatal.
    #[error("image buffer overflow: {needed} bytes exceeds capacity {capacity}")]
    BufferOverflow { needed: usize, capacity: usize },
}

impl ProtocolError {
    /// Whether this error must tear the session down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::BufferOverflow { .. })
    }
}
