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

//! Bluetooth communication module.
//!
//! RFCOMM session lifecycle, the camera's framed wire protocol, and image
//! chunk reassembly.

mod handler;
mod protocol;
mod reassembler;
mod session;
mod transport;

pub use handler::{CompletedImage, HandlerOutput, ProtocolHandler};
pub use protocol::{
    DataCategory, Frame, FrameKind, RequestCategory, ResponseCategory, PREAMBLE_LENGTH,
    RESPONSE_PACKET_NUMBER,
};
pub use reassembler::{ImageReassembler, IMAGE_BUFFER_CAPACITY};
pub use session::{ReconnectPolicy, SessionEvent, SessionManager, SessionState};
pub use transport::{
    BoxedSession, PeerId, RfcommTransport, SessionStream, Transport, DEFAULT_RFCOMM_CHANNEL,
    SPP_UUID,
};
