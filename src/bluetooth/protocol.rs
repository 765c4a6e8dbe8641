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

//! Wire protocol definitions and the frame codec.
//!
//! Every frame starts with a 6-byte preamble: kind, category, declared
//! payload length (little-endian u16), packet number (little-endian u16),
//! followed by the payload. Textual frames carry one trailing NUL terminator
//! for the camera firmware's C-string consumers.

use crate::error::ProtocolError;

/// Preamble length in bytes.
pub const PREAMBLE_LENGTH: usize = 6;

/// Packet number carried by every response frame. The camera ignores it.
pub const RESPONSE_PACKET_NUMBER: u16 = 1;

/// Frame kinds supported by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Request = 0x0A,
    Data = 0x0B,
    Response = 0x0C,
}

impl FrameKind {
    /// Parse a kind byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x0A => Some(Self::Request),
            0x0B => Some(Self::Data),
            0x0C => Some(Self::Response),
            _ => None,
        }
    }

    /// Requests and responses carry text; data frames carry raw bytes.
    fn is_textual(self) -> bool {
        matches!(self, Self::Request | Self::Response)
    }
}

/// Request categories sent by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestCategory {
    Time = 0x00,
    ImageIncoming = 0x01,
    AreYouReady = 0x02,
    ImageSent = 0x03,
}

impl RequestCategory {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Time),
            0x01 => Some(Self::ImageIncoming),
            0x02 => Some(Self::AreYouReady),
            0x03 => Some(Self::ImageSent),
            _ => None,
        }
    }
}

/// Data categories sent by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataCategory {
    Image = 0x00,
    Other = 0x01,
}

impl DataCategory {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Image),
            0x01 => Some(Self::Other),
            _ => None,
        }
    }
}

/// Response categories. The first four mirror the request they answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseCategory {
    Time = 0x00,
    ImageIncoming = 0x01,
    AreYouReady = 0x02,
    ImageSent = 0x03,
    ImageData = 0x04,
    OtherData = 0x05,
}

/// One decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Raw category byte; its meaning depends on `kind`.
    pub category: u8,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a request frame.
    pub fn request(category: RequestCategory, sequence: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: FrameKind::Request,
            category: category as u8,
            sequence,
            payload: payload.into(),
        }
    }

    /// Create a data frame.
    pub fn data(category: DataCategory, sequence: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: FrameKind::Data,
            category: category as u8,
            sequence,
            payload: payload.into(),
        }
    }

    /// Create a response frame. Responses always go out with packet number 1.
    pub fn response(category: ResponseCategory, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: FrameKind::Response,
            category: category as u8,
            sequence: RESPONSE_PACKET_NUMBER,
            payload: payload.into(),
        }
    }

    /// Payload interpreted as text (lossy).
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let terminator = usize::from(self.kind.is_textual());
        let mut buf = Vec::with_capacity(PREAMBLE_LENGTH + self.payload.len() + terminator);

        buf.push(self.kind as u8);
        buf.push(self.category);

        // Declared length field. Advisory only: the camera firmware writes a
        // saturated value here for payloads longer than 250 bytes, so both
        // ends size the payload from the frame itself (see decode).
        let declared = self.payload.len() as u16;
        buf.extend_from_slice(&declared.to_le_bytes());

        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.payload);

        if terminator == 1 {
            buf.push(b'\0');
        }

        buf
    }

    /// Parse wire bytes into a frame.
    ///
    /// The declared length field (bytes 2-3) is not trusted; the payload
    /// length is always derived from the total frame size.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < PREAMBLE_LENGTH {
            return Err(ProtocolError::Truncated { len: buf.len() });
        }

        let kind = FrameKind::from_byte(buf[0]).ok_or(ProtocolError::UnknownKind(buf[0]))?;
        let category = buf[1];
        let sequence = u16::from_le_bytes([buf[4], buf[5]]);

        let mut payload = buf[PREAMBLE_LENGTH..].to_vec();
        // Textual payloads arrive NUL-terminated; drop the terminator so the
        // payload round-trips. Data payloads are raw and left untouched.
        if kind.is_textual() && payload.last() == Some(&b'\0') {
            payload.pop();
        }

        Ok(Self {
            kind,
            category,
            sequence,
            payload,
        })
    }
}
