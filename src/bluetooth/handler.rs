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

//! Per-session protocol handling.
//!
//! One handler instance lives inside each connected session's read loop and
//! processes one inbound frame at a time, producing at most one response
//! frame and, on image completion, a completed capture.

use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use super::protocol::{DataCategory, Frame, FrameKind, RequestCategory, ResponseCategory};
use super::reassembler::ImageReassembler;
use crate::error::ProtocolError;

const OK_RESPONSE: &[u8] = b"ok";
const I_AM_READY_RESPONSE: &[u8] = b"i am ready";
const IMAGE_RECEIVED_RESPONSE: &[u8] = b"image received";

/// A fully reassembled capture, ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Result of handling one inbound chunk.
#[derive(Debug, Default)]
pub struct HandlerOutput {
    /// The decoded frame, for observers. `None` when the chunk was dropped.
    pub frame: Option<Frame>,
    /// Response frame to write back, if the frame calls for one.
    pub response: Option<Frame>,
    /// Completed capture, present only for an accepted "image sent" request.
    pub image: Option<CompletedImage>,
}

/// Protocol state machine over inbound frames.
///
/// Owns the reassembly buffer; everything else is per-call. Never shared
/// across sessions.
pub struct ProtocolHandler {
    reassembler: ImageReassembler,
}

impl ProtocolHandler {
    /// Create a handler with an idle reassembly buffer.
    pub fn new() -> Self {
        Self {
            reassembler: ImageReassembler::new(),
        }
    }

    /// Handle one transport read.
    ///
    /// Undecodable chunks are dropped without a response. The only fatal
    /// error is a reassembly buffer overflow, which must close the session.
    pub fn handle_chunk(&mut self, chunk: &[u8]) -> Result<HandlerOutput, ProtocolError> {
        let frame = match Frame::decode(chunk) {
            Ok(frame) => frame,
            Err(ProtocolError::Truncated { len }) => {
                debug!("Dropping truncated chunk: {} bytes", len);
                return Ok(HandlerOutput::default());
            }
            Err(e) => {
                warn!("Dropping undecodable chunk: {}", e);
                return Ok(HandlerOutput::default());
            }
        };

        let mut output = HandlerOutput::default();

        match frame.kind {
            FrameKind::Request => self.handle_request(&frame, &mut output),
            FrameKind::Data => self.handle_data(&frame, &mut output)?,
            FrameKind::Response => {
                // The camera acknowledges host-initiated sends; nothing to do.
                debug!(
                    "Response frame from peer: category {:#04x}, {} bytes",
                    frame.category,
                    frame.payload.len()
                );
            }
        }

        output.frame = Some(frame);
        Ok(output)
    }

    fn handle_request(&mut self, frame: &Frame, output: &mut HandlerOutput) {
        let Some(category) = RequestCategory::from_byte(frame.category) else {
            warn!("Unknown request category: {:#04x}", frame.category);
            return;
        };

        match category {
            RequestCategory::Time => {
                debug!("Time request");
                output.response = Some(Frame::response(
                    ResponseCategory::Time,
                    current_time_payload().to_vec(),
                ));
            }
            RequestCategory::ImageIncoming => {
                debug!("Image incoming, resetting reassembly buffer");
                self.reassembler.begin();
                output.response = Some(Frame::response(ResponseCategory::ImageIncoming, OK_RESPONSE));
            }
            RequestCategory::AreYouReady => {
                debug!("Readiness probe");
                output.response =
                    Some(Frame::response(ResponseCategory::AreYouReady, I_AM_READY_RESPONSE));
            }
            RequestCategory::ImageSent => {
                let file_name = frame.payload_text();
                let bytes = self.reassembler.finish();
                debug!("Image transfer complete: {} ({} bytes)", file_name, bytes.len());

                output.response =
                    Some(Frame::response(ResponseCategory::ImageSent, IMAGE_RECEIVED_RESPONSE));
                output.image = Some(CompletedImage { file_name, bytes });
            }
        }
    }

    fn handle_data(&mut self, frame: &Frame, output: &mut HandlerOutput) -> Result<(), ProtocolError> {
        match DataCategory::from_byte(frame.category) {
            Some(DataCategory::Image) => {
                if !self.reassembler.is_active() {
                    debug!("Image chunk outside a transfer, ignoring");
                    return Ok(());
                }

                let written = self.reassembler.append(frame.sequence, &frame.payload)?;
                output.response = Some(Frame::response(
                    ResponseCategory::ImageData,
                    written.to_string().into_bytes(),
                ));
            }
            Some(DataCategory::Other) => {
                debug!("Other data frame: {} bytes", frame.payload.len());
            }
            None => {
                warn!("Unknown data category: {:#04x}", frame.category);
            }
        }
        Ok(())
    }
}

impl Default for ProtocolHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Current epoch milliseconds, byte-reversed: the camera expects the reverse
/// of the host's native little-endian encoding.
fn current_time_payload() -> [u8; 8] {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;

    let mut bytes = millis.to_le_bytes();
    bytes.reverse();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::protocol::RESPONSE_PACKET_NUMBER;

    fn request(category: RequestCategory, payload: &[u8]) -> Vec<u8> {
        Frame::request(category, 0, payload).encode()
    }

    fn image_chunk(sequence: u16, payload: &[u8]) -> Vec<u8> {
        Frame::data(DataCategory::Image, sequence, payload).encode()
    }

    #[test]
    fn test_time_request() {
        let mut handler = ProtocolHandler::new();

        let output = handler
            .handle_chunk(&[0x0A, 0x00, 0x00, 0x00, 0x00, 0x00])
            .unwrap();

        let response = output.response.unwrap();
        assert_eq!(response.kind, FrameKind::Response);
        assert_eq!(response.category, ResponseCategory::Time as u8);
        assert_eq!(response.sequence, RESPONSE_PACKET_NUMBER);
        assert_eq!(response.payload.len(), 8);

        // Undo the byte reversal and sanity-check against the clock.
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&response.payload);
        bytes.reverse();
        let reported = u64::from_le_bytes(bytes);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        assert!(now.abs_diff(reported) < 5_000);
    }

    #[test]
    fn test_are_you_ready() {
        let mut handler = ProtocolHandler::new();
        let output = handler
            .handle_chunk(&request(RequestCategory::AreYouReady, b""))
            .unwrap();

        let response = output.response.unwrap();
        assert_eq!(response.category, ResponseCategory::AreYouReady as u8);
        assert_eq!(response.payload, b"i am ready");
        assert!(output.image.is_none());
    }

    #[test]
    fn test_image_transfer_flow() {
        let mut handler = ProtocolHandler::new();

        let output = handler
            .handle_chunk(&request(RequestCategory::ImageIncoming, b""))
            .unwrap();
        assert_eq!(output.response.unwrap().payload, b"ok");

        for (seq, len) in [(1u16, 100usize), (2, 200), (3, 50)] {
            let output = handler
                .handle_chunk(&image_chunk(seq, &vec![seq as u8; len]))
                .unwrap();
            let response = output.response.unwrap();
            assert_eq!(response.category, ResponseCategory::ImageData as u8);
            assert_eq!(response.payload, len.to_string().as_bytes());
        }

        let output = handler
            .handle_chunk(&request(RequestCategory::ImageSent, b"capture_001.jpg"))
            .unwrap();
        assert_eq!(output.response.unwrap().payload, b"image received");

        let image = output.image.unwrap();
        assert_eq!(image.file_name, "capture_001.jpg");
        assert_eq!(image.bytes.len(), 350);
        assert_eq!(&image.bytes[..100], &[1u8; 100][..]);
        assert_eq!(&image.bytes[100..300], &[2u8; 200][..]);
        assert_eq!(&image.bytes[300..], &[3u8; 50][..]);
    }

    #[test]
    fn test_chunks_concatenate_in_arrival_order() {
        let mut handler = ProtocolHandler::new();
        handler
            .handle_chunk(&request(RequestCategory::ImageIncoming, b""))
            .unwrap();

        // Packet numbers 3, 1, 2: no reordering, no gap rejection.
        handler.handle_chunk(&image_chunk(3, b"ccc")).unwrap();
        handler.handle_chunk(&image_chunk(1, b"a")).unwrap();
        handler.handle_chunk(&image_chunk(2, b"bb")).unwrap();

        let output = handler
            .handle_chunk(&request(RequestCategory::ImageSent, b"x.jpg"))
            .unwrap();
        assert_eq!(output.image.unwrap().bytes, b"cccabb");
    }

    #[test]
    fn test_image_chunk_ignored_when_no_transfer_announced() {
        let mut handler = ProtocolHandler::new();
        let output = handler.handle_chunk(&image_chunk(1, b"stray")).unwrap();

        assert!(output.response.is_none());
        assert!(output.image.is_none());
        assert!(output.frame.is_some());
    }

    #[test]
    fn test_truncated_chunk_dropped_silently() {
        let mut handler = ProtocolHandler::new();
        let output = handler.handle_chunk(&[0x0A, 0x00, 0x00]).unwrap();

        assert!(output.frame.is_none());
        assert!(output.response.is_none());
    }

    #[test]
    fn test_unknown_request_category_gets_no_response() {
        let mut handler = ProtocolHandler::new();
        let output = handler
            .handle_chunk(&[0x0A, 0x09, 0x00, 0x00, 0x00, 0x00])
            .unwrap();

        assert!(output.frame.is_some());
        assert!(output.response.is_none());
    }

    #[test]
    fn test_other_data_and_peer_responses_unanswered() {
        let mut handler = ProtocolHandler::new();

        let output = handler
            .handle_chunk(&Frame::data(DataCategory::Other, 1, &b"aux"[..]).encode())
            .unwrap();
        assert!(output.response.is_none());

        let output = handler
            .handle_chunk(&Frame::response(ResponseCategory::ImageData, &b"42"[..]).encode())
            .unwrap();
        assert!(output.response.is_none());
    }

    #[test]
    fn test_overflow_is_fatal() {
        let mut handler = ProtocolHandler::new();
        handler
            .handle_chunk(&request(RequestCategory::ImageIncoming, b""))
            .unwrap();

        let big = vec![0u8; 600 * 1024];
        handler.handle_chunk(&image_chunk(1, &big)).unwrap();
        let err = handler.handle_chunk(&image_chunk(2, &big)).unwrap_err();

        assert!(err.is_fatal());
    }
}
