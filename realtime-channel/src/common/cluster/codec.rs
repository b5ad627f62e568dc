/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */


//! Frame codec for envelopes exchanged between nodes.
//!
//! # Wire Format
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Wire Version (1 byte, currently 0x01)        │
//! ├──────────────────────────────────────────────┤
//! │ Format (1 byte)                              │
//! │   0x01 = JSON                                │
//! ├──────────────────────────────────────────────┤
//! │ Payload (remaining bytes)                    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Framing on the link itself (length prefixes, message boundaries) is the
//! transport's business; the codec sees whole frames.

use crate::message::{BusError, Envelope};

/// Wire version byte.
pub const WIRE_VERSION: u8 = 0x01;

/// Header size: version + format.
pub const HEADER_SIZE: usize = 2;

/// Serialization format of the frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// JSON (UTF-8, human-readable).
    #[default]
    Json,
}

impl Format {
    /// Format byte for JSON.
    pub const JSON_BYTE: u8 = 0x01;

    /// Convert format to wire byte.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Json => Self::JSON_BYTE,
        }
    }

    /// Parse format from wire byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            Self::JSON_BYTE => Some(Self::Json),
            _ => None,
        }
    }
}

/// Encodes and decodes envelope frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    format: Format,
    max_frame_size: usize,
}

impl FrameCodec {
    /// A JSON codec rejecting frames larger than `max_frame_size` bytes.
    #[must_use]
    pub const fn new(max_frame_size: usize) -> Self {
        Self {
            format: Format::Json,
            max_frame_size,
        }
    }

    /// Encodes an envelope into one frame.
    ///
    /// # Errors
    ///
    /// [`BusError::Codec`] if the envelope cannot be serialized or the frame
    /// would exceed the maximum size.
    pub fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, BusError> {
        let mut frame = Vec::with_capacity(HEADER_SIZE + 128);
        frame.push(WIRE_VERSION);
        frame.push(self.format.to_byte());
        match self.format {
            Format::Json => serde_json::to_writer(&mut frame, envelope)
                .map_err(|e| BusError::Codec(format!("encode failed: {e}")))?,
        }
        if frame.len() > self.max_frame_size {
            return Err(BusError::Codec(format!(
                "frame of {} bytes exceeds maximum of {}",
                frame.len(),
                self.max_frame_size
            )));
        }
        Ok(frame)
    }

    /// Decodes one frame.
    ///
    /// # Errors
    ///
    /// [`BusError::Codec`] for oversized or truncated frames, unknown
    /// versions or formats, and malformed payloads.
    pub fn decode(&self, frame: &[u8]) -> Result<Envelope, BusError> {
        if frame.len() > self.max_frame_size {
            return Err(BusError::Codec(format!(
                "frame of {} bytes exceeds maximum of {}",
                frame.len(),
                self.max_frame_size
            )));
        }
        let [version, format_byte, payload @ ..] = frame else {
            return Err(BusError::Codec("frame shorter than header".into()));
        };
        if *version != WIRE_VERSION {
            return Err(BusError::Codec(format!(
                "unsupported wire version {version:#04x}"
            )));
        }
        match Format::from_byte(*format_byte) {
            Some(Format::Json) => serde_json::from_slice(payload)
                .map_err(|e| BusError::Codec(format!("decode failed: {e}"))),
            None => Err(BusError::Codec(format!(
                "unknown format byte {format_byte:#04x}"
            ))),
        }
    }
}
