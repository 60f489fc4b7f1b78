//! Whispered beacon frame construction
//!
//! A whispered beacon is a fixed 802.11 beacon header followed by the
//! serialized status record, split into tagged chunks:
//!
//! ```text
//! [36-byte beacon header] ([0xDE][len <= 255][len payload bytes])* [slack]
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::radio::{RadioInterface, RadioTx};
use crate::status::StatusSource;
use crate::{BeaconError, Result};

/// Length of the fixed beacon header
pub const BEACON_HEADER_LEN: usize = 36;

/// Maximum payload bytes per chunk
pub const CHUNK_SIZE: usize = 0xFF;

/// Tag overhead per chunk (identifier + length)
pub const CHUNK_TAG_LEN: usize = 2;

/// Substitute for payload bytes that are not printable ASCII
pub const PLACEHOLDER: u8 = b'?';

/// Largest frame handed to an ESP32-class raw transmit call
pub const DEFAULT_MAX_FRAME_LEN: usize = 1500;

/// Default pause before each transmit
pub const DEFAULT_TX_DELAY: Duration = Duration::from_millis(102);

pub const BROADCAST_ADDR: [u8; 6] = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
pub const SIGNATURE_ADDR: [u8; 6] = [0xde, 0xad, 0xbe, 0xef, 0xde, 0xad];
pub const BSSID_ADDR: [u8; 6] = [0xa1, 0x00, 0x64, 0xe6, 0x0b, 0x8b];

/// Capability info field (privacy, short slot time, ESS)
pub const CAPABILITY_INFO: u16 = 0x0411;

/// Beacon interval in time units
pub const BEACON_INTERVAL: u16 = 0x0064;

/// Header copied to the front of every whispered beacon
#[rustfmt::skip]
pub const BEACON_TEMPLATE: [u8; BEACON_HEADER_LEN] = [
    0x80, 0x00,                             // frame control: management / beacon
    0x00, 0x00,                             // duration
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff,     // destination: broadcast
    0xde, 0xad, 0xbe, 0xef, 0xde, 0xad,     // source
    0xa1, 0x00, 0x64, 0xe6, 0x0b, 0x8b,     // bssid
    0x40, 0x43,                             // sequence control
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // timestamp
    0x64, 0x00,                             // beacon interval
    0x11, 0x04,                             // capability info
];

/// Information element identifiers used by the whisper protocol
///
/// Only `Payload` is emitted; the others are reserved by peers that parse
/// compressed, signed or streamed announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhisperTag {
    Payload,
    Compression,
    Identity,
    Signature,
    StreamHeader,
    Unknown(u8),
}

impl From<u8> for WhisperTag {
    fn from(value: u8) -> Self {
        match value {
            0xDE => Self::Payload,
            0xDF => Self::Compression,
            0xE0 => Self::Identity,
            0xE1 => Self::Signature,
            0xE2 => Self::StreamHeader,
            other => Self::Unknown(other),
        }
    }
}

impl From<WhisperTag> for u8 {
    fn from(tag: WhisperTag) -> Self {
        match tag {
            WhisperTag::Payload => 0xDE,
            WhisperTag::Compression => 0xDF,
            WhisperTag::Identity => 0xE0,
            WhisperTag::Signature => 0xE1,
            WhisperTag::StreamHeader => 0xE2,
            WhisperTag::Unknown(val) => val,
        }
    }
}

/// Map a payload byte to its transmitted form
pub fn sanitize_byte(byte: u8) -> u8 {
    if byte == b' ' || byte.is_ascii_graphic() {
        byte
    } else {
        PLACEHOLDER
    }
}

/// Number of chunks needed for `payload_len` bytes
pub fn chunk_count(payload_len: usize) -> usize {
    (payload_len + CHUNK_SIZE - 1) / CHUNK_SIZE
}

/// Frame assembly and transmit settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSettings {
    /// Interface the frame is transmitted on
    pub interface: RadioInterface,
    /// Pause before each transmit
    pub tx_delay: Duration,
    /// Zeroed bytes reserved after the last chunk
    ///
    /// Legacy whispered beacons always reserved 255 bytes here.
    pub slack: usize,
    /// Largest transmitted length accepted, slack included
    pub max_frame_len: usize,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            interface: RadioInterface::Station,
            tx_delay: DEFAULT_TX_DELAY,
            slack: 0,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Fully assembled whispered beacon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitBuffer {
    bytes: Bytes,
    payload_len: usize,
    chunk_count: usize,
    slack: usize,
}

impl TransmitBuffer {
    /// Whole buffer as transmitted, slack included
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn header(&self) -> &[u8] {
        &self.bytes[..BEACON_HEADER_LEN]
    }

    /// Tagged chunk region between the header and the slack
    pub fn chunk_region(&self) -> &[u8] {
        &self.bytes[BEACON_HEADER_LEN..self.bytes.len() - self.slack]
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn slack(&self) -> usize {
        self.slack
    }

    /// Walk the chunks of this buffer in order
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks {
            remaining: self.chunk_region(),
        }
    }

    /// Concatenated chunk data (the sanitized payload)
    pub fn payload(&self) -> Vec<u8> {
        self.chunks().flat_map(|(_, data)| data.iter().copied()).collect()
    }
}

/// Iterator over `(tag, data)` pairs of an assembled buffer
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for Chunks<'a> {
    type Item = (WhisperTag, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.len() < CHUNK_TAG_LEN {
            return None;
        }
        let tag = WhisperTag::from(self.remaining[0]);
        let len = usize::from(self.remaining[1]);
        let end = (CHUNK_TAG_LEN + len).min(self.remaining.len());
        let data = &self.remaining[CHUNK_TAG_LEN..end];
        self.remaining = &self.remaining[end..];
        Some((tag, data))
    }
}

/// Assemble a whispered beacon around `payload`
///
/// Every payload byte lands in exactly one chunk, in order, behind a
/// `[0xDE][len]` tag; non-printable bytes are replaced by [`PLACEHOLDER`].
pub fn assemble(payload: &[u8], settings: &FrameSettings) -> Result<TransmitBuffer> {
    let chunk_count = chunk_count(payload.len());
    let frame_len =
        BEACON_HEADER_LEN + payload.len() + chunk_count * CHUNK_TAG_LEN + settings.slack;
    if frame_len > settings.max_frame_len {
        return Err(BeaconError::FrameTooLarge {
            size: frame_len,
            max: settings.max_frame_len,
        });
    }

    let mut buf = BytesMut::with_capacity(frame_len);
    buf.put_slice(&BEACON_TEMPLATE);

    for chunk in payload.chunks(CHUNK_SIZE) {
        let len = u8::try_from(chunk.len()).map_err(|_| BeaconError::ChunkOverflow(chunk.len()))?;
        buf.put_u8(WhisperTag::Payload.into());
        buf.put_u8(len);
        buf.extend(chunk.iter().map(|&b| sanitize_byte(b)));
    }
    buf.put_bytes(0, settings.slack);

    Ok(TransmitBuffer {
        bytes: buf.freeze(),
        payload_len: payload.len(),
        chunk_count,
        slack: settings.slack,
    })
}

/// Builds and sends whispered beacons from a status source
#[derive(Debug)]
pub struct FrameBuilder<S> {
    source: S,
    settings: FrameSettings,
}

impl<S: StatusSource> FrameBuilder<S> {
    pub fn new(source: S, settings: FrameSettings) -> Self {
        Self { source, settings }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn settings(&self) -> &FrameSettings {
        &self.settings
    }

    /// Serialize a fresh status snapshot into a transmit buffer
    pub fn pack(&self) -> Result<TransmitBuffer> {
        let payload = self.source.snapshot().to_payload()?;
        assemble(&payload, &self.settings)
    }

    /// Pack a fresh frame and hand it to `radio`
    ///
    /// Returns whether the radio accepted the frame. Nothing is retried.
    pub async fn send<R: RadioTx + ?Sized>(&self, radio: &mut R) -> bool {
        let frame = match self.pack() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Failed to pack beacon: {}", e);
                return false;
            }
        };

        if !self.settings.tx_delay.is_zero() {
            tokio::time::sleep(self.settings.tx_delay).await;
        }

        let result = radio
            .transmit(self.settings.interface, frame.as_bytes(), false)
            .await;
        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{} radio failed to transmit beacon: {}", radio.name(), e);
                false
            }
        }
    }
}
