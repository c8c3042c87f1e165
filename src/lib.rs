//! Runtime-schema MAVLink host library.
//!
//! Unlike generated-binding MAVLink crates, this library loads its message
//! definitions from the standard XML dialect files at startup and keeps them
//! as an in-memory [`schema::MavSchema`]. Messages are encoded from and
//! decoded to dynamic [`value::MavValue`] maps, so any dialect the schema
//! describes can be spoken without recompiling.
//!
//! The layers, bottom up:
//!
//! * [`schema`]: enums, messages, field types and the per-message CRC-extra
//!   byte, loaded from XML;
//! * [`codec`]: payload serialisation with MAVLink field reordering and v2
//!   trailing-zero truncation;
//! * frame functions in this module: v1/v2 framing, CRC-16/MCRF4XX
//!   validation and marker resynchronisation over any [`std::io::Read`];
//! * [`connection`]: a background reader thread feeding a last-value pool,
//!   per-message history and predicate waiters, plus the parameter, command
//!   and stream request/response surface on top.

#![deny(clippy::all)]
#![warn(clippy::use_self)]

use std::io::{Read, Write};

use crc_any::CRCu16;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod bytes;
pub mod bytes_mut;
pub mod codec;
pub mod connection;
pub mod error;
pub mod peek_reader;
pub mod schema;
pub mod utils;
pub mod value;

use error::{FrameError, MessageReadError, MessageWriteError};
use peek_reader::PeekReader;
use schema::{MavMessage, MavSchema};

pub use codec::MavPacket;
pub use connection::{ConnectionSettings, MavConnection};
pub use error::{Error, Result};
pub use value::{MavArgs, MavContent, MavValue};

/// Maximum size of any MAVLink frame on the wire: marker, v2 header, 255
/// payload bytes, CRC and signature.
pub const MAX_FRAME_SIZE: usize = 280;

/// Message framing marker for mavlink v1
pub const MAV_STX: u8 = 0xFE;

/// Message framing marker for mavlink v2
pub const MAV_STX_V2: u8 = 0xFD;

/// Incompatibility flag bit marking a signed v2 frame.
const MAVLINK_IFLAG_SIGNED: u8 = 0x01;

/// Length of the optional v2 signature trailer.
const SIGNATURE_SIZE: usize = 13;

/// Metadata from a MAVLink packet header
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MavHeader {
    pub system_id: u8,
    pub component_id: u8,
    pub sequence: u8,
}

/// Default outgoing identity; seq is replaced by the connection so it can be
/// ignored.
impl Default for MavHeader {
    fn default() -> Self {
        Self {
            system_id: 1,
            component_id: 1,
            sequence: 0,
        }
    }
}

/// Versions of the Mavlink protocol that we support
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum MavlinkVersion {
    V1,
    V2,
}

impl MavlinkVersion {
    /// Header length after the marker byte.
    const fn header_size(self) -> usize {
        match self {
            Self::V1 => 5,
            Self::V2 => 9,
        }
    }

    const fn marker(self) -> u8 {
        match self {
            Self::V1 => MAV_STX,
            Self::V2 => MAV_STX_V2,
        }
    }
}

/// CRC-16/MCRF4XX over `data` followed by the message's CRC-extra byte, as
/// carried in every frame trailer.
pub fn calculate_crc(data: &[u8], extra_crc: u8) -> u16 {
    let mut crc_calculator = CRCu16::crc16mcrf4cc();
    crc_calculator.digest(data);

    crc_calculator.digest(&[extra_crc]);
    crc_calculator.get_crc()
}

/// A validated frame as read from the wire, either protocol version.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MavFrameRaw {
    pub version: MavlinkVersion,
    pub payload_length: u8,
    pub incompat_flags: u8,
    pub compat_flags: u8,
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub message_id: u32,
    payload_buffer: [u8; 255],
    pub checksum: u16,
}

impl MavFrameRaw {
    pub fn payload(&self) -> &[u8] {
        &self.payload_buffer[..self.payload_length as usize]
    }

    pub fn header(&self) -> MavHeader {
        MavHeader {
            system_id: self.system_id,
            component_id: self.component_id,
            sequence: self.sequence,
        }
    }

    /// Parses the header bytes that follow a marker. `header` must be
    /// `version.header_size()` bytes.
    fn from_header(version: MavlinkVersion, header: &[u8]) -> Self {
        let mut frame = Self {
            version,
            payload_length: header[0],
            incompat_flags: 0,
            compat_flags: 0,
            sequence: 0,
            system_id: 0,
            component_id: 0,
            message_id: 0,
            payload_buffer: [0; 255],
            checksum: 0,
        };
        match version {
            MavlinkVersion::V1 => {
                frame.sequence = header[1];
                frame.system_id = header[2];
                frame.component_id = header[3];
                frame.message_id = header[4].into();
            }
            MavlinkVersion::V2 => {
                frame.incompat_flags = header[1];
                frame.compat_flags = header[2];
                frame.sequence = header[3];
                frame.system_id = header[4];
                frame.component_id = header[5];
                frame.message_id = u32::from_le_bytes([header[6], header[7], header[8], 0]);
            }
        }
        frame
    }

    fn signature_size(&self) -> usize {
        if self.version == MavlinkVersion::V2
            && self.incompat_flags & MAVLINK_IFLAG_SIGNED != 0
        {
            SIGNATURE_SIZE
        } else {
            0
        }
    }
}

/// Reads the next valid frame from the stream, resynchronising on the frame
/// markers of either protocol version.
///
/// Garbage between frames is skipped byte by byte. A frame with an unknown
/// message id is discarded whole; a frame failing its CRC is discarded by
/// rescanning from the byte after its marker, so a marker byte inside the
/// corrupt data is still found. Both cases are logged and absorbed; only
/// transport errors (including EOF) surface.
pub fn read_frame<R: Read>(
    reader: &mut PeekReader<R>,
    schema: &MavSchema,
) -> std::result::Result<(MavFrameRaw, std::sync::Arc<MavMessage>), MessageReadError> {
    loop {
        let version = loop {
            // search for a magic framing value
            match reader.read_u8()? {
                MAV_STX => break MavlinkVersion::V1,
                MAV_STX_V2 => break MavlinkVersion::V2,
                _ => (),
            }
        };

        let header_size = version.header_size();
        let header = &reader.peek_exact(header_size)?[..header_size];
        let mut frame = MavFrameRaw::from_header(version, header);

        let payload_length: usize = frame.payload_length.into();
        let frame_size = header_size + payload_length + 2 + frame.signature_size();
        let body = reader.peek_exact(frame_size)?;

        frame.checksum = u16::from_le_bytes([
            body[header_size + payload_length],
            body[header_size + payload_length + 1],
        ]);

        let Some(message) = schema.message_by_id(frame.message_id).cloned() else {
            log::debug!(
                "dropping frame: {}",
                FrameError::UnknownMessageId {
                    id: frame.message_id
                }
            );
            reader.consume(frame_size);
            continue;
        };

        let expected = calculate_crc(
            &body[..header_size + payload_length],
            message.crc_extra(),
        );
        if frame.checksum != expected {
            // rescan right after the marker: a real marker may sit inside
            // the bytes we just peeked
            log::debug!(
                "dropping frame: {}",
                FrameError::BadCrc {
                    expected,
                    found: frame.checksum
                }
            );
            continue;
        }

        frame.payload_buffer[..payload_length]
            .copy_from_slice(&body[header_size..header_size + payload_length]);
        reader.consume(frame_size);
        return Ok((frame, message));
    }
}

/// Reads and decodes the next frame into a [`MavPacket`].
pub fn read_packet<R: Read>(
    reader: &mut PeekReader<R>,
    schema: &MavSchema,
) -> std::result::Result<MavPacket, MessageReadError> {
    let (frame, message) = read_frame(reader, schema)?;
    let content = codec::decode_payload(schema, &message, frame.payload())?;
    Ok(MavPacket {
        header: frame.header(),
        message,
        content,
    })
}

/// Writes one frame with an already-encoded payload. Returns the number of
/// bytes written.
pub fn write_frame<W: Write>(
    w: &mut W,
    version: MavlinkVersion,
    header: MavHeader,
    message: &MavMessage,
    payload: &[u8],
) -> std::result::Result<usize, MessageWriteError> {
    let msgid = message.id;
    if version == MavlinkVersion::V1 && msgid > 0xFF {
        return Err(error::EncodeError::NotV1Compatible {
            message: message.name.clone(),
            id: msgid,
        }
        .into());
    }

    let mut head = [0u8; 10];
    head[0] = version.marker();
    let head = match version {
        MavlinkVersion::V1 => {
            head[1..6].copy_from_slice(&[
                payload.len() as u8,
                header.sequence,
                header.system_id,
                header.component_id,
                msgid as u8,
            ]);
            &head[..6]
        }
        MavlinkVersion::V2 => {
            let msgid_bytes = msgid.to_le_bytes();
            head[1..10].copy_from_slice(&[
                payload.len() as u8,
                0, //incompat_flags
                0, //compat_flags
                header.sequence,
                header.system_id,
                header.component_id,
                msgid_bytes[0],
                msgid_bytes[1],
                msgid_bytes[2],
            ]);
            &head[..10]
        }
    };

    let crc_bytes = frame_crc(&head[1..], payload, message.crc_extra()).to_le_bytes();

    w.write_all(head)?;
    w.write_all(payload)?;
    w.write_all(&crc_bytes)?;

    Ok(head.len() + payload.len() + crc_bytes.len())
}

/// Encodes the given values and writes one frame.
pub fn write_message<W: Write>(
    w: &mut W,
    version: MavlinkVersion,
    header: MavHeader,
    schema: &MavSchema,
    message: &MavMessage,
    args: &MavArgs,
) -> std::result::Result<usize, MessageWriteError> {
    let payload = codec::encode_payload(schema, message, version, args)?;
    write_frame(w, version, header, message, &payload)
}

fn frame_crc(header_no_marker: &[u8], payload: &[u8], extra_crc: u8) -> u16 {
    let mut crc = CRCu16::crc16mcrf4cc();
    crc.digest(header_no_marker);
    crc.digest(payload);
    crc.digest(&[extra_crc]);
    crc.get_crc()
}
