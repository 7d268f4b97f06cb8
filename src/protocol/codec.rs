//! Message encoding and framing.
//!
//! A [`Codec`] pairs a transport (how messages are delimited on the
//! stream) with a protocol (how one message is laid out).
//!
//! # Binary protocol
//!
//! ```text
//! ┌──────────────────────┬──────────────┬───────────┬───────────────────┐
//! │ i32 VERSION_1 | type │ i32 len+name │ i32 seqid │ i32 len + payload │
//! └──────────────────────┴──────────────┴───────────┴───────────────────┘
//! ```
//!
//! # JSON protocol
//!
//! `[1, "name", type, seqid, payload]`
//!
//! # Transports
//!
//! - `Framed`: every message is preceded by its i32 big-endian length.
//! - `Buffered`: no prefix; binary messages are self-delimiting and JSON
//!   messages are terminated by a newline.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};

use super::message::{Message, MessageType};

// ============================================================================
// Constants
// ============================================================================

/// Largest frame (or length-prefixed field) accepted from the wire.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Strict binary protocol version marker.
const VERSION_1: u32 = 0x8001_0000;

/// Bits of the header word that carry the version.
const VERSION_MASK: u32 = 0xffff_0000;

/// Version tag of the JSON envelope.
const JSON_VERSION: i64 = 1;

/// Size of the frame length prefix.
const FRAME_HEADER_LEN: usize = 4;

// ============================================================================
// TransportKind / ProtocolKind
// ============================================================================

/// How messages are delimited on the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Length-prefixed frames.
    #[default]
    Framed,
    /// Raw stream of self-delimiting messages.
    Buffered,
}

/// How a single message is encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// Strict versioned binary envelope.
    #[default]
    Binary,
    /// JSON array envelope.
    Json,
}

// ============================================================================
// Codec
// ============================================================================

/// Encodes messages to bytes and decodes them from an accumulating buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Codec {
    transport: TransportKind,
    protocol: ProtocolKind,
}

impl Codec {
    /// Creates a codec.
    #[inline]
    #[must_use]
    pub const fn new(transport: TransportKind, protocol: ProtocolKind) -> Self {
        Self {
            transport,
            protocol,
        }
    }

    /// Returns the transport kind.
    #[inline]
    #[must_use]
    pub const fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Returns the protocol kind.
    #[inline]
    #[must_use]
    pub const fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    /// Encodes one message ready to be written to the stream.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the payload cannot be serialized
    /// - [`Error::Protocol`] if the encoded message exceeds [`MAX_FRAME_SIZE`]
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        let mut body = match self.protocol {
            ProtocolKind::Binary => encode_binary(message)?,
            ProtocolKind::Json => serde_json::to_vec(&json!([
                JSON_VERSION,
                message.name,
                message.message_type.as_wire(),
                message.seqid,
                message.payload,
            ]))?,
        };

        if body.len() > MAX_FRAME_SIZE {
            return Err(Error::protocol(format!(
                "message of {} bytes exceeds maximum frame size {MAX_FRAME_SIZE}",
                body.len()
            )));
        }

        match (self.transport, self.protocol) {
            (TransportKind::Framed, _) => {
                let mut framed = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
                framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
                framed.append(&mut body);
                Ok(framed)
            }
            (TransportKind::Buffered, ProtocolKind::Binary) => Ok(body),
            (TransportKind::Buffered, ProtocolKind::Json) => {
                body.push(b'\n');
                Ok(body)
            }
        }
    }

    /// Decodes the next complete message from the front of `buf`.
    ///
    /// Consumed bytes are removed from `buf`. Returns `Ok(None)` when more
    /// bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] or [`Error::Json`] for malformed input.
    /// The stream cannot be resynchronized after an error.
    pub fn decode(&self, buf: &mut Vec<u8>) -> Result<Option<Message>> {
        match self.transport {
            TransportKind::Framed => self.decode_framed(buf),
            TransportKind::Buffered => self.decode_buffered(buf),
        }
    }

    fn decode_framed(&self, buf: &mut Vec<u8>) -> Result<Option<Message>> {
        let Some(header) = buf.get(..FRAME_HEADER_LEN) else {
            return Ok(None);
        };

        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(Error::protocol(format!(
                "frame of {len} bytes exceeds maximum frame size {MAX_FRAME_SIZE}"
            )));
        }

        if buf.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }

        let frame: Vec<u8> = buf.drain(..FRAME_HEADER_LEN + len).skip(FRAME_HEADER_LEN).collect();

        match self.protocol {
            ProtocolKind::Binary => {
                let (message, used) = decode_binary(&frame)?
                    .ok_or_else(|| Error::protocol("truncated message inside frame"))?;
                if used != frame.len() {
                    return Err(Error::protocol(format!(
                        "{} trailing bytes after message in frame",
                        frame.len() - used
                    )));
                }
                Ok(Some(message))
            }
            ProtocolKind::Json => decode_json(&frame).map(Some),
        }
    }

    fn decode_buffered(&self, buf: &mut Vec<u8>) -> Result<Option<Message>> {
        match self.protocol {
            ProtocolKind::Binary => match decode_binary(buf)? {
                Some((message, used)) => {
                    buf.drain(..used);
                    Ok(Some(message))
                }
                None => Ok(None),
            },
            ProtocolKind::Json => match buf.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    let line: Vec<u8> = buf.drain(..=end).collect();
                    decode_json(&line[..end]).map(Some)
                }
                None if buf.len() > MAX_FRAME_SIZE => Err(Error::protocol(
                    "unterminated JSON message exceeds maximum frame size",
                )),
                None => Ok(None),
            },
        }
    }
}

// ============================================================================
// Binary Protocol
// ============================================================================

fn encode_binary(message: &Message) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(&message.payload)?;
    let name = message.name.as_bytes();

    let mut out = Vec::with_capacity(16 + name.len() + payload.len());
    let header = VERSION_1 | u32::from(message.message_type.as_wire());
    out.extend_from_slice(&header.to_be_bytes());
    write_bytes(&mut out, name)?;
    out.extend_from_slice(&message.seqid.to_be_bytes());
    write_bytes(&mut out, &payload)?;

    Ok(out)
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = i32::try_from(bytes.len())
        .map_err(|_| Error::protocol(format!("field of {} bytes is too long", bytes.len())))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

/// Decodes one binary message, returning it with the number of bytes used.
fn decode_binary(buf: &[u8]) -> Result<Option<(Message, usize)>> {
    let mut reader = Reader { buf, pos: 0 };

    let Some(header) = reader.read_i32() else {
        return Ok(None);
    };
    let header = header as u32;
    if header & VERSION_MASK != VERSION_1 {
        return Err(Error::protocol(format!(
            "bad version in message header: {header:#010x}"
        )));
    }
    let message_type = MessageType::from_wire(i64::from(header & 0xff))?;

    let Some(name) = reader.read_bytes()? else {
        return Ok(None);
    };
    let name = String::from_utf8(name.to_vec())
        .map_err(|_| Error::protocol("method name is not valid UTF-8"))?;

    let Some(seqid) = reader.read_i32() else {
        return Ok(None);
    };

    let Some(payload) = reader.read_bytes()? else {
        return Ok(None);
    };
    let payload = if payload.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(payload)?
    };

    let message = Message {
        name,
        message_type,
        seqid,
        payload,
    };

    Ok(Some((message, reader.pos)))
}

/// Cursor over a possibly incomplete buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn read_i32(&mut self) -> Option<i32> {
        let bytes = self.buf.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_bytes(&mut self) -> Result<Option<&'a [u8]>> {
        let start = self.pos;
        let Some(len) = self.read_i32() else {
            return Ok(None);
        };

        let len = usize::try_from(len)
            .map_err(|_| Error::protocol(format!("negative field length {len}")))?;
        if len > MAX_FRAME_SIZE {
            return Err(Error::protocol(format!(
                "field of {len} bytes exceeds maximum frame size {MAX_FRAME_SIZE}"
            )));
        }

        match self.buf.get(self.pos..self.pos + len) {
            Some(bytes) => {
                self.pos += len;
                Ok(Some(bytes))
            }
            None => {
                self.pos = start;
                Ok(None)
            }
        }
    }
}

// ============================================================================
// JSON Protocol
// ============================================================================

fn decode_json(bytes: &[u8]) -> Result<Message> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Array(mut fields) = value else {
        return Err(Error::protocol("JSON message must be an array"));
    };

    if fields.len() != 5 {
        return Err(Error::protocol(format!(
            "JSON message must have 5 fields, got {}",
            fields.len()
        )));
    }

    if fields[0].as_i64() != Some(JSON_VERSION) {
        return Err(Error::protocol(format!(
            "unsupported JSON message version {}",
            fields[0]
        )));
    }

    let payload = fields.pop().unwrap_or(Value::Null);
    let seqid = fields[3]
        .as_i64()
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| Error::protocol("JSON message seqid must be an i32"))?;
    let message_type = fields[2]
        .as_i64()
        .ok_or_else(|| Error::protocol("JSON message type must be an integer"))
        .and_then(MessageType::from_wire)?;
    let name = fields[1]
        .as_str()
        .ok_or_else(|| Error::protocol("JSON message name must be a string"))?
        .to_string();

    Ok(Message {
        name,
        message_type,
        seqid,
        payload,
    })
}

// ============================================================================
// Tests
// ============================================================================
