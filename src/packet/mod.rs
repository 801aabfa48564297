//! NatNet packet framing.
//!
//! Every datagram, inbound or outbound, has the same layout:
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────────────────────┐
//! │ Message (2)  │ Length (2)   │ Payload (Length bytes)              │
//! │ u16 LE       │ u16 LE       │ message specific                    │
//! └──────────────┴──────────────┴─────────────────────────────────────┘
//! ```
//!
//! [`PacketBuffer`] is the fixed-capacity container used both as receive slot and
//! for building outbound commands. [`PacketReader`] is the bounds-checked cursor the
//! decoder reads payloads with.

mod reader;

pub use reader::PacketReader;

use bytes::BufMut;

use crate::{NatNetError, Result};

/// Largest datagram a UDP socket can deliver.
pub const MAX_PACKET_SIZE: usize = 65_507;

/// Size of the message/length header.
pub const HEADER_SIZE: usize = 4;

/// Fixed width of the application name in a server-info reply.
pub const MAX_NAME_LENGTH: usize = 256;

/// Name this client announces in its connection request.
pub const CLIENT_NAME: &str = "Ping";

/// NatNet message identifiers
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Connection request ("who are you")
    Ping = 0,
    /// Reply to a connection request: server identity and versions
    ServerInfo = 1,
    Request = 2,
    Response = 3,
    RequestModelDef = 4,
    ModelDef = 5,
    RequestFrameOfData = 6,
    FrameOfData = 7,
    MessageString = 8,
    /// The server did not understand our request
    UnrecognizedRequest = 100,
}

impl TryFrom<u16> for MessageType {
    type Error = u16;

    fn try_from(value: u16) -> std::result::Result<Self, u16> {
        match value {
            0 => Ok(Self::Ping),
            1 => Ok(Self::ServerInfo),
            2 => Ok(Self::Request),
            3 => Ok(Self::Response),
            4 => Ok(Self::RequestModelDef),
            5 => Ok(Self::ModelDef),
            6 => Ok(Self::RequestFrameOfData),
            7 => Ok(Self::FrameOfData),
            8 => Ok(Self::MessageString),
            100 => Ok(Self::UnrecognizedRequest),
            other => Err(other),
        }
    }
}

/// Message header of one datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Raw message identifier (may be unknown to this client)
    pub message: u16,
    /// Declared payload length in bytes
    pub payload_len: u16,
}

impl PacketHeader {
    /// Known message type, if any.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::try_from(self.message).ok()
    }

    /// Split a datagram into its header and payload.
    ///
    /// The payload is exactly `payload_len` bytes; anything after it is ignored.
    pub fn split(datagram: &[u8]) -> Result<(PacketHeader, &[u8])> {
        let mut reader = PacketReader::new(datagram, "packet header");
        let message = reader.read_u16()?;
        let payload_len = reader.read_u16()?;
        let payload = reader.read_bytes(payload_len as usize).map_err(|_| {
            NatNetError::malformed(
                "packet header",
                format!(
                    "declared payload of {} bytes exceeds the {} bytes received",
                    payload_len,
                    datagram.len() - HEADER_SIZE
                ),
            )
        })?;
        Ok((PacketHeader { message, payload_len }, payload))
    }
}

/// Fixed-capacity datagram buffer.
pub struct PacketBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl PacketBuffer {
    /// Create an empty buffer able to hold the largest UDP datagram.
    pub fn new() -> Self {
        Self { data: vec![0u8; MAX_PACKET_SIZE].into_boxed_slice(), len: 0 }
    }

    /// Build an outbound command datagram.
    pub fn command(message: MessageType, payload: &[u8]) -> Result<Self> {
        let mut buffer = Self::new();
        buffer.encode(message, payload)?;
        Ok(buffer)
    }

    /// Connection request announcing this client.
    pub fn connect_request() -> Self {
        let mut name = CLIENT_NAME.as_bytes().to_vec();
        name.push(0);
        let mut buffer = Self::new();
        // Fits by construction: the name is a short constant.
        let _ = buffer.encode(MessageType::Ping, &name);
        buffer
    }

    /// Request for the current model definition.
    pub fn model_definition_request() -> Self {
        let mut buffer = Self::new();
        let _ = buffer.encode(MessageType::RequestModelDef, &[]);
        buffer
    }

    fn encode(&mut self, message: MessageType, payload: &[u8]) -> Result<()> {
        let payload_len = u16::try_from(payload.len())
            .ok()
            .filter(|len| HEADER_SIZE + *len as usize <= self.data.len())
            .ok_or_else(|| {
                NatNetError::malformed(
                    "outbound command",
                    format!("payload of {} bytes does not fit in one datagram", payload.len()),
                )
            })?;

        let mut out = &mut self.data[..];
        out.put_u16_le(message as u16);
        out.put_u16_le(payload_len);
        out.put_slice(payload);
        self.len = HEADER_SIZE + payload.len();
        Ok(())
    }

    /// Whole capacity, to receive a datagram into.
    pub fn recv_slot(&mut self) -> &mut [u8] {
        self.len = 0;
        &mut self.data
    }

    /// Mark the first `len` bytes as filled and return them.
    pub fn filled(&mut self, len: usize) -> &[u8] {
        self.len = len.min(self.data.len());
        &self.data[..self.len]
    }

    /// Current contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketBuffer").field("len", &self.len).finish()
    }
}
