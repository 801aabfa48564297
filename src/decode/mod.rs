//! Binary decoder for NatNet payloads.
//!
//! Decoding is a pure function of `(bytes, version)`: the negotiated NatNet
//! protocol version is passed into every call that reads version-gated fields,
//! never taken from shared state. Every record is copied out of the datagram.
//!
//! ## Payload Structure
//!
//! - **ServerInfo**: fixed-width application name, app version, NatNet version
//! - **ModelDef**: dataset count, then tagged datasets (point cloud, rigid body, skeleton)
//! - **FrameOfData**: frame number, point clouds, rigid bodies, skeletons,
//!   unidentified markers, latency
//!
//! All multi-byte fields are little-endian. Counts are signed 32-bit integers and
//! are checked against the remaining payload before anything is allocated.

mod frame;
mod model;
mod server_info;

pub use frame::decode_frame;
pub use model::decode_model_definition;
pub use server_info::decode_server_info;

use crate::packet::{MessageType, PacketHeader, PacketReader};
use crate::types::{FrameSnapshot, ModelDefinition, ServerInfo, Version};
use crate::{NatNetError, Result};

/// A decoded inbound datagram
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ServerInfo(ServerInfo),
    ModelDef(ModelDefinition),
    Frame(FrameSnapshot),
    /// Free-form text reply from the server
    MessageString(String),
    /// Known message that carries nothing for this client (outbound-only types,
    /// unrecognized-request echoes, generic responses)
    Ignored(MessageType),
    /// Message identifier this client does not know
    Unknown(u16),
}

/// Decode one datagram using the negotiated NatNet version.
pub fn decode_message(datagram: &[u8], version: Version) -> Result<Message> {
    let (header, payload) = PacketHeader::split(datagram)?;
    let Some(kind) = header.message_type() else {
        return Ok(Message::Unknown(header.message));
    };

    match kind {
        MessageType::ServerInfo => decode_server_info(payload).map(Message::ServerInfo),
        MessageType::ModelDef => decode_model_definition(payload, version).map(Message::ModelDef),
        MessageType::FrameOfData => decode_frame(payload, version).map(Message::Frame),
        MessageType::MessageString => {
            let mut reader = PacketReader::new(payload, "MessageString");
            reader.read_cstring().map(Message::MessageString)
        }
        other => Ok(Message::Ignored(other)),
    }
}

/// Reject versions whose layouts this decoder does not know.
pub(crate) fn ensure_supported(version: Version) -> Result<()> {
    if version.is_supported() {
        Ok(())
    } else {
        Err(NatNetError::UnsupportedVersion { found: version })
    }
}
