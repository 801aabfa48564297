//! Protocol session: handshake state and version-gated dispatch.
//!
//! The session owns everything learned from the server: its identity, the
//! negotiated NatNet version and the current model definition. It turns raw
//! datagrams from either channel into [`SessionEvent`]s, decoding versioned
//! payloads only once the server version is known.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::decode::{Message, decode_message};
use crate::packet::{MessageType, PacketHeader};
use crate::types::{FrameSnapshot, ModelDefinition, ServerInfo, Version};
use crate::Result;

/// Outcome of handling one datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// First (or changed) server identity
    Handshake(ServerInfo),
    /// Server info identical to the one already held
    DuplicateHandshake,
    /// New model definition, already scaled
    ModelDefinition(Arc<ModelDefinition>),
    /// Decoded and scaled frame
    Frame(FrameSnapshot),
    /// A versioned payload arrived before the server version was known and was dropped
    AwaitingHandshake(MessageType),
    /// Text message from the server
    Message(String),
    /// Message carrying nothing for this client
    Ignored(u16),
}

/// Handshake and versioning state of one connection.
#[derive(Debug)]
pub struct ProtocolSession {
    scale: f32,
    server_info: Option<ServerInfo>,
    model: Option<Arc<ModelDefinition>>,
}

impl ProtocolSession {
    /// Create a session that applies `scale` to every decoded position.
    pub fn new(scale: f32) -> Self {
        Self { scale, server_info: None, model: None }
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Negotiated NatNet version, once the server has identified itself.
    pub fn natnet_version(&self) -> Option<Version> {
        self.server_info.as_ref().map(|info| info.natnet_version)
    }

    /// Whether frames can be decoded: the server version is known and supported.
    pub fn is_streaming(&self) -> bool {
        self.natnet_version().is_some_and(|version| version.is_supported())
    }

    pub fn model_definition(&self) -> Option<&Arc<ModelDefinition>> {
        self.model.as_ref()
    }

    /// Forget the server identity and model so the next handshake starts fresh.
    pub fn reset(&mut self) {
        debug!("Resetting protocol session");
        self.server_info = None;
        self.model = None;
    }

    /// Decode one datagram and update the session state.
    ///
    /// Decode failures are returned as errors and leave the session unchanged.
    pub fn handle_datagram(&mut self, datagram: &[u8]) -> Result<SessionEvent> {
        let (header, _) = PacketHeader::split(datagram)?;

        let version = match (header.message_type(), self.natnet_version()) {
            (Some(kind @ (MessageType::ModelDef | MessageType::FrameOfData)), None) => {
                return Ok(SessionEvent::AwaitingHandshake(kind));
            }
            (_, version) => version.unwrap_or_default(),
        };

        let event = match decode_message(datagram, version)? {
            Message::ServerInfo(info) => self.on_server_info(info),
            Message::ModelDef(model) => {
                let model = Arc::new(model.scaled(self.scale));
                self.model = Some(Arc::clone(&model));
                SessionEvent::ModelDefinition(model)
            }
            Message::Frame(frame) => SessionEvent::Frame(frame.scaled(self.scale)),
            Message::MessageString(text) => SessionEvent::Message(text),
            Message::Ignored(kind) => SessionEvent::Ignored(kind as u16),
            Message::Unknown(id) => SessionEvent::Ignored(id),
        };
        Ok(event)
    }

    fn on_server_info(&mut self, info: ServerInfo) -> SessionEvent {
        if self.server_info.as_ref() == Some(&info) {
            debug!(natnet = %info.natnet_version, "Duplicate server info");
            return SessionEvent::DuplicateHandshake;
        }

        if info.natnet_version.is_supported() {
            info!(
                server = %info.application,
                app_version = %info.app_version,
                natnet = %info.natnet_version,
                "Connected to NatNet server"
            );
        } else {
            warn!(
                server = %info.application,
                natnet = %info.natnet_version,
                "Server speaks an unsupported NatNet version; frames will not be decoded"
            );
        }

        // A server restart may report a different version; the old model no longer applies.
        if self.server_info.is_some() {
            self.model = None;
        }
        self.server_info = Some(info.clone());
        SessionEvent::Handshake(info)
    }
}
