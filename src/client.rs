//! Async network client.
//!
//! [`NatNetClient`] owns the command and data sockets and drives both channel
//! state machines from a single future, [`NatNetClient::run`]. The future never
//! spawns tasks: each received datagram is decoded and dispatched to the
//! registered receivers inline, then the next receive is armed. The host runtime
//! interleaves the two channels.
//!
//! While `run` borrows the client, a [`ClientHandle`] reads the published
//! [`ClientStatus`] and queues commands (model definition requests,
//! re-initialisation, shutdown).

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ClientConfig;
use crate::packet::PacketBuffer;
use crate::receiver::{FrameReceiver, ReceiverSet};
use crate::session::{ProtocolSession, SessionEvent};
use crate::transport::{self, Channel, ChannelState};
use crate::types::{FrameSnapshot, Markers, ModelDefinition, ServerInfo, frame_after};
use crate::{NatNetError, Result};

/// Datagram counters since the client was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientStats {
    /// Datagrams received on either channel
    pub datagrams: u64,
    /// Frames delivered to receivers
    pub frames: u64,
    /// Model definitions delivered to receivers
    pub model_definitions: u64,
    /// Datagrams dropped because they could not be decoded
    pub malformed: u64,
    /// Frames and definitions dropped because the server version was not yet known
    pub dropped_before_handshake: u64,
    /// Frames whose number did not advance past the previous frame
    pub out_of_order: u64,
}

/// Snapshot of the client's observable state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientStatus {
    pub command: ChannelState,
    pub data: ChannelState,
    pub stats: ClientStats,
    pub server_info: Option<ServerInfo>,
    /// Marker positions of the most recent frame
    pub markers: Markers,
}

impl ClientStatus {
    pub fn channel(&self, channel: Channel) -> ChannelState {
        match channel {
            Channel::Command => self.command,
            Channel::Data => self.data,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelState {
        match channel {
            Channel::Command => &mut self.command,
            Channel::Data => &mut self.data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientCommand {
    RequestModelDefinition,
    Reinit,
}

/// Cloneable control handle for a running client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<ClientCommand>,
    status: watch::Receiver<ClientStatus>,
    cancel: CancellationToken,
}

impl ClientHandle {
    pub fn status(&self) -> ClientStatus {
        self.status.borrow().clone()
    }

    /// Ask the running client to re-request the model definition.
    pub fn request_model_definition(&self) -> Result<()> {
        self.send(ClientCommand::RequestModelDefinition, "request model definition")
    }

    /// Ask the running client to redo the handshake.
    pub fn reinit(&self) -> Result<()> {
        self.send(ClientCommand::Reinit, "reinitialise")
    }

    /// Stop the receive loop and close both channels.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn send(&self, command: ClientCommand, operation: &str) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| NatNetError::NotConnected { operation: operation.to_string() })
    }
}

/// What the run loop has to do after a datagram was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reaction {
    None,
    RequestModelDefinition,
    CloseData,
}

/// Session state, receivers and published status; everything except the sockets.
struct Dispatcher {
    session: ProtocolSession,
    receivers: ReceiverSet,
    status: watch::Sender<ClientStatus>,
    last_frame: Option<i32>,
    /// Request a model definition after every handshake
    auto_request_model: bool,
    /// Request a model definition after the next handshake
    want_model: bool,
}

impl Dispatcher {
    fn set_state(&mut self, channel: Channel, state: ChannelState) {
        self.status.send_if_modified(|status| {
            let slot = status.channel_mut(channel);
            let changed = *slot != state;
            *slot = state;
            changed
        });
    }

    fn dispatch(&mut self, channel: Channel, datagram: &[u8]) -> Reaction {
        self.status.send_modify(|status| {
            status.stats.datagrams += 1;
            *status.channel_mut(channel) = ChannelState::Processing;
        });
        trace!(%channel, bytes = datagram.len(), "Received datagram");

        let reaction = match self.session.handle_datagram(datagram) {
            Ok(event) => self.on_event(channel, event),
            Err(err) if err.is_recoverable() => {
                warn!(%channel, error = %err, "Dropping malformed datagram");
                self.status.send_modify(|status| status.stats.malformed += 1);
                Reaction::None
            }
            Err(err) => {
                warn!(%channel, error = %err, "Cannot decode datagram");
                Reaction::None
            }
        };

        self.set_state(channel, ChannelState::Listening);
        reaction
    }

    fn on_event(&mut self, channel: Channel, event: SessionEvent) -> Reaction {
        match event {
            SessionEvent::Handshake(info) => {
                let supported = info.natnet_version.is_supported();
                self.last_frame = None;
                self.status.send_modify(|status| status.server_info = Some(info));
                if !supported {
                    return Reaction::CloseData;
                }
                if self.status.borrow().data.is_open() {
                    self.receivers.connection_status(Channel::Data, ChannelState::Listening);
                }
                // The session holds no model after a handshake
                if std::mem::take(&mut self.want_model) || self.auto_request_model {
                    Reaction::RequestModelDefinition
                } else {
                    Reaction::None
                }
            }
            SessionEvent::DuplicateHandshake => Reaction::None,
            SessionEvent::ModelDefinition(model) => {
                debug!(
                    %channel,
                    point_clouds = model.point_clouds.len(),
                    rigid_bodies = model.rigid_bodies.len(),
                    skeletons = model.skeletons.len(),
                    "Model definition updated"
                );
                self.receivers.model_definition(&model);
                self.status.send_modify(|status| status.stats.model_definitions += 1);
                Reaction::None
            }
            SessionEvent::Frame(frame) => {
                self.on_frame(frame);
                Reaction::None
            }
            SessionEvent::AwaitingHandshake(kind) => {
                let mut first = false;
                self.status.send_modify(|status| {
                    first = status.stats.dropped_before_handshake == 0;
                    status.stats.dropped_before_handshake += 1;
                });
                if first {
                    warn!(%channel, ?kind, "Dropping data until the server identifies itself");
                } else {
                    trace!(%channel, ?kind, "Dropped before handshake");
                }
                Reaction::None
            }
            SessionEvent::Message(text) => {
                info!(%channel, message = %text, "Server message");
                Reaction::None
            }
            SessionEvent::Ignored(id) => {
                debug!(%channel, message = id, "Ignoring message");
                Reaction::None
            }
        }
    }

    fn on_frame(&mut self, frame: FrameSnapshot) {
        let in_order = self.last_frame.is_none_or(|last| frame_after(frame.frame_number, last));
        if !in_order {
            debug!(frame = frame.frame_number, last = ?self.last_frame, "Frame out of order");
        } else {
            self.last_frame = Some(frame.frame_number);
        }

        self.receivers.frame_snapshot(&frame);

        let markers = Markers::from_frame(&frame);
        self.status.send_modify(|status| {
            status.stats.frames += 1;
            if !in_order {
                status.stats.out_of_order += 1;
            }
            status.markers = markers;
        });
    }

    /// Mark a channel closed and tell the receivers, once.
    fn close(&mut self, channel: Channel) {
        if self.status.borrow().channel(channel) == ChannelState::Closed {
            return;
        }
        self.set_state(channel, ChannelState::Closed);
        self.receivers.connection_status(channel, ChannelState::Closed);
    }
}

/// Client for one NatNet server.
pub struct NatNetClient {
    config: ClientConfig,
    server: SocketAddr,
    command: Option<UdpSocket>,
    data: Option<UdpSocket>,
    command_buf: PacketBuffer,
    data_buf: PacketBuffer,
    dispatcher: Dispatcher,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    command_tx: mpsc::UnboundedSender<ClientCommand>,
    cancel: CancellationToken,
}

enum Wakeup {
    Cancelled,
    Command(Option<ClientCommand>),
    Datagram(Channel, io::Result<usize>),
}

async fn recv_on(socket: Option<&UdpSocket>, buf: &mut [u8]) -> io::Result<usize> {
    match socket {
        Some(socket) => socket.recv_from(buf).await.map(|(len, _)| len),
        None => std::future::pending().await,
    }
}

impl NatNetClient {
    /// Bind both channels and send the connection request.
    ///
    /// Resolution and bind failures are returned as
    /// [`NatNetError::ConnectFailure`]; nothing is retried.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        info!(
            server = %config.server_address,
            command_port = config.command_port,
            data_port = config.data_port,
            multicast = ?config.multicast_group,
            "Connecting to NatNet server"
        );

        let (status, _) = watch::channel(ClientStatus {
            command: ChannelState::Binding,
            data: ChannelState::Binding,
            ..Default::default()
        });
        let server = transport::resolve_server(&config.server_address, config.command_port).await?;
        let command = transport::bind_command_socket(&config)?;
        let data = transport::bind_data_socket(&config)?;

        let (command_tx, commands) = mpsc::unbounded_channel();
        let mut client = Self {
            server,
            command: Some(command),
            data: Some(data),
            command_buf: PacketBuffer::new(),
            data_buf: PacketBuffer::new(),
            dispatcher: Dispatcher {
                session: ProtocolSession::new(config.scale),
                receivers: ReceiverSet::new(),
                status,
                last_frame: None,
                auto_request_model: config.request_model_on_connect,
                want_model: false,
            },
            commands,
            command_tx,
            cancel: CancellationToken::new(),
            config,
        };
        client.dispatcher.set_state(Channel::Command, ChannelState::Listening);
        client.dispatcher.set_state(Channel::Data, ChannelState::Listening);

        client.send_command(&PacketBuffer::connect_request(), "send connection request").await?;
        info!(%server, "Sent connection request");
        Ok(client)
    }

    /// Register a receiver. Receivers are notified in registration order.
    pub fn add_receiver(&mut self, receiver: impl FrameReceiver + 'static) {
        self.dispatcher.receivers.push(Box::new(receiver));
    }

    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            commands: self.command_tx.clone(),
            status: self.dispatcher.status.subscribe(),
            cancel: self.cancel.clone(),
        }
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Local `(command, data)` socket addresses of the open channels.
    pub fn local_addrs(&self) -> (Option<SocketAddr>, Option<SocketAddr>) {
        let addr = |socket: &Option<UdpSocket>| socket.as_ref().and_then(|s| s.local_addr().ok());
        (addr(&self.command), addr(&self.data))
    }

    pub fn channel_state(&self, channel: Channel) -> ChannelState {
        self.dispatcher.status.borrow().channel(channel)
    }

    pub fn stats(&self) -> ClientStats {
        self.dispatcher.status.borrow().stats
    }

    pub fn markers(&self) -> Markers {
        self.dispatcher.status.borrow().markers.clone()
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.dispatcher.session.server_info().cloned()
    }

    pub fn model_definition(&self) -> Option<Arc<ModelDefinition>> {
        self.dispatcher.session.model_definition().cloned()
    }

    /// Receive and dispatch until cancelled or both channels are closed.
    pub async fn run(&mut self) {
        info!("NatNet receive loop started");

        while self.command.is_some() || self.data.is_some() {
            let wakeup = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Wakeup::Cancelled,
                command = self.commands.recv(), if !self.commands.is_closed() => Wakeup::Command(command),
                result = recv_on(self.command.as_ref(), self.command_buf.recv_slot()) => {
                    Wakeup::Datagram(Channel::Command, result)
                }
                result = recv_on(self.data.as_ref(), self.data_buf.recv_slot()) => {
                    Wakeup::Datagram(Channel::Data, result)
                }
            };

            match wakeup {
                Wakeup::Cancelled => break,
                Wakeup::Command(Some(ClientCommand::RequestModelDefinition)) => {
                    if let Err(err) = self.request_model_definition().await {
                        warn!(error = %err, "Model definition request failed");
                    }
                }
                Wakeup::Command(Some(ClientCommand::Reinit)) => {
                    if let Err(err) = self.reinit().await {
                        error!(error = %err, "Re-initialisation failed");
                    }
                }
                Wakeup::Command(None) => {}
                Wakeup::Datagram(channel, Ok(len)) => self.process(channel, len).await,
                Wakeup::Datagram(channel, Err(err)) => {
                    error!(%channel, error = %err, "Socket error, closing channel");
                    self.close_channel(channel);
                }
            }
        }

        self.shutdown();
        // Handles must not queue commands nothing will run
        self.commands.close();
        info!(stats = ?self.stats(), "NatNet receive loop stopped");
    }

    async fn process(&mut self, channel: Channel, len: usize) {
        let datagram = match channel {
            Channel::Command => self.command_buf.filled(len),
            Channel::Data => self.data_buf.filled(len),
        };

        match self.dispatcher.dispatch(channel, datagram) {
            Reaction::None => {}
            Reaction::RequestModelDefinition => {
                if let Err(err) = self.request_model_definition().await {
                    warn!(error = %err, "Model definition request failed");
                }
            }
            Reaction::CloseData => {
                warn!("Closing data channel: server NatNet version is not supported");
                self.close_channel(Channel::Data);
            }
        }
    }

    /// Send a model definition request on the command channel.
    pub async fn request_model_definition(&mut self) -> Result<()> {
        debug!("Requesting model definition");
        self.send_command(&PacketBuffer::model_definition_request(), "request model definition").await
    }

    /// Redo the handshake: forget the server identity, rebind closed channels,
    /// and send a new connection request. A model definition is requested once
    /// the server answers.
    ///
    /// A channel that cannot be rebound goes back to `Closed`. The connection
    /// request is still sent if the command channel is open, and the first bind
    /// failure is returned afterwards.
    pub async fn reinit(&mut self) -> Result<()> {
        info!("Re-initialising NatNet session");
        self.dispatcher.session.reset();
        self.dispatcher.want_model = true;
        self.dispatcher.last_frame = None;
        self.dispatcher.status.send_modify(|status| status.server_info = None);

        let command_bind = if self.command.is_none() { self.rebind(Channel::Command) } else { Ok(()) };
        let data_bind = if self.data.is_none() { self.rebind(Channel::Data) } else { Ok(()) };

        if self.command.is_some() {
            self.send_command(&PacketBuffer::connect_request(), "send connection request").await?;
        }
        command_bind.and(data_bind)
    }

    fn rebind(&mut self, channel: Channel) -> Result<()> {
        self.dispatcher.set_state(channel, ChannelState::Binding);
        let bound = match channel {
            Channel::Command => transport::bind_command_socket(&self.config),
            Channel::Data => transport::bind_data_socket(&self.config),
        };

        match bound {
            Ok(socket) => {
                match channel {
                    Channel::Command => self.command = Some(socket),
                    Channel::Data => self.data = Some(socket),
                }
                self.dispatcher.set_state(channel, ChannelState::Listening);
                Ok(())
            }
            Err(err) => {
                warn!(%channel, error = %err, "Cannot rebind channel");
                self.dispatcher.close(channel);
                Err(err)
            }
        }
    }

    /// Close both channels. Receivers are told about each channel that was still open.
    pub fn shutdown(&mut self) {
        self.close_channel(Channel::Command);
        self.close_channel(Channel::Data);
    }

    fn close_channel(&mut self, channel: Channel) {
        let socket = match channel {
            Channel::Command => self.command.take(),
            Channel::Data => self.data.take(),
        };
        if socket.is_some() {
            debug!(%channel, "Channel closed");
        }
        self.dispatcher.close(channel);
    }

    async fn send_command(&mut self, packet: &PacketBuffer, operation: &str) -> Result<()> {
        let Some(socket) = self.command.as_ref() else {
            return Err(NatNetError::NotConnected { operation: operation.to_string() });
        };

        if let Err(err) = socket.send_to(packet.as_slice(), self.server).await {
            let err = NatNetError::socket_error(Channel::Command, err);
            error!(error = %err, "Command send failed");
            self.close_channel(Channel::Command);
            return Err(err);
        }
        trace!(bytes = packet.len(), server = %self.server, "Sent command");
        Ok(())
    }
}

impl std::fmt::Debug for NatNetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatNetClient")
            .field("server", &self.server)
            .field("local", &self.local_addrs())
            .field("receivers", &self.dispatcher.receivers)
            .field("status", &*self.dispatcher.status.borrow())
            .finish()
    }
}

impl Drop for NatNetClient {
    fn drop(&mut self) {
        debug!("Dropping NatNet client");
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::packet::{MessageType, PacketHeader};
    use crate::test_utils::{
        encode_model_definition, frame_packet, packet, server_info_packet, simple_frame,
    };
    use crate::types::{PointCloudDefinition, Version};

    const V25: Version = Version::new(2, 5, 0, 0);
    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Debug, Default)]
    struct Recorded {
        frames: Vec<i32>,
        models: usize,
        status: Vec<(Channel, ChannelState)>,
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Recorded>>);

    impl Recorder {
        fn frames(&self) -> Vec<i32> {
            self.0.lock().unwrap().frames.clone()
        }

        fn models(&self) -> usize {
            self.0.lock().unwrap().models
        }

        fn status(&self) -> Vec<(Channel, ChannelState)> {
            self.0.lock().unwrap().status.clone()
        }
    }

    impl FrameReceiver for Recorder {
        fn on_model_definition(&mut self, _model: &ModelDefinition) {
            self.0.lock().unwrap().models += 1;
        }

        fn on_frame_snapshot(&mut self, frame: &FrameSnapshot) {
            self.0.lock().unwrap().frames.push(frame.frame_number);
        }

        fn on_connection_status(&mut self, channel: Channel, state: ChannelState) {
            self.0.lock().unwrap().status.push((channel, state));
        }
    }

    /// Fake server: one socket answering commands, one sending frames.
    struct FakeServer {
        command: UdpSocket,
        stream: UdpSocket,
    }

    impl FakeServer {
        async fn bind() -> anyhow::Result<Self> {
            Ok(Self {
                command: UdpSocket::bind("127.0.0.1:0").await?,
                stream: UdpSocket::bind("127.0.0.1:0").await?,
            })
        }

        fn config(&self) -> anyhow::Result<ClientConfig> {
            Ok(ClientConfig {
                server_address: "127.0.0.1".to_string(),
                local_address: Ipv4Addr::LOCALHOST,
                command_port: self.command.local_addr()?.port(),
                data_port: 0,
                multicast_group: None,
                recv_buffer_size: 256 * 1024,
                ..Default::default()
            })
        }

        /// Wait for the next command and return its message type and sender.
        async fn expect_command(&self, expected: MessageType) -> anyhow::Result<SocketAddr> {
            let mut buf = [0u8; 1024];
            let (len, from) = tokio::time::timeout(WAIT, self.command.recv_from(&mut buf)).await??;
            let (header, _) = PacketHeader::split(&buf[..len])?;
            assert_eq!(header.message_type(), Some(expected));
            Ok(from)
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(WAIT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn model_packet() -> Vec<u8> {
        let model = ModelDefinition {
            point_clouds: vec![PointCloudDefinition {
                name: "Markers".to_string(),
                marker_names: vec!["A".to_string(), "B".to_string()],
            }],
            ..Default::default()
        };
        packet(MessageType::ModelDef, &encode_model_definition(&model, V25))
    }

    /// Connect, spawn the loop and complete the handshake.
    async fn connected(
        server: &FakeServer,
        recorder: &Recorder,
    ) -> anyhow::Result<(ClientHandle, SocketAddr, tokio::task::JoinHandle<NatNetClient>)> {
        let mut client = NatNetClient::connect(server.config()?).await?;
        client.add_receiver(recorder.clone());
        let data_addr = client.local_addrs().1.expect("data channel open");
        let handle = client.handle();

        let command_addr = server.expect_command(MessageType::Ping).await?;
        let task = tokio::spawn(async move {
            client.run().await;
            client
        });

        server.command.send_to(&server_info_packet(V25), command_addr).await?;
        server.expect_command(MessageType::RequestModelDef).await?;
        server.command.send_to(&model_packet(), command_addr).await?;
        wait_until(|| recorder.models() == 1).await;

        Ok((handle, data_addr, task))
    }

    #[tokio::test]
    async fn handshake_then_model_definition() -> anyhow::Result<()> {
        let server = FakeServer::bind().await?;
        let recorder = Recorder::default();
        let (handle, _, task) = connected(&server, &recorder).await?;

        let status = handle.status();
        assert_eq!(status.server_info.map(|info| info.natnet_version), Some(V25));
        assert_eq!(status.stats.model_definitions, 1);
        assert!(recorder.status().contains(&(Channel::Data, ChannelState::Listening)));

        handle.shutdown();
        let client = task.await?;
        assert_eq!(client.model_definition().map(|m| m.point_clouds.len()), Some(1));
        assert_eq!(client.channel_state(Channel::Command), ChannelState::Closed);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_datagram_does_not_stop_the_stream() -> anyhow::Result<()> {
        let server = FakeServer::bind().await?;
        let recorder = Recorder::default();
        let (handle, data_addr, task) = connected(&server, &recorder).await?;

        for n in 1..=5 {
            let mut datagram = frame_packet(&simple_frame(n, V25), V25);
            if n == 3 {
                datagram.truncate(datagram.len() - 6);
            }
            server.stream.send_to(&datagram, data_addr).await?;
        }
        wait_until(|| recorder.frames().len() == 4).await;

        // Loop is still armed
        server.stream.send_to(&frame_packet(&simple_frame(6, V25), V25), data_addr).await?;
        wait_until(|| recorder.frames().len() == 5).await;
        assert_eq!(recorder.frames(), vec![1, 2, 4, 5, 6]);

        handle.shutdown();
        let client = task.await?;
        let stats = client.stats();
        assert_eq!(stats.frames, 5);
        assert_eq!(stats.malformed, 1);
        assert_eq!(client.markers().other.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_server_info_is_not_renotified() -> anyhow::Result<()> {
        let server = FakeServer::bind().await?;
        let recorder = Recorder::default();
        let mut client = NatNetClient::connect(server.config()?).await?;
        client.add_receiver(recorder.clone());
        let handle = client.handle();
        let command_addr = server.expect_command(MessageType::Ping).await?;
        let task = tokio::spawn(async move {
            client.run().await;
            client
        });

        server.command.send_to(&server_info_packet(V25), command_addr).await?;
        server.expect_command(MessageType::RequestModelDef).await?;
        server.command.send_to(&server_info_packet(V25), command_addr).await?;
        wait_until(|| handle.status().stats.datagrams == 2).await;

        // Exactly one handshake notification and no second request
        let handshakes = recorder
            .status()
            .iter()
            .filter(|s| **s == (Channel::Data, ChannelState::Listening))
            .count();
        assert_eq!(handshakes, 1);
        let mut buf = [0u8; 64];
        let second = tokio::time::timeout(Duration::from_millis(100), server.command.recv_from(&mut buf)).await;
        assert!(second.is_err());

        handle.shutdown();
        task.await?;
        Ok(())
    }

    #[tokio::test]
    async fn frames_before_handshake_are_dropped() -> anyhow::Result<()> {
        let server = FakeServer::bind().await?;
        let recorder = Recorder::default();
        let mut client = NatNetClient::connect(server.config()?).await?;
        client.add_receiver(recorder.clone());
        let data_addr = client.local_addrs().1.expect("data channel open");
        let handle = client.handle();
        let task = tokio::spawn(async move {
            client.run().await;
            client
        });

        for n in 1..=3 {
            server.stream.send_to(&frame_packet(&simple_frame(n, V25), V25), data_addr).await?;
        }
        wait_until(|| handle.status().stats.dropped_before_handshake == 3).await;
        assert!(recorder.frames().is_empty());

        handle.shutdown();
        task.await?;
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_version_closes_the_data_channel() -> anyhow::Result<()> {
        let server = FakeServer::bind().await?;
        let recorder = Recorder::default();
        let mut client = NatNetClient::connect(server.config()?).await?;
        client.add_receiver(recorder.clone());
        let handle = client.handle();
        let command_addr = server.expect_command(MessageType::Ping).await?;
        let task = tokio::spawn(async move {
            client.run().await;
            client
        });

        server.command.send_to(&server_info_packet(Version::new(3, 1, 0, 0)), command_addr).await?;
        wait_until(|| handle.status().data == ChannelState::Closed).await;

        assert_eq!(recorder.status(), vec![(Channel::Data, ChannelState::Closed)]);
        assert!(handle.status().server_info.is_some());
        assert_eq!(handle.status().command, ChannelState::Listening);

        handle.shutdown();
        let client = task.await?;
        assert_eq!(client.local_addrs(), (None, None));
        Ok(())
    }

    #[tokio::test]
    async fn commands_after_shutdown_are_rejected() -> anyhow::Result<()> {
        let server = FakeServer::bind().await?;
        let mut client = NatNetClient::connect(server.config()?).await?;
        client.shutdown();

        let err = client.request_model_definition().await.unwrap_err();
        assert!(matches!(err, NatNetError::NotConnected { .. }));
        assert!(err.is_fatal());

        // The loop exits immediately with both channels closed
        let handle = client.handle();
        client.run().await;
        assert_eq!(client.channel_state(Channel::Data), ChannelState::Closed);

        // The client is still alive, but nothing runs queued commands any more
        assert!(matches!(handle.reinit(), Err(NatNetError::NotConnected { .. })));
        assert!(matches!(
            handle.request_model_definition(),
            Err(NatNetError::NotConnected { .. })
        ));
        drop(client);
        Ok(())
    }

    #[tokio::test]
    async fn failed_rebind_closes_the_channel_and_still_handshakes() -> anyhow::Result<()> {
        let server = FakeServer::bind().await?;
        let port = std::net::UdpSocket::bind("127.0.0.1:0")?.local_addr()?.port();
        let recorder = Recorder::default();
        let mut client = NatNetClient::connect(ClientConfig { data_port: port, ..server.config()? }).await?;
        client.add_receiver(recorder.clone());
        server.expect_command(MessageType::Ping).await?;

        client.shutdown();
        let _taken = std::net::UdpSocket::bind(("127.0.0.1", port))?;

        let err = client.reinit().await.unwrap_err();
        assert!(matches!(err, NatNetError::ConnectFailure { .. }));
        assert_eq!(client.channel_state(Channel::Command), ChannelState::Listening);
        assert_eq!(client.channel_state(Channel::Data), ChannelState::Closed);
        assert_eq!(
            recorder.status(),
            vec![
                (Channel::Command, ChannelState::Closed),
                (Channel::Data, ChannelState::Closed),
                (Channel::Data, ChannelState::Closed),
            ]
        );

        // The command channel came back, so the handshake goes ahead
        let command_addr = server.expect_command(MessageType::Ping).await?;
        let handle = client.handle();
        let task = tokio::spawn(async move {
            client.run().await;
            client
        });
        server.command.send_to(&server_info_packet(V25), command_addr).await?;
        server.expect_command(MessageType::RequestModelDef).await?;
        assert!(!recorder.status().contains(&(Channel::Data, ChannelState::Listening)));

        handle.shutdown();
        task.await?;
        Ok(())
    }

    #[tokio::test]
    async fn changed_server_info_requests_a_new_model() -> anyhow::Result<()> {
        let server = FakeServer::bind().await?;
        let recorder = Recorder::default();
        let mut client = NatNetClient::connect(server.config()?).await?;
        client.add_receiver(recorder.clone());
        let handle = client.handle();
        let command_addr = server.expect_command(MessageType::Ping).await?;
        let task = tokio::spawn(async move {
            client.run().await;
            client
        });

        server.command.send_to(&server_info_packet(V25), command_addr).await?;
        server.expect_command(MessageType::RequestModelDef).await?;
        server.command.send_to(&model_packet(), command_addr).await?;
        wait_until(|| recorder.models() == 1).await;

        // Server restarted with another version; the old model was dropped
        let v29 = Version::new(2, 9, 0, 0);
        server.command.send_to(&server_info_packet(v29), command_addr).await?;
        server.expect_command(MessageType::RequestModelDef).await?;
        assert_eq!(handle.status().server_info.map(|info| info.natnet_version), Some(v29));

        handle.shutdown();
        let client = task.await?;
        assert!(client.model_definition().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn handle_queues_model_requests_and_reinit() -> anyhow::Result<()> {
        let server = FakeServer::bind().await?;
        let recorder = Recorder::default();
        let (handle, _, task) = connected(&server, &recorder).await?;

        handle.request_model_definition()?;
        server.expect_command(MessageType::RequestModelDef).await?;

        handle.reinit()?;
        let command_addr = server.expect_command(MessageType::Ping).await?;
        assert!(handle.status().server_info.is_none());
        server.command.send_to(&server_info_packet(V25), command_addr).await?;
        server.expect_command(MessageType::RequestModelDef).await?;

        handle.shutdown();
        task.await?;
        assert!(handle.request_model_definition().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn bind_failure_is_a_connect_failure() -> anyhow::Result<()> {
        let server = FakeServer::bind().await?;
        let taken = UdpSocket::bind("127.0.0.1:0").await?;
        let config = ClientConfig {
            data_port: taken.local_addr()?.port(),
            ..server.config()?
        };
        // SO_REUSEADDR does not let a second socket share a port held without it
        let err = NatNetClient::connect(config).await.unwrap_err();
        assert!(matches!(err, NatNetError::ConnectFailure { .. }));
        Ok(())
    }
}
