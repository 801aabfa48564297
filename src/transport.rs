//! UDP sockets for the command and data channels.
//!
//! Both channels are plain UDP sockets built with `socket2` so buffer sizes and
//! address reuse can be set before binding, then handed to tokio. The command
//! socket binds an ephemeral port on the local address; the data socket binds the
//! data port and optionally joins the server's multicast group.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::config::ClientConfig;
use crate::{NatNetError, Result};

/// One of the two independent network paths to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Handshake and definition requests, and their replies
    Command,
    /// Continuous per-frame stream (unicast or multicast)
    Data,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Command => f.write_str("command"),
            Channel::Data => f.write_str("data"),
        }
    }
}

/// Lifecycle state of one channel.
///
/// `Disconnected → Binding → Listening ⇄ Processing → Closed`. A closed channel
/// stays closed until the client is re-initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Binding,
    /// Waiting for the next datagram
    Listening,
    /// A datagram is being decoded and dispatched
    Processing,
    Closed,
}

impl ChannelState {
    pub fn is_open(self) -> bool {
        matches!(self, ChannelState::Listening | ChannelState::Processing)
    }
}

/// Resolve `host:port` to the first IPv4 address.
pub async fn resolve_server(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
        NatNetError::connect_failed_with_source(format!("cannot resolve server {}", host), e)
    })?;
    addrs
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| NatNetError::connect_failed(format!("server {} has no IPv4 address", host)))
}

/// Bind the command socket on an ephemeral port.
pub fn bind_command_socket(config: &ClientConfig) -> Result<UdpSocket> {
    let local = SocketAddr::new(IpAddr::V4(config.local_address), 0);
    let socket = create_socket(config, false)?;
    bind(&socket, local, Channel::Command)?;
    into_tokio(socket, Channel::Command)
}

/// Bind the data socket on the data port, joining the multicast group if configured.
pub fn bind_data_socket(config: &ClientConfig) -> Result<UdpSocket> {
    let socket = create_socket(config, true)?;

    // Multicast receivers bind the wildcard address so group traffic is delivered.
    let bind_ip = if config.multicast_group.is_some() {
        Ipv4Addr::UNSPECIFIED
    } else {
        config.local_address
    };
    bind(&socket, SocketAddr::new(IpAddr::V4(bind_ip), config.data_port), Channel::Data)?;

    if let Some(group) = config.multicast_group {
        socket.join_multicast_v4(&group, &config.local_address).map_err(|e| {
            NatNetError::connect_failed_with_source(
                format!("cannot join multicast group {} on {}", group, config.local_address),
                e,
            )
        })?;
        debug!(%group, interface = %config.local_address, "Joined multicast group");
    }

    into_tokio(socket, Channel::Data)
}

fn create_socket(config: &ClientConfig, reuse_address: bool) -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NatNetError::connect_failed_with_source("cannot create UDP socket", e))?;

    if reuse_address {
        // Several clients on one host may listen to the same stream.
        socket.set_reuse_address(true).map_err(|e| {
            NatNetError::connect_failed_with_source("cannot set SO_REUSEADDR", e)
        })?;
    }
    socket.set_recv_buffer_size(config.recv_buffer_size).map_err(|e| {
        NatNetError::connect_failed_with_source(
            format!("cannot set receive buffer to {} bytes", config.recv_buffer_size),
            e,
        )
    })?;
    Ok(socket)
}

fn bind(socket: &Socket, local: SocketAddr, channel: Channel) -> Result<()> {
    socket.bind(&local.into()).map_err(|e| {
        NatNetError::connect_failed_with_source(format!("cannot bind {} socket to {}", channel, local), e)
    })
}

fn into_tokio(socket: Socket, channel: Channel) -> Result<UdpSocket> {
    let std_socket: StdUdpSocket = socket.into();
    std_socket.set_nonblocking(true).map_err(|e| NatNetError::socket_error(channel, e))?;
    let socket = UdpSocket::from_std(std_socket).map_err(|e| NatNetError::socket_error(channel, e))?;

    debug!(%channel, local = ?socket.local_addr().ok(), "Bound socket");
    Ok(socket)
}
