//! Client configuration.
//!
//! Every field has a default matching a Motive server on the local machine with
//! multicast streaming enabled, so an empty YAML document is a valid config:
//!
//! ```yaml
//! server_address: 192.168.1.20
//! local_address: 192.168.1.50
//! multicast_group: 239.255.42.99
//! scale: 1000.0   # meters to millimeters
//! ```

use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{NatNetError, Result};

pub const DEFAULT_COMMAND_PORT: u16 = 1510;
pub const DEFAULT_DATA_PORT: u16 = 1511;
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 42, 99);

/// Network and decoding settings for one [`NatNetClient`](crate::NatNetClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host name or IPv4 address of the NatNet server
    pub server_address: String,

    /// Local interface to bind and to join multicast on
    pub local_address: Ipv4Addr,

    pub command_port: u16,
    pub data_port: u16,

    /// Multicast group of the data stream; `None` for unicast
    pub multicast_group: Option<Ipv4Addr>,

    /// Uniform scale applied to every decoded position and definition offset
    pub scale: f32,

    /// Socket receive buffer size in bytes
    pub recv_buffer_size: usize,

    /// Send a model definition request once the server version is known
    pub request_model_on_connect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            local_address: Ipv4Addr::UNSPECIFIED,
            command_port: DEFAULT_COMMAND_PORT,
            data_port: DEFAULT_DATA_PORT,
            multicast_group: Some(DEFAULT_MULTICAST_GROUP),
            scale: 1.0,
            recv_buffer_size: 4 * 1024 * 1024,
            request_model_on_connect: true,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ClientConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| NatNetError::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale == 0.0 {
            return Err(NatNetError::config(format!(
                "scale must be finite and non-zero, got {}",
                self.scale
            )));
        }
        if self.server_address.trim().is_empty() {
            return Err(NatNetError::config("server_address is empty"));
        }
        if self.command_port == 0 {
            return Err(NatNetError::config("command_port must be non-zero"));
        }
        if let Some(group) = self.multicast_group.filter(|group| !group.is_multicast()) {
            return Err(NatNetError::config(format!("{} is not a multicast address", group)));
        }
        Ok(())
    }
}
