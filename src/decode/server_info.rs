//! ServerInfo payload decoding

use crate::Result;
use crate::packet::{MAX_NAME_LENGTH, PacketReader};
use crate::types::{ServerInfo, Version};

/// Decode the reply to a connection request.
///
/// Layout: 256-byte null-padded application name, application version
/// `[u8; 4]`, NatNet version `[u8; 4]`.
pub fn decode_server_info(payload: &[u8]) -> Result<ServerInfo> {
    let mut reader = PacketReader::new(payload, "ServerInfo");
    let application = reader.read_fixed_cstring(MAX_NAME_LENGTH)?;
    let app_version = Version::from(reader.read_version()?);
    let natnet_version = Version::from(reader.read_version()?);
    Ok(ServerInfo { application, app_version, natnet_version })
}
