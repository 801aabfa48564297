//! Protocol version tuples and server identity

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest NatNet major version the decoder understands.
pub const MIN_SUPPORTED_MAJOR: u8 = 1;

/// Highest NatNet major version the decoder understands.
pub const MAX_SUPPORTED_MAJOR: u8 = 2;

/// A `[major, minor, build, revision]` version tuple as sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Version(pub [u8; 4]);

impl Version {
    pub const fn new(major: u8, minor: u8, build: u8, revision: u8) -> Self {
        Self([major, minor, build, revision])
    }

    pub fn major(&self) -> u8 {
        self.0[0]
    }

    pub fn minor(&self) -> u8 {
        self.0[1]
    }

    pub fn build(&self) -> u8 {
        self.0[2]
    }

    pub fn revision(&self) -> u8 {
        self.0[3]
    }

    /// Check whether this version is `major.minor` or newer.
    pub fn at_least(&self, major: u8, minor: u8) -> bool {
        (self.major(), self.minor()) >= (major, minor)
    }

    /// Whether frame and model layouts of this NatNet version can be decoded.
    pub fn is_supported(&self) -> bool {
        (MIN_SUPPORTED_MAJOR..=MAX_SUPPORTED_MAJOR).contains(&self.major())
    }

    /// Rigid-body data carries marker IDs, marker sizes and mean error (2.0+).
    pub fn has_marker_details(&self) -> bool {
        self.at_least(2, 0)
    }

    /// Rigid-body definitions start with a name (2.0+).
    pub fn has_rigid_body_names(&self) -> bool {
        self.at_least(2, 0)
    }

    /// Rigid-body data ends with a parameter word holding the tracking-valid flag (2.6+).
    pub fn has_tracking_flags(&self) -> bool {
        self.at_least(2, 6)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, build, revision] = self.0;
        write!(f, "{}.{}.{}.{}", major, minor, build, revision)
    }
}

impl From<[u8; 4]> for Version {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}

/// Identity reported by the server in its reply to a connection request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Application name, e.g. `"Motive"`
    pub application: String,
    /// Version of the sending application
    pub app_version: Version,
    /// NatNet protocol version; gates every optional field of the stream
    pub natnet_version: Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates_follow_protocol_history() {
        let v1 = Version::new(1, 4, 0, 0);
        let v20 = Version::new(2, 0, 0, 0);
        let v25 = Version::new(2, 5, 0, 0);
        let v29 = Version::new(2, 9, 0, 0);

        assert!(!v1.has_marker_details());
        assert!(!v1.has_rigid_body_names());
        assert!(v20.has_marker_details());
        assert!(v20.has_rigid_body_names());
        assert!(!v25.has_tracking_flags());
        assert!(v29.has_tracking_flags());
    }

    #[test]
    fn supported_range() {
        assert!(!Version::new(0, 9, 0, 0).is_supported());
        assert!(Version::new(1, 0, 0, 0).is_supported());
        assert!(Version::new(2, 10, 0, 0).is_supported());
        assert!(!Version::new(3, 0, 0, 0).is_supported());
    }

    #[test]
    fn display_and_ordering() {
        assert_eq!(Version::new(2, 5, 1, 0).to_string(), "2.5.1.0");
        assert!(Version::new(2, 10, 0, 0) > Version::new(2, 9, 9, 9));
        assert!(Version::new(2, 5, 0, 0).at_least(2, 5));
        assert!(!Version::new(2, 5, 0, 0).at_least(2, 6));
    }
}
