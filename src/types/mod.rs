//! Core types for decoded NatNet data.
//!
//! This module provides the value types the decoder produces and receivers consume:
//! - [`ModelDefinition`] describes the tracked objects of a session (point clouds,
//!   rigid bodies, skeletons). It is received once per handshake and replaced wholesale.
//! - [`FrameSnapshot`] holds the poses of one captured frame.
//! - [`Version`] and [`ServerInfo`] describe the server and gate the optional
//!   fields of the stream.
//! - [`Vec3`] and [`Quat`] are the geometric primitives.
//!
//! Every record owns its storage; nothing borrows from the datagram it was decoded from.
//!
//! ## Usage Example
//!
//! ```rust
//! use natnet::types::{FrameSnapshot, RigidBodyData, Quat, Vec3};
//!
//! let frame = FrameSnapshot {
//!     frame_number: 42,
//!     rigid_bodies: vec![RigidBodyData {
//!         id: 7,
//!         position: Vec3::new(1.0, 2.0, 3.0),
//!         orientation: Quat::IDENTITY,
//!         markers: Vec::new(),
//!         marker_ids: None,
//!         marker_sizes: None,
//!         mean_error: None,
//!         tracking_valid: None,
//!     }],
//!     ..Default::default()
//! };
//!
//! let scaled = frame.scaled(1000.0); // meters to millimeters
//! assert_eq!(scaled.rigid_body(7).unwrap().position, Vec3::new(1000.0, 2000.0, 3000.0));
//! ```

mod frame;
mod geometry;
mod model;
mod update_rate;
mod version;

// Re-export all public types
pub use frame::{
    FrameSnapshot, Markers, PointCloudData, RigidBodyData, SkeletonData, frame_after,
};
pub use geometry::{Quat, Vec3};
pub use model::{
    ModelDefinition, NO_PARENT, PointCloudDefinition, RigidBodyDefinition, SkeletonDefinition,
};
pub use update_rate::UpdateRate;
pub use version::{MAX_SUPPORTED_MAJOR, MIN_SUPPORTED_MAJOR, ServerInfo, Version};
