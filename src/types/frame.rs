//! Per-frame pose snapshot types

use serde::{Deserialize, Serialize};

use super::{Quat, Vec3};

/// Marker positions of one point cloud in a frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloudData {
    pub name: String,
    pub markers: Vec<Vec3>,
}

/// Pose and observed markers of one rigid body in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyData {
    pub id: i32,
    pub position: Vec3,
    pub orientation: Quat,
    /// Observed marker positions
    pub markers: Vec<Vec3>,
    /// Marker IDs parallel to `markers` (NatNet 2.0+)
    pub marker_ids: Option<Vec<i32>>,
    /// Marker sizes parallel to `markers` (NatNet 2.0+)
    pub marker_sizes: Option<Vec<f32>>,
    /// Mean marker tracking error (NatNet 2.0+)
    pub mean_error: Option<f32>,
    /// Whether the body was tracked in this frame (NatNet 2.6+)
    pub tracking_valid: Option<bool>,
}

impl RigidBodyData {
    fn scaled(mut self, scale: f32) -> Self {
        self.position = self.position.scaled(scale);
        for marker in &mut self.markers {
            *marker = marker.scaled(scale);
        }
        self
    }
}

/// Bone poses of one skeleton in a frame, in definition order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SkeletonData {
    pub id: i32,
    pub rigid_bodies: Vec<RigidBodyData>,
}

/// Decoded contents of one `FrameOfData` packet.
///
/// Snapshots are transient: a new one is produced for every data packet and
/// handed to the receivers by reference.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Server frame counter (wraps)
    pub frame_number: i32,
    pub point_clouds: Vec<PointCloudData>,
    /// Rigid bodies that are not part of a skeleton
    pub rigid_bodies: Vec<RigidBodyData>,
    pub skeletons: Vec<SkeletonData>,
    /// Capture latency in seconds
    pub latency: f32,
    /// Markers seen but not matched to any point cloud or rigid body
    pub other_markers: Vec<Vec3>,
}

impl FrameSnapshot {
    /// Find an unattached rigid body by ID.
    pub fn rigid_body(&self, id: i32) -> Option<&RigidBodyData> {
        self.rigid_bodies.iter().find(|body| body.id == id)
    }

    /// Find a skeleton by ID.
    pub fn skeleton(&self, id: i32) -> Option<&SkeletonData> {
        self.skeletons.iter().find(|skeleton| skeleton.id == id)
    }

    /// All point-cloud marker positions, in stream order.
    pub fn tracked_markers(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.point_clouds.iter().flat_map(|cloud| cloud.markers.iter().copied())
    }

    /// Apply a uniform coordinate scale to every position in the frame.
    pub fn scaled(mut self, scale: f32) -> Self {
        for cloud in &mut self.point_clouds {
            for marker in &mut cloud.markers {
                *marker = marker.scaled(scale);
            }
        }
        self.rigid_bodies = self.rigid_bodies.into_iter().map(|body| body.scaled(scale)).collect();
        for skeleton in &mut self.skeletons {
            let bones = std::mem::take(&mut skeleton.rigid_bodies);
            skeleton.rigid_bodies = bones.into_iter().map(|bone| bone.scaled(scale)).collect();
        }
        for marker in &mut self.other_markers {
            *marker = marker.scaled(scale);
        }
        self
    }
}

/// Marker positions of the most recent frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Markers {
    /// Point-cloud markers
    pub tracked: Vec<Vec3>,
    /// Unidentified markers
    pub other: Vec<Vec3>,
}

impl Markers {
    pub fn from_frame(frame: &FrameSnapshot) -> Self {
        Self { tracked: frame.tracked_markers().collect(), other: frame.other_markers.clone() }
    }
}

/// Compare frame numbers with wraparound using the half-range rule.
/// Returns true if `a` is considered newer than `b`.
pub fn frame_after(a: i32, b: i32) -> bool {
    if a == b {
        return false;
    }
    (a as u32).wrapping_sub(b as u32) < 0x8000_0000
}
