//! FrameOfData payload decoding

use tracing::trace;

use super::ensure_supported;
use crate::packet::PacketReader;
use crate::types::{FrameSnapshot, PointCloudData, RigidBodyData, SkeletonData, Version};
use crate::Result;

const POSITION_SIZE: usize = 12;
const MIN_POINT_CLOUD_SIZE: usize = 1 + 4;
const MIN_SKELETON_SIZE: usize = 4 + 4;

/// Tracking-valid bit of the rigid-body parameter word (2.6+).
const PARAM_TRACKING_VALID: i16 = 0x01;

/// Decode a frame payload using the negotiated NatNet version.
///
/// Fields introduced after NatNet 1.x are read only when `version` says the
/// server sends them; reading them from an older stream would shift every
/// following offset.
pub fn decode_frame(payload: &[u8], version: Version) -> Result<FrameSnapshot> {
    ensure_supported(version)?;

    let mut reader = PacketReader::new(payload, "FrameOfData");
    let frame_number = reader.read_i32()?;

    let cloud_count = reader.read_count("point cloud", MIN_POINT_CLOUD_SIZE)?;
    let point_clouds =
        (0..cloud_count).map(|_| read_point_cloud(&mut reader)).collect::<Result<Vec<_>>>()?;

    let body_count = reader.read_count("rigid body", min_rigid_body_size(version))?;
    let rigid_bodies = (0..body_count)
        .map(|_| read_rigid_body(&mut reader, version))
        .collect::<Result<Vec<_>>>()?;

    let skeleton_count = reader.read_count("skeleton", MIN_SKELETON_SIZE)?;
    let skeletons = (0..skeleton_count)
        .map(|_| read_skeleton(&mut reader, version))
        .collect::<Result<Vec<_>>>()?;

    let other_markers = read_positions(&mut reader, "unidentified marker")?;
    let latency = reader.read_f32()?;

    trace!(
        frame_number,
        rigid_bodies = rigid_bodies.len(),
        skeletons = skeletons.len(),
        trailing = reader.remaining(),
        "Decoded frame"
    );

    Ok(FrameSnapshot {
        frame_number,
        point_clouds,
        rigid_bodies,
        skeletons,
        latency,
        other_markers,
    })
}

fn read_positions(reader: &mut PacketReader<'_>, what: &str) -> Result<Vec<crate::types::Vec3>> {
    let count = reader.read_count(what, POSITION_SIZE)?;
    (0..count).map(|_| reader.read_vec3()).collect()
}

fn read_point_cloud(reader: &mut PacketReader<'_>) -> Result<PointCloudData> {
    let name = reader.read_cstring()?;
    let markers = read_positions(reader, "point cloud marker")?;
    Ok(PointCloudData { name, markers })
}

fn min_rigid_body_size(version: Version) -> usize {
    // id, position, orientation, marker count
    let mut size = 4 + 12 + 16 + 4;
    if version.has_marker_details() {
        size += 4;
    }
    if version.has_tracking_flags() {
        size += 2;
    }
    size
}

fn read_rigid_body(reader: &mut PacketReader<'_>, version: Version) -> Result<RigidBodyData> {
    let id = reader.read_i32()?;
    let position = reader.read_vec3()?;
    let orientation = reader.read_quat()?;

    let per_marker = if version.has_marker_details() { POSITION_SIZE + 8 } else { POSITION_SIZE };
    let marker_count = reader.read_count("rigid body marker", per_marker)?;
    let markers = (0..marker_count).map(|_| reader.read_vec3()).collect::<Result<Vec<_>>>()?;

    let (marker_ids, marker_sizes, mean_error) = if version.has_marker_details() {
        let ids = (0..marker_count).map(|_| reader.read_i32()).collect::<Result<Vec<_>>>()?;
        let sizes = (0..marker_count).map(|_| reader.read_f32()).collect::<Result<Vec<_>>>()?;
        let mean_error = reader.read_f32()?;
        (Some(ids), Some(sizes), Some(mean_error))
    } else {
        (None, None, None)
    };

    let tracking_valid = if version.has_tracking_flags() {
        Some(reader.read_i16()? & PARAM_TRACKING_VALID != 0)
    } else {
        None
    };

    Ok(RigidBodyData {
        id,
        position,
        orientation,
        markers,
        marker_ids,
        marker_sizes,
        mean_error,
        tracking_valid,
    })
}

fn read_skeleton(reader: &mut PacketReader<'_>, version: Version) -> Result<SkeletonData> {
    let id = reader.read_i32()?;
    let bone_count = reader.read_count("skeleton bone", min_rigid_body_size(version))?;
    let rigid_bodies = (0..bone_count)
        .map(|_| read_rigid_body(reader, version))
        .collect::<Result<Vec<_>>>()?;
    Ok(SkeletonData { id, rigid_bodies })
}
