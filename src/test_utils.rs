//! Test utilities: a reference encoder for NatNet payloads
//!
//! The encoder mirrors the decoder's layout rules so tests and benchmarks can
//! build byte-exact datagrams from typed values. It is not part of the public
//! API of normal builds.

#![cfg(any(test, feature = "benchmark"))]

use bytes::{BufMut, BytesMut};

use crate::packet::{MAX_NAME_LENGTH, MessageType};
use crate::types::{
    FrameSnapshot, ModelDefinition, PointCloudData, Quat, RigidBodyData, RigidBodyDefinition,
    ServerInfo, SkeletonData, Vec3, Version,
};

/// Wrap a payload in a message header.
pub fn packet(message: MessageType, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u16_le(message as u16);
    buf.put_u16_le(payload.len() as u16);
    buf.put_slice(payload);
    buf.to_vec()
}

/// Encode a server-info reply payload.
pub fn encode_server_info(info: &ServerInfo) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(MAX_NAME_LENGTH + 8);
    let name = info.application.as_bytes();
    let len = name.len().min(MAX_NAME_LENGTH - 1);
    buf.put_slice(&name[..len]);
    buf.put_bytes(0, MAX_NAME_LENGTH - len);
    buf.put_slice(&info.app_version.0);
    buf.put_slice(&info.natnet_version.0);
    buf.to_vec()
}

/// Complete server-info datagram for the given NatNet version.
pub fn server_info_packet(natnet_version: Version) -> Vec<u8> {
    let info = ServerInfo {
        application: "Motive".to_string(),
        app_version: Version::new(1, 10, 0, 0),
        natnet_version,
    };
    packet(MessageType::ServerInfo, &encode_server_info(&info))
}

fn put_cstring(buf: &mut BytesMut, text: &str) {
    buf.put_slice(text.as_bytes());
    buf.put_u8(0);
}

fn put_vec3(buf: &mut BytesMut, v: Vec3) {
    buf.put_f32_le(v.x);
    buf.put_f32_le(v.y);
    buf.put_f32_le(v.z);
}

fn put_quat(buf: &mut BytesMut, q: Quat) {
    buf.put_f32_le(q.x);
    buf.put_f32_le(q.y);
    buf.put_f32_le(q.z);
    buf.put_f32_le(q.w);
}

fn put_rigid_body_definition(buf: &mut BytesMut, body: &RigidBodyDefinition, version: Version) {
    if version.has_rigid_body_names() {
        put_cstring(buf, &body.name);
    }
    buf.put_i32_le(body.id);
    buf.put_i32_le(body.parent_id);
    put_vec3(buf, body.offset);
}

/// Encode a model definition payload for the given NatNet version.
pub fn encode_model_definition(model: &ModelDefinition, version: Version) -> Vec<u8> {
    let mut buf = BytesMut::new();
    let count = model.point_clouds.len() + model.rigid_bodies.len() + model.skeletons.len();
    buf.put_i32_le(count as i32);

    for cloud in &model.point_clouds {
        buf.put_i32_le(0);
        put_cstring(&mut buf, &cloud.name);
        buf.put_i32_le(cloud.marker_names.len() as i32);
        for marker in &cloud.marker_names {
            put_cstring(&mut buf, marker);
        }
    }
    for body in &model.rigid_bodies {
        buf.put_i32_le(1);
        put_rigid_body_definition(&mut buf, body, version);
    }
    for skeleton in &model.skeletons {
        buf.put_i32_le(2);
        put_cstring(&mut buf, &skeleton.name);
        buf.put_i32_le(skeleton.id);
        buf.put_i32_le(skeleton.rigid_bodies.len() as i32);
        for bone in &skeleton.rigid_bodies {
            put_rigid_body_definition(&mut buf, bone, version);
        }
    }
    buf.to_vec()
}

fn put_positions(buf: &mut BytesMut, positions: &[Vec3]) {
    buf.put_i32_le(positions.len() as i32);
    for p in positions {
        put_vec3(buf, *p);
    }
}

fn put_rigid_body(buf: &mut BytesMut, body: &RigidBodyData, version: Version) {
    buf.put_i32_le(body.id);
    put_vec3(buf, body.position);
    put_quat(buf, body.orientation);
    put_positions(buf, &body.markers);

    if version.has_marker_details() {
        let count = body.markers.len();
        let ids = body.marker_ids.clone().unwrap_or_else(|| vec![0; count]);
        let sizes = body.marker_sizes.clone().unwrap_or_else(|| vec![0.0; count]);
        for id in ids {
            buf.put_i32_le(id);
        }
        for size in sizes {
            buf.put_f32_le(size);
        }
        buf.put_f32_le(body.mean_error.unwrap_or(0.0));
    }
    if version.has_tracking_flags() {
        buf.put_i16_le(i16::from(body.tracking_valid.unwrap_or(true)));
    }
}

/// Encode a frame payload for the given NatNet version.
///
/// Version-gated fields are written only when `version` carries them, so the
/// caller should build frames whose optional fields match the version.
pub fn encode_frame(frame: &FrameSnapshot, version: Version) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_i32_le(frame.frame_number);

    buf.put_i32_le(frame.point_clouds.len() as i32);
    for cloud in &frame.point_clouds {
        put_cstring(&mut buf, &cloud.name);
        put_positions(&mut buf, &cloud.markers);
    }

    buf.put_i32_le(frame.rigid_bodies.len() as i32);
    for body in &frame.rigid_bodies {
        put_rigid_body(&mut buf, body, version);
    }

    buf.put_i32_le(frame.skeletons.len() as i32);
    for skeleton in &frame.skeletons {
        buf.put_i32_le(skeleton.id);
        buf.put_i32_le(skeleton.rigid_bodies.len() as i32);
        for bone in &skeleton.rigid_bodies {
            put_rigid_body(&mut buf, bone, version);
        }
    }

    put_positions(&mut buf, &frame.other_markers);
    buf.put_f32_le(frame.latency);
    buf.to_vec()
}

/// Complete frame datagram.
pub fn frame_packet(frame: &FrameSnapshot, version: Version) -> Vec<u8> {
    packet(MessageType::FrameOfData, &encode_frame(frame, version))
}

/// Rigid body with `marker_count` markers whose optional fields match `version`.
pub fn rigid_body(id: i32, marker_count: usize, version: Version) -> RigidBodyData {
    let markers: Vec<Vec3> =
        (0..marker_count).map(|i| Vec3::new(i as f32, id as f32, 0.5)).collect();
    let details = version.has_marker_details();
    RigidBodyData {
        id,
        position: Vec3::new(id as f32, 1.0, -1.0),
        orientation: Quat::new(0.0, 0.7071068, 0.0, 0.7071068),
        marker_ids: details.then(|| (0..marker_count as i32).map(|i| 100 + i).collect()),
        marker_sizes: details.then(|| vec![0.014; marker_count]),
        mean_error: details.then_some(0.0005),
        tracking_valid: version.has_tracking_flags().then_some(true),
        markers,
    }
}

/// Frame with one point cloud, one rigid body and one unidentified marker.
pub fn simple_frame(frame_number: i32, version: Version) -> FrameSnapshot {
    FrameSnapshot {
        frame_number,
        point_clouds: vec![PointCloudData {
            name: "Markers".to_string(),
            markers: vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
        }],
        rigid_bodies: vec![rigid_body(1, 2, version)],
        skeletons: vec![SkeletonData { id: 1, rigid_bodies: vec![rigid_body(1, 0, version)] }],
        latency: 0.008,
        other_markers: vec![Vec3::new(0.0, 0.0, 1.0)],
    }
}

/// Incremental builder for model definition payloads (NatNet 2.x layout),
/// including datasets the typed encoder cannot express.
#[derive(Debug, Default)]
pub struct ModelPayloadBuilder {
    count: i32,
    body: BytesMut,
}

impl ModelPayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn point_cloud(mut self, name: &str, markers: &[&str]) -> Self {
        self.count += 1;
        self.body.put_i32_le(0);
        put_cstring(&mut self.body, name);
        self.body.put_i32_le(markers.len() as i32);
        for marker in markers {
            put_cstring(&mut self.body, marker);
        }
        self
    }

    pub fn rigid_body(mut self, name: &str, id: i32, parent_id: i32, offset: Vec3) -> Self {
        self.count += 1;
        self.body.put_i32_le(1);
        let body = RigidBodyDefinition { name: name.to_string(), id, parent_id, offset };
        put_rigid_body_definition(&mut self.body, &body, Version::new(2, 0, 0, 0));
        self
    }

    pub fn raw_dataset(mut self, kind: i32, bytes: &[u8]) -> Self {
        self.count += 1;
        self.body.put_i32_le(kind);
        self.body.put_slice(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(4 + self.body.len());
        buf.put_i32_le(self.count);
        buf.put_slice(&self.body);
        buf.to_vec()
    }
}

/// Builder for frame payloads with hand-picked rigid-body fields.
#[derive(Debug)]
pub struct FramePayloadBuilder {
    frame: FrameSnapshot,
}

impl FramePayloadBuilder {
    pub fn new(frame_number: i32) -> Self {
        Self { frame: FrameSnapshot { frame_number, ..Default::default() } }
    }

    /// Add a rigid body without markers.
    pub fn rigid_body(mut self, id: i32, position: Vec3, orientation: Quat, mean_error: f32) -> Self {
        self.frame.rigid_bodies.push(RigidBodyData {
            id,
            position,
            orientation,
            markers: Vec::new(),
            marker_ids: Some(Vec::new()),
            marker_sizes: Some(Vec::new()),
            mean_error: Some(mean_error),
            tracking_valid: None,
        });
        self
    }

    pub fn other_marker(mut self, position: Vec3) -> Self {
        self.frame.other_markers.push(position);
        self
    }

    pub fn latency(mut self, latency: f32) -> Self {
        self.frame.latency = latency;
        self
    }

    pub fn build(self, version: Version) -> Vec<u8> {
        encode_frame(&self.frame, version)
    }
}
