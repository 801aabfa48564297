//! Model definition: the schema of tracked objects announced by the server

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::Vec3;

/// Parent ID used by rigid bodies that are not attached to another body.
pub const NO_PARENT: i32 = -1;

/// Static schema of a labeled marker group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloudDefinition {
    pub name: String,
    /// Marker labels, in stream order
    pub marker_names: Vec<String>,
}

/// Definition of a single rigid body or skeleton bone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyDefinition {
    /// Name (empty for NatNet 1.x streams, which do not carry one)
    pub name: String,
    pub id: i32,
    /// ID of the parent body within the same skeleton, or [`NO_PARENT`]
    pub parent_id: i32,
    /// Offset relative to the parent
    pub offset: Vec3,
}

impl RigidBodyDefinition {
    pub fn has_parent(&self) -> bool {
        self.parent_id != NO_PARENT
    }
}

/// A named hierarchy of rigid bodies.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SkeletonDefinition {
    pub name: String,
    pub id: i32,
    /// Bones, in stream order (the order frame data follows)
    pub rigid_bodies: Vec<RigidBodyDefinition>,
}

/// Complete tracked-object schema for a session.
///
/// A new definition always replaces the previous one as a whole.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub point_clouds: Vec<PointCloudDefinition>,
    /// Rigid bodies that are not part of a skeleton
    pub rigid_bodies: Vec<RigidBodyDefinition>,
    pub skeletons: Vec<SkeletonDefinition>,
}

impl ModelDefinition {
    pub fn is_empty(&self) -> bool {
        self.point_clouds.is_empty() && self.rigid_bodies.is_empty() && self.skeletons.is_empty()
    }

    /// Find an unattached rigid body by ID.
    pub fn rigid_body(&self, id: i32) -> Option<&RigidBodyDefinition> {
        self.rigid_bodies.iter().find(|body| body.id == id)
    }

    /// Find a skeleton by ID.
    pub fn skeleton(&self, id: i32) -> Option<&SkeletonDefinition> {
        self.skeletons.iter().find(|skeleton| skeleton.id == id)
    }

    /// Find a point cloud by name.
    pub fn point_cloud(&self, name: &str) -> Option<&PointCloudDefinition> {
        self.point_clouds.iter().find(|cloud| cloud.name == name)
    }

    /// Check ID uniqueness.
    ///
    /// Unattached rigid bodies, skeletons, and the bones of each skeleton form
    /// separate ID namespaces. Returns a description of the first duplicate found.
    pub fn find_duplicate_id(&self) -> Option<String> {
        if let Some(id) = first_duplicate(self.rigid_bodies.iter().map(|body| body.id)) {
            return Some(format!("rigid body ID {} defined twice", id));
        }
        if let Some(id) = first_duplicate(self.skeletons.iter().map(|skeleton| skeleton.id)) {
            return Some(format!("skeleton ID {} defined twice", id));
        }
        for skeleton in &self.skeletons {
            if let Some(id) = first_duplicate(skeleton.rigid_bodies.iter().map(|bone| bone.id)) {
                return Some(format!("bone ID {} defined twice in skeleton '{}'", id, skeleton.name));
            }
        }
        None
    }

    /// Apply a uniform coordinate scale to every offset.
    pub fn scaled(mut self, scale: f32) -> Self {
        let bones = self.skeletons.iter_mut().flat_map(|skeleton| skeleton.rigid_bodies.iter_mut());
        for body in self.rigid_bodies.iter_mut().chain(bones) {
            body.offset = body.offset.scaled(scale);
        }
        self
    }
}

fn first_duplicate(ids: impl Iterator<Item = i32>) -> Option<i32> {
    let mut seen = HashSet::new();
    ids.into_iter().find(|id| !seen.insert(*id))
}
