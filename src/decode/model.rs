//! ModelDef payload decoding

use tracing::trace;

use super::ensure_supported;
use crate::packet::PacketReader;
use crate::types::{
    ModelDefinition, PointCloudDefinition, RigidBodyDefinition, SkeletonDefinition, Version,
};
use crate::{NatNetError, Result};

const DATASET_POINT_CLOUD: i32 = 0;
const DATASET_RIGID_BODY: i32 = 1;
const DATASET_SKELETON: i32 = 2;

// Smallest encodings, used to bound counts before allocating
const MIN_NAME_SIZE: usize = 1;
const MIN_POINT_CLOUD_DEF_SIZE: usize = MIN_NAME_SIZE + 4;
const MIN_DATASET_SIZE: usize = 4 + MIN_POINT_CLOUD_DEF_SIZE;
const RIGID_BODY_DEF_FIELDS_SIZE: usize = 4 + 4 + 12;

/// Decode a model definition payload.
///
/// Unknown dataset discriminators are an error: datasets carry no length prefix,
/// so there is no way to skip one safely.
pub fn decode_model_definition(payload: &[u8], version: Version) -> Result<ModelDefinition> {
    ensure_supported(version)?;

    let mut reader = PacketReader::new(payload, "ModelDef");
    let dataset_count = reader.read_count("dataset", MIN_DATASET_SIZE)?;
    let mut model = ModelDefinition::default();

    for index in 0..dataset_count {
        let offset = reader.position();
        match reader.read_i32()? {
            DATASET_POINT_CLOUD => model.point_clouds.push(read_point_cloud(&mut reader)?),
            DATASET_RIGID_BODY => model.rigid_bodies.push(read_rigid_body(&mut reader, version)?),
            DATASET_SKELETON => model.skeletons.push(read_skeleton(&mut reader, version)?),
            other => {
                return Err(NatNetError::malformed(
                    "ModelDef",
                    format!("unknown dataset type {} for dataset {} at offset {}", other, index, offset),
                ));
            }
        }
    }

    if let Some(duplicate) = model.find_duplicate_id() {
        return Err(NatNetError::malformed("ModelDef", duplicate));
    }

    trace!(
        point_clouds = model.point_clouds.len(),
        rigid_bodies = model.rigid_bodies.len(),
        skeletons = model.skeletons.len(),
        "Decoded model definition"
    );
    Ok(model)
}

fn read_point_cloud(reader: &mut PacketReader<'_>) -> Result<PointCloudDefinition> {
    let name = reader.read_cstring()?;
    let marker_count = reader.read_count("marker name", MIN_NAME_SIZE)?;
    let marker_names =
        (0..marker_count).map(|_| reader.read_cstring()).collect::<Result<Vec<_>>>()?;
    Ok(PointCloudDefinition { name, marker_names })
}

fn rigid_body_def_size(version: Version) -> usize {
    if version.has_rigid_body_names() {
        MIN_NAME_SIZE + RIGID_BODY_DEF_FIELDS_SIZE
    } else {
        RIGID_BODY_DEF_FIELDS_SIZE
    }
}

fn read_rigid_body(reader: &mut PacketReader<'_>, version: Version) -> Result<RigidBodyDefinition> {
    let name = if version.has_rigid_body_names() { reader.read_cstring()? } else { String::new() };
    let id = reader.read_i32()?;
    let parent_id = reader.read_i32()?;
    let offset = reader.read_vec3()?;
    Ok(RigidBodyDefinition { name, id, parent_id, offset })
}

fn read_skeleton(reader: &mut PacketReader<'_>, version: Version) -> Result<SkeletonDefinition> {
    let name = reader.read_cstring()?;
    let id = reader.read_i32()?;
    let bone_count = reader.read_count("skeleton bone", rigid_body_def_size(version))?;
    let rigid_bodies = (0..bone_count)
        .map(|_| read_rigid_body(reader, version))
        .collect::<Result<Vec<_>>>()?;
    Ok(SkeletonDefinition { name, id, rigid_bodies })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ModelPayloadBuilder, encode_model_definition};
    use crate::types::{NO_PARENT, Vec3};

    const V1: Version = Version::new(1, 4, 0, 0);
    const V25: Version = Version::new(2, 5, 0, 0);

    fn sample_model() -> ModelDefinition {
        ModelDefinition {
            point_clouds: vec![PointCloudDefinition {
                name: "Markers".to_string(),
                marker_names: vec!["M1".to_string(), "M2".to_string()],
            }],
            rigid_bodies: vec![RigidBodyDefinition {
                name: "Wand".to_string(),
                id: 1,
                parent_id: NO_PARENT,
                offset: Vec3::ZERO,
            }],
            skeletons: vec![SkeletonDefinition {
                name: "Actor".to_string(),
                id: 1,
                rigid_bodies: vec![
                    RigidBodyDefinition {
                        name: "Hip".to_string(),
                        id: 1,
                        parent_id: NO_PARENT,
                        offset: Vec3::ZERO,
                    },
                    RigidBodyDefinition {
                        name: "Spine".to_string(),
                        id: 2,
                        parent_id: 1,
                        offset: Vec3::new(0.0, 0.1, 0.0),
                    },
                ],
            }],
        }
    }

    #[test]
    fn single_point_cloud_scenario() {
        let payload = ModelPayloadBuilder::new()
            .point_cloud("Markers", &["A", "B", "C"])
            .build();

        let model = decode_model_definition(&payload, V25).unwrap();
        assert_eq!(model.point_clouds.len(), 1);
        assert_eq!(model.point_clouds[0].name, "Markers");
        assert_eq!(model.point_clouds[0].marker_names, vec!["A", "B", "C"]);
        assert!(model.rigid_bodies.is_empty());
        assert!(model.skeletons.is_empty());
    }

    #[test]
    fn nested_skeleton_bones_use_rigid_body_layout() {
        let model = sample_model();
        let payload = encode_model_definition(&model, V25);
        assert_eq!(decode_model_definition(&payload, V25).unwrap(), model);
    }

    #[test]
    fn version_one_rigid_bodies_have_no_names() {
        let mut model = sample_model();
        for body in model
            .rigid_bodies
            .iter_mut()
            .chain(model.skeletons.iter_mut().flat_map(|s| s.rigid_bodies.iter_mut()))
        {
            body.name.clear();
        }

        let payload = encode_model_definition(&model, V1);
        assert_eq!(decode_model_definition(&payload, V1).unwrap(), model);

        // The same bytes are not a valid 2.x stream
        assert_ne!(decode_model_definition(&payload, V25).ok(), Some(model));
    }

    #[test]
    fn unknown_dataset_type_is_malformed() {
        let payload = ModelPayloadBuilder::new().raw_dataset(7, &[0u8; 16]).build();
        let err = decode_model_definition(&payload, V25).unwrap_err();
        assert!(err.to_string().contains("unknown dataset type 7"));
    }

    #[test]
    fn duplicate_rigid_body_ids_are_malformed() {
        let payload = ModelPayloadBuilder::new()
            .rigid_body("A", 4, NO_PARENT, Vec3::ZERO)
            .rigid_body("B", 4, NO_PARENT, Vec3::ZERO)
            .build();
        let err = decode_model_definition(&payload, V25).unwrap_err();
        assert!(matches!(err, NatNetError::MalformedPacket { .. }));
    }

    #[test]
    fn implausible_counts_are_malformed() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1_000_000i32.to_le_bytes());
        payload.extend_from_slice(&[0u8; 32]);
        assert!(decode_model_definition(&payload, V25).is_err());

        let payload = (-3i32).to_le_bytes();
        assert!(decode_model_definition(&payload, V25).is_err());
    }

    #[test]
    fn every_truncation_is_malformed() {
        let payload = encode_model_definition(&sample_model(), V25);
        for len in 0..payload.len() {
            let err = decode_model_definition(&payload[..len], V25).unwrap_err();
            assert!(matches!(err, NatNetError::MalformedPacket { .. }), "prefix {}", len);
        }
    }
}
