//! Mesh data consumed by the solver.
//!
//! The solver never skins or imports anything itself. A [`MeshAdapter`]
//! produces rest topology, weight maps and per-frame animation targets.

pub mod grid;
pub mod topology;
pub mod wrap;

use std::any::Any;
use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ClothResult;
use crate::math::RigidTransform;

/// Per-point scalar maps a LOD can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeightMapTarget {
    MaxDistance,
    BackstopDistance,
    BackstopRadius,
    TetherStiffness,
    AnimDriveStiffness,
    AnimDriveDamping,
    EdgeStiffness,
    BendingStiffness,
    AreaStiffness,
}

/// Named scalar arrays, one value per LOD point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeightMaps {
    maps: HashMap<WeightMapTarget, Vec<f32>>,
}

impl WeightMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: WeightMapTarget, values: Vec<f32>) {
        self.maps.insert(target, values);
    }

    pub fn get(&self, target: WeightMapTarget) -> Option<&[f32]> {
        self.maps.get(&target).map(Vec::as_slice)
    }

    /// The map for `target`, or `None` if it is missing or has the wrong length.
    pub fn get_sized(&self, target: WeightMapTarget, num_points: usize) -> Option<&[f32]> {
        self.get(target).filter(|m| m.len() == num_points)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

/// Triangles in LOD-local point indices.
///
/// The owning LOD's particle range supplies the offset; constraint code only
/// ever sees range-local slices, so indices stay local.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriangleMesh {
    elements: Vec<[u32; 3]>,
    num_points: usize,
}

impl TriangleMesh {
    /// Build from a flat index buffer, dropping triangles that reference
    /// missing points or repeat a vertex.
    pub fn from_indices(indices: &[u32], num_points: usize) -> Self {
        let mut elements = Vec::with_capacity(indices.len() / 3);
        let mut dropped = 0usize;
        for tri in indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]];
            let in_range = [a, b, c].iter().all(|&i| (i as usize) < num_points);
            if in_range && a != b && b != c && a != c {
                elements.push([a, b, c]);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 || indices.len() % 3 != 0 {
            tracing::warn!(
                dropped,
                trailing = indices.len() % 3,
                num_points,
                "dropped malformed triangles from cloth index buffer"
            );
        }
        Self {
            elements,
            num_points,
        }
    }

    pub fn elements(&self) -> &[[u32; 3]] {
        &self.elements
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn triangle_area(&self, positions: &[Vec3], t: usize) -> f32 {
        let [a, b, c] = self.elements[t];
        let (pa, pb, pc) = (
            positions[a as usize],
            positions[b as usize],
            positions[c as usize],
        );
        0.5 * (pb - pa).cross(pc - pa).length()
    }

    /// Area-weighted point normals.
    ///
    /// Points without any triangle keep a zero normal.
    pub fn compute_point_normals(&self, positions: &[Vec3], normals: &mut [Vec3]) {
        normals.fill(Vec3::ZERO);
        for &[a, b, c] in &self.elements {
            let (a, b, c) = (a as usize, b as usize, c as usize);
            // Magnitude is twice the triangle area.
            let n = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
            normals[a] += n;
            normals[b] += n;
            normals[c] += n;
        }
        for n in normals.iter_mut() {
            *n = n.normalize_or_zero();
        }
    }
}

/// Opaque producer of cloth topology and animation targets.
///
/// Positions, normals and transforms are in component space; the cloth maps
/// them into solver space.
pub trait MeshAdapter: Send + Sync + 'static {
    fn num_lods(&self) -> usize;

    /// LOD recommended by the animation system, `None` when not ready.
    fn lod_index(&self) -> Option<usize>;

    fn num_points(&self, lod: usize) -> usize;

    /// Flat triangle index buffer, three indices per triangle.
    fn indices(&self, lod: usize) -> &[u32];

    /// Reference pose used to derive rest lengths, angles and areas.
    fn rest_positions(&self, lod: usize) -> &[Vec3];

    fn weight_maps(&self, lod: usize) -> &WeightMaps;

    fn reference_bone_index(&self) -> Option<usize>;

    /// Reference bone in component space.
    fn reference_bone_transform(&self) -> RigidTransform;

    /// Component in world space.
    fn component_transform(&self) -> RigidTransform;

    fn num_bones(&self) -> usize;

    /// Bone `bone` in component space.
    fn bone_transform(&self, bone: usize) -> Option<RigidTransform>;

    /// Write the skinned target pose for `lod`.
    fn update(&self, prev_lod: Option<usize>, lod: usize, positions: &mut [Vec3], normals: &mut [Vec3]);

    /// Remap simulated state from `prev_lod` onto `lod`.
    ///
    /// Fails when the LODs are not adjacent or no mapping exists.
    #[allow(clippy::too_many_arguments)]
    fn wrap_deform_lod(
        &self,
        prev_lod: usize,
        lod: usize,
        normals: &[Vec3],
        positions: &[Vec3],
        velocities: &[Vec3],
        out_positions: &mut [Vec3],
        out_velocities: &mut [Vec3],
    ) -> ClothResult<()>;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_indices_drops_out_of_range_and_degenerate() {
        let mesh = TriangleMesh::from_indices(&[0, 1, 2, 0, 1, 9, 1, 1, 2], 3);
        assert_eq!(mesh.elements(), &[[0, 1, 2]]);
    }

    #[test]
    fn test_point_normals_of_flat_triangle() {
        let mesh = TriangleMesh::from_indices(&[0, 1, 2], 4);
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE];
        let mut normals = [Vec3::ONE; 4];
        mesh.compute_point_normals(&positions, &mut normals);
        for n in &normals[..3] {
            assert!((*n - Vec3::Z).length() < 1e-6);
        }
        assert_eq!(normals[3], Vec3::ZERO);
        assert!((mesh.triangle_area(&positions, 0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_weight_map_size_check() {
        let mut maps = WeightMaps::new();
        maps.insert(WeightMapTarget::MaxDistance, vec![1.0, 2.0]);
        assert!(maps.get_sized(WeightMapTarget::MaxDistance, 2).is_some());
        assert!(maps.get_sized(WeightMapTarget::MaxDistance, 3).is_none());
        assert!(maps.get(WeightMapTarget::BackstopRadius).is_none());
    }
}
