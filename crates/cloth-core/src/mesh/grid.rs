//! Procedural multi-LOD rectangular cloth.
//!
//! Rest poses lie in the XY plane at z = 0 and hang from the top row
//! (y = 0) towards -y. The whole grid is skinned rigidly to a single
//! reference bone, which is all the demo front end and the tests need.

use std::any::Any;

use glam::Vec3;

use super::wrap::MeshToMeshMapping;
use super::{MeshAdapter, TriangleMesh, WeightMapTarget, WeightMaps};
use crate::error::{ClothError, ClothResult};
use crate::math::RigidTransform;

struct GridLod {
    columns: usize,
    indices: Vec<u32>,
    rest: Vec<Vec3>,
    weight_maps: WeightMaps,
    /// Source is the next finer LOD.
    from_finer: Option<MeshToMeshMapping>,
    /// Source is the next coarser LOD.
    from_coarser: Option<MeshToMeshMapping>,
}

impl GridLod {
    fn rows(&self) -> usize {
        self.rest.len() / self.columns
    }
}

pub struct GridMesh {
    lods: Vec<GridLod>,
    lod_index: Option<usize>,
    component_transform: RigidTransform,
    reference_bone: RigidTransform,
}

impl GridMesh {
    /// `cells` lists `(columns, rows)` per LOD, finest first.
    pub fn new(width: f32, height: f32, cells: &[(usize, usize)]) -> Self {
        let mut lods: Vec<GridLod> = cells
            .iter()
            .map(|&(cols, rows)| build_lod(width, height, cols.max(1), rows.max(1)))
            .collect();

        for k in 1..lods.len() {
            let finer = &lods[k - 1];
            let coarser = &lods[k];
            let finer_mesh = TriangleMesh::from_indices(&finer.indices, finer.rest.len());
            let coarser_mesh = TriangleMesh::from_indices(&coarser.indices, coarser.rest.len());
            let down = MeshToMeshMapping::build(&finer.rest, &finer_mesh, &coarser.rest);
            let up = MeshToMeshMapping::build(&coarser.rest, &coarser_mesh, &finer.rest);
            lods[k].from_finer = Some(down);
            lods[k - 1].from_coarser = Some(up);
        }

        Self {
            lods,
            lod_index: if cells.is_empty() { None } else { Some(0) },
            component_transform: RigidTransform::IDENTITY,
            reference_bone: RigidTransform::IDENTITY,
        }
    }

    /// Make the top row kinematic and let every other point travel up to
    /// `free_distance` from its animated position.
    pub fn pin_top_row(mut self, free_distance: f32) -> Self {
        for lod in &mut self.lods {
            let columns = lod.columns;
            let map = (0..lod.rest.len())
                .map(|i| if i < columns { 0.0 } else { free_distance })
                .collect();
            lod.weight_maps.insert(WeightMapTarget::MaxDistance, map);
        }
        self
    }

    /// Attach an arbitrary weight map to one LOD.
    pub fn with_weight_map(mut self, lod: usize, target: WeightMapTarget, values: Vec<f32>) -> Self {
        if let Some(data) = self.lods.get_mut(lod) {
            data.weight_maps.insert(target, values);
        }
        self
    }

    /// Drop the LOD-to-LOD mappings, forcing every LOD switch to reset.
    pub fn without_lod_mappings(mut self) -> Self {
        for lod in &mut self.lods {
            lod.from_finer = None;
            lod.from_coarser = None;
        }
        self
    }

    pub fn set_lod_index(&mut self, lod: Option<usize>) {
        self.lod_index = lod.filter(|&l| l < self.lods.len());
    }

    pub fn set_component_transform(&mut self, transform: RigidTransform) {
        self.component_transform = transform;
    }

    pub fn set_reference_bone_transform(&mut self, transform: RigidTransform) {
        self.reference_bone = transform;
    }

    pub fn columns(&self, lod: usize) -> usize {
        self.lods[lod].columns
    }

    pub fn rows(&self, lod: usize) -> usize {
        self.lods[lod].rows()
    }
}

fn build_lod(width: f32, height: f32, cols: usize, rows: usize) -> GridLod {
    let columns = cols + 1;
    let mut rest = Vec::with_capacity(columns * (rows + 1));
    for j in 0..=rows {
        for i in 0..=cols {
            rest.push(Vec3::new(
                width * i as f32 / cols as f32,
                -height * j as f32 / rows as f32,
                0.0,
            ));
        }
    }

    let mut indices = Vec::with_capacity(cols * rows * 6);
    for j in 0..rows {
        for i in 0..cols {
            let top_left = (j * columns + i) as u32;
            let top_right = top_left + 1;
            let bottom_left = top_left + columns as u32;
            let bottom_right = bottom_left + 1;
            indices.extend_from_slice(&[top_left, bottom_left, top_right]);
            indices.extend_from_slice(&[top_right, bottom_left, bottom_right]);
        }
    }

    GridLod {
        columns,
        indices,
        rest,
        weight_maps: WeightMaps::new(),
        from_finer: None,
        from_coarser: None,
    }
}

impl MeshAdapter for GridMesh {
    fn num_lods(&self) -> usize {
        self.lods.len()
    }

    fn lod_index(&self) -> Option<usize> {
        self.lod_index
    }

    fn num_points(&self, lod: usize) -> usize {
        self.lods[lod].rest.len()
    }

    fn indices(&self, lod: usize) -> &[u32] {
        &self.lods[lod].indices
    }

    fn rest_positions(&self, lod: usize) -> &[Vec3] {
        &self.lods[lod].rest
    }

    fn weight_maps(&self, lod: usize) -> &WeightMaps {
        &self.lods[lod].weight_maps
    }

    fn reference_bone_index(&self) -> Option<usize> {
        Some(0)
    }

    fn reference_bone_transform(&self) -> RigidTransform {
        self.reference_bone
    }

    fn component_transform(&self) -> RigidTransform {
        self.component_transform
    }

    fn num_bones(&self) -> usize {
        1
    }

    fn bone_transform(&self, bone: usize) -> Option<RigidTransform> {
        (bone == 0).then_some(self.reference_bone)
    }

    fn update(&self, _prev_lod: Option<usize>, lod: usize, positions: &mut [Vec3], normals: &mut [Vec3]) {
        let bone = self.reference_bone;
        for (out, &rest) in positions.iter_mut().zip(&self.lods[lod].rest) {
            *out = bone.transform_point(rest);
        }
        normals.fill(bone.rotation * Vec3::Z);
    }

    fn wrap_deform_lod(
        &self,
        prev_lod: usize,
        lod: usize,
        normals: &[Vec3],
        positions: &[Vec3],
        velocities: &[Vec3],
        out_positions: &mut [Vec3],
        out_velocities: &mut [Vec3],
    ) -> ClothResult<()> {
        let target = self
            .lods
            .get(lod)
            .ok_or(ClothError::MissingLodMapping { from: prev_lod, to: lod })?;
        let mapping = if prev_lod + 1 == lod {
            target.from_finer.as_ref()
        } else if lod + 1 == prev_lod {
            target.from_coarser.as_ref()
        } else {
            return Err(ClothError::NonAdjacentLods { from: prev_lod, to: lod });
        };
        let mapping = mapping.ok_or(ClothError::MissingLodMapping { from: prev_lod, to: lod })?;
        mapping.apply(normals, positions, velocities, out_positions, out_velocities);
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_counts_and_winding() {
        let grid = GridMesh::new(20.0, 20.0, &[(2, 2), (1, 1)]);
        assert_eq!(grid.num_lods(), 2);
        assert_eq!(grid.num_points(0), 9);
        assert_eq!(grid.indices(0).len(), 8 * 3);
        assert_eq!(grid.rows(0), 3);

        let mesh = TriangleMesh::from_indices(grid.indices(0), 9);
        let mut normals = vec![Vec3::ZERO; 9];
        mesh.compute_point_normals(grid.rest_positions(0), &mut normals);
        assert!(normals.iter().all(|n| (*n - Vec3::Z).length() < 1e-5));
    }

    #[test]
    fn test_pin_top_row_map() {
        let grid = GridMesh::new(10.0, 10.0, &[(2, 1)]).pin_top_row(50.0);
        let map = grid.weight_maps(0).get(WeightMapTarget::MaxDistance).unwrap();
        assert_eq!(map, &[0.0, 0.0, 0.0, 50.0, 50.0, 50.0]);
    }

    #[test]
    fn test_wrap_rejects_non_adjacent_lods() {
        let grid = GridMesh::new(10.0, 10.0, &[(4, 4), (2, 2), (1, 1)]);
        let mut out = vec![Vec3::ZERO; 4];
        let mut out_v = vec![Vec3::ZERO; 4];
        let src = vec![Vec3::ZERO; 25];
        let err = grid
            .wrap_deform_lod(0, 2, &src, &src, &src, &mut out, &mut out_v)
            .unwrap_err();
        assert_eq!(err, ClothError::NonAdjacentLods { from: 0, to: 2 });
    }

    #[test]
    fn test_wrap_between_adjacent_lods_preserves_rest_shape() {
        let grid = GridMesh::new(10.0, 10.0, &[(2, 2), (1, 1)]);
        let normals = vec![Vec3::Z; 9];
        let velocities = vec![Vec3::ZERO; 9];
        let mut out = vec![Vec3::ZERO; 4];
        let mut out_v = vec![Vec3::ONE; 4];
        grid.wrap_deform_lod(0, 1, &normals, grid.rest_positions(0), &velocities, &mut out, &mut out_v)
            .unwrap();
        for (a, b) in out.iter().zip(grid.rest_positions(1)) {
            assert!((*a - *b).length() < 1e-4);
        }
        assert!(out_v.iter().all(|v| *v == Vec3::ZERO));
    }

    #[test]
    fn test_update_follows_reference_bone() {
        let mut grid = GridMesh::new(10.0, 10.0, &[(1, 1)]);
        grid.set_reference_bone_transform(RigidTransform::from_translation(Vec3::new(0.0, 0.0, 5.0)));
        let mut x = vec![Vec3::ZERO; 4];
        let mut n = vec![Vec3::ZERO; 4];
        grid.update(None, 0, &mut x, &mut n);
        assert_eq!(x[3], Vec3::new(10.0, -10.0, 5.0));
        assert_eq!(n[0], Vec3::Z);
    }
}
