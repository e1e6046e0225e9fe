//! Point-to-triangle mapping used to carry simulated state between LODs.

use glam::Vec3;

use super::TriangleMesh;

#[derive(Clone, Copy, Debug, PartialEq)]
struct MappingEntry {
    triangle: [u32; 3],
    /// Barycentric weights of the closest point on `triangle`.
    weights: Vec3,
    /// Signed distance along the triangle normal in the rest pose.
    normal_offset: f32,
}

/// Embeds every point of a target mesh in the closest triangle of a source
/// mesh, both taken in their rest pose.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshToMeshMapping {
    entries: Vec<MappingEntry>,
}

impl MeshToMeshMapping {
    /// Brute-force closest-triangle search, run once per LOD pair.
    pub fn build(source_positions: &[Vec3], source: &TriangleMesh, target_positions: &[Vec3]) -> Self {
        let entries = target_positions
            .iter()
            .map(|&q| closest_entry(source_positions, source, q))
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deform the target points from the current source state.
    ///
    /// Positions follow the embedding triangle plus the rest normal offset
    /// along the interpolated source normal. Velocities are interpolated.
    pub fn apply(
        &self,
        normals: &[Vec3],
        positions: &[Vec3],
        velocities: &[Vec3],
        out_positions: &mut [Vec3],
        out_velocities: &mut [Vec3],
    ) {
        for ((entry, out_x), out_v) in self
            .entries
            .iter()
            .zip(out_positions.iter_mut())
            .zip(out_velocities.iter_mut())
        {
            let [a, b, c] = entry.triangle.map(|i| i as usize);
            let w = entry.weights;
            let normal = (normals[a] * w.x + normals[b] * w.y + normals[c] * w.z).normalize_or_zero();
            *out_x = positions[a] * w.x + positions[b] * w.y + positions[c] * w.z
                + normal * entry.normal_offset;
            *out_v = velocities[a] * w.x + velocities[b] * w.y + velocities[c] * w.z;
        }
    }
}

fn closest_entry(positions: &[Vec3], mesh: &TriangleMesh, q: Vec3) -> MappingEntry {
    let mut best = MappingEntry {
        triangle: [0, 0, 0],
        weights: Vec3::X,
        normal_offset: 0.0,
    };
    let mut best_dist_sq = f32::MAX;
    for &tri in mesh.elements() {
        let [a, b, c] = tri.map(|i| positions[i as usize]);
        let weights = closest_point_barycentric(q, a, b, c);
        let closest = a * weights.x + b * weights.y + c * weights.z;
        let dist_sq = (q - closest).length_squared();
        if dist_sq < best_dist_sq {
            best_dist_sq = dist_sq;
            let normal = (b - a).cross(c - a).normalize_or_zero();
            best = MappingEntry {
                triangle: tri,
                weights,
                normal_offset: (q - closest).dot(normal),
            };
        }
    }
    best
}

/// Barycentric weights of the point on triangle `abc` closest to `p`.
fn closest_point_barycentric(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return Vec3::X;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return Vec3::Y;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return Vec3::new(1.0 - v, v, 0.0);
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return Vec3::Z;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return Vec3::new(1.0 - w, 0.0, w);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return Vec3::new(0.0, 1.0 - w, w);
    }

    let denom = va + vb + vc;
    if denom.abs() < f32::EPSILON {
        return Vec3::X;
    }
    let v = vb / denom;
    let w = vc / denom;
    Vec3::new(1.0 - v - w, v, w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_point_inside_and_outside() {
        let (a, b, c) = (Vec3::ZERO, Vec3::X, Vec3::Y);
        let w = closest_point_barycentric(Vec3::new(0.25, 0.25, 3.0), a, b, c);
        assert!((w - Vec3::new(0.5, 0.25, 0.25)).length() < 1e-6);
        assert_eq!(closest_point_barycentric(Vec3::new(-1.0, -1.0, 0.0), a, b, c), Vec3::X);
        assert_eq!(closest_point_barycentric(Vec3::new(2.0, -0.5, 0.0), a, b, c), Vec3::Y);
    }

    #[test]
    fn test_mapping_follows_translated_source() {
        let source_x = [Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, 10.0, 0.0)];
        let mesh = TriangleMesh::from_indices(&[0, 1, 2], 3);
        let target_x = [Vec3::new(2.0, 2.0, 1.0), Vec3::new(5.0, 0.0, 0.0)];
        let mapping = MeshToMeshMapping::build(&source_x, &mesh, &target_x);
        assert_eq!(mapping.len(), 2);

        let shift = Vec3::new(0.0, 0.0, -50.0);
        let moved: Vec<Vec3> = source_x.iter().map(|&p| p + shift).collect();
        let normals = [Vec3::Z; 3];
        let velocities = [Vec3::new(0.0, 0.0, -3.0); 3];
        let mut out_x = [Vec3::ZERO; 2];
        let mut out_v = [Vec3::ZERO; 2];
        mapping.apply(&normals, &moved, &velocities, &mut out_x, &mut out_v);

        for (out, rest) in out_x.iter().zip(&target_x) {
            assert!((*out - (*rest + shift)).length() < 1e-4);
        }
        assert!((out_v[0] - velocities[0]).length() < 1e-6);
    }
}
