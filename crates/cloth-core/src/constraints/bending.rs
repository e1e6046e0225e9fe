use glam::Vec3;

use super::Stiffness;

/// Dihedral bending element over two triangles sharing edge (i, j), with
/// opposite vertices k and l:
///
/// ```text
///     k
///    / \
///   i---j
///    \ /
///     l
/// ```
///
/// The signed angle between the two triangle normals is driven back to its
/// rest value. Gradients follow Bridson et al., "Simulation of Clothing with
/// Folds and Wrinkles", 2003.
pub struct BendingElements {
    /// `[i, j, k, l]` per element.
    elements: Vec<[u32; 4]>,
    rest_angles: Vec<f32>,
    pub stiffness: Stiffness,
}

impl BendingElements {
    pub fn new(elements: &[[u32; 4]], rest_positions: &[Vec3], weights: Option<Vec<f32>>) -> Self {
        let rest_angles = elements
            .iter()
            .map(|e| {
                let [p1, p2, p3, p4] = e.map(|i| rest_positions[i as usize]);
                dihedral_angle(p1, p2, p3, p4)
            })
            .collect();
        Self {
            elements: elements.to_vec(),
            rest_angles,
            stiffness: Stiffness::new(weights, Default::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn rest_angle(&self, e: usize) -> f32 {
        self.rest_angles[e]
    }

    pub fn apply(&self, p: &mut [Vec3], inv_m: &[f32]) {
        for (e, element) in self.elements.iter().enumerate() {
            let idx = element.map(|i| i as usize);
            let w = idx.map(|i| inv_m[i]);
            if w.iter().sum::<f32>() < 1e-10 {
                continue;
            }
            let [p1, p2, p3, p4] = idx.map(|i| p[i]);

            let angle_error = dihedral_angle(p1, p2, p3, p4) - self.rest_angles[e];
            if angle_error.abs() < 1e-6 {
                continue;
            }
            let Some(grads) = angle_gradients(p1, p2, p3, p4) else {
                continue;
            };

            let denom: f32 = (0..4).map(|n| w[n] * grads[n].length_squared()).sum();
            if denom < 1e-10 {
                continue;
            }
            let scale = -self.stiffness.factor(e) * angle_error / denom;
            for n in 0..4 {
                p[idx[n]] += grads[n] * (scale * w[n]);
            }
        }
    }
}

/// Signed dihedral angle across edge (p1, p2), with opposite vertices p3
/// (triangle 1) and p4 (triangle 2). A flat configuration returns 0.
/// Degenerate triangles return 0 to avoid NaN propagation.
pub fn dihedral_angle(p1: Vec3, p2: Vec3, p3: Vec3, p4: Vec3) -> f32 {
    let e = p2 - p1;
    let e_len = e.length();
    if e_len < 1e-8 {
        return 0.0;
    }
    let e_norm = e / e_len;

    let n1 = (p3 - p1).cross(p3 - p2);
    let n2 = (p4 - p2).cross(p4 - p1);
    let n1_len = n1.length();
    let n2_len = n2.length();
    if n1_len < 1e-8 || n2_len < 1e-8 {
        return 0.0;
    }
    let n1 = n1 / n1_len;
    let n2 = n2 / n2_len;

    let cos_angle = n1.dot(n2).clamp(-1.0, 1.0);
    let sin_angle = n1.cross(n2).dot(e_norm);
    sin_angle.atan2(cos_angle)
}

/// Gradient of [`dihedral_angle`] with respect to `[p1, p2, p3, p4]`.
fn angle_gradients(p1: Vec3, p2: Vec3, p3: Vec3, p4: Vec3) -> Option<[Vec3; 4]> {
    let e = p2 - p1;
    let e_len = e.length();
    let n1 = (p3 - p1).cross(p3 - p2);
    let n2 = (p4 - p2).cross(p4 - p1);
    let n1_sq = n1.length_squared();
    let n2_sq = n2.length_squared();
    if e_len < 1e-8 || n1_sq < 1e-16 || n2_sq < 1e-16 {
        return None;
    }
    let m1 = n1 / n1_sq;
    let m2 = n2 / n2_sq;
    let e_hat = e / e_len;

    let g3 = -e_len * m1;
    let g4 = -e_len * m2;
    let g1 = -((p3 - p2).dot(e_hat) * m1 + (p4 - p2).dot(e_hat) * m2);
    let g2 = (p3 - p1).dot(e_hat) * m1 + (p4 - p1).dot(e_hat) * m2;
    Some([g1, g2, g3, g4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dihedral_angle_flat() {
        let angle = dihedral_angle(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.5, 1.0, 0.0),
            Vec3::new(0.5, -1.0, 0.0),
        );
        assert!(angle.abs() < 1e-5, "flat configuration should be ~0, got {angle}");
    }

    #[test]
    fn test_gradients_sum_to_zero_and_match_finite_difference() {
        let pts = [
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.3),
            Vec3::new(0.0, -1.0, -0.2),
        ];
        let grads = angle_gradients(pts[0], pts[1], pts[2], pts[3]).unwrap();
        let sum: Vec3 = grads.iter().copied().sum();
        assert!(sum.length() < 1e-4);

        let h = 1e-3;
        for n in 0..4 {
            for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
                let mut plus = pts;
                let mut minus = pts;
                plus[n] += axis * h;
                minus[n] -= axis * h;
                let fd = (dihedral_angle(plus[0], plus[1], plus[2], plus[3])
                    - dihedral_angle(minus[0], minus[1], minus[2], minus[3]))
                    / (2.0 * h);
                assert!(
                    (fd - grads[n].dot(axis)).abs() < 1e-2,
                    "vertex {n} axis {axis}: fd={fd} analytic={}",
                    grads[n].dot(axis)
                );
            }
        }
    }

    #[test]
    fn test_bending_reduces_angle_error() {
        let rest = [
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
        ];
        let mut elements = BendingElements::new(&[[0, 1, 2, 3]], &rest, None);
        elements.stiffness.prepare(1);
        let mut p = rest.to_vec();
        p[2].z = 0.5;
        p[3].z = 0.5;
        let inv_m = [1.0; 4];

        let before = dihedral_angle(p[0], p[1], p[2], p[3]).abs();
        for _ in 0..10 {
            elements.apply(&mut p, &inv_m);
        }
        let after = dihedral_angle(p[0], p[1], p[2], p[3]).abs();
        assert!(after < before * 0.5, "before={before} after={after}");
    }
}
