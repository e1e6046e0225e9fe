use glam::Vec3;

use super::Stiffness;

/// Drives each edge vector `P_i - P_j` towards the animated `A_i - A_j`,
/// so the cloth keeps the animated shape without being pinned to its
/// absolute position.
pub struct ShapeTargetConstraints {
    pairs: Vec<[u32; 2]>,
    pub stiffness: Stiffness,
}

impl ShapeTargetConstraints {
    pub fn new(pairs: &[[u32; 2]]) -> Self {
        Self {
            pairs: pairs.to_vec(),
            stiffness: Stiffness::constant(0.0),
        }
    }

    pub fn apply(&self, p: &mut [Vec3], inv_m: &[f32], anim_x: &[Vec3]) {
        if self.stiffness.is_zero() {
            return;
        }
        let factor = self.stiffness.factor(0);
        for &[a, b] in &self.pairs {
            let (a, b) = (a as usize, b as usize);
            let w_sum = inv_m[a] + inv_m[b];
            if w_sum < 1e-10 {
                continue;
            }
            let error = (p[a] - p[b]) - (anim_x[a] - anim_x[b]);
            let correction = error * (factor / w_sum);
            p[a] -= correction * inv_m[a];
            p[b] += correction * inv_m[b];
        }
    }
}
