use glam::Vec3;

/// Map values below this make a point fully kinematic instead of giving it a
/// max distance constraint.
pub const KINEMATIC_DISTANCE_THRESHOLD: f32 = 0.1;

/// Caps each point's distance from its animated target.
pub struct MaxDistanceConstraints {
    distances: Vec<f32>,
    pub scale: f32,
}

impl MaxDistanceConstraints {
    pub fn new(distances: &[f32]) -> Self {
        Self {
            distances: distances.to_vec(),
            scale: 1.0,
        }
    }

    pub fn apply(&self, p: &mut [Vec3], inv_m: &[f32], anim_x: &[Vec3]) {
        for (i, &d) in self.distances.iter().enumerate() {
            if inv_m[i] <= 0.0 {
                continue;
            }
            let radius = d * self.scale;
            let diff = p[i] - anim_x[i];
            let dist = diff.length();
            if dist > radius {
                p[i] = if dist > 1e-10 {
                    anim_x[i] + diff * (radius / dist)
                } else {
                    anim_x[i]
                };
            }
        }
    }
}
