use glam::Vec3;

use super::Stiffness;

/// Preserves the signed volume enclosed by a range's triangles, measured
/// from the particles' centroid.
pub struct VolumeConstraint {
    triangles: Vec<[u32; 3]>,
    rest_volume: f32,
    gradients: Vec<Vec3>,
    pub stiffness: Stiffness,
}

impl VolumeConstraint {
    pub fn new(triangles: &[[u32; 3]], rest_positions: &[Vec3]) -> Self {
        Self {
            triangles: triangles.to_vec(),
            rest_volume: signed_volume(triangles, rest_positions),
            gradients: vec![Vec3::ZERO; rest_positions.len()],
            stiffness: Stiffness::constant(0.0),
        }
    }

    pub fn rest_volume(&self) -> f32 {
        self.rest_volume
    }

    pub fn apply(&mut self, p: &mut [Vec3], inv_m: &[f32]) {
        if self.triangles.is_empty() || self.stiffness.is_zero() {
            return;
        }
        let origin = centroid(p);
        let mut volume = 0.0;
        self.gradients.fill(Vec3::ZERO);
        for tri in &self.triangles {
            let [ia, ib, ic] = tri.map(|i| i as usize);
            let (a, b, c) = (p[ia] - origin, p[ib] - origin, p[ic] - origin);
            volume += a.dot(b.cross(c)) / 6.0;
            self.gradients[ia] += b.cross(c) / 6.0;
            self.gradients[ib] += c.cross(a) / 6.0;
            self.gradients[ic] += a.cross(b) / 6.0;
        }

        let denom: f32 = self
            .gradients
            .iter()
            .zip(inv_m)
            .map(|(g, &w)| w * g.length_squared())
            .sum();
        if denom < 1e-10 {
            return;
        }
        let scale = -self.stiffness.factor(0) * (volume - self.rest_volume) / denom;
        for ((p, g), &w) in p.iter_mut().zip(&self.gradients).zip(inv_m) {
            *p += *g * (scale * w);
        }
    }
}

fn centroid(points: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return Vec3::ZERO;
    }
    points.iter().copied().sum::<Vec3>() / points.len() as f32
}

fn signed_volume(triangles: &[[u32; 3]], positions: &[Vec3]) -> f32 {
    let origin = centroid(positions);
    triangles
        .iter()
        .map(|t| {
            let [a, b, c] = t.map(|i| positions[i as usize] - origin);
            a.dot(b.cross(c)) / 6.0
        })
        .sum()
}
