use glam::Vec3;

use crate::config::BackstopModel;

/// Keeps each point outside a sphere placed behind its animated position,
/// along the animated normal. The spheres together approximate an inner
/// surface the cloth must not pass through.
pub struct BackstopConstraints {
    distances: Vec<f32>,
    radii: Vec<f32>,
    model: BackstopModel,
    pub scale: f32,
}

impl BackstopConstraints {
    pub fn new(distances: &[f32], radii: &[f32], model: BackstopModel) -> Self {
        Self {
            distances: distances.to_vec(),
            radii: radii.to_vec(),
            model,
            scale: 1.0,
        }
    }

    #[inline]
    fn sphere(&self, i: usize, anim_x: Vec3, anim_n: Vec3) -> (Vec3, f32) {
        let distance = self.distances[i] * self.scale;
        let radius = self.radii[i] * self.scale;
        let depth = match self.model {
            BackstopModel::Legacy => distance,
            BackstopModel::Modern => distance + radius,
        };
        (anim_x - anim_n * depth, radius)
    }

    pub fn apply(&self, p: &mut [Vec3], inv_m: &[f32], anim_x: &[Vec3], anim_n: &[Vec3]) {
        for i in 0..self.radii.len() {
            if inv_m[i] <= 0.0 || self.radii[i] <= 0.0 {
                continue;
            }
            let (center, radius) = self.sphere(i, anim_x[i], anim_n[i]);
            let diff = p[i] - center;
            let dist = diff.length();
            if dist >= radius {
                continue;
            }
            let dir = if dist > 1e-10 { diff / dist } else { anim_n[i] };
            p[i] = center + dir * radius;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modern_pushes_out_of_sphere_behind_surface() {
        let bs = BackstopConstraints::new(&[1.0], &[10.0], BackstopModel::Modern);
        // Sphere centre at z = -11, radius 10: surface at z = -1.
        let mut p = [Vec3::new(0.0, 0.0, -3.0)];
        bs.apply(&mut p, &[1.0], &[Vec3::ZERO], &[Vec3::Z]);
        assert!((p[0].z + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_legacy_distance_includes_radius() {
        let bs = BackstopConstraints::new(&[11.0], &[10.0], BackstopModel::Legacy);
        let mut p = [Vec3::new(0.0, 0.0, -3.0)];
        bs.apply(&mut p, &[1.0], &[Vec3::ZERO], &[Vec3::Z]);
        assert!((p[0].z + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_point_outside_untouched() {
        let bs = BackstopConstraints::new(&[0.0], &[5.0], BackstopModel::Modern);
        let mut p = [Vec3::new(0.0, 0.0, 1.0)];
        bs.apply(&mut p, &[1.0], &[Vec3::ZERO], &[Vec3::Z]);
        assert_eq!(p[0].z, 1.0);
    }
}
