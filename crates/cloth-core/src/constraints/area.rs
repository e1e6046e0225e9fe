use glam::Vec3;

use super::Stiffness;

/// Keeps each triangle's area at its rest value.
pub struct AreaConstraints {
    triangles: Vec<[u32; 3]>,
    rest_areas: Vec<f32>,
    pub stiffness: Stiffness,
}

impl AreaConstraints {
    pub fn new(triangles: &[[u32; 3]], rest_positions: &[Vec3], weights: Option<Vec<f32>>) -> Self {
        let rest_areas = triangles
            .iter()
            .map(|t| {
                let [a, b, c] = t.map(|i| rest_positions[i as usize]);
                0.5 * (b - a).cross(c - a).length()
            })
            .collect();
        Self {
            triangles: triangles.to_vec(),
            rest_areas,
            stiffness: Stiffness::new(weights, Default::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn apply(&self, p: &mut [Vec3], inv_m: &[f32]) {
        for (t, tri) in self.triangles.iter().enumerate() {
            let idx = tri.map(|i| i as usize);
            let w = idx.map(|i| inv_m[i]);
            let [a, b, c] = idx.map(|i| p[i]);

            let n = (b - a).cross(c - a);
            let n_len = n.length();
            if n_len < 1e-10 {
                continue;
            }
            let n_hat = n / n_len;
            let c_val = 0.5 * n_len - self.rest_areas[t];

            let g_b = 0.5 * (c - a).cross(n_hat);
            let g_c = 0.5 * n_hat.cross(b - a);
            let g_a = -(g_b + g_c);
            let grads = [g_a, g_b, g_c];

            let denom: f32 = (0..3).map(|k| w[k] * grads[k].length_squared()).sum();
            if denom < 1e-10 {
                continue;
            }
            let scale = -self.stiffness.factor(t) * c_val / denom;
            for k in 0..3 {
                p[idx[k]] += grads[k] * (scale * w[k]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_restored_after_uniform_scale() {
        let rest = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let mut area = AreaConstraints::new(&[[0, 1, 2]], &rest, None);
        area.stiffness.prepare(1);
        let mut p: Vec<Vec3> = rest.iter().map(|&x| x * 1.5).collect();
        for _ in 0..20 {
            area.apply(&mut p, &[1.0; 3]);
        }
        let current = 0.5 * (p[1] - p[0]).cross(p[2] - p[0]).length();
        assert!((current - 0.5).abs() < 1e-3, "area {current}");
    }
}
