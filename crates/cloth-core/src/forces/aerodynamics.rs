use glam::Vec3;

use crate::config::{AerodynamicsProperties, WindModel};
use crate::mesh::TriangleMesh;

/// Wind and air resistance over one particle range.
///
/// Holds the range's triangles; the wind velocity and coefficients come from
/// the group every substep.
#[derive(Clone, Debug, Default)]
pub struct VelocityField {
    triangles: Vec<[u32; 3]>,
    forces: Vec<Vec3>,
}

impl VelocityField {
    pub fn new(mesh: &TriangleMesh) -> Self {
        Self {
            triangles: mesh.elements().to_vec(),
            forces: vec![Vec3::ZERO; mesh.num_points()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Add one substep of wind to the velocities of dynamic particles.
    ///
    /// # Arguments
    ///
    /// * `wind` - Air velocity in solver space, cm/s.
    /// * `normals` - Particle normals, read by [`WindModel::Legacy`] only.
    pub fn apply(
        &mut self,
        model: WindModel,
        properties: &AerodynamicsProperties,
        wind: Vec3,
        x: &[Vec3],
        v: &mut [Vec3],
        normals: &[Vec3],
        inv_m: &[f32],
        dt: f32,
    ) {
        match model {
            WindModel::Legacy => apply_legacy(properties.wind_adaption, wind, v, normals, inv_m, dt),
            WindModel::Aerodynamic => self.apply_aerodynamic(properties, wind, x, v, inv_m, dt),
        }
    }

    fn apply_aerodynamic(
        &mut self,
        properties: &AerodynamicsProperties,
        wind: Vec3,
        x: &[Vec3],
        v: &mut [Vec3],
        inv_m: &[f32],
        dt: f32,
    ) {
        if properties.drag <= 0.0 && properties.lift <= 0.0 {
            return;
        }
        self.forces.resize(x.len(), Vec3::ZERO);
        self.forces.fill(Vec3::ZERO);

        for &[a, b, c] in &self.triangles {
            let (a, b, c) = (a as usize, b as usize, c as usize);
            let cross = (x[b] - x[a]).cross(x[c] - x[a]);
            let double_area = cross.length();
            if double_area < 1e-10 {
                continue;
            }
            let normal = cross / double_area;
            let area = 0.5 * double_area;

            let relative = wind - (v[a] + v[b] + v[c]) / 3.0;
            let speed_sq = relative.length_squared();
            if speed_sq < 1e-10 {
                continue;
            }
            let speed = speed_sq.sqrt();
            let direction = relative / speed;
            let cos = normal.dot(direction);
            let pressure = 0.5 * properties.air_density * speed_sq * area;

            // Drag acts along the relative wind, lift across it towards the
            // side the surface faces.
            let mut force = direction * (pressure * properties.drag * cos.abs());
            let across = normal - direction * cos;
            let across_len = across.length();
            if across_len > 1e-6 {
                let sin = (1.0 - cos * cos).max(0.0).sqrt();
                force -= across / across_len * (pressure * properties.lift * cos * sin);
            }

            let share = force / 3.0;
            self.forces[a] += share;
            self.forces[b] += share;
            self.forces[c] += share;
        }

        for ((v, &f), &w) in v.iter_mut().zip(&self.forces).zip(inv_m) {
            if w > 0.0 {
                *v += f * (w * dt);
            }
        }
    }
}

/// Pull each particle's normal velocity towards the wind's.
fn apply_legacy(adaption: f32, wind: Vec3, v: &mut [Vec3], normals: &[Vec3], inv_m: &[f32], dt: f32) {
    if adaption <= 0.0 {
        return;
    }
    let factor = (adaption * dt).min(1.0);
    for ((v, &n), &w) in v.iter_mut().zip(normals).zip(inv_m) {
        if w > 0.0 {
            *v += n * (n.dot(wind - *v) * factor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> (TriangleMesh, Vec<Vec3>) {
        let mesh = TriangleMesh::from_indices(&[0, 1, 2, 2, 1, 3], 4);
        let x = vec![
            Vec3::ZERO,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::new(10.0, 10.0, 0.0),
        ];
        (mesh, x)
    }

    #[test]
    fn test_head_on_wind_pushes_cloth_downwind() {
        let (mesh, x) = square();
        let mut field = VelocityField::new(&mesh);
        let mut v = vec![Vec3::ZERO; 4];
        let props = AerodynamicsProperties {
            drag: 1.0,
            lift: 1.0,
            air_density: 1.0e-3,
            wind_adaption: 0.0,
        };
        field.apply(
            WindModel::Aerodynamic,
            &props,
            Vec3::new(0.0, 0.0, -100.0),
            &x,
            &mut v,
            &[Vec3::Z; 4],
            &[1.0; 4],
            0.01,
        );
        for vel in &v {
            assert!(vel.z < 0.0);
            assert!(vel.x.abs() < 1e-4 && vel.y.abs() < 1e-4, "head-on wind has no lift: {vel:?}");
        }
    }

    #[test]
    fn test_edge_on_wind_has_no_effect() {
        let (mesh, x) = square();
        let mut field = VelocityField::new(&mesh);
        let mut v = vec![Vec3::ZERO; 4];
        field.apply(
            WindModel::Aerodynamic,
            &AerodynamicsProperties::default(),
            Vec3::new(500.0, 0.0, 0.0),
            &x,
            &mut v,
            &[Vec3::Z; 4],
            &[1.0; 4],
            0.01,
        );
        assert!(v.iter().all(|vel| vel.length() < 1e-6));
    }

    #[test]
    fn test_legacy_wind_only_touches_normal_component() {
        let mut v = vec![Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO];
        let props = AerodynamicsProperties {
            wind_adaption: 1000.0,
            ..Default::default()
        };
        let mut field = VelocityField::default();
        field.apply(
            WindModel::Legacy,
            &props,
            Vec3::new(0.0, 0.0, 50.0),
            &[Vec3::ZERO; 2],
            &mut v,
            &[Vec3::Z; 2],
            &[1.0, 0.0],
            0.01,
        );
        assert_eq!(v[0], Vec3::new(3.0, 0.0, 50.0));
        assert_eq!(v[1], Vec3::ZERO);
    }
}
