use glam::Vec3;

use crate::mesh::TriangleMesh;
use crate::particle::{ParticleRange, ParticleStore};

/// Density maps are authored in kg/m², positions are in cm.
const CM2_TO_M2: f32 = 1.0e-4;

impl ParticleStore {
    /// Split `mass` evenly over the vertices referenced by `mesh`.
    ///
    /// Points not used by any triangle receive `min_mass`.
    pub fn set_particle_mass_uniform(
        &mut self,
        range: ParticleRange,
        mass: f32,
        min_mass: f32,
        mesh: &TriangleMesh,
        kinematic_predicate: impl Fn(usize) -> bool,
    ) {
        let used = used_vertices(mesh, range.count());
        let num_used = used.iter().filter(|&&u| u).count().max(1);
        let per_particle = mass / num_used as f32;
        self.assign_masses(range, min_mass, kinematic_predicate, |i| {
            if used[i] {
                per_particle
            } else {
                0.0
            }
        });
    }

    /// Distribute `total_mass` over the points in proportion to one third of
    /// their incident triangle area.
    pub fn set_particle_mass_from_total_mass(
        &mut self,
        range: ParticleRange,
        total_mass: f32,
        min_mass: f32,
        mesh: &TriangleMesh,
        kinematic_predicate: impl Fn(usize) -> bool,
    ) {
        let areas = point_areas(mesh, &self.x[range.indices()]);
        let total_area: f32 = areas.iter().sum();
        let density = if total_area > f32::EPSILON {
            total_mass / total_area
        } else {
            0.0
        };
        self.assign_masses(range, min_mass, kinematic_predicate, |i| areas[i] * density);
    }

    /// Point mass = one third of the incident area × `density` (kg/m²).
    pub fn set_particle_mass_from_density(
        &mut self,
        range: ParticleRange,
        density: f32,
        min_mass: f32,
        mesh: &TriangleMesh,
        kinematic_predicate: impl Fn(usize) -> bool,
    ) {
        let areas = point_areas(mesh, &self.x[range.indices()]);
        self.assign_masses(range, min_mass, kinematic_predicate, |i| {
            areas[i] * density * CM2_TO_M2
        });
    }

    fn assign_masses(
        &mut self,
        range: ParticleRange,
        min_mass: f32,
        kinematic_predicate: impl Fn(usize) -> bool,
        mass_of: impl Fn(usize) -> f32,
    ) {
        let r = range.indices();
        let m = &mut self.m[r.clone()];
        let inv_m = &mut self.inv_m[r];
        let mut num_kinematic = 0usize;
        for (i, (m, inv_m)) in m.iter_mut().zip(inv_m.iter_mut()).enumerate() {
            *m = mass_of(i).max(min_mass);
            if kinematic_predicate(i) {
                *inv_m = 0.0;
                num_kinematic += 1;
            } else {
                *inv_m = 1.0 / *m;
            }
        }
        tracing::trace!(
            offset = range.offset(),
            count = range.count(),
            num_kinematic,
            "assigned particle masses"
        );
    }
}

fn used_vertices(mesh: &TriangleMesh, count: usize) -> Vec<bool> {
    let mut used = vec![false; count];
    for tri in mesh.elements() {
        for &i in tri {
            used[i as usize] = true;
        }
    }
    used
}

/// One third of the incident triangle area per point.
fn point_areas(mesh: &TriangleMesh, positions: &[Vec3]) -> Vec<f32> {
    let mut areas = vec![0.0f32; positions.len()];
    for (t, tri) in mesh.elements().iter().enumerate() {
        let third = mesh.triangle_area(positions, t) / 3.0;
        for &i in tri {
            areas[i as usize] += third;
        }
    }
    areas
}
