use std::collections::HashSet;

use glam::Vec3;

use crate::grid::SpatialHashGrid;
use crate::mesh::topology::Topology;

/// Ring depth of the topological neighbourhood excluded from self collision.
pub const SELF_COLLISION_RING_DEPTH: usize = 5;

/// Ordered point pairs that never collide with each other.
#[derive(Clone, Debug, Default)]
pub struct ExclusionSet {
    pairs: HashSet<(u32, u32)>,
}

impl ExclusionSet {
    /// Mark `(v, n)` and `(n, v)` for every `n` within `depth` rings of `v`.
    pub fn build(topology: &Topology, depth: usize) -> Self {
        let mut pairs = HashSet::new();
        for v in 0..topology.neighbors.len() as u32 {
            for n in topology.n_ring(v, depth) {
                if n != v {
                    pairs.insert((v, n));
                    pairs.insert((n, v));
                }
            }
        }
        Self { pairs }
    }

    #[inline]
    pub fn contains(&self, a: u32, b: u32) -> bool {
        self.pairs.contains(&(a, b))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u32, u32)> {
        self.pairs.iter()
    }
}

#[derive(Clone, Copy, Debug)]
struct SelfContact {
    i: u32,
    j: u32,
}

/// Point-point repulsion between topologically distant points of the
/// same range. Contacts are found once per substep and resolved with
/// Jacobi averaging each iteration.
pub struct SelfCollisionConstraints {
    exclusions: ExclusionSet,
    grid: SpatialHashGrid,
    contacts: Vec<SelfContact>,
    corrections: Vec<Vec3>,
    correction_counts: Vec<u32>,
    pub thickness: f32,
    pub stiffness: f32,
}

impl SelfCollisionConstraints {
    pub fn new(topology: &Topology, thickness: f32, stiffness: f32) -> Self {
        let count = topology.neighbors.len();
        Self {
            exclusions: ExclusionSet::build(topology, SELF_COLLISION_RING_DEPTH),
            grid: SpatialHashGrid::new(2.0 * thickness),
            contacts: Vec::new(),
            corrections: vec![Vec3::ZERO; count],
            correction_counts: vec![0; count],
            thickness,
            stiffness,
        }
    }

    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    pub fn num_contacts(&self) -> usize {
        self.contacts.len()
    }

    /// Find pairs closer than twice the thickness. Returns the contact count.
    pub fn detect(&mut self, positions: &[Vec3]) -> usize {
        self.contacts.clear();
        if self.thickness <= 0.0 || self.stiffness <= 0.0 {
            return 0;
        }
        let min_dist = 2.0 * self.thickness;
        self.grid.set_cell_size(min_dist);
        self.grid.build(positions);

        let mut seen = HashSet::new();
        for (i, &pi) in positions.iter().enumerate() {
            let i = i as u32;
            seen.clear();
            self.grid.query_neighbors(pi, |j| {
                if j <= i || !seen.insert(j) || self.exclusions.contains(i, j) {
                    return;
                }
                if positions[j as usize].distance_squared(pi) < min_dist * min_dist {
                    self.contacts.push(SelfContact { i, j });
                }
            });
        }
        self.contacts.len()
    }

    pub fn apply(&mut self, p: &mut [Vec3], inv_m: &[f32]) {
        if self.contacts.is_empty() {
            return;
        }
        let min_dist = 2.0 * self.thickness;
        self.corrections.fill(Vec3::ZERO);
        self.correction_counts.fill(0);

        for contact in &self.contacts {
            let (i, j) = (contact.i as usize, contact.j as usize);
            let w_i = inv_m[i];
            let w_j = inv_m[j];
            let w_sum = w_i + w_j;
            if w_sum < 1e-10 {
                continue;
            }
            let diff = p[j] - p[i];
            let dist = diff.length();
            if dist >= min_dist || dist < 1e-8 {
                continue;
            }
            let normal = diff / dist;
            let correction = normal * (self.stiffness * (min_dist - dist) / w_sum);
            self.corrections[i] -= correction * w_i;
            self.corrections[j] += correction * w_j;
            self.correction_counts[i] += 1;
            self.correction_counts[j] += 1;
        }

        for ((p, c), &n) in p
            .iter_mut()
            .zip(&self.corrections)
            .zip(&self.correction_counts)
        {
            if n > 0 {
                *p += *c / n as f32;
            }
        }
    }
}
