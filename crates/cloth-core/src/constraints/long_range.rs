use std::cmp::Ordering;
use std::collections::BinaryHeap;

use glam::Vec3;

use super::Stiffness;
use crate::config::TetherMode;
use crate::math::WeightedValue;

/// Most anchors a particle is tethered to in [`TetherMode::MultiplePoint`].
pub const MAX_TETHERS_PER_PARTICLE: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tether {
    pub anchor: u32,
    pub particle: u32,
    /// Geodesic rest distance along the mesh edges.
    pub rest_length: f32,
}

/// Keeps dynamic particles within a scaled geodesic distance of kinematic
/// anchors, which stops unbounded stretching away from pinned regions.
pub struct LongRangeConstraints {
    tethers: Vec<Tether>,
    /// Map weight per tether, taken at the tethered particle.
    weights: Option<Vec<f32>>,
    pub stiffness: Stiffness,
    pub scale: f32,
}

impl LongRangeConstraints {
    /// Build tethers from the one-ring adjacency.
    ///
    /// Anchors are kinematic points with at least one dynamic neighbour.
    /// Paths only run through dynamic points.
    pub fn new(
        neighbors: &[Vec<u32>],
        rest_positions: &[Vec3],
        inv_m: &[f32],
        weight_map: Option<&[f32]>,
        mode: TetherMode,
    ) -> Self {
        let is_dynamic = |i: usize| inv_m[i] > 0.0;
        let anchors: Vec<u32> = (0..neighbors.len())
            .filter(|&i| !is_dynamic(i) && neighbors[i].iter().any(|&n| is_dynamic(n as usize)))
            .map(|i| i as u32)
            .collect();

        let tethers: Vec<Tether> = match mode {
            TetherMode::FurthestPoint => {
                let (dist, source) = geodesic(neighbors, rest_positions, &is_dynamic, &anchors);
                (0..neighbors.len())
                    .filter(|&i| is_dynamic(i))
                    .filter_map(|i| {
                        source[i].map(|anchor| Tether {
                            anchor,
                            particle: i as u32,
                            rest_length: dist[i],
                        })
                    })
                    .collect()
            }
            TetherMode::MultiplePoint => {
                let mut closest: Vec<Vec<Tether>> = vec![Vec::new(); neighbors.len()];
                for &anchor in &anchors {
                    let (dist, _) = geodesic(neighbors, rest_positions, &is_dynamic, &[anchor]);
                    for (i, &d) in dist.iter().enumerate() {
                        if is_dynamic(i) && d.is_finite() {
                            closest[i].push(Tether {
                                anchor,
                                particle: i as u32,
                                rest_length: d,
                            });
                        }
                    }
                }
                closest
                    .into_iter()
                    .flat_map(|mut list| {
                        list.sort_by(|a, b| a.rest_length.total_cmp(&b.rest_length));
                        list.truncate(MAX_TETHERS_PER_PARTICLE);
                        list
                    })
                    .collect()
            }
        };

        let weights = weight_map.map(|m| {
            tethers
                .iter()
                .map(|t: &Tether| m[t.particle as usize])
                .collect()
        });
        Self {
            stiffness: Stiffness::new(weights.clone(), WeightedValue::default()),
            tethers,
            weights,
            scale: 1.0,
        }
    }

    pub fn len(&self) -> usize {
        self.tethers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tethers.is_empty()
    }

    pub fn tethers(&self) -> &[Tether] {
        &self.tethers
    }

    pub fn has_weight_map(&self) -> bool {
        self.weights.is_some()
    }

    pub fn set_properties(&mut self, stiffness: WeightedValue, scale: f32) {
        self.stiffness.set(stiffness);
        self.scale = scale;
    }

    pub fn apply(&self, p: &mut [Vec3], inv_m: &[f32]) {
        for (k, tether) in self.tethers.iter().enumerate() {
            let i = tether.particle as usize;
            if inv_m[i] <= 0.0 {
                continue;
            }
            let anchor = p[tether.anchor as usize];
            let diff = p[i] - anchor;
            let dist = diff.length();
            let limit = tether.rest_length * self.scale;
            if dist <= limit || dist < 1e-10 {
                continue;
            }
            p[i] -= diff * (self.stiffness.factor(k) * (dist - limit) / dist);
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
struct Visit {
    dist: f32,
    node: u32,
}

impl Eq for Visit {}

impl Ord for Visit {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on distance, ties broken by index for determinism.
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Visit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Multi-source Dijkstra over rest edge lengths.
///
/// Returns the distance to and identity of the nearest source per point.
fn geodesic(
    neighbors: &[Vec<u32>],
    rest_positions: &[Vec3],
    passable: &impl Fn(usize) -> bool,
    sources: &[u32],
) -> (Vec<f32>, Vec<Option<u32>>) {
    let n = neighbors.len();
    let mut dist = vec![f32::INFINITY; n];
    let mut source = vec![None; n];
    let mut heap = BinaryHeap::new();
    for &s in sources {
        dist[s as usize] = 0.0;
        source[s as usize] = Some(s);
        heap.push(Visit { dist: 0.0, node: s });
    }

    while let Some(Visit { dist: d, node }) = heap.pop() {
        let u = node as usize;
        if d > dist[u] {
            continue;
        }
        for &v in &neighbors[u] {
            let vi = v as usize;
            if !passable(vi) {
                continue;
            }
            let nd = d + rest_positions[u].distance(rest_positions[vi]);
            if nd < dist[vi] {
                dist[vi] = nd;
                source[vi] = source[u];
                heap.push(Visit { dist: nd, node: v });
            }
        }
    }
    (dist, source)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 0 - 1 - 2 - 3 in a line, unit spacing.
    fn chain() -> (Vec<Vec<u32>>, Vec<Vec3>) {
        let neighbors = vec![vec![1], vec![0, 2], vec![1, 3], vec![2]];
        let x = (0..4).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
        (neighbors, x)
    }

    #[test]
    fn test_furthest_point_uses_geodesic_distance() {
        let (neighbors, x) = chain();
        let inv_m = [0.0, 1.0, 1.0, 1.0];
        let lr = LongRangeConstraints::new(&neighbors, &x, &inv_m, None, TetherMode::FurthestPoint);
        assert_eq!(lr.len(), 3);
        assert_eq!(lr.tethers()[2].rest_length, 3.0);
        assert!(lr.tethers().iter().all(|t| t.anchor == 0));
    }

    #[test]
    fn test_multiple_point_tethers_to_both_ends() {
        let (neighbors, x) = chain();
        let inv_m = [0.0, 1.0, 1.0, 0.0];
        let lr = LongRangeConstraints::new(&neighbors, &x, &inv_m, None, TetherMode::MultiplePoint);
        // Particles 1 and 2 each reach both anchors.
        assert_eq!(lr.len(), 4);
        let first: Vec<_> = lr.tethers().iter().filter(|t| t.particle == 1).collect();
        assert_eq!(first[0].anchor, 0);
        assert_eq!(first[0].rest_length, 1.0);
    }

    #[test]
    fn test_tether_pulls_particle_back_inside_limit() {
        let (neighbors, x) = chain();
        let inv_m = [0.0, 1.0, 1.0, 1.0];
        let mut lr = LongRangeConstraints::new(&neighbors, &x, &inv_m, None, TetherMode::FurthestPoint);
        lr.stiffness.prepare(1);
        let mut p = x.clone();
        p[3] = Vec3::new(10.0, 0.0, 0.0);
        lr.apply(&mut p, &inv_m);
        assert!((p[3].x - 3.0).abs() < 1e-5);
        assert_eq!(p[0], Vec3::ZERO);
    }

    #[test]
    fn test_no_anchor_means_no_tethers() {
        let (neighbors, x) = chain();
        let lr = LongRangeConstraints::new(&neighbors, &x, &[1.0; 4], None, TetherMode::FurthestPoint);
        assert!(lr.is_empty());
    }
}
