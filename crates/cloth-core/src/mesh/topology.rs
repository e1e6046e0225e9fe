//! Adjacency queries derived from a [`TriangleMesh`].
//!
//! Everything here is built once per LOD when a cloth is added to a solver.
//! Output ordering is deterministic so constraint projection order is stable
//! between runs.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::TriangleMesh;

/// An edge shared by exactly two triangles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InteriorEdge {
    pub v0: u32,
    pub v1: u32,
    /// Vertex of the first triangle opposite the edge.
    pub wing_a: u32,
    /// Vertex of the second triangle opposite the edge.
    pub wing_b: u32,
}

impl InteriorEdge {
    /// `[v0, v1, wing_a, wing_b]`, the layout bending elements expect.
    pub fn as_element(&self) -> [u32; 4] {
        [self.v0, self.v1, self.wing_a, self.wing_b]
    }
}

#[derive(Clone, Debug, Default)]
pub struct Topology {
    /// Unique edges as sorted `[min, max]` pairs.
    pub edges: Vec<[u32; 2]>,
    pub interior_edges: Vec<InteriorEdge>,
    /// Sorted one-ring of every point.
    pub neighbors: Vec<Vec<u32>>,
}

impl Topology {
    pub fn build(mesh: &TriangleMesh) -> Self {
        let mut edge_map: BTreeMap<(u32, u32), Vec<usize>> = BTreeMap::new();
        for (t, &[a, b, c]) in mesh.elements().iter().enumerate() {
            for (v0, v1) in [(a, b), (b, c), (c, a)] {
                let key = if v0 < v1 { (v0, v1) } else { (v1, v0) };
                edge_map.entry(key).or_default().push(t);
            }
        }

        let mut neighbor_sets: Vec<BTreeSet<u32>> = vec![BTreeSet::new(); mesh.num_points()];
        let mut edges = Vec::with_capacity(edge_map.len());
        let mut interior_edges = Vec::new();
        for (&(v0, v1), tris) in &edge_map {
            edges.push([v0, v1]);
            neighbor_sets[v0 as usize].insert(v1);
            neighbor_sets[v1 as usize].insert(v0);
            if let [ta, tb] = tris[..] {
                interior_edges.push(InteriorEdge {
                    v0,
                    v1,
                    wing_a: wing_vertex(mesh.elements()[ta], v0, v1),
                    wing_b: wing_vertex(mesh.elements()[tb], v0, v1),
                });
            }
        }

        Self {
            edges,
            interior_edges,
            neighbors: neighbor_sets
                .into_iter()
                .map(|s| s.into_iter().collect())
                .collect(),
        }
    }

    /// Spring pairs between the wing vertices of each interior edge.
    pub fn bending_pairs(&self) -> Vec<[u32; 2]> {
        let set: BTreeSet<[u32; 2]> = self
            .interior_edges
            .iter()
            .filter(|e| e.wing_a != e.wing_b)
            .map(|e| sorted_pair(e.wing_a, e.wing_b))
            .collect();
        set.into_iter().collect()
    }

    /// Pairs two hops apart that are not already direct neighbours.
    pub fn second_neighbor_pairs(&self) -> Vec<[u32; 2]> {
        let mut set = BTreeSet::new();
        for (i, ring) in self.neighbors.iter().enumerate() {
            let i = i as u32;
            for &j in ring {
                for &k in &self.neighbors[j as usize] {
                    if k != i && ring.binary_search(&k).is_err() {
                        set.insert(sorted_pair(i, k));
                    }
                }
            }
        }
        set.into_iter().collect()
    }

    /// Every point within `depth` edge hops of `v`, including `v` itself.
    pub fn n_ring(&self, v: u32, depth: usize) -> HashSet<u32> {
        let mut visited = HashSet::from([v]);
        let mut frontier = vec![v];
        for _ in 0..depth {
            let mut next = Vec::new();
            for &u in &frontier {
                for &w in &self.neighbors[u as usize] {
                    if visited.insert(w) {
                        next.push(w);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        visited
    }
}

fn wing_vertex(tri: [u32; 3], v0: u32, v1: u32) -> u32 {
    tri.into_iter()
        .find(|&v| v != v0 && v != v1)
        .unwrap_or(tri[0])
}

#[inline]
fn sorted_pair(a: u32, b: u32) -> [u32; 2] {
    if a < b {
        [a, b]
    } else {
        [b, a]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 0---1
    /// | \ |
    /// 2---3
    fn quad() -> TriangleMesh {
        TriangleMesh::from_indices(&[0, 2, 3, 0, 3, 1], 4)
    }

    #[test]
    fn test_edges_are_unique_and_sorted() {
        let topo = Topology::build(&quad());
        assert_eq!(topo.edges, vec![[0, 1], [0, 2], [0, 3], [1, 3], [2, 3]]);
        assert_eq!(topo.neighbors[0], vec![1, 2, 3]);
    }

    #[test]
    fn test_diagonal_is_the_only_interior_edge() {
        let topo = Topology::build(&quad());
        assert_eq!(topo.interior_edges.len(), 1);
        let e = topo.interior_edges[0];
        assert_eq!((e.v0, e.v1), (0, 3));
        assert_eq!(topo.bending_pairs(), vec![[1, 2]]);
    }

    #[test]
    fn test_second_neighbors_exclude_direct_edges() {
        let topo = Topology::build(&quad());
        // 1 and 2 are the only pair without a shared edge.
        assert_eq!(topo.second_neighbor_pairs(), vec![[1, 2]]);
    }

    #[test]
    fn test_n_ring_depth() {
        let mesh = TriangleMesh::from_indices(&[0, 1, 2, 1, 3, 2, 2, 3, 4], 5);
        let topo = Topology::build(&mesh);
        assert_eq!(topo.n_ring(0, 0), HashSet::from([0]));
        assert_eq!(topo.n_ring(0, 1), HashSet::from([0, 1, 2]));
        assert_eq!(topo.n_ring(0, 2).len(), 5);
    }
}
