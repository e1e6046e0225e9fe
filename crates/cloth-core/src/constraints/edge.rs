use glam::Vec3;

use super::{Stiffness, XPBD_MAX_STIFFNESS};

/// Distance springs between point pairs.
///
/// Used for mesh edges, cross-edge bending springs and thin-shell volume
/// springs. In XPBD mode the `[0, 1]` stiffness maps to a compliance, so the
/// response no longer depends on the substep or iteration count.
///
/// Reference: "XPBD: Position-Based Simulation of Compliant Constrained Dynamics",
/// Macklin et al., 2016
pub struct SpringConstraints {
    pairs: Vec<[u32; 2]>,
    rest_lengths: Vec<f32>,
    lambdas: Vec<f32>,
    xpbd: bool,
    pub stiffness: Stiffness,
}

impl SpringConstraints {
    /// `weights` holds one map weight per pair, see
    /// [`element_weights`](super::element_weights).
    pub fn new(pairs: &[[u32; 2]], rest_positions: &[Vec3], weights: Option<Vec<f32>>, xpbd: bool) -> Self {
        let rest_lengths = pairs
            .iter()
            .map(|&[a, b]| rest_positions[a as usize].distance(rest_positions[b as usize]))
            .collect();
        Self {
            pairs: pairs.to_vec(),
            rest_lengths,
            lambdas: vec![0.0; pairs.len()],
            xpbd,
            stiffness: Stiffness::new(weights, Default::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn is_xpbd(&self) -> bool {
        self.xpbd
    }

    pub fn pairs(&self) -> &[[u32; 2]] {
        &self.pairs
    }

    pub fn rest_length(&self, i: usize) -> f32 {
        self.rest_lengths[i]
    }

    pub(crate) fn begin_substep(&mut self, iterations: u32) {
        self.lambdas.fill(0.0);
        self.stiffness.prepare(iterations);
    }

    /// Gauss-Seidel projection of every spring.
    pub fn apply(&mut self, p: &mut [Vec3], inv_m: &[f32], dt: f32) {
        let dt_sq = dt * dt;
        for (k, &[a, b]) in self.pairs.iter().enumerate() {
            let (a, b) = (a as usize, b as usize);
            let w_a = inv_m[a];
            let w_b = inv_m[b];
            let w_sum = w_a + w_b;
            if w_sum < 1e-10 {
                continue;
            }

            let diff = p[a] - p[b];
            let dist = diff.length();
            if dist < 1e-10 {
                continue;
            }
            let c = dist - self.rest_lengths[k];
            let n = diff / dist;

            let delta_lambda = if self.xpbd {
                let s = self.stiffness.value(k);
                if s <= 0.0 {
                    continue;
                }
                let alpha_tilde = 1.0 / (s * XPBD_MAX_STIFFNESS * dt_sq);
                let delta = -(c + alpha_tilde * self.lambdas[k]) / (w_sum + alpha_tilde);
                self.lambdas[k] += delta;
                delta
            } else {
                -self.stiffness.factor(k) * c / w_sum
            };

            let correction = n * delta_lambda;
            p[a] += correction * w_a;
            p[b] -= correction * w_b;
        }
    }
}
