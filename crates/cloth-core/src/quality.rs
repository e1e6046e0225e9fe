use crate::config::{IterationMode, SolverConfig};

/// Chooses the constraint iteration count for a frame.
///
/// In time dependent mode the count scales with `target_frequency * dt` so a
/// slow frame gets more iterations and the stiffness response stays the same
/// across frame rates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationPolicy {
    pub mode: IterationMode,
    pub iterations: u32,
    pub max_iterations: u32,
}

impl IterationPolicy {
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            mode: config.iteration_mode,
            iterations: config.iterations,
            max_iterations: config.max_iterations,
        }
    }

    /// Iterations to run per substep for a frame of `dt` seconds.
    pub fn iterations_for(&self, dt: f32) -> u32 {
        let max = self.max_iterations.max(1);
        match self.mode {
            IterationMode::Fixed => self.iterations.clamp(1, max),
            IterationMode::TimeDependent { target_frequency } => {
                let scaled = (self.iterations as f32 * target_frequency * dt).round();
                if scaled.is_finite() {
                    (scaled as u32).clamp(1, max)
                } else {
                    1
                }
            }
        }
    }
}

/// Counters from the last solver update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    pub substeps: u32,
    /// Constraint iterations per substep.
    pub iterations: u32,
    /// Particles in active ranges.
    pub particle_count: u32,
    /// Self-collision contacts found over all substeps.
    pub self_contact_count: u32,
    /// Collider contacts found over all substeps.
    pub contact_count: u32,
}

impl StepStats {
    /// Sum the per-range counters of `other` into `self`.
    pub fn merge(mut self, other: StepStats) -> StepStats {
        self.particle_count += other.particle_count;
        self.self_contact_count += other.self_contact_count;
        self.contact_count += other.contact_count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(mode: IterationMode, iterations: u32, max_iterations: u32) -> IterationPolicy {
        IterationPolicy {
            mode,
            iterations,
            max_iterations,
        }
    }

    #[test]
    fn test_fixed_ignores_dt() {
        let p = policy(IterationMode::Fixed, 4, 10);
        assert_eq!(p.iterations_for(0.001), 4);
        assert_eq!(p.iterations_for(1.0), 4);
    }

    #[test]
    fn test_time_dependent_scales_with_dt() {
        let p = policy(IterationMode::TimeDependent { target_frequency: 60.0 }, 2, 10);
        assert_eq!(p.iterations_for(1.0 / 60.0), 2);
        assert_eq!(p.iterations_for(1.0 / 30.0), 4);
    }

    #[test]
    fn test_time_dependent_clamps() {
        let p = policy(IterationMode::TimeDependent { target_frequency: 60.0 }, 2, 5);
        assert_eq!(p.iterations_for(0.0001), 1);
        assert_eq!(p.iterations_for(10.0), 5);
    }

    #[test]
    fn test_merge_sums_counters() {
        let a = StepStats {
            substeps: 2,
            iterations: 3,
            particle_count: 10,
            self_contact_count: 1,
            contact_count: 4,
        };
        let merged = a.merge(StepStats {
            particle_count: 5,
            contact_count: 1,
            ..Default::default()
        });
        assert_eq!(merged.particle_count, 15);
        assert_eq!(merged.contact_count, 5);
        assert_eq!(merged.substeps, 2);
    }
}
