use super::{SolverParticles, Stiffness};

/// Soft spring towards the animated target, with damping of the velocity
/// relative to the target's own motion.
pub struct AnimDriveConstraints {
    pub stiffness: Stiffness,
    pub damping: Stiffness,
    count: usize,
}

impl AnimDriveConstraints {
    /// Maps are per point; `None` means the property is constant.
    pub fn new(count: usize, stiffness_map: Option<&[f32]>, damping_map: Option<&[f32]>) -> Self {
        Self {
            stiffness: Stiffness::new(stiffness_map.map(<[f32]>::to_vec), Default::default()),
            damping: Stiffness::new(damping_map.map(<[f32]>::to_vec), Default::default()),
            count,
        }
    }

    pub fn apply(&self, particles: &mut SolverParticles<'_>) {
        if self.stiffness.is_zero() && self.damping.is_zero() {
            return;
        }
        for i in 0..self.count {
            if particles.inv_m[i] <= 0.0 {
                continue;
            }
            let target = particles.anim_x[i];
            let target_delta = target - particles.old_anim_x[i];
            let relative = (particles.p[i] - particles.x[i]) - target_delta;
            particles.p[i] -= relative * self.damping.factor(i);
            let p = particles.p[i];
            particles.p[i] = p + (target - p) * self.stiffness.factor(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WeightedValue;
    use glam::Vec3;

    #[test]
    fn test_full_stiffness_snaps_to_target() {
        let mut drive = AnimDriveConstraints::new(2, None, None);
        drive.stiffness.set(WeightedValue::constant(1.0));
        drive.damping.set(WeightedValue::constant(0.0));
        drive.stiffness.prepare(1);
        drive.damping.prepare(1);

        let mut p = vec![Vec3::new(5.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0)];
        let zeros = [Vec3::ZERO; 2];
        let target = [Vec3::ONE; 2];
        let mut particles = SolverParticles {
            p: &mut p,
            x: &zeros,
            inv_m: &[1.0, 0.0],
            anim_x: &target,
            anim_n: &zeros,
            old_anim_x: &target,
        };
        drive.apply(&mut particles);
        assert_eq!(particles.p[0], Vec3::ONE);
        // Kinematic points are left to the kinematic path.
        assert_eq!(particles.p[1].x, 5.0);
    }

    #[test]
    fn test_damping_removes_motion_relative_to_target() {
        let mut drive = AnimDriveConstraints::new(1, None, None);
        drive.stiffness.set(WeightedValue::constant(0.0));
        drive.damping.set(WeightedValue::constant(1.0));
        drive.stiffness.prepare(1);
        drive.damping.prepare(1);

        // Target moved +1 in x, particle moved +3.
        let mut p = vec![Vec3::new(3.0, 0.0, 0.0)];
        let mut particles = SolverParticles {
            p: &mut p,
            x: &[Vec3::ZERO],
            inv_m: &[1.0],
            anim_x: &[Vec3::X],
            anim_n: &[Vec3::Z],
            old_anim_x: &[Vec3::ZERO],
        };
        drive.apply(&mut particles);
        assert!((particles.p[0] - Vec3::X).length() < 1e-6);
    }
}
