use glam::Vec3;

use crate::config::{AerodynamicsProperties, DEFAULT_GRAVITY};
use crate::math::RigidTransform;

/// Properties shared by every particle and collision particle of one group.
///
/// A cloth owns exactly one group and is the only writer of its properties
/// during the per-cloth update phase.
#[derive(Clone, Copy, Debug)]
pub struct GroupProperties {
    pub gravity: Vec3,
    pub damping: f32,
    pub local_damping: f32,
    pub collision_thickness: f32,
    pub friction: f32,
    pub use_ccd: bool,
    pub wind_velocity: Vec3,
    pub aerodynamics: AerodynamicsProperties,
    /// Reference-frame correction applied to positions and velocities before
    /// the step, see [`Evolution::apply_pre_simulation_transforms`](crate::evolution::Evolution::apply_pre_simulation_transforms).
    pub pre_simulation_transform: RigidTransform,
}

impl Default for GroupProperties {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
            damping: 0.0,
            local_damping: 0.0,
            collision_thickness: 0.0,
            friction: 0.0,
            use_ccd: false,
            wind_velocity: Vec3::ZERO,
            aerodynamics: AerodynamicsProperties {
                drag: 0.0,
                lift: 0.0,
                ..Default::default()
            },
            pre_simulation_transform: RigidTransform::IDENTITY,
        }
    }
}
