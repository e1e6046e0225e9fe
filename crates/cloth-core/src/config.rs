use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{ClothError, ClothResult};
use crate::math::WeightedValue;

/// Standard gravity in cm/s², z-up.
pub const DEFAULT_GRAVITY: Vec3 = Vec3::new(0.0, 0.0, -980.665);

/// How many constraint iterations each substep runs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum IterationMode {
    /// Always `SolverConfig::iterations`.
    Fixed,
    /// `iterations * target_frequency * dt`, clamped to `[1, max_iterations]`.
    TimeDependent { target_frequency: f32 },
}

/// Wind strategy, selected once per solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindModel {
    /// Per-particle acceleration along the normal, scaled by the wind adaption.
    Legacy,
    /// Per-triangle drag and lift from the relative air velocity.
    Aerodynamic,
}

/// Backstop sphere placement, selected once per solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackstopModel {
    /// The distance map already includes the sphere radius.
    Legacy,
    /// The sphere sits `distance + radius` behind the animated surface.
    Modern,
}

/// Solver-wide settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub substeps: u32,
    pub iteration_mode: IterationMode,
    pub iterations: u32,
    pub max_iterations: u32,
    pub gravity: Vec3,
    /// Lets cloths with `use_gravity_override` replace the solver gravity.
    pub enable_gravity_override: bool,
    pub wind_velocity: Vec3,
    pub wind_model: WindModel,
    pub backstop_model: BackstopModel,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            substeps: 1,
            iteration_mode: IterationMode::TimeDependent {
                target_frequency: 60.0,
            },
            iterations: 1,
            max_iterations: 10,
            gravity: DEFAULT_GRAVITY,
            enable_gravity_override: true,
            wind_velocity: Vec3::ZERO,
            wind_model: WindModel::Aerodynamic,
            backstop_model: BackstopModel::Modern,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> ClothResult<()> {
        if self.substeps == 0 {
            return Err(ClothError::InvalidConfig("substeps must be at least 1".into()));
        }
        if self.iterations == 0 || self.max_iterations == 0 {
            return Err(ClothError::InvalidConfig(
                "iterations and max_iterations must be at least 1".into(),
            ));
        }
        if let IterationMode::TimeDependent { target_frequency } = self.iteration_mode {
            if !(target_frequency > 0.0) {
                return Err(ClothError::InvalidConfig(format!(
                    "target_frequency must be positive, got {target_frequency}"
                )));
            }
        }
        if !self.gravity.is_finite() || !self.wind_velocity.is_finite() {
            return Err(ClothError::InvalidConfig("gravity and wind must be finite".into()));
        }
        Ok(())
    }
}

/// Stretch, bend, area and volume response.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialProperties {
    pub edge_stiffness: WeightedValue,
    pub bending_stiffness: WeightedValue,
    pub area_stiffness: WeightedValue,
    pub volume_stiffness: f32,
    /// Compliance-based edges, independent of substep count.
    pub use_xpbd_edges: bool,
    /// Dihedral bending elements instead of springs across adjacent triangles.
    pub use_bending_elements: bool,
    /// Second-neighbour springs instead of an enclosed volume constraint.
    pub use_thin_shell_volume: bool,
    pub shape_target_stiffness: f32,
}

impl Default for MaterialProperties {
    fn default() -> Self {
        Self {
            edge_stiffness: WeightedValue::constant(1.0),
            bending_stiffness: WeightedValue::constant(1.0),
            area_stiffness: WeightedValue::constant(1.0),
            volume_stiffness: 0.0,
            use_xpbd_edges: false,
            use_bending_elements: false,
            use_thin_shell_volume: false,
            shape_target_stiffness: 0.0,
        }
    }
}

/// Long range attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TetherMode {
    /// One tether per particle, to the anchor with the shortest geodesic path.
    FurthestPoint,
    /// Up to four tethers per particle, to the closest anchors.
    MultiplePoint,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherProperties {
    pub stiffness: WeightedValue,
    /// Multiplier on the rest geodesic distance.
    pub scale: f32,
    pub mode: TetherMode,
    pub enabled: bool,
}

impl Default for TetherProperties {
    fn default() -> Self {
        Self {
            stiffness: WeightedValue::constant(1.0),
            scale: 1.0,
            mode: TetherMode::FurthestPoint,
            enabled: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionProperties {
    pub thickness: f32,
    pub friction: f32,
    pub use_ccd: bool,
    pub use_self_collisions: bool,
    pub self_collision_thickness: f32,
    pub self_collision_stiffness: f32,
}

impl Default for CollisionProperties {
    fn default() -> Self {
        Self {
            thickness: 1.0,
            friction: 0.8,
            use_ccd: false,
            use_self_collisions: false,
            self_collision_thickness: 2.0,
            self_collision_stiffness: 0.5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DampingProperties {
    /// Fraction of velocity removed per substep.
    pub damping: f32,
    /// Fraction of non-rigid velocity removed per substep.
    pub local_damping: f32,
}

impl Default for DampingProperties {
    fn default() -> Self {
        Self {
            damping: 0.01,
            local_damping: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AerodynamicsProperties {
    pub drag: f32,
    pub lift: f32,
    /// kg/cm³.
    pub air_density: f32,
    /// Used by [`WindModel::Legacy`] only.
    pub wind_adaption: f32,
}

impl Default for AerodynamicsProperties {
    fn default() -> Self {
        Self {
            drag: 0.035,
            lift: 0.035,
            air_density: 1.225e-6,
            wind_adaption: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GravityProperties {
    pub scale: f32,
    pub use_override: bool,
    pub override_gravity: Vec3,
}

impl Default for GravityProperties {
    fn default() -> Self {
        Self {
            scale: 1.0,
            use_override: false,
            override_gravity: DEFAULT_GRAVITY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimDriveProperties {
    pub stiffness: WeightedValue,
    pub damping: WeightedValue,
}

impl Default for AnimDriveProperties {
    fn default() -> Self {
        Self {
            stiffness: WeightedValue::constant(0.0),
            damping: WeightedValue::constant(0.0),
        }
    }
}

/// How much of the reference bone motion turns into cloth velocity.
///
/// `1.0` lets the cloth lag fully behind the moving frame, `0.0` carries the
/// cloth rigidly with it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityScaleProperties {
    pub linear: Vec3,
    pub angular: f32,
}

impl Default for VelocityScaleProperties {
    fn default() -> Self {
        Self {
            linear: Vec3::splat(0.75),
            angular: 0.75,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum MassMode {
    /// Split the value evenly over the vertices used by the topology.
    Uniform(f32),
    /// Total mass in kg, distributed by incident triangle area.
    TotalMass(f32),
    /// kg/m², distributed by incident triangle area.
    Density(f32),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MassProperties {
    pub mode: MassMode,
    pub min_per_particle_mass: f32,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mode: MassMode::Density(0.35),
            min_per_particle_mass: 1.0e-4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxDistanceProperties {
    pub scale: f32,
    pub backstop_scale: f32,
}

impl Default for MaxDistanceProperties {
    fn default() -> Self {
        Self {
            scale: 1.0,
            backstop_scale: 1.0,
        }
    }
}

/// Per-cloth animatable properties.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClothConfig {
    pub material: MaterialProperties,
    pub tether: TetherProperties,
    pub collision: CollisionProperties,
    pub damping: DampingProperties,
    pub aerodynamics: AerodynamicsProperties,
    pub gravity: GravityProperties,
    pub anim_drive: AnimDriveProperties,
    pub velocity_scale: VelocityScaleProperties,
    pub mass: MassProperties,
    pub max_distance: MaxDistanceProperties,
    /// Forces a LOD instead of the mesh's recommendation.
    pub lod_override: Option<usize>,
}

impl ClothConfig {
    pub fn validate(&self) -> ClothResult<()> {
        let mass_value = match self.mass.mode {
            MassMode::Uniform(v) | MassMode::TotalMass(v) | MassMode::Density(v) => v,
        };
        if !(mass_value > 0.0) {
            return Err(ClothError::InvalidConfig(format!(
                "mass value must be positive, got {mass_value}"
            )));
        }
        if self.mass.min_per_particle_mass <= 0.0 {
            return Err(ClothError::InvalidConfig(
                "min_per_particle_mass must be positive".into(),
            ));
        }
        if self.collision.thickness < 0.0 || self.collision.self_collision_thickness < 0.0 {
            return Err(ClothError::InvalidConfig("thickness must not be negative".into()));
        }
        if !(0.0..=1.0).contains(&self.damping.damping)
            || !(0.0..=1.0).contains(&self.damping.local_damping)
        {
            return Err(ClothError::InvalidConfig("damping must be in [0, 1]".into()));
        }
        if self.tether.scale <= 0.0 {
            return Err(ClothError::InvalidConfig("tether scale must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SolverConfig::default().validate().is_ok());
        assert!(ClothConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_substeps_rejected() {
        let config = SolverConfig {
            substeps: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClothError::InvalidConfig(_))));
    }

    #[test]
    fn test_non_positive_mass_rejected() {
        let mut config = ClothConfig::default();
        config.mass.mode = MassMode::TotalMass(0.0);
        assert!(config.validate().is_err());
    }
}
