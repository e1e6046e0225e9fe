//! Deferred property changes.
//!
//! Commands may be sent from any thread through the solver's
//! [`Sender`](std::sync::mpsc::Sender). They are applied in FIFO order at the
//! start of the next [`ClothSolver::update`](crate::solver::ClothSolver::update),
//! so the simulation never sees a property change mid-step.

use glam::Vec3;

use crate::cloth::{changes_topology, Cloth};
use crate::collider::ColliderId;
use crate::collision::CollisionSource;
use crate::config::{
    AerodynamicsProperties, AnimDriveProperties, CollisionProperties, DampingProperties, GravityProperties,
    MassProperties, MaterialProperties, MaxDistanceProperties, TetherProperties, VelocityScaleProperties,
};
use crate::solver::ClothId;

/// A change to one cloth.
#[derive(Clone, Debug, PartialEq)]
pub enum ClothCommand {
    SetMaterial(MaterialProperties),
    SetTether(TetherProperties),
    SetCollision(CollisionProperties),
    SetDamping(DampingProperties),
    SetAerodynamics(AerodynamicsProperties),
    SetGravity(GravityProperties),
    SetAnimDrive(AnimDriveProperties),
    SetVelocityScale(VelocityScaleProperties),
    SetMaxDistance(MaxDistanceProperties),
    SetMass(MassProperties),
    SetLodOverride(Option<usize>),
    /// Replace the dynamic shapes of an attached collider.
    SetDynamicCollider {
        collider: ColliderId,
        source: CollisionSource,
    },
    Reset,
    Teleport,
}

/// A change to the solver or one of its cloths.
#[derive(Clone, Debug, PartialEq)]
pub enum SolverCommand {
    Cloth { cloth: ClothId, command: ClothCommand },
    SetGravity(Vec3),
    SetWindVelocity(Vec3),
    SetLocalSpaceLocation { location: Vec3, reset: bool },
}

impl ClothCommand {
    /// Apply to `cloth`. Returns true when the change needs the solver to
    /// rebuild the cloth's particles and constraints.
    pub(crate) fn apply(self, cloth: &mut Cloth) -> bool {
        let before = cloth.config().clone();
        let config = cloth.config_mut();
        match self {
            ClothCommand::SetMaterial(material) => config.material = material,
            ClothCommand::SetTether(tether) => config.tether = tether,
            ClothCommand::SetCollision(collision) => config.collision = collision,
            ClothCommand::SetDamping(damping) => config.damping = damping,
            ClothCommand::SetAerodynamics(aerodynamics) => config.aerodynamics = aerodynamics,
            ClothCommand::SetGravity(gravity) => config.gravity = gravity,
            ClothCommand::SetAnimDrive(anim_drive) => config.anim_drive = anim_drive,
            ClothCommand::SetVelocityScale(velocity_scale) => config.velocity_scale = velocity_scale,
            ClothCommand::SetMaxDistance(max_distance) => config.max_distance = max_distance,
            ClothCommand::SetMass(mass) => config.mass = mass,
            ClothCommand::SetLodOverride(lod) => config.lod_override = lod,
            ClothCommand::SetDynamicCollider { collider, source } => {
                match cloth.collider_mut(collider) {
                    Some(target) => target.set_dynamic_source(&source),
                    None => tracing::debug!(?collider, "dynamic source for unknown collider dropped"),
                }
                return false;
            }
            ClothCommand::Reset => {
                cloth.reset();
                return false;
            }
            ClothCommand::Teleport => {
                cloth.teleport();
                return false;
            }
        }
        changes_topology(&before, cloth.config())
    }
}
