//! Position based cloth simulation.
//!
//! A [`ClothSolver`] owns any number of [`Cloth`]s in one shared particle
//! buffer. Each cloth reads its rest shape and animation targets from a
//! [`MeshAdapter`], keeps one particle range per LOD and simulates only the
//! active one. Units are centimetres and seconds, z is up.
//!
//! With the `parallel` feature, cloths are updated and solved on the rayon
//! thread pool.

pub mod cloth;
pub mod collider;
pub mod collision;
pub mod command;
pub mod config;
pub mod constraints;
pub mod error;
pub mod evolution;
pub mod forces;
pub mod grid;
pub mod groups;
pub mod mass;
pub mod math;
pub mod mesh;
pub mod particle;
pub mod quality;
pub mod solver;

pub use cloth::Cloth;
pub use collider::{ClothCollider, ColliderId};
pub use collision::{CollisionShape, CollisionSource};
pub use command::{ClothCommand, SolverCommand};
pub use config::{ClothConfig, SolverConfig};
pub use error::{ClothError, ClothResult};
pub use math::{Bounds, RigidTransform};
pub use mesh::grid::GridMesh;
pub use mesh::{MeshAdapter, TriangleMesh, WeightMapTarget, WeightMaps};
pub use particle::{GroupId, ParticleRange};
pub use quality::StepStats;
pub use solver::{ClothId, ClothSolver, RenderVertex};
