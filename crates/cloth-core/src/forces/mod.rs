//! External forces applied to velocities before prediction.

pub mod aerodynamics;
pub mod damping;

pub use aerodynamics::VelocityField;
pub use damping::{apply_damping, apply_local_damping};
