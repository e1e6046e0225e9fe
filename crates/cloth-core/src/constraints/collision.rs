use glam::Vec3;

use crate::collision::{ColliderPose, CollisionShape};
use crate::math::RigidTransform;

/// Samples along a particle's path for the swept test.
const CCD_SAMPLES: usize = 8;

/// A collider pose for one substep.
#[derive(Clone, Copy, Debug)]
pub struct SubstepCollider<'a> {
    pub shape: &'a CollisionShape,
    pub start: RigidTransform,
    pub end: RigidTransform,
}

impl<'a> SubstepCollider<'a> {
    /// Interpolate a frame pose to the substep `[alpha_start, alpha_end]`.
    pub fn from_pose(pose: &ColliderPose<'a>, alpha_start: f32, alpha_end: f32) -> Self {
        Self {
            shape: pose.shape,
            start: pose.old.lerp(&pose.current, alpha_start),
            end: pose.old.lerp(&pose.current, alpha_end),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Contact {
    particle: u32,
    normal: Vec3,
    depth: f32,
    /// Displacement of the collider surface at the contact over the substep.
    collider_motion: Vec3,
}

/// Pushes particles out of collider geometry and applies friction against
/// the collider's own motion.
#[derive(Default)]
pub struct CollisionConstraints {
    contacts: Vec<Contact>,
}

impl CollisionConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_contacts(&self) -> usize {
        self.contacts.len()
    }

    pub fn begin_substep(&mut self) {
        self.contacts.clear();
    }

    pub fn apply(
        &mut self,
        p: &mut [Vec3],
        x: &[Vec3],
        inv_m: &[f32],
        colliders: &[SubstepCollider<'_>],
        thickness: f32,
        use_ccd: bool,
    ) {
        for i in 0..p.len() {
            if inv_m[i] <= 0.0 {
                continue;
            }
            for collider in colliders {
                if use_ccd {
                    if let Some(hit) = swept_hit(collider, x[i], p[i], thickness) {
                        p[i] = hit;
                    }
                }
                let q = collider.end.inverse_transform_point(p[i]);
                let (phi, n) = collider.shape.phi(q);
                if phi >= thickness {
                    continue;
                }
                let depth = thickness - phi;
                let normal = collider.end.transform_vector(n);
                p[i] += normal * depth;
                self.contacts.push(Contact {
                    particle: i as u32,
                    normal,
                    depth,
                    collider_motion: collider.end.transform_point(q) - collider.start.transform_point(q),
                });
            }
        }
    }

    /// Coulomb-like friction: tangential slip relative to the collider is
    /// removed up to `friction * depth`.
    pub fn apply_friction(&self, p: &mut [Vec3], x: &[Vec3], friction: f32) {
        if friction <= 0.0 {
            return;
        }
        for contact in &self.contacts {
            let i = contact.particle as usize;
            let relative = (p[i] - x[i]) - contact.collider_motion;
            let tangential = relative - contact.normal * contact.normal.dot(relative);
            let slip = tangential.length();
            if slip < 1e-8 {
                continue;
            }
            let max_correction = friction * contact.depth;
            if slip <= max_correction {
                p[i] -= tangential;
            } else {
                p[i] -= tangential * (max_correction / slip);
            }
        }
    }
}

/// First sample of the path `from -> to`, in the collider's moving frame,
/// that lies within `thickness`, pushed back to the surface.
fn swept_hit(collider: &SubstepCollider<'_>, from: Vec3, to: Vec3, thickness: f32) -> Option<Vec3> {
    let a = collider.start.inverse_transform_point(from);
    let b = collider.end.inverse_transform_point(to);
    if collider.shape.phi(a).0 < thickness {
        return None;
    }
    (1..=CCD_SAMPLES).find_map(|k| {
        let q = a.lerp(b, k as f32 / CCD_SAMPLES as f32);
        let (phi, n) = collider.shape.phi(q);
        (phi < thickness).then(|| collider.end.transform_point(q + n * (thickness - phi)))
    })
}
