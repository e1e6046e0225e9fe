use glam::{Mat3, Vec3};

/// Remove `damping` of every dynamic particle's velocity.
pub fn apply_damping(v: &mut [Vec3], inv_m: &[f32], damping: f32) {
    if damping <= 0.0 {
        return;
    }
    let keep = 1.0 - damping.min(1.0);
    for (v, &w) in v.iter_mut().zip(inv_m) {
        if w > 0.0 {
            *v *= keep;
        }
    }
}

/// Damp velocities towards the rigid motion of the range.
///
/// The linear and angular momentum of the dynamic particles are preserved;
/// only the deformation part `v - (v_com + ω × r)` is scaled down.
pub fn apply_local_damping(x: &[Vec3], v: &mut [Vec3], inv_m: &[f32], damping: f32) {
    if damping <= 0.0 {
        return;
    }

    let mut total_mass = 0.0;
    let mut com = Vec3::ZERO;
    let mut com_velocity = Vec3::ZERO;
    for ((&x, &v), &w) in x.iter().zip(v.iter()).zip(inv_m) {
        if w > 0.0 {
            let m = 1.0 / w;
            total_mass += m;
            com += x * m;
            com_velocity += v * m;
        }
    }
    if total_mass <= 0.0 {
        return;
    }
    com /= total_mass;
    com_velocity /= total_mass;

    let mut angular_momentum = Vec3::ZERO;
    let mut inertia = Mat3::ZERO;
    for ((&x, &v), &w) in x.iter().zip(v.iter()).zip(inv_m) {
        if w > 0.0 {
            let m = 1.0 / w;
            let r = x - com;
            angular_momentum += r.cross(v) * m;
            let rr = r.length_squared();
            inertia += (Mat3::from_diagonal(Vec3::splat(rr))
                - Mat3::from_cols(r * r.x, r * r.y, r * r.z))
                * m;
        }
    }

    // Colinear or single-particle ranges have a singular inertia tensor.
    let omega = if inertia.determinant().abs() > 1e-6 {
        inertia.inverse() * angular_momentum
    } else {
        Vec3::ZERO
    };

    let factor = damping.min(1.0);
    for ((&x, v), &w) in x.iter().zip(v.iter_mut()).zip(inv_m) {
        if w > 0.0 {
            let rigid = com_velocity + omega.cross(x - com);
            *v -= (*v - rigid) * factor;
        }
    }
}
