use glam::Vec3;

/// Half-space `normal · p <= distance`, normal pointing out of the convex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

/// Closed set of collider primitives, all in the collision particle's frame.
#[derive(Clone, Debug, PartialEq)]
pub enum CollisionShape {
    Sphere {
        radius: f32,
    },
    Capsule {
        a: Vec3,
        b: Vec3,
        radius: f32,
    },
    /// Two spheres of different radii joined by a cone.
    TaperedCapsule {
        a: Vec3,
        b: Vec3,
        radius_a: f32,
        radius_b: f32,
    },
    Convex {
        planes: Vec<Plane>,
        /// Surface samples kept for debug drawing and bounds.
        points: Vec<Vec3>,
    },
    Box {
        half_extents: Vec3,
    },
}

impl CollisionShape {
    pub const UNIT_SPHERE: CollisionShape = CollisionShape::Sphere { radius: 1.0 };

    /// Signed distance and outward normal at local point `q`.
    ///
    /// Negative distances are inside. Convex and box distances are exact
    /// outside faces and conservative near edges.
    pub fn phi(&self, q: Vec3) -> (f32, Vec3) {
        match self {
            CollisionShape::Sphere { radius } => {
                let len = q.length();
                (len - radius, direction_or_up(q, len))
            }
            CollisionShape::Capsule { a, b, radius } => {
                let c = closest_on_segment(q, *a, *b).0;
                let d = q - c;
                let len = d.length();
                (len - radius, direction_or_up(d, len))
            }
            CollisionShape::TaperedCapsule {
                a,
                b,
                radius_a,
                radius_b,
            } => {
                let (c, t) = closest_on_segment(q, *a, *b);
                let r = radius_a + (radius_b - radius_a) * t;
                let d = q - c;
                let len = d.length();
                (len - r, direction_or_up(d, len))
            }
            CollisionShape::Convex { planes, .. } if planes.is_empty() => (f32::MAX, Vec3::Z),
            CollisionShape::Convex { planes, .. } => {
                let mut best = (f32::MIN, Vec3::Z);
                for plane in planes {
                    let dist = plane.normal.dot(q) - plane.distance;
                    if dist > best.0 {
                        best = (dist, plane.normal);
                    }
                }
                best
            }
            CollisionShape::Box { half_extents } => {
                let d = q.abs() - *half_extents;
                let outside = d.max(Vec3::ZERO);
                let outside_len = outside.length();
                if outside_len > 0.0 {
                    let n = (outside * q.signum()) / outside_len;
                    (outside_len, n)
                } else {
                    // Inside: nearest face.
                    let axis = if d.x >= d.y && d.x >= d.z {
                        Vec3::X
                    } else if d.y >= d.z {
                        Vec3::Y
                    } else {
                        Vec3::Z
                    };
                    let n = axis * q.dot(axis).signum();
                    (d.max_element(), n)
                }
            }
        }
    }
}

#[inline]
fn direction_or_up(d: Vec3, len: f32) -> Vec3 {
    if len > 1e-10 {
        d / len
    } else {
        Vec3::Z
    }
}

/// Closest point on segment `ab` and its parameter in `[0, 1]`.
fn closest_on_segment(q: Vec3, a: Vec3, b: Vec3) -> (Vec3, f32) {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < 1e-12 {
        return (a, 0.0);
    }
    let t = ((q - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (a + ab * t, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_phi() {
        let (d, n) = CollisionShape::Sphere { radius: 2.0 }.phi(Vec3::new(3.0, 0.0, 0.0));
        assert!((d - 1.0).abs() < 1e-6);
        assert_eq!(n, Vec3::X);
    }

    #[test]
    fn test_capsule_phi_along_body() {
        let capsule = CollisionShape::Capsule {
            a: Vec3::ZERO,
            b: Vec3::new(10.0, 0.0, 0.0),
            radius: 1.0,
        };
        let (d, n) = capsule.phi(Vec3::new(5.0, 0.0, 0.5));
        assert!((d + 0.5).abs() < 1e-6);
        assert_eq!(n, Vec3::Z);
    }

    #[test]
    fn test_tapered_capsule_radius_interpolates() {
        let capsule = CollisionShape::TaperedCapsule {
            a: Vec3::ZERO,
            b: Vec3::new(10.0, 0.0, 0.0),
            radius_a: 1.0,
            radius_b: 3.0,
        };
        let (d, _) = capsule.phi(Vec3::new(5.0, 0.0, 2.0));
        assert!(d.abs() < 1e-5);
    }

    #[test]
    fn test_box_phi_inside_and_outside() {
        let b = CollisionShape::Box {
            half_extents: Vec3::new(1.0, 2.0, 3.0),
        };
        let (d, n) = b.phi(Vec3::new(0.0, 0.0, 5.0));
        assert!((d - 2.0).abs() < 1e-6);
        assert_eq!(n, Vec3::Z);
        let (d, n) = b.phi(Vec3::new(0.8, 0.0, 0.0));
        assert!((d + 0.2).abs() < 1e-6);
        assert_eq!(n, Vec3::X);
    }

    #[test]
    fn test_convex_phi_uses_most_separating_plane() {
        let planes = [Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z]
            .map(|normal| Plane {
                normal,
                distance: 1.0,
            })
            .to_vec();
        let convex = CollisionShape::Convex {
            planes,
            points: Vec::new(),
        };
        let (d, n) = convex.phi(Vec3::new(0.0, -4.0, 0.5));
        assert!((d - 3.0).abs() < 1e-6);
        assert_eq!(n, -Vec3::Y);
    }

    #[test]
    fn test_convex_without_planes_is_never_penetrated() {
        let convex = CollisionShape::Convex {
            planes: Vec::new(),
            points: Vec::new(),
        };
        let (d, _) = convex.phi(Vec3::ZERO);
        assert_eq!(d, f32::MAX);
    }
}
