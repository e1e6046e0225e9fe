use glam::{Quat, Vec3};

use super::shape::{CollisionShape, Plane};
use crate::math::RigidTransform;

/// Radii closer than this build a plain capsule.
const TAPER_TOLERANCE: f32 = 1.0e-4;

#[derive(Clone, Debug, PartialEq)]
pub struct SphereSource {
    /// Index into the source's bone list, remapped through the collider's bone map.
    pub bone: Option<usize>,
    pub center: Vec3,
    pub radius: f32,
}

/// Two spheres of [`CollisionSource::spheres`] joined into a capsule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SphereConnection {
    pub spheres: [usize; 2],
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConvexSource {
    pub bone: Option<usize>,
    pub planes: Vec<Plane>,
    pub surface_points: Vec<Vec3>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoxSource {
    pub bone: Option<usize>,
    pub center: Vec3,
    pub rotation: Quat,
    pub half_extents: Vec3,
}

/// Flat list of primitive descriptors fed from an asset or a runtime system.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollisionSource {
    pub spheres: Vec<SphereSource>,
    pub sphere_connections: Vec<SphereConnection>,
    pub convexes: Vec<ConvexSource>,
    pub boxes: Vec<BoxSource>,
}

/// One extracted collider, ready to become a collision particle.
#[derive(Clone, Debug, PartialEq)]
pub struct ColliderGeometry {
    pub shape: CollisionShape,
    /// Bone of the mesh adapter, `None` for bone-less geometry.
    pub bone: Option<usize>,
    /// Offset from the bone.
    pub base: RigidTransform,
}

impl CollisionSource {
    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty() && self.convexes.is_empty() && self.boxes.is_empty()
    }

    /// Build the geometry list in a fixed order: lone spheres, capsules,
    /// convexes, boxes.
    ///
    /// Source bone indices are looked up in `bone_map`; indices outside it
    /// leave the geometry bone-less.
    ///
    /// # Panics
    ///
    /// When a sphere connection joins spheres on two different bones, or
    /// names a sphere that does not exist.
    pub fn extract(&self, bone_map: &[usize]) -> Vec<ColliderGeometry> {
        let map_bone = |bone: Option<usize>| bone.and_then(|b| bone_map.get(b).copied());
        let mut geometries = Vec::new();

        let mut connected = vec![false; self.spheres.len()];
        for connection in &self.sphere_connections {
            for &s in &connection.spheres {
                assert!(
                    s < self.spheres.len(),
                    "sphere connection names sphere {s} but only {} exist",
                    self.spheres.len()
                );
                connected[s] = true;
            }
        }

        for (sphere, &is_connected) in self.spheres.iter().zip(&connected) {
            if is_connected {
                continue;
            }
            geometries.push(ColliderGeometry {
                shape: CollisionShape::Sphere {
                    radius: sphere.radius,
                },
                bone: map_bone(sphere.bone),
                base: RigidTransform::from_translation(sphere.center),
            });
        }

        for connection in &self.sphere_connections {
            let s0 = &self.spheres[connection.spheres[0]];
            let s1 = &self.spheres[connection.spheres[1]];
            let bone = map_bone(s0.bone);
            assert_eq!(
                bone,
                map_bone(s1.bone),
                "capsule end spheres {:?} are attached to different bones",
                connection.spheres
            );
            let shape = if (s0.radius - s1.radius).abs() < TAPER_TOLERANCE {
                CollisionShape::Capsule {
                    a: s0.center,
                    b: s1.center,
                    radius: s0.radius.max(s1.radius),
                }
            } else {
                CollisionShape::TaperedCapsule {
                    a: s0.center,
                    b: s1.center,
                    radius_a: s0.radius,
                    radius_b: s1.radius,
                }
            };
            geometries.push(ColliderGeometry {
                shape,
                bone,
                base: RigidTransform::IDENTITY,
            });
        }

        for (index, convex) in self.convexes.iter().enumerate() {
            geometries.push(ColliderGeometry {
                shape: convex_shape(index, convex),
                bone: map_bone(convex.bone),
                base: RigidTransform::IDENTITY,
            });
        }

        for b in &self.boxes {
            geometries.push(ColliderGeometry {
                shape: CollisionShape::Box {
                    half_extents: b.half_extents.abs(),
                },
                bone: map_bone(b.bone),
                base: RigidTransform::new(b.center, b.rotation.normalize()),
            });
        }

        geometries
    }
}

fn convex_shape(index: usize, convex: &ConvexSource) -> CollisionShape {
    if convex.planes.len() < 4 || convex.surface_points.len() < 4 {
        tracing::warn!(
            convex = index,
            planes = convex.planes.len(),
            points = convex.surface_points.len(),
            "convex needs at least 4 planes and 4 surface points, using a unit sphere"
        );
        return CollisionShape::UNIT_SPHERE;
    }

    let mut planes = Vec::with_capacity(convex.planes.len());
    for (plane_index, plane) in convex.planes.iter().enumerate() {
        let length = plane.normal.length();
        if !length.is_finite() || length < 1.0e-6 {
            tracing::warn!(convex = index, plane = plane_index, "skipping plane with unnormalizable normal");
            continue;
        }
        planes.push(Plane {
            normal: plane.normal / length,
            distance: plane.distance / length,
        });
    }
    if planes.len() < 4 {
        tracing::warn!(
            convex = index,
            planes = planes.len(),
            "convex has fewer than 4 usable planes, using a unit sphere"
        );
        return CollisionShape::UNIT_SPHERE;
    }

    CollisionShape::Convex {
        planes,
        points: convex.surface_points.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_convex(bone: Option<usize>) -> ConvexSource {
        let normals = [Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z];
        ConvexSource {
            bone,
            planes: normals
                .iter()
                .map(|&normal| Plane {
                    normal,
                    distance: 1.0,
                })
                .collect(),
            surface_points: vec![Vec3::ONE, -Vec3::ONE, Vec3::X, Vec3::Y],
        }
    }

    #[test]
    fn test_connected_spheres_become_one_capsule() {
        let source = CollisionSource {
            spheres: vec![
                SphereSource {
                    bone: Some(0),
                    center: Vec3::ZERO,
                    radius: 2.0,
                },
                SphereSource {
                    bone: Some(0),
                    center: Vec3::X * 10.0,
                    radius: 2.0,
                },
                SphereSource {
                    bone: Some(1),
                    center: Vec3::Z,
                    radius: 1.0,
                },
            ],
            sphere_connections: vec![SphereConnection { spheres: [0, 1] }],
            ..Default::default()
        };
        let geometries = source.extract(&[4, 7]);
        assert_eq!(geometries.len(), 2);
        assert_eq!(geometries[0].shape, CollisionShape::Sphere { radius: 1.0 });
        assert_eq!(geometries[0].bone, Some(7));
        assert!(matches!(geometries[1].shape, CollisionShape::Capsule { .. }));
        assert_eq!(geometries[1].bone, Some(4));
    }

    #[test]
    fn test_different_radii_build_tapered_capsule() {
        let source = CollisionSource {
            spheres: vec![
                SphereSource {
                    bone: None,
                    center: Vec3::ZERO,
                    radius: 1.0,
                },
                SphereSource {
                    bone: None,
                    center: Vec3::Y,
                    radius: 3.0,
                },
            ],
            sphere_connections: vec![SphereConnection { spheres: [0, 1] }],
            ..Default::default()
        };
        let geometries = source.extract(&[]);
        assert!(matches!(geometries[0].shape, CollisionShape::TaperedCapsule { .. }));
    }

    #[test]
    #[should_panic(expected = "different bones")]
    fn test_capsule_across_bones_panics() {
        let source = CollisionSource {
            spheres: vec![
                SphereSource {
                    bone: Some(0),
                    center: Vec3::ZERO,
                    radius: 1.0,
                },
                SphereSource {
                    bone: Some(1),
                    center: Vec3::Y,
                    radius: 1.0,
                },
            ],
            sphere_connections: vec![SphereConnection { spheres: [0, 1] }],
            ..Default::default()
        };
        source.extract(&[0, 1]);
    }

    #[test]
    fn test_degenerate_convex_becomes_unit_sphere() {
        let mut convex = cube_convex(None);
        convex.surface_points.truncate(3);
        let source = CollisionSource {
            convexes: vec![convex],
            ..Default::default()
        };
        assert_eq!(source.extract(&[])[0].shape, CollisionShape::UNIT_SPHERE);
    }

    #[test]
    fn test_convex_with_only_degenerate_planes_becomes_unit_sphere() {
        let mut convex = cube_convex(None);
        convex.planes.truncate(4);
        for plane in &mut convex.planes {
            plane.normal = Vec3::ZERO;
        }
        let source = CollisionSource {
            convexes: vec![convex],
            ..Default::default()
        };
        assert_eq!(source.extract(&[])[0].shape, CollisionShape::UNIT_SPHERE);
    }

    #[test]
    fn test_convex_left_with_three_planes_becomes_unit_sphere() {
        let mut convex = cube_convex(None);
        convex.planes.truncate(4);
        convex.planes[3].normal = Vec3::new(f32::NAN, 0.0, 0.0);
        let source = CollisionSource {
            convexes: vec![convex],
            ..Default::default()
        };
        assert_eq!(source.extract(&[])[0].shape, CollisionShape::UNIT_SPHERE);
    }

    #[test]
    fn test_zero_plane_is_skipped() {
        let mut convex = cube_convex(Some(0));
        convex.planes.push(Plane {
            normal: Vec3::ZERO,
            distance: 1.0,
        });
        let source = CollisionSource {
            convexes: vec![convex],
            ..Default::default()
        };
        match &source.extract(&[2])[0].shape {
            CollisionShape::Convex { planes, .. } => assert_eq!(planes.len(), 6),
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn test_unmapped_bone_is_dropped() {
        let source = CollisionSource {
            boxes: vec![BoxSource {
                bone: Some(3),
                center: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                half_extents: Vec3::ONE,
            }],
            ..Default::default()
        };
        assert_eq!(source.extract(&[0])[0].bone, None);
    }
}
