use crate::collision::{ColliderGeometry, CollisionParticles, CollisionRange, CollisionSource};
use crate::math::RigidTransform;
use crate::mesh::MeshAdapter;
use crate::particle::GroupId;

/// Handle of a collider attached to a cloth, issued by the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColliderId(pub(crate) u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotKind {
    /// Mesh independent shapes, always enabled.
    Global,
    /// Replaced from outside every frame, always enabled.
    Dynamic,
    /// Shapes that belong to one LOD of the cloth mesh.
    Lod(usize),
}

#[derive(Clone, Debug)]
struct ColliderSlot {
    kind: SlotKind,
    geometries: Vec<ColliderGeometry>,
    range: Option<CollisionRange>,
    enabled: bool,
}

impl ColliderSlot {
    fn new(kind: SlotKind, geometries: Vec<ColliderGeometry>) -> Self {
        Self {
            kind,
            geometries,
            range: None,
            enabled: false,
        }
    }
}

/// Collision geometry attached to one cloth.
///
/// Slots are laid out as global, one per LOD, then dynamic, and allocate
/// their collision particles in that order. The dynamic slot is only reused
/// when it is the last allocation of the solver's collision region. With
/// several collider-carrying cloths that holds for the last one only: every
/// earlier dynamic slot, and everything allocated after it, is discarded and
/// reallocated each frame, starting without motion.
#[derive(Clone, Debug)]
pub struct ClothCollider {
    bone_map: Vec<usize>,
    slots: Vec<ColliderSlot>,
}

impl ClothCollider {
    /// `bone_map` translates the sources' bone indices into mesh adapter bones.
    pub fn new(global: &CollisionSource, bone_map: Vec<usize>) -> Self {
        let slots = vec![
            ColliderSlot::new(SlotKind::Global, global.extract(&bone_map)),
            ColliderSlot::new(SlotKind::Dynamic, Vec::new()),
        ];
        Self { bone_map, slots }
    }

    /// Add shapes that only collide while `lod` is the cloth's active LOD.
    pub fn with_lod_source(mut self, lod: usize, source: &CollisionSource) -> Self {
        let geometries = source.extract(&self.bone_map);
        let dynamic = self.slots.len() - 1;
        self.slots.insert(dynamic, ColliderSlot::new(SlotKind::Lod(lod), geometries));
        self
    }

    /// Replace the dynamic slot's shapes. The new set is allocated on the next
    /// update, reusing the previous collision particles when possible.
    pub fn set_dynamic_source(&mut self, source: &CollisionSource) {
        let geometries = source.extract(&self.bone_map);
        if let Some(slot) = self.slots.iter_mut().find(|s| s.kind == SlotKind::Dynamic) {
            slot.geometries = geometries;
        }
    }

    pub fn num_geometries(&self) -> usize {
        self.slots.iter().map(|s| s.geometries.len()).sum()
    }

    /// Allocated ranges, in slot order.
    pub fn ranges(&self) -> impl Iterator<Item = CollisionRange> + '_ {
        self.slots.iter().filter_map(|s| s.range)
    }

    /// Whether the slot for `lod` is currently enabled.
    pub fn is_lod_enabled(&self, lod: usize) -> bool {
        self.slots
            .iter()
            .any(|s| s.kind == SlotKind::Lod(lod) && s.enabled)
    }

    /// Forget every allocation, after the collision region was reset.
    pub(crate) fn clear_ranges(&mut self) {
        for slot in &mut self.slots {
            slot.range = None;
            slot.enabled = false;
        }
    }

    /// Discard this collider's collision particles and everything after them.
    pub(crate) fn remove(&mut self, collision: &mut CollisionParticles) {
        if let Some(first) = self
            .slots
            .iter()
            .filter_map(|s| s.range)
            .filter(|&r| collision.is_live(r))
            .map(|r| r.offset())
            .min()
        {
            collision.reset_from(first);
        }
        self.clear_ranges();
    }

    /// Allocate missing slots and recompute every slot's transforms.
    ///
    /// Transforms are written for all slots, enabled or not, so a slot that
    /// becomes active next frame already has a valid previous pose.
    pub(crate) fn update(
        &mut self,
        collision: &mut CollisionParticles,
        group: GroupId,
        active_lod: Option<usize>,
        mesh: &dyn MeshAdapter,
        component_to_local: RigidTransform,
    ) {
        for slot in &mut self.slots {
            let count = slot.geometries.len();
            let fresh = match slot.kind {
                SlotKind::Dynamic => {
                    let (range, fresh) = collision.recycle(slot.range, count, group);
                    slot.range = range;
                    // Shapes may change at the same count.
                    if let Some(range) = range {
                        for (dst, geometry) in collision.shapes_mut(range).iter_mut().zip(&slot.geometries) {
                            dst.clone_from(&geometry.shape);
                        }
                    }
                    fresh
                }
                SlotKind::Global | SlotKind::Lod(_) => {
                    let live = slot.range.is_some_and(|r| collision.is_live(r));
                    if !live {
                        slot.range = collision.add(count, group);
                        if let Some(range) = slot.range {
                            for (dst, geometry) in collision.shapes_mut(range).iter_mut().zip(&slot.geometries) {
                                dst.clone_from(&geometry.shape);
                            }
                        }
                    }
                    !live
                }
            };

            let Some(range) = slot.range else {
                continue;
            };

            let transforms = collision.transforms_mut(range);
            for (transform, geometry) in transforms.iter_mut().zip(&slot.geometries) {
                let bone = geometry
                    .bone
                    .and_then(|b| mesh.bone_transform(b))
                    .unwrap_or(RigidTransform::IDENTITY);
                *transform = component_to_local * bone * geometry.base;
            }
            if fresh {
                let current = collision.transforms_mut(range).to_vec();
                collision.old_transforms_mut(range).copy_from_slice(&current);
                collision.mark_rebased(range);
            }

            slot.enabled = match slot.kind {
                SlotKind::Global | SlotKind::Dynamic => true,
                SlotKind::Lod(lod) => active_lod == Some(lod),
            };
            collision.set_enabled(range, slot.enabled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::SphereSource;
    use crate::mesh::grid::GridMesh;
    use glam::Vec3;

    fn sphere_source(n: usize) -> CollisionSource {
        CollisionSource {
            spheres: (0..n)
                .map(|i| SphereSource {
                    bone: Some(0),
                    center: Vec3::new(i as f32, 0.0, 0.0),
                    radius: 1.0,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_lod_slot_enabled_only_for_active_lod() {
        let mesh = GridMesh::new(10.0, 10.0, &[(2, 2), (1, 1)]);
        let mut region = CollisionParticles::new();
        let mut collider = ClothCollider::new(&sphere_source(1), vec![0])
            .with_lod_source(0, &sphere_source(2))
            .with_lod_source(1, &sphere_source(3));
        collider.update(&mut region, 0, Some(1), &mesh, RigidTransform::IDENTITY);
        assert_eq!(region.len(), 6);
        assert!(!collider.is_lod_enabled(0));
        assert!(collider.is_lod_enabled(1));
        assert_eq!(region.group_poses(0).len(), 4);
    }

    #[test]
    fn test_transform_composes_local_bone_and_base() {
        let mut mesh = GridMesh::new(10.0, 10.0, &[(1, 1)]);
        mesh.set_reference_bone_transform(RigidTransform::from_translation(Vec3::new(0.0, 5.0, 0.0)));
        let mut region = CollisionParticles::new();
        let mut collider = ClothCollider::new(&sphere_source(2), vec![0]);
        let to_local = RigidTransform::from_translation(Vec3::new(0.0, 0.0, -100.0));
        collider.update(&mut region, 0, None, &mesh, to_local);
        assert_eq!(region.transforms[1].translation, Vec3::new(1.0, 5.0, -100.0));
        // A fresh allocation has no motion.
        assert_eq!(region.old_transforms[1], region.transforms[1]);
    }

    #[test]
    fn test_dynamic_count_change_reallocates_dynamic_slot() {
        let mesh = GridMesh::new(10.0, 10.0, &[(1, 1)]);
        let mut region = CollisionParticles::new();
        let mut collider = ClothCollider::new(&CollisionSource::default(), vec![0]).with_lod_source(0, &sphere_source(2));
        collider.set_dynamic_source(&sphere_source(1));
        collider.update(&mut region, 0, Some(0), &mesh, RigidTransform::IDENTITY);
        let before: Vec<CollisionRange> = collider.ranges().collect();
        assert_eq!(before.len(), 2);

        // Same count: nothing moves.
        collider.update(&mut region, 0, Some(0), &mesh, RigidTransform::IDENTITY);
        assert_eq!(collider.ranges().collect::<Vec<_>>(), before);

        collider.set_dynamic_source(&sphere_source(3));
        collider.update(&mut region, 0, Some(0), &mesh, RigidTransform::IDENTITY);
        let after: Vec<CollisionRange> = collider.ranges().collect();
        assert_eq!(region.len(), 5);
        assert!(after.iter().all(|&r| region.is_live(r)));
        assert!(!region.is_live(before[1]));
    }

    #[test]
    fn test_dynamic_slot_before_another_collider_is_reallocated() {
        let mesh = GridMesh::new(10.0, 10.0, &[(1, 1)]);
        let mut region = CollisionParticles::new();
        let mut first = ClothCollider::new(&CollisionSource::default(), vec![0]);
        first.set_dynamic_source(&sphere_source(1));
        let mut second = ClothCollider::new(&sphere_source(2), vec![0]);
        first.update(&mut region, 0, Some(0), &mesh, RigidTransform::IDENTITY);
        second.update(&mut region, 1, Some(0), &mesh, RigidTransform::IDENTITY);
        let first_before: Vec<CollisionRange> = first.ranges().collect();
        let second_before: Vec<CollisionRange> = second.ranges().collect();
        assert_eq!(region.len(), 3);

        // Same counts, but the first dynamic slot no longer ends the region.
        first.update(&mut region, 0, Some(0), &mesh, RigidTransform::IDENTITY);
        assert!(!region.is_live(first_before[0]));
        assert!(!region.is_live(second_before[0]));
        second.update(&mut region, 1, Some(0), &mesh, RigidTransform::IDENTITY);
        assert_eq!(region.len(), 3);
        assert!(first.ranges().chain(second.ranges()).all(|r| region.is_live(r)));
        assert_eq!(region.old_transforms, region.transforms);
    }
}
