//! Collider geometry and the solver's collision particle region.

pub mod shape;
pub mod source;

use crate::math::RigidTransform;
use crate::particle::GroupId;

pub use shape::{CollisionShape, Plane};
pub use source::{BoxSource, ColliderGeometry, CollisionSource, ConvexSource, SphereConnection, SphereSource};

/// An allocation inside [`CollisionParticles`].
///
/// The id tells two allocations at the same offset apart, so a handle that
/// was discarded by a cascade is never mistaken for its replacement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CollisionRange {
    offset: usize,
    count: usize,
    id: u64,
}

impl CollisionRange {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn end(&self) -> usize {
        self.offset + self.count
    }
}

/// Collider pose over one frame, borrowed for the solve.
#[derive(Clone, Copy, Debug)]
pub struct ColliderPose<'a> {
    pub shape: &'a CollisionShape,
    pub old: RigidTransform,
    pub current: RigidTransform,
}

/// One contiguous region holding every collider of every cloth in a solver,
/// appended in a fixed call order each frame.
#[derive(Default)]
pub struct CollisionParticles {
    shapes: Vec<CollisionShape>,
    groups: Vec<GroupId>,
    enabled: Vec<bool>,
    pub transforms: Vec<RigidTransform>,
    pub old_transforms: Vec<RigidTransform>,
    /// Previous transform already in the current local space.
    rebased: Vec<bool>,
    allocations: Vec<CollisionRange>,
    next_id: u64,
}

impl CollisionParticles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Append `count` disabled unit spheres tagged with `group`.
    pub fn add(&mut self, count: usize, group: GroupId) -> Option<CollisionRange> {
        if count == 0 {
            return None;
        }
        let offset = self.len();
        let new_len = offset + count;
        self.shapes.resize(new_len, CollisionShape::UNIT_SPHERE);
        self.groups.resize(new_len, group);
        self.enabled.resize(new_len, false);
        self.transforms.resize(new_len, RigidTransform::IDENTITY);
        self.old_transforms.resize(new_len, RigidTransform::IDENTITY);
        self.rebased.resize(new_len, false);

        let range = CollisionRange {
            offset,
            count,
            id: self.next_id,
        };
        self.next_id += 1;
        self.allocations.push(range);
        Some(range)
    }

    /// Drop every collision particle from `offset` on, together with all
    /// allocations that start there or later.
    pub fn reset_from(&mut self, offset: usize) {
        if offset >= self.len() {
            return;
        }
        let before = self.allocations.len();
        self.allocations.retain(|a| a.offset < offset);
        tracing::debug!(
            offset,
            discarded_particles = self.len() - offset,
            discarded_allocations = before - self.allocations.len(),
            "collision particle region truncated"
        );
        self.shapes.truncate(offset);
        self.groups.truncate(offset);
        self.enabled.truncate(offset);
        self.transforms.truncate(offset);
        self.old_transforms.truncate(offset);
        self.rebased.truncate(offset);
    }

    pub fn reset(&mut self) {
        self.reset_from(0);
        self.allocations.clear();
    }

    /// Whether `range` still names an allocation of this region.
    pub fn is_live(&self, range: CollisionRange) -> bool {
        self.allocations.contains(&range)
    }

    /// Reuse `previous` when it sits at the very end of the region and has
    /// the requested count. Otherwise discard it and everything allocated
    /// after it, then append a fresh allocation.
    ///
    /// Returns the range and whether it is new.
    pub fn recycle(
        &mut self,
        previous: Option<CollisionRange>,
        count: usize,
        group: GroupId,
    ) -> (Option<CollisionRange>, bool) {
        if let Some(prev) = previous.filter(|&r| self.is_live(r)) {
            if prev.end() == self.len() && prev.count == count {
                return (Some(prev), false);
            }
            self.reset_from(prev.offset);
        }
        (self.add(count, group), true)
    }

    fn check(&self, range: CollisionRange) {
        assert!(
            self.is_live(range),
            "collision range {range:?} was discarded or never issued by this region"
        );
    }

    pub fn shapes(&self) -> &[CollisionShape] {
        &self.shapes
    }

    pub fn shapes_mut(&mut self, range: CollisionRange) -> &mut [CollisionShape] {
        self.check(range);
        &mut self.shapes[range.offset..range.end()]
    }

    pub fn transforms_mut(&mut self, range: CollisionRange) -> &mut [RigidTransform] {
        self.check(range);
        &mut self.transforms[range.offset..range.end()]
    }

    pub fn old_transforms_mut(&mut self, range: CollisionRange) -> &mut [RigidTransform] {
        self.check(range);
        &mut self.old_transforms[range.offset..range.end()]
    }

    /// Flag the previous transforms of `range` as already expressed in the
    /// current local space, so this frame's pre-simulation transform skips them.
    pub fn mark_rebased(&mut self, range: CollisionRange) {
        self.check(range);
        self.rebased[range.offset..range.end()].fill(true);
    }

    pub fn set_enabled(&mut self, range: CollisionRange, enabled: bool) {
        self.check(range);
        self.enabled[range.offset..range.end()].fill(enabled);
    }

    pub fn is_enabled(&self, index: usize) -> bool {
        self.enabled[index]
    }

    pub fn group(&self, index: usize) -> GroupId {
        self.groups[index]
    }

    pub(crate) fn swap_transforms(&mut self) {
        std::mem::swap(&mut self.transforms, &mut self.old_transforms);
    }

    /// Enabled colliders of `group` with their previous and current pose.
    pub fn group_poses(&self, group: GroupId) -> Vec<ColliderPose<'_>> {
        (0..self.len())
            .filter(|&i| self.enabled[i] && self.groups[i] == group)
            .map(|i| ColliderPose {
                shape: &self.shapes[i],
                old: self.old_transforms[i],
                current: self.transforms[i],
            })
            .collect()
    }

    /// Pre-multiply the previous transforms of every collider in `group`
    /// that is not flagged as rebased.
    pub(crate) fn transform_old_poses(&mut self, group: GroupId, transform: RigidTransform) {
        for ((old, &g), &rebased) in self.old_transforms.iter_mut().zip(&self.groups).zip(&self.rebased) {
            if g == group && !rebased {
                *old = transform * *old;
            }
        }
    }

    pub(crate) fn clear_rebased(&mut self) {
        self.rebased.fill(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_tail_is_reused() {
        let mut region = CollisionParticles::new();
        let a = region.add(3, 0);
        let (b, fresh) = region.recycle(None, 2, 0);
        assert!(fresh);
        let (again, fresh) = region.recycle(b, 2, 0);
        assert!(!fresh);
        assert_eq!(again, b);
        assert!(region.is_live(a.unwrap()));
    }

    #[test]
    fn test_count_mismatch_discards_later_allocations() {
        let mut region = CollisionParticles::new();
        let dynamic = region.add(2, 0);
        let later = region.add(4, 1).unwrap();

        // Not at the end any more, so the dynamic slot and everything after it go.
        let (fresh_range, fresh) = region.recycle(dynamic, 2, 0);
        assert!(fresh);
        assert!(!region.is_live(later));
        assert!(!region.is_live(dynamic.unwrap()));
        let fresh_range = fresh_range.unwrap();
        assert_eq!(fresh_range.offset(), 0);
        assert_eq!(region.len(), 2);
        assert_ne!(Some(fresh_range), dynamic);
    }

    #[test]
    fn test_allocations_never_overlap() {
        let mut region = CollisionParticles::new();
        let ranges: Vec<CollisionRange> = [3, 1, 5, 2].iter().filter_map(|&n| region.add(n, 0)).collect();
        for (i, a) in ranges.iter().enumerate() {
            for b in &ranges[i + 1..] {
                assert!(a.end() <= b.offset() || b.end() <= a.offset());
            }
        }
    }

    #[test]
    fn test_group_poses_only_returns_enabled_members() {
        let mut region = CollisionParticles::new();
        let a = region.add(1, 0).unwrap();
        let b = region.add(2, 1).unwrap();
        region.set_enabled(a, true);
        region.set_enabled(b, true);
        region.transforms_mut(b)[1] = RigidTransform::from_translation(glam::Vec3::X);
        assert_eq!(region.group_poses(0).len(), 1);
        let poses = region.group_poses(1);
        assert_eq!(poses.len(), 2);
        assert_eq!(poses[1].current.translation, glam::Vec3::X);
        region.set_enabled(b, false);
        assert!(region.group_poses(1).is_empty());
    }

    #[test]
    #[should_panic(expected = "discarded")]
    fn test_writing_through_stale_range_panics() {
        let mut region = CollisionParticles::new();
        let a = region.add(2, 0).unwrap();
        region.reset();
        region.add(2, 0);
        region.set_enabled(a, true);
    }
}
