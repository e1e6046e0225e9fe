use std::ops::Range;

use glam::Vec3;

use crate::math::{Aabb, Bounds};

/// Tag scoping gravity, damping, wind, collision and reference-frame
/// properties to one cloth's particles.
pub type GroupId = u32;

/// A contiguous block of particles inside a [`ParticleStore`].
///
/// Only the store hands these out, so a range always names an allocation the
/// store made. A range stays valid until the store is reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleRange {
    offset: usize,
    count: usize,
}

impl ParticleRange {
    pub(crate) fn new(offset: usize, count: usize) -> Self {
        Self { offset, count }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn end(&self) -> usize {
        self.offset + self.count
    }

    pub fn indices(&self) -> Range<usize> {
        self.offset..self.end()
    }

    pub fn contains(&self, other: &ParticleRange) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }

    /// Smallest range covering both.
    pub(crate) fn cover(&self, other: &ParticleRange) -> ParticleRange {
        let offset = self.offset.min(other.offset);
        let end = self.end().max(other.end());
        ParticleRange::new(offset, end - offset)
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RangeRecord {
    pub range: ParticleRange,
    pub group: GroupId,
    pub active: bool,
    /// Positions and velocities are already expressed in the current local
    /// space, so this frame's pre-simulation transform must skip them.
    pub positions_rebased: bool,
    /// Same for the previous animation target.
    pub animation_rebased: bool,
}

/// SoA particle storage shared by every cloth in a solver.
///
/// `x` is the start-of-step position, `p` the predicted position.
/// Animation buffers are double buffered: `old_anim_*` holds the previous
/// frame's target so kinematic particles and drive constraints can
/// interpolate across substeps.
pub struct ParticleStore {
    pub x: Vec<Vec3>,
    pub v: Vec<Vec3>,
    pub p: Vec<Vec3>,
    pub m: Vec<f32>,
    /// Inverse mass, `0.0` = kinematic.
    pub inv_m: Vec<f32>,
    pub anim_x: Vec<Vec3>,
    pub old_anim_x: Vec<Vec3>,
    pub anim_n: Vec<Vec3>,
    pub old_anim_n: Vec<Vec3>,
    pub normal: Vec<Vec3>,
    records: Vec<RangeRecord>,
}

impl Default for ParticleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleStore {
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            v: Vec::new(),
            p: Vec::new(),
            m: Vec::new(),
            inv_m: Vec::new(),
            anim_x: Vec::new(),
            old_anim_x: Vec::new(),
            anim_n: Vec::new(),
            old_anim_n: Vec::new(),
            normal: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Append `count` particles tagged with `group`.
    ///
    /// The new range starts disabled and kinematic. Returns `None` when
    /// `count` is zero.
    pub fn add_particles(&mut self, count: usize, group: GroupId) -> Option<ParticleRange> {
        if count == 0 {
            return None;
        }
        let offset = self.len();
        let new_len = offset + count;
        self.x.resize(new_len, Vec3::ZERO);
        self.v.resize(new_len, Vec3::ZERO);
        self.p.resize(new_len, Vec3::ZERO);
        self.m.resize(new_len, 0.0);
        self.inv_m.resize(new_len, 0.0);
        self.anim_x.resize(new_len, Vec3::ZERO);
        self.old_anim_x.resize(new_len, Vec3::ZERO);
        self.anim_n.resize(new_len, Vec3::Z);
        self.old_anim_n.resize(new_len, Vec3::Z);
        self.normal.resize(new_len, Vec3::Z);

        let range = ParticleRange::new(offset, count);
        self.records.push(RangeRecord {
            range,
            group,
            active: false,
            positions_rebased: false,
            animation_rebased: false,
        });
        Some(range)
    }

    /// Drop every particle. All outstanding ranges become invalid.
    pub fn reset(&mut self) {
        self.x.clear();
        self.v.clear();
        self.p.clear();
        self.m.clear();
        self.inv_m.clear();
        self.anim_x.clear();
        self.old_anim_x.clear();
        self.anim_n.clear();
        self.old_anim_n.clear();
        self.normal.clear();
        self.records.clear();
    }

    fn record_index(&self, range: ParticleRange) -> usize {
        match self
            .records
            .binary_search_by_key(&range.offset, |r| r.range.offset)
        {
            Ok(i) if self.records[i].range == range => i,
            _ => panic!("particle range {range:?} was not issued by this store or was invalidated by a reset"),
        }
    }

    pub(crate) fn record(&self, range: ParticleRange) -> &RangeRecord {
        &self.records[self.record_index(range)]
    }

    pub(crate) fn records(&self) -> &[RangeRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [RangeRecord] {
        &mut self.records
    }

    pub fn group(&self, range: ParticleRange) -> GroupId {
        self.record(range).group
    }

    pub fn is_active(&self, range: ParticleRange) -> bool {
        self.record(range).active
    }

    pub fn set_active(&mut self, range: ParticleRange, active: bool) {
        let i = self.record_index(range);
        self.records[i].active = active;
    }

    /// Snap the range onto its animation target and drop all velocity.
    pub fn reset_start_pose(&mut self, range: ParticleRange) {
        let i = self.record_index(range);
        self.records[i].positions_rebased = true;
        self.records[i].animation_rebased = true;
        let r = range.indices();
        reset_pose(
            &mut self.x[r.clone()],
            &mut self.v[r.clone()],
            &mut self.p[r.clone()],
            &mut self.old_anim_x[r.clone()],
            &self.anim_x[r.clone()],
            &mut self.old_anim_n[r.clone()],
            &self.anim_n[r],
        );
    }

    /// Exchange the previous and current animation target buffers.
    pub(crate) fn swap_animation_buffers(&mut self) {
        std::mem::swap(&mut self.anim_x, &mut self.old_anim_x);
        std::mem::swap(&mut self.anim_n, &mut self.old_anim_n);
    }

    /// Number of particles in active ranges.
    pub fn active_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.active)
            .map(|r| r.range.count)
            .sum()
    }

    /// Axis-aligned bounds of all active particle positions.
    ///
    /// Returns a zero-sized box when nothing is active.
    pub fn calculate_bounds(&self) -> Bounds {
        let active: Vec<Range<usize>> = self
            .records
            .iter()
            .filter(|r| r.active)
            .map(|r| r.range.indices())
            .collect();

        #[cfg(feature = "parallel")]
        let aabb = {
            use rayon::prelude::*;
            active
                .par_iter()
                .map(|r| self.x[r.clone()].iter().fold(Aabb::EMPTY, |a, &p| a.grow(p)))
                .reduce(|| Aabb::EMPTY, Aabb::union)
        };

        #[cfg(not(feature = "parallel"))]
        let aabb = active
            .iter()
            .map(|r| self.x[r.clone()].iter().fold(Aabb::EMPTY, |a, &p| a.grow(p)))
            .fold(Aabb::EMPTY, Aabb::union);

        aabb.to_bounds()
    }

    /// Split the store into disjoint mutable views, one per span.
    ///
    /// `spans` must be sorted by offset and must not overlap. Each view also
    /// receives the range records that fall inside its span.
    pub(crate) fn spans_mut(&mut self, spans: &[ParticleRange]) -> Vec<ParticleSpanMut<'_>> {
        debug_assert!(spans.windows(2).all(|w| w[0].end() <= w[1].offset()));

        let mut x = split_spans_mut(&mut self.x, spans).into_iter();
        let mut v = split_spans_mut(&mut self.v, spans).into_iter();
        let mut p = split_spans_mut(&mut self.p, spans).into_iter();
        let mut inv_m = split_spans_mut(&mut self.inv_m, spans).into_iter();
        let mut anim_x = split_spans_mut(&mut self.anim_x, spans).into_iter();
        let mut old_anim_x = split_spans_mut(&mut self.old_anim_x, spans).into_iter();
        let mut anim_n = split_spans_mut(&mut self.anim_n, spans).into_iter();
        let mut old_anim_n = split_spans_mut(&mut self.old_anim_n, spans).into_iter();
        let mut normal = split_spans_mut(&mut self.normal, spans).into_iter();

        let mut records: Vec<Vec<&mut RangeRecord>> = spans.iter().map(|_| Vec::new()).collect();
        for record in self.records.iter_mut() {
            if let Some(k) = spans.iter().position(|s| s.contains(&record.range)) {
                records[k].push(record);
            }
        }

        spans
            .iter()
            .zip(records)
            .map(|(&span, records)| ParticleSpanMut {
                span,
                x: x.next().unwrap_or_default(),
                v: v.next().unwrap_or_default(),
                p: p.next().unwrap_or_default(),
                inv_m: inv_m.next().unwrap_or_default(),
                anim_x: anim_x.next().unwrap_or_default(),
                old_anim_x: old_anim_x.next().unwrap_or_default(),
                anim_n: anim_n.next().unwrap_or_default(),
                old_anim_n: old_anim_n.next().unwrap_or_default(),
                normal: normal.next().unwrap_or_default(),
                records,
            })
            .collect()
    }
}

/// Mutable window over one span of a [`ParticleStore`].
///
/// Ranges passed in are global; the view translates them to its own slices.
pub struct ParticleSpanMut<'a> {
    span: ParticleRange,
    pub x: &'a mut [Vec3],
    pub v: &'a mut [Vec3],
    pub p: &'a mut [Vec3],
    pub inv_m: &'a mut [f32],
    pub anim_x: &'a mut [Vec3],
    pub old_anim_x: &'a mut [Vec3],
    pub anim_n: &'a mut [Vec3],
    pub old_anim_n: &'a mut [Vec3],
    pub normal: &'a mut [Vec3],
    records: Vec<&'a mut RangeRecord>,
}

impl<'a> ParticleSpanMut<'a> {
    pub fn span(&self) -> ParticleRange {
        self.span
    }

    /// Slice indices of `range` inside this view.
    pub fn local(&self, range: ParticleRange) -> Range<usize> {
        assert!(
            self.span.contains(&range),
            "particle range {range:?} lies outside view {:?}",
            self.span
        );
        let start = range.offset - self.span.offset;
        start..start + range.count
    }

    fn record_mut(&mut self, range: ParticleRange) -> &mut RangeRecord {
        self.records
            .iter_mut()
            .find(|r| r.range == range)
            .unwrap_or_else(|| panic!("particle range {range:?} is not part of this view"))
    }

    pub fn set_active(&mut self, range: ParticleRange, active: bool) {
        self.record_mut(range).active = active;
    }

    pub fn is_active(&self, range: ParticleRange) -> bool {
        self.records.iter().any(|r| r.range == range && r.active)
    }

    /// Flag the previous animation target of `range` as already rebased.
    pub fn mark_animation_rebased(&mut self, range: ParticleRange) {
        self.record_mut(range).animation_rebased = true;
    }

    pub fn reset_start_pose(&mut self, range: ParticleRange) {
        let record = self.record_mut(range);
        record.positions_rebased = true;
        record.animation_rebased = true;
        let r = self.local(range);
        reset_pose(
            &mut self.x[r.clone()],
            &mut self.v[r.clone()],
            &mut self.p[r.clone()],
            &mut self.old_anim_x[r.clone()],
            &self.anim_x[r.clone()],
            &mut self.old_anim_n[r.clone()],
            &self.anim_n[r],
        );
    }
}

fn reset_pose(
    x: &mut [Vec3],
    v: &mut [Vec3],
    p: &mut [Vec3],
    old_anim_x: &mut [Vec3],
    anim_x: &[Vec3],
    old_anim_n: &mut [Vec3],
    anim_n: &[Vec3],
) {
    x.copy_from_slice(anim_x);
    p.copy_from_slice(anim_x);
    old_anim_x.copy_from_slice(anim_x);
    old_anim_n.copy_from_slice(anim_n);
    v.fill(Vec3::ZERO);
}

/// Cut `slice` into the sub-slices named by sorted, non-overlapping spans.
pub(crate) fn split_spans_mut<'a, T>(
    mut slice: &'a mut [T],
    spans: &[ParticleRange],
) -> Vec<&'a mut [T]> {
    let mut out = Vec::with_capacity(spans.len());
    let mut cursor = 0;
    for span in spans {
        let (_, rest) = std::mem::take(&mut slice).split_at_mut(span.offset - cursor);
        let (chunk, rest) = rest.split_at_mut(span.count);
        out.push(chunk);
        slice = rest;
        cursor = span.end();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_zero_particles_returns_none() {
        let mut store = ParticleStore::new();
        assert!(store.add_particles(0, 0).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_new_range_starts_disabled_and_kinematic() {
        let mut store = ParticleStore::new();
        let range = store.add_particles(3, 7).unwrap();
        assert!(!store.is_active(range));
        assert_eq!(store.group(range), 7);
        assert!(store.inv_m[range.indices()].iter().all(|&w| w == 0.0));
    }

    #[test]
    #[should_panic]
    fn test_stale_range_panics_after_reset() {
        let mut store = ParticleStore::new();
        let range = store.add_particles(4, 0).unwrap();
        store.reset();
        store.add_particles(2, 0);
        store.set_active(range, true);
    }

    #[test]
    fn test_split_spans_mut_gives_disjoint_windows() {
        let mut data: Vec<u32> = (0..10).collect();
        let spans = [ParticleRange::new(1, 2), ParticleRange::new(5, 3)];
        let parts = split_spans_mut(&mut data, &spans);
        assert_eq!(parts[0], &[1, 2]);
        assert_eq!(parts[1], &[5, 6, 7]);
    }

    #[test]
    fn test_span_view_reset_pose_uses_local_indices() {
        let mut store = ParticleStore::new();
        let _a = store.add_particles(2, 0).unwrap();
        let b = store.add_particles(2, 1).unwrap();
        store.anim_x[b.offset()] = Vec3::new(1.0, 2.0, 3.0);
        store.v[b.offset()] = Vec3::ONE;
        {
            let mut views = store.spans_mut(&[b]);
            views[0].reset_start_pose(b);
            views[0].set_active(b, true);
        }
        assert_eq!(store.x[b.offset()], Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(store.v[b.offset()], Vec3::ZERO);
        assert!(store.is_active(b));
    }
}
