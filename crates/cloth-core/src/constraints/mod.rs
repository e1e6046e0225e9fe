//! Per-range constraint sets.
//!
//! Every constraint stores indices local to its particle range and operates
//! on the range's own slices, so constraint sets of different ranges can be
//! solved on different threads.

pub mod anim_drive;
pub mod area;
pub mod backstop;
pub mod bending;
pub mod collision;
pub mod edge;
pub mod long_range;
pub mod max_distance;
pub mod self_collision;
pub mod shape_target;
pub mod volume;

use glam::Vec3;

use crate::math::{iteration_stiffness, WeightedValue};
use crate::particle::ParticleRange;

use anim_drive::AnimDriveConstraints;
use area::AreaConstraints;
use backstop::BackstopConstraints;
use bending::BendingElements;
use edge::SpringConstraints;
use long_range::LongRangeConstraints;
use max_distance::MaxDistanceConstraints;
use self_collision::SelfCollisionConstraints;
use shape_target::ShapeTargetConstraints;
use volume::VolumeConstraint;

/// Upper end of the XPBD stiffness range a `[0, 1]` stiffness maps onto.
pub const XPBD_MAX_STIFFNESS: f32 = 1.0e7;

/// Range-local particle buffers for one substep.
pub struct SolverParticles<'a> {
    /// Predicted positions, the only buffer constraints write.
    pub p: &'a mut [Vec3],
    /// Positions at the start of the substep.
    pub x: &'a [Vec3],
    pub inv_m: &'a [f32],
    /// Animation target at the end of the substep.
    pub anim_x: &'a [Vec3],
    pub anim_n: &'a [Vec3],
    /// Animation target at the start of the substep.
    pub old_anim_x: &'a [Vec3],
}

/// Stiffness of a constraint type, constant or one value per constraint.
#[derive(Clone, Debug, Default)]
pub struct Stiffness {
    /// Map weight per constraint; empty when the property is not mapped.
    weights: Vec<f32>,
    values: Vec<f32>,
    factors: Vec<f32>,
}

impl Stiffness {
    pub fn new(weights: Option<Vec<f32>>, value: WeightedValue) -> Self {
        let mut stiffness = Self {
            weights: weights.unwrap_or_default(),
            values: Vec::new(),
            factors: Vec::new(),
        };
        stiffness.set(value);
        stiffness
    }

    pub fn constant(value: f32) -> Self {
        Self::new(None, WeightedValue::constant(value))
    }

    pub fn set(&mut self, value: WeightedValue) {
        if self.weights.is_empty() {
            self.values = vec![value.low.clamp(0.0, 1.0)];
        } else {
            self.values = self.weights.iter().map(|&w| value.stiffness_at(w)).collect();
        }
        self.factors = self.values.clone();
    }

    /// Recompute per-iteration factors for the coming substep.
    pub fn prepare(&mut self, iterations: u32) {
        self.factors.clear();
        self.factors
            .extend(self.values.iter().map(|&s| iteration_stiffness(s, iterations)));
    }

    #[inline]
    pub fn value(&self, i: usize) -> f32 {
        if self.values.len() == 1 {
            self.values[0]
        } else {
            self.values[i]
        }
    }

    #[inline]
    pub fn factor(&self, i: usize) -> f32 {
        if self.factors.len() == 1 {
            self.factors[0]
        } else {
            self.factors[i]
        }
    }

    /// True when every constraint has zero stiffness.
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&s| s <= 0.0)
    }
}

/// Average a per-point weight map over the points of each constraint.
pub(crate) fn element_weights<const N: usize>(map: Option<&[f32]>, elements: &[[u32; N]]) -> Option<Vec<f32>> {
    map.map(|m| {
        elements
            .iter()
            .map(|e| e.iter().map(|&i| m[i as usize]).sum::<f32>() / N as f32)
            .collect()
    })
}

pub enum BendingConstraints {
    Springs(SpringConstraints),
    Elements(BendingElements),
}

pub enum VolumeConstraints {
    Enclosed(VolumeConstraint),
    ThinShell(SpringConstraints),
}

/// All constraints active for one particle range.
///
/// Topology is set once through the `set_*_constraints` calls, then
/// [`create_rules`](Self::create_rules) commits it. Properties can change every
/// frame without touching topology.
pub struct ConstraintSet {
    range: ParticleRange,
    enabled: bool,
    rules_created: bool,
    edges: Option<SpringConstraints>,
    bending: Option<BendingConstraints>,
    area: Option<AreaConstraints>,
    volume: Option<VolumeConstraints>,
    long_range: Option<LongRangeConstraints>,
    max_distance: Option<MaxDistanceConstraints>,
    backstop: Option<BackstopConstraints>,
    anim_drive: Option<AnimDriveConstraints>,
    shape_target: Option<ShapeTargetConstraints>,
    self_collision: Option<SelfCollisionConstraints>,
}

impl ConstraintSet {
    pub fn new(range: ParticleRange) -> Self {
        Self {
            range,
            enabled: false,
            rules_created: false,
            edges: None,
            bending: None,
            area: None,
            volume: None,
            long_range: None,
            max_distance: None,
            backstop: None,
            anim_drive: None,
            shape_target: None,
            self_collision: None,
        }
    }

    pub fn range(&self) -> ParticleRange {
        self.range
    }

    pub fn set_edge_constraints(&mut self, edges: SpringConstraints) {
        self.edges = Some(edges);
    }

    pub fn set_bending_constraints(&mut self, bending: BendingConstraints) {
        self.bending = Some(bending);
    }

    pub fn set_area_constraints(&mut self, area: AreaConstraints) {
        self.area = Some(area);
    }

    pub fn set_volume_constraints(&mut self, volume: VolumeConstraints) {
        self.volume = Some(volume);
    }

    pub fn set_long_range_constraints(&mut self, tethers: LongRangeConstraints) {
        self.long_range = Some(tethers);
    }

    pub fn set_max_distance_constraints(&mut self, max_distance: MaxDistanceConstraints) {
        self.max_distance = Some(max_distance);
    }

    pub fn set_backstop_constraints(&mut self, backstop: BackstopConstraints) {
        self.backstop = Some(backstop);
    }

    pub fn set_anim_drive_constraints(&mut self, anim_drive: AnimDriveConstraints) {
        self.anim_drive = Some(anim_drive);
    }

    pub fn set_shape_target_constraints(&mut self, shape_target: ShapeTargetConstraints) {
        self.shape_target = Some(shape_target);
    }

    pub fn set_self_collision_constraints(&mut self, self_collision: SelfCollisionConstraints) {
        self.self_collision = Some(self_collision);
    }

    /// Commit the constraints set so far.
    ///
    /// # Panics
    ///
    /// When called a second time for the same set.
    pub fn create_rules(&mut self) {
        assert!(
            !self.rules_created,
            "constraint rules already created for particle range {:?}",
            self.range
        );
        self.rules_created = true;
        tracing::debug!(
            offset = self.range.offset(),
            count = self.range.count(),
            edges = self.edges.as_ref().map_or(0, SpringConstraints::len),
            tethers = self.long_range.as_ref().map_or(0, LongRangeConstraints::len),
            self_collision = self.self_collision.is_some(),
            "created constraint rules"
        );
    }

    pub fn rules_created(&self) -> bool {
        self.rules_created
    }

    pub fn enable(&mut self, enable: bool) {
        self.enabled = enable;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_live(&self) -> bool {
        self.enabled && self.rules_created
    }

    pub fn set_edge_properties(&mut self, stiffness: WeightedValue) {
        if let Some(edges) = &mut self.edges {
            edges.stiffness.set(stiffness);
        }
    }

    pub fn set_bending_properties(&mut self, stiffness: WeightedValue) {
        match &mut self.bending {
            Some(BendingConstraints::Springs(s)) => s.stiffness.set(stiffness),
            Some(BendingConstraints::Elements(e)) => e.stiffness.set(stiffness),
            None => {}
        }
    }

    pub fn set_area_properties(&mut self, stiffness: WeightedValue) {
        if let Some(area) = &mut self.area {
            area.stiffness.set(stiffness);
        }
    }

    pub fn set_volume_properties(&mut self, stiffness: f32) {
        let value = WeightedValue::constant(stiffness);
        match &mut self.volume {
            Some(VolumeConstraints::Enclosed(v)) => v.stiffness.set(value),
            Some(VolumeConstraints::ThinShell(s)) => s.stiffness.set(value),
            None => {}
        }
    }

    pub fn set_long_range_properties(&mut self, stiffness: WeightedValue, scale: f32) {
        if let Some(tethers) = &mut self.long_range {
            tethers.set_properties(stiffness, scale);
        }
    }

    pub fn set_max_distance_properties(&mut self, scale: f32) {
        if let Some(max_distance) = &mut self.max_distance {
            max_distance.scale = scale;
        }
    }

    pub fn set_backstop_properties(&mut self, scale: f32) {
        if let Some(backstop) = &mut self.backstop {
            backstop.scale = scale;
        }
    }

    pub fn set_anim_drive_properties(&mut self, stiffness: WeightedValue, damping: WeightedValue) {
        if let Some(drive) = &mut self.anim_drive {
            drive.stiffness.set(stiffness);
            drive.damping.set(damping);
        }
    }

    pub fn set_shape_target_properties(&mut self, stiffness: f32) {
        if let Some(shape) = &mut self.shape_target {
            shape.stiffness.set(WeightedValue::constant(stiffness));
        }
    }

    pub fn set_self_collision_properties(&mut self, thickness: f32, stiffness: f32) {
        if let Some(sc) = &mut self.self_collision {
            sc.thickness = thickness;
            sc.stiffness = stiffness;
        }
    }

    /// Reset per-substep state: multipliers, iteration factors and
    /// self-collision contacts. Returns the number of self contacts found.
    pub fn begin_substep(&mut self, positions: &[Vec3], iterations: u32) -> usize {
        if !self.is_live() {
            return 0;
        }
        if let Some(edges) = &mut self.edges {
            edges.begin_substep(iterations);
        }
        match &mut self.bending {
            Some(BendingConstraints::Springs(s)) => s.begin_substep(iterations),
            Some(BendingConstraints::Elements(e)) => e.stiffness.prepare(iterations),
            None => {}
        }
        if let Some(area) = &mut self.area {
            area.stiffness.prepare(iterations);
        }
        match &mut self.volume {
            Some(VolumeConstraints::Enclosed(v)) => v.stiffness.prepare(iterations),
            Some(VolumeConstraints::ThinShell(s)) => s.begin_substep(iterations),
            None => {}
        }
        if let Some(tethers) = &mut self.long_range {
            tethers.stiffness.prepare(iterations);
        }
        if let Some(drive) = &mut self.anim_drive {
            drive.stiffness.prepare(iterations);
            drive.damping.prepare(iterations);
        }
        if let Some(shape) = &mut self.shape_target {
            shape.stiffness.prepare(iterations);
        }
        match &mut self.self_collision {
            Some(sc) => sc.detect(positions),
            None => 0,
        }
    }

    /// One projection pass over every constraint type.
    pub fn apply(&mut self, particles: &mut SolverParticles<'_>, dt: f32) {
        if !self.is_live() {
            return;
        }
        if let Some(edges) = &mut self.edges {
            edges.apply(particles.p, particles.inv_m, dt);
        }
        match &mut self.bending {
            Some(BendingConstraints::Springs(s)) => s.apply(particles.p, particles.inv_m, dt),
            Some(BendingConstraints::Elements(e)) => e.apply(particles.p, particles.inv_m),
            None => {}
        }
        if let Some(area) = &self.area {
            area.apply(particles.p, particles.inv_m);
        }
        match &mut self.volume {
            Some(VolumeConstraints::Enclosed(v)) => v.apply(particles.p, particles.inv_m),
            Some(VolumeConstraints::ThinShell(s)) => s.apply(particles.p, particles.inv_m, dt),
            None => {}
        }
        if let Some(drive) = &self.anim_drive {
            drive.apply(particles);
        }
        if let Some(shape) = &self.shape_target {
            shape.apply(particles.p, particles.inv_m, particles.anim_x);
        }
        if let Some(sc) = &mut self.self_collision {
            sc.apply(particles.p, particles.inv_m);
        }
        if let Some(tethers) = &self.long_range {
            tethers.apply(particles.p, particles.inv_m);
        }
        if let Some(backstop) = &self.backstop {
            backstop.apply(particles.p, particles.inv_m, particles.anim_x, particles.anim_n);
        }
        if let Some(max_distance) = &self.max_distance {
            max_distance.apply(particles.p, particles.inv_m, particles.anim_x);
        }
    }
}
