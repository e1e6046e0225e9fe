//! Particle state of a solver and the constrained integration step.

use std::collections::BTreeMap;

use glam::Vec3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::collision::{ColliderPose, CollisionParticles};
use crate::config::{SolverConfig, WindModel};
use crate::constraints::collision::{CollisionConstraints, SubstepCollider};
use crate::constraints::{ConstraintSet, SolverParticles};
use crate::forces::{apply_damping, apply_local_damping, VelocityField};
use crate::groups::GroupProperties;
use crate::math::{Bounds, RigidTransform};
use crate::particle::{GroupId, ParticleRange, ParticleSpanMut, ParticleStore};
use crate::quality::{IterationPolicy, StepStats};

/// Solver-side state of one particle range besides the particles.
pub struct RangeState {
    pub constraints: ConstraintSet,
    pub velocity_field: VelocityField,
    collisions: CollisionConstraints,
}

/// Mutable access to everything one cloth owns during its update.
pub struct ClothView<'a> {
    pub particles: ParticleSpanMut<'a>,
    /// Constraint sets of the ranges inside the view, ordered by offset.
    pub constraints: Vec<&'a mut ConstraintSet>,
    pub group: &'a mut GroupProperties,
}

impl ClothView<'_> {
    /// # Panics
    ///
    /// When `range` has no constraint set in this view.
    pub fn constraints_mut(&mut self, range: ParticleRange) -> &mut ConstraintSet {
        self.constraints
            .iter_mut()
            .find(|c| c.range() == range)
            .map(|c| &mut **c)
            .unwrap_or_else(|| panic!("particle range {range:?} has no constraint set in this view"))
    }
}

/// Owns the particle buffer, collision particles, groups and per-range
/// constraint sets of one solver.
pub struct Evolution {
    particles: ParticleStore,
    collision: CollisionParticles,
    groups: Vec<GroupProperties>,
    ranges: BTreeMap<usize, RangeState>,
    substeps: u32,
    policy: IterationPolicy,
    wind_model: WindModel,
    local_space_location: Vec3,
    old_local_space_location: Vec3,
}

impl Evolution {
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            particles: ParticleStore::new(),
            collision: CollisionParticles::new(),
            groups: Vec::new(),
            ranges: BTreeMap::new(),
            substeps: config.substeps.max(1),
            policy: IterationPolicy::from_config(config),
            wind_model: config.wind_model,
            local_space_location: Vec3::ZERO,
            old_local_space_location: Vec3::ZERO,
        }
    }

    pub fn set_config(&mut self, config: &SolverConfig) {
        self.substeps = config.substeps.max(1);
        self.policy = IterationPolicy::from_config(config);
        self.wind_model = config.wind_model;
    }

    pub fn particles(&self) -> &ParticleStore {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut ParticleStore {
        &mut self.particles
    }

    pub fn collision_particles(&self) -> &CollisionParticles {
        &self.collision
    }

    pub fn collision_particles_mut(&mut self) -> &mut CollisionParticles {
        &mut self.collision
    }

    /// Append a disabled range and give it an empty constraint set.
    pub fn add_particles(&mut self, count: usize, group: GroupId) -> Option<ParticleRange> {
        let range = self.particles.add_particles(count, group)?;
        if self.groups.len() <= group as usize {
            self.groups.resize(group as usize + 1, GroupProperties::default());
        }
        self.ranges.insert(
            range.offset(),
            RangeState {
                constraints: ConstraintSet::new(range),
                velocity_field: VelocityField::default(),
                collisions: CollisionConstraints::new(),
            },
        );
        Some(range)
    }

    /// Toggle a range and its constraint set together.
    pub fn enable_particles(&mut self, range: ParticleRange, enable: bool) {
        self.particles.set_active(range, enable);
        self.constraints_mut(range).enable(enable);
    }

    pub fn reset_start_pose(&mut self, range: ParticleRange) {
        self.particles.reset_start_pose(range);
    }

    /// Drop all particles, constraint sets and groups. Every outstanding
    /// range is invalidated.
    pub fn reset_particles(&mut self) {
        self.particles.reset();
        self.ranges.clear();
        self.groups.clear();
    }

    pub fn reset_collision_particles(&mut self, offset: usize) {
        self.collision.reset_from(offset);
    }

    fn range_state_mut(&mut self, range: ParticleRange) -> &mut RangeState {
        // Validates the range against the store first.
        self.particles.record(range);
        self.ranges
            .get_mut(&range.offset())
            .unwrap_or_else(|| panic!("particle range {range:?} has no constraint set"))
    }

    pub fn constraints(&self, range: ParticleRange) -> &ConstraintSet {
        self.particles.record(range);
        &self
            .ranges
            .get(&range.offset())
            .unwrap_or_else(|| panic!("particle range {range:?} has no constraint set"))
            .constraints
    }

    pub fn constraints_mut(&mut self, range: ParticleRange) -> &mut ConstraintSet {
        &mut self.range_state_mut(range).constraints
    }

    pub fn set_velocity_field(&mut self, range: ParticleRange, field: VelocityField) {
        self.range_state_mut(range).velocity_field = field;
    }

    pub fn group(&self, group: GroupId) -> &GroupProperties {
        &self.groups[group as usize]
    }

    pub fn group_mut(&mut self, group: GroupId) -> &mut GroupProperties {
        if self.groups.len() <= group as usize {
            self.groups.resize(group as usize + 1, GroupProperties::default());
        }
        &mut self.groups[group as usize]
    }

    pub fn local_space_location(&self) -> Vec3 {
        self.local_space_location
    }

    pub fn old_local_space_location(&self) -> Vec3 {
        self.old_local_space_location
    }

    pub fn set_local_space_location(&mut self, location: Vec3) {
        self.local_space_location = location;
    }

    /// Exchange previous and current animation targets and collider transforms.
    pub fn swap_buffers(&mut self) {
        self.particles.swap_animation_buffers();
        self.collision.swap_transforms();
    }

    /// Split the solver into one view per cloth.
    ///
    /// `requests` pairs each cloth's span with its group. Spans must be sorted
    /// and disjoint and every group may be requested once.
    pub fn cloth_views_mut(&mut self, requests: &[(ParticleRange, GroupId)]) -> Vec<ClothView<'_>> {
        let spans: Vec<ParticleRange> = requests.iter().map(|&(span, _)| span).collect();

        let mut constraints: Vec<Vec<&mut ConstraintSet>> = spans.iter().map(|_| Vec::new()).collect();
        for (&offset, state) in self.ranges.iter_mut() {
            if let Some(k) = spans.iter().position(|s| s.indices().contains(&offset)) {
                constraints[k].push(&mut state.constraints);
            }
        }

        let mut group_slots: Vec<Option<&mut GroupProperties>> = self.groups.iter_mut().map(Some).collect();
        let groups: Vec<&mut GroupProperties> = requests
            .iter()
            .map(|&(_, g)| {
                group_slots
                    .get_mut(g as usize)
                    .and_then(Option::take)
                    .unwrap_or_else(|| panic!("group {g} is unknown or requested by two cloths"))
            })
            .collect();

        self.particles
            .spans_mut(&spans)
            .into_iter()
            .zip(constraints)
            .zip(groups)
            .map(|((particles, constraints), group)| ClothView {
                particles,
                constraints,
                group,
            })
            .collect()
    }

    /// Move every active range into this frame's reference frame.
    ///
    /// Per group: `X = M(X) - ΔL`, `V = rot(M) V` and the previous animation
    /// target like `X`, where `M` is the group's pre-simulation transform and
    /// `ΔL` the local-space shift since the last frame. Ranges that were reset
    /// this frame are already in the new frame and are skipped. Previous
    /// collider transforms get `T(-ΔL) M` on the left.
    pub fn apply_pre_simulation_transforms(&mut self) {
        let delta = self.local_space_location - self.old_local_space_location;

        let mut jobs = Vec::new();
        for record in self.particles.records_mut() {
            if record.active {
                let transform = self
                    .groups
                    .get(record.group as usize)
                    .map_or(RigidTransform::IDENTITY, |g| g.pre_simulation_transform);
                jobs.push((
                    record.range,
                    transform,
                    record.positions_rebased,
                    record.animation_rebased,
                ));
            }
            record.positions_rebased = false;
            record.animation_rebased = false;
        }

        let spans: Vec<ParticleRange> = jobs.iter().map(|job| job.0).collect();
        let views = self.particles.spans_mut(&spans);
        let work: Vec<_> = views.into_iter().zip(jobs).collect();

        #[cfg(feature = "parallel")]
        work.into_par_iter()
            .for_each(|(view, (_, transform, positions, animation))| {
                rebase_span(view, transform, delta, positions, animation)
            });

        #[cfg(not(feature = "parallel"))]
        work.into_iter()
            .for_each(|(view, (_, transform, positions, animation))| {
                rebase_span(view, transform, delta, positions, animation)
            });

        let shift = RigidTransform::from_translation(-delta);
        for (g, props) in self.groups.iter().enumerate() {
            self.collision
                .transform_old_poses(g as GroupId, shift * props.pre_simulation_transform);
        }
        self.collision.clear_rebased();
    }

    /// Run the frame's substeps over every active range.
    pub fn advance(&mut self, dt: f32) -> StepStats {
        let substeps = self.substeps;
        let iterations = self.policy.iterations_for(dt);
        tracing::trace!(substeps, iterations, dt, "advancing particles");
        let mut stats = StepStats {
            substeps,
            iterations,
            ..Default::default()
        };
        if dt <= 0.0 {
            return stats;
        }

        let active: Vec<(ParticleRange, GroupId)> = self
            .particles
            .records()
            .iter()
            .filter(|r| r.active)
            .map(|r| (r.range, r.group))
            .collect();
        let spans: Vec<ParticleRange> = active.iter().map(|&(range, _)| range).collect();

        let collision = &self.collision;
        let groups = &self.groups;
        let default_group = GroupProperties::default();
        let states: Vec<&mut RangeState> = self
            .ranges
            .iter_mut()
            .filter(|(offset, _)| spans.iter().any(|s| s.offset() == **offset))
            .map(|(_, state)| state)
            .collect();
        debug_assert_eq!(states.len(), spans.len());

        let work: Vec<RangeStep<'_>> = self
            .particles
            .spans_mut(&spans)
            .into_iter()
            .zip(states)
            .zip(&active)
            .map(|((view, state), &(_, group))| RangeStep {
                view,
                state,
                group: groups.get(group as usize).unwrap_or(&default_group),
                colliders: collision.group_poses(group),
            })
            .collect();

        let wind_model = self.wind_model;

        #[cfg(feature = "parallel")]
        let totals = work
            .into_par_iter()
            .map(|step| step.run(dt, substeps, iterations, wind_model))
            .reduce(StepStats::default, StepStats::merge);

        #[cfg(not(feature = "parallel"))]
        let totals = work
            .into_iter()
            .map(|step| step.run(dt, substeps, iterations, wind_model))
            .fold(StepStats::default(), StepStats::merge);

        stats = stats.merge(totals);
        stats
    }

    /// Remember this frame's local-space origin for the next frame's delta.
    pub fn end_frame(&mut self) {
        self.old_local_space_location = self.local_space_location;
    }

    pub fn calculate_bounds(&self) -> Bounds {
        self.particles.calculate_bounds()
    }
}

/// Skipped parts are already expressed in the current frame.
fn rebase_span(
    view: ParticleSpanMut<'_>,
    transform: RigidTransform,
    delta: Vec3,
    positions_rebased: bool,
    animation_rebased: bool,
) {
    if !positions_rebased {
        for x in view.x.iter_mut() {
            *x = transform.transform_point(*x) - delta;
        }
        for v in view.v.iter_mut() {
            *v = transform.rotation * *v;
        }
    }
    if !animation_rebased {
        for a in view.old_anim_x.iter_mut() {
            *a = transform.transform_point(*a) - delta;
        }
        for n in view.old_anim_n.iter_mut() {
            *n = transform.rotation * *n;
        }
    }
}

/// Everything one active range needs for its substeps.
struct RangeStep<'a> {
    view: ParticleSpanMut<'a>,
    state: &'a mut RangeState,
    group: &'a GroupProperties,
    colliders: Vec<ColliderPose<'a>>,
}

impl RangeStep<'_> {
    fn run(self, dt: f32, substeps: u32, iterations: u32, wind_model: WindModel) -> StepStats {
        let RangeStep {
            view,
            state,
            group,
            colliders,
        } = self;
        let count = view.x.len();
        let h = dt / substeps as f32;

        let mut target = vec![Vec3::ZERO; count];
        let mut prev_target = vec![Vec3::ZERO; count];
        let mut target_n = vec![Vec3::Z; count];
        let mut substep_colliders = Vec::with_capacity(colliders.len());

        let mut stats = StepStats {
            particle_count: count as u32,
            ..Default::default()
        };

        for s in 0..substeps {
            let alpha_start = s as f32 / substeps as f32;
            let alpha_end = (s + 1) as f32 / substeps as f32;
            for i in 0..count {
                prev_target[i] = view.old_anim_x[i].lerp(view.anim_x[i], alpha_start);
                target[i] = view.old_anim_x[i].lerp(view.anim_x[i], alpha_end);
                target_n[i] = view.old_anim_n[i].lerp(view.anim_n[i], alpha_end).normalize_or_zero();
            }

            for (v, &w) in view.v.iter_mut().zip(view.inv_m.iter()) {
                if w > 0.0 {
                    *v += group.gravity * h;
                }
            }
            state.velocity_field.apply(
                wind_model,
                &group.aerodynamics,
                group.wind_velocity,
                view.x,
                view.v,
                view.normal,
                view.inv_m,
                h,
            );
            apply_damping(view.v, view.inv_m, group.damping);
            apply_local_damping(view.x, view.v, view.inv_m, group.local_damping);

            for i in 0..count {
                view.p[i] = if view.inv_m[i] > 0.0 {
                    view.x[i] + view.v[i] * h
                } else {
                    target[i]
                };
            }

            stats.self_contact_count += state.constraints.begin_substep(view.p, iterations) as u32;
            state.collisions.begin_substep();
            substep_colliders.clear();
            substep_colliders.extend(
                colliders
                    .iter()
                    .map(|pose| SubstepCollider::from_pose(pose, alpha_start, alpha_end)),
            );

            for iteration in 0..iterations {
                let mut particles = SolverParticles {
                    p: &mut view.p[..],
                    x: &view.x[..],
                    inv_m: &view.inv_m[..],
                    anim_x: &target,
                    anim_n: &target_n,
                    old_anim_x: &prev_target,
                };
                state.constraints.apply(&mut particles, h);
                if !substep_colliders.is_empty() {
                    state.collisions.apply(
                        view.p,
                        view.x,
                        view.inv_m,
                        &substep_colliders,
                        group.collision_thickness,
                        group.use_ccd && iteration == 0,
                    );
                }
            }
            state.collisions.apply_friction(view.p, view.x, group.friction);
            stats.contact_count += state.collisions.num_contacts() as u32;

            let inv_h = 1.0 / h;
            for i in 0..count {
                view.v[i] = (view.p[i] - view.x[i]) * inv_h;
                view.x[i] = view.p[i];
            }
        }
        stats
    }
}
