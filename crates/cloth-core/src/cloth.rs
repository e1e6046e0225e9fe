//! One simulated cloth: LOD bookkeeping, constraint setup and the per-frame
//! update that feeds the shared solver.

use std::ops::Range;

use glam::{Quat, Vec3};
use tracing::debug;

use crate::collider::{ClothCollider, ColliderId};
use crate::collision::CollisionParticles;
use crate::config::{BackstopModel, ClothConfig, MassMode};
use crate::constraints::anim_drive::AnimDriveConstraints;
use crate::constraints::area::AreaConstraints;
use crate::constraints::backstop::BackstopConstraints;
use crate::constraints::bending::BendingElements;
use crate::constraints::edge::SpringConstraints;
use crate::constraints::long_range::LongRangeConstraints;
use crate::constraints::max_distance::{MaxDistanceConstraints, KINEMATIC_DISTANCE_THRESHOLD};
use crate::constraints::self_collision::SelfCollisionConstraints;
use crate::constraints::shape_target::ShapeTargetConstraints;
use crate::constraints::volume::VolumeConstraint;
use crate::constraints::{element_weights, BendingConstraints, ConstraintSet, VolumeConstraints};
use crate::error::ClothResult;
use crate::evolution::{ClothView, Evolution};
use crate::forces::VelocityField;
use crate::math::RigidTransform;
use crate::mesh::topology::{InteriorEdge, Topology};
use crate::mesh::{MeshAdapter, TriangleMesh, WeightMapTarget, WeightMaps};
use crate::particle::{GroupId, ParticleRange, ParticleSpanMut};

/// Solver-wide values a cloth reads during its update.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FrameContext {
    pub gravity: Vec3,
    pub enable_gravity_override: bool,
    pub wind_velocity: Vec3,
    pub local_space_location: Vec3,
    pub old_local_space_location: Vec3,
}

struct ClothLod {
    mesh: TriangleMesh,
    topology: Topology,
}

/// Where a cloth lives inside its solver.
struct SolverBinding {
    group: GroupId,
    /// One range per LOD, `None` for LODs without points.
    lod_ranges: Vec<Option<ParticleRange>>,
    lod_index: Option<usize>,
    /// World-space reference bone at the previous update.
    old_reference: Option<RigidTransform>,
}

impl SolverBinding {
    fn range(&self, lod: Option<usize>) -> Option<ParticleRange> {
        lod.and_then(|l| self.lod_ranges.get(l).copied().flatten())
    }

    fn span(&self) -> Option<ParticleRange> {
        self.lod_ranges
            .iter()
            .flatten()
            .copied()
            .reduce(|a, b| a.cover(&b))
    }
}

/// A cloth instance.
///
/// The states are: no mesh, bound without an active LOD, and bound with one
/// active LOD. Only the active LOD's particles and constraints take part in
/// the solve; the other LODs stay allocated and disabled.
pub struct Cloth {
    mesh: Option<Box<dyn MeshAdapter>>,
    lods: Vec<ClothLod>,
    config: ClothConfig,
    colliders: Vec<(ColliderId, ClothCollider)>,
    binding: Option<SolverBinding>,
    needs_reset: bool,
    needs_teleport: bool,
}

impl Cloth {
    pub fn new(config: ClothConfig) -> Self {
        Self {
            mesh: None,
            lods: Vec::new(),
            config,
            colliders: Vec::new(),
            binding: None,
            needs_reset: false,
            needs_teleport: false,
        }
    }

    pub fn with_mesh(mut self, mesh: impl MeshAdapter) -> Self {
        let mesh: Box<dyn MeshAdapter> = Box::new(mesh);
        self.set_mesh(Some(mesh));
        self
    }

    /// Replace the mesh and rebuild every LOD's topology. The cloth has to be
    /// added to its solver again afterwards.
    pub(crate) fn set_mesh(&mut self, mesh: Option<Box<dyn MeshAdapter>>) {
        self.lods = mesh.as_deref().map(build_lods).unwrap_or_default();
        self.mesh = mesh;
        self.unbind();
    }

    pub fn mesh(&self) -> Option<&dyn MeshAdapter> {
        self.mesh.as_deref()
    }

    /// Downcast the mesh to drive its animation between updates.
    ///
    /// Changing topology through this handle is not supported; hand the
    /// solver a new mesh instead.
    pub fn mesh_mut<T: MeshAdapter>(&mut self) -> Option<&mut T> {
        self.mesh.as_mut()?.as_any_mut().downcast_mut::<T>()
    }

    pub fn config(&self) -> &ClothConfig {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut ClothConfig {
        &mut self.config
    }

    /// Snap to the animated pose with zero velocity on the next update.
    pub fn reset(&mut self) {
        self.needs_reset = true;
    }

    /// Ignore the reference bone motion of the next update.
    pub fn teleport(&mut self) {
        self.needs_teleport = true;
    }

    pub fn num_lods(&self) -> usize {
        self.lods.len()
    }

    /// Currently simulated LOD.
    pub fn lod_index(&self) -> Option<usize> {
        self.binding.as_ref().and_then(|b| b.lod_index)
    }

    pub fn group(&self) -> Option<GroupId> {
        self.binding.as_ref().map(|b| b.group)
    }

    pub fn lod_range(&self, lod: usize) -> Option<ParticleRange> {
        self.binding.as_ref().and_then(|b| b.range(Some(lod)))
    }

    /// Particle range of the simulated LOD.
    pub fn active_range(&self) -> Option<ParticleRange> {
        self.binding.as_ref().and_then(|b| b.range(b.lod_index))
    }

    pub fn triangle_mesh(&self) -> Option<&TriangleMesh> {
        self.lod_index().map(|lod| &self.lods[lod].mesh)
    }

    pub fn weight_maps(&self) -> Option<&WeightMaps> {
        let lod = self.lod_index()?;
        self.mesh.as_deref().map(|mesh| mesh.weight_maps(lod))
    }

    /// Covering range of all LODs together with the cloth's group.
    pub(crate) fn span(&self) -> Option<(ParticleRange, GroupId)> {
        let binding = self.binding.as_ref()?;
        binding.span().map(|span| (span, binding.group))
    }

    pub fn collider(&self, id: ColliderId) -> Option<&ClothCollider> {
        self.colliders.iter().find(|(c, _)| *c == id).map(|(_, collider)| collider)
    }

    pub(crate) fn collider_mut(&mut self, id: ColliderId) -> Option<&mut ClothCollider> {
        self.colliders
            .iter_mut()
            .find(|(c, _)| *c == id)
            .map(|(_, collider)| collider)
    }

    pub(crate) fn add_collider(&mut self, id: ColliderId, collider: ClothCollider) {
        self.colliders.push((id, collider));
    }

    /// Returns false when `id` is not attached to this cloth.
    pub(crate) fn remove_collider(&mut self, id: ColliderId, collision: &mut CollisionParticles) -> bool {
        let Some(index) = self.colliders.iter().position(|(c, _)| *c == id) else {
            return false;
        };
        let (_, mut collider) = self.colliders.remove(index);
        collider.remove(collision);
        true
    }

    /// Forget all solver state, after the solver dropped its buffers.
    pub(crate) fn unbind(&mut self) {
        self.binding = None;
        for (_, collider) in &mut self.colliders {
            collider.clear_ranges();
        }
    }

    /// Allocate one disabled particle range per LOD, seed it from the
    /// animated pose and build its constraints.
    pub(crate) fn add(&mut self, evolution: &mut Evolution, group: GroupId, backstop_model: BackstopModel) {
        self.unbind();
        let Some(mesh) = self.mesh.as_deref() else {
            return;
        };
        let to_local = component_to_local(mesh, evolution.local_space_location());

        let mut lod_ranges = Vec::with_capacity(self.lods.len());
        for (lod, data) in self.lods.iter().enumerate() {
            let range = evolution.add_particles(data.mesh.num_points(), group);
            if let Some(range) = range {
                init_lod(evolution, mesh, lod, data, range, &self.config, to_local, backstop_model);
            }
            lod_ranges.push(range);
        }

        debug!(
            group,
            num_lods = self.lods.len(),
            particles = lod_ranges.iter().flatten().map(ParticleRange::count).sum::<usize>(),
            "cloth added to solver"
        );
        self.binding = Some(SolverBinding {
            group,
            lod_ranges,
            lod_index: None,
            old_reference: None,
        });
    }

    /// Bring the colliders up to date before any cloth update reads them.
    pub(crate) fn pre_update(&mut self, collision: &mut CollisionParticles, local_space_location: Vec3) {
        let (Some(mesh), Some(binding)) = (self.mesh.as_deref(), self.binding.as_ref()) else {
            return;
        };
        let lod = desired_lod(mesh, self.config.lod_override);
        let to_local = component_to_local(mesh, local_space_location);
        for (_, collider) in &mut self.colliders {
            collider.update(collision, binding.group, lod, mesh, to_local);
        }
    }

    /// Skin the animation target, switch LODs, push properties into the
    /// active constraint set and the group, and compute the group's
    /// pre-simulation transform.
    pub(crate) fn update(&mut self, view: &mut ClothView<'_>, ctx: &FrameContext) {
        let (Some(mesh), Some(binding)) = (self.mesh.as_deref(), self.binding.as_mut()) else {
            return;
        };
        let config = &self.config;
        let desired = desired_lod(mesh, config.lod_override);
        let previous = binding.lod_index;

        if let (Some(lod), Some(range)) = (desired, binding.range(desired)) {
            let r = view.particles.local(range);
            let particles = &mut view.particles;
            mesh.update(previous, lod, &mut particles.anim_x[r.clone()], &mut particles.anim_n[r.clone()]);
            transform_targets(
                component_to_local(mesh, ctx.local_space_location),
                &mut particles.anim_x[r.clone()],
                &mut particles.anim_n[r],
            );
        }

        if desired != previous {
            switch_lod(mesh, binding, view, previous, desired);
            binding.lod_index = desired;
        }

        let reference = mesh.component_transform() * mesh.reference_bone_transform();
        let Some(active) = binding.range(binding.lod_index) else {
            view.group.pre_simulation_transform = RigidTransform::IDENTITY;
            binding.old_reference = Some(reference);
            self.needs_reset = false;
            self.needs_teleport = false;
            return;
        };

        if self.needs_reset {
            view.particles.reset_start_pose(active);
        }

        apply_properties(view.constraints_mut(active), config);

        let group = &mut *view.group;
        group.gravity = if ctx.enable_gravity_override && config.gravity.use_override {
            config.gravity.override_gravity
        } else {
            ctx.gravity * config.gravity.scale
        };
        group.wind_velocity = ctx.wind_velocity;
        group.aerodynamics = config.aerodynamics;
        group.damping = config.damping.damping;
        group.local_damping = config.damping.local_damping;
        group.collision_thickness = config.collision.thickness;
        group.friction = config.collision.friction;
        group.use_ccd = config.collision.use_ccd;

        let (linear, angular) = if self.needs_reset {
            (Vec3::ONE, 1.0)
        } else if self.needs_teleport {
            (Vec3::ZERO, 0.0)
        } else {
            (config.velocity_scale.linear, config.velocity_scale.angular)
        };
        group.pre_simulation_transform = match binding.old_reference {
            Some(old) => velocity_scale_transform(old, reference, ctx.old_local_space_location, linear, angular),
            None => RigidTransform::IDENTITY,
        };
        binding.old_reference = Some(reference);
        self.needs_reset = false;
        self.needs_teleport = false;
    }

    /// Recompute the active LOD's normals from the solved positions.
    pub(crate) fn post_update(&self, view: &mut ClothView<'_>) {
        let Some(binding) = &self.binding else {
            return;
        };
        let (Some(lod), Some(range)) = (binding.lod_index, binding.range(binding.lod_index)) else {
            return;
        };
        let r = view.particles.local(range);
        let particles = &mut view.particles;
        self.lods[lod]
            .mesh
            .compute_point_normals(&particles.x[r.clone()], &mut particles.normal[r]);
    }
}

fn build_lods(mesh: &dyn MeshAdapter) -> Vec<ClothLod> {
    (0..mesh.num_lods())
        .map(|lod| {
            let triangles = TriangleMesh::from_indices(mesh.indices(lod), mesh.num_points(lod));
            let topology = Topology::build(&triangles);
            ClothLod {
                mesh: triangles,
                topology,
            }
        })
        .collect()
}

/// LOD the cloth should simulate this frame.
fn desired_lod(mesh: &dyn MeshAdapter, lod_override: Option<usize>) -> Option<usize> {
    lod_override
        .or_else(|| mesh.lod_index())
        .filter(|&lod| lod < mesh.num_lods())
}

/// Component space to solver local space.
fn component_to_local(mesh: &dyn MeshAdapter, local_space_location: Vec3) -> RigidTransform {
    RigidTransform::from_translation(-local_space_location) * mesh.component_transform()
}

fn transform_targets(transform: RigidTransform, positions: &mut [Vec3], normals: &mut [Vec3]) {
    for x in positions {
        *x = transform.transform_point(*x);
    }
    for n in normals {
        *n = transform.rotation * *n;
    }
}

#[allow(clippy::too_many_arguments)]
fn init_lod(
    evolution: &mut Evolution,
    mesh: &dyn MeshAdapter,
    lod: usize,
    data: &ClothLod,
    range: ParticleRange,
    config: &ClothConfig,
    to_local: RigidTransform,
    backstop_model: BackstopModel,
) {
    let r = range.indices();
    let particles = evolution.particles_mut();
    mesh.update(None, lod, &mut particles.anim_x[r.clone()], &mut particles.anim_n[r.clone()]);
    transform_targets(to_local, &mut particles.anim_x[r.clone()], &mut particles.anim_n[r.clone()]);
    evolution.reset_start_pose(range);

    let maps = mesh.weight_maps(lod);
    let max_distance = maps.get_sized(WeightMapTarget::MaxDistance, range.count());
    let is_kinematic = |i: usize| max_distance.is_some_and(|m| m[i] < KINEMATIC_DISTANCE_THRESHOLD);
    let min_mass = config.mass.min_per_particle_mass;
    let particles = evolution.particles_mut();
    match config.mass.mode {
        MassMode::Uniform(mass) => {
            particles.set_particle_mass_uniform(range, mass, min_mass, &data.mesh, is_kinematic)
        }
        MassMode::TotalMass(mass) => {
            particles.set_particle_mass_from_total_mass(range, mass, min_mass, &data.mesh, is_kinematic)
        }
        MassMode::Density(density) => {
            particles.set_particle_mass_from_density(range, density, min_mass, &data.mesh, is_kinematic)
        }
    }

    let inv_m = evolution.particles().inv_m[r].to_vec();
    let set = evolution.constraints_mut(range);
    build_constraints(set, data, mesh.rest_positions(lod), maps, &inv_m, config, backstop_model);
    set.create_rules();
    evolution.set_velocity_field(range, VelocityField::new(&data.mesh));
}

fn build_constraints(
    set: &mut ConstraintSet,
    lod: &ClothLod,
    rest: &[Vec3],
    maps: &WeightMaps,
    inv_m: &[f32],
    config: &ClothConfig,
    backstop_model: BackstopModel,
) {
    let n = inv_m.len();
    let map = move |target: WeightMapTarget| maps.get_sized(target, n);
    let material = &config.material;
    let topology = &lod.topology;
    let triangles = lod.mesh.elements();

    set.set_edge_constraints(SpringConstraints::new(
        &topology.edges,
        rest,
        element_weights(map(WeightMapTarget::EdgeStiffness), &topology.edges),
        material.use_xpbd_edges,
    ));

    let bending = if material.use_bending_elements {
        let elements: Vec<[u32; 4]> = topology
            .interior_edges
            .iter()
            .map(InteriorEdge::as_element)
            .collect();
        let weights = element_weights(map(WeightMapTarget::BendingStiffness), &elements);
        BendingConstraints::Elements(BendingElements::new(&elements, rest, weights))
    } else {
        let pairs = topology.bending_pairs();
        let weights = element_weights(map(WeightMapTarget::BendingStiffness), &pairs);
        BendingConstraints::Springs(SpringConstraints::new(&pairs, rest, weights, false))
    };
    set.set_bending_constraints(bending);

    set.set_area_constraints(AreaConstraints::new(
        triangles,
        rest,
        element_weights(map(WeightMapTarget::AreaStiffness), triangles),
    ));

    if material.volume_stiffness > 0.0 {
        let volume = if material.use_thin_shell_volume {
            let pairs = topology.second_neighbor_pairs();
            VolumeConstraints::ThinShell(SpringConstraints::new(&pairs, rest, None, false))
        } else {
            VolumeConstraints::Enclosed(VolumeConstraint::new(triangles, rest))
        };
        set.set_volume_constraints(volume);
    }

    if config.tether.enabled {
        set.set_long_range_constraints(LongRangeConstraints::new(
            &topology.neighbors,
            rest,
            inv_m,
            map(WeightMapTarget::TetherStiffness),
            config.tether.mode,
        ));
    }

    if let Some(distances) = map(WeightMapTarget::MaxDistance) {
        set.set_max_distance_constraints(MaxDistanceConstraints::new(distances));
    }
    if let (Some(distances), Some(radii)) = (
        map(WeightMapTarget::BackstopDistance),
        map(WeightMapTarget::BackstopRadius),
    ) {
        set.set_backstop_constraints(BackstopConstraints::new(distances, radii, backstop_model));
    }

    set.set_anim_drive_constraints(AnimDriveConstraints::new(
        n,
        map(WeightMapTarget::AnimDriveStiffness),
        map(WeightMapTarget::AnimDriveDamping),
    ));
    set.set_shape_target_constraints(ShapeTargetConstraints::new(&topology.edges));

    if config.collision.use_self_collisions {
        set.set_self_collision_constraints(SelfCollisionConstraints::new(
            topology,
            config.collision.self_collision_thickness,
            config.collision.self_collision_stiffness,
        ));
    }
}

fn apply_properties(set: &mut ConstraintSet, config: &ClothConfig) {
    let material = &config.material;
    set.set_edge_properties(material.edge_stiffness);
    set.set_bending_properties(material.bending_stiffness);
    set.set_area_properties(material.area_stiffness);
    set.set_volume_properties(material.volume_stiffness);
    set.set_long_range_properties(config.tether.stiffness, config.tether.scale);
    set.set_max_distance_properties(config.max_distance.scale);
    set.set_backstop_properties(config.max_distance.backstop_scale);
    set.set_anim_drive_properties(config.anim_drive.stiffness, config.anim_drive.damping);
    set.set_shape_target_properties(material.shape_target_stiffness);
    set.set_self_collision_properties(
        config.collision.self_collision_thickness,
        config.collision.self_collision_stiffness,
    );
}

/// Whether going from `old` to `new` changes what [`Cloth::add`] builds,
/// as opposed to values refreshed every update.
pub(crate) fn changes_topology(old: &ClothConfig, new: &ClothConfig) -> bool {
    let (a, b) = (&old.material, &new.material);
    a.use_xpbd_edges != b.use_xpbd_edges
        || a.use_bending_elements != b.use_bending_elements
        || a.use_thin_shell_volume != b.use_thin_shell_volume
        || (a.volume_stiffness > 0.0) != (b.volume_stiffness > 0.0)
        || old.tether.enabled != new.tether.enabled
        || old.tether.mode != new.tether.mode
        || old.collision.use_self_collisions != new.collision.use_self_collisions
        || old.mass != new.mass
}

fn switch_lod(
    mesh: &dyn MeshAdapter,
    binding: &SolverBinding,
    view: &mut ClothView<'_>,
    previous: Option<usize>,
    desired: Option<usize>,
) {
    let old_range = binding.range(previous);
    if let Some(old) = old_range {
        view.particles.set_active(old, false);
        view.constraints_mut(old).enable(false);
    }
    let Some(new) = binding.range(desired) else {
        debug!(from = ?previous, to = ?desired, "cloth has no active LOD");
        return;
    };
    view.particles.set_active(new, true);
    view.constraints_mut(new).enable(true);

    let wrapped = match (previous, desired, old_range) {
        (Some(from), Some(to), Some(old)) => Some(wrap_lod(mesh, from, to, old, new, &mut view.particles)),
        _ => None,
    };
    match wrapped {
        Some(Ok(())) => {
            let r = view.particles.local(new);
            let particles = &mut view.particles;
            particles.p[r.clone()].copy_from_slice(&particles.x[r.clone()]);
            particles.old_anim_x[r.clone()].copy_from_slice(&particles.anim_x[r.clone()]);
            particles.old_anim_n[r.clone()].copy_from_slice(&particles.anim_n[r]);
            particles.mark_animation_rebased(new);
            debug!(from = ?previous, to = ?desired, "cloth LOD switched with wrap deformation");
        }
        Some(Err(err)) => {
            view.particles.reset_start_pose(new);
            debug!(from = ?previous, to = ?desired, %err, "cloth LOD switched, pose reset");
        }
        None => {
            view.particles.reset_start_pose(new);
            debug!(to = ?desired, "cloth LOD activated");
        }
    }
}

/// Carry positions and velocities from `old` onto `new` through the mesh's
/// LOD mapping.
fn wrap_lod(
    mesh: &dyn MeshAdapter,
    from: usize,
    to: usize,
    old: ParticleRange,
    new: ParticleRange,
    particles: &mut ParticleSpanMut<'_>,
) -> ClothResult<()> {
    let (src, dst) = (particles.local(old), particles.local(new));
    let (src_x, dst_x) = split_disjoint(&mut particles.x[..], src.clone(), dst.clone());
    let (src_v, dst_v) = split_disjoint(&mut particles.v[..], src.clone(), dst);
    mesh.wrap_deform_lod(from, to, &particles.normal[src], src_x, src_v, dst_x, dst_v)
}

/// Two non-overlapping windows of one slice.
fn split_disjoint<T>(slice: &mut [T], a: Range<usize>, b: Range<usize>) -> (&mut [T], &mut [T]) {
    debug_assert!(a.end <= b.start || b.end <= a.start);
    if a.start < b.start {
        let (head, tail) = slice.split_at_mut(b.start);
        (&mut head[a], &mut tail[..b.end - b.start])
    } else {
        let (head, tail) = slice.split_at_mut(a.start);
        (&mut tail[..a.end - a.start], &mut head[b])
    }
}

/// Pre-simulation transform carrying the cloth along with its reference bone.
///
/// `D = old⁻¹ · new` is the bone's motion in its own frame. Its translation is
/// scaled per axis by `1 - linear` and its rotation angle by `1 - angular`,
/// then it is conjugated into the previous local space. A scale of one leaves
/// the cloth where it was in world space, zero moves it rigidly with the bone.
pub(crate) fn velocity_scale_transform(
    old_reference: RigidTransform,
    reference: RigidTransform,
    old_local_space_location: Vec3,
    linear: Vec3,
    angular: f32,
) -> RigidTransform {
    let delta = old_reference.inverse() * reference;
    let (axis, mut angle) = delta.rotation.to_axis_angle();
    if angle > std::f32::consts::PI {
        angle -= std::f32::consts::TAU;
    }
    let scaled = RigidTransform::new(
        delta.translation * (Vec3::ONE - linear),
        Quat::from_axis_angle(axis, angle * (1.0 - angular)),
    );
    let frame = old_reference.translated(-old_local_space_location);
    frame * scaled * frame.inverse()
}
