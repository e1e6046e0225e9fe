use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::debug;

use crate::cloth::{Cloth, FrameContext};
use crate::collider::{ClothCollider, ColliderId};
use crate::command::SolverCommand;
use crate::config::SolverConfig;
use crate::error::ClothResult;
use crate::evolution::{ClothView, Evolution};
use crate::math::Bounds;
use crate::mesh::MeshAdapter;
use crate::particle::{GroupId, ParticleRange, ParticleStore};
use crate::quality::StepStats;

/// Handle of a cloth owned by a [`ClothSolver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClothId(u32);

impl ClothId {
    /// Each cloth owns the group with its own id.
    fn group(self) -> GroupId {
        self.0
    }
}

/// GPU-ready vertex of a simulated cloth, in world space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RenderVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Owns every cloth sharing one particle buffer and runs the frame.
pub struct ClothSolver {
    config: SolverConfig,
    evolution: Evolution,
    cloths: BTreeMap<ClothId, Cloth>,
    next_cloth: u32,
    next_collider: u32,
    sender: Sender<SolverCommand>,
    commands: Receiver<SolverCommand>,
    stats: StepStats,
}

impl ClothSolver {
    pub fn new(config: SolverConfig) -> Self {
        let (sender, commands) = mpsc::channel();
        Self {
            evolution: Evolution::new(&config),
            config,
            cloths: BTreeMap::new(),
            next_cloth: 0,
            next_collider: 0,
            sender,
            commands,
            stats: StepStats::default(),
        }
    }

    /// Same as [`new`](Self::new) after validating `config`.
    pub fn try_new(config: SolverConfig) -> ClothResult<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Switching the backstop model rebuilds every cloth.
    pub fn set_config(&mut self, config: SolverConfig) {
        let rebuild = config.backstop_model != self.config.backstop_model;
        self.evolution.set_config(&config);
        self.config = config;
        if rebuild {
            self.rebuild();
        }
    }

    /// Queue for deferred changes, drained at the start of every update.
    pub fn command_sender(&self) -> Sender<SolverCommand> {
        self.sender.clone()
    }

    pub fn add_cloth(&mut self, mut cloth: Cloth) -> ClothId {
        let id = ClothId(self.next_cloth);
        self.next_cloth += 1;
        cloth.add(&mut self.evolution, id.group(), self.config.backstop_model);
        self.cloths.insert(id, cloth);
        id
    }

    /// Detach a cloth. Every other cloth is rebuilt, which drops their
    /// velocities. Unknown ids are ignored.
    pub fn remove_cloth(&mut self, id: ClothId) -> Option<Cloth> {
        let mut cloth = self.cloths.remove(&id)?;
        cloth.unbind();
        debug!(?id, "cloth removed from solver");
        self.rebuild();
        Some(cloth)
    }

    /// Give a cloth a new mesh, or none. Rebuilds the solver.
    pub fn set_cloth_mesh(&mut self, id: ClothId, mesh: Option<Box<dyn MeshAdapter>>) {
        let Some(cloth) = self.cloths.get_mut(&id) else {
            return;
        };
        cloth.set_mesh(mesh);
        self.rebuild();
    }

    pub fn cloth(&self, id: ClothId) -> Option<&Cloth> {
        self.cloths.get(&id)
    }

    /// For driving the mesh and triggering reset or teleport directly.
    pub fn cloth_mut(&mut self, id: ClothId) -> Option<&mut Cloth> {
        self.cloths.get_mut(&id)
    }

    pub fn cloth_ids(&self) -> impl Iterator<Item = ClothId> + '_ {
        self.cloths.keys().copied()
    }

    /// Attach a collider to a cloth. Its collision particles are allocated
    /// on the next update.
    pub fn add_collider(&mut self, cloth: ClothId, collider: ClothCollider) -> Option<ColliderId> {
        let target = self.cloths.get_mut(&cloth)?;
        let id = ColliderId(self.next_collider);
        self.next_collider += 1;
        debug!(?cloth, collider = ?id, geometries = collider.num_geometries(), "collider added");
        target.add_collider(id, collider);
        Some(id)
    }

    /// Detach a collider. Unknown ids are ignored.
    pub fn remove_collider(&mut self, cloth: ClothId, collider: ColliderId) {
        let Some(target) = self.cloths.get_mut(&cloth) else {
            return;
        };
        if target.remove_collider(collider, self.evolution.collision_particles_mut()) {
            debug!(?cloth, ?collider, "collider removed");
        }
    }

    pub fn local_space_location(&self) -> Vec3 {
        self.evolution.local_space_location()
    }

    /// Move the solver's local-space origin. All particle data is stored
    /// relative to it; with `reset` every cloth also snaps to its animated pose.
    pub fn set_local_space_location(&mut self, location: Vec3, reset: bool) {
        self.evolution.set_local_space_location(location);
        if reset {
            for cloth in self.cloths.values_mut() {
                cloth.reset();
            }
        }
    }

    /// Advance every cloth by `dt` seconds.
    pub fn update(&mut self, dt: f32) -> StepStats {
        self.process_commands();
        self.evolution.swap_buffers();

        let location = self.evolution.local_space_location();
        for cloth in self.cloths.values_mut() {
            cloth.pre_update(self.evolution.collision_particles_mut(), location);
        }

        let ctx = FrameContext {
            gravity: self.config.gravity,
            enable_gravity_override: self.config.enable_gravity_override,
            wind_velocity: self.config.wind_velocity,
            local_space_location: location,
            old_local_space_location: self.evolution.old_local_space_location(),
        };
        self.for_each_cloth_view(|cloth, view| cloth.update(view, &ctx));

        self.evolution.apply_pre_simulation_transforms();
        self.stats = self.evolution.advance(dt);

        self.for_each_cloth_view(|cloth, view| cloth.post_update(view));
        self.evolution.end_frame();
        self.stats
    }

    /// Counters of the last update.
    pub fn stats(&self) -> StepStats {
        self.stats
    }

    fn process_commands(&mut self) {
        let mut rebuild = false;
        while let Ok(command) = self.commands.try_recv() {
            match command {
                SolverCommand::Cloth { cloth, command } => match self.cloths.get_mut(&cloth) {
                    Some(target) => rebuild |= command.apply(target),
                    None => debug!(?cloth, "command for unknown cloth dropped"),
                },
                SolverCommand::SetGravity(gravity) => self.config.gravity = gravity,
                SolverCommand::SetWindVelocity(wind) => self.config.wind_velocity = wind,
                SolverCommand::SetLocalSpaceLocation { location, reset } => {
                    self.set_local_space_location(location, reset)
                }
            }
        }
        if rebuild {
            self.rebuild();
        }
    }

    /// Drop all particles and collision particles and add every cloth again
    /// in id order.
    fn rebuild(&mut self) {
        self.evolution.reset_particles();
        self.evolution.collision_particles_mut().reset();
        let backstop_model = self.config.backstop_model;
        for (id, cloth) in &mut self.cloths {
            cloth.add(&mut self.evolution, id.group(), backstop_model);
        }
        debug!(cloths = self.cloths.len(), "solver rebuilt");
    }

    /// Run `f` once per bound cloth with exclusive access to its particles,
    /// constraint sets and group.
    fn for_each_cloth_view<F>(&mut self, f: F)
    where
        F: Fn(&mut Cloth, &mut ClothView<'_>) + Send + Sync,
    {
        let requests: Vec<(ParticleRange, GroupId)> = self.cloths.values().filter_map(Cloth::span).collect();
        let views = self.evolution.cloth_views_mut(&requests);
        let work: Vec<(&mut Cloth, ClothView<'_>)> = self
            .cloths
            .values_mut()
            .filter(|cloth| cloth.span().is_some())
            .zip(views)
            .collect();

        #[cfg(feature = "parallel")]
        work.into_par_iter().for_each(|(cloth, mut view)| f(cloth, &mut view));

        #[cfg(not(feature = "parallel"))]
        for (cloth, mut view) in work {
            f(cloth, &mut view);
        }
    }

    // Debug accessors. Values are those of the last update and are in solver
    // local space unless noted.

    pub fn particles(&self) -> &ParticleStore {
        self.evolution.particles()
    }

    fn active_slice<'a, T>(&'a self, id: ClothId, data: &'a [T]) -> Option<&'a [T]> {
        let range = self.cloths.get(&id)?.active_range()?;
        Some(&data[range.indices()])
    }

    pub fn positions(&self, id: ClothId) -> Option<&[Vec3]> {
        self.active_slice(id, &self.evolution.particles().x)
    }

    pub fn velocities(&self, id: ClothId) -> Option<&[Vec3]> {
        self.active_slice(id, &self.evolution.particles().v)
    }

    pub fn normals(&self, id: ClothId) -> Option<&[Vec3]> {
        self.active_slice(id, &self.evolution.particles().normal)
    }

    pub fn inverse_masses(&self, id: ClothId) -> Option<&[f32]> {
        self.active_slice(id, &self.evolution.particles().inv_m)
    }

    pub fn animation_positions(&self, id: ClothId) -> Option<&[Vec3]> {
        self.active_slice(id, &self.evolution.particles().anim_x)
    }

    /// Bounds over every active particle.
    pub fn bounds(&self) -> Bounds {
        self.evolution.calculate_bounds()
    }

    /// Active LOD vertices, shifted back to world space.
    pub fn render_vertices(&self, id: ClothId) -> Vec<RenderVertex> {
        let (Some(positions), Some(normals)) = (self.positions(id), self.normals(id)) else {
            return Vec::new();
        };
        let origin = self.evolution.local_space_location();
        positions
            .iter()
            .zip(normals)
            .map(|(&x, &n)| RenderVertex {
                position: (x + origin).to_array(),
                normal: n.to_array(),
            })
            .collect()
    }

    /// Triangle indices of the active LOD, matching [`render_vertices`](Self::render_vertices).
    pub fn render_indices(&self, id: ClothId) -> Vec<u32> {
        self.cloths
            .get(&id)
            .and_then(Cloth::triangle_mesh)
            .map(|mesh| mesh.elements().iter().flatten().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ClothCommand;
    use crate::config::ClothConfig;
    use crate::mesh::grid::GridMesh;

    fn solver() -> ClothSolver {
        ClothSolver::new(SolverConfig::default())
    }

    fn grid_cloth() -> Cloth {
        Cloth::new(ClothConfig::default()).with_mesh(GridMesh::new(20.0, 20.0, &[(2, 2)]).pin_top_row(100.0))
    }

    #[test]
    fn test_render_vertex_layout() {
        assert_eq!(std::mem::size_of::<RenderVertex>(), 24);
        let v = [RenderVertex::default(); 2];
        assert_eq!(bytemuck::cast_slice::<RenderVertex, f32>(&v).len(), 12);
    }

    #[test]
    fn test_first_update_activates_lod() {
        let mut solver = solver();
        let id = solver.add_cloth(grid_cloth());
        assert!(solver.positions(id).is_none());
        solver.update(1.0 / 60.0);
        assert_eq!(solver.cloth(id).unwrap().lod_index(), Some(0));
        assert_eq!(solver.positions(id).unwrap().len(), 9);
        assert_eq!(solver.render_indices(id).len(), 24);
        assert_eq!(solver.stats().particle_count, 9);
    }

    #[test]
    fn test_commands_apply_in_order_at_next_update() {
        let mut solver = solver();
        let id = solver.add_cloth(grid_cloth());
        let sender = solver.command_sender();
        let mut damping = ClothConfig::default().damping;
        damping.damping = 0.3;
        sender
            .send(SolverCommand::Cloth {
                cloth: id,
                command: ClothCommand::SetDamping(damping),
            })
            .unwrap();
        damping.damping = 0.5;
        sender
            .send(SolverCommand::Cloth {
                cloth: id,
                command: ClothCommand::SetDamping(damping),
            })
            .unwrap();
        assert_eq!(solver.cloth(id).unwrap().config().damping.damping, 0.01);
        solver.update(1.0 / 60.0);
        assert_eq!(solver.cloth(id).unwrap().config().damping.damping, 0.5);
    }

    #[test]
    fn test_remove_unknown_cloth_is_noop() {
        let mut solver = solver();
        let id = solver.add_cloth(grid_cloth());
        assert!(solver.remove_cloth(id).is_some());
        assert!(solver.remove_cloth(id).is_none());
        assert!(solver.particles().is_empty());
    }

    #[test]
    fn test_removing_cloth_rebuilds_others() {
        let mut solver = solver();
        let a = solver.add_cloth(grid_cloth());
        let b = solver.add_cloth(grid_cloth());
        solver.update(1.0 / 60.0);
        solver.remove_cloth(a);
        assert_eq!(solver.cloth(b).unwrap().lod_range(0).unwrap().offset(), 0);
        solver.update(1.0 / 60.0);
        assert_eq!(solver.positions(b).unwrap().len(), 9);
    }
}
