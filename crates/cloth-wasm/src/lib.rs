use cloth_core::command::{ClothCommand, SolverCommand};
use cloth_core::config::ClothConfig;
use cloth_core::{Cloth, ClothCollider, ClothId, ClothSolver, CollisionSource, GridMesh, RenderVertex, RigidTransform, SolverConfig};
use glam::{Quat, Vec3};
use std::sync::mpsc::Sender;
use wasm_bindgen::prelude::*;

/// Seconds per gust cycle.
const GUST_PERIOD: f32 = 3.0;

/// A single hanging grid cloth driven from JavaScript.
///
/// The vertex buffer holds one [`RenderVertex`] (24 bytes: position, normal)
/// per simulated vertex and is rewritten after every step.
#[wasm_bindgen]
pub struct ClothWorld {
    solver: ClothSolver,
    cloth: ClothId,
    commands: Sender<SolverCommand>,
    vertices: Vec<RenderVertex>,
    indices: Vec<u32>,
    base_wind: Vec3,
    gust_strength: f32,
    gust_phase: f32,
    time: f32,
}

#[wasm_bindgen]
impl ClothWorld {
    /// `width` and `height` are in cm. The top row is pinned.
    #[wasm_bindgen(constructor)]
    pub fn new(width: f32, height: f32, columns: u32, rows: u32) -> ClothWorld {
        let (columns, rows) = (columns.max(1) as usize, rows.max(1) as usize);
        let cells = [(columns, rows), ((columns / 2).max(1), (rows / 2).max(1))];
        let mesh = GridMesh::new(width, height, &cells).pin_top_row(width.max(height));

        let mut solver = ClothSolver::new(SolverConfig::default());
        let cloth = solver.add_cloth(Cloth::new(ClothConfig::default()).with_mesh(mesh));
        let commands = solver.command_sender();

        web_sys::console::log_1(
            &format!(
                "WASM ClothWorld created: {}x{} cells, {} particles",
                columns,
                rows,
                solver.particles().len()
            )
            .into(),
        );

        let mut world = ClothWorld {
            solver,
            cloth,
            commands,
            vertices: Vec::new(),
            indices: Vec::new(),
            base_wind: Vec3::ZERO,
            gust_strength: 0.0,
            gust_phase: random_phase(),
            time: 0.0,
        };
        world.step(0.0);
        world
    }

    /// Advance by `dt` seconds. Returns the wall time spent in ms.
    #[wasm_bindgen]
    pub fn step(&mut self, dt: f32) -> f32 {
        let start = js_sys::Date::now();
        self.time += dt;
        let gust = 1.0 + self.gust_strength * (std::f32::consts::TAU * self.time / GUST_PERIOD + self.gust_phase).sin();
        self.send(SolverCommand::SetWindVelocity(self.base_wind * gust));
        self.solver.update(dt);
        self.write_render_output();
        (js_sys::Date::now() - start) as f32
    }

    #[wasm_bindgen]
    pub fn get_vertex_buffer_ptr(&self) -> *const f32 {
        bytemuck::cast_slice::<RenderVertex, f32>(&self.vertices).as_ptr()
    }

    #[wasm_bindgen]
    pub fn get_vertex_buffer_byte_length(&self) -> usize {
        bytemuck::cast_slice::<RenderVertex, u8>(&self.vertices).len()
    }

    #[wasm_bindgen]
    pub fn get_index_buffer_ptr(&self) -> *const u32 {
        self.indices.as_ptr()
    }

    #[wasm_bindgen]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    #[wasm_bindgen]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Currently simulated LOD, or -1.
    #[wasm_bindgen]
    pub fn lod_index(&self) -> i32 {
        self.solver
            .cloth(self.cloth)
            .and_then(Cloth::lod_index)
            .map_or(-1, |lod| lod as i32)
    }

    /// Force a LOD, or a negative value to follow the mesh.
    #[wasm_bindgen]
    pub fn set_lod_override(&mut self, lod: i32) {
        let lod = usize::try_from(lod).ok();
        self.send_cloth(ClothCommand::SetLodOverride(lod));
    }

    /// Wind in cm/s with a sinusoidal gust of relative `gust_strength`.
    #[wasm_bindgen]
    pub fn set_wind(&mut self, x: f32, y: f32, z: f32, gust_strength: f32) {
        self.base_wind = Vec3::new(x, y, z);
        self.gust_strength = gust_strength.clamp(0.0, 1.0);
    }

    #[wasm_bindgen]
    pub fn set_gravity(&mut self, x: f32, y: f32, z: f32) {
        self.send(SolverCommand::SetGravity(Vec3::new(x, y, z)));
    }

    #[wasm_bindgen]
    pub fn set_solver_config(&mut self, substeps: u32, iterations: u32) {
        let config = SolverConfig {
            substeps: substeps.max(1),
            iterations: iterations.max(1),
            max_iterations: iterations.max(1) * 4,
            ..self.solver.config().clone()
        };
        self.solver.set_config(config);
    }

    #[wasm_bindgen]
    pub fn set_damping(&mut self, damping: f32, local_damping: f32) {
        let mut properties = ClothConfig::default().damping;
        if let Some(cloth) = self.solver.cloth(self.cloth) {
            properties = cloth.config().damping;
        }
        properties.damping = damping.clamp(0.0, 1.0);
        properties.local_damping = local_damping.clamp(0.0, 1.0);
        self.send_cloth(ClothCommand::SetDamping(properties));
    }

    /// Move and rotate (about z, in radians) the bone the cloth hangs from.
    #[wasm_bindgen]
    pub fn set_anchor(&mut self, x: f32, y: f32, z: f32, yaw: f32) {
        let transform = RigidTransform::new(Vec3::new(x, y, z), Quat::from_rotation_z(yaw));
        if let Some(mesh) = self.solver.cloth_mut(self.cloth).and_then(|c| c.mesh_mut::<GridMesh>()) {
            mesh.set_reference_bone_transform(transform);
        }
    }

    /// Add a static sphere collider in world space.
    #[wasm_bindgen]
    pub fn add_sphere(&mut self, x: f32, y: f32, z: f32, radius: f32) {
        let source = CollisionSource {
            spheres: vec![cloth_core::collision::SphereSource {
                bone: None,
                center: Vec3::new(x, y, z),
                radius,
            }],
            ..Default::default()
        };
        self.solver.add_collider(self.cloth, ClothCollider::new(&source, Vec::new()));
    }

    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.send_cloth(ClothCommand::Reset);
    }

    #[wasm_bindgen]
    pub fn teleport(&mut self) {
        self.send_cloth(ClothCommand::Teleport);
    }
}

impl ClothWorld {
    fn send(&self, command: SolverCommand) {
        // The receiver lives in `self.solver`, so sending cannot fail.
        let _ = self.commands.send(command);
    }

    fn send_cloth(&self, command: ClothCommand) {
        self.send(SolverCommand::Cloth {
            cloth: self.cloth,
            command,
        });
    }

    fn write_render_output(&mut self) {
        self.vertices = self.solver.render_vertices(self.cloth);
        self.indices = self.solver.render_indices(self.cloth);
    }
}

fn random_phase() -> f32 {
    let mut seed = [0u8; 4];
    if getrandom::getrandom(&mut seed).is_err() {
        return 0.0;
    }
    u32::from_le_bytes(seed) as f32 / u32::MAX as f32 * std::f32::consts::TAU
}
