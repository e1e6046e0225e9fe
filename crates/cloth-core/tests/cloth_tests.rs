use cloth_core::config::{AerodynamicsProperties, ClothConfig};
use cloth_core::constraints::self_collision::{ExclusionSet, SELF_COLLISION_RING_DEPTH};
use cloth_core::mesh::topology::Topology;
use cloth_core::{Cloth, ClothCommand, ClothId, ClothSolver, GridMesh, RigidTransform, SolverCommand, SolverConfig, TriangleMesh};
use glam::{Quat, Vec3};

const DT: f32 = 1.0 / 60.0;

/// Free-falling sheet without drag, so every particle moves alike.
fn falling_sheet(solver: &mut ClothSolver, cells: &[(usize, usize)]) -> ClothId {
    let mut config = ClothConfig::default();
    config.aerodynamics = AerodynamicsProperties {
        drag: 0.0,
        lift: 0.0,
        ..Default::default()
    };
    solver.add_cloth(Cloth::new(config).with_mesh(GridMesh::new(20.0, 20.0, cells)))
}

fn mean(values: &[Vec3]) -> Vec3 {
    values.iter().copied().sum::<Vec3>() / values.len() as f32
}

/// Mean offset of the simulated particles from their animation target.
fn lag(solver: &ClothSolver, id: ClothId) -> Vec3 {
    mean(solver.positions(id).unwrap()) - mean(solver.animation_positions(id).unwrap())
}

fn move_reference_bone(solver: &mut ClothSolver, id: ClothId, translation: Vec3) {
    solver
        .cloth_mut(id)
        .unwrap()
        .mesh_mut::<GridMesh>()
        .unwrap()
        .set_reference_bone_transform(RigidTransform::from_translation(translation));
}

#[test]
fn test_reset_snaps_to_animation_and_drops_velocity() {
    let mut solver = ClothSolver::new(SolverConfig::default());
    let id = falling_sheet(&mut solver, &[(2, 2)]);
    for _ in 0..10 {
        solver.update(DT);
    }
    assert!(lag(&solver, id).z < -5.0);

    solver.cloth_mut(id).unwrap().reset();
    solver.update(DT);
    // One step of gravity after the snap.
    assert!(lag(&solver, id).length() < 1.0, "lag after reset {:?}", lag(&solver, id));
    assert!(mean(solver.velocities(id).unwrap()).length() < 20.0);
}

#[test]
fn test_reset_ignores_reference_jump() {
    let mut solver = ClothSolver::new(SolverConfig::default());
    let id = falling_sheet(&mut solver, &[(2, 2)]);
    for _ in 0..10 {
        solver.update(DT);
    }

    let jump = RigidTransform::new(Vec3::new(300.0, 50.0, 0.0), Quat::from_rotation_z(1.2));
    solver
        .cloth_mut(id)
        .unwrap()
        .mesh_mut::<GridMesh>()
        .unwrap()
        .set_reference_bone_transform(jump);
    solver.cloth_mut(id).unwrap().reset();
    solver.update(DT);

    // Only the gravity of the step after the snap remains.
    let g_dt = 980.665 * DT;
    let max_speed = solver
        .velocities(id)
        .unwrap()
        .iter()
        .map(|v| v.length())
        .fold(0.0f32, f32::max);
    assert!(max_speed < g_dt * 1.05, "max speed after reset {}", max_speed);
    let max_lag = solver
        .positions(id)
        .unwrap()
        .iter()
        .zip(solver.animation_positions(id).unwrap())
        .map(|(x, a)| (*x - *a).length())
        .fold(0.0f32, f32::max);
    assert!(max_lag < g_dt * DT * 2.0, "max lag after reset {}", max_lag);
}

#[test]
fn test_reset_requested_twice_equals_once() {
    let run = |resets: usize| {
        let mut solver = ClothSolver::new(SolverConfig::default());
        let id = falling_sheet(&mut solver, &[(3, 3)]);
        for _ in 0..10 {
            solver.update(DT);
        }
        for _ in 0..resets {
            solver.cloth_mut(id).unwrap().reset();
        }
        solver.update(DT);
        solver.positions(id).unwrap().to_vec()
    };
    assert_eq!(run(1), run(2));
}

#[test]
fn test_teleport_carries_cloth_and_keeps_velocity() {
    let mut solver = ClothSolver::new(SolverConfig::default());
    let id = falling_sheet(&mut solver, &[(2, 2)]);
    for _ in 0..10 {
        solver.update(DT);
    }
    let lag_before = lag(&solver, id);
    let speed_before = mean(solver.velocities(id).unwrap()).z;
    assert!(speed_before < -50.0);

    move_reference_bone(&mut solver, id, Vec3::new(500.0, 0.0, 0.0));
    solver.cloth_mut(id).unwrap().teleport();
    solver.update(DT);

    let lag_after = lag(&solver, id);
    assert!((lag_after.x - lag_before.x).abs() < 1.0, "teleport lag {:?}", lag_after);
    // Still falling, and further from the target than before.
    assert!(lag_after.z < lag_before.z);
    assert!(mean(solver.velocities(id).unwrap()).z < speed_before);
}

#[test]
fn test_moving_reference_without_teleport_lags() {
    let mut config = SolverConfig::default();
    config.gravity = Vec3::ZERO;
    let mut solver = ClothSolver::new(config);
    let id = falling_sheet(&mut solver, &[(2, 2)]);
    solver.update(DT);
    assert!(lag(&solver, id).length() < 1.0e-3);

    move_reference_bone(&mut solver, id, Vec3::new(400.0, 0.0, 0.0));
    solver.update(DT);
    // Default linear velocity scale keeps three quarters of the motion in world space.
    let lag = lag(&solver, id);
    assert!((lag.x + 300.0).abs() < 1.0, "lag {:?}", lag);
}

#[test]
fn test_lod_round_trip_wraps_state() {
    let mut solver = ClothSolver::new(SolverConfig::default());
    let id = falling_sheet(&mut solver, &[(4, 4), (2, 2)]);
    for _ in 0..10 {
        solver.update(DT);
    }
    assert_eq!(solver.cloth(id).unwrap().lod_index(), Some(0));
    let fine = solver.cloth(id).unwrap().lod_range(0).unwrap();
    let coarse = solver.cloth(id).unwrap().lod_range(1).unwrap();
    assert!(solver.particles().is_active(fine));
    assert!(!solver.particles().is_active(coarse));
    let lag_fine = lag(&solver, id);

    let sender = solver.command_sender();
    let set_lod = |lod| SolverCommand::Cloth {
        cloth: id,
        command: ClothCommand::SetLodOverride(Some(lod)),
    };
    sender.send(set_lod(1)).unwrap();
    solver.update(DT);
    assert_eq!(solver.cloth(id).unwrap().lod_index(), Some(1));
    assert!(solver.particles().is_active(coarse));
    assert!(!solver.particles().is_active(fine));
    assert_eq!(solver.positions(id).unwrap().len(), 9);
    // The coarse LOD continues the fall instead of restarting at the target.
    assert!(lag(&solver, id).z < lag_fine.z);

    sender.send(set_lod(0)).unwrap();
    solver.update(DT);
    assert_eq!(solver.cloth(id).unwrap().lod_index(), Some(0));
    assert!(solver.particles().is_active(fine));
    assert!(!solver.particles().is_active(coarse));
    assert_eq!(solver.positions(id).unwrap().len(), 25);
    assert!(lag(&solver, id).z < lag_fine.z);
}

#[test]
fn test_lod_round_trip_preserves_motion() {
    let mut solver = ClothSolver::new(SolverConfig::default());
    let id = falling_sheet(&mut solver, &[(4, 4), (2, 2)]);
    for _ in 0..10 {
        solver.update(DT);
    }
    let sender = solver.command_sender();
    sender.send(SolverCommand::SetGravity(Vec3::ZERO)).unwrap();
    solver.update(DT);
    let x0 = solver.positions(id).unwrap().to_vec();
    let v0 = solver.velocities(id).unwrap().to_vec();
    let speed = v0.iter().map(|v| v.length()).fold(0.0f32, f32::max);
    assert!(speed > 100.0);

    for lod in [1, 0] {
        sender
            .send(SolverCommand::Cloth {
                cloth: id,
                command: ClothCommand::SetLodOverride(Some(lod)),
            })
            .unwrap();
        solver.update(DT);
        assert_eq!(solver.cloth(id).unwrap().lod_index(), Some(lod));
    }

    let x1 = solver.positions(id).unwrap();
    let v1 = solver.velocities(id).unwrap();
    assert_eq!(x1.len(), x0.len());
    for i in 0..x0.len() {
        let expected = x0[i] + v0[i] * 2.0 * DT;
        let position_error = (expected - x1[i]).length();
        let velocity_error = (v0[i] - v1[i]).length();
        assert!(position_error < 1.0, "particle {} drifted {}", i, position_error);
        assert!(velocity_error < 0.05 * speed, "particle {} velocity changed by {}", i, velocity_error);
    }
}

#[test]
fn test_lod_switch_without_mapping_resets() {
    let mut solver = ClothSolver::new(SolverConfig::default());
    let mut config = ClothConfig::default();
    config.aerodynamics.drag = 0.0;
    config.aerodynamics.lift = 0.0;
    let mesh = GridMesh::new(20.0, 20.0, &[(4, 4), (2, 2)]).without_lod_mappings();
    let id = solver.add_cloth(Cloth::new(config).with_mesh(mesh));
    for _ in 0..10 {
        solver.update(DT);
    }
    assert!(lag(&solver, id).z < -5.0);

    solver.cloth_mut(id).unwrap().mesh_mut::<GridMesh>().unwrap().set_lod_index(Some(1));
    solver.update(DT);
    assert_eq!(solver.cloth(id).unwrap().lod_index(), Some(1));
    assert!(lag(&solver, id).length() < 1.0);
}

#[test]
fn test_cloth_without_lod_stays_inactive() {
    let mut solver = ClothSolver::new(SolverConfig::default());
    let id = falling_sheet(&mut solver, &[(2, 2)]);
    solver.update(DT);
    solver.cloth_mut(id).unwrap().mesh_mut::<GridMesh>().unwrap().set_lod_index(None);
    let stats = solver.update(DT);
    assert_eq!(solver.cloth(id).unwrap().lod_index(), None);
    assert!(solver.positions(id).is_none());
    assert!(solver.render_vertices(id).is_empty());
    assert_eq!(stats.particle_count, 0);
}

#[test]
fn test_self_collision_exclusions_are_symmetric() {
    let grid = GridMesh::new(20.0, 20.0, &[(8, 8)]);
    let mesh = TriangleMesh::from_indices(cloth_core::MeshAdapter::indices(&grid, 0), 81);
    let topology = Topology::build(&mesh);
    let exclusions = ExclusionSet::build(&topology, SELF_COLLISION_RING_DEPTH);

    assert!(!exclusions.is_empty());
    for &(a, b) in exclusions.iter() {
        assert_ne!(a, b);
        assert!(exclusions.contains(b, a), "({}, {}) has no mirror", a, b);
    }
    // Opposite corners are far apart in the ring metric.
    assert!(!exclusions.contains(0, 80));
}
