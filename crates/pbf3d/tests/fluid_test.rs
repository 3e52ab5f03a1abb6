//! End-to-end fluid runs: boundary containment, constraint safety and
//! splash injection.

use glam::Vec3;
use pbf3d::{seed, PbfParams, PbfSolver, RigidBodySet, SplashInjection};

fn assert_finite(solver: &PbfSolver) {
    for (i, p) in solver.live_particles().iter().enumerate() {
        assert!(p.new_pos.is_finite(), "particle {i} position {}", p.new_pos);
        assert!(p.velocity.is_finite(), "particle {i} velocity {}", p.velocity);
        assert!(p.lambda.is_finite(), "particle {i} lambda {}", p.lambda);
    }
}

#[test]
fn test_dropped_block_stays_in_domain() {
    let params = PbfParams {
        domain_max: Vec3::new(20.0, 16.0, 20.0),
        ..Default::default()
    };
    // 8 x 8 x 16 = 1024 particles
    let fluid = seed::lattice_block(Vec3::new(4.0, 6.0, 2.0), Vec3::new(11.0, 13.0, 17.0), 1.0);
    assert_eq!(fluid.len(), 1024);

    let mut solver = PbfSolver::new(params, &fluid, RigidBodySet::default()).unwrap();
    let domain = solver.domain();

    for frame in 0..200 {
        solver.step();
        if frame % 50 == 0 {
            let m = solver.metrics();
            println!(
                "frame {}: density error {:.4}, max speed {:.3}",
                m.frame, m.mean_density_error, m.max_speed
            );
        }
    }

    assert_eq!(solver.live_count(), 1024);
    assert_eq!(solver.live_particles().len(), 1024);
    assert_finite(&solver);
    for p in solver.live_particles() {
        assert!(p.new_pos.cmpge(domain.min - 1e-3).all(), "{} below domain", p.new_pos);
        assert!(p.new_pos.cmple(domain.max + 1e-3).all(), "{} above domain", p.new_pos);
    }

    // The column has collapsed toward the floor
    let mean_y = solver.live_particles().iter().map(|p| p.new_pos.y).sum::<f32>() / 1024.0;
    assert!(mean_y < 9.5, "mean height {mean_y}");
}

#[test]
fn test_isolated_particle_has_safe_lambda() {
    for epsilon_lambda in [0.0, 150.0] {
        let params = PbfParams {
            domain_max: Vec3::splat(10.0),
            epsilon_lambda,
            ..Default::default()
        };
        let mut solver = PbfSolver::new(params, &[Vec3::splat(5.0)], RigidBodySet::default()).unwrap();
        for _ in 0..5 {
            solver.step();
        }
        assert_finite(&solver);
        let p = solver.live_particles()[0];
        // Free fall only: no neighbors to push against
        assert!(p.velocity.y < 0.0);
        assert!(p.velocity.x.abs() < 1e-6 && p.velocity.z.abs() < 1e-6);
    }
}

#[test]
fn test_sorted_buffer_matches_grid_after_step() {
    let params = PbfParams {
        domain_max: Vec3::splat(12.0),
        ..Default::default()
    };
    let fluid = seed::random_in_box(&seed::shrink(&params.domain(), 0.2), 700, 5);
    let mut solver = PbfSolver::new(params, &fluid, RigidBodySet::default()).unwrap();
    solver.step();

    let live = solver.live_count();
    let pairs = solver.sorted_pairs();
    assert!(pairs[..live].windows(2).all(|w| w[0].cell <= w[1].cell));
    for (k, pair) in pairs[..live].iter().enumerate() {
        let cell = solver.grid().cell(pair.cell);
        assert!(cell.range().contains(&k));
    }
    let occupied: usize = solver
        .grid_cells()
        .iter()
        .filter(|c| !c.is_empty())
        .map(|c| c.range().count())
        .sum();
    assert_eq!(occupied, live);
}

#[test]
fn test_splash_injection_releases_batches_in_order() {
    let params = PbfParams {
        domain_max: Vec3::splat(24.0),
        injection: Some(SplashInjection {
            batch_size: 100,
            interval: 0.1,
        }),
        ..Default::default()
    };
    let fluid = seed::lattice_block(Vec3::splat(2.0), Vec3::new(11.0, 11.0, 11.0), 1.0);
    assert_eq!(fluid.len(), 1000);
    let mut solver = PbfSolver::new(params, &fluid, RigidBodySet::default()).unwrap();
    assert_eq!(solver.live_count(), 100);

    let mut previous = 0;
    for frame in 1..=30 {
        solver.step();
        let live = solver.live_count();
        assert!(live >= previous);
        assert_eq!(live % 100, 0);
        previous = live;

        // Waiting particles keep their initial position
        for p in solver.particles().iter().filter(|p| !p.is_live(live) && (p.id as usize) < fluid.len()) {
            assert_eq!(p.new_pos, fluid[p.id as usize], "frame {frame} particle {}", p.id);
            assert_eq!(p.velocity, Vec3::ZERO);
        }
        // Released in id order
        assert!(solver.live_particles().iter().all(|p| (p.id as usize) < live));

        match frame {
            1 => assert_eq!(live, 100),
            20 => assert_eq!(live, 200),
            30 => assert_eq!(live, 300),
            _ => {}
        }
    }
    assert_eq!(solver.fluid_count(), 1000);
}

#[test]
fn test_near_surface_flags_outer_particles() {
    let params = PbfParams {
        domain_max: Vec3::splat(16.0),
        gravity: Vec3::ZERO,
        // Unit lattice spacing: 7 neighbors inside, 6 on faces, fewer on edges
        surface_neighbor_threshold: 6,
        ..Default::default()
    };
    let fluid = seed::lattice_block(Vec3::splat(4.0), Vec3::splat(11.0), 1.0);
    let mut solver = PbfSolver::new(params, &fluid, RigidBodySet::default()).unwrap();
    assert!(solver.near_surface().iter().all(|&s| !s));

    solver.step();
    let flags = solver.near_surface();
    assert_eq!(flags.len(), solver.capacity());
    let surface: Vec<Vec3> = solver
        .live_particles()
        .iter()
        .zip(&flags)
        .filter(|(_, s)| **s)
        .map(|(p, _)| p.new_pos)
        .collect();
    // 12 edges of 6 particles plus 8 corners
    assert_eq!(surface.len(), 80);
    // The block's core is never flagged
    let core = pbf3d::Aabb::new(Vec3::splat(6.0), Vec3::splat(9.0));
    assert!(surface.iter().all(|p| !core.contains(*p)));
}
