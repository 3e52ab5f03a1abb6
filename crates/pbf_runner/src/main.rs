//! Headless scenario runner.
//!
//! Usage: `pbf_runner [scenario.json] [steps]`
//!
//! Without a scenario file a small dam break is run. Progress goes through
//! `log`; set `RUST_LOG=info` (or `debug` for per-frame lines) to see it.

mod scenario;

use std::path::Path;
use std::time::Instant;

use scenario::Scenario;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let mut scenario = match args.next() {
        Some(path) => Scenario::load_json(Path::new(&path))?,
        None => Scenario::dam_break(),
    };
    if let Some(steps) = args.next() {
        scenario.steps = steps.parse()?;
    }

    log::info!("Scenario '{}': {}", scenario.name, scenario.description);
    let mut solver = scenario.build_solver()?;

    let start = Instant::now();
    for _ in 0..scenario.steps {
        solver.step();

        let metrics = solver.metrics();
        if scenario.log_interval > 0 && metrics.frame % scenario.log_interval == 0 {
            log::info!(
                "frame {:>6}  t={:.3}s  live={}  density_err={:.4}  max_speed={:.3}  step={:.2}ms",
                metrics.frame,
                solver.elapsed(),
                metrics.live_particles,
                metrics.mean_density_error,
                metrics.max_speed,
                metrics.step_time.as_secs_f64() * 1000.0
            );
        }
    }

    let wall = start.elapsed();
    for (i, body) in solver.rigid_bodies().iter().enumerate() {
        log::info!(
            "body {}: barycenter {:?}, rotation {:?}{}",
            i,
            body.world_barycenter,
            body.rotation(),
            if body.is_static { " (static)" } else { "" }
        );
    }
    let surface = solver.near_surface().iter().filter(|&&s| s).count();
    log::info!(
        "Done: {} frames in {:.2}s ({:.2} ms/frame), {} live particles, {} near the surface",
        solver.frame(),
        wall.as_secs_f64(),
        wall.as_secs_f64() * 1000.0 / solver.frame().max(1) as f64,
        solver.live_count(),
        surface
    );
    Ok(())
}
