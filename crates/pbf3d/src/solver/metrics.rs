//! Per-frame diagnostics.

use std::time::Duration;

use rayon::prelude::*;

use crate::particle::Particle;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameMetrics {
    pub frame: u64,
    pub live_particles: usize,
    /// Mean |density / rest - 1| over live fluid particles
    pub mean_density_error: f32,
    pub max_speed: f32,
    pub rigid_bodies: usize,
    pub step_time: Duration,
}

impl FrameMetrics {
    pub fn gather(frame: u64, particles: &[Particle], rest_density: f32, rigid_bodies: usize, step_time: Duration) -> Self {
        let (error_sum, fluid, max_speed) = particles
            .par_iter()
            .map(|p| {
                let speed = p.velocity.length();
                if p.is_rigid() {
                    (0.0, 0usize, speed)
                } else {
                    ((p.density / rest_density - 1.0).abs(), 1, speed)
                }
            })
            .reduce(|| (0.0, 0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1, a.2.max(b.2)));

        Self {
            frame,
            live_particles: particles.len(),
            mean_density_error: if fluid > 0 { error_sum / fluid as f32 } else { 0.0 },
            max_speed,
            rigid_bodies,
            step_time,
        }
    }
}
