//! The coupled fluid/rigid solver.
//!
//! Owns the whole live simulation state: the double-buffered particle
//! population (rigid-affiliated particles first, then fluid, then block
//! padding), the hash grid, the sort buffers and the rigid arrays. One call to
//! [`PbfSolver::step`] runs every stage to completion.

pub mod metrics;
pub mod stages;

use std::time::Instant;

use glam::{Quat, UVec3, Vec3};

use crate::constants::PARTICLE_BLOCK_SIZE;
use crate::error::Result;
use crate::geometry::Aabb;
use crate::grid::{GridCell, SpatialGrid};
use crate::kernels::KernelCoefficients;
use crate::params::PbfParams;
use crate::particle::Particle;
use crate::rigid::shape_matching;
use crate::rigid::{RigidBodyData, RigidBodyParticle, RigidBodySet, ShapeMatcher};
use crate::seed;
use crate::sort::{bitonic_sort, CellParticlePair};

pub use metrics::FrameMetrics;
pub use stages::Stage;

use stages::{NeighborContext, RigidSurface};

pub struct PbfSolver {
    params: PbfParams,
    kernels: KernelCoefficients,
    domain: Aabb,
    grid: SpatialGrid,

    /// Input of the next step; after a step, the freshly simulated state
    particles: Vec<Particle>,
    /// Cell-ordered working buffer
    sorted: Vec<Particle>,
    pairs: Vec<CellParticlePair>,
    pair_scratch: Vec<CellParticlePair>,
    neighbor_counts: Vec<u32>,

    rigid_bodies: Vec<RigidBodyData>,
    rigid_particles: Vec<RigidBodyParticle>,
    body_rotations: Vec<Quat>,
    /// Sorted slot of each rigid particle in the current step
    rigid_slots: Vec<u32>,
    shape_matcher: ShapeMatcher,

    rigid_count: usize,
    fluid_count: usize,
    /// Manual cap on live fluid particles
    fluid_limit: Option<usize>,
    live_count: usize,

    elapsed: f32,
    frame: u64,
    metrics: FrameMetrics,
}

impl PbfSolver {
    /// Build a solver from fluid positions and the packed rigid arrays.
    pub fn new(params: PbfParams, fluid: &[Vec3], rigid: RigidBodySet) -> Result<Self> {
        params.validate()?;

        let domain = params.domain();
        let kernels = params.kernel_coefficients();
        let grid = SpatialGrid::new(domain, params.grid_cell_width());

        let rigid_count = rigid.particles.len();
        let fluid_count = fluid.len();
        let total = rigid_count + fluid_count;
        let capacity = total.div_ceil(PARTICLE_BLOCK_SIZE).max(1) * PARTICLE_BLOCK_SIZE;
        let sort_len = capacity.next_power_of_two();

        let mut particles = Vec::with_capacity(capacity);
        particles.extend(rigid.particles.iter().enumerate().map(|(r, rp)| {
            let mass = rigid.bodies.get(rp.body as usize).map_or(1.0, |b| b.mass);
            Particle::rigid(rp.pos_world, mass, r as u32)
        }));
        particles.extend(fluid.iter().map(|&p| Particle::fluid(p)));
        // Padding sits inside the domain and never becomes live.
        particles.resize(capacity, Particle::new(domain.center(), f32::INFINITY));
        for (id, p) in particles.iter_mut().enumerate() {
            p.id = id as u32;
        }

        let body_rotations = rigid.bodies.iter().map(RigidBodyData::rotation).collect();
        let shape_matcher = ShapeMatcher::new(rigid_count, rigid.max_body_particles);

        log::info!(
            "PbfSolver: {} fluid + {} rigid particles (capacity {}), grid {}x{}x{} cells of {:.3}",
            fluid_count,
            rigid_count,
            capacity,
            grid.dims().x,
            grid.dims().y,
            grid.dims().z,
            grid.cell_width()
        );

        let mut solver = Self {
            params,
            kernels,
            domain,
            grid,
            sorted: particles.clone(),
            particles,
            pairs: (0..sort_len as u32).map(CellParticlePair::inactive).collect(),
            pair_scratch: Vec::with_capacity(sort_len),
            neighbor_counts: vec![0; capacity],
            rigid_bodies: rigid.bodies,
            rigid_particles: rigid.particles,
            body_rotations,
            rigid_slots: vec![u32::MAX; rigid_count],
            shape_matcher,
            rigid_count,
            fluid_count,
            fluid_limit: None,
            live_count: 0,
            elapsed: 0.0,
            frame: 0,
            metrics: FrameMetrics::default(),
        };
        solver.live_count = solver.compute_live_count();
        Ok(solver)
    }

    /// Seed `params.particle_count` fluid particles at random inside the
    /// domain shrunk by 10% per side.
    pub fn with_random_fluid(params: PbfParams, rigid: RigidBodySet, seed: u64) -> Result<Self> {
        let region = seed::shrink(&params.domain(), 0.1);
        let fluid = seed::random_in_box(&region, params.particle_count.count(), seed);
        Self::new(params, &fluid, rigid)
    }

    /// Advance the simulation by one timestep.
    pub fn step(&mut self) {
        let start = Instant::now();
        self.live_count = self.compute_live_count();

        for stage in Stage::NEIGHBORHOOD {
            self.run_stage(stage);
        }
        for _ in 0..self.params.iterations {
            for stage in Stage::CONSTRAINT {
                self.run_stage(stage);
            }
        }
        for stage in Stage::FINALIZE {
            self.run_stage(stage);
        }
        if self.rigid_count > 0 {
            for stage in Stage::SHAPE_MATCHING {
                self.run_stage(stage);
            }
        }
        self.run_stage(Stage::SwapBuffers);

        self.elapsed += self.params.dt;
        self.frame += 1;
        self.metrics = FrameMetrics::gather(
            self.frame,
            self.live_particles(),
            self.params.rest_density,
            self.rigid_bodies.len(),
            start.elapsed(),
        );
        log::debug!(
            "frame {}: {} live, density error {:.4}, max speed {:.3}, {:?}",
            self.metrics.frame,
            self.metrics.live_particles,
            self.metrics.mean_density_error,
            self.metrics.max_speed,
            self.metrics.step_time
        );
    }

    /// Dispatch a single stage against the solver's buffers.
    pub fn run_stage(&mut self, stage: Stage) {
        log::trace!("frame {}: {}", self.frame, stage.label());
        let live = self.live_count;
        let dt = self.params.dt;
        let ctx = NeighborContext {
            grid: &self.grid,
            kernels: &self.kernels,
            params: &self.params,
        };

        match stage {
            Stage::Predict => {
                stages::predict(&mut self.particles, live, self.params.gravity, dt, &self.domain)
            }
            Stage::Hash => stages::hash(&mut self.particles, &mut self.pairs, live, &self.grid),
            Stage::ClearGrid => self.grid.clear(),
            Stage::Sort => {
                // Live ids can sit anywhere once the limit has been lowered and raised again
                let len = self.pairs.len();
                bitonic_sort(&mut self.pairs, &mut self.pair_scratch, len);
            }
            Stage::BuildGrid => self.grid.build(&self.pairs),
            Stage::Reorder => stages::reorder(&self.particles, &mut self.sorted, &self.pairs),
            Stage::ComputeLambda => {
                stages::compute_lambda(&mut self.sorted, &mut self.neighbor_counts, live, &ctx)
            }
            Stage::ComputeDeltaP => {
                let rigid = RigidSurface {
                    particles: &self.rigid_particles,
                    rotations: &self.body_rotations,
                };
                stages::compute_delta_p(&mut self.sorted, live, &ctx, &rigid, &self.domain);
            }
            Stage::UpdatePosition => stages::update_position(&mut self.sorted, live),
            Stage::UpdateVelocity => stages::update_velocity(&mut self.sorted, live, dt),
            Stage::VorticityViscosity => stages::vorticity_viscosity(&mut self.sorted, live, &ctx),
            Stage::ApplyForce => stages::apply_force(&mut self.sorted, live, &ctx, dt),
            Stage::GatherRigid => stages::gather_rigid(
                &self.sorted,
                live,
                &mut self.rigid_particles,
                &mut self.rigid_slots,
            ),
            Stage::RigidReset => self.shape_matcher.reset(),
            Stage::RigidBarycenter => self
                .shape_matcher
                .reduce_barycenters(&mut self.rigid_bodies, &self.rigid_particles),
            Stage::RigidCovariance => self
                .shape_matcher
                .reduce_covariance(&self.rigid_bodies, &mut self.rigid_particles),
            Stage::RigidTransform => {
                self.shape_matcher.update_transforms(&mut self.rigid_bodies);
                self.body_rotations = self.rigid_bodies.iter().map(RigidBodyData::rotation).collect();
            }
            Stage::RigidWriteBack => {
                shape_matching::write_back(&self.rigid_bodies, &mut self.rigid_particles)
            }
            Stage::ScatterRigid => {
                stages::scatter_rigid(&mut self.sorted, live, &self.rigid_particles, dt)
            }
            Stage::SwapBuffers => std::mem::swap(&mut self.particles, &mut self.sorted),
        }
    }

    fn compute_live_count(&self) -> usize {
        let mut fluid = match &self.params.injection {
            Some(schedule) => schedule.live_count(self.elapsed, self.fluid_count),
            None => self.fluid_count,
        };
        if let Some(limit) = self.fluid_limit {
            fluid = fluid.min(limit);
        }
        self.rigid_count + fluid
    }

    /// Cap the number of live fluid particles from the next step on. Fluid
    /// ids past the cap go inactive; rigid particles are unaffected.
    /// Requests above the fluid population are clamped to it.
    pub fn set_fluid_limit(&mut self, limit: Option<usize>) {
        self.fluid_limit = limit.map(|n| {
            if n > self.fluid_count {
                log::warn!(
                    "PbfSolver: requested {} live fluid particles, clamping to {}",
                    n,
                    self.fluid_count
                );
            }
            n.min(self.fluid_count)
        });
    }

    /// Drive a static body's pose. Ignored for dynamic or unknown bodies.
    pub fn set_static_pose(&mut self, body: usize, translation: Vec3, rotation: Quat) {
        match self.rigid_bodies.get_mut(body) {
            Some(data) if data.is_static => {
                data.set_pose(translation, rotation);
                self.body_rotations[body] = data.rotation();
            }
            Some(_) => log::warn!("PbfSolver: body {} is dynamic, pose ignored", body),
            None => log::warn!("PbfSolver: no rigid body {}", body),
        }
    }

    /// Current particle buffer, including inactive particles and padding.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// The live prefix of the current particle buffer. The buffer is packed
    /// live-first by every step.
    pub fn live_particles(&self) -> &[Particle] {
        &self.particles[..self.live_count]
    }

    pub fn sorted_pairs(&self) -> &[CellParticlePair] {
        &self.pairs
    }

    pub fn grid_cells(&self) -> &[GridCell] {
        self.grid.cells()
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn grid_dims(&self) -> UVec3 {
        self.grid.dims()
    }

    pub fn cell_width(&self) -> f32 {
        self.grid.cell_width()
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    pub fn capacity(&self) -> usize {
        self.particles.len()
    }

    pub fn fluid_count(&self) -> usize {
        self.fluid_count
    }

    pub fn rigid_particle_count(&self) -> usize {
        self.rigid_count
    }

    pub fn rigid_bodies(&self) -> &[RigidBodyData] {
        &self.rigid_bodies
    }

    pub fn rigid_particles(&self) -> &[RigidBodyParticle] {
        &self.rigid_particles
    }

    pub fn params(&self) -> &PbfParams {
        &self.params
    }

    pub fn domain(&self) -> Aabb {
        self.domain
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }

    /// Per-particle "near the free surface" flag for the current buffer,
    /// from the neighbor counts of the last density pass. Always false for
    /// rigid and inactive particles.
    pub fn near_surface(&self) -> Vec<bool> {
        let threshold = self.params.surface_neighbor_threshold;
        self.particles
            .iter()
            .zip(&self.neighbor_counts)
            .map(|(p, &count)| p.is_live(self.live_count) && !p.is_rigid() && self.frame > 0 && count < threshold)
            .collect()
    }
}
