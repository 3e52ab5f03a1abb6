//! Unified particle record shared by fluid and rigid-affiliated particles.

use bytemuck::{Pod, Zeroable};
use glam::{IVec3, Vec3};

/// Marker for `rigid_particle`: not part of a rigid body.
pub const NO_RIGID: i32 = -1;

/// One simulated particle. Laid out flat so buffers can be uploaded or
/// dumped as raw bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// Position at the start of the step
    pub old_pos: Vec3,
    /// Predicted position, corrected by the constraint solve
    pub new_pos: Vec3,
    pub delta_p: Vec3,
    pub velocity: Vec3,
    /// XSPH viscosity correction
    pub delta_v: Vec3,
    /// External force (vorticity confinement)
    pub force: Vec3,
    pub vorticity: Vec3,
    pub grid_coord: IVec3,
    pub lambda: f32,
    pub density: f32,
    pub mass: f32,
    /// 0 for immovable particles
    pub inv_mass: f32,
    /// Index into the rigid particle array, or [`NO_RIGID`]
    pub rigid_particle: i32,
    /// Slot in the initial buffer (rigid, then fluid, then padding). Stays
    /// with the particle through every reorder and decides liveness.
    pub id: u32,
}

impl Particle {
    /// A particle at rest. Infinite mass marks it immovable; it still
    /// counts with unit mass toward neighbor density.
    pub fn new(position: Vec3, mass: f32) -> Self {
        let (mass, inv_mass) = if mass.is_finite() && mass > 0.0 {
            (mass, 1.0 / mass)
        } else {
            (1.0, 0.0)
        };
        Self {
            old_pos: position,
            new_pos: position,
            grid_coord: IVec3::splat(-1),
            mass,
            inv_mass,
            rigid_particle: NO_RIGID,
            ..Self::default()
        }
    }

    pub fn fluid(position: Vec3) -> Self {
        Self::new(position, 1.0)
    }

    pub fn rigid(position: Vec3, mass: f32, rigid_particle: u32) -> Self {
        Self {
            rigid_particle: rigid_particle as i32,
            ..Self::new(position, mass)
        }
    }

    pub fn with_id(self, id: u32) -> Self {
        Self { id, ..self }
    }

    /// Live when its id is below the solver's live count. Rigid ids come
    /// first and the live count always covers them.
    #[inline]
    pub fn is_live(&self, live: usize) -> bool {
        (self.id as usize) < live
    }

    #[inline]
    pub fn is_rigid(&self) -> bool {
        self.rigid_particle >= 0
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.inv_mass == 0.0
    }
}
