//! Solver constants and parameter defaults.

/// Gravity acceleration - negative Y direction
pub const GRAVITY: f32 = -9.8;

// =============================================================================
// DISPATCH
// =============================================================================

/// Lanes per particle "workgroup". Buffer capacity and the grid table length
/// are rounded up to a multiple of this.
pub const PARTICLE_BLOCK_SIZE: usize = 512;

/// Cell id given to particles that are not live. Sorts after every real cell.
pub const SENTINEL_CELL: u32 = u32::MAX;

/// Sub-block sorted in place before the global bitonic passes begin.
pub const SORT_LOCAL_SIZE: usize = 16;

// =============================================================================
// PBF DEFAULTS
// =============================================================================

pub const DEFAULT_DT: f32 = 0.008;
pub const DEFAULT_ITERATIONS: u32 = 10;
pub const DEFAULT_REST_DENSITY: f32 = 1.0;

/// Smoothing radius H. Grid cells are 2H wide.
pub const DEFAULT_SMOOTHING_RADIUS: f32 = 1.2;

/// Tensile instability correction `s_corr = -K * (W(r) / W(dq))^N`
pub const DEFAULT_TENSILE_K: f32 = 0.1;
pub const DEFAULT_TENSILE_N: i32 = 4;
/// `dq` as a fraction of H
pub const DEFAULT_TENSILE_DQ: f32 = 0.3;

/// Constraint force mixing term in the lambda denominator
pub const DEFAULT_EPSILON_LAMBDA: f32 = 150.0;
pub const DEFAULT_EPSILON_VORTICITY: f32 = 0.1;
pub const DEFAULT_XSPH_VISCOSITY: f32 = 0.01;

/// Neighbor count below which a particle is flagged as near the free surface
pub const DEFAULT_SURFACE_NEIGHBOR_THRESHOLD: u32 = 20;
