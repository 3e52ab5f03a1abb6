//! Splash-style incremental injection: fluid particles become live in
//! batches as simulation time advances.
//!
//! Particles are released in their original index order, so the set of live
//! fluid particles at any time is always a prefix of the initial fluid array.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplashInjection {
    /// Particles released per batch
    pub batch_size: usize,
    /// Seconds between batches
    pub interval: f32,
}

impl SplashInjection {
    /// Live fluid particles after `elapsed` seconds, out of `total`.
    ///
    /// The first batch is live at `t = 0`.
    pub fn live_count(&self, elapsed: f32, total: usize) -> usize {
        if !(self.interval > 0.0) || !elapsed.is_finite() {
            return total;
        }
        let batches = (elapsed.max(0.0) / self.interval).floor() as usize + 1;
        self.batch_size.saturating_mul(batches).min(total)
    }
}
