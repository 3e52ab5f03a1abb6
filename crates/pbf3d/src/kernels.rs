//! SPH smoothing kernels (Müller et al. 2003) with coefficients precomputed
//! for a fixed smoothing radius.

use std::f32::consts::PI;

use glam::Vec3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelCoefficients {
    pub h: f32,
    pub h2: f32,
    /// 315 / (64 pi h^9)
    pub poly6: f32,
    /// -45 / (pi h^6)
    pub spiky_grad: f32,
    /// W(dq), denominator of the tensile correction
    pub w_delta_q: f32,
}

impl KernelCoefficients {
    /// `dq_fraction` places the tensile reference distance at `dq_fraction * h`.
    pub fn new(h: f32, dq_fraction: f32) -> Self {
        let h2 = h * h;
        let poly6 = 315.0 / (64.0 * PI * h.powi(9));
        let spiky_grad = -45.0 / (PI * h.powi(6));
        let dq2 = (dq_fraction * h).powi(2);
        let w_delta_q = poly6 * (h2 - dq2).powi(3);
        Self {
            h,
            h2,
            poly6,
            spiky_grad,
            w_delta_q,
        }
    }

    /// Poly6 density kernel from squared distance.
    #[inline]
    pub fn poly6(&self, r2: f32) -> f32 {
        if r2 >= self.h2 {
            return 0.0;
        }
        let d = self.h2 - r2;
        self.poly6 * d * d * d
    }

    /// Gradient of the spiky kernel with respect to the first particle,
    /// `r = x_i - x_j`. Zero at coincident positions.
    #[inline]
    pub fn spiky_gradient(&self, r: Vec3) -> Vec3 {
        let len = r.length();
        if len >= self.h || len < 1e-6 {
            return Vec3::ZERO;
        }
        let d = self.h - len;
        r * (self.spiky_grad * d * d / len)
    }

    /// Artificial pressure term that keeps particles from clumping.
    #[inline]
    pub fn tensile_correction(&self, r2: f32, k: f32, n: i32) -> f32 {
        if self.w_delta_q <= 0.0 {
            return 0.0;
        }
        -k * (self.poly6(r2) / self.w_delta_q).powi(n)
    }
}
