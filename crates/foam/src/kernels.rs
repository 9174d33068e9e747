//! SPH smoothing kernels used by the diffuse-material passes.

use std::f64::consts::PI;

use glam::DVec3;

/// Linear spike weight `1 - |x|/h` inside the support, zero outside.
/// Unnormalized; weights the trapped-air and wave-crest accumulations.
#[inline]
pub fn w_spike(xij: DVec3, h: f64) -> f64 {
    let mxij = xij.length();
    if mxij <= h {
        1.0 - mxij / h
    } else {
        0.0
    }
}

/// Wendland kernel with support `q = |x|/h` in `[0, 2]`.
#[inline]
pub fn w_wendland(xij: DVec3, h: f64) -> f64 {
    let q = xij.length() / h;
    if q <= 2.0 {
        let ad = 21.0 / (16.0 * PI * h * h * h);
        let e1 = 1.0 - q / 2.0;
        ad * e1 * e1 * e1 * e1 * (2.0 * q + 1.0)
    } else {
        0.0
    }
}

/// Poly6 kernel with support `|x| <= h`.
#[inline]
pub fn w_poly6(xij: DVec3, h: f64) -> f64 {
    let mxij = xij.length();
    if mxij <= h {
        315.0 / (64.0 * PI * h.powi(9)) * (h * h - mxij * mxij).powi(3)
    } else {
        0.0
    }
}
