//! ZMP-tracking preview control of the cart-table model.
//!
//! Incremental LQ form: with the tracking error `e_k = C x_k - r_k` and
//! `Δx_k = x_k - x_{k-1}`, the augmented state `[e_k; Δx_k]` evolves as
//!
//! ```text
//! X̃_{k+1} = Ã X̃_k + B̃ Δu_k - Ĩ Δr_{k+1}
//! Ã = [1  CA]   B̃ = [CB]   Ĩ = [1]
//!     [0   A]       [ B]       [0]
//! ```
//!
//! and the optimal increment is
//!
//! ```text
//! Δu_k = -K X̃_k + Σ_{j=1..Np} f_j Δr_{k+j}
//! K    = (R + B̃ᵀPB̃)⁻¹ B̃ᵀ P Ã
//! f_j  = (R + B̃ᵀPB̃)⁻¹ B̃ᵀ (Ã - B̃K)ᵀ^(j-1) P Ĩ
//! ```
//!
//! where `P` solves the discrete algebraic Riccati equation for
//! `Q = diag(Qe, 0, 0, 0)` and input weight `R`.

use nalgebra::{Matrix3, Matrix4, RowVector3, RowVector4, Vector3, Vector4};
use tracing::{debug, warn};

use walkgen_core::error::GenerationError;

/// Iteration cap of the Riccati fixed point.
pub const MAX_RICCATI_ITERATIONS: usize = 100_000;

const RICCATI_TOLERANCE: f64 = 1e-11;

/// Per-axis state of the controlled cart.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisState {
    /// `[c, ċ, c̈]`
    pub x: Vector3<f64>,
    previous: Vector3<f64>,
    /// Jerk applied over the last period.
    pub u: f64,
}

impl AxisState {
    /// Cart at rest at `position`.
    pub fn at_rest(position: f64) -> Self {
        let x = Vector3::new(position, 0.0, 0.0);
        Self {
            x,
            previous: x,
            u: 0.0,
        }
    }
}

/// Preview controller gains for one period and preview window.
#[derive(Clone, Debug)]
pub struct PreviewController {
    a: Matrix3<f64>,
    b: Vector3<f64>,
    c: RowVector3<f64>,
    k: RowVector4<f64>,
    f: Vec<f64>,
    iterations: usize,
}

impl PreviewController {
    /// Compute the gains for control period `dt` and a preview of
    /// `preview_window` seconds.
    pub fn new(
        dt: f64,
        com_height: f64,
        gravity: f64,
        preview_window: f64,
        tracking_weight: f64,
        input_weight: f64,
    ) -> Result<Self, GenerationError> {
        let a = Matrix3::new(1.0, dt, dt * dt / 2.0, 0.0, 1.0, dt, 0.0, 0.0, 1.0);
        let b = Vector3::new(dt.powi(3) / 6.0, dt * dt / 2.0, dt);
        let c = RowVector3::new(1.0, 0.0, -com_height / gravity);

        let ca = c * a;
        let cb = (c * b)[0];
        let mut a_aug = Matrix4::zeros();
        a_aug[(0, 0)] = 1.0;
        a_aug.fixed_view_mut::<1, 3>(0, 1).copy_from(&ca);
        a_aug.fixed_view_mut::<3, 3>(1, 1).copy_from(&a);
        let b_aug = Vector4::new(cb, b[0], b[1], b[2]);
        let mut q = Matrix4::zeros();
        q[(0, 0)] = tracking_weight;

        let (p, iterations) = solve_dare(&a_aug, &b_aug, &q, input_weight);
        let s = input_weight + (b_aug.transpose() * p * b_aug)[0];
        let k = b_aug.transpose() * p * a_aug / s;
        if !k.iter().all(|v| v.is_finite()) {
            return Err(GenerationError::NonFinite("preview gain"));
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = (preview_window / dt).round().max(0.0) as usize;
        let closed_t = (a_aug - b_aug * k).transpose();
        let mut x = p * Vector4::new(1.0, 0.0, 0.0, 0.0);
        let mut f = Vec::with_capacity(steps);
        for _ in 0..steps {
            f.push((b_aug.transpose() * x)[0] / s);
            x = closed_t * x;
        }
        debug!(iterations, steps, "preview gains computed");

        Ok(Self {
            a,
            b,
            c,
            k,
            f,
            iterations,
        })
    }

    /// Number of future references consumed per step.
    pub fn preview_steps(&self) -> usize {
        self.f.len()
    }

    /// Riccati iterations used to compute the gains.
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    pub const fn feedback_gain(&self) -> &RowVector4<f64> {
        &self.k
    }

    pub fn preview_gains(&self) -> &[f64] {
        &self.f
    }

    /// ZMP of a cart state.
    pub fn zmp(&self, x: &Vector3<f64>) -> f64 {
        (self.c * x)[0]
    }

    /// Advance one axis by one period.
    ///
    /// `reference[0]` is the ZMP reference now; `reference[j]` the one `j`
    /// periods ahead. Missing entries repeat the last one given.
    pub fn step(&self, axis: &mut AxisState, reference: &[f64]) {
        let at = |j: usize| {
            reference
                .get(j)
                .or_else(|| reference.last())
                .copied()
                .unwrap_or(0.0)
        };
        let error = self.zmp(&axis.x) - at(0);
        let dx = axis.x - axis.previous;
        let augmented = Vector4::new(error, dx[0], dx[1], dx[2]);
        let feedforward: f64 = self
            .f
            .iter()
            .enumerate()
            .map(|(j, f)| f * (at(j + 1) - at(j)))
            .sum();
        let du = -(self.k * augmented)[0] + feedforward;
        axis.u += du;
        axis.previous = axis.x;
        axis.x = self.a * axis.x + self.b * axis.u;
    }
}

/// Fixed-point iteration of the discrete Riccati equation.
fn solve_dare(a: &Matrix4<f64>, b: &Vector4<f64>, q: &Matrix4<f64>, r: f64) -> (Matrix4<f64>, usize) {
    let mut p = *q;
    for iteration in 1..=MAX_RICCATI_ITERATIONS {
        let pb = p * b;
        let s = r + (b.transpose() * pb)[0];
        let at_pb = a.transpose() * pb;
        let next = q + a.transpose() * p * a - at_pb * at_pb.transpose() / s;
        let delta = (next - p).amax();
        p = next;
        if delta <= RICCATI_TOLERANCE * (1.0 + p.amax()) {
            return (p, iteration);
        }
    }
    warn!(
        iterations = MAX_RICCATI_ITERATIONS,
        "riccati iteration did not converge"
    );
    (p, MAX_RICCATI_ITERATIONS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DT: f64 = 0.005;

    fn controller() -> PreviewController {
        PreviewController::new(DT, 0.814, 9.81, 1.6, 1.0, 1e-6).unwrap()
    }

    /// Run `reference(t)` for `duration` seconds; returns (zmp error max, final axis).
    fn track(reference: impl Fn(f64) -> f64, duration: f64) -> (f64, AxisState) {
        let ctrl = controller();
        let mut axis = AxisState::at_rest(reference(0.0));
        let n = (duration / DT).round() as usize;
        let mut worst: f64 = 0.0;
        for k in 0..n {
            let window: Vec<f64> = (0..=ctrl.preview_steps())
                .map(|j| reference((k + j) as f64 * DT))
                .collect();
            worst = worst.max((ctrl.zmp(&axis.x) - window[0]).abs());
            ctrl.step(&mut axis, &window);
        }
        (worst, axis)
    }

    #[test]
    fn gains_converge() {
        let ctrl = controller();
        assert!(ctrl.iterations() < MAX_RICCATI_ITERATIONS);
        assert_eq!(ctrl.preview_steps(), 320);
        // Preview gains fade out over the window.
        let f = ctrl.preview_gains();
        assert!(f[0].abs() > f[319].abs() * 10.0);
    }

    #[test]
    fn holds_still_on_constant_reference() {
        let (worst, axis) = track(|_| 0.05, 2.0);
        assert!(worst < 1e-12);
        assert_relative_eq!(axis.x[0], 0.05, epsilon = 1e-12);
    }

    #[test]
    fn follows_a_ramp() {
        let ramp = |t: f64| (((t - 1.0) / 0.2).clamp(0.0, 1.0)) * 0.1;
        let (worst, axis) = track(ramp, 4.0);
        assert!(worst < 0.02, "worst tracking error {worst}");
        assert_relative_eq!(axis.x[0], 0.1, epsilon = 1e-3);
        assert!(axis.x[1].abs() < 1e-3);
    }

    #[test]
    fn short_reference_is_padded() {
        let ctrl = controller();
        let mut a = AxisState::at_rest(0.0);
        let mut b = AxisState::at_rest(0.0);
        ctrl.step(&mut a, &[0.0, 0.1]);
        let mut padded = vec![0.0];
        padded.extend(std::iter::repeat_n(0.1, ctrl.preview_steps()));
        ctrl.step(&mut b, &padded);
        assert_eq!(a, b);
    }
}
