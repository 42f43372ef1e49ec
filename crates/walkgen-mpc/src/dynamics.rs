//! Cart-table (linear inverted pendulum) model of the CoM.
//!
//! Each horizontal axis carries the state `x̂ = [c, ċ, c̈]` driven by a
//! piecewise-constant jerk. Over `N` samples of period `T` every predicted
//! quantity is affine in the stacked jerks:
//!
//! ```text
//! X = S x̂ + U J        (S: N×3, U: N×N lower triangular)
//! ```
//!
//! With `d = i - j` and row `i = 0..N-1` (sample time `(i+1)T`):
//!
//! | quantity | `S` row                                   | `U(i, j)`                         |
//! |----------|-------------------------------------------|-----------------------------------|
//! | position | `[1, (i+1)T, ((i+1)T)²/2]`                | `(1+3d+3d²)T³/6`                  |
//! | velocity | `[0, 1, (i+1)T]`                          | `(2d+1)T²/2`                      |
//! | CoP/ZMP  | `[1, (i+1)T, ((i+1)T)²/2 - h/g]`          | `(1+3d+3d²)T³/6 - T h/g`          |
//! | jerk     | `0`                                       | `I`                               |
//!
//! The CoP row follows from `z = c - (h/g) c̈`.
//!
//! Between samples the CoP is a cubic in time. Splitting each period into
//! `M` control ticks, the CoP at `s = jT + τ` (`0 < τ <= T`) is
//!
//! ```text
//! S = [1, s, s²/2 - h/g]
//! U(l) = ((s - lT)³ - (s - (l+1)T)³)/6 - T h/g     l < j
//! U(j) = τ³/6 - τ h/g
//! ```

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use walkgen_core::types::SupportState;

use crate::types::AffinePoint;

/// Which predicted quantity a [`LinearDynamics`] maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicsKind {
    Position,
    Velocity,
    Cop,
    Jerk,
}

/// `X = S x̂ + U J` for one quantity over the horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearDynamics {
    pub kind: DynamicsKind,
    pub s: DMatrix<f64>,
    pub u: DMatrix<f64>,
}

impl LinearDynamics {
    /// Build the matrices for `n` samples of period `t`.
    pub fn new(kind: DynamicsKind, n: usize, t: f64, com_height: f64, gravity: f64) -> Self {
        let mut s = DMatrix::zeros(n, 3);
        let mut u = DMatrix::zeros(n, n);
        let hg = com_height / gravity;
        for i in 0..n {
            let ti = (i + 1) as f64 * t;
            match kind {
                DynamicsKind::Position => {
                    s[(i, 0)] = 1.0;
                    s[(i, 1)] = ti;
                    s[(i, 2)] = ti * ti / 2.0;
                }
                DynamicsKind::Velocity => {
                    s[(i, 1)] = 1.0;
                    s[(i, 2)] = ti;
                }
                DynamicsKind::Cop => {
                    s[(i, 0)] = 1.0;
                    s[(i, 1)] = ti;
                    s[(i, 2)] = ti * ti / 2.0 - hg;
                }
                DynamicsKind::Jerk => {}
            }
            for j in 0..=i {
                let d = (i - j) as f64;
                u[(i, j)] = match kind {
                    DynamicsKind::Position => (1.0 + 3.0 * d + 3.0 * d * d) * t.powi(3) / 6.0,
                    DynamicsKind::Velocity => (2.0 * d + 1.0) * t * t / 2.0,
                    DynamicsKind::Cop => (1.0 + 3.0 * d + 3.0 * d * d) * t.powi(3) / 6.0 - t * hg,
                    DynamicsKind::Jerk => {
                        if i == j {
                            1.0
                        } else {
                            0.0
                        }
                    }
                };
            }
        }
        Self { kind, s, u }
    }

    /// CoP at each of the `ticks` control instants of every sample period:
    /// row `r` is the time `(r+1)·T/ticks`.
    pub fn cop_at_ticks(n: usize, t: f64, ticks: usize, com_height: f64, gravity: f64) -> Self {
        let ticks = ticks.max(1);
        let dt = t / ticks as f64;
        let hg = com_height / gravity;
        let mut s = DMatrix::zeros(n * ticks, 3);
        let mut u = DMatrix::zeros(n * ticks, n);
        for r in 0..n * ticks {
            let (j, m) = (r / ticks, r % ticks + 1);
            let time = (r + 1) as f64 * dt;
            let tau = m as f64 * dt;
            s[(r, 0)] = 1.0;
            s[(r, 1)] = time;
            s[(r, 2)] = time * time / 2.0 - hg;
            for l in 0..j {
                let (a, b) = (time - l as f64 * t, time - (l + 1) as f64 * t);
                u[(r, l)] = (a.powi(3) - b.powi(3)) / 6.0 - t * hg;
            }
            u[(r, j)] = tau.powi(3) / 6.0 - tau * hg;
        }
        Self {
            kind: DynamicsKind::Cop,
            s,
            u,
        }
    }

    /// Free response `S x̂` of one axis.
    pub fn free_response(&self, state: &Vector3<f64>) -> DVector<f64> {
        &self.s * state
    }

    pub fn horizon(&self) -> usize {
        self.s.nrows()
    }
}

/// Position, velocity and CoP maps sharing one horizon.
#[derive(Debug, Clone)]
pub struct HorizonDynamics {
    pub position: LinearDynamics,
    pub velocity: LinearDynamics,
    pub cop: LinearDynamics,
    /// CoP at control rate, `ticks` rows per sample.
    pub cop_ticks: LinearDynamics,
}

impl HorizonDynamics {
    pub fn new(n: usize, t: f64, ticks: usize, com_height: f64, gravity: f64) -> Self {
        Self {
            position: LinearDynamics::new(DynamicsKind::Position, n, t, com_height, gravity),
            velocity: LinearDynamics::new(DynamicsKind::Velocity, n, t, com_height, gravity),
            cop: LinearDynamics::new(DynamicsKind::Cop, n, t, com_height, gravity),
            cop_ticks: LinearDynamics::cop_at_ticks(n, t, ticks, com_height, gravity),
        }
    }
}

// ---------------------------------------------------------------------------
// Single-period integration
// ---------------------------------------------------------------------------

/// Exact discretisation of the triple integrator over `dt`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartTable {
    a: Matrix3<f64>,
    b: Vector3<f64>,
    hg: f64,
}

impl CartTable {
    pub fn new(dt: f64, com_height: f64, gravity: f64) -> Self {
        Self {
            a: Matrix3::new(1.0, dt, dt * dt / 2.0, 0.0, 1.0, dt, 0.0, 0.0, 1.0),
            b: Vector3::new(dt.powi(3) / 6.0, dt * dt / 2.0, dt),
            hg: com_height / gravity,
        }
    }

    /// Advance `[c, ċ, c̈]` by one period under constant `jerk`.
    pub fn step(&self, state: &Vector3<f64>, jerk: f64) -> Vector3<f64> {
        self.a * state + self.b * jerk
    }

    /// ZMP of the cart-table model.
    pub fn cop(&self, state: &Vector3<f64>) -> f64 {
        state[0] - self.hg * state[2]
    }
}

// ---------------------------------------------------------------------------
// Selection matrices
// ---------------------------------------------------------------------------

/// Maps footstep decision variables onto the horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionMatrices {
    /// `V (N×K)`: weight of decision `f_k` in the ZMP centre of sample `i`.
    /// A sample standing on new step `k` has `V(i, k-1) = 1`; double support
    /// after it splits the weight with the previous foot.
    pub v: DMatrix<f64>,
    /// `V_f (K×K)`: row `k` computes `f_k - f_{k-1}` (`f_0` is not a
    /// decision, so row 0 only keeps `f_1`).
    pub v_f: DMatrix<f64>,
    /// Known part of each ZMP centre, per axis.
    pub fixed_x: DVector<f64>,
    pub fixed_y: DVector<f64>,
}

impl SelectionMatrices {
    pub fn new(centres: &[AffinePoint], k: usize) -> Self {
        let n = centres.len();
        let mut v = DMatrix::zeros(n, k);
        for (i, centre) in centres.iter().enumerate() {
            for &(step, w) in centre.steps.iter().filter(|(step, _)| *step < k) {
                v[(i, step)] += w;
            }
        }
        let mut v_f = DMatrix::zeros(k, k);
        for row in 0..k {
            v_f[(row, row)] = 1.0;
            if row > 0 {
                v_f[(row, row - 1)] = -1.0;
            }
        }
        Self {
            v,
            v_f,
            fixed_x: DVector::from_iterator(n, centres.iter().map(|c| c.constant.x)),
            fixed_y: DVector::from_iterator(n, centres.iter().map(|c| c.constant.y)),
        }
    }

    pub fn steps(&self) -> usize {
        self.v.ncols()
    }
}

/// Number of new footsteps in a preview sequence.
pub fn step_count(previewed: &[SupportState]) -> usize {
    previewed
        .iter()
        .map(|s| s.step_number as usize)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use walkgen_core::types::{SupportPhase, SupportState};

    const T: f64 = 0.1;
    const H: f64 = 0.814;
    const G: f64 = 9.81;

    /// Simulate constant jerks sample by sample and compare to `S x̂ + U J`.
    fn simulate(x0: Vector3<f64>, jerks: &[f64]) -> (Vec<Vector3<f64>>, CartTable) {
        let ct = CartTable::new(T, H, G);
        let mut x = x0;
        let out = jerks
            .iter()
            .map(|&j| {
                x = ct.step(&x, j);
                x
            })
            .collect();
        (out, ct)
    }

    #[test]
    fn position_matches_simulation() {
        let n = 8;
        let x0 = Vector3::new(0.02, 0.1, -0.3);
        let jerks: Vec<f64> = (0..n).map(|i| (i as f64 * 0.7).sin()).collect();
        let (traj, ct) = simulate(x0, &jerks);
        let j = DVector::from_vec(jerks);
        for kind in [DynamicsKind::Position, DynamicsKind::Velocity, DynamicsKind::Cop] {
            let dynamics = LinearDynamics::new(kind, n, T, H, G);
            let predicted = dynamics.free_response(&x0) + &dynamics.u * &j;
            for i in 0..n {
                let expected = match kind {
                    DynamicsKind::Position => traj[i][0],
                    DynamicsKind::Velocity => traj[i][1],
                    DynamicsKind::Cop => ct.cop(&traj[i]),
                    DynamicsKind::Jerk => unreachable!(),
                };
                assert_relative_eq!(predicted[i], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn jerk_map_is_identity() {
        let d = LinearDynamics::new(DynamicsKind::Jerk, 4, T, H, G);
        assert_eq!(d.u, DMatrix::identity(4, 4));
        assert!(d.s.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn u_is_lower_triangular() {
        let d = LinearDynamics::new(DynamicsKind::Cop, 5, T, H, G);
        for i in 0..5 {
            for j in (i + 1)..5 {
                assert_eq!(d.u[(i, j)], 0.0);
            }
            assert!(d.u[(i, i)] != 0.0);
        }
    }

    #[test]
    fn tick_cop_matches_control_rate_simulation() {
        let (n, ticks) = (4, 20);
        let dt = T / ticks as f64;
        let x0 = Vector3::new(0.01, -0.2, 0.4);
        let jerks: Vec<f64> = (0..n).map(|i| 3.0 * (i as f64 * 1.3).cos()).collect();
        let dynamics = LinearDynamics::cop_at_ticks(n, T, ticks, H, G);
        assert_eq!(dynamics.u.shape(), (n * ticks, n));
        let predicted = dynamics.free_response(&x0) + &dynamics.u * DVector::from_vec(jerks.clone());

        let ct = CartTable::new(dt, H, G);
        let mut x = x0;
        for r in 0..n * ticks {
            x = ct.step(&x, jerks[r / ticks]);
            assert_relative_eq!(predicted[r], ct.cop(&x), epsilon = 1e-10);
        }

        // The last tick of each period is the sample-rate CoP row.
        let cop = LinearDynamics::new(DynamicsKind::Cop, n, T, H, G);
        for i in 0..n {
            let r = (i + 1) * ticks - 1;
            for j in 0..n {
                assert_relative_eq!(dynamics.u[(r, j)], cop.u[(i, j)], epsilon = 1e-12);
            }
        }
    }

    fn decided(step: usize) -> AffinePoint {
        AffinePoint::step(step)
    }

    #[test]
    fn selection_matrices_follow_step_numbers() {
        let known = AffinePoint::fixed(nalgebra::Vector2::new(0.0, 0.095));
        let centres = [known.clone(), known.clone(), decided(0), decided(0), decided(1)];
        let sel = SelectionMatrices::new(&centres, 2);
        assert_eq!(sel.steps(), 2);
        assert_eq!(sel.fixed_y.as_slice(), &[0.095, 0.095, 0.0, 0.0, 0.0]);
        assert_eq!(sel.v[(2, 0)], 1.0);
        assert_eq!(sel.v[(3, 0)], 1.0);
        assert_eq!(sel.v[(4, 1)], 1.0);
        assert_eq!(sel.v.column(0).sum(), 2.0);
        assert_eq!(sel.v_f[(1, 0)], -1.0);
        assert_eq!(sel.v_f[(1, 1)], 1.0);
    }

    #[test]
    fn double_support_centre_splits_between_steps() {
        let centres = [decided(1).lerp(&decided(0), 0.5)];
        let sel = SelectionMatrices::new(&centres, 2);
        assert_eq!(sel.v[(0, 0)], 0.5);
        assert_eq!(sel.v[(0, 1)], 0.5);
    }

    fn state(step_number: u32) -> SupportState {
        SupportState {
            phase: SupportPhase::SingleSupport,
            step_number,
            ..SupportState::initial(1)
        }
    }

    #[test]
    fn step_count_is_the_last_step_number() {
        assert_eq!(step_count(&[state(0), state(1), state(1), state(2)]), 2);
        assert_eq!(step_count(&[state(0); 4]), 0);
        assert_eq!(step_count(&[]), 0);
    }
}
