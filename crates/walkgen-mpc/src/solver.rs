//! Velocity-reference QP: assembly and solve.
//!
//! Uses Clarabel (pure Rust interior-point solver) to choose CoM jerks and
//! footstep positions over the preview horizon.
//!
//! # QP Formulation
//!
//! Decision variables: `z = [jx (N), jy (N), fx (K), fy (K)]`, where `K` is
//! the number of new footsteps in the horizon.
//!
//! Cost, per axis:
//!
//! ```text
//! α/2 |J|² + β/2 |Sv x̂ + Uv J - r|² + γ/2 |Sz x̂ + Uz J - V f - a|²
//! ```
//!
//! with `V f + a` the ZMP centre of each sample, affine in the footsteps.
//!
//! Subject to:
//! - ZMP: the CoP at every control tick inside its support polygon, which
//!   slides from one support to the next over the period ending on a change
//! - Footsteps: each new step inside the reach region of the previous one
//! - Committed step: first step pinned when the swing foot is already landing

use std::time::Instant;

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::NonnegativeConeT,
};
use nalgebra::{DMatrix, DVector, Vector3};
use tracing::debug;

use walkgen_core::config::QpWeights;

use crate::dynamics::{HorizonDynamics, SelectionMatrices};
use crate::types::{PreviewHorizon, QpProblem, QpSolution};

/// Velocity-reference QP for a fixed horizon length.
#[derive(Clone, Debug)]
pub struct VelRefQp {
    dynamics: HorizonDynamics,
    weights: QpWeights,
}

impl VelRefQp {
    /// `ticks` control instants per sample period carry ZMP bounds.
    pub fn new(n: usize, period: f64, ticks: usize, com_height: f64, gravity: f64, weights: QpWeights) -> Self {
        Self {
            dynamics: HorizonDynamics::new(n, period, ticks, com_height, gravity),
            weights,
        }
    }

    pub const fn weights(&self) -> &QpWeights {
        &self.weights
    }

    pub const fn dynamics(&self) -> &HorizonDynamics {
        &self.dynamics
    }

    /// Build `P`, `q`, `A` and `b` for one horizon.
    pub fn assemble(&self, horizon: &PreviewHorizon) -> QpProblem {
        let n = horizon.samples();
        let k = horizon.steps();
        let nv = 2 * (n + k);
        let sel = SelectionMatrices::new(&horizon.centering, k);
        let v = &sel.v;
        let uv = &self.dynamics.velocity.u;
        let uz = &self.dynamics.cop.u;
        let (alpha, beta, gamma) = (self.weights.jerk, self.weights.velocity, self.weights.cop_centering);

        // Cost
        let p_jj = DMatrix::identity(n, n) * alpha + uv.transpose() * uv * beta + uz.transpose() * uz * gamma;
        let p_jf = -(uz.transpose() * v) * gamma;
        let p_ff = v.transpose() * v * gamma;

        let mut p = DMatrix::zeros(nv, nv);
        let mut q = DVector::zeros(nv);
        for axis in 0..2 {
            let (state, r) = self.axis_data(horizon, axis);
            let target = if axis == 0 { &sel.fixed_x } else { &sel.fixed_y };
            let j0 = axis * n;
            let f0 = 2 * n + axis * k;
            p.view_mut((j0, j0), (n, n)).copy_from(&p_jj);

            let vel_err = self.dynamics.velocity.free_response(&state) - r;
            let cop_err = self.dynamics.cop.free_response(&state) - target;
            let q_j = uv.transpose() * vel_err * beta + uz.transpose() * &cop_err * gamma;
            let q_f = -(v.transpose() * cop_err) * gamma;
            q.rows_mut(j0, n).copy_from(&q_j);
            if k > 0 {
                p.view_mut((j0, f0), (n, k)).copy_from(&p_jf);
                p.view_mut((f0, j0), (k, n)).copy_from(&p_jf.transpose());
                p.view_mut((f0, f0), (k, k)).copy_from(&p_ff);
                q.rows_mut(f0, k).copy_from(&q_f);
            }
        }

        // Constraints
        let cop = &self.dynamics.cop_ticks;
        let sz_x = cop.free_response(&horizon.state_x);
        let sz_y = cop.free_response(&horizon.state_y);
        let mut rows: Vec<DVector<f64>> = Vec::new();
        let mut b: Vec<f64> = Vec::new();

        for (tick, bound) in horizon.zmp.iter().enumerate().take(cop.horizon()) {
            let edges = &bound.edges;
            let anchor = &bound.anchor;
            for e in 0..edges.len() {
                let (dx, dy, dc) = (edges.dx[e], edges.dy[e], edges.dc[e]);
                let mut row = DVector::zeros(nv);
                for j in 0..n {
                    row[j] = dx * cop.u[(tick, j)];
                    row[n + j] = dy * cop.u[(tick, j)];
                }
                for &(step, w) in anchor.steps.iter().filter(|(step, _)| *step < k) {
                    row[2 * n + step] -= dx * w;
                    row[2 * n + k + step] -= dy * w;
                }
                rows.push(row);
                b.push(dc - dx * sz_x[tick] - dy * sz_y[tick] + dx * anchor.constant.x + dy * anchor.constant.y);
            }
        }

        for (step, edges) in horizon.reach.iter().enumerate() {
            for e in 0..edges.len() {
                let (dx, dy, dc) = (edges.dx[e], edges.dy[e], edges.dc[e]);
                let mut row = DVector::zeros(nv);
                for c in 0..k {
                    row[2 * n + c] = dx * sel.v_f[(step, c)];
                    row[2 * n + k + c] = dy * sel.v_f[(step, c)];
                }
                let mut bound = dc;
                if step == 0 {
                    bound += dx * horizon.first_support.x + dy * horizon.first_support.y;
                }
                rows.push(row);
                b.push(bound);
            }
        }

        if let Some(pinned) = horizon.pinned_step {
            for (column, value) in [(2 * n, pinned.x), (2 * n + k, pinned.y)] {
                for sign in [1.0, -1.0] {
                    let mut row = DVector::zeros(nv);
                    row[column] = sign;
                    rows.push(row);
                    b.push(sign * value);
                }
            }
        }

        let a = DMatrix::from_fn(rows.len(), nv, |r, c| rows[r][c]);
        QpProblem {
            p,
            q,
            a,
            b: DVector::from_vec(b),
            n_jerk: n,
            n_steps: k,
        }
    }

    fn axis_data(&self, horizon: &PreviewHorizon, axis: usize) -> (Vector3<f64>, DVector<f64>) {
        let state = if axis == 0 { horizon.state_x } else { horizon.state_y };
        let r = DVector::from_iterator(horizon.samples(), horizon.reference.iter().map(|r| r[axis]));
        (state, r)
    }

    /// Solve an assembled problem.
    ///
    /// Never panics: a solver that cannot be set up or does not converge
    /// yields a zero solution with `converged == false`.
    pub fn solve(&self, problem: &QpProblem) -> QpSolution {
        let start = Instant::now();
        let (n, k) = (problem.n_jerk, problem.n_steps);

        let settings = match DefaultSettingsBuilder::default()
            .max_iter(self.weights.max_solver_iters)
            .verbose(false)
            .build()
        {
            Ok(settings) => settings,
            Err(_) => return QpSolution::zeros(n, k, "invalid settings"),
        };

        let p_csc = dmatrix_to_csc(&problem.p, true);
        let a_csc = dmatrix_to_csc(&problem.a, false);
        let cones = vec![NonnegativeConeT(problem.constraints())];
        let q_slice: Vec<f64> = problem.q.iter().copied().collect();
        let b_slice: Vec<f64> = problem.b.iter().copied().collect();

        let Ok(mut solver) = DefaultSolver::new(&p_csc, &q_slice, &a_csc, &b_slice, &cones, settings)
        else {
            return QpSolution::zeros(n, k, "setup failed");
        };
        solver.solve();
        let sol = &solver.solution;
        let converged = matches!(sol.status, SolverStatus::Solved | SolverStatus::AlmostSolved);

        let mut out = QpSolution::zeros(n, k, status_name(&sol.status));
        out.converged = converged;
        out.iterations = sol.iterations;
        if converged {
            out.jerk_x = DVector::from_column_slice(&sol.x[..n]);
            out.jerk_y = DVector::from_column_slice(&sol.x[n..2 * n]);
            out.steps_x = DVector::from_column_slice(&sol.x[2 * n..2 * n + k]);
            out.steps_y = DVector::from_column_slice(&sol.x[2 * n + k..2 * (n + k)]);
        }
        out.solve_time_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
        debug!(
            status = out.status,
            iterations = out.iterations,
            solve_time_us = out.solve_time_us,
            "qp solved"
        );
        out
    }
}

fn status_name(status: &SolverStatus) -> &'static str {
    match status {
        SolverStatus::Solved => "solved",
        SolverStatus::AlmostSolved => "almost solved",
        SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => "primal infeasible",
        SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => "dual infeasible",
        SolverStatus::MaxIterations => "max iterations",
        SolverStatus::MaxTime => "max time",
        SolverStatus::NumericalError => "numerical error",
        SolverStatus::InsufficientProgress => "insufficient progress",
        _ => "unsolved",
    }
}

// ---------------------------------------------------------------------------
// Sparse conversion helpers
// ---------------------------------------------------------------------------

/// Entries this small are left out of the sparse pattern.
const DROP_TOLERANCE: f64 = 1e-15;

/// Dense matrix to Clarabel's column-compressed form. With `upper_triangle`
/// only entries on or above the diagonal are kept, as Clarabel wants for `P`.
fn dmatrix_to_csc(m: &DMatrix<f64>, upper_triangle: bool) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = Vec::with_capacity(ncols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();
    colptr.push(0);
    for (j, column) in m.column_iter().enumerate() {
        let last = if upper_triangle { (j + 1).min(nrows) } else { nrows };
        for (i, v) in column.iter().take(last).enumerate() {
            if v.abs() > DROP_TOLERANCE {
                rowval.push(i);
                nzval.push(*v);
            }
        }
        colptr.push(rowval.len());
    }
    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::horizon::{HorizonInputs, HorizonTiming, build_horizon};
    use crate::polygon::FeasibilityRegions;
    use crate::support::{SupportFsm, SupportSelector, SupportTracker};
    use approx::assert_relative_eq;
    use nalgebra::Vector2;
    use walkgen_core::config::WalkConfig;
    use walkgen_core::types::{FootPair, FootPose, ReferenceVelocity, SupportState};

    fn horizon_at(reference: ReferenceVelocity, times: &[f64], state_x: Vector3<f64>) -> (VelRefQp, PreviewHorizon) {
        let cfg = WalkConfig::default();
        let regions = FeasibilityRegions::new(&cfg.foot, &cfg.feasibility, &cfg.stance);
        let mut tracker = SupportTracker::new(
            SupportFsm::new(&cfg.timing, &cfg.stance),
            SupportState::initial(cfg.stance.number_steps),
        );
        for &t in times {
            tracker.evaluate(SupportSelector::Current, t, &reference);
        }
        let now = times.last().copied().unwrap_or(0.0);
        let n = cfg.preview.horizon;
        let states = tracker.preview(now, &reference, n, cfg.preview.sample_period);
        let inputs = HorizonInputs {
            support: tracker.current(),
            states: &states,
            feet: FootPair::new(FootPose::new(0.0, 0.095, 0.0, 0.0), FootPose::new(0.0, -0.095, 0.0, 0.0)),
            trunk_yaw: 0.0,
            reference,
            state_x,
            state_y: Vector3::zeros(),
            pinned_step: None,
        };
        let timing = HorizonTiming {
            period: cfg.preview.sample_period,
            ticks: cfg.ticks_per_sample(),
        };
        let horizon = build_horizon(&regions, &inputs, timing, Vector2::zeros()).unwrap();
        let qp = VelRefQp::new(
            n,
            cfg.preview.sample_period,
            timing.ticks,
            cfg.preview.com_height,
            cfg.preview.gravity,
            cfg.weights,
        );
        (qp, horizon)
    }

    #[test]
    fn csc_conversion_keeps_nonzeros() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 3.0]);
        let full = dmatrix_to_csc(&m, false);
        let upper = dmatrix_to_csc(&m, true);
        assert_eq!(full.nzval.len(), 4);
        assert_eq!(full.rowval, vec![0, 1, 0, 1]);
        assert_eq!(upper.nzval, vec![1.0, 2.0, 3.0]);
        assert_eq!(upper.colptr, vec![0, 1, 3]);

        let wide = DMatrix::from_row_slice(2, 3, &[0.0, 4.0, 0.0, 5.0, 0.0, 6.0]);
        let sparse = dmatrix_to_csc(&wide, false);
        assert_eq!(sparse.colptr, vec![0, 1, 2, 3]);
        assert_eq!(sparse.rowval, vec![1, 0, 1]);
    }

    #[test]
    fn cost_matrix_is_symmetric() {
        let (qp, horizon) = horizon_at(ReferenceVelocity::new(0.2, 0.0, 0.0), &[0.0, 0.8], Vector3::zeros());
        let problem = qp.assemble(&horizon);
        assert_eq!(problem.n_steps, 2);
        assert_eq!(problem.p.shape(), (36, 36));
        assert_relative_eq!(problem.p.clone(), problem.p.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn standing_still_needs_no_jerk() {
        let (qp, horizon) = horizon_at(ReferenceVelocity::default(), &[0.0], Vector3::zeros());
        let problem = qp.assemble(&horizon);
        let solution = qp.solve(&problem);
        assert!(solution.converged, "status {}", solution.status);
        assert!(solution.jerk_x.amax() < 1e-4);
        assert!(solution.jerk_y.amax() < 1e-4);
    }

    #[test]
    fn walking_solution_respects_constraints() {
        let (qp, horizon) = horizon_at(ReferenceVelocity::new(0.2, 0.0, 0.0), &[0.0, 0.8], Vector3::zeros());
        let problem = qp.assemble(&horizon);
        let solution = qp.solve(&problem);
        assert!(solution.converged, "status {}", solution.status);
        assert!(problem.max_violation(&solution.stacked()) < 1e-6);

        // Right foot lands in front of and beside the left support.
        let step = solution.first_step().unwrap();
        assert!(step.y < 0.0);
        assert!(step.x > -1e-6);
        // Moving forward means pushing the CoM forward.
        assert!(solution.jerk_x[0] > 0.0);
    }

    #[test]
    fn pinned_step_is_honoured() {
        let (qp, mut horizon) = horizon_at(ReferenceVelocity::new(0.2, 0.0, 0.0), &[0.0, 0.8], Vector3::zeros());
        horizon.pinned_step = Some(Vector2::new(0.05, -0.15));
        let solution = qp.solve(&qp.assemble(&horizon));
        assert!(solution.converged);
        let step = solution.first_step().unwrap();
        assert_relative_eq!(step.x, 0.05, epsilon = 1e-5);
        assert_relative_eq!(step.y, -0.15, epsilon = 1e-5);
    }

    #[test]
    fn zmp_is_bounded_at_every_control_tick() {
        let (qp, horizon) = horizon_at(ReferenceVelocity::new(0.2, 0.0, 0.0), &[0.0, 0.8], Vector3::zeros());
        let problem = qp.assemble(&horizon);
        let edges: usize = horizon.zmp.iter().map(|b| b.edges.len()).sum();
        assert_eq!(horizon.zmp.len(), 16 * 20);
        assert!(problem.constraints() >= edges);

        let solution = qp.solve(&problem);
        assert!(solution.converged, "status {}", solution.status);
        let cop = &qp.dynamics().cop_ticks;
        let zx = cop.free_response(&horizon.state_x) + &cop.u * &solution.jerk_x;
        let zy = cop.free_response(&horizon.state_y) + &cop.u * &solution.jerk_y;
        let decisions: Vec<Vector2<f64>> = solution
            .steps_x
            .iter()
            .zip(solution.steps_y.iter())
            .map(|(x, y)| Vector2::new(*x, *y))
            .collect();
        for (tick, bound) in horizon.zmp.iter().enumerate() {
            let at = bound.anchor.evaluate(&decisions);
            let p = Vector2::new(zx[tick], zy[tick]) - at;
            for e in 0..bound.edges.len() {
                let c = &bound.edges;
                assert!(c.dx[e] * p.x + c.dy[e] * p.y <= c.dc[e] + 1e-6, "tick {tick}");
            }
        }
    }

    #[test]
    fn unreachable_pinned_step_is_infeasible() {
        let (qp, mut horizon) = horizon_at(ReferenceVelocity::new(0.2, 0.0, 0.0), &[0.0, 0.8], Vector3::zeros());
        // Committed landing two metres ahead of the support foot.
        horizon.pinned_step = Some(Vector2::new(2.0, -0.1));
        let solution = qp.solve(&qp.assemble(&horizon));
        assert!(!solution.converged);
        assert_eq!(solution.status, "primal infeasible");
        assert_eq!(solution.first_jerk(), Vector2::zeros());
    }

    #[test]
    fn iteration_cap_reports_failure() {
        let (mut qp, horizon) = horizon_at(ReferenceVelocity::new(0.2, 0.0, 0.0), &[0.0, 0.8], Vector3::zeros());
        qp.weights.max_solver_iters = 1;
        let problem = qp.assemble(&horizon);
        let solution = qp.solve(&problem);
        assert!(!solution.converged);
        assert_eq!(solution.first_jerk(), Vector2::zeros());
    }
}
