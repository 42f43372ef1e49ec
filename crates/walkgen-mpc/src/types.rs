use nalgebra::{DMatrix, DVector, Rotation2, Vector2, Vector3};

use walkgen_core::types::SupportState;

use crate::polygon::{ConvexHull, LinearConstraints};

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

/// Point affine in the footstep decisions: `constant + Σ w·f_k`.
///
/// `steps` holds `(k - 1, w)` pairs, `k ≥ 1` being the new step index.
#[derive(Clone, Debug, PartialEq)]
pub struct AffinePoint {
    pub constant: Vector2<f64>,
    pub steps: Vec<(usize, f64)>,
}

impl AffinePoint {
    pub const fn fixed(point: Vector2<f64>) -> Self {
        Self {
            constant: point,
            steps: Vec::new(),
        }
    }

    /// Position of decision `index` (new step `index + 1`).
    pub fn step(index: usize) -> Self {
        Self {
            constant: Vector2::zeros(),
            steps: vec![(index, 1.0)],
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.steps.is_empty()
    }

    /// `(1 - s)·self + s·other`.
    #[must_use]
    pub fn lerp(&self, other: &Self, s: f64) -> Self {
        let mut steps: Vec<(usize, f64)> = Vec::with_capacity(self.steps.len() + other.steps.len());
        let weighted = self
            .steps
            .iter()
            .map(|(k, w)| (*k, w * (1.0 - s)))
            .chain(other.steps.iter().map(|(k, w)| (*k, w * s)));
        for (k, w) in weighted {
            match steps.iter_mut().find(|(j, _)| *j == k) {
                Some((_, total)) => *total += w,
                None => steps.push((k, w)),
            }
        }
        steps.retain(|(_, w)| *w != 0.0);
        Self {
            constant: self.constant * (1.0 - s) + other.constant * s,
            steps,
        }
    }

    #[must_use]
    pub fn offset(&self, by: Vector2<f64>) -> Self {
        Self {
            constant: self.constant + by,
            steps: self.steps.clone(),
        }
    }

    /// Value for decided footsteps; missing decisions count as the origin.
    pub fn evaluate(&self, decisions: &[Vector2<f64>]) -> Vector2<f64> {
        self.steps.iter().fold(self.constant, |acc, (k, w)| {
            acc + decisions.get(*k).map_or_else(Vector2::zeros, |f| f * *w)
        })
    }
}

/// ZMP region of one support state: an origin-centred polygon placed at an
/// anchor that may depend on footstep decisions.
#[derive(Clone, Debug, PartialEq)]
pub struct ZmpRegion {
    pub local: ConvexHull,
    pub anchor: AffinePoint,
    /// Yaw the template was rotated by.
    pub yaw: f64,
}

impl ZmpRegion {
    /// Region at fraction `s ∈ [0, 1]` of a support change from `self` to
    /// `other`.
    #[must_use]
    pub fn blend(&self, other: &Self, s: f64) -> Self {
        Self {
            local: self.local.blend(&other.local, s),
            anchor: self.anchor.lerp(&other.anchor, s),
            yaw: self.yaw + (other.yaw - self.yaw) * s.clamp(0.0, 1.0),
        }
    }

    /// ZMP centering target: the anchor moved by the rotated neutral offset.
    pub fn centre(&self, neutral_offset: Vector2<f64>) -> AffinePoint {
        self.anchor.offset(Rotation2::new(self.yaw) * neutral_offset)
    }

    /// World-frame polygon for decided footsteps.
    pub fn placed(&self, decisions: &[Vector2<f64>]) -> ConvexHull {
        let at = self.anchor.evaluate(decisions);
        self.local.translated(at.x, at.y)
    }
}

/// Half-planes the ZMP must satisfy at one control tick, relative to the
/// anchor.
#[derive(Clone, Debug)]
pub struct ZmpBound {
    pub edges: LinearConstraints,
    pub anchor: AffinePoint,
}

// ---------------------------------------------------------------------------
// PreviewHorizon
// ---------------------------------------------------------------------------

/// Everything the QP needs to know about the next `N` samples.
///
/// Row `i` of every per-sample vector belongs to time `t + (i+1)T`.
#[derive(Clone, Debug)]
pub struct PreviewHorizon {
    /// Previewed support state of each sample.
    pub states: Vec<SupportState>,
    /// ZMP region of the current support (index 0) and of each sample.
    pub regions: Vec<ZmpRegion>,
    /// ZMP centering target of each sample.
    pub centering: Vec<AffinePoint>,
    /// ZMP bounds at every control tick of the horizon; entry `r` belongs
    /// to `t + (r+1)·dt`. Ticks inside the sample period that ends on a
    /// support change use the blend of both regions.
    pub zmp: Vec<ZmpBound>,
    /// Origin-centred landing half-planes of new step `k` (index `k - 1`),
    /// relative to step `k - 1`.
    pub reach: Vec<LinearConstraints>,
    /// Yaw the trunk is predicted to have when step `k` is placed.
    pub step_yaws: Vec<f64>,
    /// Support foot of the step preceding the first new one.
    pub first_support: Vector2<f64>,
    /// When set, the first new step is already committed to this position.
    pub pinned_step: Option<Vector2<f64>>,
    /// World-frame velocity reference of each sample.
    pub reference: Vec<Vector2<f64>>,
    /// `[c, ċ, c̈]` along x.
    pub state_x: Vector3<f64>,
    /// `[c, ċ, c̈]` along y.
    pub state_y: Vector3<f64>,
}

impl PreviewHorizon {
    pub fn samples(&self) -> usize {
        self.states.len()
    }

    /// Number of footstep decisions.
    pub fn steps(&self) -> usize {
        self.reach.len()
    }
}

// ---------------------------------------------------------------------------
// QpProblem
// ---------------------------------------------------------------------------

/// `min ½ zᵀ P z + qᵀ z` subject to `A z <= b`, with
/// `z = [jx (N), jy (N), fx (K), fy (K)]`.
#[derive(Clone, Debug)]
pub struct QpProblem {
    pub p: DMatrix<f64>,
    pub q: DVector<f64>,
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
    pub n_jerk: usize,
    pub n_steps: usize,
}

impl QpProblem {
    pub fn variables(&self) -> usize {
        2 * (self.n_jerk + self.n_steps)
    }

    pub fn constraints(&self) -> usize {
        self.b.len()
    }

    /// Largest violation of `A z <= b`, zero when every row holds.
    pub fn max_violation(&self, z: &DVector<f64>) -> f64 {
        (&self.a * z - &self.b).iter().fold(0.0_f64, |m, v| m.max(*v))
    }

    /// Value of the objective at `z`.
    pub fn objective(&self, z: &DVector<f64>) -> f64 {
        0.5 * z.dot(&(&self.p * z)) + self.q.dot(z)
    }
}

// ---------------------------------------------------------------------------
// QpSolution
// ---------------------------------------------------------------------------

/// Result of one solve.
#[derive(Clone, Debug)]
pub struct QpSolution {
    pub jerk_x: DVector<f64>,
    pub jerk_y: DVector<f64>,
    pub steps_x: DVector<f64>,
    pub steps_y: DVector<f64>,
    /// Solver status, for logs.
    pub status: &'static str,
    /// Whether the solver reported a usable optimum.
    pub converged: bool,
    pub iterations: u32,
    /// Solve time in microseconds.
    pub solve_time_us: u64,
}

impl QpSolution {
    /// All-zero solution used when the solver gives up.
    pub fn zeros(n_jerk: usize, n_steps: usize, status: &'static str) -> Self {
        Self {
            jerk_x: DVector::zeros(n_jerk),
            jerk_y: DVector::zeros(n_jerk),
            steps_x: DVector::zeros(n_steps),
            steps_y: DVector::zeros(n_steps),
            status,
            converged: false,
            iterations: 0,
            solve_time_us: 0,
        }
    }

    /// Jerk to apply over the next sample period.
    pub fn first_jerk(&self) -> Vector2<f64> {
        match (self.jerk_x.get(0), self.jerk_y.get(0)) {
            (Some(x), Some(y)) => Vector2::new(*x, *y),
            _ => Vector2::zeros(),
        }
    }

    /// Position of the first new footstep, if any was decided.
    pub fn first_step(&self) -> Option<Vector2<f64>> {
        Some(Vector2::new(*self.steps_x.get(0)?, *self.steps_y.get(0)?))
    }

    /// Stack back into the QP variable layout.
    pub fn stacked(&self) -> DVector<f64> {
        let mut z = Vec::with_capacity(2 * (self.jerk_x.len() + self.steps_x.len()));
        z.extend(self.jerk_x.iter());
        z.extend(self.jerk_y.iter());
        z.extend(self.steps_x.iter());
        z.extend(self.steps_y.iter());
        DVector::from_vec(z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affine_points_blend_their_decisions() {
        let known = AffinePoint::fixed(Vector2::new(0.0, 0.2));
        let decided = AffinePoint::step(0);
        let mid = known.lerp(&decided, 0.5);
        assert_eq!(mid.steps, vec![(0, 0.5)]);
        let f = [Vector2::new(0.4, 0.0)];
        assert!((mid.evaluate(&f) - Vector2::new(0.2, 0.1)).norm() < 1e-12);
        // Same decision on both sides collapses into one weight.
        let both = decided.lerp(&AffinePoint::step(0), 0.3);
        assert_eq!(both.steps, vec![(0, 1.0)]);
        assert!(!both.is_fixed());
        assert!(known.lerp(&known, 0.7).is_fixed());
    }

    #[test]
    fn region_blend_moves_between_supports() {
        let local = ConvexHull::rectangle(-0.1, 0.1, -0.05, 0.05);
        let left = ZmpRegion {
            local: local.clone(),
            anchor: AffinePoint::fixed(Vector2::new(0.0, 0.1)),
            yaw: 0.0,
        };
        let right = ZmpRegion {
            local,
            anchor: AffinePoint::step(0),
            yaw: 0.2,
        };
        let decisions = [Vector2::new(0.2, -0.1)];
        let half = left.blend(&right, 0.5).placed(&decisions);
        assert!(half.contains(&Vector2::new(0.1, 0.0), 1e-12));
        assert!(!half.contains(&Vector2::new(0.0, 0.1), 0.0));
        assert_eq!(left.blend(&right, 1.0), right);
        assert!((left.blend(&right, 0.5).yaw - 0.1).abs() < 1e-12);
    }

    #[test]
    fn zero_solution_has_no_step() {
        let s = QpSolution::zeros(16, 0, "max iterations");
        assert!(!s.converged);
        assert_eq!(s.first_jerk(), Vector2::zeros());
        assert!(s.first_step().is_none());
        assert_eq!(s.stacked().len(), 32);
    }

    #[test]
    fn violation_and_objective() {
        let problem = QpProblem {
            p: DMatrix::identity(2, 2),
            q: DVector::from_vec(vec![-1.0, 0.0]),
            a: DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            b: DVector::from_vec(vec![1.0]),
            n_jerk: 1,
            n_steps: 0,
        };
        assert_eq!(problem.variables(), 2);
        assert_eq!(problem.constraints(), 1);
        let inside = DVector::from_vec(vec![0.5, 0.25]);
        let outside = DVector::from_vec(vec![1.0, 0.5]);
        assert_eq!(problem.max_violation(&inside), 0.0);
        assert!((problem.max_violation(&outside) - 0.5).abs() < 1e-12);
        assert!((problem.objective(&inside) - (0.5 * 0.3125 - 0.5)).abs() < 1e-12);
    }
}
