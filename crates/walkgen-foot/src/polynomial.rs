//! Scalar polynomial segments used by the swing trajectories.
//!
//! A segment is defined on `[0, T]`. Evaluation clamps the time into that
//! interval, so querying past the end returns the final boundary values.
//! An interval shorter than [`MIN_INTERVAL`] yields a constant polynomial
//! sitting at the final position.

/// Shortest interval treated as a real motion.
pub const MIN_INTERVAL: f64 = 1e-9;

/// Polynomial of degree `N - 1`: `p(t) = Σ coeffs[k] t^k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Polynomial<const N: usize> {
    coeffs: [f64; N],
    duration: f64,
}

/// Cubic segment (x, y, theta and the tilt angles).
pub type Cubic = Polynomial<4>;
/// Quartic segment (z, with an apex at mid-interval).
pub type Quartic = Polynomial<5>;

impl<const N: usize> Default for Polynomial<N> {
    fn default() -> Self {
        Self::constant(0.0)
    }
}

impl<const N: usize> Polynomial<N> {
    /// Constant polynomial with zero duration.
    pub const fn constant(value: f64) -> Self {
        let mut coeffs = [0.0; N];
        if N > 0 {
            coeffs[0] = value;
        }
        Self {
            coeffs,
            duration: 0.0,
        }
    }

    /// Polynomial from raw coefficients, lowest degree first.
    pub const fn from_parts(coeffs: [f64; N], duration: f64) -> Self {
        Self { coeffs, duration }
    }

    pub const fn duration(&self) -> f64 {
        self.duration
    }

    pub const fn coefficients(&self) -> &[f64; N] {
        &self.coeffs
    }

    fn clamp(&self, t: f64) -> f64 {
        t.clamp(0.0, self.duration)
    }

    /// Position at `t`.
    pub fn position(&self, t: f64) -> f64 {
        let t = self.clamp(t);
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * t + c)
    }

    /// First derivative at `t`.
    pub fn velocity(&self, t: f64) -> f64 {
        let t = self.clamp(t);
        let mut acc = 0.0;
        for k in (1..N).rev() {
            acc = acc * t + k as f64 * self.coeffs[k];
        }
        acc
    }

    /// Second derivative at `t`.
    pub fn acceleration(&self, t: f64) -> f64 {
        let t = self.clamp(t);
        let mut acc = 0.0;
        for k in (2..N).rev() {
            acc = acc * t + (k * (k - 1)) as f64 * self.coeffs[k];
        }
        acc
    }
}

impl Polynomial<4> {
    /// Rest-to-rest cubic from `p0` to `pf`.
    pub fn new(duration: f64, p0: f64, pf: f64) -> Self {
        Self::with_init_speed(duration, p0, pf, 0.0)
    }

    /// Cubic with `p(0)=p0`, `p'(0)=v0`, `p(T)=pf`, `p'(T)=0`.
    pub fn with_init_speed(duration: f64, p0: f64, pf: f64, v0: f64) -> Self {
        if duration < MIN_INTERVAL {
            return Self::constant(pf);
        }
        let t = duration;
        let d = pf - p0 - v0 * t;
        Self {
            coeffs: [
                p0,
                v0,
                (3.0 * d + v0 * t) / (t * t),
                (-2.0 * d - v0 * t) / (t * t * t),
            ],
            duration,
        }
    }
}

impl Polynomial<5> {
    /// Quartic leaving `p0` at rest, passing through `apex` at mid-interval
    /// and landing on `pf` at rest.
    pub fn new(duration: f64, p0: f64, pf: f64, apex: f64) -> Self {
        Self::with_init_speed(duration, p0, pf, apex, 0.0)
    }

    /// Quartic with `p(0)=p0`, `p'(0)=v0`, `p(T/2)=apex`, `p(T)=pf`,
    /// `p'(T)=0`.
    pub fn with_init_speed(duration: f64, p0: f64, pf: f64, apex: f64, v0: f64) -> Self {
        if duration < MIN_INTERVAL {
            return Self::constant(pf);
        }
        let t = duration;
        // Solved in normalised time u = t/T, where the initial slope is v0*T.
        let w = v0 * t;
        let a = pf - p0 - w;
        let b = -w;
        let c = 16.0 * (apex - p0) - 8.0 * w;
        let u2 = -5.0 * a + b + c;
        let u3 = 14.0 * a - 3.0 * b - 2.0 * c;
        let u4 = c - 8.0 * a + 2.0 * b;
        Self {
            coeffs: [p0, v0, u2 / t.powi(2), u3 / t.powi(3), u4 / t.powi(4)],
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cubic_boundary_conditions() {
        let p = Cubic::new(0.7, 0.1, 0.4);
        assert_relative_eq!(p.position(0.0), 0.1, epsilon = 1e-12);
        assert_relative_eq!(p.position(0.7), 0.4, epsilon = 1e-12);
        assert_relative_eq!(p.velocity(0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.velocity(0.7), 0.0, epsilon = 1e-12);
        // Symmetric rest-to-rest motion crosses the midpoint at T/2.
        assert_relative_eq!(p.position(0.35), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn cubic_with_initial_speed() {
        let p = Cubic::with_init_speed(0.5, -0.2, 0.3, 0.8);
        assert_relative_eq!(p.position(0.0), -0.2, epsilon = 1e-12);
        assert_relative_eq!(p.velocity(0.0), 0.8, epsilon = 1e-12);
        assert_relative_eq!(p.position(0.5), 0.3, epsilon = 1e-12);
        assert_relative_eq!(p.velocity(0.5), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn cubic_acceleration_matches_finite_difference() {
        let p = Cubic::with_init_speed(1.0, 0.0, 1.0, 0.3);
        let h = 1e-6;
        let fd = (p.velocity(0.4 + h) - p.velocity(0.4 - h)) / (2.0 * h);
        assert_relative_eq!(p.acceleration(0.4), fd, epsilon = 1e-6);
    }

    #[test]
    fn evaluation_clamps_to_interval() {
        let p = Cubic::new(0.5, 0.0, 1.0);
        assert_relative_eq!(p.position(-1.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.position(3.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.velocity(3.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_interval_is_constant_at_target() {
        let p = Cubic::with_init_speed(0.0, 0.0, 2.0, 5.0);
        assert_relative_eq!(p.position(0.0), 2.0);
        assert_relative_eq!(p.position(1.0), 2.0);
        assert_relative_eq!(p.velocity(0.5), 0.0);
        let q = Quartic::new(-1.0, 0.0, 0.3, 1.0);
        assert_relative_eq!(q.position(0.2), 0.3);
    }

    #[test]
    fn quartic_flat_ground_apex() {
        let q = Quartic::new(0.8, 0.0, 0.0, 0.07);
        assert_relative_eq!(q.position(0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(q.position(0.4), 0.07, epsilon = 1e-12);
        assert_relative_eq!(q.position(0.8), 0.0, epsilon = 1e-12);
        assert_relative_eq!(q.velocity(0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(q.velocity(0.8), 0.0, epsilon = 1e-12);
        // Symmetric profile peaks at the middle.
        assert_relative_eq!(q.velocity(0.4), 0.0, epsilon = 1e-12);
        for i in 0..=80 {
            let t = f64::from(i) * 0.01;
            assert!(q.position(t) >= -1e-12);
            assert!(q.position(t) <= 0.07 + 1e-12);
        }
    }

    #[test]
    fn quartic_step_up() {
        let q = Quartic::new(1.0, 0.0, 0.15, 0.22);
        assert_relative_eq!(q.position(0.5), 0.22, epsilon = 1e-12);
        assert_relative_eq!(q.position(1.0), 0.15, epsilon = 1e-12);
        assert_relative_eq!(q.velocity(1.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn quartic_with_initial_speed() {
        let q = Quartic::with_init_speed(0.6, 0.02, 0.0, 0.08, 0.1);
        assert_relative_eq!(q.position(0.0), 0.02, epsilon = 1e-12);
        assert_relative_eq!(q.velocity(0.0), 0.1, epsilon = 1e-12);
        assert_relative_eq!(q.position(0.3), 0.08, epsilon = 1e-12);
        assert_relative_eq!(q.position(0.6), 0.0, epsilon = 1e-12);
        assert_relative_eq!(q.velocity(0.6), 0.0, epsilon = 1e-12);
    }
}
