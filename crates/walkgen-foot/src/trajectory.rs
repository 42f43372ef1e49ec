//! Swing foot trajectory generator.
//!
//! One polynomial per axis describes the displacement of the swinging foot
//! from its lift-off pose. A single-support interval of length `T` is split
//! in three windows by the modulation fraction:
//!
//! ```text
//!  0          liftoff_end              landing_start          T
//!  |-- lift-off --|------- flight ----------|---- landing ----|
//!     z, omega        x, y, theta, z, omega     z, omega
//! ```
//!
//! x, y and theta only move during the flight window. z follows a quartic
//! over the whole interval. The tilt angle rises during lift-off, reverses
//! during flight and returns to zero during landing. A geometric offset keeps
//! the tilted sole above the ground.

use nalgebra::{Rotation2, Vector2, Vector3};
use tracing::trace;

use walkgen_core::config::{FootGeometry, SwingConfig};
use walkgen_core::error::EditError;
use walkgen_core::types::{FootAbsolutePosition, FootPose, RelativeFootPosition, StepType};

use crate::polynomial::{Cubic, Quartic};

// ---------------------------------------------------------------------------
// FootAxis
// ---------------------------------------------------------------------------

/// Independently shaped coordinates of a swinging foot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FootAxis {
    X,
    Y,
    Z,
    Theta,
    Omega,
    Omega2,
}

impl FootAxis {
    pub const ALL: [Self; 6] = [
        Self::X,
        Self::Y,
        Self::Z,
        Self::Theta,
        Self::Omega,
        Self::Omega2,
    ];
}

impl TryFrom<usize> for FootAxis {
    type Error = EditError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(EditError::InvalidAxis(index))
    }
}

// ---------------------------------------------------------------------------
// SwingWindows
// ---------------------------------------------------------------------------

/// Window boundaries of one single-support interval, local time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingWindows {
    pub duration: f64,
    pub liftoff_end: f64,
    pub landing_start: f64,
}

impl SwingWindows {
    pub fn new(duration: f64, modulation: f64) -> Self {
        let flight = modulation * duration;
        let liftoff_end = (duration - flight) * 0.5;
        Self {
            duration,
            liftoff_end,
            landing_start: liftoff_end + flight,
        }
    }

    pub fn flight(&self) -> f64 {
        self.landing_start - self.liftoff_end
    }

    /// Time since the flight window opened, clamped into it.
    fn flight_time(&self, t: f64) -> f64 {
        (t - self.liftoff_end).clamp(0.0, self.flight())
    }

    fn in_flight(&self, t: f64) -> bool {
        t >= self.liftoff_end && t < self.landing_start
    }
}

// ---------------------------------------------------------------------------
// FootTrajectoryGenerator
// ---------------------------------------------------------------------------

/// Per-foot swing generator. Parameters are reset for every step.
#[derive(Debug, Clone)]
pub struct FootTrajectoryGenerator {
    geometry: FootGeometry,
    step_height: f64,
    modulation: f64,
    /// Lift-off / landing tilt magnitude, radians.
    omega: f64,
    windows: SwingWindows,
    x: Cubic,
    y: Cubic,
    z: Quartic,
    theta: Cubic,
    omega_poly: Cubic,
    omega2_poly: Cubic,
}

impl FootTrajectoryGenerator {
    pub fn new(geometry: FootGeometry, swing: &SwingConfig) -> Self {
        Self {
            geometry,
            step_height: swing.step_height,
            modulation: swing.modulation,
            omega: swing.omega,
            windows: SwingWindows::new(0.0, swing.modulation),
            x: Cubic::default(),
            y: Cubic::default(),
            z: Quartic::default(),
            theta: Cubic::default(),
            omega_poly: Cubic::default(),
            omega2_poly: Cubic::default(),
        }
    }

    pub const fn windows(&self) -> SwingWindows {
        self.windows
    }

    pub const fn step_height(&self) -> f64 {
        self.step_height
    }

    pub fn set_step_height(&mut self, height: f64) {
        self.step_height = height.max(0.0);
    }

    pub const fn omega(&self) -> f64 {
        self.omega
    }

    /// Set the tilt magnitude, radians.
    pub fn set_omega(&mut self, omega: f64) {
        self.omega = omega;
    }

    /// Configure one axis from rest at zero displacement.
    pub fn set_parameters(&mut self, axis: FootAxis, interval: f64, final_pos: f64) {
        self.set_parameters_with_init(axis, interval, final_pos, 0.0, 0.0);
    }

    /// Configure one axis from an initial position and speed.
    ///
    /// For [`FootAxis::Z`] the apex is placed `step_height` above the higher
    /// of the two boundary positions.
    pub fn set_parameters_with_init(
        &mut self,
        axis: FootAxis,
        interval: f64,
        final_pos: f64,
        init_pos: f64,
        init_speed: f64,
    ) {
        let cubic = Cubic::with_init_speed(interval, init_pos, final_pos, init_speed);
        match axis {
            FootAxis::X => self.x = cubic,
            FootAxis::Y => self.y = cubic,
            FootAxis::Theta => self.theta = cubic,
            FootAxis::Omega => self.omega_poly = cubic,
            FootAxis::Omega2 => self.omega2_poly = cubic,
            FootAxis::Z => {
                let apex = init_pos.max(final_pos) + self.step_height;
                self.z = Quartic::with_init_speed(interval, init_pos, final_pos, apex, init_speed);
            }
        }
    }

    /// Index-based variant used by scripted edits.
    pub fn set_parameters_by_index(
        &mut self,
        index: usize,
        interval: f64,
        final_pos: f64,
    ) -> Result<(), EditError> {
        let axis = FootAxis::try_from(index)?;
        self.set_parameters(axis, interval, final_pos);
        Ok(())
    }

    /// Raw polynomial position of one axis.
    pub fn compute(&self, axis: FootAxis, t: f64) -> f64 {
        self.evaluate(axis, t).0
    }

    /// Raw polynomial `(position, velocity)` of one axis.
    pub fn evaluate(&self, axis: FootAxis, t: f64) -> (f64, f64) {
        match axis {
            FootAxis::X => (self.x.position(t), self.x.velocity(t)),
            FootAxis::Y => (self.y.position(t), self.y.velocity(t)),
            FootAxis::Z => (self.z.position(t), self.z.velocity(t)),
            FootAxis::Theta => (self.theta.position(t), self.theta.velocity(t)),
            FootAxis::Omega => (self.omega_poly.position(t), self.omega_poly.velocity(t)),
            FootAxis::Omega2 => (self.omega2_poly.position(t), self.omega2_poly.velocity(t)),
        }
    }

    /// Configure every axis for a swing from `start` to `target` over one
    /// single-support interval.
    pub fn plan_step(&mut self, start: &FootAbsolutePosition, target: FootPose, duration: f64) {
        self.windows = SwingWindows::new(duration, self.modulation);
        let flight = self.windows.flight();
        let w = self.windows;

        self.set_parameters(FootAxis::X, flight, target.x - start.position.x);
        self.set_parameters(FootAxis::Y, flight, target.y - start.position.y);
        self.set_parameters(FootAxis::Theta, flight, target.theta - start.theta);
        self.set_parameters(FootAxis::Z, duration, target.z - start.position.z);
        self.set_parameters(FootAxis::Omega, w.liftoff_end, self.omega);
        self.set_parameters(FootAxis::Omega2, flight, 2.0 * self.omega);
        trace!(
            duration,
            liftoff_end = w.liftoff_end,
            landing_start = w.landing_start,
            "swing planned"
        );
    }

    /// Move the landing target of a swing already in progress.
    ///
    /// `t` is the local time of the swing. The planar axes are re-solved from
    /// their present displacement and rate so the trajectory stays C¹. Once
    /// the flight window is over the foot is down and nothing changes.
    pub fn retarget(&mut self, origin: &FootAbsolutePosition, target: FootPose, t: f64) {
        let w = self.windows;
        let goal = [
            target.x - origin.position.x,
            target.y - origin.position.y,
            target.theta - origin.theta,
        ];
        if t >= w.landing_start {
            return;
        }
        let elapsed = if t < w.liftoff_end { 0.0 } else { w.flight_time(t) };
        let remaining = w.flight() - elapsed;
        for (poly, goal) in [&mut self.x, &mut self.y, &mut self.theta].into_iter().zip(goal) {
            let resolved = Cubic::with_init_speed(
                remaining,
                poly.position(elapsed),
                goal,
                poly.velocity(elapsed),
            );
            *poly = shifted(resolved, elapsed);
        }
    }

    /// Tilt angle and rate at local time `t`.
    pub fn omega_at(&self, t: f64) -> (f64, f64) {
        let w = self.windows;
        if t < w.liftoff_end {
            (self.omega_poly.position(t), self.omega_poly.velocity(t))
        } else if t < w.landing_start {
            let tf = t - w.liftoff_end;
            (
                self.omega - self.omega2_poly.position(tf),
                -self.omega2_poly.velocity(tf),
            )
        } else {
            let tl = t - w.landing_start;
            (
                self.omega_poly.position(tl) - self.omega,
                self.omega_poly.velocity(tl),
            )
        }
    }

    /// Sample of the swinging foot at local time `t` of the step.
    ///
    /// `origin` is the foot at lift-off.
    pub fn update_foot_position(
        &self,
        origin: &FootAbsolutePosition,
        t: f64,
        time: f64,
        step_type: StepType,
    ) -> FootAbsolutePosition {
        let w = self.windows;
        let tf = w.flight_time(t);
        let moving = w.in_flight(t);
        let planar = |poly: &Cubic| {
            if moving {
                (poly.position(tf), poly.velocity(tf), poly.acceleration(tf))
            } else {
                (poly.position(tf), 0.0, 0.0)
            }
        };
        let (x, dx, ddx) = planar(&self.x);
        let (y, dy, ddy) = planar(&self.y);
        let (th, dth, ddth) = planar(&self.theta);
        let (omega, domega) = self.omega_at(t);
        let theta = origin.theta + th;

        let mut sample = FootAbsolutePosition {
            time,
            position: Vector3::new(
                origin.position.x + x,
                origin.position.y + y,
                origin.position.z + self.z.position(t),
            ),
            velocity: Vector3::new(dx, dy, self.z.velocity(t)),
            acceleration: Vector3::new(ddx, ddy, self.z.acceleration(t)),
            theta,
            dtheta: dth,
            ddtheta: ddth,
            omega,
            domega,
            omega2: 0.0,
            domega2: 0.0,
            step_type,
        };
        sample.position += self.clearance_offset(omega, theta);
        sample
    }

    /// Offset keeping the heel (negative tilt) or the toe (positive tilt)
    /// above the ground once the sole is rotated by `omega` about the ankle.
    pub fn clearance_offset(&self, omega: f64, theta: f64) -> Vector3<f64> {
        let h = self.geometry.ankle_height;
        let a = omega.abs();
        let (dx, dz) = if omega < 0.0 {
            let b = self.geometry.heel_to_ankle;
            (-(b - b * a.cos() + h * a.sin()), h * a.cos() + b * a.sin() - h)
        } else {
            let f = self.geometry.ankle_to_toe();
            (f - f * a.cos() + h * a.sin(), h * a.cos() + f * a.sin() - h)
        };
        Vector3::new(theta.cos() * dx, theta.sin() * dx, dz)
    }
}

/// Delay a cubic so that its local time zero lands at `offset`:
/// `q(t) = p(t - offset)` on `[offset, offset + T]`.
fn shifted(poly: Cubic, offset: f64) -> Cubic {
    if offset <= 0.0 {
        return poly;
    }
    let [c0, c1, c2, c3] = *poly.coefficients();
    let s = offset;
    Cubic::from_parts(
        [
            c0 - c1 * s + c2 * s * s - c3 * s * s * s,
            c1 - 2.0 * c2 * s + 3.0 * c3 * s * s,
            c2 - 3.0 * c3 * s,
            c3,
        ],
        poly.duration() + s,
    )
}

// ---------------------------------------------------------------------------
// Footstep chaining
// ---------------------------------------------------------------------------

/// Chain relative footsteps into absolute poses.
///
/// Each step rotates by its `dtheta` first; its translation is expressed in
/// the new orientation and accumulated. Heights add up.
pub fn absolute_from_relative(start: FootPose, steps: &[RelativeFootPosition]) -> Vec<FootPose> {
    let mut current = start;
    steps
        .iter()
        .map(|step| {
            current = next_pose(current, step);
            current
        })
        .collect()
}

/// Pose reached from `previous` by one relative step.
pub fn next_pose(previous: FootPose, step: &RelativeFootPosition) -> FootPose {
    let theta = previous.theta + step.dtheta;
    let offset = Rotation2::new(theta) * Vector2::new(step.dx, step.dy);
    FootPose {
        x: previous.x + offset.x,
        y: previous.y + offset.y,
        z: previous.z + step.dz,
        theta,
    }
}

/// Relative step taking `previous` to `next`. Inverse of [`next_pose`].
pub fn relative_between(previous: FootPose, next: FootPose) -> RelativeFootPosition {
    let delta = Rotation2::new(next.theta).inverse() * Vector2::new(next.x - previous.x, next.y - previous.y);
    RelativeFootPosition::with_height(delta.x, delta.y, next.z - previous.z, next.theta - previous.theta)
}
