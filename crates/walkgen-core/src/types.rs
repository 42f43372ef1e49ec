use std::collections::VecDeque;

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Time limit of the initial double-support phase: effectively "until a
/// reference or a footstep arrives".
pub const INITIAL_TIME_LIMIT: f64 = 1e9;

// ---------------------------------------------------------------------------
// Foot / SupportPhase
// ---------------------------------------------------------------------------

/// Which foot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Foot {
    Left,
    Right,
}

impl Foot {
    /// +1 for the left foot, -1 for the right one.
    pub const fn sign(self) -> f64 {
        match self {
            Self::Left => 1.0,
            Self::Right => -1.0,
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Support configuration of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportPhase {
    DoubleSupport,
    SingleSupport,
}

/// One value per foot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FootPair<T> {
    pub left: T,
    pub right: T,
}

impl<T> FootPair<T> {
    pub const fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub const fn get(&self, foot: Foot) -> &T {
        match foot {
            Foot::Left => &self.left,
            Foot::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, foot: Foot) -> &mut T {
        match foot {
            Foot::Left => &mut self.left,
            Foot::Right => &mut self.right,
        }
    }
}

// ---------------------------------------------------------------------------
// SupportState
// ---------------------------------------------------------------------------

/// Support configuration at one sample, current or previewed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupportState {
    pub phase: SupportPhase,
    /// Supporting foot. In double support this is the foot the next single
    /// support phase would have started on last.
    pub foot: Foot,
    /// Remaining single-support phases before returning to double support.
    pub steps_left: u32,
    /// Index of the step inside the preview window (0 = current support).
    pub step_number: u32,
    /// True only at the evaluation that performed a transition.
    pub state_changed: bool,
    /// Absolute time of the next transition.
    pub time_limit: f64,
    /// Absolute time of the last transition.
    pub start_time: f64,
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl SupportState {
    /// Double support on the left foot, anchored at the mid-feet origin.
    pub const fn initial(steps_left: u32) -> Self {
        Self {
            phase: SupportPhase::DoubleSupport,
            foot: Foot::Left,
            steps_left,
            step_number: 0,
            state_changed: false,
            time_limit: INITIAL_TIME_LIMIT,
            start_time: 0.0,
            x: 0.0,
            y: 0.0,
            yaw: 0.0,
        }
    }

    pub const fn is_double_support(&self) -> bool {
        matches!(self.phase, SupportPhase::DoubleSupport)
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// StepType
// ---------------------------------------------------------------------------

/// Role of a foot in a sample. The integer code keeps the classic sign
/// convention: negative for a foot on the ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    #[default]
    Support,
    Swing,
    DoubleSupport,
}

impl StepType {
    pub const fn code(self) -> i32 {
        match self {
            Self::Support => -1,
            Self::Swing => 1,
            Self::DoubleSupport => -10,
        }
    }

    pub const fn on_ground(self) -> bool {
        self.code() < 0
    }
}

// ---------------------------------------------------------------------------
// Foot samples and footsteps
// ---------------------------------------------------------------------------

/// Sampled world-frame pose of one foot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FootAbsolutePosition {
    pub time: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
    /// Yaw about the vertical axis.
    pub theta: f64,
    pub dtheta: f64,
    pub ddtheta: f64,
    /// Ankle tilt used for heel/toe lift-off and landing.
    pub omega: f64,
    pub domega: f64,
    pub omega2: f64,
    pub domega2: f64,
    pub step_type: StepType,
}

impl FootAbsolutePosition {
    /// A foot standing still at `pose`.
    pub fn at_rest(pose: FootPose, time: f64, step_type: StepType) -> Self {
        Self {
            time,
            position: Vector3::new(pose.x, pose.y, pose.z),
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            theta: pose.theta,
            dtheta: 0.0,
            ddtheta: 0.0,
            omega: 0.0,
            domega: 0.0,
            omega2: 0.0,
            domega2: 0.0,
            step_type,
        }
    }

    pub fn pose(&self) -> FootPose {
        FootPose {
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            theta: self.theta,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.velocity.iter().all(|v| v.is_finite())
            && self.theta.is_finite()
            && self.omega.is_finite()
    }
}

impl Default for FootAbsolutePosition {
    fn default() -> Self {
        Self::at_rest(FootPose::default(), 0.0, StepType::Support)
    }
}

/// Absolute pose of a footstep on the ground.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FootPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub theta: f64,
}

impl FootPose {
    pub const fn new(x: f64, y: f64, z: f64, theta: f64) -> Self {
        Self { x, y, z, theta }
    }
}

/// One planned footstep, relative to the previous support foot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeFootPosition {
    pub dx: f64,
    pub dy: f64,
    #[serde(default)]
    pub dz: f64,
    pub dtheta: f64,
    /// Single-support duration of this step. `None` uses the configured one.
    #[serde(default)]
    pub ss_duration: Option<f64>,
    /// Double-support duration following this step.
    #[serde(default)]
    pub ds_duration: Option<f64>,
    /// Tag stamped on the swinging foot while this step executes.
    #[serde(default = "swing")]
    pub step_type: StepType,
}

const fn swing() -> StepType {
    StepType::Swing
}

impl RelativeFootPosition {
    /// Flat step with configured durations.
    pub const fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Self {
            dx,
            dy,
            dz: 0.0,
            dtheta,
            ss_duration: None,
            ds_duration: None,
            step_type: StepType::Swing,
        }
    }

    /// Step with a height change (stairs).
    pub const fn with_height(dx: f64, dy: f64, dz: f64, dtheta: f64) -> Self {
        Self {
            dz,
            ..Self::new(dx, dy, dtheta)
        }
    }

    #[must_use]
    pub const fn with_durations(mut self, ss: f64, ds: f64) -> Self {
        self.ss_duration = Some(ss);
        self.ds_duration = Some(ds);
        self
    }
}

// ---------------------------------------------------------------------------
// ZMP / CoM samples
// ---------------------------------------------------------------------------

/// Reference ZMP sample in the world frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ZmpPosition {
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub theta: f64,
    pub step_type: StepType,
}

/// CoM sample. Each axis holds `[position, velocity, acceleration]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComState {
    pub time: f64,
    pub x: Vector3<f64>,
    pub y: Vector3<f64>,
    pub z: Vector3<f64>,
    pub yaw: Vector3<f64>,
}

impl ComState {
    pub fn at_rest(x: f64, y: f64, z: f64) -> Self {
        Self {
            time: 0.0,
            x: Vector3::new(x, 0.0, 0.0),
            y: Vector3::new(y, 0.0, 0.0),
            z: Vector3::new(z, 0.0, 0.0),
            yaw: Vector3::zeros(),
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.z, self.yaw]
            .iter()
            .all(|axis| axis.iter().all(|v| v.is_finite()))
    }
}

impl Default for ComState {
    fn default() -> Self {
        Self::at_rest(0.0, 0.0, 0.0)
    }
}

/// Velocity reference in the robot frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceVelocity {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl ReferenceVelocity {
    pub const fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    /// True if any component asks for motion.
    pub fn is_moving(&self) -> bool {
        self.x.abs() > 0.0 || self.y.abs() > 0.0 || self.yaw.abs() > 0.0
    }
}

// ---------------------------------------------------------------------------
// Output buffers
// ---------------------------------------------------------------------------

/// Time-ordered output streams consumed by the posture realizer.
///
/// The four deques always have the same length; index `i` of each one
/// belongs to the same control instant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrajectoryBuffers {
    pub zmp: VecDeque<ZmpPosition>,
    pub com: VecDeque<ComState>,
    pub left_foot: VecDeque<FootAbsolutePosition>,
    pub right_foot: VecDeque<FootAbsolutePosition>,
}

/// One control instant across all streams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub zmp: ZmpPosition,
    pub com: ComState,
    pub left_foot: FootAbsolutePosition,
    pub right_foot: FootAbsolutePosition,
}

impl TrajectoryBuffers {
    pub fn push(&mut self, sample: Sample) {
        self.zmp.push_back(sample.zmp);
        self.com.push_back(sample.com);
        self.left_foot.push_back(sample.left_foot);
        self.right_foot.push_back(sample.right_foot);
    }

    pub fn len(&self) -> usize {
        self.zmp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zmp.is_empty()
    }

    pub fn clear(&mut self) {
        self.zmp.clear();
        self.com.clear();
        self.left_foot.clear();
        self.right_foot.clear();
    }

    pub fn get(&self, i: usize) -> Option<Sample> {
        Some(Sample {
            zmp: *self.zmp.get(i)?,
            com: *self.com.get(i)?,
            left_foot: *self.left_foot.get(i)?,
            right_foot: *self.right_foot.get(i)?,
        })
    }

    pub fn last(&self) -> Option<Sample> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Remove and return the oldest sample.
    pub fn pop_front(&mut self) -> Option<Sample> {
        let sample = self.get(0)?;
        self.zmp.pop_front();
        self.com.pop_front();
        self.left_foot.pop_front();
        self.right_foot.pop_front();
        Some(sample)
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }
}

// ---------------------------------------------------------------------------
// TickReport
// ---------------------------------------------------------------------------

/// What a single tick produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub time: f64,
    /// Number of samples appended to the buffers by this tick.
    pub samples: usize,
    /// A support transition happened during this tick.
    pub support_changed: bool,
    /// Set when the tick had to fall back to a safe command.
    pub fallback: Option<GenerationError>,
}

impl TickReport {
    pub const fn new(time: f64, samples: usize) -> Self {
        Self {
            time,
            samples,
            support_changed: false,
            fallback: None,
        }
    }

    pub const fn qp_feasible(&self) -> bool {
        self.fallback.is_none()
    }

    /// Treat a recovered fallback as an error.
    pub fn feasibility(&self) -> Result<(), GenerationError> {
        match self.fallback {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
