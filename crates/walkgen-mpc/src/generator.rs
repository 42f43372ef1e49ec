//! Receding-horizon walking pattern generator driven by a velocity reference.
//!
//! Every sample period the support preview is rebuilt, the QP is solved and
//! only the first jerk is kept; the first footstep decision retargets the
//! swinging foot. Between replans the CoM is integrated at the control
//! period with that jerk held constant.
//!
//! A swing ends one sample period before its support change. Over that last
//! period both feet are down and the ZMP region slides from the old support
//! onto the new one.

use nalgebra::{Vector2, Vector3};
use tracing::{debug, error, warn};

use walkgen_core::config::WalkConfig;
use walkgen_core::error::{ConfigError, GenerationError};
use walkgen_core::traits::PatternGenerator;
use walkgen_core::types::{
    ComState, Foot, FootAbsolutePosition, FootPair, FootPose, ReferenceVelocity, Sample, StepType,
    SupportPhase, SupportState, TickReport, TrajectoryBuffers, ZmpPosition,
};
use walkgen_foot::FootTrajectoryGenerator;

use crate::dynamics::CartTable;
use crate::horizon::{HorizonInputs, HorizonTiming, build_horizon};
use crate::polygon::{ConvexHull, FeasibilityRegions};
use crate::solver::VelRefQp;
use crate::support::{SupportFsm, SupportSelector, SupportTracker};
use crate::types::QpSolution;

/// Slack on replan instants.
const REPLAN_EPS: f64 = 1e-9;

/// Swing in progress.
#[derive(Clone, Copy, Debug)]
struct Swing {
    foot: Foot,
    /// Foot sample at lift-off.
    origin: FootAbsolutePosition,
    target: FootPose,
    start_time: f64,
}

/// Support polygon in force between two replans.
#[derive(Clone, Debug)]
struct ActiveRegion {
    start: f64,
    duration: f64,
    from: ConvexHull,
    /// Support taken over at the next replan.
    to: Option<ConvexHull>,
}

impl ActiveRegion {
    fn at(&self, time: f64) -> ConvexHull {
        match &self.to {
            Some(to) => {
                let s = (time - self.start) / self.duration;
                self.from.blend(to, s)
            }
            None => self.from.clone(),
        }
    }
}

/// Online pattern generator following a velocity reference.
#[derive(Clone, Debug)]
pub struct OnlineGenerator {
    config: WalkConfig,
    regions: FeasibilityRegions,
    tracker: SupportTracker,
    qp: VelRefQp,
    cart: CartTable,
    swing_generator: FootTrajectoryGenerator,
    feet: FootPair<FootAbsolutePosition>,
    swing: Option<Swing>,
    state_x: Vector3<f64>,
    state_y: Vector3<f64>,
    trunk_yaw: f64,
    reference: ReferenceVelocity,
    /// Reference latched by the last replan.
    planned: ReferenceVelocity,
    jerk: Vector2<f64>,
    active: Option<ActiveRegion>,
    next_replan: Option<f64>,
    last_tick: Option<f64>,
    last_solution: Option<QpSolution>,
    buffers: TrajectoryBuffers,
}

impl OnlineGenerator {
    /// Start standing with the feet `half_stance_width` either side of the
    /// origin.
    pub fn new(config: WalkConfig) -> Result<Self, ConfigError> {
        let w = config.stance.half_stance_width;
        Self::with_feet(
            config,
            FootPose::new(0.0, w, 0.0, 0.0),
            FootPose::new(0.0, -w, 0.0, 0.0),
        )
    }

    /// Start standing on the given feet, CoM above their middle.
    pub fn with_feet(config: WalkConfig, left: FootPose, right: FootPose) -> Result<Self, ConfigError> {
        validate(&config)?;
        let preview = &config.preview;
        let regions = FeasibilityRegions::new(&config.foot, &config.feasibility, &config.stance);
        let mut initial = SupportState::initial(config.stance.number_steps);
        initial.x = (left.x + right.x) / 2.0;
        initial.y = (left.y + right.y) / 2.0;
        initial.yaw = (left.theta + right.theta) / 2.0;
        let tracker = SupportTracker::new(SupportFsm::new(&config.timing, &config.stance), initial);
        let qp = VelRefQp::new(
            preview.horizon,
            preview.sample_period,
            config.ticks_per_sample(),
            preview.com_height,
            preview.gravity,
            config.weights.clone(),
        );
        let cart = CartTable::new(config.timing.control_period, preview.com_height, preview.gravity);
        let swing_generator = FootTrajectoryGenerator::new(config.foot.clone(), &config.swing);

        Ok(Self {
            regions,
            qp,
            cart,
            swing_generator,
            feet: FootPair::new(
                FootAbsolutePosition::at_rest(left, 0.0, StepType::DoubleSupport),
                FootAbsolutePosition::at_rest(right, 0.0, StepType::DoubleSupport),
            ),
            swing: None,
            state_x: Vector3::new(initial.x, 0.0, 0.0),
            state_y: Vector3::new(initial.y, 0.0, 0.0),
            trunk_yaw: initial.yaw,
            reference: ReferenceVelocity::default(),
            planned: ReferenceVelocity::default(),
            jerk: Vector2::zeros(),
            active: None,
            next_replan: None,
            last_tick: None,
            last_solution: None,
            buffers: TrajectoryBuffers::default(),
            tracker,
            config,
        })
    }

    pub const fn config(&self) -> &WalkConfig {
        &self.config
    }

    /// Velocity reference in the robot frame, used from the next replan on.
    pub fn set_reference(&mut self, reference: ReferenceVelocity) {
        self.reference = reference;
    }

    pub const fn reference(&self) -> ReferenceVelocity {
        self.reference
    }

    pub fn set_step_height(&mut self, height: f64) {
        self.swing_generator.set_step_height(height);
        self.config.swing.step_height = self.swing_generator.step_height();
    }

    /// Tilt magnitude, radians, of swings that have not started yet.
    pub fn set_omega(&mut self, omega: f64) -> Result<(), ConfigError> {
        self.update_config(|c| c.swing.omega = omega)?;
        self.swing_generator.set_omega(omega);
        Ok(())
    }

    /// Single-support duration of the phases that start from now on.
    pub fn set_single_support(&mut self, duration: f64) -> Result<(), ConfigError> {
        self.update_config(|c| c.timing.single_support = duration)?;
        self.tracker.fsm_mut().set_ss_duration(duration);
        Ok(())
    }

    /// Double-support duration of the phases that start from now on.
    pub fn set_double_support(&mut self, duration: f64) -> Result<(), ConfigError> {
        self.update_config(|c| c.timing.double_support = duration)?;
        self.tracker.fsm_mut().set_ds_duration(duration);
        Ok(())
    }

    fn update_config(&mut self, edit: impl FnOnce(&mut WalkConfig)) -> Result<(), ConfigError> {
        let mut config = self.config.clone();
        edit(&mut config);
        validate(&config)?;
        self.config = config;
        Ok(())
    }

    pub const fn current_support(&self) -> &SupportState {
        self.tracker.current()
    }

    pub const fn regions(&self) -> &FeasibilityRegions {
        &self.regions
    }

    /// Ground poses of both feet; a swinging foot is reported at lift-off.
    pub const fn feet(&self) -> &FootPair<FootAbsolutePosition> {
        &self.feet
    }

    /// Foot in the air and its current landing target.
    pub fn swing_target(&self) -> Option<(Foot, FootPose)> {
        self.swing.map(|s| (s.foot, s.target))
    }

    /// Support polygon the ZMP is held in at `time`, which must not be
    /// earlier than the last replan. `None` before the first tick.
    pub fn support_region(&self, time: f64) -> Option<ConvexHull> {
        self.active.as_ref().map(|a| a.at(time))
    }

    /// Jerk applied until the next replan.
    pub const fn jerk(&self) -> Vector2<f64> {
        self.jerk
    }

    /// CoM at the time of the next tick.
    pub fn com(&self) -> ComState {
        ComState {
            time: self.last_tick.unwrap_or(0.0),
            x: self.state_x,
            y: self.state_y,
            z: Vector3::new(self.config.preview.com_height, 0.0, 0.0),
            yaw: Vector3::new(self.trunk_yaw, self.planned.yaw, 0.0),
        }
    }

    pub const fn last_solution(&self) -> Option<&QpSolution> {
        self.last_solution.as_ref()
    }

    // -----------------------------------------------------------------------
    // Replanning
    // -----------------------------------------------------------------------

    /// Replan at `time`. On error the support state, feet and swing are left
    /// as they were.
    fn replan(&mut self, time: f64, report: &mut TickReport) -> Result<(), GenerationError> {
        let snapshot = (
            self.tracker.clone(),
            self.feet,
            self.swing,
            self.swing_generator.clone(),
            self.planned,
        );
        let result = self.plan(time, report);
        if let Err(err) = &result {
            error!(time, error = %err, "replan aborted");
            (self.tracker, self.feet, self.swing, self.swing_generator, self.planned) = snapshot;
        }
        result
    }

    fn plan(&mut self, time: f64, report: &mut TickReport) -> Result<(), GenerationError> {
        self.planned = self.reference;
        let previous = *self.tracker.current();
        if self.tracker.evaluate(SupportSelector::Current, time, &self.planned) {
            self.on_transition(&previous, time);
            report.support_changed = true;
        }

        let landing = self.swing_generator.windows().landing_start;
        let landing_started = self
            .swing
            .is_some_and(|s| time - s.start_time >= landing - REPLAN_EPS);
        let pinned_step = self.swing.filter(|_| landing_started).map(|s| s.target);

        let mut ground = FootPair::new(self.feet.left.pose(), self.feet.right.pose());
        if let Some(swing) = &self.swing {
            *ground.get_mut(swing.foot) = swing.target;
        }

        let preview = &self.config.preview;
        let timing = HorizonTiming {
            period: preview.sample_period,
            ticks: self.config.ticks_per_sample(),
        };
        let states = self
            .tracker
            .preview(time, &self.planned, preview.horizon, preview.sample_period);
        let inputs = HorizonInputs {
            support: self.tracker.current(),
            states: &states,
            feet: ground,
            trunk_yaw: self.trunk_yaw,
            reference: self.planned,
            state_x: self.state_x,
            state_y: self.state_y,
            pinned_step,
        };
        let offset = Vector2::from(self.config.stance.zmp_neutral_offset);
        let horizon = build_horizon(&self.regions, &inputs, timing, offset)?;

        let solution = self.qp.solve(&self.qp.assemble(&horizon));
        let jerk = solution.first_jerk();
        let mut decisions = Vec::new();
        if !solution.converged {
            let err = GenerationError::QpInfeasible {
                time,
                status: solution.status,
            };
            self.fall_back(time, err, report);
        } else if !(jerk.x.is_finite() && jerk.y.is_finite()) {
            self.fall_back(time, GenerationError::NonFinite("jerk"), report);
        } else {
            self.jerk = jerk;
            decisions = solution
                .steps_x
                .iter()
                .zip(solution.steps_y.iter())
                .map(|(x, y)| Vector2::new(*x, *y))
                .collect();
            if let (Some(step), Some(swing)) = (solution.first_step(), self.swing.as_mut()) {
                if !landing_started {
                    let theta = horizon.step_yaws.first().copied().unwrap_or(swing.target.theta);
                    let target = FootPose::new(step.x, step.y, swing.target.z, theta);
                    self.swing_generator.retarget(&swing.origin, target, time - swing.start_time);
                    swing.target = target;
                }
            }
            debug!(
                time,
                jerk_x = jerk.x,
                jerk_y = jerk.y,
                steps = solution.steps_x.len(),
                "replanned"
            );
        }

        // The swinging foot lands where it was sent, whatever the solver said.
        if let Some(swing) = self.swing.filter(|_| horizon.steps() > 0) {
            let landing = Vector2::new(swing.target.x, swing.target.y);
            match decisions.first_mut() {
                Some(first) => *first = landing,
                None => decisions.push(landing),
            }
        }
        let changing = horizon.states.first().is_some_and(|s| s.state_changed);
        self.active = horizon.regions.first().map(|current| ActiveRegion {
            start: time,
            duration: timing.period,
            from: current.placed(&decisions),
            to: horizon
                .regions
                .get(1)
                .filter(|_| changing)
                .map(|next| next.placed(&decisions)),
        });
        self.last_solution = Some(solution);
        Ok(())
    }

    fn fall_back(&mut self, time: f64, err: GenerationError, report: &mut TickReport) {
        warn!(time, error = %err, "replan failed, holding zero jerk");
        self.jerk = Vector2::zeros();
        report.fallback = Some(err);
    }

    /// Update feet and the current support pose after a support transition.
    fn on_transition(&mut self, previous: &SupportState, time: f64) {
        let current = *self.tracker.current();
        match (previous.phase, current.phase) {
            (SupportPhase::DoubleSupport, SupportPhase::SingleSupport) => {
                self.start_swing(current.foot.opposite(), time);
            }
            (SupportPhase::SingleSupport, SupportPhase::SingleSupport) => {
                self.land(time);
                self.start_swing(current.foot.opposite(), time);
            }
            (SupportPhase::SingleSupport, SupportPhase::DoubleSupport) => {
                self.land(time);
                let (l, r) = (self.feet.left, self.feet.right);
                self.tracker.set_current_pose(
                    (l.position.x + r.position.x) / 2.0,
                    (l.position.y + r.position.y) / 2.0,
                    (l.theta + r.theta) / 2.0,
                );
                return;
            }
            (SupportPhase::DoubleSupport, SupportPhase::DoubleSupport) => return,
        }
        let support = self.feet.get(current.foot);
        let (x, y, theta) = (support.position.x, support.position.y, support.theta);
        self.tracker.set_current_pose(x, y, theta);
    }

    /// Swing time: the single-support phase minus its last sample period.
    fn swing_duration(&self) -> f64 {
        let period = self.config.preview.sample_period;
        let samples = ((self.tracker.fsm().ss_duration() - REPLAN_EPS) / period).ceil();
        (samples - 1.0).max(1.0) * period
    }

    fn start_swing(&mut self, foot: Foot, time: f64) {
        let mut origin = *self.feet.get(foot);
        origin.time = time;
        let target = origin.pose();
        let duration = self.swing_duration();
        self.swing_generator.plan_step(&origin, target, duration);
        self.swing = Some(Swing {
            foot,
            origin,
            target,
            start_time: time,
        });
    }

    fn land(&mut self, time: f64) {
        if let Some(swing) = self.swing.take() {
            debug!(time, foot = ?swing.foot, x = swing.target.x, y = swing.target.y, "foot landed");
            *self.feet.get_mut(swing.foot) = FootAbsolutePosition::at_rest(swing.target, time, StepType::Support);
        }
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    fn sample(&self, time: f64) -> Result<Sample, GenerationError> {
        let support = self.tracker.current();
        let duration = self.swing_generator.windows().duration;
        let touched_down = self
            .swing
            .is_some_and(|s| time - s.start_time >= duration - REPLAN_EPS);
        let ground_type = if support.is_double_support() || touched_down {
            StepType::DoubleSupport
        } else {
            StepType::Support
        };
        let foot_sample = |foot: Foot| match &self.swing {
            Some(swing) if swing.foot == foot && !touched_down => {
                self.swing_generator.update_foot_position(
                    &swing.origin,
                    time - swing.start_time,
                    time,
                    StepType::Swing,
                )
            }
            Some(swing) if swing.foot == foot => FootAbsolutePosition::at_rest(swing.target, time, ground_type),
            _ => FootAbsolutePosition::at_rest(self.feet.get(foot).pose(), time, ground_type),
        };
        let left_foot = foot_sample(Foot::Left);
        let right_foot = foot_sample(Foot::Right);
        if !(left_foot.is_finite() && right_foot.is_finite()) {
            return Err(GenerationError::NonFinite("foot"));
        }

        let mut com = self.com();
        com.time = time;
        if !com.is_finite() {
            return Err(GenerationError::NonFinite("com"));
        }
        let zmp = ZmpPosition {
            time,
            x: self.cart.cop(&self.state_x),
            y: self.cart.cop(&self.state_y),
            z: 0.0,
            theta: self.trunk_yaw,
            step_type: ground_type,
        };
        Ok(Sample {
            zmp,
            com,
            left_foot,
            right_foot,
        })
    }

    fn integrate(&mut self) {
        self.state_x = self.cart.step(&self.state_x, self.jerk.x);
        self.state_y = self.cart.step(&self.state_y, self.jerk.y);
        self.trunk_yaw += self.planned.yaw * self.config.timing.control_period;
    }
}

/// Configuration checks on top of [`WalkConfig::validate`]: a swing needs at
/// least one sample period before its last one.
fn validate(config: &WalkConfig) -> Result<(), ConfigError> {
    config.validate()?;
    if config.timing.single_support <= config.preview.sample_period + REPLAN_EPS {
        return Err(ConfigError::InvalidValue {
            field: "single_support".into(),
            message: "must exceed the qp sample period".into(),
        });
    }
    Ok(())
}

impl PatternGenerator for OnlineGenerator {
    fn tick(&mut self, time: f64) -> Result<TickReport, GenerationError> {
        self.check_tick_order(time)?;
        let mut report = TickReport::new(time, 0);

        let due = self.next_replan.is_none_or(|next| time + REPLAN_EPS >= next);
        if due {
            self.replan(time, &mut report)?;
            let period = self.config.preview.sample_period;
            let mut next = self.next_replan.map_or(time, |t| t) + period;
            while next <= time + REPLAN_EPS {
                next += period;
            }
            self.next_replan = Some(next);
        }

        let sample = self.sample(time)?;
        self.buffers.push(sample);
        report.samples = 1;
        self.integrate();
        self.last_tick = Some(time);
        Ok(report)
    }

    fn buffers(&self) -> &TrajectoryBuffers {
        &self.buffers
    }

    fn buffers_mut(&mut self) -> &mut TrajectoryBuffers {
        &mut self.buffers
    }

    fn last_tick(&self) -> Option<f64> {
        self.last_tick
    }

    fn name(&self) -> &str {
        "online-velocity-reference"
    }
}
