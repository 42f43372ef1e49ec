//! Footstep-driven ZMP reference and its CoM realisation.
//!
//! A queue of relative footsteps is laid out as a sequence of support
//! windows:
//!
//! ```text
//! DS_0  SS_0  DS_1  SS_1  ...  SS_{n-1}  DS_n  [FinalDS  End]
//! ```
//!
//! `SS_j` swings the foot of step `j` to its landing pose while the other
//! foot supports; `DS_j` slides the ZMP onto the support foot of `SS_j`.
//! Once the sequence is finished a final double support brings the ZMP back
//! between the feet and the end phase holds it there.
//!
//! Samples are emitted on the control grid `t0 + k·dt`. Windows that have
//! started emitting are never rewritten; edits and new steps only re-plan
//! what lies after them.

use std::mem;

use nalgebra::{Rotation2, Vector2, Vector3};
use tracing::{debug, error, info, warn};

use walkgen_core::config::WalkConfig;
use walkgen_core::error::{ConfigError, EditError, GenerationError};
use walkgen_core::traits::PatternGenerator;
use walkgen_core::types::{
    ComState, Foot, FootAbsolutePosition, FootPair, FootPose, RelativeFootPosition, Sample,
    StepType, TickReport, TrajectoryBuffers, ZmpPosition,
};
use walkgen_foot::{FootTrajectoryGenerator, absolute_from_relative, relative_between};

use crate::preview::{AxisState, PreviewController};

const TIME_EPS: f64 = 1e-9;

/// Phase of the last emitted sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OnlineState {
    /// Nothing planned at this time: before the start or after the plan ran out.
    #[default]
    Idle,
    SingleSupport,
    DoubleSupport,
}

/// Role of a planned window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// ZMP transfer onto the support foot of step `next_step`.
    DoubleSupport { next_step: usize },
    /// Swing of step `step`.
    SingleSupport { step: usize },
    /// ZMP transfer back between the feet after the last step.
    FinalDoubleSupport,
    /// Hold of the final stance.
    End,
}

impl WindowKind {
    pub const fn state(self) -> OnlineState {
        match self {
            Self::SingleSupport { .. } => OnlineState::SingleSupport,
            _ => OnlineState::DoubleSupport,
        }
    }
}

#[derive(Debug, Clone)]
struct Swing {
    foot: Foot,
    origin: FootAbsolutePosition,
    target: FootPose,
    step_type: StepType,
    generator: FootTrajectoryGenerator,
}

/// One planned support window.
#[derive(Debug, Clone)]
pub struct Window {
    pub kind: WindowKind,
    pub start: f64,
    pub duration: f64,
    pub zmp_from: Vector2<f64>,
    pub zmp_to: Vector2<f64>,
    /// Ground poses of both feet when the window opens.
    pub feet: FootPair<FootPose>,
    swing: Option<Swing>,
}

impl Window {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn swing_foot(&self) -> Option<Foot> {
        self.swing.as_ref().map(|s| s.foot)
    }

    /// Landing pose of the swinging foot.
    pub fn swing_target(&self) -> Option<FootPose> {
        self.swing.as_ref().map(|s| s.target)
    }

    fn contains(&self, time: f64) -> bool {
        time >= self.start - TIME_EPS && time < self.end() - TIME_EPS
    }

    /// ZMP reference at absolute `time`. Transfers are linear; outside the
    /// window the nearest boundary value is held.
    fn zmp_at(&self, time: f64) -> Vector2<f64> {
        match self.kind {
            WindowKind::DoubleSupport { .. } | WindowKind::FinalDoubleSupport
                if self.duration > TIME_EPS =>
            {
                let s = ((time - self.start) / self.duration).clamp(0.0, 1.0);
                self.zmp_from + (self.zmp_to - self.zmp_from) * s
            }
            _ => self.zmp_to,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Origin {
    time: f64,
    feet: FootPair<FootPose>,
    first_foot: Foot,
}

impl Origin {
    fn mid_pose(&self) -> FootPose {
        mid_pose(&self.feet)
    }

    /// Foot moved by step `j`.
    fn step_foot(&self, j: usize) -> Foot {
        if j % 2 == 0 {
            self.first_foot
        } else {
            self.first_foot.opposite()
        }
    }

    /// Ground poses once the first `landed` steps are down.
    fn feet_after(&self, absolute: &[FootPose], landed: usize) -> FootPair<FootPose> {
        let mut feet = self.feet;
        for (j, pose) in absolute.iter().take(landed).enumerate() {
            *feet.get_mut(self.step_foot(j)) = *pose;
        }
        feet
    }
}

fn mid_pose(feet: &FootPair<FootPose>) -> FootPose {
    let (l, r) = (&feet.left, &feet.right);
    FootPose::new(
        (l.x + r.x) / 2.0,
        (l.y + r.y) / 2.0,
        (l.z + r.z) / 2.0,
        (l.theta + r.theta) / 2.0,
    )
}

fn position(pose: &FootPose) -> Vector2<f64> {
    Vector2::new(pose.x, pose.y)
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidDuration { field, value })
    }
}

/// Heuristic pattern generator.
///
/// Drive it either in one shot with [`discretize`](Self::discretize) or
/// online: [`init_online`](Self::init_online), then
/// [`online`](Self::online) (or [`PatternGenerator::tick`]) at increasing
/// times, with [`online_add_foot`](Self::online_add_foot),
/// [`online_foot_change`](Self::online_foot_change) and
/// [`finish`](Self::finish) in between.
#[derive(Debug, Clone)]
pub struct ZmpDiscretization {
    config: WalkConfig,
    controller: PreviewController,
    swing_template: FootTrajectoryGenerator,
    origin: Option<Origin>,
    steps: Vec<RelativeFootPosition>,
    finished: bool,
    windows: Vec<Window>,
    next_sample: usize,
    axis_x: AxisState,
    axis_y: AxisState,
    /// Filtered ZMP reference at the last emitted sample.
    zmp_filtered: Option<Vector2<f64>>,
    state: OnlineState,
    buffers: TrajectoryBuffers,
    last_tick: Option<f64>,
}

impl ZmpDiscretization {
    pub fn new(config: WalkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let preview = &config.preview;
        let controller = PreviewController::new(
            config.timing.control_period,
            preview.com_height,
            preview.gravity,
            preview.preview_window,
            preview.tracking_weight,
            preview.input_weight,
        )
        .map_err(|err| ConfigError::InvalidValue {
            field: "preview".into(),
            message: err.to_string(),
        })?;
        let swing_template = FootTrajectoryGenerator::new(config.foot.clone(), &config.swing);
        Ok(Self {
            config,
            controller,
            swing_template,
            origin: None,
            steps: Vec::new(),
            finished: false,
            windows: Vec::new(),
            next_sample: 0,
            axis_x: AxisState::at_rest(0.0),
            axis_y: AxisState::at_rest(0.0),
            zmp_filtered: None,
            state: OnlineState::Idle,
            buffers: TrajectoryBuffers::default(),
            last_tick: None,
        })
    }

    pub const fn config(&self) -> &WalkConfig {
        &self.config
    }

    pub const fn controller(&self) -> &PreviewController {
        &self.controller
    }

    /// Every step queued since the start, edits applied.
    pub fn steps(&self) -> &[RelativeFootPosition] {
        &self.steps
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub const fn state(&self) -> OnlineState {
        self.state
    }

    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// End time of the last planned window.
    pub fn plan_end(&self) -> Option<f64> {
        self.windows.last().map(Window::end)
    }

    /// Time of the next sample to be emitted.
    pub fn next_sample_time(&self) -> Option<f64> {
        self.origin.map(|o| self.sample_time(&o, self.next_sample))
    }

    /// Latest time a queued step can still be replaced: the start of the
    /// first swing that has not begun emitting.
    pub fn regeneration_deadline(&self) -> Option<f64> {
        let next = self.next_sample_time()?;
        self.windows
            .iter()
            .filter(|w| matches!(w.kind, WindowKind::SingleSupport { .. }))
            .map(|w| w.start)
            .find(|start| *start >= next - TIME_EPS)
    }

    pub fn set_single_support(&mut self, duration: f64) -> Result<(), ConfigError> {
        positive("single_support", duration)?;
        self.config.timing.single_support = duration;
        self.replan();
        Ok(())
    }

    pub fn set_double_support(&mut self, duration: f64) -> Result<(), ConfigError> {
        positive("double_support", duration)?;
        self.config.timing.double_support = duration;
        self.replan();
        Ok(())
    }

    /// Apex height of swings that have not started yet.
    pub fn set_step_height(&mut self, height: f64) {
        self.swing_template.set_step_height(height);
        self.config.swing.step_height = self.swing_template.step_height();
        self.replan();
    }

    /// Tilt magnitude, radians, of swings that have not started yet.
    pub fn set_omega(&mut self, omega: f64) {
        self.swing_template.set_omega(omega);
        self.config.swing.omega = omega;
        self.replan();
    }

    /// Start a new walk at `time` from the given feet, with `steps` queued.
    ///
    /// Clears the buffers and any previous plan. Nothing is emitted until the
    /// first call to [`online`](Self::online).
    pub fn init_online(
        &mut self,
        time: f64,
        left: FootPose,
        right: FootPose,
        steps: &[RelativeFootPosition],
    ) -> Result<(), GenerationError> {
        let first = steps.first().ok_or(GenerationError::EmptyStepQueue)?;
        let first_foot = if first.dy < 0.0 { Foot::Right } else { Foot::Left };
        let origin = Origin {
            time,
            feet: FootPair::new(left, right),
            first_foot,
        };
        let mid = origin.mid_pose();
        self.origin = Some(origin);
        self.steps = steps.to_vec();
        self.finished = false;
        self.windows.clear();
        self.next_sample = 0;
        self.axis_x = AxisState::at_rest(mid.x);
        self.axis_y = AxisState::at_rest(mid.y);
        self.zmp_filtered = Some(position(&mid));
        self.state = OnlineState::Idle;
        self.buffers.clear();
        self.last_tick = None;
        self.replan();
        info!(time, steps = steps.len(), ?first_foot, "heuristic walk started");
        Ok(())
    }

    /// Emit every sample up to `time`. Returns how many were appended.
    pub fn online(&mut self, time: f64) -> Result<usize, GenerationError> {
        self.advance(time).map(|(samples, _)| samples)
    }

    /// Queue one more step after the ones already planned.
    pub fn online_add_foot(&mut self, step: RelativeFootPosition) -> Result<(), EditError> {
        let origin = self.origin.ok_or(EditError::NotStarted)?;
        let next = self.sample_time(&origin, self.next_sample);
        let closed = self.windows.iter().any(|w| {
            matches!(w.kind, WindowKind::FinalDoubleSupport) && w.start < next - TIME_EPS
        });
        if closed {
            warn!(time = next, "step added after the final stance began");
            return Err(EditError::SequenceClosed);
        }
        self.steps.push(step);
        self.replan();
        Ok(())
    }

    /// Move the landing pose of a step whose swing has not started.
    ///
    /// `time` must fall inside that step's single-support window. The step
    /// keeps its durations; later steps stay relative to it. Returns the
    /// start time of the modified window.
    pub fn online_foot_change(&mut self, time: f64, pose: FootPose) -> Result<f64, EditError> {
        let result = self.change_landing(time, pose);
        match &result {
            Ok(start) => info!(time, start, "landing position changed"),
            Err(err) => warn!(time, %err, "landing change rejected"),
        }
        result
    }

    fn change_landing(&mut self, time: f64, pose: FootPose) -> Result<f64, EditError> {
        let origin = self.origin.ok_or(EditError::NotStarted)?;
        let next = self.sample_time(&origin, self.next_sample);
        let mut pending = self
            .windows
            .iter()
            .filter(|w| w.start >= next - TIME_EPS)
            .filter(|w| matches!(w.kind, WindowKind::SingleSupport { .. }))
            .peekable();
        if pending.peek().is_none() {
            return Err(EditError::NoPendingStep);
        }
        let (step, start) = pending
            .find_map(|w| match w.kind {
                WindowKind::SingleSupport { step } if w.contains(time) => Some((step, w.start)),
                _ => None,
            })
            .ok_or(EditError::OutsideModifiableWindow { time })?;

        let mid = origin.mid_pose();
        let previous = absolute_from_relative(mid, &self.steps[..step])
            .last()
            .copied()
            .unwrap_or(mid);
        let old = self.steps[step];
        self.steps[step] = RelativeFootPosition {
            ss_duration: old.ss_duration,
            ds_duration: old.ds_duration,
            step_type: old.step_type,
            ..relative_between(previous, pose)
        };
        self.replan();
        Ok(start)
    }

    /// Close the sequence: after the queued steps the robot returns to a
    /// symmetric stance and stops.
    pub fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.replan();
        }
    }

    /// Plan and emit a whole sequence starting at time zero.
    pub fn discretize(
        &mut self,
        steps: &[RelativeFootPosition],
        left: FootPose,
        right: FootPose,
    ) -> Result<TrajectoryBuffers, GenerationError> {
        self.init_online(0.0, left, right, steps)?;
        self.finish();
        if let Some(end) = self.plan_end() {
            self.advance(end - self.config.timing.control_period / 2.0)?;
        }
        Ok(mem::take(&mut self.buffers))
    }

    fn sample_time(&self, origin: &Origin, k: usize) -> f64 {
        origin.time + k as f64 * self.config.timing.control_period
    }

    /// Rebuild every window that has not started emitting.
    fn replan(&mut self) {
        let Some(origin) = self.origin else {
            return;
        };
        let next = self.sample_time(&origin, self.next_sample);
        let prefix = self.windows.partition_point(|w| w.start < next - TIME_EPS);
        self.windows.truncate(prefix);

        let mid = origin.mid_pose();
        let mut cursor = self.windows.last().map_or(next, |w| w.end().max(next));
        let mut zmp = self
            .windows
            .last()
            .map_or_else(|| position(&mid), |w| w.zmp_to);
        let n = self.steps.len();
        let absolute = absolute_from_relative(mid, &self.steps);
        let last = if self.finished { 2 * n + 2 } else { 2 * n };
        let timing = &self.config.timing;

        for index in prefix..=last {
            let feet = origin.feet_after(&absolute, (index / 2).min(n));
            let mut window = Window {
                kind: WindowKind::End,
                start: cursor,
                duration: timing.end_phase,
                zmp_from: zmp,
                zmp_to: zmp,
                feet,
                swing: None,
            };
            match index {
                i if i <= 2 * n && i % 2 == 0 => {
                    let j = i / 2;
                    let support = feet.get(origin.step_foot(j).opposite());
                    window.kind = WindowKind::DoubleSupport { next_step: j };
                    window.duration = match j {
                        0 => timing.double_support,
                        _ => self.steps[j - 1].ds_duration.unwrap_or(timing.double_support),
                    };
                    window.zmp_to = self.zmp_target(support);
                }
                i if i < 2 * n => {
                    let j = i / 2;
                    let foot = origin.step_foot(j);
                    let step = &self.steps[j];
                    let duration = step.ss_duration.unwrap_or(timing.single_support);
                    let lift_off = FootAbsolutePosition::at_rest(*feet.get(foot), cursor, StepType::Support);
                    let mut generator = self.swing_template.clone();
                    generator.plan_step(&lift_off, absolute[j], duration);
                    let target = self.zmp_target(feet.get(foot.opposite()));
                    window.kind = WindowKind::SingleSupport { step: j };
                    window.duration = duration;
                    window.zmp_from = target;
                    window.zmp_to = target;
                    window.swing = Some(Swing {
                        foot,
                        origin: lift_off,
                        target: absolute[j],
                        step_type: step.step_type,
                        generator,
                    });
                }
                i if i == 2 * n + 1 => {
                    window.kind = WindowKind::FinalDoubleSupport;
                    window.duration = timing.double_support;
                    window.zmp_to = position(&mid_pose(&feet));
                }
                _ => {}
            }
            cursor = window.end();
            zmp = window.zmp_to;
            self.windows.push(window);
        }
        debug!(
            kept = prefix,
            windows = self.windows.len(),
            plan_end = cursor,
            "heuristic plan rebuilt"
        );
    }

    fn zmp_target(&self, support: &FootPose) -> Vector2<f64> {
        let [ox, oy] = self.config.stance.zmp_neutral_offset;
        position(support) + Rotation2::new(support.theta) * Vector2::new(ox, oy)
    }

    fn window_index(&self, time: f64) -> Option<usize> {
        self.windows
            .partition_point(|w| w.start <= time + TIME_EPS)
            .checked_sub(1)
    }

    fn window_at(&self, time: f64) -> Option<&Window> {
        self.window_index(time)
            .map(|i| &self.windows[i])
            .filter(|w| w.contains(time))
    }

    /// Planned ZMP at `time`; the last value is held past the plan.
    fn zmp_reference(&self, time: f64) -> Vector2<f64> {
        match self.window_index(time) {
            Some(i) => self.windows[i].zmp_at(time),
            None => self.windows.first().map_or_else(Vector2::zeros, |w| w.zmp_from),
        }
    }

    /// Run the planned ZMP through the first-order reference filter, starting
    /// from its value at the previous sample, and keep the value at `time`.
    fn filter_references(&mut self, planned: Vec<Vector2<f64>>) -> Vec<Vector2<f64>> {
        let tau = self.config.preview.zmp_filter;
        if tau <= 0.0 {
            return planned;
        }
        let dt = self.config.timing.control_period;
        let alpha = dt / (tau + dt);
        let Some(mut state) = self.zmp_filtered.or_else(|| planned.first().copied()) else {
            return planned;
        };
        let filtered: Vec<_> = planned
            .iter()
            .map(|r| {
                state += (r - state) * alpha;
                state
            })
            .collect();
        self.zmp_filtered = filtered.first().copied();
        filtered
    }

    fn feet_at(&self, window: Option<&Window>, time: f64) -> FootPair<FootAbsolutePosition> {
        let rest = |pose: FootPose, step_type| FootAbsolutePosition::at_rest(pose, time, step_type);
        let Some(window) = window else {
            let feet = self
                .windows
                .last()
                .map(|w| w.feet)
                .or_else(|| self.origin.map(|o| o.feet))
                .unwrap_or_default();
            return FootPair::new(
                rest(feet.left, StepType::DoubleSupport),
                rest(feet.right, StepType::DoubleSupport),
            );
        };
        match &window.swing {
            Some(swing) => {
                let local = time - window.start;
                let moving = swing
                    .generator
                    .update_foot_position(&swing.origin, local, time, swing.step_type);
                let support = rest(*window.feet.get(swing.foot.opposite()), StepType::Support);
                match swing.foot {
                    Foot::Left => FootPair::new(moving, support),
                    Foot::Right => FootPair::new(support, moving),
                }
            }
            None => FootPair::new(
                rest(window.feet.left, StepType::DoubleSupport),
                rest(window.feet.right, StepType::DoubleSupport),
            ),
        }
    }

    /// Emit the samples due up to `time`; reports whether the phase changed.
    fn advance(&mut self, time: f64) -> Result<(usize, bool), GenerationError> {
        let Some(origin) = self.origin else {
            return Err(GenerationError::EmptyStepQueue);
        };
        let mut emitted = 0;
        let mut changed = false;
        loop {
            let t = self.sample_time(&origin, self.next_sample);
            if t > time + TIME_EPS {
                break;
            }
            changed |= self.emit(t)?;
            self.next_sample += 1;
            emitted += 1;
        }
        self.last_tick = Some(time);
        Ok((emitted, changed))
    }

    fn emit(&mut self, time: f64) -> Result<bool, GenerationError> {
        let dt = self.config.timing.control_period;
        let window = self.window_at(time);
        let state = window.map_or(OnlineState::Idle, |w| w.kind.state());
        let feet = self.feet_at(window, time);
        let (ground, ground_rate, zmp_yaw) = match window.and_then(|w| w.swing.as_ref().map(|s| (w, s))) {
            Some((w, swing)) => {
                let support = w.feet.get(swing.foot.opposite());
                let s = ((time - w.start) / w.duration.max(TIME_EPS)).clamp(0.0, 1.0);
                let rise = swing.target.z - swing.origin.position.z;
                let swing_ground = swing.origin.position.z + rise * s;
                (
                    (support.z + swing_ground) / 2.0,
                    rise / (2.0 * w.duration.max(TIME_EPS)),
                    support.theta,
                )
            }
            None => (
                (feet.left.position.z + feet.right.position.z) / 2.0,
                0.0,
                (feet.left.theta + feet.right.theta) / 2.0,
            ),
        };

        let planned: Vec<Vector2<f64>> = (0..=self.controller.preview_steps())
            .map(|j| self.zmp_reference(time + j as f64 * dt))
            .collect();
        let references = self.filter_references(planned);
        let rx: Vec<f64> = references.iter().map(|r| r.x).collect();
        let ry: Vec<f64> = references.iter().map(|r| r.y).collect();

        let com = ComState {
            time,
            x: self.axis_x.x,
            y: self.axis_y.x,
            z: Vector3::new(self.config.preview.com_height + ground, ground_rate, 0.0),
            yaw: Vector3::new(
                (feet.left.theta + feet.right.theta) / 2.0,
                (feet.left.dtheta + feet.right.dtheta) / 2.0,
                (feet.left.ddtheta + feet.right.ddtheta) / 2.0,
            ),
        };
        if !com.is_finite() || !feet.left.is_finite() || !feet.right.is_finite() {
            error!(time, "non-finite heuristic sample");
            return Err(GenerationError::NonFinite("heuristic sample"));
        }
        self.controller.step(&mut self.axis_x, &rx);
        self.controller.step(&mut self.axis_y, &ry);

        self.buffers.push(Sample {
            zmp: ZmpPosition {
                time,
                x: rx[0],
                y: ry[0],
                z: ground,
                theta: zmp_yaw,
                step_type: match state {
                    OnlineState::SingleSupport => StepType::Support,
                    _ => StepType::DoubleSupport,
                },
            },
            com,
            left_foot: feet.left,
            right_foot: feet.right,
        });

        let changed = state != self.state;
        if changed {
            info!(time, from = ?self.state, to = ?state, "support phase changed");
            self.state = state;
        }
        Ok(changed)
    }
}

impl PatternGenerator for ZmpDiscretization {
    fn tick(&mut self, time: f64) -> Result<TickReport, GenerationError> {
        self.check_tick_order(time)?;
        let (samples, support_changed) = self.advance(time)?;
        Ok(TickReport {
            support_changed,
            ..TickReport::new(time, samples)
        })
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
        "heuristic-zmp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use walkgen_test_utils::{example_steps, test_config};

    fn feet() -> (FootPose, FootPose) {
        (
            FootPose::new(0.0, 0.095, 0.0, 0.0),
            FootPose::new(0.0, -0.095, 0.0, 0.0),
        )
    }

    fn started(steps: &[RelativeFootPosition]) -> ZmpDiscretization {
        let mut generator = ZmpDiscretization::new(test_config()).unwrap();
        let (left, right) = feet();
        generator.init_online(0.0, left, right, steps).unwrap();
        generator
    }

    #[test]
    fn windows_follow_the_step_queue() {
        let mut generator = started(&example_steps());
        generator.finish();
        let kinds: Vec<_> = generator.windows().iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![
                WindowKind::DoubleSupport { next_step: 0 },
                WindowKind::SingleSupport { step: 0 },
                WindowKind::DoubleSupport { next_step: 1 },
                WindowKind::SingleSupport { step: 1 },
                WindowKind::DoubleSupport { next_step: 2 },
                WindowKind::SingleSupport { step: 2 },
                WindowKind::DoubleSupport { next_step: 3 },
                WindowKind::FinalDoubleSupport,
                WindowKind::End,
            ]
        );
        assert_relative_eq!(generator.plan_end().unwrap(), 4.4, epsilon = 1e-9);
        let swings: Vec<_> = generator.windows().iter().filter_map(Window::swing_foot).collect();
        assert_eq!(swings, vec![Foot::Right, Foot::Left, Foot::Right]);
    }

    #[test]
    fn zmp_targets_the_support_foot() {
        let generator = started(&example_steps());
        let w = &generator.windows();
        // First swing is the right foot, so the ZMP moves onto the left one.
        assert_relative_eq!(w[0].zmp_from, Vector2::zeros());
        assert_relative_eq!(w[0].zmp_to, Vector2::new(0.0, 0.095));
        assert_relative_eq!(w[1].zmp_to, Vector2::new(0.0, 0.095));
        assert_relative_eq!(w[2].zmp_to, Vector2::new(0.0, -0.105), epsilon = 1e-12);
        assert_relative_eq!(w[2].zmp_at(w[2].start + 0.1), Vector2::new(0.0, -0.005), epsilon = 1e-12);
    }

    #[test]
    fn neutral_offset_rotates_with_the_support() {
        let mut config = test_config();
        config.stance.zmp_neutral_offset = [0.02, 0.0];
        let mut generator = ZmpDiscretization::new(config).unwrap();
        let left = FootPose::new(0.0, 0.095, 0.0, std::f64::consts::FRAC_PI_2);
        let right = FootPose::new(0.0, -0.095, 0.0, std::f64::consts::FRAC_PI_2);
        generator
            .init_online(0.0, left, right, &example_steps())
            .unwrap();
        assert_relative_eq!(generator.windows()[0].zmp_to, Vector2::new(0.0, 0.115), epsilon = 1e-12);
    }

    #[test]
    fn step_durations_override_the_configuration() {
        let steps = [
            RelativeFootPosition::new(0.0, -0.095, 0.0).with_durations(0.6, 0.3),
            RelativeFootPosition::new(0.1, 0.19, 0.0),
        ];
        let generator = started(&steps);
        let w = generator.windows();
        assert_relative_eq!(w[1].duration, 0.6);
        assert_relative_eq!(w[2].duration, 0.3);
        assert_relative_eq!(w[3].duration, 0.8);
        assert_relative_eq!(w[3].start, 0.2 + 0.6 + 0.3, epsilon = 1e-12);
    }

    #[test]
    fn empty_queue_is_rejected() {
        let mut generator = ZmpDiscretization::new(test_config()).unwrap();
        let (left, right) = feet();
        assert_eq!(
            generator.init_online(0.0, left, right, &[]),
            Err(GenerationError::EmptyStepQueue)
        );
        assert_eq!(generator.tick(0.0).unwrap_err(), GenerationError::EmptyStepQueue);
        assert_eq!(
            generator.online_add_foot(RelativeFootPosition::new(0.1, 0.19, 0.0)),
            Err(EditError::NotStarted)
        );
    }

    #[test]
    fn accepted_change_keeps_later_steps_relative() {
        let mut generator = started(&example_steps());
        let ss1 = generator.windows()[3].clone();
        let start = generator
            .online_foot_change(ss1.start + 0.1, FootPose::new(0.25, 0.1, 0.0, 0.0))
            .unwrap();
        assert_relative_eq!(start, ss1.start);
        let w = generator.windows();
        let changed = w[3].swing_target().unwrap();
        assert_relative_eq!(changed.x, 0.25, epsilon = 1e-12);
        assert_relative_eq!(changed.y, 0.1, epsilon = 1e-12);
        let last = w[5].swing_target().unwrap();
        assert_relative_eq!(last.x, 0.45, epsilon = 1e-12);
        assert_relative_eq!(last.y, -0.09, epsilon = 1e-12);
    }

    #[test]
    fn change_outside_single_support_is_rejected() {
        let mut generator = started(&example_steps());
        // Inside DS_1.
        let ds1 = generator.windows()[2].start + 0.05;
        assert_eq!(
            generator.online_foot_change(ds1, FootPose::default()),
            Err(EditError::OutsideModifiableWindow { time: ds1 })
        );
        assert_eq!(generator.steps(), example_steps().as_slice());
    }

    #[test]
    fn no_pending_step_once_all_swings_started() {
        let mut generator = started(&example_steps()[..1]);
        generator.online(0.5).unwrap();
        assert_eq!(
            generator.online_foot_change(0.5, FootPose::default()),
            Err(EditError::NoPendingStep)
        );
    }

    #[test]
    fn adding_after_the_final_stance_is_refused() {
        let mut generator = started(&example_steps()[..1]);
        generator.finish();
        let final_ds = generator.windows()[3].start;
        generator.online(final_ds + 0.05).unwrap();
        assert_eq!(
            generator.online_add_foot(RelativeFootPosition::new(0.1, 0.19, 0.0)),
            Err(EditError::SequenceClosed)
        );
    }

    #[test]
    fn adding_before_the_final_stance_reopens_it() {
        let mut generator = started(&example_steps()[..1]);
        generator.finish();
        generator.online(0.5).unwrap();
        generator
            .online_add_foot(RelativeFootPosition::new(0.2, 0.19, 0.0))
            .unwrap();
        let kinds: Vec<_> = generator.windows().iter().map(|w| w.kind).collect();
        assert_eq!(kinds[3], WindowKind::SingleSupport { step: 1 });
        assert_eq!(kinds.last(), Some(&WindowKind::End));
    }

    #[test]
    fn phases_are_reported() {
        let mut generator = started(&example_steps());
        let report = generator.tick(0.0).unwrap();
        assert_eq!(report.samples, 1);
        assert!(report.support_changed);
        assert_eq!(generator.state(), OnlineState::DoubleSupport);
        generator.online(0.3).unwrap();
        assert_eq!(generator.state(), OnlineState::SingleSupport);
        assert_eq!(generator.buffers().len(), 61);
        assert!(generator.tick(0.3).is_err());
    }

    #[test]
    fn reference_filter_smooths_the_zmp() {
        let run = |tau: f64| {
            let mut config = test_config();
            config.preview.zmp_filter = tau;
            let mut generator = ZmpDiscretization::new(config).unwrap();
            let (left, right) = feet();
            generator
                .discretize(&example_steps(), left, right)
                .unwrap()
        };
        let (raw, smooth) = (run(0.0), run(0.05));
        assert_eq!(raw.len(), smooth.len());

        let kink = |buffers: &TrajectoryBuffers| {
            let y: Vec<f64> = buffers.zmp.iter().map(|z| z.y).collect();
            y.windows(3)
                .map(|w| (w[2] - 2.0 * w[1] + w[0]).abs())
                .fold(0.0, f64::max)
        };
        assert!(kink(&smooth) < 0.5 * kink(&raw));

        // The end phase settles on the same stance.
        let (a, b) = (raw.zmp.back().unwrap(), smooth.zmp.back().unwrap());
        assert_relative_eq!(a.x, b.x, epsilon = 1e-3);
        assert_relative_eq!(a.y, b.y, epsilon = 1e-3);
        // Filtering starts from the resting ZMP, so there is no jump at t = 0.
        assert_relative_eq!(smooth.zmp[0].y, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn regeneration_deadline_tracks_the_next_swing() {
        let mut generator = started(&example_steps());
        assert_relative_eq!(generator.regeneration_deadline().unwrap(), 0.2, epsilon = 1e-9);
        generator.online(0.5).unwrap();
        let ss1 = generator.windows()[3].start;
        assert_relative_eq!(generator.regeneration_deadline().unwrap(), ss1, epsilon = 1e-9);
        // A change made before the deadline is still accepted.
        assert!(generator
            .online_foot_change(ss1 + 0.1, FootPose::new(0.25, 0.1, 0.0, 0.0))
            .is_ok());
    }

    #[test]
    fn idle_after_an_open_plan_runs_out() {
        let mut generator = started(&example_steps()[..1]);
        // DS_0 + SS_0 + DS_1 = 1.2 s
        generator.online(1.5).unwrap();
        assert_eq!(generator.state(), OnlineState::Idle);
        let last = generator.buffers().last().unwrap();
        assert_eq!(last.right_foot.step_type, StepType::DoubleSupport);
        assert_relative_eq!(last.right_foot.position.y, -0.105, epsilon = 1e-12);
    }
}
