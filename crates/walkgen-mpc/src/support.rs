//! Support-phase state machine and its preview.
//!
//! The same transition rule advances the authoritative current state once
//! per replan and, from a copy of it, generates the support states of the
//! `N` future samples of the horizon.
//!
//! ```text
//!            reference given
//!   DS ─────────────────────────▶ SS(start foot)
//!   ▲                                 │  time limit reached,
//!   │ no reference and                │  steps left or reference given
//!   │ no steps left                   ▼
//!   └──────────────────────────── SS(other foot) ◀─┐
//!                                     └────────────┘
//! ```

use tracing::info;

use walkgen_core::config::{StanceConfig, TimingConfig};
use walkgen_core::types::{Foot, ReferenceVelocity, SupportPhase, SupportState};

/// Tolerance on transition instants.
pub const TRANSITION_EPS: f64 = 1e-8;

/// Which owned state an evaluation mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportSelector {
    Current,
    Previewed,
}

// ---------------------------------------------------------------------------
// SupportFsm
// ---------------------------------------------------------------------------

/// Transition rule between support phases.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportFsm {
    ss_duration: f64,
    ds_duration: f64,
    ds_ss_wait: f64,
    number_steps: u32,
    start_foot: Foot,
}

impl SupportFsm {
    pub fn new(timing: &TimingConfig, stance: &StanceConfig) -> Self {
        Self {
            ss_duration: timing.single_support,
            ds_duration: timing.double_support,
            ds_ss_wait: timing.ds_ss_wait,
            number_steps: stance.number_steps,
            start_foot: stance.start_foot,
        }
    }

    pub const fn ss_duration(&self) -> f64 {
        self.ss_duration
    }

    pub fn set_ss_duration(&mut self, duration: f64) {
        self.ss_duration = duration;
    }

    pub fn set_ds_duration(&mut self, duration: f64) {
        self.ds_duration = duration;
    }

    /// Evaluate the rule once at `time`. Returns true on a transition.
    pub fn advance(&self, time: f64, reference: &ReferenceVelocity, state: &mut SupportState) -> bool {
        state.state_changed = false;
        let moving = reference.is_moving();

        // A reference cuts a long double-support wait short.
        if moving
            && state.is_double_support()
            && state.time_limit - time - TRANSITION_EPS > self.ds_ss_wait
        {
            state.time_limit = time + self.ds_ss_wait;
        }

        if time + TRANSITION_EPS < state.time_limit {
            return false;
        }

        match state.phase {
            SupportPhase::SingleSupport if !moving && state.steps_left == 0 => {
                state.phase = SupportPhase::DoubleSupport;
                state.time_limit = time + self.ds_duration;
            }
            SupportPhase::DoubleSupport if moving => {
                state.phase = SupportPhase::SingleSupport;
                state.foot = self.start_foot;
                state.time_limit = time + self.ss_duration;
                state.steps_left = self.number_steps;
            }
            SupportPhase::SingleSupport => {
                state.foot = state.foot.opposite();
                state.time_limit = time + self.ss_duration;
                state.step_number += 1;
                if !moving {
                    state.steps_left = state.steps_left.saturating_sub(1);
                }
            }
            SupportPhase::DoubleSupport => return false,
        }
        state.state_changed = true;
        state.start_time = time;
        true
    }
}

// ---------------------------------------------------------------------------
// SupportTracker
// ---------------------------------------------------------------------------

/// Owns the current support state and the scratch state used for preview.
#[derive(Debug, Clone)]
pub struct SupportTracker {
    fsm: SupportFsm,
    current: SupportState,
    previewed: SupportState,
}

impl SupportTracker {
    pub const fn new(fsm: SupportFsm, initial: SupportState) -> Self {
        Self {
            fsm,
            current: initial,
            previewed: initial,
        }
    }

    pub const fn fsm(&self) -> &SupportFsm {
        &self.fsm
    }

    pub fn fsm_mut(&mut self) -> &mut SupportFsm {
        &mut self.fsm
    }

    pub const fn current(&self) -> &SupportState {
        &self.current
    }

    /// Set the pose of the current support (after a landing).
    pub fn set_current_pose(&mut self, x: f64, y: f64, yaw: f64) {
        self.current.x = x;
        self.current.y = y;
        self.current.yaw = yaw;
    }

    pub const fn previewed(&self) -> &SupportState {
        &self.previewed
    }

    /// Evaluate the transition rule on the selected state.
    ///
    /// Evaluating [`SupportSelector::Current`] re-seeds the previewed state
    /// from the result, with its step counter reset.
    pub fn evaluate(
        &mut self,
        selector: SupportSelector,
        time: f64,
        reference: &ReferenceVelocity,
    ) -> bool {
        match selector {
            SupportSelector::Current => {
                let changed = self.fsm.advance(time, reference, &mut self.current);
                self.current.step_number = 0;
                if changed {
                    info!(
                        time,
                        phase = ?self.current.phase,
                        foot = ?self.current.foot,
                        steps_left = self.current.steps_left,
                        "support transition"
                    );
                }
                self.reseed_preview();
                changed
            }
            SupportSelector::Previewed => self.fsm.advance(time, reference, &mut self.previewed),
        }
    }

    fn reseed_preview(&mut self) {
        self.previewed = self.current;
        self.previewed.step_number = 0;
        self.previewed.state_changed = false;
    }

    /// Support states of the `horizon` samples following `time`.
    ///
    /// Sample `i` (1-based) is evaluated at `time + i·period`, exactly once.
    pub fn preview(
        &mut self,
        time: f64,
        reference: &ReferenceVelocity,
        horizon: usize,
        period: f64,
    ) -> Vec<SupportState> {
        self.reseed_preview();
        (1..=horizon)
            .map(|i| {
                self.evaluate(SupportSelector::Previewed, time + i as f64 * period, reference);
                self.previewed
            })
            .collect()
    }
}
