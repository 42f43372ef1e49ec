//! State shared by the script commands: the active generator, the clock
//! and the samples collected so far.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};

use walkgen_core::config::WalkConfig;
use walkgen_core::error::{ConfigError, EditError, GenerationError};
use walkgen_core::traits::PatternGenerator;
use walkgen_core::types::{FootPair, FootPose, ReferenceVelocity, RelativeFootPosition, Sample};
use walkgen_mpc::OnlineGenerator;
use walkgen_zmp::ZmpDiscretization;

/// Which generator the script drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkMode {
    /// Footstep sequences through the heuristic ZMP path.
    #[default]
    Heuristic,
    /// Velocity reference through the preview QP.
    Qp,
}

impl fmt::Display for WalkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heuristic => write!(f, "heuristic"),
            Self::Qp => write!(f, "qp"),
        }
    }
}

impl FromStr for WalkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "heuristic" | "0" => Ok(Self::Heuristic),
            "qp" | "1" => Ok(Self::Qp),
            other => Err(format!("unknown walk mode `{other}` (heuristic or qp)")),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{action} needs walk mode {needed}")]
    WrongMode {
        action: &'static str,
        needed: WalkMode,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Edit(#[from] EditError),
}

#[derive(Debug)]
enum Active {
    None,
    Heuristic(Box<ZmpDiscretization>),
    Qp(Box<OnlineGenerator>),
}

/// One script execution.
#[derive(Debug)]
pub struct Session {
    config: WalkConfig,
    mode: WalkMode,
    active: Active,
    /// Stance the next generator starts from.
    stance: FootPair<FootPose>,
    next_tick: usize,
    samples: Vec<Sample>,
}

impl Session {
    pub fn new(config: WalkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let w = config.stance.half_stance_width;
        Ok(Self {
            stance: FootPair::new(
                FootPose::new(0.0, w, 0.0, 0.0),
                FootPose::new(0.0, -w, 0.0, 0.0),
            ),
            config,
            mode: WalkMode::default(),
            active: Active::None,
            next_tick: 0,
            samples: Vec::new(),
        })
    }

    pub const fn config(&self) -> &WalkConfig {
        &self.config
    }

    pub const fn mode(&self) -> WalkMode {
        self.mode
    }

    /// Time of the next tick.
    pub fn time(&self) -> f64 {
        self.next_tick as f64 * self.config.timing.control_period
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    pub fn heuristic(&self) -> Option<&ZmpDiscretization> {
        match &self.active {
            Active::Heuristic(g) => Some(&**g),
            _ => None,
        }
    }

    pub fn qp(&self) -> Option<&OnlineGenerator> {
        match &self.active {
            Active::Qp(g) => Some(&**g),
            _ => None,
        }
    }

    /// Switch generator. The running one, if any, is dropped and the next
    /// walk starts from where it left the feet.
    pub fn set_mode(&mut self, mode: WalkMode) {
        if mode != self.mode {
            if !matches!(self.active, Active::None) {
                warn!(from = %self.mode, to = %mode, "dropping the running generator");
            }
            self.active = Active::None;
            self.mode = mode;
        }
    }

    fn update_config(&mut self, edit: impl FnOnce(&mut WalkConfig)) -> Result<(), ConfigError> {
        let mut config = self.config.clone();
        edit(&mut config);
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_single_support(&mut self, duration: f64) -> Result<(), SessionError> {
        match &mut self.active {
            Active::Heuristic(g) => g.set_single_support(duration)?,
            Active::Qp(g) => g.set_single_support(duration)?,
            Active::None => {}
        }
        self.update_config(|c| c.timing.single_support = duration)?;
        Ok(())
    }

    pub fn set_double_support(&mut self, duration: f64) -> Result<(), SessionError> {
        match &mut self.active {
            Active::Heuristic(g) => g.set_double_support(duration)?,
            Active::Qp(g) => g.set_double_support(duration)?,
            Active::None => {}
        }
        self.update_config(|c| c.timing.double_support = duration)?;
        Ok(())
    }

    pub fn set_step_height(&mut self, height: f64) -> Result<(), SessionError> {
        self.update_config(|c| c.swing.step_height = height)?;
        match &mut self.active {
            Active::Heuristic(g) => g.set_step_height(height),
            Active::Qp(g) => g.set_step_height(height),
            Active::None => {}
        }
        Ok(())
    }

    /// Tilt magnitude in radians.
    pub fn set_omega(&mut self, omega: f64) -> Result<(), SessionError> {
        self.update_config(|c| c.swing.omega = omega)?;
        match &mut self.active {
            Active::Heuristic(g) => g.set_omega(omega),
            Active::Qp(g) => g.set_omega(omega)?,
            Active::None => {}
        }
        Ok(())
    }

    /// Start a heuristic walk over `steps` from the current stance.
    pub fn start_sequence(&mut self, steps: &[RelativeFootPosition]) -> Result<(), SessionError> {
        self.require(WalkMode::Heuristic, "a step sequence")?;
        let mut generator = ZmpDiscretization::new(self.config.clone())?;
        generator.init_online(self.time(), self.stance.left, self.stance.right, steps)?;
        self.active = Active::Heuristic(Box::new(generator));
        Ok(())
    }

    /// Queue one step, starting a walk if none is running.
    pub fn add_step(&mut self, step: RelativeFootPosition) -> Result<(), SessionError> {
        self.require(WalkMode::Heuristic, "adding a step")?;
        match &mut self.active {
            Active::Heuristic(g) => Ok(g.online_add_foot(step)?),
            _ => self.start_sequence(&[step]),
        }
    }

    /// Move a pending landing. Returns the start time of its swing.
    pub fn change_step(&mut self, time: f64, x: f64, y: f64, theta: f64) -> Result<f64, SessionError> {
        self.require(WalkMode::Heuristic, "changing a step")?;
        let Active::Heuristic(generator) = &mut self.active else {
            return Err(EditError::NotStarted.into());
        };
        let z = generator
            .windows()
            .iter()
            .find(|w| time >= w.start && time < w.end())
            .and_then(walkgen_zmp::Window::swing_target)
            .map_or(0.0, |pose| pose.z);
        Ok(generator.online_foot_change(time, FootPose::new(x, y, z, theta))?)
    }

    /// End the walk: close the heuristic sequence or zero the reference.
    pub fn finish(&mut self) {
        match &mut self.active {
            Active::Heuristic(g) => g.finish(),
            Active::Qp(g) => g.set_reference(ReferenceVelocity::default()),
            Active::None => warn!("nothing to finish"),
        }
    }

    pub fn set_velocity_reference(&mut self, reference: ReferenceVelocity) -> Result<(), SessionError> {
        self.require(WalkMode::Qp, "a velocity reference")?;
        self.ensure_qp()?;
        if let Active::Qp(g) = &mut self.active {
            g.set_reference(reference);
        }
        Ok(())
    }

    /// Install a standing qp generator unless one is running.
    fn ensure_qp(&mut self) -> Result<(), ConfigError> {
        if !matches!(self.active, Active::Qp(_)) {
            let generator =
                OnlineGenerator::with_feet(self.config.clone(), self.stance.left, self.stance.right)?;
            self.active = Active::Qp(Box::new(generator));
        }
        Ok(())
    }

    fn require(&self, needed: WalkMode, action: &'static str) -> Result<(), SessionError> {
        if self.mode == needed {
            Ok(())
        } else {
            Err(SessionError::WrongMode { action, needed })
        }
    }

    /// Tick the active generator for `duration` seconds. Returns the number
    /// of samples collected.
    pub fn run(&mut self, duration: f64) -> Result<usize, SessionError> {
        let dt = self.config.timing.control_period;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ticks = (duration / dt).round().max(0.0) as usize;
        if self.mode == WalkMode::Qp {
            self.ensure_qp()?;
        }
        let generator: &mut dyn PatternGenerator = match &mut self.active {
            Active::Heuristic(g) => g.as_mut(),
            Active::Qp(g) => g.as_mut(),
            Active::None => return Err(GenerationError::EmptyStepQueue.into()),
        };

        let before = self.samples.len();
        let mut fallbacks = 0;
        for _ in 0..ticks {
            let time = self.next_tick as f64 * dt;
            let report = generator.tick(time)?;
            if report.fallback.is_some() {
                fallbacks += 1;
            }
            self.samples.extend(generator.drain());
            self.next_tick += 1;
        }
        if let Some(last) = self.samples.last() {
            self.stance = FootPair::new(ground(&last.left_foot.pose()), ground(&last.right_foot.pose()));
        }
        let collected = self.samples.len() - before;
        info!(
            generator = generator.name(),
            duration,
            samples = collected,
            fallbacks,
            "run finished"
        );
        Ok(collected)
    }
}

/// Pose of a foot put down where it is.
fn ground(pose: &FootPose) -> FootPose {
    FootPose::new(pose.x, pose.y, pose.z.max(0.0), pose.theta)
}
