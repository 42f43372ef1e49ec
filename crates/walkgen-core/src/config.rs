use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Foot;

/// Polygons with a smaller area are treated as collapsed.
pub const MIN_POLYGON_AREA: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_single_support() -> f64 {
    0.8
}
const fn default_double_support() -> f64 {
    0.2
}
const fn default_ds_ss_wait() -> f64 {
    0.8
}
const fn default_control_period() -> f64 {
    0.005
}
const fn default_end_phase() -> f64 {
    1.0
}
const fn default_sample_period() -> f64 {
    0.1
}
const fn default_horizon() -> usize {
    16
}
const fn default_com_height() -> f64 {
    0.814
}
const fn default_gravity() -> f64 {
    9.81
}
const fn default_preview_window() -> f64 {
    1.6
}
const fn default_tracking_weight() -> f64 {
    1.0
}
const fn default_input_weight() -> f64 {
    1e-6
}
const fn default_step_height() -> f64 {
    0.07
}
const fn default_modulation() -> f64 {
    0.9
}
const fn default_sole_depth() -> f64 {
    0.236
}
const fn default_sole_width() -> f64 {
    0.138
}
const fn default_ankle_height() -> f64 {
    0.105
}
const fn default_heel_to_ankle() -> f64 {
    0.1
}
const fn default_security_margin() -> f64 {
    0.02
}
fn default_foot_reach() -> Vec<[f64; 2]> {
    vec![
        [-0.28, -0.16],
        [-0.2, -0.25],
        [0.0, -0.3],
        [0.2, -0.25],
        [0.28, -0.16],
    ]
}
const fn default_velocity_weight() -> f64 {
    1.0
}
const fn default_cop_weight() -> f64 {
    1e-4
}
const fn default_jerk_weight() -> f64 {
    1e-6
}
const fn default_max_solver_iters() -> u32 {
    100
}
const fn default_half_stance_width() -> f64 {
    0.095
}
const fn default_number_steps() -> u32 {
    1
}
const fn default_start_foot() -> Foot {
    Foot::Left
}

// ---------------------------------------------------------------------------
// WalkConfig
// ---------------------------------------------------------------------------

/// Complete generator configuration. Every section falls back to its
/// defaults when missing from the TOML source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalkConfig {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub swing: SwingConfig,
    #[serde(default)]
    pub foot: FootGeometry,
    #[serde(default)]
    pub feasibility: FeasibilityConfig,
    #[serde(default)]
    pub weights: QpWeights,
    #[serde(default)]
    pub stance: StanceConfig,
}

impl WalkConfig {
    /// Validate every section. Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;
        self.preview.validate(&self.timing)?;
        self.swing.validate()?;
        self.foot.validate()?;
        self.feasibility.validate(&self.foot)?;
        self.weights.validate()?;
        Ok(())
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Control ticks per QP sample.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn ticks_per_sample(&self) -> usize {
        (self.preview.sample_period / self.timing.control_period).round() as usize
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidDuration { field, value })
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// TimingConfig
// ---------------------------------------------------------------------------

/// Phase durations and the control period, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_single_support")]
    pub single_support: f64,
    #[serde(default = "default_double_support")]
    pub double_support: f64,
    /// Longest wait in double support once a velocity reference arrives.
    #[serde(default = "default_ds_ss_wait")]
    pub ds_ss_wait: f64,
    /// Output sample period.
    #[serde(default = "default_control_period")]
    pub control_period: f64,
    /// Hold time after the last step of a heuristic sequence.
    #[serde(default = "default_end_phase")]
    pub end_phase: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            single_support: default_single_support(),
            double_support: default_double_support(),
            ds_ss_wait: default_ds_ss_wait(),
            control_period: default_control_period(),
            end_phase: default_end_phase(),
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("single_support", self.single_support)?;
        positive("double_support", self.double_support)?;
        positive("ds_ss_wait", self.ds_ss_wait)?;
        positive("control_period", self.control_period)?;
        if self.end_phase < 0.0 || !self.end_phase.is_finite() {
            return Err(ConfigError::InvalidDuration {
                field: "end_phase",
                value: self.end_phase,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PreviewConfig
// ---------------------------------------------------------------------------

/// Preview horizon and cart-table model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// QP sample period `T_prw`.
    #[serde(default = "default_sample_period")]
    pub sample_period: f64,
    /// Number of QP samples `N`.
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    #[serde(default = "default_com_height")]
    pub com_height: f64,
    #[serde(default = "default_gravity")]
    pub gravity: f64,
    /// Look-ahead of the heuristic path's preview controller, seconds.
    #[serde(default = "default_preview_window")]
    pub preview_window: f64,
    /// ZMP tracking error weight of the preview controller.
    #[serde(default = "default_tracking_weight")]
    pub tracking_weight: f64,
    /// Jerk increment weight of the preview controller.
    #[serde(default = "default_input_weight")]
    pub input_weight: f64,
    /// Time constant, seconds, of the first-order filter smoothing the
    /// heuristic path's ZMP reference. Zero leaves it unfiltered.
    #[serde(default)]
    pub zmp_filter: f64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            sample_period: default_sample_period(),
            horizon: default_horizon(),
            com_height: default_com_height(),
            gravity: default_gravity(),
            preview_window: default_preview_window(),
            tracking_weight: default_tracking_weight(),
            input_weight: default_input_weight(),
            zmp_filter: 0.0,
        }
    }
}

impl PreviewConfig {
    pub fn validate(&self, timing: &TimingConfig) -> Result<(), ConfigError> {
        positive("sample_period", self.sample_period)?;
        positive("preview_window", self.preview_window)?;
        if timing.control_period > self.sample_period {
            return Err(ConfigError::ControlPeriodExceedsSamplePeriod);
        }
        let ratio = self.sample_period / timing.control_period;
        if (ratio - ratio.round()).abs() > 1e-6 {
            return Err(ConfigError::PeriodNotMultiple {
                sample: self.sample_period,
                control: timing.control_period,
            });
        }
        if self.horizon == 0 {
            return Err(ConfigError::EmptyHorizon);
        }
        if self.com_height <= 0.0 {
            return Err(invalid("com_height", "must be > 0"));
        }
        if self.gravity <= 0.0 {
            return Err(invalid("gravity", "must be > 0"));
        }
        if self.tracking_weight <= 0.0 || self.input_weight <= 0.0 {
            return Err(invalid("preview weights", "must be > 0"));
        }
        if !(self.zmp_filter >= 0.0 && self.zmp_filter.is_finite()) {
            return Err(invalid("zmp_filter", "must be >= 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SwingConfig
// ---------------------------------------------------------------------------

/// Swing foot shaping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingConfig {
    /// Apex height above the higher of the two footholds.
    #[serde(default = "default_step_height")]
    pub step_height: f64,
    /// Fraction of the single-support time during which the foot translates.
    #[serde(default = "default_modulation")]
    pub modulation: f64,
    /// Lift-off / landing tilt magnitude, radians.
    #[serde(default)]
    pub omega: f64,
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            step_height: default_step_height(),
            modulation: default_modulation(),
            omega: 0.0,
        }
    }
}

impl SwingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.modulation > 0.0 && self.modulation <= 1.0) {
            return Err(invalid("modulation", "must be in (0, 1]"));
        }
        if self.step_height < 0.0 {
            return Err(invalid("step_height", "must be >= 0"));
        }
        if self.omega.abs() >= std::f64::consts::FRAC_PI_2 {
            return Err(invalid("omega", "tilt must stay below 90 degrees"));
        }
        if self.omega.abs() > 0.0 && self.modulation >= 1.0 {
            return Err(invalid("modulation", "a tilted swing needs lift-off and landing windows"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FootGeometry
// ---------------------------------------------------------------------------

/// Sole dimensions, metres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootGeometry {
    #[serde(default = "default_sole_depth")]
    pub sole_depth: f64,
    #[serde(default = "default_sole_width")]
    pub sole_width: f64,
    #[serde(default = "default_ankle_height")]
    pub ankle_height: f64,
    #[serde(default = "default_heel_to_ankle")]
    pub heel_to_ankle: f64,
}

impl Default for FootGeometry {
    fn default() -> Self {
        Self {
            sole_depth: default_sole_depth(),
            sole_width: default_sole_width(),
            ankle_height: default_ankle_height(),
            heel_to_ankle: default_heel_to_ankle(),
        }
    }
}

impl FootGeometry {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("sole_depth", self.sole_depth),
            ("sole_width", self.sole_width),
            ("ankle_height", self.ankle_height),
            ("heel_to_ankle", self.heel_to_ankle),
        ] {
            if value <= 0.0 || !value.is_finite() {
                return Err(invalid(field, "must be > 0"));
            }
        }
        if self.heel_to_ankle >= self.sole_depth {
            return Err(invalid("heel_to_ankle", "must be shorter than sole_depth"));
        }
        Ok(())
    }

    pub fn ankle_to_toe(&self) -> f64 {
        self.sole_depth - self.heel_to_ankle
    }
}

// ---------------------------------------------------------------------------
// FeasibilityConfig
// ---------------------------------------------------------------------------

/// Templates for the ZMP and footstep feasibility regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityConfig {
    /// Margin kept between the ZMP and the sole edges.
    #[serde(default = "default_security_margin")]
    pub security_margin: f64,
    /// Reachable landing region of the right foot in the frame of a left
    /// support foot, counter-clockwise.
    #[serde(default = "default_foot_reach")]
    pub foot_reach: Vec<[f64; 2]>,
}

impl Default for FeasibilityConfig {
    fn default() -> Self {
        Self {
            security_margin: default_security_margin(),
            foot_reach: default_foot_reach(),
        }
    }
}

impl FeasibilityConfig {
    pub fn validate(&self, foot: &FootGeometry) -> Result<(), ConfigError> {
        if self.security_margin < 0.0 {
            return Err(invalid("security_margin", "must be >= 0"));
        }
        let half_width = foot.sole_width / 2.0 - self.security_margin;
        let depth = foot.sole_depth - 2.0 * self.security_margin;
        let zmp_area = 2.0 * half_width * depth;
        if half_width <= 0.0 || depth <= 0.0 || zmp_area < MIN_POLYGON_AREA {
            return Err(ConfigError::DegenerateTemplate {
                name: "zmp",
                area: zmp_area.max(0.0),
            });
        }
        if self.foot_reach.len() < 3 {
            return Err(ConfigError::DegenerateTemplate {
                name: "foot_reach",
                area: 0.0,
            });
        }
        let area = signed_area(&self.foot_reach);
        if area.abs() < MIN_POLYGON_AREA {
            return Err(ConfigError::DegenerateTemplate {
                name: "foot_reach",
                area: area.abs(),
            });
        }
        if area < 0.0 {
            return Err(ConfigError::ClockwiseTemplate { name: "foot_reach" });
        }
        Ok(())
    }
}

/// Shoelace area, positive for counter-clockwise vertex order.
pub fn signed_area(vertices: &[[f64; 2]]) -> f64 {
    let n = vertices.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let [x0, y0] = vertices[i];
            let [x1, y1] = vertices[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum();
    twice / 2.0
}

// ---------------------------------------------------------------------------
// QpWeights
// ---------------------------------------------------------------------------

/// Objective weights of the velocity-reference QP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QpWeights {
    /// Velocity tracking (beta).
    #[serde(default = "default_velocity_weight")]
    pub velocity: f64,
    /// ZMP centring inside the support (gamma).
    #[serde(default = "default_cop_weight")]
    pub cop_centering: f64,
    /// Jerk regularisation (alpha).
    #[serde(default = "default_jerk_weight")]
    pub jerk: f64,
    #[serde(default = "default_max_solver_iters")]
    pub max_solver_iters: u32,
}

impl Default for QpWeights {
    fn default() -> Self {
        Self {
            velocity: default_velocity_weight(),
            cop_centering: default_cop_weight(),
            jerk: default_jerk_weight(),
            max_solver_iters: default_max_solver_iters(),
        }
    }
}

impl QpWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jerk <= 0.0 {
            return Err(invalid("weights.jerk", "must be > 0 to keep the Hessian definite"));
        }
        if self.velocity < 0.0 || self.cop_centering < 0.0 {
            return Err(invalid("weights", "must be >= 0"));
        }
        if self.max_solver_iters == 0 {
            return Err(invalid("max_solver_iters", "must be >= 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StanceConfig
// ---------------------------------------------------------------------------

/// Initial stance and stepping policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StanceConfig {
    /// Lateral distance from the mid-feet point to each ankle.
    #[serde(default = "default_half_stance_width")]
    pub half_stance_width: f64,
    /// Single-support phases taken after the reference stops.
    #[serde(default = "default_number_steps")]
    pub number_steps: u32,
    /// Supporting foot of the first single-support phase.
    #[serde(default = "default_start_foot")]
    pub start_foot: Foot,
    /// ZMP offset from the ankle, support-foot frame.
    #[serde(default)]
    pub zmp_neutral_offset: [f64; 2],
}

impl Default for StanceConfig {
    fn default() -> Self {
        Self {
            half_stance_width: default_half_stance_width(),
            number_steps: default_number_steps(),
            start_foot: default_start_foot(),
            zmp_neutral_offset: [0.0, 0.0],
        }
    }
}
