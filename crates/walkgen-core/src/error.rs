use thiserror::Error;

/// Top-level error type for walkgen.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Edit error: {0}")]
    Edit(#[from] EditError),
}

/// Configuration errors. Raised when a configuration is loaded or validated,
/// never from inside a control tick.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid duration for {field}: {value} (must be > 0)")]
    InvalidDuration { field: &'static str, value: f64 },

    #[error("control_period must be <= sample_period")]
    ControlPeriodExceedsSamplePeriod,

    #[error("sample_period {sample} is not an integer multiple of control_period {control}")]
    PeriodNotMultiple { sample: f64, control: f64 },

    #[error("Preview horizon must hold at least one sample")]
    EmptyHorizon,

    #[error("Polygon template {name} is degenerate (area {area:.3e})")]
    DegenerateTemplate { name: &'static str, area: f64 },

    #[error("Polygon template {name} is not counter-clockwise")]
    ClockwiseTemplate { name: &'static str },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors surfaced by a generator tick.
///
/// Copy + static payloads so that the tick path never allocates to report.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GenerationError {
    #[error("QP infeasible at t={time:.4}s (solver status: {status})")]
    QpInfeasible { time: f64, status: &'static str },

    #[error("Support polygon collapsed to area {area:.3e}")]
    DegeneratePolygon { area: f64 },

    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("No footstep queued while a step was expected")]
    EmptyStepQueue,

    #[error("Tick at t={time:.4}s is not after the last tick t={last:.4}s")]
    OutOfOrderTick { time: f64, last: f64 },
}

/// Rejected online edits. Buffers are left untouched when one of these is
/// returned.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EditError {
    #[error("t={time:.4}s is not inside a modifiable single-support window")]
    OutsideModifiableWindow { time: f64 },

    #[error("Axis index {0} is not one of x, y, z, theta, omega, omega2")]
    InvalidAxis(usize),

    #[error("No pending footstep to modify")]
    NoPendingStep,

    #[error("The step sequence has already reached its final stance")]
    SequenceClosed,

    #[error("The generator has not been started")]
    NotStarted,
}

impl EditError {
    /// Negative status code matching the classic integer return convention.
    pub const fn status_code(&self) -> i32 {
        match self {
            Self::OutsideModifiableWindow { .. } => -1,
            Self::InvalidAxis(_) => -2,
            Self::NoPendingStep => -3,
            Self::SequenceClosed => -4,
            Self::NotStarted => -5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_error_from_config_error() {
        let err = ConfigError::InvalidDuration {
            field: "single_support",
            value: -1.0,
        };
        let walk_err: WalkError = err.into();
        assert!(matches!(walk_err, WalkError::Config(_)));
        assert!(walk_err.to_string().contains("-1"));
    }

    #[test]
    fn walk_error_from_generation_error() {
        let err = GenerationError::NonFinite("com state");
        let walk_err: WalkError = err.into();
        assert!(matches!(walk_err, WalkError::Generation(_)));
        assert!(walk_err.to_string().contains("com state"));
    }

    #[test]
    fn walk_error_from_edit_error() {
        let walk_err: WalkError = EditError::InvalidAxis(7).into();
        assert!(matches!(walk_err, WalkError::Edit(_)));
        assert!(walk_err.to_string().contains('7'));
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::Io(_)));
    }

    #[test]
    fn edit_error_status_codes_are_negative() {
        for err in [
            EditError::OutsideModifiableWindow { time: 3.0 },
            EditError::InvalidAxis(6),
            EditError::NoPendingStep,
            EditError::SequenceClosed,
            EditError::NotStarted,
        ] {
            assert!(err.status_code() < 0);
        }
    }

    #[test]
    fn generation_error_display_messages() {
        assert_eq!(
            GenerationError::QpInfeasible {
                time: 1.5,
                status: "PrimalInfeasible"
            }
            .to_string(),
            "QP infeasible at t=1.5000s (solver status: PrimalInfeasible)"
        );
        assert_eq!(
            GenerationError::EmptyStepQueue.to_string(),
            "No footstep queued while a step was expected"
        );
        assert_eq!(
            GenerationError::OutOfOrderTick {
                time: 0.1,
                last: 0.2
            }
            .to_string(),
            "Tick at t=0.1000s is not after the last tick t=0.2000s"
        );
    }

    #[test]
    fn config_error_display_messages() {
        assert_eq!(
            ConfigError::ControlPeriodExceedsSamplePeriod.to_string(),
            "control_period must be <= sample_period"
        );
        assert_eq!(
            ConfigError::EmptyHorizon.to_string(),
            "Preview horizon must hold at least one sample"
        );
        assert_eq!(
            ConfigError::ClockwiseTemplate { name: "zmp" }.to_string(),
            "Polygon template zmp is not counter-clockwise"
        );
        assert_eq!(
            ConfigError::InvalidValue {
                field: "modulation".into(),
                message: "must be in (0, 1]".into()
            }
            .to_string(),
            "Invalid value for modulation: must be in (0, 1]"
        );
    }
}
