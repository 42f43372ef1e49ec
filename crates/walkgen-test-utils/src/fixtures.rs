//! Reference configuration and footstep scripts.

use walkgen_core::config::WalkConfig;
use walkgen_core::types::RelativeFootPosition;

/// Default configuration, validated.
pub fn test_config() -> WalkConfig {
    let config = WalkConfig::default();
    assert!(config.validate().is_ok(), "default config must validate");
    config
}

/// Three steps from a standing pose with the feet 0.19 m apart: right foot
/// in place, then two 0.2 m strides.
///
/// Absolute landing points: right `(0, -0.105)`, left `(0.2, 0.085)`,
/// right `(0.4, -0.105)`.
pub fn example_steps() -> Vec<RelativeFootPosition> {
    vec![
        RelativeFootPosition::new(0.0, -0.105, 0.0),
        RelativeFootPosition::new(0.2, 0.19, 0.0),
        RelativeFootPosition::new(0.2, -0.19, 0.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_alternates_feet() {
        let steps = example_steps();
        assert!(steps[0].dy < 0.0);
        assert!(steps[1].dy > 0.0);
        assert!(steps[2].dy < 0.0);
    }

    #[test]
    fn config_is_valid() {
        assert_eq!(test_config().preview.horizon, 16);
    }
}
