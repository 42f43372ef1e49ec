//! Continuity checks on output buffers.

use std::collections::VecDeque;

use walkgen_core::types::{ComState, FootAbsolutePosition, ZmpPosition};

/// Largest position change of a foot between consecutive samples.
pub fn max_foot_jump(samples: &VecDeque<FootAbsolutePosition>) -> f64 {
    samples
        .iter()
        .zip(samples.iter().skip(1))
        .map(|(a, b)| (b.position - a.position).norm())
        .fold(0.0, f64::max)
}

/// Largest planar CoM position change between consecutive samples.
pub fn max_com_jump(samples: &VecDeque<ComState>) -> f64 {
    samples
        .iter()
        .zip(samples.iter().skip(1))
        .map(|(a, b)| (b.x[0] - a.x[0]).hypot(b.y[0] - a.y[0]))
        .fold(0.0, f64::max)
}

/// Largest planar ZMP change between consecutive samples.
pub fn max_zmp_jump(samples: &VecDeque<ZmpPosition>) -> f64 {
    samples
        .iter()
        .zip(samples.iter().skip(1))
        .map(|(a, b)| (b.x - a.x).hypot(b.y - a.y))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn foot_jump_is_largest_step() {
        let mut feet = VecDeque::new();
        for x in [0.0, 0.01, 0.05, 0.06] {
            let mut f = FootAbsolutePosition::default();
            f.position = Vector3::new(x, 0.0, 0.0);
            feet.push_back(f);
        }
        assert!((max_foot_jump(&feet) - 0.04).abs() < 1e-12);
    }

    #[test]
    fn empty_streams_have_no_jump() {
        assert_eq!(max_com_jump(&VecDeque::new()), 0.0);
        assert_eq!(max_zmp_jump(&VecDeque::new()), 0.0);
    }
}
