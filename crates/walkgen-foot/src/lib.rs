//! Swing foot trajectory synthesis.
//!
//! [`polynomial`] holds the cubic and quartic segments, [`trajectory`] the
//! per-foot generator that combines them into lift-off, flight and landing
//! windows.

pub mod polynomial;
pub mod trajectory;

pub use polynomial::{Cubic, Polynomial, Quartic};
pub use trajectory::{
    FootAxis, FootTrajectoryGenerator, SwingWindows, absolute_from_relative, next_pose,
    relative_between,
};
