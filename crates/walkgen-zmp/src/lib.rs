//! Heuristic walking pattern generation.
//!
//! [`discretization`] turns a queue of relative footsteps into support
//! windows, a piecewise-linear ZMP reference and swing-foot trajectories.
//! [`preview`] realises the ZMP reference with a CoM trajectory through
//! preview control of the cart-table model.

pub mod discretization;
pub mod preview;

pub use discretization::{OnlineState, Window, WindowKind, ZmpDiscretization};
pub use preview::{AxisState, PreviewController};
