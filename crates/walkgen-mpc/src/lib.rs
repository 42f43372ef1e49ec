//! Velocity-reference ZMP/CoM model predictive control with automatic
//! footstep placement.
//!
//! The pipeline run at every sample period:
//!
//! 1. **Support preview** ([`support`]): the support-phase state machine is
//!    stepped once for the current instant and `N` times for the horizon.
//! 2. **Feasibility regions** ([`polygon`]): ZMP and foot-reach polygons are
//!    rotated with the predicted yaw and linearized into half-planes.
//! 3. **QP** ([`solver`]): CoM jerks and footstep positions minimizing
//!    velocity error, ZMP centering and jerk, solved with Clarabel.
//! 4. **Output** ([`generator`]): the first jerk is integrated at the control
//!    period and the first footstep retargets the swinging foot.
//!
//! The CoM follows the cart-table model described in [`dynamics`].

pub mod dynamics;
pub mod generator;
pub mod horizon;
pub mod polygon;
pub mod solver;
pub mod support;
pub mod types;

pub use dynamics::{CartTable, DynamicsKind, HorizonDynamics, LinearDynamics, SelectionMatrices};
pub use generator::OnlineGenerator;
pub use horizon::{HorizonInputs, build_horizon};
pub use polygon::{ConvexHull, FeasibilityRegions, LinearConstraints, linearize};
pub use solver::VelRefQp;
pub use support::{SupportFsm, SupportSelector, SupportTracker};
pub use types::{PreviewHorizon, QpProblem, QpSolution};
