//! Shared test fixtures and utilities for walkgen crates.
//!
//! Provides the reference configuration and footstep scripts, helpers that
//! drive a [`PatternGenerator`](walkgen_core::PatternGenerator) tick by tick,
//! trajectory continuity checks and deterministic RNG setup.

pub mod checks;
pub mod fixtures;
pub mod rng;
pub mod runs;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use checks::{max_com_jump, max_foot_jump, max_zmp_jump};
pub use fixtures::{example_steps, test_config};
pub use rng::{random_steps, seeded_rng};
pub use runs::{tick_n, tick_range};
