//! Deterministic RNG utilities for reproducible tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use walkgen_core::types::RelativeFootPosition;

/// Create a deterministic `ChaCha8Rng` from a seed.
///
/// All test randomization should go through this to ensure reproducibility.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// `count` plausible relative footsteps, starting on the right foot.
///
/// Lateral offsets alternate sign so the feet never cross; forward steps
/// stay within ±0.2 m and turns within ±0.2 rad.
pub fn random_steps(count: usize, seed: u64) -> Vec<RelativeFootPosition> {
    let mut rng = seeded_rng(seed);
    (0..count)
        .map(|i| {
            let side = if i % 2 == 0 { -1.0 } else { 1.0 };
            let dx = if i == 0 { 0.0 } else { rng.gen_range(-0.1..0.2) };
            let dy = if i == 0 {
                -0.095
            } else {
                side * rng.gen_range(0.17..0.23)
            };
            let dtheta = if i == 0 { 0.0 } else { rng.gen_range(-0.2..0.2) };
            RelativeFootPosition::new(dx, dy, dtheta)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
