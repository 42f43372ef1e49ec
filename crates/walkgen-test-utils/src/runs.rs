//! Tick helpers for tests.
//!
//! Thin wrappers around [`PatternGenerator::tick`] that reduce boilerplate
//! in integration tests.

use walkgen_core::traits::PatternGenerator;
use walkgen_core::types::TickReport;

/// Tick `generator` at `first·dt, (first+1)·dt, ..` up to but excluding
/// `last·dt`. Panics on the first error.
pub fn tick_range<G: PatternGenerator>(
    generator: &mut G,
    first: usize,
    last: usize,
    dt: f64,
) -> Vec<TickReport> {
    (first..last)
        .map(|i| {
            let time = i as f64 * dt;
            match generator.tick(time) {
                Ok(report) => report,
                Err(err) => panic!("tick at {time} failed: {err}"),
            }
        })
        .collect()
}

/// Tick `n` times from zero.
pub fn tick_n<G: PatternGenerator>(generator: &mut G, n: usize, dt: f64) -> Vec<TickReport> {
    tick_range(generator, 0, n, dt)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use walkgen_core::error::GenerationError;
    use walkgen_core::types::{ComState, FootAbsolutePosition, Sample, TrajectoryBuffers, ZmpPosition};

    #[derive(Default)]
    struct Recorder {
        buffers: TrajectoryBuffers,
        last: Option<f64>,
    }

    impl PatternGenerator for Recorder {
        fn tick(&mut self, time: f64) -> Result<TickReport, GenerationError> {
            self.check_tick_order(time)?;
            self.buffers.push(Sample {
                zmp: ZmpPosition { time, ..ZmpPosition::default() },
                com: ComState::default(),
                left_foot: FootAbsolutePosition::default(),
                right_foot: FootAbsolutePosition::default(),
            });
            self.last = Some(time);
            Ok(TickReport::new(time, 1))
        }

        fn buffers(&self) -> &TrajectoryBuffers {
            &self.buffers
        }

        fn buffers_mut(&mut self) -> &mut TrajectoryBuffers {
            &mut self.buffers
        }

        fn last_tick(&self) -> Option<f64> {
            self.last
        }
    }

    #[test]
    fn tick_n_records_every_tick() {
        let mut recorder = Recorder::default();
        let reports = tick_n(&mut recorder, 10, 0.005);
        assert_eq!(reports.len(), 10);
        assert_eq!(recorder.buffers().len(), 10);
        assert!((recorder.last_tick().unwrap() - 0.045).abs() < 1e-12);
    }

    #[test]
    fn ranges_chain() {
        let mut recorder = Recorder::default();
        tick_n(&mut recorder, 5, 0.01);
        tick_range(&mut recorder, 5, 8, 0.01);
        assert_eq!(recorder.buffers().len(), 8);
    }

    #[test]
    #[should_panic(expected = "tick at")]
    fn repeated_range_panics() {
        let mut recorder = Recorder::default();
        tick_n(&mut recorder, 5, 0.01);
        tick_n(&mut recorder, 5, 0.01);
    }
}
