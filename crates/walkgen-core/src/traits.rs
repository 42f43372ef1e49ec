use crate::error::GenerationError;
use crate::types::{Sample, TickReport, TrajectoryBuffers};

// ---------------------------------------------------------------------------
// PatternGenerator
// ---------------------------------------------------------------------------

/// A walking pattern generator driven one control tick at a time.
///
/// Callers must tick with strictly increasing times. Each tick appends the
/// samples decided up to `time` to [`TrajectoryBuffers`]; the consumer drains
/// them from the front at its own pace.
pub trait PatternGenerator {
    /// Advance the generator to `time`.
    fn tick(&mut self, time: f64) -> Result<TickReport, GenerationError>;

    /// Output streams produced so far and not yet drained.
    fn buffers(&self) -> &TrajectoryBuffers;

    /// Mutable access, used by consumers to drain samples.
    fn buffers_mut(&mut self) -> &mut TrajectoryBuffers;

    /// Time of the last tick, `None` before the first one.
    fn last_tick(&self) -> Option<f64>;

    /// Human-readable name for this generator.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Remove and return every buffered sample.
    fn drain(&mut self) -> Vec<Sample> {
        let buffers = self.buffers_mut();
        let mut out = Vec::with_capacity(buffers.len());
        while let Some(sample) = buffers.pop_front() {
            out.push(sample);
        }
        out
    }

    /// Reject ticks that do not move time forward.
    fn check_tick_order(&self, time: f64) -> Result<(), GenerationError> {
        match self.last_tick() {
            Some(last) if time <= last => Err(GenerationError::OutOfOrderTick { time, last }),
            _ => Ok(()),
        }
    }
}
