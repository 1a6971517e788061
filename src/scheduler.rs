//! Frame scheduling against the hardware lookahead queue.

use std::sync::Arc;

use log::{trace, warn};

use crate::{
    device::{DeviceOutput, DisplayMode},
    frames::FramePool,
    Result,
};

/// Timing parameters derived once from the selected display mode.
///
/// Immutable after setup; every timestamp the scheduler emits is computed
/// from these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingParams {
    /// Duration of one frame in `time_scale` ticks.
    pub frame_duration: i64,
    /// Ticks per second of the playback clock.
    pub time_scale: i64,
    /// Active picture width in pixels.
    pub width: u32,
    /// Active picture height in pixels.
    pub height: u32,
}

impl TimingParams {
    /// Derives timing parameters from an enumerated display mode.
    pub fn from_mode(mode: &DisplayMode) -> Self {
        Self {
            frame_duration: mode.frame_duration,
            time_scale: mode.time_scale,
            width: mode.width,
            height: mode.height,
        }
    }
}

/// Playback cursor over the frame ring.
///
/// `next_index` advances modulo the ring size exactly once per successful
/// submission; `total_scheduled` never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingState {
    next_index: usize,
    total_scheduled: u64,
}

impl RingState {
    /// Ring slot the next submission will use.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Count of frames successfully submitted since session start.
    pub fn total_scheduled(&self) -> u64 {
        self.total_scheduled
    }

    fn advance(&mut self, ring_len: usize) {
        self.next_index = if self.next_index == ring_len - 1 {
            0
        } else {
            self.next_index + 1
        };
        self.total_scheduled += 1;
    }
}

/// Feeds ring frames into the hardware lookahead queue at a fixed cadence.
///
/// Submission order is always ring order (`0, 1, ..., N-1, 0, ...`) and
/// timestamps are strictly increasing multiples of the frame duration, so
/// playback is gap-free as long as submissions keep pace with completions.
///
/// The scheduler never retries a failed submission; the caller decides
/// whether a failure aborts the session (preroll) or drops one frame
/// (steady state).
pub struct FrameScheduler {
    pool: FramePool,
    output: Arc<dyn DeviceOutput>,
    timing: TimingParams,
    ring: RingState,
}

impl FrameScheduler {
    /// Creates a scheduler over a filled pool.
    pub fn new(pool: FramePool, output: Arc<dyn DeviceOutput>, timing: TimingParams) -> Self {
        Self {
            pool,
            output,
            timing,
            ring: RingState::default(),
        }
    }

    /// Submits the full ring back-to-back, starting the timestamp sequence
    /// at zero.
    ///
    /// All-or-nothing at the reported-result level: the first submission
    /// failure stops the loop and is returned, though frames submitted
    /// before it remain queued in hardware.
    ///
    /// # Errors
    ///
    /// Returns the first submission failure.
    pub fn preroll(&mut self) -> Result<()> {
        for _ in 0..self.pool.len() {
            self.schedule_next()?;
        }
        Ok(())
    }

    /// Submits exactly one frame, the one at the ring cursor.
    ///
    /// Called from the completion path to keep N frames always in flight.
    ///
    /// # Errors
    ///
    /// Returns the submission failure; the cursor does not advance.
    pub fn advance_one(&mut self) -> Result<()> {
        self.schedule_next()
    }

    /// Current playback cursor and submission count.
    pub fn ring_state(&self) -> RingState {
        self.ring
    }

    /// Timing parameters this scheduler stamps frames with.
    pub fn timing(&self) -> TimingParams {
        self.timing
    }

    /// The underlying frame pool.
    pub fn pool_mut(&mut self) -> &mut FramePool {
        &mut self.pool
    }

    fn schedule_next(&mut self) -> Result<()> {
        let frame = self.pool.frame(self.ring.next_index)?;
        let display_time = self.ring.total_scheduled as i64 * self.timing.frame_duration;

        if let Err(e) = self.output.schedule_frame(
            Arc::clone(frame),
            display_time,
            self.timing.frame_duration,
            self.timing.time_scale,
        ) {
            warn!(
                "could not schedule next frame (total frames scheduled: {}): {e}",
                self.ring.total_scheduled
            );
            return Err(e);
        }

        trace!(
            "scheduled frame {} at {} ticks ({} total)",
            self.ring.next_index,
            display_time,
            self.ring.total_scheduled + 1
        );
        self.ring.advance(self.pool.len());
        Ok(())
    }
}
