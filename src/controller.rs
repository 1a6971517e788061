//! Playback session lifecycle and completion-callback wiring.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use log::{info, trace, warn};

use crate::{
    device::{
        CompletionHandler, CompletionResult, Device, DeviceConfiguration, DeviceOutput,
        DisplayModeId, OutputFrame, PixelFormat,
    },
    frames::FramePool,
    scheduler::{FrameScheduler, RingState, TimingParams},
    watchdog::{WatchdogConfig, WatchdogPinger},
    Error, Result,
};

/// Lifecycle state of a playback session.
///
/// The controller is the single writer. `Stopped` is terminal for a
/// session; a new session starts over from `Idle` with a fresh controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No device resources are held.
    Idle,
    /// Output is enabled; the frame ring is not built yet.
    Configuring,
    /// The frame ring is built and filled; playback has not started.
    Prerolled,
    /// The clock is running and the watchdog is alive.
    Playing,
    /// The session has been torn down.
    Stopped,
}

/// Parameters for one playback session.
///
/// Use the builder to construct instances:
///
/// ```
/// use playout_bypass::{DisplayModeId, PixelFormat, SessionOptions};
///
/// let options = SessionOptions::builder(DisplayModeId::Ntsc)
///     .ring_frames(8)
///     .pixel_format(PixelFormat::Yuv8)
///     .build()?;
/// # Ok::<(), playout_bypass::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Display mode the session requires (exact match).
    pub mode: DisplayModeId,
    /// Pixel format of the ring buffers.
    pub pixel_format: PixelFormat,
    /// Number of frames in the ring / hardware lookahead.
    pub ring_frames: usize,
    /// Watchdog timing for the session.
    pub watchdog: WatchdogConfig,
}

impl SessionOptions {
    /// Creates a builder for the given display mode.
    pub fn builder(mode: DisplayModeId) -> SessionOptionsBuilder {
        SessionOptionsBuilder::new(mode)
    }
}

/// Builder for [`SessionOptions`] with ergonomic method chaining.
///
/// Defaults: a ring of 8 frames of 8-bit YCbCr, and the default watchdog
/// timing.
#[derive(Debug, Clone)]
pub struct SessionOptionsBuilder {
    mode: DisplayModeId,
    pixel_format: Option<PixelFormat>,
    ring_frames: Option<usize>,
    watchdog: Option<WatchdogConfig>,
}

impl SessionOptionsBuilder {
    fn new(mode: DisplayModeId) -> Self {
        Self {
            mode,
            pixel_format: None,
            ring_frames: None,
            watchdog: None,
        }
    }

    /// Set the ring buffer pixel format.
    #[must_use]
    pub fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }

    /// Set the number of frames in the ring.
    #[must_use]
    pub fn ring_frames(mut self, count: usize) -> Self {
        self.ring_frames = Some(count);
        self
    }

    /// Set the watchdog timing.
    #[must_use]
    pub fn watchdog(mut self, config: WatchdogConfig) -> Self {
        self.watchdog = Some(config);
        self
    }

    /// Build the session options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the ring is empty.
    pub fn build(self) -> Result<SessionOptions> {
        let ring_frames = self.ring_frames.unwrap_or(8);
        if ring_frames == 0 {
            return Err(Error::InvalidConfiguration(
                "ring must hold at least one frame".into(),
            ));
        }
        Ok(SessionOptions {
            mode: self.mode,
            pixel_format: self.pixel_format.unwrap_or(PixelFormat::Yuv8),
            ring_frames,
            watchdog: self.watchdog.unwrap_or_default(),
        })
    }
}

/// Completion callback registered with the driver.
///
/// Runs on the driver's thread. It is the only writer of the ring state
/// while playback runs: each completed frame tops the lookahead queue back
/// up by one.
struct CompletionPump {
    scheduler: Arc<Mutex<FrameScheduler>>,
    running: Arc<AtomicBool>,
}

impl CompletionHandler for CompletionPump {
    fn frame_completed(&self, _frame: &Arc<dyn OutputFrame>, result: CompletionResult) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }

        trace!("frame completed ({result:?})");
        let mut scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = scheduler.advance_one() {
            // Dropped frame; the next completion will try again naturally.
            warn!("steady-state submission failed, frame dropped: {e}");
        }
    }
}

/// Owns one playback session on one device.
///
/// The controller drives the `Idle -> Configuring -> Prerolled -> Playing
/// -> Stopped` lifecycle, wires the driver's completion callback to the
/// scheduler, and keeps the bypass watchdog alive for the whole `Playing`
/// duration. Only one session may be active per device instance at a time.
///
/// # Examples
///
/// ```
/// use playout_bypass::{mock::MockDevice, DisplayModeId, PlaybackController, SessionOptions};
///
/// # fn main() -> Result<(), playout_bypass::Error> {
/// let device = MockDevice::new();
/// let options = SessionOptions::builder(DisplayModeId::Ntsc).build()?;
///
/// let mut controller = PlaybackController::new(&device, options)?;
/// controller.setup()?;
/// controller.start()?;
/// // ... completions arrive on the driver thread and keep the ring topped up
/// controller.stop();
/// # Ok(())
/// # }
/// ```
pub struct PlaybackController {
    output: Arc<dyn DeviceOutput>,
    configuration: Arc<dyn DeviceConfiguration>,
    options: SessionOptions,
    state: PlaybackState,
    timing: Option<TimingParams>,
    scheduler: Option<Arc<Mutex<FrameScheduler>>>,
    running: Arc<AtomicBool>,
    watchdog: Option<WatchdogPinger>,
}

impl PlaybackController {
    /// Binds a controller to a device and verifies its capabilities.
    ///
    /// Probes the bypass capability flag and acquires the output and
    /// configuration handles, which the controller holds for its whole
    /// lifetime.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] if the device has no bypass relay.
    /// - [`Error::Device`] if an interface cannot be acquired.
    pub fn new(device: &dyn Device, options: SessionOptions) -> Result<Self> {
        let attributes = device.attributes()?;
        let has_bypass = attributes
            .flag(crate::device::AttributeId::HasBypass)
            .unwrap_or(false);
        if !has_bypass {
            return Err(Error::CapabilityMissing(format!(
                "{} has no bypass relay",
                device.model_name()
            )));
        }

        let configuration = device.configuration()?;
        let output = device.output()?;
        trace!("acquired output and configuration interfaces for {}", device.model_name());

        Ok(Self {
            output,
            configuration,
            options,
            state: PlaybackState::Idle,
            timing: None,
            scheduler: None,
            running: Arc::new(AtomicBool::new(false)),
            watchdog: None,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Timing parameters of the configured mode, once configured.
    pub fn timing(&self) -> Option<TimingParams> {
        self.timing
    }

    /// Playback cursor and submission count, once the ring exists.
    pub fn ring_state(&self) -> Option<RingState> {
        self.scheduler.as_ref().map(|s| {
            s.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .ring_state()
        })
    }

    /// Selects the session's display mode and enables video output.
    ///
    /// Scans the device's enumerable mode list for an exact identifier
    /// match and derives the session timing from it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTransition`] unless the controller is `Idle`.
    /// - [`Error::ModeNotFound`] if the device does not list the mode.
    /// - [`Error::Device`] if output cannot be enabled.
    ///
    /// On failure the controller is back in `Idle` with no resources held.
    pub fn configure(&mut self) -> Result<()> {
        if self.state != PlaybackState::Idle {
            return Err(Error::InvalidTransition {
                operation: "configure",
                state: self.state,
            });
        }
        self.state = PlaybackState::Configuring;

        match self.try_configure() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = PlaybackState::Idle;
                self.timing = None;
                Err(e)
            }
        }
    }

    fn try_configure(&mut self) -> Result<()> {
        let mode = self
            .output
            .display_modes()?
            .into_iter()
            .find(|m| m.id == self.options.mode)
            .ok_or(Error::ModeNotFound(self.options.mode))?;

        info!("selected display mode {mode}");
        self.timing = Some(TimingParams::from_mode(&mode));
        self.output.enable_output(mode.id)
    }

    /// Builds and fills the frame ring.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTransition`] unless the controller is `Configuring`.
    /// - [`Error::Allocation`] / [`Error::InvalidFormat`] from the pool.
    ///
    /// On failure, output is disabled, any buffers already made are
    /// released, and the controller is back in `Idle`.
    pub fn create_frames(&mut self) -> Result<()> {
        if self.state != PlaybackState::Configuring {
            return Err(Error::InvalidTransition {
                operation: "create_frames",
                state: self.state,
            });
        }

        match self.try_create_frames() {
            Ok(()) => {
                self.state = PlaybackState::Prerolled;
                Ok(())
            }
            Err(e) => {
                self.scheduler = None;
                if let Err(disable) = self.output.disable_output() {
                    warn!("could not disable output while unwinding: {disable}");
                }
                self.timing = None;
                self.state = PlaybackState::Idle;
                Err(e)
            }
        }
    }

    fn try_create_frames(&mut self) -> Result<()> {
        // configure() ran, so timing is present.
        let timing = self.timing.ok_or(Error::InvalidTransition {
            operation: "create_frames",
            state: self.state,
        })?;

        let pool = FramePool::create(
            &self.output,
            self.options.ring_frames,
            timing.width,
            timing.height,
            self.options.pixel_format,
        )?;
        pool.fill_colour_bars()?;

        self.scheduler = Some(Arc::new(Mutex::new(FrameScheduler::new(
            pool,
            Arc::clone(&self.output),
            timing,
        ))));
        Ok(())
    }

    /// Convenience: [`configure`](Self::configure) then
    /// [`create_frames`](Self::create_frames).
    ///
    /// # Errors
    ///
    /// As for the two steps; each unwinds itself on failure.
    pub fn setup(&mut self) -> Result<()> {
        self.configure()?;
        self.create_frames()
    }

    /// Pre-rolls the ring, starts the hardware clock, and arms the watchdog.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTransition`] unless the controller is `Prerolled`.
    /// - [`Error::Submission`] if preroll fails.
    /// - [`Error::Device`] if the clock cannot start.
    /// - [`Error::Io`] if the watchdog thread cannot be spawned; playback
    ///   must not run unattended by the watchdog.
    ///
    /// On any failure the session unwinds all the way to `Idle`: clock
    /// stopped, output disabled, buffers released.
    pub fn start(&mut self) -> Result<()> {
        if self.state != PlaybackState::Prerolled {
            return Err(Error::InvalidTransition {
                operation: "start",
                state: self.state,
            });
        }

        match self.try_start() {
            Ok(()) => {
                self.state = PlaybackState::Playing;
                info!("playback started");
                Ok(())
            }
            Err(e) => {
                self.teardown_device();
                self.timing = None;
                self.state = PlaybackState::Idle;
                Err(e)
            }
        }
    }

    fn try_start(&mut self) -> Result<()> {
        let scheduler = self.scheduler.as_ref().ok_or(Error::InvalidTransition {
            operation: "start",
            state: self.state,
        })?;
        let timing = self.timing.ok_or(Error::InvalidTransition {
            operation: "start",
            state: self.state,
        })?;

        // Completions may arrive as soon as the clock starts; the running
        // flag must be visible to the callback and the watchdog first.
        self.running.store(true, Ordering::Release);
        self.output.set_completion_handler(Arc::new(CompletionPump {
            scheduler: Arc::clone(scheduler),
            running: Arc::clone(&self.running),
        }));

        scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .preroll()?;

        self.output.start_clock(0, timing.time_scale, 1.0)?;

        self.watchdog = Some(WatchdogPinger::spawn(
            Arc::clone(&self.configuration),
            self.options.watchdog,
            Arc::clone(&self.running),
        )?);
        Ok(())
    }

    /// Stops playback and tears the session down.
    ///
    /// Clears the running flag (the single source of truth the watchdog
    /// and completion callback poll), stops the hardware clock, disables
    /// output, releases the ring, and blocks until the watchdog thread has
    /// exited after performing its own cleanup write. Device errors during
    /// teardown are logged, not returned; teardown always completes.
    ///
    /// Stopping an `Idle` controller is a no-op, and repeated stops are
    /// no-ops. `Stopped` is terminal: a new session needs a new controller.
    pub fn stop(&mut self) {
        match self.state {
            PlaybackState::Idle | PlaybackState::Stopped => return,
            PlaybackState::Configuring
            | PlaybackState::Prerolled
            | PlaybackState::Playing => {}
        }

        self.teardown_device();
        self.state = PlaybackState::Stopped;
        info!("playback stopped");
    }

    /// Best-effort device teardown shared by `stop()` and the unwind paths.
    /// Safe in every partially-started state.
    fn teardown_device(&mut self) {
        self.running.store(false, Ordering::Release);

        if let Err(e) = self.output.stop_clock() {
            warn!("could not stop the playback clock: {e}");
        }
        if let Err(e) = self.output.disable_output() {
            warn!("could not disable video output: {e}");
        }
        self.output.clear_completion_handler();

        if let Some(scheduler) = self.scheduler.take() {
            scheduler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pool_mut()
                .release();
        }

        // The watchdog notices the cleared flag on its next wake and writes
        // the disable sentinel before exiting.
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.join();
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        // A forgotten stop() must not leave the bypass register armed or
        // the watchdog thread detached.
        if matches!(
            self.state,
            PlaybackState::Configuring | PlaybackState::Prerolled | PlaybackState::Playing
        ) {
            self.stop();
        }
    }
}
