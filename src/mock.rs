//! An in-memory device for tests and development without hardware.
//!
//! [`MockDevice`] implements the whole driver contract of [`crate::device`]
//! against process memory: frames are plain byte vectors, the lookahead
//! queue is a `VecDeque`, and register writes are recorded with timestamps
//! so watchdog cadence can be asserted. Completions are driven explicitly
//! with [`MockDevice::complete_frame`], typically from a test-owned thread
//! standing in for the driver's callback thread.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    time::Instant,
};

use crate::{
    device::{
        AttributeId, CompletionHandler, CompletionResult, ConfigId, Device, DeviceAttributes,
        DeviceConfiguration, DeviceOutput, DisplayMode, DisplayModeId, FrameFlags, OutputFrame,
        PixelFormat,
    },
    Error, Result,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One recorded call to `schedule_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// Scheduled display time in `scale` ticks.
    pub display_time: i64,
    /// Frame duration in `scale` ticks.
    pub duration: i64,
    /// Ticks per second.
    pub scale: i64,
}

/// One recorded call to `set_int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    /// Register written.
    pub id: ConfigId,
    /// Value written.
    pub value: i64,
    /// When the write happened.
    pub at: Instant,
}

struct MockFrame {
    width: u32,
    height: u32,
    row_bytes: u32,
    pixel_format: PixelFormat,
    data: Mutex<Vec<u8>>,
}

impl OutputFrame for MockFrame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn row_bytes(&self) -> u32 {
        self.row_bytes
    }

    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn with_bytes(&self, f: &mut dyn FnMut(&mut [u8])) -> Result<()> {
        f(lock(&self.data).as_mut_slice());
        Ok(())
    }
}

/// A call counter with an optional failure injection point.
#[derive(Default)]
struct FaultPoint {
    calls: AtomicUsize,
    fail_at: Mutex<Option<usize>>,
}

impl FaultPoint {
    /// Counts a call; returns `true` if this call should fail.
    fn check(&self) -> bool {
        let n = self.calls.fetch_add(1, Ordering::AcqRel);
        lock(&self.fail_at).is_some_and(|at| at == n)
    }
}

struct MockCore {
    has_bypass: bool,
    modes: Vec<DisplayMode>,
    output_enabled: AtomicBool,
    clock_running: AtomicBool,
    handler: Mutex<Option<Arc<dyn CompletionHandler>>>,
    queued: Mutex<VecDeque<Arc<dyn OutputFrame>>>,
    submissions: Mutex<Vec<Submission>>,
    register_writes: Mutex<Vec<RegisterWrite>>,
    created: Mutex<Vec<Weak<MockFrame>>>,
    allocation_fault: FaultPoint,
    submission_fault: FaultPoint,
    register_fault: FaultPoint,
}

impl DeviceAttributes for MockCore {
    fn flag(&self, id: AttributeId) -> Result<bool> {
        match id {
            AttributeId::HasBypass => Ok(self.has_bypass),
        }
    }
}

impl DeviceConfiguration for MockCore {
    fn set_int(&self, id: ConfigId, value: i64) -> Result<()> {
        if self.register_fault.check() {
            return Err(Error::RegisterWrite(format!(
                "simulated write failure on register {id:?}"
            )));
        }
        lock(&self.register_writes).push(RegisterWrite {
            id,
            value,
            at: Instant::now(),
        });
        Ok(())
    }
}

impl DeviceOutput for MockCore {
    fn display_modes(&self) -> Result<Vec<DisplayMode>> {
        Ok(self.modes.clone())
    }

    fn enable_output(&self, mode: DisplayModeId) -> Result<()> {
        if !self.modes.iter().any(|m| m.id == mode) {
            return Err(Error::Device(format!(
                "cannot enable output in unsupported mode {mode}"
            )));
        }
        self.output_enabled.store(true, Ordering::Release);
        Ok(())
    }

    fn disable_output(&self) -> Result<()> {
        self.output_enabled.store(false, Ordering::Release);
        Ok(())
    }

    fn create_frame(
        &self,
        width: u32,
        height: u32,
        row_bytes: u32,
        pixel_format: PixelFormat,
        _flags: FrameFlags,
    ) -> Result<Arc<dyn OutputFrame>> {
        if self.allocation_fault.check() {
            return Err(Error::Allocation("simulated allocation failure".into()));
        }
        let frame = Arc::new(MockFrame {
            width,
            height,
            row_bytes,
            pixel_format,
            data: Mutex::new(vec![0u8; row_bytes as usize * height as usize]),
        });
        lock(&self.created).push(Arc::downgrade(&frame));
        Ok(frame)
    }

    fn schedule_frame(
        &self,
        frame: Arc<dyn OutputFrame>,
        display_time: i64,
        duration: i64,
        scale: i64,
    ) -> Result<()> {
        if self.submission_fault.check() {
            return Err(Error::Submission("simulated submission failure".into()));
        }
        lock(&self.submissions).push(Submission {
            display_time,
            duration,
            scale,
        });
        lock(&self.queued).push_back(frame);
        Ok(())
    }

    fn start_clock(&self, _start_time: i64, _scale: i64, _speed: f64) -> Result<()> {
        self.clock_running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop_clock(&self) -> Result<()> {
        self.clock_running.store(false, Ordering::Release);
        // Stopping scheduled playback flushes the lookahead queue.
        lock(&self.queued).clear();
        Ok(())
    }

    fn set_completion_handler(&self, handler: Arc<dyn CompletionHandler>) {
        *lock(&self.handler) = Some(handler);
    }

    fn clear_completion_handler(&self) {
        *lock(&self.handler) = None;
    }
}

/// In-memory implementation of the full device contract.
///
/// Cloning is cheap and shares the same underlying device state, so a test
/// can keep a handle for introspection while the controller owns another.
///
/// # Examples
///
/// ```
/// use playout_bypass::{mock::MockDevice, DisplayModeId, PlaybackController, SessionOptions};
///
/// # fn main() -> Result<(), playout_bypass::Error> {
/// let device = MockDevice::new();
/// let options = SessionOptions::builder(DisplayModeId::Ntsc).build()?;
/// let mut controller = PlaybackController::new(&device, options)?;
///
/// controller.setup()?;
/// controller.start()?;
/// assert_eq!(device.submissions().len(), 8); // full ring pre-rolled
///
/// device.complete_frame(playout_bypass::CompletionResult::Completed);
/// assert_eq!(device.submissions().len(), 9); // topped back up
///
/// controller.stop();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MockDevice {
    core: Arc<MockCore>,
}

impl MockDevice {
    /// A device with a bypass relay and the standard mode list.
    pub fn new() -> Self {
        Self::with_bypass(true)
    }

    /// A device without the bypass capability, for precondition tests.
    pub fn without_bypass() -> Self {
        Self::with_bypass(false)
    }

    fn with_bypass(has_bypass: bool) -> Self {
        Self {
            core: Arc::new(MockCore {
                has_bypass,
                modes: standard_modes(),
                output_enabled: AtomicBool::new(false),
                clock_running: AtomicBool::new(false),
                handler: Mutex::new(None),
                queued: Mutex::new(VecDeque::new()),
                submissions: Mutex::new(Vec::new()),
                register_writes: Mutex::new(Vec::new()),
                created: Mutex::new(Vec::new()),
                allocation_fault: FaultPoint::default(),
                submission_fault: FaultPoint::default(),
                register_fault: FaultPoint::default(),
            }),
        }
    }

    /// Makes the `n`-th (0-based) `create_frame` call fail.
    pub fn fail_frame_allocation_at(&self, n: usize) {
        *lock(&self.core.allocation_fault.fail_at) = Some(n);
    }

    /// Makes the `n`-th (0-based) `schedule_frame` call fail.
    pub fn fail_submission_at(&self, n: usize) {
        *lock(&self.core.submission_fault.fail_at) = Some(n);
    }

    /// Makes the `n`-th (0-based) `set_int` call fail.
    pub fn fail_register_write_at(&self, n: usize) {
        *lock(&self.core.register_fault.fail_at) = Some(n);
    }

    /// Every submission recorded so far, oldest first.
    pub fn submissions(&self) -> Vec<Submission> {
        lock(&self.core.submissions).clone()
    }

    /// Every successful register write recorded so far, oldest first.
    pub fn register_writes(&self) -> Vec<RegisterWrite> {
        lock(&self.core.register_writes).clone()
    }

    /// Whether video output is currently enabled.
    pub fn output_enabled(&self) -> bool {
        self.core.output_enabled.load(Ordering::Acquire)
    }

    /// Whether the playback clock is currently running.
    pub fn clock_running(&self) -> bool {
        self.core.clock_running.load(Ordering::Acquire)
    }

    /// Number of frames currently sitting in the lookahead queue.
    pub fn queued_frames(&self) -> usize {
        lock(&self.core.queued).len()
    }

    /// Number of created frame buffers still alive anywhere.
    pub fn live_frames(&self) -> usize {
        lock(&self.core.created)
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Completes the oldest queued frame, invoking the registered callback
    /// the way a driver thread would.
    ///
    /// Returns `false` if the queue is empty or no callback is registered.
    pub fn complete_frame(&self, result: CompletionResult) -> bool {
        // Pop and fetch the handler before invoking it: the callback
        // re-enters schedule_frame, which takes the same locks.
        let Some(frame) = lock(&self.core.queued).pop_front() else {
            return false;
        };
        let Some(handler) = lock(&self.core.handler).clone() else {
            return false;
        };
        handler.frame_completed(&frame, result);
        true
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for MockDevice {
    fn model_name(&self) -> String {
        "Mock Playback Device".into()
    }

    fn attributes(&self) -> Result<Arc<dyn DeviceAttributes>> {
        Ok(Arc::clone(&self.core) as Arc<dyn DeviceAttributes>)
    }

    fn configuration(&self) -> Result<Arc<dyn DeviceConfiguration>> {
        Ok(Arc::clone(&self.core) as Arc<dyn DeviceConfiguration>)
    }

    fn output(&self) -> Result<Arc<dyn DeviceOutput>> {
        Ok(Arc::clone(&self.core) as Arc<dyn DeviceOutput>)
    }
}

fn standard_modes() -> Vec<DisplayMode> {
    vec![
        DisplayMode {
            id: DisplayModeId::Ntsc,
            name: "NTSC".into(),
            width: 720,
            height: 486,
            frame_duration: 1001,
            time_scale: 30000,
        },
        DisplayMode {
            id: DisplayModeId::Pal,
            name: "PAL".into(),
            width: 720,
            height: 576,
            frame_duration: 1000,
            time_scale: 25000,
        },
        DisplayMode {
            id: DisplayModeId::Hd1080p30,
            name: "1080p29.97".into(),
            width: 1920,
            height: 1080,
            frame_duration: 1001,
            time_scale: 30000,
        },
        DisplayMode {
            id: DisplayModeId::Hd720p60,
            name: "720p59.94".into(),
            width: 1280,
            height: 720,
            frame_duration: 1001,
            time_scale: 60000,
        },
    ]
}
