//! The consumed driver contract for capture/playback devices.
//!
//! This crate does not talk to hardware directly. Everything it needs from
//! the device driver (mode enumeration, buffer creation, scheduled
//! submission, clock control, and configuration-register access) is
//! expressed as the traits in this module, and the rest of the crate is
//! written purely against them. A vendor SDK binding implements these
//! traits; [`crate::mock::MockDevice`] provides an in-memory implementation
//! for tests and development without hardware.
//!
//! Identifier enums ([`DisplayModeId`], [`PixelFormat`], [`AttributeId`],
//! [`ConfigId`], [`CompletionResult`]) carry the raw 32-bit codes used on
//! the driver ABI, so a binding can convert with `into()` / `try_from()`.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use crate::Result;

/// Display mode identifiers (FourCC codes).
///
/// Mode selection in this crate is an exact match on one of these
/// identifiers; there is no negotiation. The enum is `#[non_exhaustive]`
/// so driver bindings can grow the list without breaking downstream
/// matches.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u32)]
pub enum DisplayModeId {
    /// NTSC 525i59.94, 720x486.
    Ntsc = 0x6e74_7363, // 'ntsc'
    /// PAL 625i50, 720x576.
    Pal = 0x7061_6c20, // 'pal '
    /// 1080p29.97/30.
    Hd1080p30 = 0x4870_3330, // 'Hp30'
    /// 1080i59.94.
    Hd1080i5994 = 0x4869_3539, // 'Hi59'
    /// 720p59.94/60.
    Hd720p60 = 0x6870_3630, // 'hp60'
}

impl Display for DisplayModeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Pixel format identifiers (FourCC codes).
///
/// Only formats with a whole number of bytes per pixel are listed; the
/// frame pool's fill logic relies on `row_bytes = width * bytes_per_pixel`.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[repr(u32)]
pub enum PixelFormat {
    /// 8-bit YCbCr 4:2:2 (16 bits per pixel) - the broadcast default.
    Yuv8 = 0x3276_7579, // '2vuy'
    /// 8-bit BGRA (32 bits per pixel).
    Bgra8 = 0x4247_5241, // 'BGRA'
    /// 8-bit ARGB (32 bits per pixel).
    Argb8 = 32,
}

impl PixelFormat {
    /// Bytes occupied by one pixel in this format.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Yuv8 => 2,
            PixelFormat::Bgra8 | PixelFormat::Argb8 => 4,
        }
    }

    /// Row stride in bytes for a row of `width` pixels.
    pub fn row_bytes(self, width: u32) -> u32 {
        width * self.bytes_per_pixel()
    }
}

/// Frame allocation flags passed through to the driver.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
#[repr(u32)]
pub enum FrameFlags {
    /// No special treatment.
    #[default]
    Default = 0,
    /// The buffer is stored bottom-to-top.
    FlipVertical = 1,
}

/// Device attribute identifiers queried through [`DeviceAttributes`].
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[repr(u32)]
pub enum AttributeId {
    /// Whether the device has an analog fail-safe bypass relay.
    HasBypass = 0x6862_7970, // 'hbyp'
}

/// Configuration register identifiers written through [`DeviceConfiguration`].
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u32)]
pub enum ConfigId {
    /// The bypass-relay timeout register, in milliseconds.
    ///
    /// While a positive value is periodically rewritten the relay stays on
    /// the active signal path; if the device's own timer expires first it
    /// falls back to bypass. Writing [`crate::watchdog::BYPASS_DISABLE`]
    /// clears watchdog-driven timeout enforcement.
    BypassTimeout = 0x6279_7073, // 'byps'
}

/// Result codes delivered with each scheduled-frame completion.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[repr(u32)]
pub enum CompletionResult {
    /// The frame was output on time.
    Completed = 0,
    /// The frame was output after its scheduled time.
    DisplayedLate = 1,
    /// The frame was never output.
    Dropped = 2,
    /// The frame was flushed from the queue before output.
    Flushed = 3,
}

/// A display mode descriptor as enumerated by the driver.
///
/// The frame rate is expressed as the rational pair
/// `time_scale / frame_duration` (e.g. NTSC is `30000 / 1001`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMode {
    /// Exact-match identifier for this mode.
    pub id: DisplayModeId,
    /// Human-readable mode name, for logs only.
    pub name: String,
    /// Active picture width in pixels.
    pub width: u32,
    /// Active picture height in pixels.
    pub height: u32,
    /// Duration of one frame in `time_scale` ticks.
    pub frame_duration: i64,
    /// Ticks per second of the mode's clock.
    pub time_scale: i64,
}

impl DisplayMode {
    /// Frames per second as a float, for display purposes.
    pub fn frames_per_second(&self) -> f64 {
        self.time_scale as f64 / self.frame_duration as f64
    }
}

impl Display for DisplayMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{} @ {:.2} fps)",
            self.name,
            self.width,
            self.height,
            self.frames_per_second()
        )
    }
}

/// Top-level handle to one capture/playback device.
///
/// Mirrors the interface-per-concern layout of vendor SDKs: attributes are
/// read-only capability flags, configuration is register access, and output
/// is the playback path. The controller acquires the output and
/// configuration handles once and holds them for its whole lifetime.
pub trait Device: Send + Sync {
    /// Model name, for logs only.
    fn model_name(&self) -> String;

    /// Acquires the read-only attribute interface.
    fn attributes(&self) -> Result<Arc<dyn DeviceAttributes>>;

    /// Acquires the configuration-register interface.
    fn configuration(&self) -> Result<Arc<dyn DeviceConfiguration>>;

    /// Acquires the playback output interface.
    fn output(&self) -> Result<Arc<dyn DeviceOutput>>;
}

/// Read-only device capability flags.
pub trait DeviceAttributes: Send + Sync {
    /// Reads a boolean attribute flag.
    fn flag(&self, id: AttributeId) -> Result<bool>;
}

/// Device configuration register access.
///
/// This core uses it solely for [`ConfigId::BypassTimeout`]. Register
/// state lives in the device, never in this process; the only way to
/// observe or change it is through this trait.
pub trait DeviceConfiguration: Send + Sync {
    /// Writes an integer configuration register.
    fn set_int(&self, id: ConfigId, value: i64) -> Result<()>;
}

/// One hardware-owned output frame buffer.
///
/// The buffer memory belongs to the driver. Holding the `Arc` keeps the
/// driver's allocation alive; the driver itself retains a clone while the
/// frame sits in the lookahead queue.
pub trait OutputFrame: Send + Sync {
    /// Width in pixels.
    fn width(&self) -> u32;
    /// Height in pixels.
    fn height(&self) -> u32;
    /// Row stride in bytes.
    fn row_bytes(&self) -> u32;
    /// Pixel format of the buffer.
    fn pixel_format(&self) -> PixelFormat;

    /// Total buffer length in bytes.
    fn byte_len(&self) -> usize {
        self.row_bytes() as usize * self.height() as usize
    }

    /// Maps the pixel buffer and passes it to `f` for mutation.
    ///
    /// # Errors
    ///
    /// Fails if the driver cannot map the buffer into process memory.
    fn with_bytes(&self, f: &mut dyn FnMut(&mut [u8])) -> Result<()>;
}

/// Callback invoked by the driver when a scheduled frame has been output.
///
/// The driver calls this on its own thread, once per scheduled frame,
/// after the hardware clock has consumed it. Implementations must not
/// block for long; the steady-state playback loop lives downstream of
/// this call.
pub trait CompletionHandler: Send + Sync {
    /// A scheduled frame finished outputting.
    fn frame_completed(&self, frame: &Arc<dyn OutputFrame>, result: CompletionResult);
}

/// The playback output path of a device.
pub trait DeviceOutput: Send + Sync {
    /// Enumerates the display modes this output supports.
    fn display_modes(&self) -> Result<Vec<DisplayMode>>;

    /// Enables video output in the given mode.
    fn enable_output(&self, mode: DisplayModeId) -> Result<()>;

    /// Disables video output. Idempotent.
    fn disable_output(&self) -> Result<()>;

    /// Creates one hardware frame buffer.
    fn create_frame(
        &self,
        width: u32,
        height: u32,
        row_bytes: u32,
        pixel_format: PixelFormat,
        flags: FrameFlags,
    ) -> Result<Arc<dyn OutputFrame>>;

    /// Pushes a frame into the hardware lookahead queue.
    ///
    /// `display_time` and `duration` are in `scale` ticks. The driver
    /// retains the frame until it completes or is flushed.
    fn schedule_frame(
        &self,
        frame: Arc<dyn OutputFrame>,
        display_time: i64,
        duration: i64,
        scale: i64,
    ) -> Result<()>;

    /// Starts the playback clock.
    ///
    /// `speed` is a playback-rate multiplier; `1.0` is real time.
    fn start_clock(&self, start_time: i64, scale: i64, speed: f64) -> Result<()>;

    /// Stops the playback clock and flushes any queued frames. Idempotent.
    fn stop_clock(&self) -> Result<()>;

    /// Registers the completion callback for scheduled frames.
    ///
    /// The handler is held by the driver until replaced or cleared.
    fn set_completion_handler(&self, handler: Arc<dyn CompletionHandler>);

    /// Clears the completion callback. Idempotent.
    fn clear_completion_handler(&self);
}
