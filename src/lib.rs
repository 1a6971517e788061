//! Scheduled video playout with a fail-safe bypass-relay watchdog.
//!
//! This crate drives the playback path of a broadcast capture/playback
//! card: a bounded ring of pre-filled output frames is fed into the
//! hardware's lookahead queue at a fixed cadence, topped up by the
//! driver's asynchronous completion callbacks, while a dedicated thread
//! keeps the card's analog bypass relay on the active signal path by
//! periodically refreshing its watchdog timeout register. If the process
//! stalls or dies, the card's own timer expires and the relay falls back
//! to bypass - the watchdog is what holds it engaged.
//!
//! # Quick Start
//!
//! ```
//! use playout_bypass::{mock::MockDevice, DisplayModeId, PlaybackController, SessionOptions};
//!
//! # fn main() -> Result<(), playout_bypass::Error> {
//! // Any driver binding that implements the `device` traits works here;
//! // the mock device runs the whole pipeline in memory.
//! let device = MockDevice::new();
//!
//! let options = SessionOptions::builder(DisplayModeId::Ntsc).build()?;
//! let mut controller = PlaybackController::new(&device, options)?;
//!
//! controller.setup()?; // select mode, enable output, build the ring
//! controller.start()?; // preroll, start the clock, arm the watchdog
//!
//! // ... completions arrive on the driver's thread and keep the ring full
//!
//! controller.stop(); // tear down; the watchdog clears the relay timeout
//! # Ok(())
//! # }
//! ```
//!
//! # Core Concepts
//!
//! ## The driver contract
//!
//! Everything hardware-specific sits behind the traits in [`device`]:
//! mode enumeration, buffer creation, scheduled submission, clock control,
//! and configuration-register access. The crate never touches global
//! state; a [`PlaybackController`] owns scoped handles to one device's
//! output and configuration interfaces for its whole lifetime.
//!
//! ## The frame ring
//!
//! [`frames::FramePool`] allocates N hardware buffers once per session and
//! fills each with a solid colour-bar pattern. [`scheduler::FrameScheduler`]
//! submits them in ring order with strictly increasing timestamps: the
//! full ring at preroll, then one frame per completion callback, so N
//! frames are always in flight.
//!
//! ## The watchdog
//!
//! [`watchdog::WatchdogPinger`] runs on its own thread for the whole
//! `Playing` duration, rewriting the bypass-timeout register well before
//! the device's timer can expire, and writes the disable sentinel exactly
//! once on shutdown.
//!
//! # Thread Safety
//!
//! Three threads touch a playing session: the controlling thread
//! (startup/shutdown), the driver's completion thread (ring top-up), and
//! the watchdog thread (register refresh). The completion path is the only
//! writer of the ring state while the clock runs; the watchdog shares
//! nothing with the frame path except the atomic running flag. Shutdown is
//! cooperative: `stop()` clears the flag and joins the watchdog, bounded
//! by one sleep interval.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

// Internal modules
mod error;

// Public modules
pub mod controller;
pub mod device;
pub mod frames;
pub mod mock;
pub mod scheduler;
pub mod watchdog;

// Re-exports
pub use {
    controller::{PlaybackController, PlaybackState, SessionOptions, SessionOptionsBuilder},
    device::{
        AttributeId, CompletionHandler, CompletionResult, ConfigId, Device, DeviceAttributes,
        DeviceConfiguration, DeviceOutput, DisplayMode, DisplayModeId, FrameFlags, OutputFrame,
        PixelFormat,
    },
    error::Error,
    frames::{FramePool, COLOUR_BARS},
    scheduler::{FrameScheduler, RingState, TimingParams},
    watchdog::{WatchdogConfig, WatchdogPinger, BYPASS_DISABLE},
};

/// Alias for Result with our Error type
pub type Result<T> = std::result::Result<T, crate::error::Error>;

// Tests
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
