//! Error types for the playout-bypass library.

use std::io;
use thiserror::Error;

use crate::controller::PlaybackState;
use crate::device::DisplayModeId;

/// The main error type for playout operations.
///
/// Every fallible operation in this crate returns this type; no failure is
/// reported by panicking. Component-level failures (allocation, submission,
/// register writes) are surfaced to [`PlaybackController`](crate::PlaybackController),
/// which is the only place that decides whether to unwind a session.
#[derive(Debug, Error)]
pub enum Error {
    /// The device lacks a capability this core requires.
    ///
    /// Reported once, before any session work starts. A device without a
    /// bypass relay cannot be driven by this crate at all.
    #[error("device is missing a required capability: {0}")]
    CapabilityMissing(String),

    /// The requested display mode is not in the device's supported list.
    ///
    /// Mode selection is an exact identifier match; there is no fallback
    /// or negotiation.
    #[error("display mode {0} is not supported by the device")]
    ModeNotFound(DisplayModeId),

    /// A hardware frame buffer could not be created.
    ///
    /// Fatal to session startup. Any buffers created before the failure
    /// have already been released when this is returned.
    #[error("frame allocation failed: {0}")]
    Allocation(String),

    /// A frame buffer cannot hold the requested fill pattern.
    ///
    /// Raised when the buffer's byte length is not a multiple of the
    /// 32-bit pattern word, which would corrupt adjacent memory on the
    /// final word write.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),

    /// A ring index outside the pool's range was used.
    #[error("frame index {index} is out of range for a ring of {len}")]
    InvalidFrameIndex { index: usize, len: usize },

    /// A single frame failed to enter the hardware lookahead queue.
    ///
    /// Never retried automatically. During preroll the controller treats
    /// this as fatal to startup; in the steady state it is a dropped frame.
    #[error("frame submission failed: {0}")]
    Submission(String),

    /// A device configuration register write failed.
    ///
    /// Non-fatal to playback, but it terminates the watchdog loop early;
    /// the device's own fail-safe timer takes over from there.
    #[error("configuration register write failed: {0}")]
    RegisterWrite(String),

    /// A device control call (output enable, clock control, interface
    /// acquisition) failed.
    #[error("device control call failed: {0}")]
    Device(String),

    /// Session or watchdog parameters are invalid.
    ///
    /// This can occur when builder validation fails, e.g. a zero-length
    /// ring or a watchdog margin at or above the timeout.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An operation was attempted in a state that does not allow it.
    #[error("{operation} is not valid in the {state:?} state")]
    InvalidTransition {
        operation: &'static str,
        state: PlaybackState,
    },

    /// I/O operation failed (e.g. the watchdog thread could not be spawned).
    #[error(transparent)]
    Io(#[from] io::Error),
}
