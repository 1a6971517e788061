//! The bypass-relay watchdog thread.
//!
//! Capture/playback cards with an analog bypass relay run a fail-safe
//! timer: unless software periodically rewrites the bypass-timeout
//! register, the relay drops the card out of the signal path. While a
//! session is playing, a dedicated thread refreshes the register at an
//! interval comfortably shorter than the timeout, and writes the disable
//! sentinel exactly once on its way out so a clean shutdown does not leave
//! timeout enforcement armed.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use log::{debug, error};

use crate::{
    device::{ConfigId, DeviceConfiguration},
    Error, Result,
};

/// Sentinel written to [`ConfigId::BypassTimeout`] to clear watchdog-driven
/// timeout enforcement.
pub const BYPASS_DISABLE: i64 = -1;

/// Default bypass timeout programmed into the device.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(40);

/// Default refresh margin subtracted from the timeout.
pub const DEFAULT_MARGIN: Duration = Duration::from_millis(10);

/// Watchdog timing parameters.
///
/// The register is rewritten every `timeout - margin`, so it is always
/// refreshed before the device's own timer can expire and force the relay
/// into bypass.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use playout_bypass::WatchdogConfig;
///
/// let config = WatchdogConfig::new(Duration::from_millis(40), Duration::from_millis(10))?;
/// assert_eq!(config.refresh_interval(), Duration::from_millis(30));
///
/// // A margin at or above the timeout leaves no refresh window.
/// assert!(WatchdogConfig::new(Duration::from_millis(10), Duration::from_millis(10)).is_err());
/// # Ok::<(), playout_bypass::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    timeout: Duration,
    margin: Duration,
}

impl WatchdogConfig {
    /// Creates a validated watchdog configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the timeout is zero, the
    /// margin is not strictly smaller than the timeout, or the timeout does
    /// not fit the device's millisecond register.
    pub fn new(timeout: Duration, margin: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::InvalidConfiguration(
                "watchdog timeout must be non-zero".into(),
            ));
        }
        if margin >= timeout {
            return Err(Error::InvalidConfiguration(format!(
                "watchdog margin ({margin:?}) must be strictly smaller than the timeout ({timeout:?})"
            )));
        }
        if i64::try_from(timeout.as_millis()).is_err() {
            return Err(Error::InvalidConfiguration(
                "watchdog timeout does not fit the millisecond register".into(),
            ));
        }
        Ok(Self { timeout, margin })
    }

    /// The timeout value programmed into the device.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The refresh margin.
    pub fn margin(&self) -> Duration {
        self.margin
    }

    /// How often the register is rewritten while playback runs.
    pub fn refresh_interval(&self) -> Duration {
        self.timeout - self.margin
    }

    fn timeout_ms(&self) -> i64 {
        // Validated to fit in new().
        self.timeout.as_millis() as i64
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            margin: DEFAULT_MARGIN,
        }
    }
}

/// Handle to the running watchdog thread.
///
/// The thread runs for the lifetime of playback: it loops while the shared
/// running flag is set, then performs its own cleanup (the single disable
/// write) and exits. Joining is bounded by one sleep interval.
#[derive(Debug)]
pub struct WatchdogPinger {
    thread: thread::JoinHandle<()>,
}

impl WatchdogPinger {
    /// Spawns the watchdog thread.
    ///
    /// The thread pings the register immediately, then on every wake while
    /// `running` remains set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the OS refuses to spawn the thread. The
    /// caller must treat this as a startup failure: playback must not run
    /// unattended by the watchdog.
    pub fn spawn(
        configuration: Arc<dyn DeviceConfiguration>,
        config: WatchdogConfig,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let thread = thread::Builder::new()
            .name("bypass-watchdog".into())
            .spawn(move || ping_loop(&*configuration, config, &running))?;
        Ok(Self { thread })
    }

    /// Blocks until the watchdog thread has exited.
    ///
    /// The caller clears the running flag first; the thread notices on its
    /// next wake, so this blocks for at most one sleep interval.
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("bypass watchdog thread panicked");
        }
    }
}

fn ping_loop(configuration: &dyn DeviceConfiguration, config: WatchdogConfig, running: &AtomicBool) {
    debug!(
        "bypass watchdog armed ({:?} timeout, {:?} refresh)",
        config.timeout(),
        config.refresh_interval()
    );

    while running.load(Ordering::Acquire) {
        // Reset the bypass timeout value.
        if let Err(e) = configuration.set_int(ConfigId::BypassTimeout, config.timeout_ms()) {
            // A failed write likely means a disconnected or faulted device;
            // the device's own fail-safe timer takes over from here.
            error!("error resetting the bypass timeout value: {e}");
            break;
        }

        // Sleep less than the timeout value, so the register is rewritten
        // before it expires.
        thread::sleep(config.refresh_interval());
    }

    // Clear timeout enforcement before exiting, exactly once.
    if let Err(e) = configuration.set_int(ConfigId::BypassTimeout, BYPASS_DISABLE) {
        error!("error clearing the bypass timeout value: {e}");
    } else {
        debug!("bypass timeout cleared");
    }
}
