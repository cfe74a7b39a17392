//! Reconnection with exponential backoff for transport failures.
//!
//! When the camera drops off the bus (cable pulled, body powered down), the
//! backoff state machine paces reopen attempts so a detached device does not
//! get hammered with enumeration traffic.

use std::time::{Duration, Instant};

use crate::config::Config;
use crate::device::{Device, DeviceState};
use crate::transport::{self, Transport};

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reopen attempt.
    pub initial_delay: Duration,
    /// Ceiling on the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl From<&Config> for ReconnectConfig {
    fn from(config: &Config) -> Self {
        ReconnectConfig {
            initial_delay: Duration::from_millis(config.reconnect_initial_delay_ms),
            max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
            multiplier: config.reconnect_multiplier,
        }
    }
}

/// Backoff state machine.
#[derive(Debug)]
pub struct ReconnectState {
    config: ReconnectConfig,
    current_delay: Duration,
    last_attempt: Option<Instant>,
    consecutive_failures: u32,
}

impl ReconnectState {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            last_attempt: None,
            consecutive_failures: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ReconnectConfig::default())
    }

    /// Whether enough time has passed to try again. Always true before the
    /// first attempt.
    pub fn should_attempt(&self) -> bool {
        match self.last_attempt {
            None => true,
            Some(last) => last.elapsed() >= self.current_delay,
        }
    }

    /// Record a failed attempt and advance the backoff.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.last_attempt = Some(Instant::now());

        let next = self.current_delay.as_secs_f64() * self.config.multiplier;
        self.current_delay = Duration::from_secs_f64(next).min(self.config.max_delay);
    }

    /// Record success and reset the backoff.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = self.config.initial_delay;
        self.last_attempt = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

/// Attempt to reopen the camera transport, respecting backoff timing.
///
/// - `serial`: preferred serial number (empty = auto-select).
/// - Returns `None` without attempting while the backoff timer runs.
/// - On success, resets the backoff and returns the fresh transport.
/// - On failure, advances the backoff, logs the schedule, and returns `None`.
pub fn try_reopen(state: &mut ReconnectState, serial: &str) -> Option<Box<dyn Transport>> {
    if !state.should_attempt() {
        return None;
    }
    match transport::open_by_serial(serial) {
        Ok(t) => {
            state.record_success();
            Some(t)
        }
        Err(e) => {
            state.record_failure();
            log::warn!(
                "reconnect failed: {e} (attempt {}, retry in {:.1}s)",
                state.consecutive_failures(),
                state.current_delay().as_secs_f64()
            );
            None
        }
    }
}

/// Reopen the transport and re-attach it to a device record.
///
/// On success the device moves back to `Connected`; session and release
/// control must be re-established by the caller, since the camera forgot
/// both when it went away. Returns whether a transport was attached.
pub fn try_reattach(state: &mut ReconnectState, device: &Device, serial: &str) -> bool {
    let Some(transport) = try_reopen(state, serial) else {
        return false;
    };
    device.attach_transport(transport);
    log::info!(
        "device {} reattached after {} failed attempts",
        device.id(),
        state.consecutive_failures()
    );
    debug_assert_eq!(device.state(), DeviceState::Connected);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.multiplier, 2.0);
    }

    #[test]
    fn config_converts_from_library_config() {
        let mut lib = Config::default();
        lib.reconnect_initial_delay_ms = 250;
        lib.reconnect_max_delay_ms = 8_000;
        lib.reconnect_multiplier = 3.0;

        let rc = ReconnectConfig::from(&lib);
        assert_eq!(rc.initial_delay, Duration::from_millis(250));
        assert_eq!(rc.max_delay, Duration::from_secs(8));
        assert_eq!(rc.multiplier, 3.0);
    }

    #[test]
    fn initial_should_attempt_is_true() {
        let state = ReconnectState::with_defaults();
        assert!(state.should_attempt());
        assert_eq!(state.consecutive_failures(), 0);
    }

    #[test]
    fn backoff_progresses_on_failure() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        };
        let mut state = ReconnectState::new(config);

        assert_eq!(state.current_delay(), Duration::from_millis(100));

        state.record_failure();
        assert_eq!(state.consecutive_failures(), 1);
        assert_eq!(state.current_delay(), Duration::from_millis(200));

        state.record_failure();
        assert_eq!(state.current_delay(), Duration::from_millis(400));

        state.record_failure();
        assert_eq!(state.current_delay(), Duration::from_millis(800));
    }

    #[test]
    fn backoff_capped_at_max() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
        };
        let mut state = ReconnectState::new(config);

        state.record_failure(); // 1s -> 2s
        assert_eq!(state.current_delay(), Duration::from_secs(2));
        state.record_failure(); // 2s -> 4s
        assert_eq!(state.current_delay(), Duration::from_secs(4));
        state.record_failure(); // capped
        assert_eq!(state.current_delay(), Duration::from_secs(4));
    }

    #[test]
    fn success_resets_backoff() {
        let mut state = ReconnectState::with_defaults();
        state.record_failure();
        state.record_failure();
        assert_eq!(state.consecutive_failures(), 2);

        state.record_success();
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.current_delay(), Duration::from_secs(1));
        assert!(state.should_attempt());
    }

    #[test]
    fn should_attempt_false_right_after_failure() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        };
        let mut state = ReconnectState::new(config);
        state.record_failure();
        assert!(!state.should_attempt());
    }

    #[test]
    fn should_attempt_true_after_delay_elapses() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        };
        let mut state = ReconnectState::new(config);
        state.record_failure();
        std::thread::sleep(Duration::from_millis(10));
        assert!(state.should_attempt());
    }

    #[test]
    fn try_reopen_respects_backoff_window() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        };
        let mut state = ReconnectState::new(config);
        state.record_failure();
        // Backoff window still open: no attempt is made at all.
        assert!(try_reopen(&mut state, "").is_none());
        assert_eq!(state.consecutive_failures(), 1);
    }

    #[test]
    fn try_reattach_leaves_device_untouched_while_backing_off() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        };
        let mut state = ReconnectState::new(config);
        state.record_failure();

        let mgr = crate::device::DeviceManager::new();
        let dev = mgr.allocate();
        assert!(!try_reattach(&mut state, &dev, ""));
        assert_eq!(dev.state(), DeviceState::Disconnected);
    }
}
