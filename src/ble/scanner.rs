//! BLE scan control.
//!
//! [`Scanner`] owns the scan parameters and the running/stopped state, and
//! issues start/stop commands to the injected [`RadioDriver`].

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ble::advertising::{AdvertisingReport, OwnedAdvertisingReport};
use crate::ble::callbacks::{deferred_queue, CallbackQueue, Callbacks, Deferrer};
use crate::ble::driver::{ConnectionIndicator, RadioDriver, RoleRegistry};
use crate::ble::events::{ScannerEvent, StopCause};
use crate::error::{Error, Result};
use crate::utils::ms_to_625us_units;

/// Default scan interval in 625 µs units (100 ms).
pub const DEFAULT_SCAN_INTERVAL: u16 = 160;
/// Default scan window in 625 µs units (50 ms).
pub const DEFAULT_SCAN_WINDOW: u16 = 80;
/// Smallest interval or window the link layer accepts (2.5 ms).
pub const MIN_SCAN_TIMING: u16 = 0x0004;
/// Largest interval or window the link layer accepts (10.24 s).
pub const MAX_SCAN_TIMING: u16 = 0x4000;
/// Default depth of the deferred callback queue.
pub const DEFAULT_CALLBACK_QUEUE_DEPTH: usize = 16;

/// Scan parameters handed to the radio on start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanParameters {
    /// Send scan requests to advertisers (active) or only listen (passive).
    pub active_scan: bool,
    /// Only report devices on the whitelist.
    pub use_whitelist: bool,
    /// Scan interval in 625 µs units.
    pub interval: u16,
    /// Scan window in 625 µs units.
    pub window: u16,
    /// Scan timeout in seconds, 0 for none.
    pub timeout_secs: u16,
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            active_scan: false,
            use_whitelist: false,
            interval: DEFAULT_SCAN_INTERVAL,
            window: DEFAULT_SCAN_WINDOW,
            timeout_secs: 0,
        }
    }
}

impl ScanParameters {
    /// The scan timeout, or `None` if scanning is unbounded.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs != 0).then(|| Duration::from_secs(u64::from(self.timeout_secs)))
    }

    /// Check the timing values against link-layer limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if interval or window is out of
    /// range, or the window is longer than the interval.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("interval", self.interval), ("window", self.window)] {
            if !(MIN_SCAN_TIMING..=MAX_SCAN_TIMING).contains(&value) {
                return Err(Error::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
        }
        if self.window > self.interval {
            return Err(Error::InvalidParameter {
                name: "window".to_string(),
                value: format!("{} (exceeds interval {})", self.window, self.interval),
            });
        }
        Ok(())
    }
}

/// Whether the scanner is scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScannerState {
    /// Not scanning.
    #[default]
    Stopped,
    /// A start command succeeded and nothing has stopped it since.
    Running,
}

impl ScannerState {
    /// Check if running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ScannerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Running => write!(f, "Running"),
        }
    }
}

/// Construction-time scanner configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScannerConfig {
    /// Initial scan parameters.
    pub params: ScanParameters,
    /// Restart scanning after a central-role disconnect.
    pub restart_on_disconnect: bool,
    /// Slots in the deferred callback queue.
    pub callback_queue_depth: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            params: ScanParameters::default(),
            restart_on_disconnect: true,
            callback_queue_depth: DEFAULT_CALLBACK_QUEUE_DEPTH,
        }
    }
}

impl ScannerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for bad scan timing or a zero
    /// queue depth.
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        if self.callback_queue_depth == 0 {
            return Err(Error::InvalidParameter {
                name: "callback_queue_depth".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// State guarded by the scanner mutex.
#[derive(Debug)]
pub(crate) struct ScanInner {
    pub(crate) params: ScanParameters,
    pub(crate) state: ScannerState,
    /// The radio stopped on its own (scan timeout) while we still say Running.
    pub(crate) radio_halted: bool,
    pub(crate) restart_on_disconnect: bool,
}

impl ScanInner {
    /// Whether the radio is actually scanning right now.
    pub(crate) fn is_scanning(&self) -> bool {
        self.state.is_running() && !self.radio_halted
    }
}

/// BLE central-role scan manager.
///
/// All state sits behind one mutex, so a scanner can be shared across
/// threads and `start` never double-starts the radio.
pub struct Scanner {
    pub(crate) driver: Arc<dyn RadioDriver>,
    pub(crate) indicator: Arc<dyn ConnectionIndicator>,
    pub(crate) registry: Arc<dyn RoleRegistry>,
    pub(crate) inner: Mutex<ScanInner>,
    pub(crate) callbacks: Arc<Callbacks>,
    pub(crate) deferrer: Deferrer,
    callback_queue: Mutex<Option<CallbackQueue>>,
    pub(crate) event_tx: broadcast::Sender<ScannerEvent>,
    pub(crate) report_tx: broadcast::Sender<OwnedAdvertisingReport>,
}

impl Scanner {
    /// Create a scanner with default configuration.
    ///
    /// Passive scan, 100 ms interval, 50 ms window, no timeout, restart on
    /// disconnect enabled.
    pub fn new(
        driver: Arc<dyn RadioDriver>,
        indicator: Arc<dyn ConnectionIndicator>,
        registry: Arc<dyn RoleRegistry>,
    ) -> Self {
        Self::build(driver, indicator, registry, ScannerConfig::default())
    }

    /// Create a scanner with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn with_config(
        driver: Arc<dyn RadioDriver>,
        indicator: Arc<dyn ConnectionIndicator>,
        registry: Arc<dyn RoleRegistry>,
        config: ScannerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(driver, indicator, registry, config))
    }

    fn build(
        driver: Arc<dyn RadioDriver>,
        indicator: Arc<dyn ConnectionIndicator>,
        registry: Arc<dyn RoleRegistry>,
        config: ScannerConfig,
    ) -> Self {
        let callbacks = Arc::new(Callbacks::default());
        let (deferrer, queue) =
            deferred_queue(config.callback_queue_depth.max(1), callbacks.clone());
        let (event_tx, _) = broadcast::channel(32);
        let (report_tx, _) = broadcast::channel(100);

        Self {
            driver,
            indicator,
            registry,
            inner: Mutex::new(ScanInner {
                params: config.params,
                state: ScannerState::Stopped,
                radio_halted: false,
                restart_on_disconnect: config.restart_on_disconnect,
            }),
            callbacks,
            deferrer,
            callback_queue: Mutex::new(Some(queue)),
            event_tx,
            report_tx,
        }
    }

    /// Start scanning.
    ///
    /// `timeout_secs` of 0 scans until stopped. If the radio is already
    /// scanning this is a no-op and the new timeout is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverCommandFailed`] if the radio rejects the
    /// command. The scanner is then stopped; if it was still marked running
    /// after a scan timeout, a [`StopCause::Timeout`] stop is published.
    pub fn start(&self, timeout_secs: u16) -> Result<()> {
        self.start_scan(timeout_secs, false)
    }

    /// Start with `timeout_secs`, marking the event as a restart if asked.
    pub(crate) fn start_scan(&self, timeout_secs: u16, restarted: bool) -> Result<()> {
        let result = {
            let mut inner = self.inner.lock();

            if inner.is_scanning() {
                debug!("Already scanning, ignoring start request");
                return Ok(());
            }

            let params = ScanParameters {
                timeout_secs,
                ..inner.params
            };

            // Running here means the radio halted on its scan timeout.
            let was_halted = inner.state.is_running();
            let result = self.driver.scan_start(&params);
            if result.is_ok() {
                inner.params = params;
                inner.state = ScannerState::Running;
            } else {
                inner.state = ScannerState::Stopped;
            }
            inner.radio_halted = false;
            result.map_err(|e| (e, was_halted))
        };

        if let Err((e, was_halted)) = result {
            warn!("Radio rejected scan start: {}", e);
            if was_halted {
                self.indicator.end_searching();
                let _ = self.event_tx.send(ScannerEvent::Stopped {
                    cause: StopCause::Timeout,
                });
            }
            return Err(e.into());
        }

        info!(
            "Scanning started (timeout: {}s, restart: {})",
            timeout_secs, restarted
        );
        self.indicator.begin_searching();
        let _ = self.event_tx.send(ScannerEvent::Started {
            timeout_secs,
            restarted,
        });

        Ok(())
    }

    /// Stop scanning.
    ///
    /// Stopping a stopped scanner is a no-op. If the radio already halted on
    /// its scan timeout, no command is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverCommandFailed`] if the radio rejects the
    /// command. The state is left unchanged in that case.
    pub fn stop(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();

            if !inner.state.is_running() {
                debug!("Not scanning, ignoring stop request");
                return Ok(());
            }

            if inner.radio_halted {
                debug!("Radio already halted by scan timeout");
            } else if let Err(e) = self.driver.scan_stop() {
                warn!("Radio rejected scan stop: {}", e);
                return Err(e.into());
            }

            inner.state = ScannerState::Stopped;
            inner.radio_halted = false;
        }

        info!("Scanning stopped");
        self.indicator.end_searching();
        let _ = self.event_tx.send(ScannerEvent::Stopped {
            cause: StopCause::Requested,
        });

        Ok(())
    }

    /// Check if the scanner is in the running state.
    pub fn is_running(&self) -> bool {
        self.inner.lock().state.is_running()
    }

    /// Current scanner state.
    pub fn state(&self) -> ScannerState {
        self.inner.lock().state
    }

    /// Snapshot of the scan parameters.
    pub fn params(&self) -> ScanParameters {
        self.inner.lock().params
    }

    /// Use active scanning (send scan requests) instead of passive.
    pub fn set_active_scan(&self, enable: bool) {
        self.inner.lock().params.active_scan = enable;
    }

    /// Only report whitelisted devices.
    pub fn set_use_whitelist(&self, enable: bool) {
        self.inner.lock().params.use_whitelist = enable;
    }

    /// Set interval and window in 625 µs units.
    ///
    /// Takes effect on the next start.
    pub fn set_interval(&self, interval: u16, window: u16) {
        let mut inner = self.inner.lock();
        inner.params.interval = interval;
        inner.params.window = window;
    }

    /// Set interval and window in milliseconds.
    ///
    /// Values are converted to 625 µs units, truncating.
    pub fn set_interval_ms(&self, interval_ms: u16, window_ms: u16) {
        self.set_interval(ms_to_625us_units(interval_ms), ms_to_625us_units(window_ms));
    }

    /// Restart scanning automatically after a central-role disconnect.
    pub fn set_restart_on_disconnect(&self, enable: bool) {
        self.inner.lock().restart_on_disconnect = enable;
    }

    /// Check if restart on disconnect is enabled.
    pub fn restart_on_disconnect(&self) -> bool {
        self.inner.lock().restart_on_disconnect
    }

    /// Register the callback for received advertising reports.
    ///
    /// Runs in the event-delivery context. Replaces any previous callback.
    pub fn set_rx_callback<F>(&self, callback: F)
    where
        F: Fn(&AdvertisingReport<'_>) + Send + Sync + 'static,
    {
        self.callbacks.set_report(Some(Arc::new(callback)));
    }

    /// Remove the advertising report callback.
    pub fn clear_rx_callback(&self) {
        self.callbacks.set_report(None);
    }

    /// Register the callback for scan timeouts.
    ///
    /// Runs from the [`CallbackQueue`], not the event-delivery context.
    /// Replaces any previous callback.
    pub fn set_timeout_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.set_timeout(Some(Arc::new(callback)));
    }

    /// Remove the scan timeout callback.
    pub fn clear_timeout_callback(&self) {
        self.callbacks.set_timeout(None);
    }

    /// Take the deferred callback queue.
    ///
    /// Returns `None` after the first call.
    pub fn take_callback_queue(&self) -> Option<CallbackQueue> {
        self.callback_queue.lock().take()
    }

    /// Spawn a tokio task draining the deferred callback queue.
    ///
    /// Must be called from within a tokio runtime. Returns `None` if the
    /// queue was already taken.
    pub fn spawn_callback_worker(&self) -> Option<tokio::task::JoinHandle<()>> {
        let queue = self.take_callback_queue()?;
        Some(tokio::spawn(queue.run()))
    }

    /// Subscribe to scanner state changes.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ScannerEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to owned copies of received reports.
    ///
    /// Reports are only copied while at least one receiver exists.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<OwnedAdvertisingReport> {
        self.report_tx.subscribe()
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("inner", &*self.inner.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::driver::{
        DriverCommand, DriverError, MockConnectionIndicator, MockRadioDriver, MockRoleRegistry,
        NoopIndicator,
    };
    use pretty_assertions::assert_eq;
    use tokio_test::{assert_err, assert_ok};

    fn scanner(driver: MockRadioDriver) -> Scanner {
        Scanner::new(
            Arc::new(driver),
            Arc::new(NoopIndicator),
            Arc::new(MockRoleRegistry::new()),
        )
    }

    #[test]
    fn test_defaults() {
        let s = scanner(MockRadioDriver::new());
        assert!(!s.is_running());
        assert_eq!(s.state(), ScannerState::Stopped);
        assert!(s.restart_on_disconnect());
        assert_eq!(
            s.params(),
            ScanParameters {
                active_scan: false,
                use_whitelist: false,
                interval: 160,
                window: 80,
                timeout_secs: 0,
            }
        );
        assert_eq!(s.params().timeout(), None);
    }

    #[test]
    fn test_start_and_stop() {
        let mut driver = MockRadioDriver::new();
        driver
            .expect_scan_start()
            .withf(|p| p.timeout_secs == 30 && !p.active_scan)
            .times(1)
            .returning(|_| Ok(()));
        driver.expect_scan_stop().times(1).returning(|| Ok(()));

        let mut indicator = MockConnectionIndicator::new();
        indicator.expect_begin_searching().times(1).return_const(());
        indicator.expect_end_searching().times(1).return_const(());

        let s = Scanner::new(
            Arc::new(driver),
            Arc::new(indicator),
            Arc::new(MockRoleRegistry::new()),
        );
        let mut events = s.subscribe_events();

        assert_ok!(s.start(30));
        assert!(s.is_running());
        assert_eq!(s.params().timeout_secs, 30);
        assert_eq!(s.params().timeout(), Some(Duration::from_secs(30)));

        assert_ok!(s.stop());
        assert!(!s.is_running());

        assert_eq!(
            events.try_recv().unwrap(),
            ScannerEvent::Started {
                timeout_secs: 30,
                restarted: false
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            ScannerEvent::Stopped {
                cause: StopCause::Requested
            }
        );
    }

    #[test]
    fn test_double_start_is_idempotent() {
        let mut driver = MockRadioDriver::new();
        driver.expect_scan_start().times(1).returning(|_| Ok(()));

        let s = scanner(driver);
        s.start(0).unwrap();
        s.start(10).unwrap();

        assert!(s.is_running());
        // Second call was a no-op, so the timeout is unchanged.
        assert_eq!(s.params().timeout_secs, 0);
    }

    #[test]
    fn test_start_failure_leaves_stopped() {
        let mut driver = MockRadioDriver::new();
        driver
            .expect_scan_start()
            .times(1)
            .returning(|_| Err(DriverError::new(DriverCommand::ScanStart, 0x08)));

        let mut indicator = MockConnectionIndicator::new();
        indicator.expect_begin_searching().never();

        let s = Scanner::new(
            Arc::new(driver),
            Arc::new(indicator),
            Arc::new(MockRoleRegistry::new()),
        );

        let err = assert_err!(s.start(5));
        assert_eq!(
            err,
            Error::DriverCommandFailed(DriverError::new(DriverCommand::ScanStart, 0x08))
        );
        assert!(!s.is_running());
        // A failed start does not record its timeout.
        assert_eq!(s.params().timeout_secs, 0);
    }

    #[test]
    fn test_stop_failure_keeps_running() {
        let mut driver = MockRadioDriver::new();
        driver.expect_scan_start().returning(|_| Ok(()));
        driver
            .expect_scan_stop()
            .times(1)
            .returning(|| Err(DriverError::new(DriverCommand::ScanStop, 0x3401)));

        let s = scanner(driver);
        s.start(0).unwrap();

        assert!(matches!(s.stop(), Err(Error::DriverCommandFailed(_))));
        assert!(s.is_running());
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let mut driver = MockRadioDriver::new();
        driver.expect_scan_stop().never();

        let s = scanner(driver);
        s.stop().unwrap();
        assert!(!s.is_running());
    }

    #[test]
    fn test_parameter_setters_apply_on_start() {
        let mut driver = MockRadioDriver::new();
        driver
            .expect_scan_start()
            .withf(|p| {
                *p == ScanParameters {
                    active_scan: true,
                    use_whitelist: true,
                    interval: 160,
                    window: 48,
                    timeout_secs: 0,
                }
            })
            .times(1)
            .returning(|_| Ok(()));

        let s = scanner(driver);
        s.set_active_scan(true);
        s.set_use_whitelist(true);
        s.set_interval_ms(100, 30);
        s.start(0).unwrap();
    }

    #[test]
    fn test_set_interval_ticks() {
        let s = scanner(MockRadioDriver::new());
        s.set_interval(0x0100, 0x0050);
        assert_eq!(s.params().interval, 0x0100);
        assert_eq!(s.params().window, 0x0050);
    }

    #[test]
    fn test_params_validate() {
        assert!(ScanParameters::default().validate().is_ok());

        let too_small = ScanParameters {
            interval: 3,
            window: 3,
            ..Default::default()
        };
        assert!(matches!(
            too_small.validate(),
            Err(Error::InvalidParameter { ref name, .. }) if name == "interval"
        ));

        let wide_window = ScanParameters {
            interval: 80,
            window: 160,
            ..Default::default()
        };
        assert!(wide_window.validate().is_err());
    }

    #[test]
    fn test_with_config() {
        let config = ScannerConfig {
            restart_on_disconnect: false,
            ..Default::default()
        };
        let s = Scanner::with_config(
            Arc::new(MockRadioDriver::new()),
            Arc::new(NoopIndicator),
            Arc::new(MockRoleRegistry::new()),
            config,
        )
        .unwrap();
        assert!(!s.restart_on_disconnect());

        let bad = ScannerConfig {
            callback_queue_depth: 0,
            ..Default::default()
        };
        let result = Scanner::with_config(
            Arc::new(MockRadioDriver::new()),
            Arc::new(NoopIndicator),
            Arc::new(MockRoleRegistry::new()),
            bad,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_take_callback_queue_once() {
        let s = scanner(MockRadioDriver::new());
        assert!(s.take_callback_queue().is_some());
        assert!(s.take_callback_queue().is_none());
    }

    #[test]
    fn test_concurrent_start_issues_one_command() {
        let mut driver = MockRadioDriver::new();
        driver.expect_scan_start().times(1).returning(|_| Ok(()));

        let s = Arc::new(scanner(driver));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = s.clone();
                std::thread::spawn(move || s.start(0))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert!(s.is_running());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ScannerState::Running.to_string(), "Running");
        assert!(!ScannerState::default().is_running());
    }
}
