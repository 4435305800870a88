//! Radio event handling.
//!
//! The radio stack delivers events one at a time through
//! [`Scanner::handle_event`]. Reports go to the user callback, connection
//! events update scan state, and central-role disconnects may restart
//! scanning.

use tracing::{debug, error, trace};

use crate::ble::advertising::AdvertisingReport;
use crate::ble::callbacks::DeferredCallback;
use crate::ble::driver::{ConnectionHandle, Role};
use crate::ble::events::{RadioEvent, ScannerEvent, StopCause, TimeoutSource};
use crate::ble::scanner::{Scanner, ScannerState};
use crate::error::Error;

impl Scanner {
    /// Handle one event from the radio stack.
    ///
    /// Never fails: a rejected automatic restart is logged and published as
    /// [`ScannerEvent::RestartFailed`].
    pub fn handle_event(&self, event: &RadioEvent<'_>) {
        match event {
            RadioEvent::AdvertisingReport(report) => self.on_report(report),
            RadioEvent::Connected { handle, role } => self.on_connected(*handle, *role),
            RadioEvent::Disconnected { handle, reason } => self.on_disconnected(*handle, *reason),
            RadioEvent::Timeout { source } => self.on_timeout(*source),
            RadioEvent::Other { id } => trace!("Ignoring radio event {:#06x}", id),
        }
    }

    fn on_report(&self, report: &AdvertisingReport<'_>) {
        trace!(
            "Advertising report from {} (rssi {}, {} bytes)",
            report.address,
            report.rssi,
            report.len()
        );

        self.callbacks.notify_report(report);

        if self.report_tx.receiver_count() > 0 {
            let _ = self.report_tx.send(report.snapshot());
        }
    }

    fn on_connected(&self, handle: ConnectionHandle, role: Role) {
        if !role.is_central() {
            trace!("Ignoring {} connection {}", role, handle);
            return;
        }

        // The stack halts scanning when a central connection is made.
        let was_running = {
            let mut inner = self.inner.lock();
            let was_running = inner.state.is_running();
            inner.state = ScannerState::Stopped;
            inner.radio_halted = false;
            was_running
        };

        debug!("Central connection {} established, scanning halted", handle);
        self.indicator.end_searching();
        self.indicator.set_connected(true);

        if was_running {
            let _ = self.event_tx.send(ScannerEvent::Stopped {
                cause: StopCause::Connected,
            });
        }
    }

    fn on_disconnected(&self, handle: ConnectionHandle, reason: u8) {
        let role = self.registry.role_for_handle(handle);
        if !role.is_central() {
            trace!("Ignoring {} disconnect on {}", role, handle);
            return;
        }

        debug!("Central connection {} closed (reason {:#04x})", handle, reason);
        self.indicator.set_connected(false);

        let restart_timeout = {
            let inner = self.inner.lock();
            (inner.restart_on_disconnect && !inner.is_scanning())
                .then_some(inner.params.timeout_secs)
        };

        let Some(timeout_secs) = restart_timeout else {
            return;
        };

        match self.start_scan(timeout_secs, true) {
            Ok(()) => {}
            Err(Error::DriverCommandFailed(e)) => {
                error!("Failed to restart scanning after disconnect: {}", e);
                let _ = self.event_tx.send(ScannerEvent::RestartFailed { error: e });
            }
            Err(e) => error!("Failed to restart scanning after disconnect: {}", e),
        }
    }

    fn on_timeout(&self, source: TimeoutSource) {
        if source != TimeoutSource::Scan {
            trace!("Ignoring {:?} timeout", source);
            return;
        }

        {
            let mut inner = self.inner.lock();
            if inner.state.is_running() {
                inner.radio_halted = true;
            }
        }

        debug!("Scan timed out");
        let _ = self.event_tx.send(ScannerEvent::TimedOut);

        if self.callbacks.has_timeout() {
            self.deferrer.defer(DeferredCallback::ScanTimeout);
        }
    }
}
