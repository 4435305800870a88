//! Radio events delivered to the scanner and notifications it emits.

use crate::ble::advertising::AdvertisingReport;
use crate::ble::driver::{ConnectionHandle, DriverError, Role};

/// Source of a GAP timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutSource {
    /// Advertising timed out.
    Advertising,
    /// Scanning timed out.
    Scan,
    /// A connection attempt timed out.
    Connection,
    /// Authenticated payload timeout.
    AuthPayload,
    /// Any other stack-specific source.
    Other(u8),
}

/// An event delivered by the radio stack.
///
/// Events borrow driver memory and must be handled before the next one is
/// delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent<'a> {
    /// An advertising (or scan response) report.
    AdvertisingReport(AdvertisingReport<'a>),
    /// A link was established.
    Connected {
        /// Handle of the new connection.
        handle: ConnectionHandle,
        /// Our role on the link.
        role: Role,
    },
    /// A link was closed.
    Disconnected {
        /// Handle of the closed connection.
        handle: ConnectionHandle,
        /// HCI disconnect reason.
        reason: u8,
    },
    /// A driver-managed timer expired.
    Timeout {
        /// What timed out.
        source: TimeoutSource,
    },
    /// Any event the scanner does not handle.
    Other {
        /// Stack-specific event id.
        id: u16,
    },
}

/// Why the scanner left the running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopCause {
    /// [`Scanner::stop`](crate::ble::Scanner::stop) was called.
    Requested,
    /// The stack halted scanning for a central connection.
    Connected,
    /// The driver-managed scan timeout expired and the following start was
    /// rejected.
    Timeout,
}

/// State change notification published by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerEvent {
    /// Scanning started.
    Started {
        /// Timeout in seconds, 0 for none.
        timeout_secs: u16,
        /// Whether this was an automatic restart after a disconnect.
        restarted: bool,
    },
    /// Scanning stopped.
    Stopped {
        /// Why it stopped.
        cause: StopCause,
    },
    /// The radio reported the scan timeout.
    TimedOut,
    /// An automatic restart after a disconnect was rejected.
    RestartFailed {
        /// The rejection.
        error: DriverError,
    },
}
