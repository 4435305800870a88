//! Collaborator seams for the radio stack.
//!
//! The scanner never talks to hardware directly. It is handed a
//! [`RadioDriver`] for scan commands, a [`ConnectionIndicator`] for the
//! connection LED and a [`RoleRegistry`] for resolving connection handles.

use thiserror::Error;

use crate::ble::scanner::ScanParameters;

/// Scan commands that can be issued to the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverCommand {
    /// Begin scanning with a parameter set.
    ScanStart,
    /// Halt an ongoing scan.
    ScanStop,
}

impl std::fmt::Display for DriverCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScanStart => write!(f, "scan start"),
            Self::ScanStop => write!(f, "scan stop"),
        }
    }
}

/// A scan command rejected by the radio stack.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{command} rejected by radio stack (status {status:#06x})")]
pub struct DriverError {
    /// The command that failed.
    pub command: DriverCommand,
    /// Stack-specific status code.
    pub status: u32,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(command: DriverCommand, status: u32) -> Self {
        Self { command, status }
    }
}

/// GAP role of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// No role, or the handle is not known.
    #[default]
    Invalid,
    /// We initiated the connection.
    Central,
    /// The peer initiated the connection.
    Peripheral,
}

impl Role {
    /// Check if this is the central role.
    pub fn is_central(&self) -> bool {
        matches!(self, Self::Central)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid => write!(f, "Invalid"),
            Self::Central => write!(f, "Central"),
            Self::Peripheral => write!(f, "Peripheral"),
        }
    }
}

/// Link-layer connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(pub u16);

impl ConnectionHandle {
    /// Handle value the stack uses for "no connection".
    pub const INVALID: Self = Self(0xFFFF);

    /// Check if this handle refers to a connection.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl std::fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Scan command interface of the radio stack.
///
/// Both commands are synchronous: they return once the stack has
/// acknowledged or rejected them.
#[cfg_attr(test, mockall::automock)]
pub trait RadioDriver: Send + Sync {
    /// Start scanning with the given parameters.
    fn scan_start(&self, params: &ScanParameters) -> Result<(), DriverError>;

    /// Stop an ongoing scan.
    fn scan_stop(&self) -> Result<(), DriverError>;
}

/// Visual connection indicator, typically a blinking LED.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionIndicator: Send + Sync {
    /// Enter the "searching" state (blink).
    fn begin_searching(&self);

    /// Leave the "searching" state.
    fn end_searching(&self);

    /// Show or clear the "connected" state.
    fn set_connected(&self, connected: bool);
}

/// Indicator that ignores every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIndicator;

impl ConnectionIndicator for NoopIndicator {
    fn begin_searching(&self) {}

    fn end_searching(&self) {}

    fn set_connected(&self, _connected: bool) {}
}

/// Lookup from connection handle to GAP role.
#[cfg_attr(test, mockall::automock)]
pub trait RoleRegistry: Send + Sync {
    /// Role of the connection behind `handle`.
    fn role_for_handle(&self, handle: ConnectionHandle) -> Role;
}
