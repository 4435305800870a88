// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # ble-scan-manager
//!
//! A BLE central-role scan manager for embedded radio stacks.
//!
//! The crate sits between a radio driver and application code:
//!
//! - **Scan control**: start/stop scanning with active/passive mode,
//!   interval, window, whitelist and timeout settings
//! - **Advertising parsing**: zero-copy, bounds-checked walking of the
//!   Length-Type-Value records in advertising payloads
//! - **UUID filtering**: match 16-bit and 128-bit service UUIDs in reports
//! - **Auto-restart**: resume scanning after a central-role disconnect
//!
//! The radio, the connection LED and the connection-handle registry are
//! injected as traits, so the scanner runs the same against hardware,
//! a simulator or test mocks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ble_scan_manager::ble::driver::NoopIndicator;
//! use ble_scan_manager::{
//!     BleUuid, ConnectionHandle, DriverError, RadioDriver, RadioEvent, Result, Role,
//!     RoleRegistry, ScanParameters, Scanner,
//! };
//!
//! struct Radio;
//!
//! impl RadioDriver for Radio {
//!     fn scan_start(&self, _params: &ScanParameters) -> std::result::Result<(), DriverError> {
//!         Ok(())
//!     }
//!     fn scan_stop(&self) -> std::result::Result<(), DriverError> {
//!         Ok(())
//!     }
//! }
//!
//! struct Links;
//!
//! impl RoleRegistry for Links {
//!     fn role_for_handle(&self, _handle: ConnectionHandle) -> Role {
//!         Role::Central
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let scanner = Scanner::new(Arc::new(Radio), Arc::new(NoopIndicator), Arc::new(Links));
//!
//!     let heart_rate = BleUuid::from(0x180Du16);
//!     scanner.set_rx_callback(move |report| {
//!         if report.contains_uuid(&heart_rate) {
//!             println!("Heart rate sensor at {} ({} dBm)", report.address, report.rssi);
//!         }
//!     });
//!
//!     scanner.set_interval_ms(100, 50);
//!     scanner.start(0)?;
//!
//!     // Feed radio events as they arrive.
//!     let payload = [3, 0x03, 0x0D, 0x18];
//!     let report = ble_scan_manager::AdvertisingReport::new(Default::default(), -60, &payload);
//!     scanner.handle_event(&RadioEvent::AdvertisingReport(report));
//!
//!     scanner.stop()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for configuration types

// Public modules
pub mod ble;
pub mod error;
pub mod utils;

// Re-exports for convenience
pub use ble::{
    AdvertisingReport, BleUuid, CallbackQueue, ConnectionHandle, ConnectionIndicator,
    DriverError, OwnedAdvertisingReport, PeerAddress, RadioDriver, RadioEvent, Role,
    RoleRegistry, ScanParameters, Scanner, ScannerConfig, ScannerEvent, ScannerState,
    TimeoutSource,
};
pub use error::{Error, Result};
pub use utils::{ms_to_625us_units, units_625us_to_ms};
