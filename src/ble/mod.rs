//! BLE scanning module.
//!
//! This module provides advertising data parsing, service UUID matching
//! and the central-role scan controller.

pub mod advertising;
pub mod callbacks;
mod dispatcher;
pub mod driver;
pub mod events;
pub mod scanner;
pub mod uuids;

pub use advertising::{ad_types, AdvertisingReport, OwnedAdvertisingReport, PeerAddress};
pub use callbacks::CallbackQueue;
pub use driver::{
    ConnectionHandle, ConnectionIndicator, DriverError, RadioDriver, Role, RoleRegistry,
};
pub use events::{RadioEvent, ScannerEvent, TimeoutSource};
pub use scanner::{ScanParameters, Scanner, ScannerConfig, ScannerState};
pub use uuids::{report_contains_uuid, BleUuid};
