//! Error types for the ble-scan-manager crate.

use thiserror::Error;

use crate::ble::driver::DriverError;

/// The main error type for this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The radio stack rejected a scan start or stop command.
    #[error("Driver command failed: {0}")]
    DriverCommandFailed(#[from] DriverError),

    /// An advertising payload had an inconsistent LTV length field.
    #[error("Malformed advertising data: {context}")]
    MalformedAdvertisingData {
        /// Description of what was inconsistent about the data.
        context: String,
    },

    /// A UUID was neither 16 nor 128 bits wide.
    #[error("Unsupported UUID width: {bits} bits (expected 16 or 128)")]
    UnsupportedUuidWidth {
        /// The width that was supplied, in bits.
        bits: usize,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
