//! Service UUIDs and advertising UUID matching.
//!
//! Advertising data carries UUIDs in little-endian byte order. [`BleUuid`]
//! keeps them in that order so matching is a plain byte comparison.

use uuid::Uuid;

use crate::ble::advertising::{ad_types, AdvertisingReport};
use crate::error::{Error, Result};

/// The Bluetooth base UUID, `00000000-0000-1000-8000-00805F9B34FB`.
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(0x0000_0000_0000_1000_8000_00805f9b34fb);

/// Standard Heart Rate service.
pub const HEART_RATE_SERVICE: BleUuid = BleUuid::Uuid16(0x180D);
/// Standard Battery service.
pub const BATTERY_SERVICE: BleUuid = BleUuid::Uuid16(0x180F);
/// Standard Device Information service.
pub const DEVICE_INFO_SERVICE: BleUuid = BleUuid::Uuid16(0x180A);

/// Nordic UART Service UUID.
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);

/// A 16-bit or 128-bit service UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BleUuid {
    /// SIG-assigned 16-bit alias on the base UUID.
    Uuid16(u16),
    /// Full 128-bit UUID, bytes in on-air (little-endian) order.
    Uuid128([u8; 16]),
}

impl BleUuid {
    /// Build from a little-endian byte slice as found in advertising data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedUuidWidth`] unless `bytes` is 2 or 16 long.
    pub fn from_le_slice(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            2 => Ok(Self::Uuid16(u16::from_le_bytes([bytes[0], bytes[1]]))),
            16 => {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(bytes);
                Ok(Self::Uuid128(raw))
            }
            n => Err(Error::UnsupportedUuidWidth { bits: n * 8 }),
        }
    }

    /// Width in bits (16 or 128).
    pub fn bits(&self) -> usize {
        self.byte_len() * 8
    }

    /// Width in bytes (2 or 16).
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Uuid16(_) => 2,
            Self::Uuid128(_) => 16,
        }
    }

    /// Little-endian bytes as they appear over the air.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::Uuid16(v) => v.to_le_bytes().to_vec(),
            Self::Uuid128(raw) => raw.to_vec(),
        }
    }

    /// Expand to a full UUID, placing 16-bit aliases on the base UUID.
    pub fn to_uuid(&self) -> Uuid {
        match self {
            Self::Uuid16(v) => {
                Uuid::from_u128(BLUETOOTH_BASE_UUID.as_u128() | (u128::from(*v) << 96))
            }
            Self::Uuid128(raw) => {
                let mut be = *raw;
                be.reverse();
                Uuid::from_bytes(be)
            }
        }
    }

    /// The two AD types that list service UUIDs of this width.
    fn list_types(&self) -> [u8; 2] {
        match self {
            Self::Uuid16(_) => [ad_types::UUID16_MORE_AVAILABLE, ad_types::UUID16_COMPLETE],
            Self::Uuid128(_) => [ad_types::UUID128_MORE_AVAILABLE, ad_types::UUID128_COMPLETE],
        }
    }
}

impl From<u16> for BleUuid {
    fn from(value: u16) -> Self {
        Self::Uuid16(value)
    }
}

impl From<Uuid> for BleUuid {
    fn from(value: Uuid) -> Self {
        let mut raw = *value.as_bytes();
        raw.reverse();
        Self::Uuid128(raw)
    }
}

impl std::fmt::Display for BleUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uuid16(v) => write!(f, "{:#06x}", v),
            Self::Uuid128(_) => write!(f, "{}", self.to_uuid()),
        }
    }
}

/// Check if an advertising report lists `uuid` among its services.
///
/// Looks at the first "more available" and the first "complete" list record
/// of the UUID's width. Every UUID-sized chunk of those records is compared
/// byte for byte; there is no byte-order normalisation.
pub fn report_contains_uuid(report: &AdvertisingReport<'_>, uuid: &BleUuid) -> bool {
    let short;
    let target: &[u8] = match uuid {
        BleUuid::Uuid16(v) => {
            short = v.to_le_bytes();
            &short
        }
        BleUuid::Uuid128(raw) => raw,
    };

    uuid.list_types().iter().any(|&ad_type| {
        report
            .record(ad_type)
            .map(|value| value.chunks_exact(target.len()).any(|chunk| chunk == target))
            .unwrap_or(false)
    })
}

/// Like [`report_contains_uuid`], for a raw little-endian UUID.
///
/// # Errors
///
/// Returns [`Error::UnsupportedUuidWidth`] unless `uuid` is 2 or 16 bytes.
pub fn report_contains_uuid_bytes(report: &AdvertisingReport<'_>, uuid: &[u8]) -> Result<bool> {
    let uuid = BleUuid::from_le_slice(uuid)?;
    Ok(report_contains_uuid(report, &uuid))
}
