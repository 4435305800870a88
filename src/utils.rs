//! Unit conversions for BLE timing parameters.

/// Length of one scan timing tick in microseconds.
pub const UNIT_625_US: u32 = 625;

/// Convert milliseconds to 625 µs radio ticks.
///
/// Multiplies by 1.6 and truncates, the same way the radio SDK's
/// conversion macro does. Results that do not fit in a `u16` saturate.
///
/// # Example
///
/// ```
/// use ble_scan_manager::ms_to_625us_units;
///
/// assert_eq!(ms_to_625us_units(100), 160);
/// assert_eq!(ms_to_625us_units(3), 4);
/// ```
#[inline]
pub fn ms_to_625us_units(ms: u16) -> u16 {
    let units = u32::from(ms) * 16 / 10;
    u16::try_from(units).unwrap_or(u16::MAX)
}

/// Convert 625 µs radio ticks back to (truncated) milliseconds.
///
/// # Example
///
/// ```
/// use ble_scan_manager::units_625us_to_ms;
///
/// assert_eq!(units_625us_to_ms(160), 100);
/// ```
#[inline]
pub fn units_625us_to_ms(units: u16) -> u32 {
    u32::from(units) * UNIT_625_US / 1000
}
